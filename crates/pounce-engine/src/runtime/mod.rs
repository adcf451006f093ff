//! Runtime data: values, targets, threads and host collaborators.

pub mod host;
pub mod target;
pub mod thread;
pub mod value;

pub use host::{HeadlessHost, Host, Ticket};
pub use target::{Target, TargetId, TargetKind};
pub use thread::{CallFrame, GroupId, Registers, Thread};
pub use value::Value;
