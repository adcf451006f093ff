//! The cooperative virtual machine.
//!
//! ## Structure
//!
//! - `scheduler` - the thread queue, frame loop, targets and clock
//! - `dispatcher` - starting and restarting threads for events
//! - `interpreter` - running one thread's continuations
//! - `comparison` - ordering and equality between values

pub mod comparison;
pub mod dispatcher;
pub mod interpreter;
pub mod scheduler;

pub use interpreter::ExecutionContext;
pub use scheduler::{Clock, RECURSION_WINDOW, Runtime, Slot};
