//! Block-graph compiler.
//!
//! Transforms a target's block graph into a [`ScriptTable`]: the
//! continuation table, the procedure table and the listener tables.
//!
//! # Module Structure
//!
//! - `ir`: statement and expression trees with explicit labels
//! - `codegen`: per-opcode translation from blocks to IR
//!   - `codegen::scope`: variable, list and parameter resolution
//! - `splitter`: cuts labeled scripts into continuations

pub mod codegen;
pub mod ir;
pub mod splitter;

use rustc_hash::FxHashMap;

pub use codegen::Compiler;
pub use ir::{Expr, LabelId, ProcId, Stmt};
pub use splitter::Continuation;

use crate::Result;
use crate::project::TargetData;

/// A user-defined procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    /// Signature, e.g. `jump %s times`.
    pub proccode: String,
    /// Continuation that starts the body.
    pub entry: LabelId,
    /// Run without screen refresh.
    pub warp: bool,
    /// Parameter names in positional order.
    pub params: Vec<String>,
}

/// Events that start scripts.
///
/// Keyed events carry a normalized argument: message and backdrop names
/// are lowercased, key names go through [`normalize_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// The green flag.
    GreenFlag,
    /// A broadcast message.
    Message(String),
    /// A key press; `any` matches every key.
    KeyPressed(String),
    /// The stage switched to a backdrop.
    BackdropSwitched(String),
    /// The target was clicked.
    Clicked,
    /// A clone of the target was created.
    StartAsClone,
}

impl EventKey {
    /// A message event.
    pub fn message(name: &str) -> Self {
        EventKey::Message(name.to_lowercase())
    }

    /// A key event.
    pub fn key(name: &str) -> Self {
        EventKey::KeyPressed(normalize_key(name))
    }

    /// A backdrop event.
    pub fn backdrop(name: &str) -> Self {
        EventKey::BackdropSwitched(name.to_lowercase())
    }
}

/// Normalizes a key name: single characters and named keys lowercase,
/// `" "` to `space`.
pub fn normalize_key(name: &str) -> String {
    match name {
        " " => "space".to_string(),
        other => other.trim().to_lowercase(),
    }
}

/// Compiled scripts of one target, shared by its clones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptTable {
    /// Continuations indexed by label.
    pub continuations: Vec<Continuation>,
    /// Procedures indexed by [`ProcId`].
    pub procedures: Vec<Procedure>,
    /// Procedure lookup by signature.
    pub procedure_index: FxHashMap<String, ProcId>,
    /// Script entry points per event, in compile order.
    pub listeners: FxHashMap<EventKey, Vec<LabelId>>,
}

impl ScriptTable {
    /// Returns a continuation.
    pub fn continuation(&self, label: LabelId) -> Option<&Continuation> {
        self.continuations.get(label.index())
    }

    /// Returns a procedure.
    pub fn procedure(&self, id: ProcId) -> Option<&Procedure> {
        self.procedures.get(id.index())
    }

    /// Entry points listening for an event.
    pub fn listeners(&self, key: &EventKey) -> &[LabelId] {
        self.listeners.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of scripts (entry points) in the table.
    pub fn script_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum::<usize>() + self.procedures.len()
    }
}

/// Compiles one target. `stage` resolves global variables for sprites.
pub fn compile_target(target: &TargetData, stage: Option<&TargetData>) -> Result<ScriptTable> {
    let mut compiler = Compiler::new(target, stage);
    compiler.compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_keys_normalize() {
        assert_eq!(EventKey::message("Go Now"), EventKey::Message("go now".into()));
        assert_eq!(EventKey::key("A"), EventKey::KeyPressed("a".into()));
        assert_eq!(EventKey::key(" "), EventKey::KeyPressed("space".into()));
        assert_eq!(EventKey::backdrop("Night"), EventKey::backdrop("NIGHT"));
    }

    #[test]
    fn test_empty_table() {
        let table = ScriptTable::default();
        assert!(table.listeners(&EventKey::GreenFlag).is_empty());
        assert_eq!(table.script_count(), 0);
        assert!(table.continuation(LabelId(0)).is_none());
    }
}
