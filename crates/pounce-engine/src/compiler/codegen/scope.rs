//! Name resolution during compilation.
//!
//! Variables and lists resolve by declaration id first and by name second,
//! sprite declarations shadowing the stage's. Procedure parameters resolve
//! by name to their position in the current procedure.

use crate::compiler::ir::VarRef;
use crate::project::{Declaration, TargetData};
use std::collections::BTreeMap;

/// Which declaration table to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Variables
    Variable,
    /// Lists
    List,
}

impl Kind {
    fn table(self, target: &TargetData) -> &BTreeMap<String, Declaration> {
        match self {
            Kind::Variable => &target.variables,
            Kind::List => &target.lists,
        }
    }
}

/// Resolution scope for one target.
#[derive(Debug)]
pub struct Scope<'p> {
    /// The sprite being compiled; `None` when compiling the stage.
    sprite: Option<&'p TargetData>,
    /// The stage.
    stage: Option<&'p TargetData>,
    /// Parameters of the procedure being compiled.
    params: Vec<String>,
}

impl<'p> Scope<'p> {
    /// Creates a scope for `target`.
    pub fn new(target: &'p TargetData, stage: Option<&'p TargetData>) -> Self {
        if target.is_stage {
            Self { sprite: None, stage: Some(target), params: Vec::new() }
        } else {
            Self { sprite: Some(target), stage, params: Vec::new() }
        }
    }

    /// Enters a procedure body.
    pub fn begin_procedure(&mut self, params: Vec<String>) {
        self.params = params;
    }

    /// Leaves a procedure body.
    pub fn end_procedure(&mut self) {
        self.params.clear();
    }

    /// Resolves a parameter name to its position.
    pub fn argument(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    /// Resolves a variable or list reference.
    ///
    /// Undeclared names resolve to the stage, where they are created on
    /// first write.
    pub fn resolve(&self, kind: Kind, name: &str, id: Option<&str>) -> VarRef {
        if let Some(id) = id {
            if let Some(decl) = self.sprite.and_then(|s| kind.table(s).get(id)) {
                return VarRef::local(decl.name.clone());
            }
            if let Some(decl) = self.stage.and_then(|s| kind.table(s).get(id)) {
                return VarRef::global(decl.name.clone());
            }
        }
        if self.declares(self.sprite, kind, name) {
            return VarRef::local(name);
        }
        if !self.declares(self.stage, kind, name) {
            tracing::warn!(name, ?kind, "reference to undeclared name, using the stage");
        }
        VarRef::global(name)
    }

    fn declares(&self, target: Option<&TargetData>, kind: Kind, name: &str) -> bool {
        target.is_some_and(|t| kind.table(t).values().any(|d| d.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::VarScope;
    use serde_json::json;

    fn target(value: serde_json::Value) -> TargetData {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_resolve_by_id_then_name() {
        let stage = target(json!({
            "name": "Stage", "isStage": true,
            "variables": {"g1": ["score", 0]}
        }));
        let sprite = target(json!({
            "name": "Cat",
            "variables": {"l1": ["speed", 0]},
            "lists": {"q1": ["queue", []]}
        }));
        let scope = Scope::new(&sprite, Some(&stage));

        assert_eq!(scope.resolve(Kind::Variable, "renamed", Some("g1")), VarRef::global("score"));
        assert_eq!(scope.resolve(Kind::Variable, "speed", None).scope, VarScope::Target);
        assert_eq!(scope.resolve(Kind::List, "queue", Some("q1")), VarRef::local("queue"));
        assert_eq!(scope.resolve(Kind::Variable, "ghost", None), VarRef::global("ghost"));
    }

    #[test]
    fn test_stage_scope_is_global() {
        let stage = target(json!({
            "name": "Stage", "isStage": true,
            "variables": {"g1": ["score", 0]}
        }));
        let scope = Scope::new(&stage, None);
        assert_eq!(scope.resolve(Kind::Variable, "score", Some("g1")), VarRef::global("score"));
    }

    #[test]
    fn test_arguments() {
        let stage = target(json!({"name": "Stage", "isStage": true}));
        let mut scope = Scope::new(&stage, None);
        scope.begin_procedure(vec!["a".into(), "b".into()]);
        assert_eq!(scope.argument("b"), Some(1));
        scope.end_procedure();
        assert_eq!(scope.argument("b"), None);
    }
}
