//! Parsed project data.
//!
//! This is the block graph as it appears in a project's `project.json`:
//! targets with their declarations and a flat map of blocks linked by id.
//! Unpacking archives and fetching assets happens before this point.
//!
//! ## Input encoding
//!
//! | Form                        | Meaning                                  |
//! |-----------------------------|------------------------------------------|
//! | `[1, [4, "10"]]`            | literal in a shadow slot                 |
//! | `[1, "menu-id"]`            | shadow block (menus)                     |
//! | `[3, "block-id", [10, ""]]` | reporter covering a shadow               |
//! | `[2, "substack-id"]`        | substack or boolean slot                 |
//! | `[3, [12, "var", "id"], …]` | variable reporter primitive              |

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Error, Result};
use crate::runtime::value::{Value, is_blank, parse_number};

/// A whole project.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    /// The stage and every sprite, in layer order.
    pub targets: Vec<TargetData>,
}

impl Project {
    /// Parses `project.json` text.
    pub fn from_json(text: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(text)?;
        if !project.targets.iter().any(|t| t.is_stage) {
            return Err(Error::Project("project has no stage target".into()));
        }
        Ok(project)
    }

    /// True when the text looks like a project in this format.
    pub fn sniff(text: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(text)
            .map(|v| v.get("targets").is_some_and(|t| t.is_array()))
            .unwrap_or(false)
    }

    /// The stage target.
    pub fn stage(&self) -> Option<&TargetData> {
        self.targets.iter().find(|t| t.is_stage)
    }
}

/// One sprite or the stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetData {
    /// Whether this is the stage.
    #[serde(default)]
    pub is_stage: bool,
    /// Target name.
    pub name: String,
    /// Variable declarations keyed by id.
    #[serde(default)]
    pub variables: BTreeMap<String, Declaration>,
    /// List declarations keyed by id.
    #[serde(default)]
    pub lists: BTreeMap<String, Declaration>,
    /// Broadcast declarations keyed by id.
    #[serde(default)]
    pub broadcasts: BTreeMap<String, String>,
    /// Every block of the target keyed by id.
    #[serde(default)]
    pub blocks: BTreeMap<String, BlockEntry>,
    /// Costumes in order.
    #[serde(default)]
    pub costumes: Vec<Asset>,
    /// Sounds in order.
    #[serde(default)]
    pub sounds: Vec<Asset>,
    /// Current costume index.
    #[serde(default)]
    pub current_costume: usize,
    /// Volume in percent.
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Sprite x position.
    #[serde(default)]
    pub x: f64,
    /// Sprite y position.
    #[serde(default)]
    pub y: f64,
    /// Sprite size in percent.
    #[serde(default = "default_size")]
    pub size: f64,
    /// Sprite direction in degrees.
    #[serde(default = "default_direction")]
    pub direction: f64,
    /// Sprite visibility.
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Rotation style menu value.
    #[serde(default)]
    pub rotation_style: Option<String>,
}

fn default_volume() -> f64 {
    100.0
}

fn default_size() -> f64 {
    100.0
}

fn default_direction() -> f64 {
    90.0
}

fn default_visible() -> bool {
    true
}

impl TargetData {
    /// Looks up a block by id.
    pub fn block(&self, id: &str) -> Option<&Block> {
        match self.blocks.get(id)? {
            BlockEntry::Block(block) => Some(block),
            BlockEntry::Primitive(_) => None,
        }
    }

    /// Top-level blocks in id order.
    pub fn top_level(&self) -> impl Iterator<Item = (&str, &Block)> {
        self.blocks.iter().filter_map(|(id, entry)| match entry {
            BlockEntry::Block(b) if b.top_level => Some((id.as_str(), b)),
            _ => None,
        })
    }

    /// Costume names in order.
    pub fn costume_names(&self) -> Vec<String> {
        self.costumes.iter().map(|c| c.name.clone()).collect()
    }

    /// Sound names in order.
    pub fn sound_names(&self) -> Vec<String> {
        self.sounds.iter().map(|s| s.name.clone()).collect()
    }
}

/// A costume or sound, by name.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    /// Display name.
    pub name: String,
}

/// A variable or list declaration: `[name, value]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Vec<serde_json::Value>")]
pub struct Declaration {
    /// Declared name.
    pub name: String,
    /// Initial value; a JSON array for lists.
    pub value: serde_json::Value,
}

impl TryFrom<Vec<serde_json::Value>> for Declaration {
    type Error = String;

    fn try_from(parts: Vec<serde_json::Value>) -> std::result::Result<Self, String> {
        let mut parts = parts.into_iter();
        let name = match parts.next() {
            Some(serde_json::Value::String(name)) => name,
            other => return Err(format!("declaration name must be a string, got {other:?}")),
        };
        let value = parts.next().unwrap_or(serde_json::Value::from(0));
        Ok(Declaration { name, value })
    }
}

impl Declaration {
    /// The initial value of a variable.
    pub fn initial_value(&self) -> Value {
        Value::from_json(&self.value)
    }

    /// The initial contents of a list.
    pub fn initial_items(&self) -> Vec<Value> {
        match &self.value {
            serde_json::Value::Array(items) => items.iter().map(Value::from_json).collect(),
            _ => Vec::new(),
        }
    }
}

/// Entry of the block map. Top-level reporters may be stored compactly as
/// bare primitives, which never start a script.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BlockEntry {
    /// A regular block.
    Block(Block),
    /// A compact top-level primitive.
    Primitive(serde_json::Value),
}

/// A block in the graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Opcode tag.
    pub opcode: String,
    /// Next block in the stack.
    #[serde(default)]
    pub next: Option<String>,
    /// Enclosing block.
    #[serde(default)]
    pub parent: Option<String>,
    /// Input slots.
    #[serde(default)]
    pub inputs: BTreeMap<String, Input>,
    /// Static fields.
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    /// Whether this block is a shadow (menu or literal holder).
    #[serde(default)]
    pub shadow: bool,
    /// Whether the block starts a stack.
    #[serde(default)]
    pub top_level: bool,
    /// Procedure metadata for prototypes and calls.
    #[serde(default)]
    pub mutation: Option<Mutation>,
}

impl Block {
    /// Returns a field's value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }
}

/// A field: `[value]` or `[value, id]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Vec<serde_json::Value>")]
pub struct Field {
    /// Displayed value.
    pub value: String,
    /// Declaration id for variable, list and broadcast fields.
    pub id: Option<String>,
}

impl TryFrom<Vec<serde_json::Value>> for Field {
    type Error = String;

    fn try_from(parts: Vec<serde_json::Value>) -> std::result::Result<Self, String> {
        let mut parts = parts.into_iter();
        let value = match parts.next() {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => Value::from_json(&other).to_text(),
            None => return Err("empty field".into()),
        };
        let id = match parts.next() {
            Some(serde_json::Value::String(id)) => Some(id),
            _ => None,
        };
        Ok(Field { value, id })
    }
}

/// A decoded input slot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum Input {
    /// Nothing plugged in.
    Empty,
    /// A literal typed into the slot.
    Literal(Value),
    /// A broadcast menu literal.
    Broadcast(String),
    /// A block (reporter, shadow menu or substack) by id.
    Block(String),
    /// A variable reporter primitive.
    Variable {
        /// Variable name.
        name: String,
        /// Declaration id.
        id: Option<String>,
    },
    /// A list reporter primitive.
    List {
        /// List name.
        name: String,
        /// Declaration id.
        id: Option<String>,
    },
}

impl TryFrom<serde_json::Value> for Input {
    type Error = String;

    fn try_from(raw: serde_json::Value) -> std::result::Result<Self, String> {
        let parts = match raw {
            serde_json::Value::Array(parts) => parts,
            other => return Err(format!("input must be an array, got {other}")),
        };
        match parts.get(1) {
            None | Some(serde_json::Value::Null) => Ok(Input::Empty),
            Some(serde_json::Value::String(id)) => Ok(Input::Block(id.clone())),
            Some(serde_json::Value::Array(primitive)) => Input::from_primitive(primitive),
            Some(other) => Err(format!("unsupported input payload {other}")),
        }
    }
}

impl Input {
    /// Decodes `[code, value, id?]` primitives.
    fn from_primitive(primitive: &[serde_json::Value]) -> std::result::Result<Self, String> {
        let code = primitive
            .first()
            .and_then(|c| c.as_u64())
            .ok_or_else(|| "primitive without a type code".to_string())?;
        let value = primitive.get(1).map(Value::from_json).unwrap_or_default();
        let id = primitive.get(2).and_then(|v| v.as_str()).map(str::to_string);
        match code {
            // math_number, positive_number, whole_number, integer, angle
            4..=8 => Ok(Input::Literal(numeric_literal(value))),
            // colour_picker and text keep their text
            9 | 10 => Ok(Input::Literal(Value::String(value.to_text()))),
            11 => Ok(Input::Broadcast(value.to_text())),
            12 => Ok(Input::Variable { name: value.to_text(), id }),
            13 => Ok(Input::List { name: value.to_text(), id }),
            other => Err(format!("unknown primitive type {other}")),
        }
    }
}

/// Numeric slots hold text in the file. Text that is blank or not a number
/// is kept as typed; the consumer decides how to coerce it.
fn numeric_literal(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let n = parse_number(&s);
            if n.is_nan() || is_blank(&s) { Value::String(s) } else { Value::Number(n) }
        }
        other => other,
    }
}

/// Procedure signature attached to prototypes and calls.
///
/// Argument lists are JSON arrays encoded as strings, and `warp` may be a
/// string or a boolean depending on the exporter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mutation {
    /// Procedure signature, e.g. `jump %s times`.
    #[serde(default)]
    pub proccode: Option<String>,
    /// JSON array of argument ids.
    #[serde(default)]
    pub argumentids: Option<String>,
    /// JSON array of argument names.
    #[serde(default)]
    pub argumentnames: Option<String>,
    /// Run without screen refresh.
    #[serde(default)]
    pub warp: Option<serde_json::Value>,
}

impl Mutation {
    /// Argument ids in declaration order.
    pub fn argument_ids(&self) -> Vec<String> {
        decode_string_list(self.argumentids.as_deref())
    }

    /// Argument names in declaration order.
    pub fn argument_names(&self) -> Vec<String> {
        decode_string_list(self.argumentnames.as_deref())
    }

    /// Whether the procedure runs without screen refresh.
    pub fn is_warp(&self) -> bool {
        match &self.warp {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        }
    }
}

fn decode_string_list(encoded: Option<&str>) -> Vec<String> {
    encoded
        .and_then(|text| serde_json::from_str::<Vec<String>>(text).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_inputs() {
        let lit: Input = serde_json::from_value(json!([1, [4, "10"]])).unwrap();
        assert_eq!(lit, Input::Literal(Value::Number(10.0)));

        let text: Input = serde_json::from_value(json!([1, [10, "hello"]])).unwrap();
        assert_eq!(text, Input::Literal(Value::from("hello")));

        let odd: Input = serde_json::from_value(json!([1, [4, "abc"]])).unwrap();
        assert_eq!(odd, Input::Literal(Value::from("abc")));

        let block: Input = serde_json::from_value(json!([3, "b2", [10, ""]])).unwrap();
        assert_eq!(block, Input::Block("b2".into()));

        let var: Input = serde_json::from_value(json!([3, [12, "score", "v1"], [10, ""]])).unwrap();
        assert_eq!(var, Input::Variable { name: "score".into(), id: Some("v1".into()) });

        let msg: Input = serde_json::from_value(json!([1, [11, "go", "m1"]])).unwrap();
        assert_eq!(msg, Input::Broadcast("go".into()));

        let empty: Input = serde_json::from_value(json!([1, null])).unwrap();
        assert_eq!(empty, Input::Empty);
    }

    #[test]
    fn test_mutation_lists() {
        let m: Mutation = serde_json::from_value(json!({
            "proccode": "jump %s",
            "argumentids": "[\"a1\"]",
            "argumentnames": "[\"height\"]",
            "warp": "true"
        }))
        .unwrap();
        assert_eq!(m.argument_ids(), vec!["a1"]);
        assert_eq!(m.argument_names(), vec!["height"]);
        assert!(m.is_warp());
    }

    #[test]
    fn test_project_requires_stage() {
        let err = Project::from_json(r#"{"targets": [{"name": "Cat"}]}"#).unwrap_err();
        assert!(matches!(err, Error::Project(_)));
    }

    #[test]
    fn test_sniff() {
        assert!(Project::sniff(r#"{"targets": []}"#));
        assert!(!Project::sniff(r#"{"objName": "Stage"}"#));
        assert!(!Project::sniff("not json"));
    }

    #[test]
    fn test_primitive_top_level_block_is_skipped() {
        let target: TargetData = serde_json::from_value(json!({
            "name": "Stage",
            "isStage": true,
            "blocks": {
                "p": [12, "score", "v1", 10, 20],
                "h": {"opcode": "event_whenflagclicked", "topLevel": true}
            }
        }))
        .unwrap();
        let tops: Vec<_> = target.top_level().map(|(id, _)| id).collect();
        assert_eq!(tops, vec!["h"]);
    }
}
