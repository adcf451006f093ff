//! Stage and sprites.
//!
//! A [`Target`] owns its variables, lists and looks state. The compiled
//! [`ScriptTable`] and the asset name lists are shared behind `Arc`s, so a
//! clone copies only mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use pounce_macros::id_type;

use crate::compiler::ScriptTable;
use crate::compiler::ir::{Effect, RotationStyle};
use crate::project::TargetData;
use crate::runtime::host::{STAGE_HALF_HEIGHT, STAGE_HALF_WIDTH};
use crate::runtime::value::Value;

id_type! {
    /// Index of a target in the runtime's target table.
    pub TargetId(usize) => "#"
}

/// State only the stage has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageState {
    /// Backdrop switches since the green flag.
    pub backdrop_switches: u64,
}

/// State only sprites have.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteState {
    /// Position.
    pub x: f64,
    /// Position.
    pub y: f64,
    /// Degrees, clockwise from up, in (-180, 180].
    pub direction: f64,
    /// Percent.
    pub size: f64,
    /// Shown or hidden.
    pub visible: bool,
    /// How direction affects drawing.
    pub rotation_style: RotationStyle,
    /// Pen state.
    pub pen: PenState,
    /// The sprite this clone was made from, if it is a clone.
    pub clone_of: Option<TargetId>,
}

/// Pen state of a sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct PenState {
    /// Drawing while moving.
    pub down: bool,
    /// 24-bit RGB.
    pub color: u32,
    /// Diameter.
    pub size: f64,
}

impl Default for PenState {
    fn default() -> Self {
        Self { down: false, color: 0x0000ff, size: 1.0 }
    }
}

/// Stage or sprite.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetKind {
    /// The stage.
    Stage(StageState),
    /// A sprite or clone.
    Sprite(SpriteState),
}

/// A runtime target.
#[derive(Debug, Clone)]
pub struct Target {
    /// Slot in the target table.
    pub id: TargetId,
    /// Name; clones keep their original's.
    pub name: String,
    /// Stage or sprite state.
    pub kind: TargetKind,
    /// Variables by name.
    pub variables: BTreeMap<String, Value>,
    /// Lists by name.
    pub lists: BTreeMap<String, Vec<Value>>,
    /// Compiled scripts, shared with clones.
    pub scripts: Arc<ScriptTable>,
    /// Costume (or backdrop) names.
    pub costumes: Arc<[String]>,
    /// Sound names.
    pub sounds: Arc<[String]>,
    /// 0-based costume index.
    pub costume: usize,
    /// Volume in percent.
    pub volume: f64,
    /// Graphic effect values.
    pub effects: [f64; Effect::ALL.len()],
}

impl Target {
    /// Builds a target from its project data and compiled scripts.
    pub fn new(id: TargetId, data: &TargetData, scripts: Arc<ScriptTable>) -> Self {
        let kind = if data.is_stage {
            TargetKind::Stage(StageState::default())
        } else {
            TargetKind::Sprite(SpriteState {
                x: data.x,
                y: data.y,
                direction: wrap_direction(data.direction),
                size: data.size,
                visible: data.visible,
                rotation_style: data
                    .rotation_style
                    .as_deref()
                    .and_then(RotationStyle::parse)
                    .unwrap_or(RotationStyle::AllAround),
                pen: PenState::default(),
                clone_of: None,
            })
        };
        let costumes: Arc<[String]> = data.costume_names().into();
        Self {
            id,
            name: data.name.clone(),
            kind,
            variables: data
                .variables
                .values()
                .map(|d| (d.name.clone(), d.initial_value()))
                .collect(),
            lists: data.lists.values().map(|d| (d.name.clone(), d.initial_items())).collect(),
            scripts,
            costume: data.current_costume.min(costumes.len().saturating_sub(1)),
            costumes,
            sounds: data.sound_names().into(),
            volume: data.volume,
            effects: [0.0; Effect::ALL.len()],
        }
    }

    /// Copies a sprite's mutable state into a new clone. The stage cannot be
    /// cloned.
    pub fn make_clone(&self, id: TargetId) -> Option<Self> {
        let TargetKind::Sprite(sprite) = &self.kind else {
            return None;
        };
        let mut sprite = sprite.clone();
        sprite.clone_of = Some(self.id);
        Some(Self {
            id,
            name: self.name.clone(),
            kind: TargetKind::Sprite(sprite),
            variables: self.variables.clone(),
            lists: self.lists.clone(),
            scripts: Arc::clone(&self.scripts),
            costumes: Arc::clone(&self.costumes),
            sounds: Arc::clone(&self.sounds),
            costume: self.costume,
            volume: self.volume,
            effects: self.effects,
        })
    }

    /// Whether this is the stage.
    pub fn is_stage(&self) -> bool {
        matches!(self.kind, TargetKind::Stage(_))
    }

    /// Whether this is a clone.
    pub fn is_clone(&self) -> bool {
        self.sprite().is_some_and(|s| s.clone_of.is_some())
    }

    /// Sprite state, if this is a sprite.
    pub fn sprite(&self) -> Option<&SpriteState> {
        match &self.kind {
            TargetKind::Sprite(s) => Some(s),
            TargetKind::Stage(_) => None,
        }
    }

    /// Mutable sprite state, if this is a sprite.
    pub fn sprite_mut(&mut self) -> Option<&mut SpriteState> {
        match &mut self.kind {
            TargetKind::Sprite(s) => Some(s),
            TargetKind::Stage(_) => None,
        }
    }

    /// Whether a change to this target shows on screen.
    pub fn is_visible(&self) -> bool {
        match &self.kind {
            TargetKind::Stage(_) => true,
            TargetKind::Sprite(s) => s.visible,
        }
    }

    // ========================================================================
    // Costumes
    // ========================================================================

    /// Current costume name.
    pub fn costume_name(&self) -> &str {
        self.costumes.get(self.costume).map(String::as_str).unwrap_or("")
    }

    /// Switches costume by value: a name, a 1-based number (wrapping), or
    /// for the stage `next backdrop`, `previous backdrop` and
    /// `random backdrop`. Returns whether the costume changed.
    pub fn set_costume(&mut self, value: &Value, random: impl FnOnce(usize) -> usize) -> bool {
        let count = self.costumes.len();
        if count == 0 {
            return false;
        }
        let before = self.costume;
        match value {
            Value::Number(n) => self.set_costume_number(*n),
            other => {
                let text = other.to_text();
                if let Some(i) = self.costumes.iter().position(|c| *c == text) {
                    self.costume = i;
                } else if self.is_stage() && text == "next backdrop" {
                    self.costume = (self.costume + 1) % count;
                } else if self.is_stage() && text == "previous backdrop" {
                    self.costume = (self.costume + count - 1) % count;
                } else if self.is_stage() && text == "random backdrop" {
                    if count > 1 {
                        // Never the current one.
                        let pick = random(count - 1);
                        self.costume = if pick >= self.costume { pick + 1 } else { pick };
                    }
                } else if !crate::runtime::value::is_blank(&text) {
                    let n = crate::runtime::value::parse_number(&text);
                    if !n.is_nan() {
                        self.set_costume_number(n);
                    }
                }
            }
        }
        self.costume != before
    }

    fn set_costume_number(&mut self, n: f64) {
        let count = self.costumes.len() as f64;
        if !n.is_finite() || count == 0.0 {
            return;
        }
        let index = (n.round() - 1.0).rem_euclid(count);
        self.costume = index as usize;
    }

    /// Advances to the next costume, wrapping.
    pub fn next_costume(&mut self) {
        if !self.costumes.is_empty() {
            self.costume = (self.costume + 1) % self.costumes.len();
        }
    }

    // ========================================================================
    // Variables and lists
    // ========================================================================

    /// Reads a variable; undeclared variables read as 0.
    pub fn variable(&self, name: &str) -> Value {
        self.variables.get(name).cloned().unwrap_or_default()
    }

    /// Writes a variable, declaring it if needed.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        match self.variables.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.variables.insert(name.to_string(), value);
            }
        }
    }

    /// A list, declaring it if needed.
    pub fn list_mut(&mut self, name: &str) -> &mut Vec<Value> {
        self.lists.entry(name.to_string()).or_default()
    }

    /// A list, if declared.
    pub fn list(&self, name: &str) -> Option<&Vec<Value>> {
        self.lists.get(name)
    }

    // ========================================================================
    // Looks and motion
    // ========================================================================

    /// Current value of a graphic effect.
    pub fn effect(&self, effect: Effect) -> f64 {
        self.effects[effect as usize]
    }

    /// Sets a graphic effect, clamping where the effect has a range.
    pub fn set_effect(&mut self, effect: Effect, value: f64) {
        let value = match effect {
            Effect::Ghost => value.clamp(0.0, 100.0),
            Effect::Brightness => value.clamp(-100.0, 100.0),
            _ => value,
        };
        self.effects[effect as usize] = value;
    }

    /// Sets the volume, clamped to 0..=100.
    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 100.0);
    }
}

impl SpriteState {
    /// Moves to a point, clamped so the sprite stays near the stage.
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.x = x.clamp(-STAGE_HALF_WIDTH * 2.0, STAGE_HALF_WIDTH * 2.0);
        self.y = y.clamp(-STAGE_HALF_HEIGHT * 2.0, STAGE_HALF_HEIGHT * 2.0);
    }

    /// Sets the direction, wrapped to (-180, 180].
    pub fn set_direction(&mut self, degrees: f64) {
        if degrees.is_finite() {
            self.direction = wrap_direction(degrees);
        }
    }

    /// Sets the size, clamped to 5..=535 percent.
    pub fn set_size(&mut self, size: f64) {
        self.size = size.clamp(5.0, 535.0);
    }

    /// Bounces off the stage edge: reflects the direction and pulls the
    /// sprite back inside.
    pub fn bounce(&mut self) {
        let radians = (90.0 - self.direction).to_radians();
        let (mut dx, mut dy) = (radians.cos(), radians.sin());
        let mut hit = false;
        if self.x.abs() >= STAGE_HALF_WIDTH {
            dx = -dx.abs() * self.x.signum();
            self.x = STAGE_HALF_WIDTH.copysign(self.x);
            hit = true;
        }
        if self.y.abs() >= STAGE_HALF_HEIGHT {
            dy = -dy.abs() * self.y.signum();
            self.y = STAGE_HALF_HEIGHT.copysign(self.y);
            hit = true;
        }
        if hit {
            self.set_direction(90.0 - dy.atan2(dx).to_degrees());
        }
    }
}

/// Wraps degrees into (-180, 180].
pub fn wrap_direction(degrees: f64) -> f64 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sprite() -> Target {
        let data: TargetData = serde_json::from_value(json!({
            "name": "Cat",
            "variables": {"v": ["speed", 3]},
            "lists": {"l": ["bag", [1, "two"]]},
            "costumes": [{"name": "a"}, {"name": "b"}, {"name": "c"}],
            "x": 10, "y": -5, "direction": 270
        }))
        .unwrap();
        Target::new(TargetId(1), &data, Arc::default())
    }

    #[test]
    fn test_from_project_data() {
        let cat = sprite();
        assert_eq!(cat.variable("speed"), Value::Number(3.0));
        assert_eq!(cat.list("bag").map(Vec::len), Some(2));
        let s = cat.sprite().unwrap();
        assert_eq!((s.x, s.y, s.direction), (10.0, -5.0, -90.0));
        assert_eq!(cat.variable("missing"), Value::Number(0.0));
    }

    #[test]
    fn test_clone_copies_state() {
        let mut cat = sprite();
        cat.set_variable("speed", Value::from(9.0));
        let clone = cat.make_clone(TargetId(2)).unwrap();
        assert!(clone.is_clone());
        assert_eq!(clone.variable("speed"), Value::Number(9.0));
        assert!(Arc::ptr_eq(&clone.scripts, &cat.scripts));
        cat.set_variable("speed", Value::from(1.0));
        assert_eq!(clone.variable("speed"), Value::Number(9.0));
    }

    #[test]
    fn test_costume_switching() {
        let mut cat = sprite();
        assert!(cat.set_costume(&Value::from("c"), |_| 0));
        assert_eq!(cat.costume_name(), "c");
        cat.set_costume(&Value::Number(4.0), |_| 0);
        assert_eq!(cat.costume_name(), "a");
        cat.set_costume(&Value::Number(0.0), |_| 0);
        assert_eq!(cat.costume_name(), "c");
        assert!(!cat.set_costume(&Value::from("nope"), |_| 0));
        cat.next_costume();
        assert_eq!(cat.costume_name(), "a");
    }

    #[test]
    fn test_wrap_direction() {
        assert_eq!(wrap_direction(180.0), 180.0);
        assert_eq!(wrap_direction(-180.0), 180.0);
        assert_eq!(wrap_direction(270.0), -90.0);
        assert_eq!(wrap_direction(90.0), 90.0);
    }

    #[test]
    fn test_bounce_reflects() {
        let mut s = sprite().sprite().unwrap().clone();
        s.x = 250.0;
        s.direction = 90.0;
        s.bounce();
        assert_eq!(s.x, 240.0);
        assert!((s.direction + 90.0).abs() < 1e-9);
    }
}
