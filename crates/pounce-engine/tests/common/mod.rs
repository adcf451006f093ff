//! Shared helpers for the integration tests.
//!
//! [`TargetBuilder`] assembles a target's block map from stacks of block
//! JSON, linking `next`/`parent` and handing out ids, so tests read as
//! scripts rather than as graphs.

#![allow(dead_code)]

use pounce_engine::{Engine, HeadlessHost, PlayerOptions, Project};
use serde_json::{Map, Value as Json, json};

/// Builds one target.
#[derive(Debug, Default)]
pub struct TargetBuilder {
    name: String,
    is_stage: bool,
    blocks: Map<String, Json>,
    variables: Map<String, Json>,
    lists: Map<String, Json>,
    costumes: Vec<Json>,
    sounds: Vec<Json>,
    extra: Map<String, Json>,
    next_id: usize,
}

impl TargetBuilder {
    /// A sprite.
    pub fn sprite(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    /// The stage.
    pub fn stage() -> Self {
        Self { name: "Stage".to_string(), is_stage: true, ..Default::default() }
    }

    /// Declares a variable whose id is its name.
    pub fn variable(mut self, name: &str, value: Json) -> Self {
        self.variables.insert(name.to_string(), json!([name, value]));
        self
    }

    /// Declares a list whose id is its name.
    pub fn list(mut self, name: &str, items: Json) -> Self {
        self.lists.insert(name.to_string(), json!([name, items]));
        self
    }

    /// Sets the costume (or backdrop) names.
    pub fn costumes(mut self, names: &[&str]) -> Self {
        self.costumes = names.iter().map(|n| json!({"name": n})).collect();
        self
    }

    /// Sets the sound names.
    pub fn sounds(mut self, names: &[&str]) -> Self {
        self.sounds = names.iter().map(|n| json!({"name": n})).collect();
        self
    }

    /// Sets any other target property, such as `x`.
    pub fn with(mut self, key: &str, value: Json) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Adds a detached block (a reporter or menu) and returns its id.
    pub fn add(&mut self, block: Json) -> String {
        let id = format!("b{}", self.next_id);
        self.next_id += 1;
        self.blocks.insert(id.clone(), block);
        id
    }

    /// Adds blocks linked by `next` and returns the id of the first.
    pub fn stack(&mut self, blocks: Vec<Json>) -> Option<String> {
        let ids: Vec<String> = blocks.into_iter().map(|b| self.add(b)).collect();
        for pair in ids.windows(2) {
            self.set(&pair[0], "next", json!(pair[1]));
            self.set(&pair[1], "parent", json!(pair[0]));
        }
        ids.first().cloned()
    }

    /// Adds a hat followed by a stack.
    pub fn script(&mut self, mut hat: Json, body: Vec<Json>) -> &mut Self {
        let first = self.stack(body);
        hat["topLevel"] = json!(true);
        hat["next"] = json!(first);
        self.add(hat);
        self
    }

    /// Adds a procedure definition with string/number parameters.
    pub fn procedure(&mut self, proccode: &str, params: &[&str], warp: bool, body: Vec<Json>) -> &mut Self {
        let ids: Vec<String> = params.iter().map(|p| format!("{proccode}:{p}")).collect();
        let prototype = self.add(json!({
            "opcode": "procedures_prototype",
            "shadow": true,
            "mutation": {
                "proccode": proccode,
                "argumentids": serde_json::to_string(&ids).unwrap(),
                "argumentnames": serde_json::to_string(params).unwrap(),
                "warp": if warp { "true" } else { "false" }
            }
        }));
        self.script(
            json!({"opcode": "procedures_definition", "inputs": {"custom_block": [1, prototype]}}),
            body,
        )
    }

    /// A call to a procedure declared with [`TargetBuilder::procedure`].
    pub fn call(&mut self, proccode: &str, params: &[&str], args: Vec<Json>) -> Json {
        let ids: Vec<String> = params.iter().map(|p| format!("{proccode}:{p}")).collect();
        let inputs: Map<String, Json> = ids.iter().cloned().zip(args).collect();
        json!({
            "opcode": "procedures_call",
            "inputs": inputs,
            "mutation": {"proccode": proccode, "argumentids": serde_json::to_string(&ids).unwrap()}
        })
    }

    /// An argument reporter input.
    pub fn arg(&mut self, name: &str) -> Json {
        let id = self.add(json!({
            "opcode": "argument_reporter_string_number",
            "fields": {"VALUE": [name, null]}
        }));
        json!([3, id, [10, ""]])
    }

    /// A reporter block plugged into an input.
    pub fn reporter(&mut self, block: Json) -> Json {
        let id = self.add(block);
        json!([3, id, [10, ""]])
    }

    /// A boolean block plugged into a condition.
    pub fn condition(&mut self, block: Json) -> Json {
        let id = self.add(block);
        json!([2, id])
    }

    /// `touching (object)?` as a condition.
    pub fn touching(&mut self, object: &str) -> Json {
        let menu = self.add(json!({
            "opcode": "sensing_touchingobjectmenu",
            "shadow": true,
            "fields": {"TOUCHINGOBJECTMENU": [object, null]}
        }));
        self.condition(json!({"opcode": "sensing_touchingobject", "inputs": {"TOUCHINGOBJECTMENU": [1, menu]}}))
    }

    /// The target as project JSON.
    pub fn build(&self) -> Json {
        let mut target = json!({
            "name": self.name,
            "isStage": self.is_stage,
            "blocks": self.blocks,
            "variables": self.variables,
            "lists": self.lists,
            "costumes": self.costumes,
            "sounds": self.sounds,
        });
        for (key, value) in &self.extra {
            target[key] = value.clone();
        }
        target
    }

    fn set(&mut self, id: &str, key: &str, value: Json) {
        if let Some(block) = self.blocks.get_mut(id) {
            block[key] = value;
        }
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// A number literal input.
pub fn num(n: f64) -> Json {
    json!([1, [4, n.to_string()]])
}

/// A text literal input.
pub fn text(s: &str) -> Json {
    json!([1, [10, s]])
}

/// A substack input.
pub fn substack(first: Option<String>) -> Json {
    json!([2, first])
}

pub fn when_flag() -> Json {
    json!({"opcode": "event_whenflagclicked"})
}

pub fn when_received(message: &str) -> Json {
    json!({"opcode": "event_whenbroadcastreceived", "fields": {"BROADCAST_OPTION": [message, message]}})
}

pub fn when_key(key: &str) -> Json {
    json!({"opcode": "event_whenkeypressed", "fields": {"KEY_OPTION": [key, null]}})
}

pub fn when_clone() -> Json {
    json!({"opcode": "control_start_as_clone"})
}

pub fn when_backdrop(name: &str) -> Json {
    json!({"opcode": "event_whenbackdropswitchesto", "fields": {"BACKDROP": [name, null]}})
}

pub fn set_var(name: &str, value: Json) -> Json {
    json!({"opcode": "data_setvariableto", "inputs": {"VALUE": value}, "fields": {"VARIABLE": [name, name]}})
}

pub fn change_var(name: &str, by: f64) -> Json {
    json!({"opcode": "data_changevariableby", "inputs": {"VALUE": num(by)}, "fields": {"VARIABLE": [name, name]}})
}

pub fn add_to_list(list: &str, item: Json) -> Json {
    json!({"opcode": "data_addtolist", "inputs": {"ITEM": item}, "fields": {"LIST": [list, list]}})
}

pub fn broadcast(message: &str) -> Json {
    json!({"opcode": "event_broadcast", "inputs": {"BROADCAST_INPUT": [1, [11, message, message]]}})
}

pub fn broadcast_and_wait(message: &str) -> Json {
    json!({"opcode": "event_broadcastandwait", "inputs": {"BROADCAST_INPUT": [1, [11, message, message]]}})
}

pub fn repeat(times: f64, body: Option<String>) -> Json {
    json!({"opcode": "control_repeat", "inputs": {"TIMES": num(times), "SUBSTACK": substack(body)}})
}

pub fn forever(body: Option<String>) -> Json {
    json!({"opcode": "control_forever", "inputs": {"SUBSTACK": substack(body)}})
}

pub fn if_then(condition: Json, body: Option<String>) -> Json {
    json!({"opcode": "control_if", "inputs": {"CONDITION": condition, "SUBSTACK": substack(body)}})
}

pub fn wait(seconds: f64) -> Json {
    json!({"opcode": "control_wait", "inputs": {"DURATION": num(seconds)}})
}

pub fn stop(option: &str) -> Json {
    json!({"opcode": "control_stop", "fields": {"STOP_OPTION": [option, null]}})
}

pub fn move_steps(steps: f64) -> Json {
    json!({"opcode": "motion_movesteps", "inputs": {"STEPS": num(steps)}})
}

pub fn say(message: Json) -> Json {
    json!({"opcode": "looks_say", "inputs": {"MESSAGE": message}})
}

pub fn ask(question: &str) -> Json {
    json!({"opcode": "sensing_askandwait", "inputs": {"QUESTION": text(question)}})
}

pub fn create_clone_of_myself() -> Json {
    json!({"opcode": "control_create_clone_of", "inputs": {"CLONE_OPTION": [1, [10, "_myself_"]]}})
}

pub fn delete_this_clone() -> Json {
    json!({"opcode": "control_delete_this_clone"})
}

pub fn switch_backdrop_and_wait(name: &str) -> Json {
    json!({"opcode": "looks_switchbackdroptoandwait", "inputs": {"BACKDROP": text(name)}})
}

// ============================================================================
// Engines
// ============================================================================

/// A project from built targets.
pub fn project(targets: &[&TargetBuilder]) -> Project {
    let targets: Vec<Json> = targets.iter().map(|t| t.build()).collect();
    serde_json::from_value(json!({ "targets": targets })).expect("valid project")
}

/// A deterministic engine and a handle to its host.
pub fn engine(targets: &[&TargetBuilder]) -> (Engine, HeadlessHost) {
    engine_with(targets, PlayerOptions { seed: Some(7), ..Default::default() })
}

/// An engine with explicit options and a handle to its host.
pub fn engine_with(targets: &[&TargetBuilder], options: PlayerOptions) -> (Engine, HeadlessHost) {
    let host = HeadlessHost::new();
    let engine = Engine::new(&project(targets), options, Box::new(host.clone())).expect("project loads");
    (engine, host)
}

/// A stage variable as a number.
pub fn stage_number(engine: &Engine, name: &str) -> f64 {
    engine.variable(None, name).map(|v| v.to_number()).unwrap_or(f64::NAN)
}

/// Steps `frames` frames.
pub fn steps(engine: &mut Engine, frames: usize) {
    for _ in 0..frames {
        engine.step().expect("frame runs");
    }
}
