//! Event dispatch.
//!
//! An event starts one thread per listening script. A script already
//! queued for the same target restarts in place instead of running twice.
//! Every thread an event starts carries the event's [`GroupId`], which
//! waiting broadcasts poll with [`Runtime::is_group_running`].

use rand::Rng;

use crate::compiler::EventKey;
use crate::compiler::ir::LabelId;
use crate::runtime::target::TargetId;
use crate::runtime::thread::{GroupId, Thread};
use crate::runtime::value::Value;
use crate::vm::scheduler::{Runtime, Slot};

impl Runtime {
    /// Starts every script listening for `event`: sprites in creation
    /// order, then the stage.
    pub fn trigger(&mut self, event: &EventKey) -> GroupId {
        let group = self.new_group();
        let mut order: Vec<TargetId> =
            self.targets().filter(|t| !t.is_stage()).map(|t| t.id).collect();
        order.push(self.stage);

        let mut started = 0;
        for id in order {
            started += self.start_listeners(id, event, group);
        }
        tracing::debug!(?event, %group, started, "dispatched event");
        group
    }

    /// Starts the scripts of one target listening for `event`.
    pub fn trigger_for(&mut self, target: TargetId, event: &EventKey) -> GroupId {
        let group = self.new_group();
        self.start_listeners(target, event, group);
        group
    }

    /// Stops everything, resets the timer and fires the green flag.
    pub fn green_flag(&mut self) -> GroupId {
        self.stop_all();
        self.reset_timer();
        self.trigger(&EventKey::GreenFlag)
    }

    /// Switches the backdrop and fires the matching backdrop event.
    pub fn switch_backdrop(&mut self, backdrop: &Value) -> GroupId {
        let rng = &mut self.rng;
        let name = match self.targets.get_mut(self.stage.index()).and_then(Option::as_mut) {
            Some(stage) => {
                stage.set_costume(backdrop, |n| rng.random_range(0..n));
                if let crate::runtime::TargetKind::Stage(state) = &mut stage.kind {
                    state.backdrop_switches += 1;
                }
                let name = stage.costume_name().to_string();
                self.host.costume_changed(&stage.name, &name);
                name
            }
            None => String::new(),
        };
        self.trigger(&EventKey::backdrop(&name))
    }

    /// Whether any queued thread still belongs to `group`.
    pub fn is_group_running(&self, group: GroupId) -> bool {
        self.running.is_some_and(|r| r.group == group && self.is_slot_running(r.slot))
            || self.threads().any(|t| t.group == group)
    }

    fn is_slot_running(&self, slot: usize) -> bool {
        matches!(self.queue.get(slot), Some(Slot::Running))
    }

    fn start_listeners(&mut self, target: TargetId, event: &EventKey, group: GroupId) -> usize {
        let Some(scripts) = self.target(target).map(|t| std::sync::Arc::clone(&t.scripts)) else {
            return 0;
        };
        let mut entries = scripts.listeners(event).to_vec();
        if let EventKey::KeyPressed(key) = event {
            if key != "any" {
                entries.extend_from_slice(scripts.listeners(&EventKey::key("any")));
            }
        }
        for &base in &entries {
            self.start_thread(target, base, group);
        }
        entries.len()
    }

    /// Starts a thread, restarting the queued one for the same script.
    fn start_thread(&mut self, target: TargetId, base: LabelId, group: GroupId) {
        let mut thread = Thread::new(target, base, group);
        let existing = (0..self.queue.len()).find(|&slot| self.occupant(slot) == Some((target, base)));
        match existing {
            Some(slot) => {
                if self.is_slot_running(slot) {
                    // Restarting itself: the fresh thread waits for the next
                    // pass and the current run stops after this statement.
                    thread.ready = false;
                }
                tracing::debug!(target_id = %target, %base, "restarted thread");
                self.queue[slot] = Slot::Thread(Box::new(thread));
            }
            None => {
                tracing::debug!(target_id = %target, %base, "started thread");
                self.queue.push(Slot::Thread(Box::new(thread)));
            }
        }
    }

    fn occupant(&self, slot: usize) -> Option<(TargetId, LabelId)> {
        match self.queue.get(slot)? {
            Slot::Thread(thread) => Some((thread.target, thread.base)),
            Slot::Running => {
                self.running.filter(|r| r.slot == slot).map(|r| (r.target, r.base))
            }
            Slot::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ScriptTable;
    use crate::config::PlayerOptions;
    use crate::project::Project;
    use crate::runtime::host::HeadlessHost;
    use rustc_hash::FxHashMap;
    use serde_json::json;

    fn runtime() -> Runtime {
        let project: Project = serde_json::from_value(json!({
            "targets": [
                {"name": "Stage", "isStage": true, "costumes": [{"name": "day"}, {"name": "night"}]},
                {"name": "Cat"},
                {"name": "Dog"}
            ]
        }))
        .unwrap();
        let listening = |labels: &[(EventKey, usize)]| {
            let mut listeners: FxHashMap<EventKey, Vec<LabelId>> = FxHashMap::default();
            for (key, label) in labels {
                listeners.entry(key.clone()).or_default().push(LabelId(*label));
            }
            ScriptTable { listeners, ..Default::default() }
        };
        let tables = vec![
            listening(&[(EventKey::message("go"), 0), (EventKey::backdrop("night"), 1)]),
            listening(&[(EventKey::message("go"), 0), (EventKey::key("any"), 1)]),
            listening(&[(EventKey::message("go"), 3), (EventKey::key("a"), 4)]),
        ];
        Runtime::new(&project, tables, PlayerOptions::default(), Box::new(HeadlessHost::new())).unwrap()
    }

    #[test]
    fn test_trigger_order_sprites_then_stage() {
        let mut rt = runtime();
        let group = rt.trigger(&EventKey::message("GO"));
        let owners: Vec<TargetId> = rt.threads().map(|t| t.target).collect();
        assert_eq!(owners, vec![TargetId(1), TargetId(2), TargetId(0)]);
        assert!(rt.threads().all(|t| t.group == group));
        assert!(rt.is_group_running(group));
    }

    #[test]
    fn test_retrigger_restarts_in_place() {
        let mut rt = runtime();
        let first = rt.trigger(&EventKey::message("go"));
        let second = rt.trigger(&EventKey::message("go"));
        assert_eq!(rt.thread_count(), 3);
        assert!(!rt.is_group_running(first));
        assert!(rt.is_group_running(second));
    }

    #[test]
    fn test_key_events_include_any() {
        let mut rt = runtime();
        rt.trigger(&EventKey::key("a"));
        let bases: Vec<usize> = rt.threads().map(|t| t.base.index()).collect();
        assert_eq!(bases, vec![1, 4]);
    }

    #[test]
    fn test_backdrop_switch_fires_listeners() {
        let mut rt = runtime();
        rt.switch_backdrop(&Value::from("night"));
        assert_eq!(rt.stage().map(|s| s.costume_name()), Some("night"));
        assert_eq!(rt.thread_count(), 1);
        rt.switch_backdrop(&Value::from("next backdrop"));
        assert_eq!(rt.stage().map(|s| s.costume_name()), Some("day"));
    }

    #[test]
    fn test_green_flag_clears_queue() {
        let mut rt = runtime();
        rt.trigger(&EventKey::message("go"));
        rt.green_flag();
        assert!(rt.is_idle());
    }
}
