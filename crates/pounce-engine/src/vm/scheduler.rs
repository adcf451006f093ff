//! Frame scheduler.
//!
//! The queue holds one [`Slot`] per live thread. A frame (`step`) walks the
//! queue in order, lending each ready thread to the interpreter until it
//! finishes or re-queues itself. Threads started mid-pass wait for the next
//! pass; a pass that started threads is followed by another one while the
//! frame budget lasts, unless something visible changed.

use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::compiler::ScriptTable;
use crate::compiler::ir::LabelId;
use crate::config::PlayerOptions;
use crate::project::Project;
use crate::runtime::host::Host;
use crate::runtime::target::{Target, TargetId};
use crate::runtime::thread::{GroupId, Thread};
use crate::vm::interpreter::{ExecutionContext, Outcome};
use crate::{Error, Result};

/// Calls to a procedure already among this many innermost frames defer to
/// the next frame when the screen changed.
pub const RECURSION_WINDOW: usize = 5;

/// A queue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// A finished or stopped thread, removed at the end of the pass.
    Empty,
    /// A waiting thread.
    Thread(Box<Thread>),
    /// The thread lent to the interpreter.
    Running,
}

/// The thread currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunningThread {
    pub slot: usize,
    pub target: TargetId,
    pub base: LabelId,
    pub group: GroupId,
}

/// Source of the runtime clock read by timers and timed waits.
#[derive(Debug, Clone)]
pub enum Clock {
    /// Advances by a fixed step after every frame.
    Fixed {
        /// Seconds since start.
        now: f64,
        /// Seconds per frame.
        step: f64,
    },
    /// Wall-clock time.
    RealTime {
        /// When the clock started.
        origin: Instant,
    },
}

impl Clock {
    /// A clock advancing `step` seconds per frame.
    pub fn fixed(step: f64) -> Self {
        Clock::Fixed { now: 0.0, step }
    }

    /// A wall clock starting now.
    pub fn real_time() -> Self {
        Clock::RealTime { origin: Instant::now() }
    }

    /// Seconds since the clock started.
    pub fn now(&self) -> f64 {
        match self {
            Clock::Fixed { now, .. } => *now,
            Clock::RealTime { origin } => origin.elapsed().as_secs_f64(),
        }
    }

    fn advance(&mut self) {
        if let Clock::Fixed { now, step } = self {
            *now += *step;
        }
    }
}

/// Targets, threads and the state they share.
pub struct Runtime {
    /// Target table; deleted clones leave `None` until the slot is reused.
    pub(crate) targets: Vec<Option<Target>>,
    /// Live target ids in creation order.
    order: Vec<TargetId>,
    /// Table slots freed by deleted clones.
    free: Vec<TargetId>,
    pub(crate) stage: TargetId,
    pub(crate) queue: Vec<Slot>,
    pub(crate) running: Option<RunningThread>,
    pub(crate) options: PlayerOptions,
    pub(crate) host: Box<dyn Host>,
    pub(crate) clock: Clock,
    pub(crate) timer_origin: f64,
    pub(crate) answer: String,
    pub(crate) rng: StdRng,
    next_group: GroupId,
    /// Set when a visible change happened this pass.
    pub(crate) visual: bool,
    pub(crate) clones: usize,
    frame: u64,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("targets", &self.targets.len())
            .field("queue", &self.queue.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Creates a runtime from a project and one compiled table per target,
    /// in project order.
    pub fn new(
        project: &Project,
        tables: Vec<ScriptTable>,
        options: PlayerOptions,
        host: Box<dyn Host>,
    ) -> Result<Self> {
        if tables.len() != project.targets.len() {
            return Err(Error::Internal(format!(
                "{} script tables for {} targets",
                tables.len(),
                project.targets.len()
            )));
        }
        let targets: Vec<Option<Target>> = project
            .targets
            .iter()
            .zip(tables)
            .enumerate()
            .map(|(i, (data, table))| Some(Target::new(TargetId(i), data, Arc::new(table))))
            .collect();
        let stage = targets
            .iter()
            .flatten()
            .find(|t| t.is_stage())
            .map(|t| t.id)
            .ok_or_else(|| Error::Project("project has no stage target".into()))?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let order = targets.iter().flatten().map(|t| t.id).collect();

        Ok(Self {
            targets,
            order,
            free: Vec::new(),
            stage,
            queue: Vec::new(),
            running: None,
            clock: Clock::fixed(options.frame_seconds()),
            options,
            host,
            timer_origin: 0.0,
            answer: String::new(),
            rng,
            next_group: GroupId(0),
            visual: false,
            clones: 0,
            frame: 0,
        })
    }

    /// Replaces the clock.
    pub fn set_clock(&mut self, clock: Clock) {
        self.timer_origin = clock.now();
        self.clock = clock;
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Runs one frame.
    pub fn step(&mut self) -> Result<()> {
        let started = Instant::now();
        let budget = self.options.frame_budget();
        loop {
            self.visual = false;
            let len = self.queue.len();
            for slot in 0..len {
                let Some(thread) = self.take_ready(slot) else {
                    continue;
                };
                self.execute(slot, thread)?;
            }
            let appended = self.queue.len() > len;
            self.end_pass();

            let again = appended
                && !self.options.turbo
                && !self.visual
                && started.elapsed() < budget;
            if !again {
                break;
            }
        }
        self.clock.advance();
        self.frame += 1;
        Ok(())
    }

    /// Frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn take_ready(&mut self, slot: usize) -> Option<Box<Thread>> {
        let entry = self.queue.get_mut(slot)?;
        if !matches!(entry, Slot::Thread(thread) if thread.ready) {
            return None;
        }
        match std::mem::replace(entry, Slot::Running) {
            Slot::Thread(thread) => Some(thread),
            other => {
                *entry = other;
                None
            }
        }
    }

    fn execute(&mut self, slot: usize, mut thread: Box<Thread>) -> Result<()> {
        self.running = Some(RunningThread {
            slot,
            target: thread.target,
            base: thread.base,
            group: thread.group,
        });
        let outcome = ExecutionContext::new(self, &mut thread, slot).and_then(|mut cx| cx.run());
        self.running = None;

        let still_running = matches!(self.queue.get(slot), Some(Slot::Running));
        match outcome {
            Ok(Outcome::Yielded) if still_running => {
                self.queue[slot] = Slot::Thread(thread);
            }
            Ok(Outcome::Finished) if still_running => {
                tracing::debug!(target_id = %thread.target, base = %thread.base, "thread finished");
                self.queue[slot] = Slot::Empty;
            }
            Ok(_) => {}
            Err(err) => {
                if still_running {
                    self.queue[slot] = Slot::Empty;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Marks deferred threads ready and drops empty slots.
    fn end_pass(&mut self) {
        self.queue.retain_mut(|slot| match slot {
            Slot::Thread(thread) => {
                thread.ready = true;
                true
            }
            Slot::Empty | Slot::Running => false,
        });
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Whether no thread is queued.
    pub fn is_idle(&self) -> bool {
        !self.queue.iter().any(|s| matches!(s, Slot::Thread(_) | Slot::Running))
    }

    /// Queued threads.
    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.queue.iter().filter_map(|slot| match slot {
            Slot::Thread(thread) => Some(thread.as_ref()),
            _ => None,
        })
    }

    /// Number of queued threads.
    pub fn thread_count(&self) -> usize {
        self.threads().count()
    }

    /// Stops every thread, deletes every clone and silences the host.
    pub fn stop_all(&mut self) {
        if self.running.is_some() {
            self.queue.iter_mut().for_each(|slot| *slot = Slot::Empty);
        } else {
            self.queue.clear();
        }
        for entry in &mut self.targets {
            if entry.as_ref().is_some_and(Target::is_clone) {
                *entry = None;
            }
        }
        // Originals sit at the front, so this drops every clone slot.
        while matches!(self.targets.last(), Some(None)) {
            self.targets.pop();
        }
        self.free.clear();
        let targets = &self.targets;
        self.order.retain(|id| targets.get(id.index()).is_some_and(Option::is_some));
        self.clones = 0;
        self.host.stop_sounds();
        tracing::debug!("stopped all threads");
    }

    /// Stops every thread of `target` except the one in `keep`.
    pub fn stop_target(&mut self, target: TargetId, keep: Option<usize>) {
        let running = self.running;
        for (i, slot) in self.queue.iter_mut().enumerate() {
            if Some(i) == keep {
                continue;
            }
            let owner = match slot {
                Slot::Thread(thread) => Some(thread.target),
                Slot::Running => running.filter(|r| r.slot == i).map(|r| r.target),
                Slot::Empty => None,
            };
            if owner == Some(target) {
                *slot = Slot::Empty;
            }
        }
    }

    /// Drops every queued thread.
    pub fn halt(&mut self) {
        self.queue.clear();
        self.running = None;
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// A live target.
    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id.index()).and_then(Option::as_ref)
    }

    /// A live target, mutably.
    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Live targets in creation order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.order.iter().filter_map(move |id| self.target(*id))
    }

    /// Number of slots in the target table, live or free.
    pub fn table_len(&self) -> usize {
        self.targets.len()
    }

    /// The stage.
    pub fn stage(&self) -> Option<&Target> {
        self.target(self.stage)
    }

    /// The stage, mutably.
    pub fn stage_mut(&mut self) -> Option<&mut Target> {
        let stage = self.stage;
        self.target_mut(stage)
    }

    /// The original (non-clone) sprite or the stage with this name.
    pub fn find(&self, name: &str) -> Option<&Target> {
        self.targets().find(|t| t.name == name && !t.is_clone())
    }

    /// Clones `of`, starting its clone scripts. Returns `None` at the
    /// clone limit or for the stage.
    pub fn create_clone(&mut self, of: TargetId) -> Option<TargetId> {
        if self.clones >= self.options.max_clones {
            tracing::warn!(limit = self.options.max_clones, "clone limit reached");
            return None;
        }
        let id = self.free.last().copied().unwrap_or(TargetId(self.targets.len()));
        let clone = self.target(of)?.make_clone(id)?;
        match self.free.pop() {
            Some(reused) => self.targets[reused.index()] = Some(clone),
            None => self.targets.push(Some(clone)),
        }
        self.order.push(id);
        self.clones += 1;
        tracing::debug!(clone = %id, of = %of, "created clone");
        self.trigger_for(id, &crate::compiler::EventKey::StartAsClone);
        Some(id)
    }

    /// Deletes a clone and its threads. Originals are never deleted.
    pub fn delete_clone(&mut self, id: TargetId) -> bool {
        if !self.target(id).is_some_and(Target::is_clone) {
            return false;
        }
        self.stop_target(id, None);
        self.targets[id.index()] = None;
        self.free.push(id);
        self.order.retain(|t| *t != id);
        self.clones -= 1;
        tracing::debug!(clone = %id, "deleted clone");
        true
    }

    // ========================================================================
    // Timer and groups
    // ========================================================================

    /// Seconds on the runtime clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Seconds since the timer was reset.
    pub fn timer(&self) -> f64 {
        self.clock.now() - self.timer_origin
    }

    /// Resets the timer.
    pub fn reset_timer(&mut self) {
        self.timer_origin = self.clock.now();
    }

    pub(crate) fn new_group(&mut self) -> GroupId {
        self.next_group = self.next_group.next();
        self.next_group
    }

    /// Last answer collected by `ask and wait`.
    pub fn answer(&self) -> &str {
        &self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::host::HeadlessHost;
    use serde_json::json;

    fn runtime(options: PlayerOptions) -> Runtime {
        let project: Project = serde_json::from_value(json!({
            "targets": [
                {"name": "Stage", "isStage": true},
                {"name": "Cat"}
            ]
        }))
        .unwrap();
        let tables = vec![ScriptTable::default(), ScriptTable::default()];
        Runtime::new(&project, tables, options, Box::new(HeadlessHost::new())).unwrap()
    }

    #[test]
    fn test_fixed_clock_advances_per_frame() {
        let mut rt = runtime(PlayerOptions { fps: 10, ..Default::default() });
        rt.step().unwrap();
        rt.step().unwrap();
        assert!((rt.now() - 0.2).abs() < 1e-9);
        rt.reset_timer();
        rt.step().unwrap();
        assert!((rt.timer() - 0.1).abs() < 1e-9);
        assert_eq!(rt.frame(), 3);
    }

    #[test]
    fn test_deferred_threads_become_ready() {
        let mut rt = runtime(PlayerOptions::default());
        let mut thread = Thread::new(TargetId(1), LabelId(0), GroupId(1));
        thread.ready = false;
        rt.queue.push(Slot::Thread(Box::new(thread)));
        rt.queue.push(Slot::Empty);
        rt.end_pass();
        assert_eq!(rt.queue.len(), 1);
        assert!(rt.threads().all(|t| t.ready));
    }

    #[test]
    fn test_clone_lifecycle_and_limit() {
        let mut rt = runtime(PlayerOptions { max_clones: 1, ..Default::default() });
        let clone = rt.create_clone(TargetId(1)).unwrap();
        assert!(rt.create_clone(TargetId(1)).is_none());
        assert!(rt.create_clone(rt.stage).is_none());
        assert_eq!(rt.find("Cat").map(|t| t.id), Some(TargetId(1)));
        assert!(!rt.delete_clone(TargetId(1)));
        assert!(rt.delete_clone(clone));
        assert!(rt.target(clone).is_none());
        assert!(rt.create_clone(TargetId(1)).is_some());
        rt.stop_all();
        assert_eq!(rt.targets().count(), 2);
    }

    #[test]
    fn test_deleted_clone_slots_are_reused() {
        let mut rt = runtime(PlayerOptions { max_clones: 3, ..Default::default() });
        for _ in 0..10_000 {
            let clone = rt.create_clone(TargetId(1)).unwrap();
            assert!(rt.delete_clone(clone));
        }
        assert_eq!(rt.table_len(), 3);
        assert_eq!(rt.targets().count(), 2);

        let a = rt.create_clone(TargetId(1)).unwrap();
        let b = rt.create_clone(TargetId(1)).unwrap();
        let c = rt.create_clone(TargetId(1)).unwrap();
        assert!(rt.delete_clone(a));
        let d = rt.create_clone(TargetId(1)).unwrap();
        assert_eq!(d, a);
        let order: Vec<TargetId> = rt.targets().map(|t| t.id).collect();
        assert_eq!(order, vec![TargetId(0), TargetId(1), b, c, d]);
        assert_eq!(rt.table_len(), 5);

        rt.stop_all();
        assert_eq!(rt.table_len(), 2);
        assert_eq!(rt.targets().count(), 2);
    }

    #[test]
    fn test_table_count_must_match() {
        let project: Project =
            serde_json::from_value(json!({"targets": [{"name": "Stage", "isStage": true}]})).unwrap();
        let err = Runtime::new(&project, Vec::new(), PlayerOptions::default(), Box::new(HeadlessHost::new()));
        assert!(matches!(err, Err(Error::Internal(_))));
    }
}
