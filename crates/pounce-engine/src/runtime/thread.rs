//! Green threads.
//!
//! A [`Thread`] is plain data: the continuation to resume, the call stack,
//! and the register file compiled wait sequences use. The scheduler owns
//! threads through its queue and lends one at a time to the interpreter.

use pounce_macros::id_type;
use rustc_hash::FxHashMap;

use crate::compiler::ir::{LabelId, ProcId, Reg};
use crate::runtime::host::Ticket;
use crate::runtime::target::TargetId;
use crate::runtime::value::Value;
use crate::{Error, Result};

id_type! {
    /// A rendezvous group: every thread started by one event.
    pub GroupId(u64) => "G"
}

/// Scratch registers of the running script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registers {
    /// Numeric registers, indexed by [`Reg`].
    pub values: [f64; Reg::COUNT],
    /// Group started by a waiting broadcast.
    pub group: Option<GroupId>,
    /// Pending host request.
    pub ticket: Option<Ticket>,
}

impl Registers {
    /// Reads a register.
    pub fn get(&self, reg: Reg) -> f64 {
        self.values[reg.index()]
    }

    /// Writes a register.
    pub fn set(&mut self, reg: Reg, value: f64) {
        self.values[reg.index()] = value;
    }
}

/// One active procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// The procedure.
    pub procedure: ProcId,
    /// Where the caller continues.
    pub resume: LabelId,
    /// The caller's registers, restored on return.
    pub caller_registers: Registers,
    /// Raw argument values.
    pub args: Vec<Value>,
    numbers: Vec<Option<f64>>,
    booleans: Vec<Option<bool>>,
    /// Register save stack of this frame.
    pub saved: Vec<Registers>,
    /// Whether entering this frame raised the warp depth.
    pub warp_entered: bool,
}

impl CallFrame {
    /// Creates a frame.
    pub fn new(
        procedure: ProcId,
        resume: LabelId,
        caller_registers: Registers,
        args: Vec<Value>,
        warp_entered: bool,
    ) -> Self {
        let arity = args.len();
        Self {
            procedure,
            resume,
            caller_registers,
            args,
            numbers: vec![None; arity],
            booleans: vec![None; arity],
            saved: Vec::new(),
            warp_entered,
        }
    }

    /// Raw argument; missing positions read as the empty string.
    pub fn arg(&self, position: usize) -> Value {
        self.args.get(position).cloned().unwrap_or_else(Value::empty)
    }

    /// Argument as a number, coerced once.
    pub fn number_arg(&mut self, position: usize) -> f64 {
        match self.numbers.get(position).copied().flatten() {
            Some(n) => n,
            None => {
                let n = self.arg(position).to_number();
                if let Some(slot) = self.numbers.get_mut(position) {
                    *slot = Some(n);
                }
                n
            }
        }
    }

    /// Argument as a boolean, coerced once.
    pub fn bool_arg(&mut self, position: usize) -> bool {
        match self.booleans.get(position).copied().flatten() {
            Some(b) => b,
            None => {
                let b = self.arg(position).to_bool();
                if let Some(slot) = self.booleans.get_mut(position) {
                    *slot = Some(b);
                }
                b
            }
        }
    }
}

/// A green thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    /// Owning target.
    pub target: TargetId,
    /// Entry continuation of the script; with `target`, the restart key.
    pub base: LabelId,
    /// Continuation to run next.
    pub continuation: LabelId,
    /// Call stack, innermost last.
    pub frames: Vec<CallFrame>,
    /// Registers of the running script.
    pub registers: Registers,
    /// Register save stack outside any procedure.
    pub saved: Vec<Registers>,
    /// Warp depth; greater than zero runs without yielding.
    pub warp: u32,
    /// Group this thread was started under.
    pub group: GroupId,
    /// Cleared for threads that must not run until the next pass.
    pub ready: bool,
    /// Frame depths of each procedure on the call stack.
    active: FxHashMap<ProcId, Vec<usize>>,
}

impl Thread {
    /// Creates a thread at a script entry.
    pub fn new(target: TargetId, base: LabelId, group: GroupId) -> Self {
        Self {
            target,
            base,
            continuation: base,
            frames: Vec::new(),
            registers: Registers::default(),
            saved: Vec::new(),
            warp: 0,
            group,
            ready: true,
            active: FxHashMap::default(),
        }
    }

    /// Innermost frame.
    pub fn frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Innermost frame, mutably.
    pub fn frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Whether `procedure` is on the stack within the nearest `window`
    /// frames.
    pub fn recently_active(&self, procedure: ProcId, window: usize) -> bool {
        let depth = self.frames.len();
        self.active
            .get(&procedure)
            .and_then(|depths| depths.last())
            .is_some_and(|&d| d + window >= depth)
    }

    /// Enters a procedure: stashes the caller's registers in a new frame.
    pub fn push_frame(
        &mut self,
        procedure: ProcId,
        resume: LabelId,
        args: Vec<Value>,
        warp_entered: bool,
    ) {
        let caller = std::mem::take(&mut self.registers);
        self.active.entry(procedure).or_default().push(self.frames.len());
        self.frames.push(CallFrame::new(procedure, resume, caller, args, warp_entered));
        if warp_entered {
            self.warp += 1;
        }
    }

    /// Leaves the innermost procedure, restoring the caller's registers.
    /// Returns where the caller continues, or `None` outside a procedure.
    pub fn pop_frame(&mut self) -> Option<LabelId> {
        let frame = self.frames.pop()?;
        if let Some(depths) = self.active.get_mut(&frame.procedure) {
            depths.pop();
            if depths.is_empty() {
                self.active.remove(&frame.procedure);
            }
        }
        if frame.warp_entered {
            self.warp = self.warp.saturating_sub(1);
        }
        self.registers = frame.caller_registers;
        Some(frame.resume)
    }

    /// Pushes a copy of the registers onto the current save stack.
    pub fn save(&mut self) {
        let copy = self.registers.clone();
        self.save_stack().push(copy);
    }

    /// Pops the registers from the current save stack.
    pub fn restore(&mut self) -> Result<()> {
        let registers = self
            .save_stack()
            .pop()
            .ok_or_else(|| Error::Runtime("register restore without a matching save".into()))?;
        self.registers = registers;
        Ok(())
    }

    fn save_stack(&mut self) -> &mut Vec<Registers> {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.saved,
            None => &mut self.saved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> Thread {
        Thread::new(TargetId(0), LabelId(0), GroupId(1))
    }

    #[test]
    fn test_save_restore_nests() {
        let mut t = thread();
        t.registers.set(Reg::Count, 3.0);
        t.save();
        t.registers.set(Reg::Count, 7.0);
        t.restore().unwrap();
        assert_eq!(t.registers.get(Reg::Count), 3.0);
        assert!(matches!(t.restore(), Err(Error::Runtime(_))));
    }

    #[test]
    fn test_frames_isolate_registers() {
        let mut t = thread();
        t.registers.set(Reg::Count, 2.0);
        t.push_frame(ProcId(0), LabelId(5), vec![Value::from("4")], false);
        assert_eq!(t.registers.get(Reg::Count), 0.0);
        assert_eq!(t.frame_mut().unwrap().number_arg(0), 4.0);
        assert!(t.frame_mut().unwrap().bool_arg(0));
        assert_eq!(t.pop_frame(), Some(LabelId(5)));
        assert_eq!(t.registers.get(Reg::Count), 2.0);
        assert_eq!(t.pop_frame(), None);
    }

    #[test]
    fn test_warp_depth_follows_frames() {
        let mut t = thread();
        t.push_frame(ProcId(0), LabelId(1), Vec::new(), true);
        t.push_frame(ProcId(1), LabelId(2), Vec::new(), true);
        assert_eq!(t.warp, 2);
        t.pop_frame();
        t.pop_frame();
        assert_eq!(t.warp, 0);
    }

    #[test]
    fn test_recursion_window() {
        let mut t = thread();
        t.push_frame(ProcId(0), LabelId(1), Vec::new(), false);
        assert!(t.recently_active(ProcId(0), 5));
        for i in 1..=5 {
            t.push_frame(ProcId(i), LabelId(1), Vec::new(), false);
        }
        // Six frames deep; the first is now outside the window.
        assert!(!t.recently_active(ProcId(0), 5));
        assert!(t.recently_active(ProcId(3), 5));
    }
}
