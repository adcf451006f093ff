//! Continuation interpreter.
//!
//! [`ExecutionContext`] runs one thread: it looks up the thread's
//! continuation, executes its statement tree, and follows inline jumps
//! (warp re-queues, procedure calls and returns) until the thread yields or
//! ends. The registers, call stack and warp depth it needs all live on the
//! [`Thread`] it borrows.

use std::sync::Arc;

use rand::Rng;

use crate::compiler::ir::{
    BinaryOp, CompareOp, CurrentUnit, Effect, Expr, InputType, LabelId, ListOp, LooksOp, MathFn,
    MotionOp, PenOp, ProcId, Reg, Sensor, SoundOp, Stmt, VarRef, VarScope,
};
use crate::compiler::{EventKey, ScriptTable};
use crate::runtime::host::{LayerChange, PenCommand, STAGE_HALF_HEIGHT, STAGE_HALF_WIDTH, SpriteView};
use crate::runtime::target::{Target, TargetKind};
use crate::runtime::thread::Thread;
use crate::runtime::value::Value;
use crate::vm::comparison;
use crate::vm::scheduler::{RECURSION_WINDOW, Runtime, Slot};
use crate::{Error, Result};

/// How a thread's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The script ran to its end or stopped.
    Finished,
    /// The thread re-queued itself.
    Yielded,
    /// The thread's slot was taken away (restart, stop or clone deletion).
    Detached,
}

/// Control flow out of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    /// Continue at a label without yielding.
    Jump(LabelId),
    /// Yield; resume at a label next time.
    Yield(LabelId),
    Stop,
    Detached,
}

/// Milliseconds from the Unix epoch to 2000-01-01T00:00:00Z.
const MILLIS_TO_2000: i64 = 946_684_800_000;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Everything one running thread can touch.
pub struct ExecutionContext<'a> {
    rt: &'a mut Runtime,
    thread: &'a mut Thread,
    slot: usize,
    scripts: Arc<ScriptTable>,
}

impl<'a> ExecutionContext<'a> {
    /// Binds a thread taken out of queue slot `slot`.
    pub fn new(rt: &'a mut Runtime, thread: &'a mut Thread, slot: usize) -> Result<Self> {
        let scripts = rt
            .target(thread.target)
            .map(|t| Arc::clone(&t.scripts))
            .ok_or_else(|| Error::Runtime(format!("thread owner {} no longer exists", thread.target)))?;
        Ok(Self { rt, thread, slot, scripts })
    }

    /// Trampolines through continuations until the thread yields or ends.
    pub(crate) fn run(&mut self) -> Result<Outcome> {
        let scripts = Arc::clone(&self.scripts);
        let mut label = self.thread.continuation;
        loop {
            let continuation = scripts
                .continuation(label)
                .ok_or_else(|| Error::Runtime(format!("no continuation {label}")))?;
            tracing::trace!(target_id = %self.thread.target, %label, "resume");
            match self.exec_block(&continuation.body)? {
                Flow::Next | Flow::Stop => return Ok(Outcome::Finished),
                Flow::Jump(next) => label = next,
                Flow::Yield(next) => {
                    self.thread.continuation = next;
                    return Ok(Outcome::Yielded);
                }
                Flow::Detached => return Ok(Outcome::Detached),
            }
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, block: &[Stmt]) -> Result<Flow> {
        for stmt in block {
            let flow = self.exec(stmt)?;
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Label(_) => {}
            Stmt::Queue(label) => {
                return Ok(if self.thread.warp > 0 { Flow::Jump(*label) } else { Flow::Yield(*label) });
            }
            Stmt::ForceQueue(label) => return Ok(Flow::Yield(*label)),
            Stmt::Save => self.thread.save(),
            Stmt::Restore => self.thread.restore()?,
            Stmt::SetRegister(reg, expr) => {
                let value = self.eval(expr)?.to_number();
                self.thread.registers.set(*reg, value);
            }
            Stmt::If { cond, then, otherwise } => {
                let branch = if self.eval(cond)?.to_bool() { then } else { otherwise };
                return self.exec_block(branch);
            }
            Stmt::Repeat { times, body } => {
                let mut count = self.eval(times)?.to_number();
                while count >= 0.5 {
                    count -= 1.0;
                    let flow = self.exec_block(body)?;
                    if flow != Flow::Next {
                        return Ok(flow);
                    }
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.to_bool() {
                    let flow = self.exec_block(body)?;
                    if flow != Flow::Next {
                        return Ok(flow);
                    }
                }
            }
            Stmt::Forever(body) => loop {
                let flow = self.exec_block(body)?;
                if flow != Flow::Next {
                    return Ok(flow);
                }
            },
            Stmt::Return => return Ok(Flow::Stop),
            Stmt::EndCall => {
                if let Some(resume) = self.thread.pop_frame() {
                    return Ok(Flow::Jump(resume));
                }
            }
            Stmt::Call { procedure, args, resume } => return self.call(*procedure, args, *resume),
            Stmt::Broadcast { message, wait } => {
                let message = self.eval(message)?.to_text();
                let group = self.rt.trigger(&EventKey::message(&message));
                if *wait {
                    self.thread.registers.group = Some(group);
                }
                return Ok(self.still_queued());
            }
            Stmt::SwitchBackdrop { backdrop, wait } => {
                let backdrop = self.eval(backdrop)?;
                let group = self.rt.switch_backdrop(&backdrop);
                self.rt.visual = true;
                if *wait {
                    self.thread.registers.group = Some(group);
                }
                return Ok(self.still_queued());
            }
            Stmt::SetVariable { var, value } => {
                let value = self.eval(value)?;
                self.owner_mut(var)?.set_variable(&var.name, value);
            }
            Stmt::ChangeVariable { var, by } => {
                let by = self.eval(by)?.to_number();
                let owner = self.owner_mut(var)?;
                let current = owner.variable(&var.name).to_number();
                owner.set_variable(&var.name, Value::Number(current + by));
            }
            Stmt::List(op) => self.list_op(op)?,
            Stmt::Motion(op) => self.motion(op)?,
            Stmt::Looks(op) => self.looks(op)?,
            Stmt::Sound(op) => self.sound(op)?,
            Stmt::Pen(op) => self.pen(op)?,
            Stmt::Ask(question) => {
                let question = self.eval(question)?.to_text();
                let ticket = self.rt.host.ask(&question);
                self.thread.registers.ticket = Some(ticket);
            }
            Stmt::CollectAnswer => {
                if let Some(ticket) = self.thread.registers.ticket.take() {
                    if let Some(answer) = self.rt.host.take_answer(ticket) {
                        self.rt.answer = answer;
                    }
                }
            }
            Stmt::ResetTimer => self.rt.reset_timer(),
            Stmt::CreateClone(of) => {
                let of = self.eval(of)?.to_text();
                let source = match of.as_str() {
                    "_myself_" => Some(self.thread.target),
                    name => self.rt.find(name).filter(|t| !t.is_stage()).map(|t| t.id),
                };
                match source {
                    Some(source) => {
                        self.rt.create_clone(source);
                    }
                    None => tracing::warn!(sprite = %of, "cannot clone unknown sprite"),
                }
            }
            Stmt::DeleteClone => {
                if self.rt.delete_clone(self.thread.target) {
                    return Ok(Flow::Detached);
                }
            }
            Stmt::StopAll => {
                self.rt.stop_all();
                return Ok(self.still_queued());
            }
            Stmt::StopOtherScripts => {
                self.rt.stop_target(self.thread.target, Some(self.slot));
            }
        }
        Ok(Flow::Next)
    }

    /// Whether the running thread still owns its slot after a statement
    /// that may restart or stop it.
    fn still_queued(&self) -> Flow {
        match self.rt.queue.get(self.slot) {
            Some(Slot::Running) => Flow::Next,
            _ => Flow::Detached,
        }
    }

    fn call(&mut self, procedure: ProcId, args: &[Expr], resume: LabelId) -> Result<Flow> {
        let (entry, warp) = self
            .scripts
            .procedure(procedure)
            .map(|p| (p.entry, p.warp))
            .ok_or_else(|| Error::Runtime(format!("no procedure {procedure}")))?;
        let values = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>>>()?;

        let atomic = warp || self.thread.warp > 0;
        let recursive = !atomic
            && self.rt.visual
            && self.thread.recently_active(procedure, RECURSION_WINDOW);
        self.thread.push_frame(procedure, resume, values, atomic);
        if recursive {
            tracing::trace!(%procedure, "deferring recursive call to the next frame");
            return Ok(Flow::Yield(entry));
        }
        Ok(Flow::Jump(entry))
    }

    // ========================================================================
    // Targets
    // ========================================================================

    fn current(&self) -> Result<&Target> {
        self.rt
            .target(self.thread.target)
            .ok_or_else(|| Error::Runtime(format!("target {} no longer exists", self.thread.target)))
    }

    fn current_mut(&mut self) -> Result<&mut Target> {
        let id = self.thread.target;
        self.rt
            .target_mut(id)
            .ok_or_else(|| Error::Runtime(format!("target {id} no longer exists")))
    }

    fn owner(&self, var: &VarRef) -> Result<&Target> {
        match var.scope {
            VarScope::Target => self.current(),
            VarScope::Stage => {
                self.rt.stage().ok_or_else(|| Error::Runtime("the stage is missing".into()))
            }
        }
    }

    fn owner_mut(&mut self, var: &VarRef) -> Result<&mut Target> {
        match var.scope {
            VarScope::Target => self.current_mut(),
            VarScope::Stage => {
                self.rt.stage_mut().ok_or_else(|| Error::Runtime("the stage is missing".into()))
            }
        }
    }

    /// Flags a visible change when the running target is on screen.
    fn touched_screen(&mut self) -> Result<()> {
        if self.current()?.is_visible() {
            self.rt.visual = true;
        }
        Ok(())
    }

    /// Position of a sprite, `_mouse_` or `_random_`.
    fn position_of(&mut self, name: &str) -> Option<(f64, f64)> {
        match name {
            "_mouse_" => Some(self.rt.host.mouse()),
            "_random_" => Some(self.random_position()),
            name => self.rt.find(name).and_then(Target::sprite).map(|s| (s.x, s.y)),
        }
    }

    fn random_position(&mut self) -> (f64, f64) {
        let x = (STAGE_HALF_WIDTH * 2.0 * (self.rt.rng.random::<f64>() - 0.5)).round();
        let y = (STAGE_HALF_HEIGHT * 2.0 * (self.rt.rng.random::<f64>() - 0.5)).round();
        (x, y)
    }

    // ========================================================================
    // Lists
    // ========================================================================

    fn list_op(&mut self, op: &ListOp) -> Result<()> {
        match op {
            ListOp::Add { list, item } => {
                let item = self.eval(item)?;
                self.owner_mut(list)?.list_mut(&list.name).push(item);
            }
            ListOp::Delete { list, index } => {
                let index = self.eval(index)?;
                let len = self.list_len(list)?;
                let position = list_index(&index, len, &mut self.rt.rng);
                let items = self.owner_mut(list)?.list_mut(&list.name);
                match position {
                    ListIndex::All => items.clear(),
                    ListIndex::At(i) => {
                        items.remove(i);
                    }
                    ListIndex::Invalid => {}
                }
            }
            ListOp::DeleteAll(list) => self.owner_mut(list)?.list_mut(&list.name).clear(),
            ListOp::Insert { list, index, item } => {
                let index = self.eval(index)?;
                let item = self.eval(item)?;
                let len = self.list_len(list)?;
                // One past the end appends.
                if let ListIndex::At(i) = list_index(&index, len + 1, &mut self.rt.rng) {
                    self.owner_mut(list)?.list_mut(&list.name).insert(i, item);
                }
            }
            ListOp::Replace { list, index, item } => {
                let index = self.eval(index)?;
                let item = self.eval(item)?;
                let len = self.list_len(list)?;
                if let ListIndex::At(i) = list_index(&index, len, &mut self.rt.rng) {
                    self.owner_mut(list)?.list_mut(&list.name)[i] = item;
                }
            }
        }
        Ok(())
    }

    fn list_len(&self, list: &VarRef) -> Result<usize> {
        Ok(self.owner(list)?.list(&list.name).map_or(0, Vec::len))
    }

    fn list_items(&self, list: &VarRef) -> Result<&[Value]> {
        Ok(self.owner(list)?.list(&list.name).map_or(&[][..], Vec::as_slice))
    }

    // ========================================================================
    // Motion
    // ========================================================================

    fn motion(&mut self, op: &MotionOp) -> Result<()> {
        let Some((x0, y0, direction)) = self.current()?.sprite().map(|s| (s.x, s.y, s.direction))
        else {
            // The stage ignores motion.
            return Ok(());
        };

        let target = match op {
            MotionOp::Move(steps) => {
                let steps = self.eval(steps)?.to_number();
                let radians = (90.0 - direction).to_radians();
                Some((x0 + steps * radians.cos(), y0 + steps * radians.sin()))
            }
            MotionOp::GotoXY { x, y } => {
                Some((self.eval(x)?.to_number(), self.eval(y)?.to_number()))
            }
            MotionOp::GotoTarget(name) => {
                let name = self.eval(name)?.to_text();
                self.position_of(&name)
            }
            MotionOp::GlideStep => {
                let r = &self.thread.registers;
                let elapsed = self.rt.now() - r.get(Reg::Start);
                let duration = r.get(Reg::Duration);
                let (to_x, to_y) = (r.get(Reg::ToX), r.get(Reg::ToY));
                if duration <= 0.0 || elapsed >= duration {
                    Some((to_x, to_y))
                } else {
                    let t = elapsed / duration;
                    let (from_x, from_y) = (r.get(Reg::FromX), r.get(Reg::FromY));
                    Some((from_x + (to_x - from_x) * t, from_y + (to_y - from_y) * t))
                }
            }
            MotionOp::SetX(x) => Some((self.eval(x)?.to_number(), y0)),
            MotionOp::SetY(y) => Some((x0, self.eval(y)?.to_number())),
            MotionOp::ChangeX(dx) => Some((x0 + self.eval(dx)?.to_number(), y0)),
            MotionOp::ChangeY(dy) => Some((x0, y0 + self.eval(dy)?.to_number())),
            MotionOp::Turn(degrees) => {
                let degrees = self.eval(degrees)?.to_number();
                self.sprite_mut()?.set_direction(direction + degrees);
                None
            }
            MotionOp::PointIn(degrees) => {
                let degrees = self.eval(degrees)?.to_number();
                self.sprite_mut()?.set_direction(degrees);
                None
            }
            MotionOp::PointTowards(name) => {
                let name = self.eval(name)?.to_text();
                let heading = if name == "_random_" {
                    Some(self.rt.rng.random_range(-179.0..=180.0_f64).round())
                } else {
                    self.position_of(&name).map(|(tx, ty)| {
                        let (dx, dy) = (tx - x0, ty - y0);
                        90.0 - dy.atan2(dx).to_degrees()
                    })
                };
                if let Some(heading) = heading {
                    self.sprite_mut()?.set_direction(heading);
                }
                None
            }
            MotionOp::Bounce => {
                self.sprite_mut()?.bounce();
                None
            }
            MotionOp::SetRotationStyle(style) => {
                self.sprite_mut()?.rotation_style = *style;
                None
            }
        };

        if let Some((x, y)) = target {
            self.sprite_mut()?.move_to(x, y);
        }
        self.draw_trail(x0, y0)?;
        self.touched_screen()
    }

    fn sprite_mut(&mut self) -> Result<&mut crate::runtime::target::SpriteState> {
        self.current_mut()?
            .sprite_mut()
            .ok_or_else(|| Error::Runtime("sprite block ran on the stage".into()))
    }

    /// Draws a pen line from the old position if the sprite moved with its
    /// pen down.
    fn draw_trail(&mut self, x0: f64, y0: f64) -> Result<()> {
        let rt = &mut *self.rt;
        let Some(target) = rt.targets.get(self.thread.target.index()).and_then(Option::as_ref) else {
            return Ok(());
        };
        if let Some(sprite) = target.sprite() {
            if sprite.pen.down && (sprite.x, sprite.y) != (x0, y0) {
                rt.host.pen(&target.name, PenCommand::Line { from: (x0, y0), to: (sprite.x, sprite.y) });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Looks, sound, pen
    // ========================================================================

    fn looks(&mut self, op: &LooksOp) -> Result<()> {
        match op {
            LooksOp::SwitchCostume(costume) => {
                let costume = self.eval(costume)?;
                let rt = &mut *self.rt;
                let rng = &mut rt.rng;
                if let Some(target) = rt.targets.get_mut(self.thread.target.index()).and_then(Option::as_mut) {
                    if target.set_costume(&costume, |n| rng.random_range(0..n)) {
                        rt.host.costume_changed(&target.name, target.costume_name());
                    }
                }
            }
            LooksOp::NextCostume => {
                let target = self.current_mut()?;
                target.next_costume();
                let (name, costume) = (target.name.clone(), target.costume_name().to_string());
                self.rt.host.costume_changed(&name, &costume);
            }
            LooksOp::Say { message, think } => {
                let message = self.eval(message)?.to_text();
                let name = self.current()?.name.clone();
                self.rt.host.say(&name, &message, *think);
            }
            LooksOp::SetSize(size) => {
                let size = self.eval(size)?.to_number();
                if let Some(sprite) = self.current_mut()?.sprite_mut() {
                    sprite.set_size(size);
                }
            }
            LooksOp::ChangeSize(by) => {
                let by = self.eval(by)?.to_number();
                if let Some(sprite) = self.current_mut()?.sprite_mut() {
                    sprite.set_size(sprite.size + by);
                }
            }
            LooksOp::SetEffect { effect, value } => {
                let value = self.eval(value)?.to_number();
                self.current_mut()?.set_effect(*effect, value);
            }
            LooksOp::ChangeEffect { effect, by } => {
                let by = self.eval(by)?.to_number();
                let target = self.current_mut()?;
                let value = target.effect(*effect) + by;
                target.set_effect(*effect, value);
            }
            LooksOp::ClearEffects => {
                for effect in Effect::ALL {
                    self.current_mut()?.set_effect(*effect, 0.0);
                }
            }
            LooksOp::Show | LooksOp::Hide => {
                if let Some(sprite) = self.current_mut()?.sprite_mut() {
                    sprite.visible = matches!(op, LooksOp::Show);
                }
                self.rt.visual = true;
                return Ok(());
            }
            LooksOp::GoToFront(front) => {
                let change = if *front { LayerChange::Front } else { LayerChange::Back };
                self.layer(change)?;
            }
            LooksOp::ChangeLayer(by) => {
                let by = self.eval(by)?.to_number();
                if by.is_finite() {
                    self.layer(LayerChange::Forward(by.round() as i64))?;
                }
            }
        }
        self.touched_screen()
    }

    fn layer(&mut self, change: LayerChange) -> Result<()> {
        let target = self.current()?;
        if target.is_stage() {
            return Ok(());
        }
        let name = target.name.clone();
        self.rt.host.layer(&name, change);
        Ok(())
    }

    fn sound(&mut self, op: &SoundOp) -> Result<()> {
        match op {
            SoundOp::Play(sound) | SoundOp::PlayUntilDone(sound) => {
                let sound = self.eval(sound)?;
                let target = self.current()?;
                let Some(name) = sound_name(&target.sounds, &sound) else {
                    self.thread.registers.ticket = None;
                    return Ok(());
                };
                let owner = target.name.clone();
                let ticket = self.rt.host.play_sound(&owner, &name);
                if matches!(op, SoundOp::PlayUntilDone(_)) {
                    self.thread.registers.ticket = Some(ticket);
                }
            }
            SoundOp::StopAll => self.rt.host.stop_sounds(),
            SoundOp::SetVolume(volume) => {
                let volume = self.eval(volume)?.to_number();
                self.current_mut()?.set_volume(volume);
            }
            SoundOp::ChangeVolume(by) => {
                let by = self.eval(by)?.to_number();
                let target = self.current_mut()?;
                let volume = target.volume + by;
                target.set_volume(volume);
            }
        }
        Ok(())
    }

    fn pen(&mut self, op: &PenOp) -> Result<()> {
        let command = match op {
            PenOp::Clear => PenCommand::Clear,
            PenOp::Stamp => PenCommand::Stamp,
            PenOp::Down => {
                if let Some(sprite) = self.current_mut()?.sprite_mut() {
                    sprite.pen.down = true;
                }
                PenCommand::Down
            }
            PenOp::Up => {
                if let Some(sprite) = self.current_mut()?.sprite_mut() {
                    sprite.pen.down = false;
                }
                PenCommand::Up
            }
            PenOp::SetColor(color) => {
                let color = self.eval(color)?.to_color();
                if let Some(sprite) = self.current_mut()?.sprite_mut() {
                    sprite.pen.color = color;
                }
                PenCommand::Color(color)
            }
            PenOp::SetSize(size) | PenOp::ChangeSize(size) => {
                let n = self.eval(size)?.to_number();
                let Some(sprite) = self.current_mut()?.sprite_mut() else {
                    return Ok(());
                };
                let size = if matches!(op, PenOp::ChangeSize(_)) { sprite.pen.size + n } else { n };
                sprite.pen.size = size.clamp(1.0, 1200.0);
                PenCommand::Size(sprite.pen.size)
            }
        };
        let name = self.current()?.name.clone();
        self.rt.host.pen(&name, command);
        self.rt.visual = true;
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        Ok(match expr {
            Expr::Const(value) => value.clone(),
            Expr::Variable(var) => self.owner(var)?.variable(&var.name),
            Expr::ListItem { list, index } => {
                let index = self.eval(index)?;
                let len = self.list_len(list)?;
                match list_index(&index, len, &mut self.rt.rng) {
                    ListIndex::At(i) => self.list_items(list)?[i].clone(),
                    ListIndex::All | ListIndex::Invalid => Value::empty(),
                }
            }
            Expr::ListIndexOf { list, item } => {
                let item = self.eval(item)?;
                let position = self.list_items(list)?.iter().position(|v| comparison::equals(v, &item));
                Value::Number(position.map_or(0.0, |i| (i + 1) as f64))
            }
            Expr::ListLength(list) => Value::Number(self.list_len(list)? as f64),
            Expr::ListContains { list, item } => {
                let item = self.eval(item)?;
                Value::Boolean(self.list_items(list)?.iter().any(|v| comparison::equals(v, &item)))
            }
            Expr::ListContents(list) => Value::String(list_contents(self.list_items(list)?)),
            Expr::Argument(position) => {
                self.thread.frame().map(|f| f.arg(*position)).unwrap_or_else(Value::empty)
            }
            Expr::Register(reg) => Value::Number(self.thread.registers.get(*reg)),
            Expr::Now => Value::Number(self.rt.now()),
            Expr::GroupRunning => Value::Boolean(
                self.thread.registers.group.is_some_and(|g| self.rt.is_group_running(g)),
            ),
            Expr::TicketPending => {
                let ticket = self.thread.registers.ticket;
                Value::Boolean(ticket.is_some_and(|t| self.rt.host.poll(t)))
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs)?.to_number();
                let b = self.eval(rhs)?.to_number();
                Value::Number(arithmetic(*op, a, b))
            }
            Expr::Compare { op, lhs, rhs } => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                Value::Boolean(match op {
                    CompareOp::Less => comparison::less_than(&a, &b),
                    CompareOp::Greater => comparison::greater_than(&a, &b),
                    CompareOp::Equal => comparison::equals(&a, &b),
                })
            }
            Expr::And(a, b) => Value::Boolean(self.eval(a)?.to_bool() && self.eval(b)?.to_bool()),
            Expr::Or(a, b) => Value::Boolean(self.eval(a)?.to_bool() || self.eval(b)?.to_bool()),
            Expr::Not(a) => Value::Boolean(!self.eval(a)?.to_bool()),
            Expr::Math { op, arg } => Value::Number(math(*op, self.eval(arg)?.to_number())),
            Expr::Round(a) => Value::Number(round_half_up(self.eval(a)?.to_number())),
            Expr::Join(a, b) => {
                let mut text = self.eval(a)?.to_text();
                text.push_str(&self.eval(b)?.to_text());
                Value::String(text)
            }
            Expr::LetterOf { index, text } => {
                let index = self.eval(index)?.to_number();
                let text = self.eval(text)?.to_text();
                let letter = if index >= 1.0 {
                    text.chars().nth(index as usize - 1)
                } else {
                    None
                };
                Value::String(letter.map(String::from).unwrap_or_default())
            }
            Expr::Length(a) => Value::Number(self.eval(a)?.to_text().chars().count() as f64),
            Expr::Contains { text, needle } => {
                let text = self.eval(text)?.to_text().to_lowercase();
                let needle = self.eval(needle)?.to_text().to_lowercase();
                Value::Boolean(text.contains(&needle))
            }
            Expr::Random { from, to } => {
                let from = self.eval(from)?;
                let to = self.eval(to)?;
                Value::Number(self.random_between(&from, &to))
            }
            Expr::Sense(sensor) => self.sense(*sensor)?,
            Expr::KeyPressed(key) => {
                let key = self.eval(key)?.to_text();
                Value::Boolean(self.rt.host.key_pressed(&key))
            }
            Expr::Touching(object) => {
                let object = self.eval(object)?.to_text();
                let target = self.current()?;
                let touching = target.sprite().is_some_and(|s| {
                    let view = SpriteView { name: &target.name, x: s.x, y: s.y, size: s.size };
                    self.rt.host.touching(view, &object)
                });
                Value::Boolean(touching)
            }
            Expr::Of { property, object } => {
                let object = self.eval(object)?.to_text();
                self.attribute(property, &object)
            }
            Expr::Cast(InputType::Number, inner) => match (inner.as_ref(), self.thread.frame_mut()) {
                (Expr::Argument(i), Some(frame)) => Value::Number(frame.number_arg(*i)),
                _ => Value::Number(self.eval(inner)?.to_number()),
            },
            Expr::Cast(InputType::Boolean, inner) => match (inner.as_ref(), self.thread.frame_mut()) {
                (Expr::Argument(i), Some(frame)) => Value::Boolean(frame.bool_arg(*i)),
                _ => Value::Boolean(self.eval(inner)?.to_bool()),
            },
            Expr::Cast(ty, inner) => ty.coerce(self.eval(inner)?),
        })
    }

    fn random_between(&mut self, from: &Value, to: &Value) -> f64 {
        let (a, b) = (from.to_number(), to.to_number());
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if low == high {
            return low;
        }
        let unit = self.rt.rng.random::<f64>();
        if is_int(from) && is_int(to) {
            low + (unit * (high + 1.0 - low)).floor()
        } else {
            low + unit * (high - low)
        }
    }

    fn sense(&mut self, sensor: Sensor) -> Result<Value> {
        let sprite = |cx: &Self, read: fn(&crate::runtime::target::SpriteState) -> f64| {
            cx.current().map(|t| Value::Number(t.sprite().map_or(0.0, read)))
        };
        Ok(match sensor {
            Sensor::Timer => Value::Number(self.rt.timer()),
            Sensor::Answer => Value::String(self.rt.answer.clone()),
            Sensor::Username => Value::String(self.rt.options.username.clone()),
            Sensor::MouseX => Value::Number(self.rt.host.mouse().0),
            Sensor::MouseY => Value::Number(self.rt.host.mouse().1),
            Sensor::MouseDown => Value::Boolean(self.rt.host.mouse_down()),
            Sensor::Loudness => Value::Number(self.rt.host.loudness()),
            Sensor::DaysSince2000 => {
                let millis = chrono::Utc::now().timestamp_millis() - MILLIS_TO_2000;
                Value::Number(millis as f64 / MILLIS_PER_DAY)
            }
            Sensor::Current(unit) => Value::Number(current_time(unit)),
            Sensor::X => sprite(self, |s| s.x)?,
            Sensor::Y => sprite(self, |s| s.y)?,
            Sensor::Direction => sprite(self, |s| s.direction)?,
            Sensor::Size => sprite(self, |s| s.size.round())?,
            Sensor::Volume => Value::Number(self.current()?.volume),
            Sensor::CostumeNumber => Value::Number((self.current()?.costume + 1) as f64),
            Sensor::CostumeName => Value::String(self.current()?.costume_name().to_string()),
            Sensor::BackdropNumber => {
                Value::Number(self.rt.stage().map_or(0.0, |s| (s.costume + 1) as f64))
            }
            Sensor::BackdropName => Value::String(
                self.rt.stage().map(|s| s.costume_name().to_string()).unwrap_or_default(),
            ),
        })
    }

    /// `(property) of (object)`.
    fn attribute(&mut self, property: &str, object: &str) -> Value {
        match object {
            "_mouse_" => {
                let (x, y) = self.rt.host.mouse();
                return Value::Number(if property == "y position" { y } else { x });
            }
            "_random_" => {
                let (x, y) = self.random_position();
                return Value::Number(if property == "y position" { y } else { x });
            }
            _ => {}
        }
        let target = if object == "_stage_" { self.rt.stage() } else { self.rt.find(object) };
        let Some(target) = target else {
            return Value::Number(0.0);
        };
        match (&target.kind, property) {
            (TargetKind::Stage(_), "backdrop #") => Value::Number((target.costume + 1) as f64),
            (TargetKind::Stage(_), "backdrop name") => Value::String(target.costume_name().to_string()),
            (TargetKind::Sprite(s), "x position") => Value::Number(s.x),
            (TargetKind::Sprite(s), "y position") => Value::Number(s.y),
            (TargetKind::Sprite(s), "direction") => Value::Number(s.direction),
            (TargetKind::Sprite(s), "size") => Value::Number(s.size.round()),
            (TargetKind::Sprite(_), "costume #") => Value::Number((target.costume + 1) as f64),
            (TargetKind::Sprite(_), "costume name") => Value::String(target.costume_name().to_string()),
            (_, "volume") => Value::Number(target.volume),
            (_, name) => target.variables.get(name).cloned().unwrap_or(Value::Number(0.0)),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListIndex {
    At(usize),
    All,
    Invalid,
}

/// Resolves a 1-based list index, `last`, `random`/`any` or `all`.
fn list_index(index: &Value, len: usize, rng: &mut impl Rng) -> ListIndex {
    if let Value::String(s) = index {
        match s.as_str() {
            "all" => return ListIndex::All,
            "last" if len > 0 => return ListIndex::At(len - 1),
            "random" | "any" if len > 0 => return ListIndex::At(rng.random_range(0..len)),
            "last" | "random" | "any" => return ListIndex::Invalid,
            _ => {}
        }
    }
    let n = index.to_number().floor();
    if n >= 1.0 && n <= len as f64 {
        ListIndex::At(n as usize - 1)
    } else {
        ListIndex::Invalid
    }
}

/// Lists of single characters join without separators.
fn list_contents(items: &[Value]) -> String {
    let letters = items
        .iter()
        .all(|v| matches!(v, Value::String(s) if s.chars().count() == 1));
    let separator = if letters { "" } else { " " };
    items.iter().map(Value::to_text).collect::<Vec<_>>().join(separator)
}

fn sound_name(sounds: &[String], sound: &Value) -> Option<String> {
    let by_number = |n: f64| {
        if sounds.is_empty() || !n.is_finite() {
            return None;
        }
        let index = (n.round() - 1.0).rem_euclid(sounds.len() as f64) as usize;
        sounds.get(index).cloned()
    };
    match sound {
        Value::Number(n) => by_number(*n),
        other => {
            let text = other.to_text();
            if let Some(found) = sounds.iter().find(|s| **s == text) {
                return Some(found.clone());
            }
            let n = crate::runtime::value::parse_number(&text);
            if crate::runtime::value::is_blank(&text) || n.is_nan() { None } else { by_number(n) }
        }
    }
}

/// Whether `pick random` treats the bound as an integer.
fn is_int(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_nan() || n.fract() == 0.0,
        Value::Boolean(_) => true,
        Value::String(s) => !s.contains('.'),
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Mod => {
            // Result takes the sign of the divisor.
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
    }
}

/// Rounds half up; negative halves go toward zero.
fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

/// Trigonometry works in degrees and rounds away float noise.
fn math(op: MathFn, n: f64) -> f64 {
    let tidy = |x: f64| (x * 1e10).round() / 1e10;
    match op {
        MathFn::Abs => n.abs(),
        MathFn::Floor => n.floor(),
        MathFn::Ceiling => n.ceil(),
        MathFn::Sqrt => n.sqrt(),
        MathFn::Sin => tidy(n.to_radians().sin()),
        MathFn::Cos => tidy(n.to_radians().cos()),
        MathFn::Tan => {
            let turn = n.rem_euclid(360.0);
            if turn == 90.0 {
                f64::INFINITY
            } else if turn == 270.0 {
                f64::NEG_INFINITY
            } else {
                tidy(n.to_radians().tan())
            }
        }
        MathFn::Asin => n.asin().to_degrees(),
        MathFn::Acos => n.acos().to_degrees(),
        MathFn::Atan => n.atan().to_degrees(),
        MathFn::Ln => n.ln(),
        MathFn::Log => n.log10(),
        MathFn::Exp => n.exp(),
        MathFn::Pow10 => 10f64.powf(n),
    }
}

fn current_time(unit: CurrentUnit) -> f64 {
    use chrono::{Datelike, Timelike};
    let now = chrono::Local::now();
    f64::from(match unit {
        CurrentUnit::Year => return f64::from(now.year()),
        CurrentUnit::Month => now.month(),
        CurrentUnit::Date => now.day(),
        CurrentUnit::DayOfWeek => now.weekday().number_from_sunday(),
        CurrentUnit::Hour => now.hour(),
        CurrentUnit::Minute => now.minute(),
        CurrentUnit::Second => now.second(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pounce_macros::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_list_index() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(list_index(&Value::from("last"), 3, &mut rng), ListIndex::At(2));
        assert_eq!(list_index(&Value::from("last"), 0, &mut rng), ListIndex::Invalid);
        assert_eq!(list_index(&Value::from("all"), 3, &mut rng), ListIndex::All);
        assert_eq!(list_index(&Value::Number(1.9), 3, &mut rng), ListIndex::At(0));
        assert_eq!(list_index(&Value::Number(4.0), 3, &mut rng), ListIndex::Invalid);
        assert_eq!(list_index(&Value::from(""), 3, &mut rng), ListIndex::Invalid);
        assert!(matches!(list_index(&Value::from("random"), 3, &mut rng), ListIndex::At(i) if i < 3));
    }

    #[test]
    fn test_list_contents() {
        let letters = [Value::from("a"), Value::from("b")];
        assert_eq!(list_contents(&letters), "ab");
        let words = [Value::from("a"), Value::Number(10.0)];
        assert_eq!(list_contents(&words), "a 10");
    }

    #[test]
    fn test_arithmetic_mod_sign() {
        assert_eq!(arithmetic(BinaryOp::Mod, -1.0, 3.0), 2.0);
        assert_eq!(arithmetic(BinaryOp::Mod, 1.0, -3.0), -2.0);
        assert_eq!(arithmetic(BinaryOp::Mod, 6.0, 3.0), 0.0);
        assert_eq!(arithmetic(BinaryOp::Divide, 1.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_math_in_degrees() {
        assert_approx_eq!(math(MathFn::Sin, 30.0), 0.5);
        assert_eq!(math(MathFn::Cos, 90.0), 0.0);
        assert_eq!(math(MathFn::Tan, 90.0), f64::INFINITY);
        assert_eq!(math(MathFn::Tan, -90.0), f64::NEG_INFINITY);
        assert_approx_eq!(math(MathFn::Atan, 1.0), 45.0);
        assert_eq!(math(MathFn::Pow10, 2.0), 100.0);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-2.6), -3.0);
    }

    #[test]
    fn test_sound_lookup() {
        let sounds = vec!["meow".to_string(), "purr".to_string()];
        assert_eq!(sound_name(&sounds, &Value::from("purr")).as_deref(), Some("purr"));
        assert_eq!(sound_name(&sounds, &Value::Number(3.0)).as_deref(), Some("meow"));
        assert_eq!(sound_name(&sounds, &Value::from("2")).as_deref(), Some("purr"));
        assert_eq!(sound_name(&sounds, &Value::from("bark")), None);
    }

    #[test]
    fn test_random_bounds_integer_detection() {
        assert!(is_int(&Value::Number(3.0)));
        assert!(!is_int(&Value::Number(0.5)));
        assert!(is_int(&Value::from("10")));
        assert!(!is_int(&Value::from("1.0")));
    }
}
