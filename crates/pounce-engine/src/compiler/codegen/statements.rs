//! Statement compilation.

use super::{Compiler, Kind};
use crate::compiler::ir::{
    BinaryOp, CompareOp, Effect, Expr, InputType, ListOp, LooksOp, MotionOp, PenOp, Reg,
    RotationStyle, Sensor, SoundOp, StopOption, Stmt, VarRef,
};
use crate::project::Block;
use crate::runtime::value::Value;
use crate::Result;

/// Opcodes with no effect in a headless engine; accepted without a warning.
const SILENT_NOOPS: &[&str] = &[
    "data_showvariable",
    "data_hidevariable",
    "data_showlist",
    "data_hidelist",
    "sensing_setdragmode",
    "sound_seteffectto",
    "sound_changeeffectby",
    "sound_cleareffects",
    "motion_align_scene",
];

impl<'p> Compiler<'p> {
    /// Compiles one statement block, recursing into its substacks.
    pub fn compile_statement(&mut self, block: &'p Block) -> Result<()> {
        match block.opcode.as_str() {
            // ================================================================
            // Motion
            // ================================================================
            "motion_movesteps" => {
                let steps = self.number(block, "STEPS")?;
                self.emit(Stmt::Motion(MotionOp::Move(steps)));
            }
            "motion_turnright" => {
                let degrees = self.number(block, "DEGREES")?;
                self.emit(Stmt::Motion(MotionOp::Turn(degrees)));
            }
            "motion_turnleft" => {
                let degrees = self.number(block, "DEGREES")?;
                self.emit(Stmt::Motion(MotionOp::Turn(negate(degrees))));
            }
            "motion_goto" => {
                let to = self.text(block, "TO")?;
                self.emit(Stmt::Motion(MotionOp::GotoTarget(to)));
            }
            "motion_gotoxy" => {
                let x = self.number(block, "X")?;
                let y = self.number(block, "Y")?;
                self.emit(Stmt::Motion(MotionOp::GotoXY { x, y }));
            }
            "motion_glidesecstoxy" => {
                let secs = self.number(block, "SECS")?;
                let x = self.number(block, "X")?;
                let y = self.number(block, "Y")?;
                self.emit_glide(secs, x, y);
            }
            "motion_glideto" => {
                let secs = self.number(block, "SECS")?;
                let to = self.text(block, "TO")?;
                let x = Expr::Of { property: "x position".into(), object: Box::new(to.clone()) };
                let y = Expr::Of { property: "y position".into(), object: Box::new(to) };
                self.emit_glide(secs, x, y);
            }
            "motion_pointindirection" => {
                let direction = self.number(block, "DIRECTION")?;
                self.emit(Stmt::Motion(MotionOp::PointIn(direction)));
            }
            "motion_pointtowards" => {
                let towards = self.text(block, "TOWARDS")?;
                self.emit(Stmt::Motion(MotionOp::PointTowards(towards)));
            }
            "motion_changexby" => {
                let dx = self.number(block, "DX")?;
                self.emit(Stmt::Motion(MotionOp::ChangeX(dx)));
            }
            "motion_setx" => {
                let x = self.number(block, "X")?;
                self.emit(Stmt::Motion(MotionOp::SetX(x)));
            }
            "motion_changeyby" => {
                let dy = self.number(block, "DY")?;
                self.emit(Stmt::Motion(MotionOp::ChangeY(dy)));
            }
            "motion_sety" => {
                let y = self.number(block, "Y")?;
                self.emit(Stmt::Motion(MotionOp::SetY(y)));
            }
            "motion_ifonedgebounce" => self.emit(Stmt::Motion(MotionOp::Bounce)),
            "motion_setrotationstyle" => {
                let style = self.field(block, "STYLE");
                match RotationStyle::parse(&style) {
                    Some(style) => self.emit(Stmt::Motion(MotionOp::SetRotationStyle(style))),
                    None => tracing::warn!(style = %style, "unknown rotation style, block skipped"),
                }
            }

            // ================================================================
            // Looks
            // ================================================================
            "looks_say" | "looks_think" => {
                let message = self.any(block, "MESSAGE")?;
                let think = block.opcode == "looks_think";
                self.emit(Stmt::Looks(LooksOp::Say { message, think }));
            }
            "looks_sayforsecs" | "looks_thinkforsecs" => {
                let message = self.any(block, "MESSAGE")?;
                let secs = self.number(block, "SECS")?;
                let think = block.opcode == "looks_thinkforsecs";
                self.emit(Stmt::Looks(LooksOp::Say { message, think }));
                self.emit_timed_wait(secs);
                self.emit(Stmt::Looks(LooksOp::Say { message: Expr::text(""), think }));
            }
            "looks_switchcostumeto" => {
                let names = self.costume_names();
                let costume = self.compile_asset_input(block, "COSTUME", &names)?;
                self.emit(Stmt::Looks(LooksOp::SwitchCostume(costume)));
            }
            "looks_nextcostume" => self.emit(Stmt::Looks(LooksOp::NextCostume)),
            "looks_switchbackdropto" => {
                let names = self.backdrop_names();
                let backdrop = self.compile_asset_input(block, "BACKDROP", &names)?;
                self.emit(Stmt::SwitchBackdrop { backdrop, wait: false });
            }
            "looks_switchbackdroptoandwait" => {
                let names = self.backdrop_names();
                let backdrop = self.compile_asset_input(block, "BACKDROP", &names)?;
                self.emit(Stmt::Save);
                self.emit(Stmt::SwitchBackdrop { backdrop, wait: true });
                self.emit_group_wait();
                self.emit(Stmt::Restore);
            }
            "looks_nextbackdrop" => {
                self.emit(Stmt::SwitchBackdrop { backdrop: Expr::text("next backdrop"), wait: false });
            }
            "looks_changesizeby" => {
                let change = self.number(block, "CHANGE")?;
                self.emit(Stmt::Looks(LooksOp::ChangeSize(change)));
            }
            "looks_setsizeto" => {
                let size = self.number(block, "SIZE")?;
                self.emit(Stmt::Looks(LooksOp::SetSize(size)));
            }
            "looks_changeeffectby" | "looks_seteffectto" => {
                let name = self.field(block, "EFFECT");
                let Some(effect) = Effect::parse(&name) else {
                    tracing::warn!(effect = %name, "unknown graphic effect, block skipped");
                    return Ok(());
                };
                if block.opcode == "looks_changeeffectby" {
                    let by = self.number(block, "CHANGE")?;
                    self.emit(Stmt::Looks(LooksOp::ChangeEffect { effect, by }));
                } else {
                    let value = self.number(block, "VALUE")?;
                    self.emit(Stmt::Looks(LooksOp::SetEffect { effect, value }));
                }
            }
            "looks_cleargraphiceffects" => self.emit(Stmt::Looks(LooksOp::ClearEffects)),
            "looks_show" => self.emit(Stmt::Looks(LooksOp::Show)),
            "looks_hide" => self.emit(Stmt::Looks(LooksOp::Hide)),
            "looks_gotofrontback" => {
                let front = self.field(block, "FRONT_BACK") != "back";
                self.emit(Stmt::Looks(LooksOp::GoToFront(front)));
            }
            "looks_goforwardbackwardlayers" => {
                let layers = self.number(block, "NUM")?;
                let layers = if self.field(block, "FORWARD_BACKWARD") == "backward" {
                    negate(layers)
                } else {
                    layers
                };
                self.emit(Stmt::Looks(LooksOp::ChangeLayer(layers)));
            }

            // ================================================================
            // Sound
            // ================================================================
            "sound_play" => {
                let names = self.sound_names();
                let sound = self.compile_asset_input(block, "SOUND_MENU", &names)?;
                self.emit(Stmt::Sound(SoundOp::Play(sound)));
            }
            "sound_playuntildone" => {
                let names = self.sound_names();
                let sound = self.compile_asset_input(block, "SOUND_MENU", &names)?;
                self.emit(Stmt::Save);
                self.emit(Stmt::Sound(SoundOp::PlayUntilDone(sound)));
                self.emit_ticket_wait();
                self.emit(Stmt::Restore);
            }
            "sound_stopallsounds" => self.emit(Stmt::Sound(SoundOp::StopAll)),
            "sound_setvolumeto" => {
                let volume = self.number(block, "VOLUME")?;
                self.emit(Stmt::Sound(SoundOp::SetVolume(volume)));
            }
            "sound_changevolumeby" => {
                let volume = self.number(block, "VOLUME")?;
                self.emit(Stmt::Sound(SoundOp::ChangeVolume(volume)));
            }

            // ================================================================
            // Events
            // ================================================================
            "event_broadcast" => {
                let message = self.text(block, "BROADCAST_INPUT")?;
                self.emit(Stmt::Broadcast { message, wait: false });
            }
            "event_broadcastandwait" => {
                let message = self.text(block, "BROADCAST_INPUT")?;
                self.emit(Stmt::Save);
                self.emit(Stmt::Broadcast { message, wait: true });
                self.emit_group_wait();
                self.emit(Stmt::Restore);
            }

            // ================================================================
            // Control
            // ================================================================
            "control_wait" => {
                let duration = self.number(block, "DURATION")?;
                self.emit_timed_wait(duration);
            }
            "control_repeat" => {
                let times = self.number(block, "TIMES")?;
                let body = self.compile_substack(block, "SUBSTACK")?;
                self.emit_repeat(times, body);
            }
            "control_forever" => {
                let body = self.compile_substack(block, "SUBSTACK")?;
                self.emit_forever(body);
            }
            "control_if" => {
                let cond = self.boolean(block, "CONDITION")?;
                let then = self.compile_substack(block, "SUBSTACK")?;
                self.emit(Stmt::If { cond, then, otherwise: Vec::new() });
            }
            "control_if_else" => {
                let cond = self.boolean(block, "CONDITION")?;
                let then = self.compile_substack(block, "SUBSTACK")?;
                let otherwise = self.compile_substack(block, "SUBSTACK2")?;
                self.emit(Stmt::If { cond, then, otherwise });
            }
            "control_wait_until" => {
                let cond = self.boolean(block, "CONDITION")?;
                let label = self.new_label();
                self.emit(Stmt::Label(label));
                self.emit(Stmt::If {
                    cond: Expr::Not(Box::new(cond)),
                    then: vec![Stmt::ForceQueue(label)],
                    otherwise: Vec::new(),
                });
            }
            "control_repeat_until" => {
                let cond = self.boolean(block, "CONDITION")?;
                let body = self.compile_substack(block, "SUBSTACK")?;
                self.emit_while(Expr::Not(Box::new(cond)), body);
            }
            "control_while" => {
                let cond = self.boolean(block, "CONDITION")?;
                let body = self.compile_substack(block, "SUBSTACK")?;
                self.emit_while(cond, body);
            }
            "control_stop" => {
                let option = self.field(block, "STOP_OPTION");
                match StopOption::parse(&option) {
                    Some(StopOption::All) => {
                        self.emit(Stmt::StopAll);
                        self.emit(Stmt::Return);
                    }
                    Some(StopOption::ThisScript) => {
                        if self.procedure.is_some() {
                            self.emit(Stmt::EndCall);
                        }
                        self.emit(Stmt::Return);
                    }
                    Some(StopOption::OtherScripts | StopOption::OtherScriptsInStage) => {
                        self.emit(Stmt::StopOtherScripts);
                    }
                    None => tracing::warn!(option = %option, "unknown stop option, block skipped"),
                }
            }
            "control_create_clone_of" => {
                let clone = self.text(block, "CLONE_OPTION")?;
                self.emit(Stmt::CreateClone(clone));
            }
            "control_delete_this_clone" => self.emit(Stmt::DeleteClone),

            // ================================================================
            // Sensing
            // ================================================================
            "sensing_askandwait" => {
                let question = self.text(block, "QUESTION")?;
                self.emit(Stmt::Save);
                self.emit(Stmt::Ask(question));
                self.emit_ticket_wait();
                self.emit(Stmt::CollectAnswer);
                self.emit(Stmt::Restore);
            }
            "sensing_resettimer" => self.emit(Stmt::ResetTimer),

            // ================================================================
            // Data
            // ================================================================
            "data_setvariableto" => {
                let var = self.reference(block, Kind::Variable, "VARIABLE");
                let value = self.any(block, "VALUE")?;
                self.emit(Stmt::SetVariable { var, value });
            }
            "data_changevariableby" => {
                let var = self.reference(block, Kind::Variable, "VARIABLE");
                let by = self.number(block, "VALUE")?;
                self.emit(Stmt::ChangeVariable { var, by });
            }
            "data_addtolist" => {
                let list = self.reference(block, Kind::List, "LIST");
                let item = self.any(block, "ITEM")?;
                self.emit(Stmt::List(ListOp::Add { list, item }));
            }
            "data_deleteoflist" => {
                let list = self.reference(block, Kind::List, "LIST");
                let index = self.any(block, "INDEX")?;
                self.emit(Stmt::List(ListOp::Delete { list, index }));
            }
            "data_deletealloflist" => {
                let list = self.reference(block, Kind::List, "LIST");
                self.emit(Stmt::List(ListOp::DeleteAll(list)));
            }
            "data_insertatlist" => {
                let list = self.reference(block, Kind::List, "LIST");
                let index = self.any(block, "INDEX")?;
                let item = self.any(block, "ITEM")?;
                self.emit(Stmt::List(ListOp::Insert { list, index, item }));
            }
            "data_replaceitemoflist" => {
                let list = self.reference(block, Kind::List, "LIST");
                let index = self.any(block, "INDEX")?;
                let item = self.any(block, "ITEM")?;
                self.emit(Stmt::List(ListOp::Replace { list, index, item }));
            }

            // ================================================================
            // Procedures
            // ================================================================
            "procedures_call" => self.compile_call(block)?,

            // ================================================================
            // Pen
            // ================================================================
            "pen_clear" => self.emit(Stmt::Pen(PenOp::Clear)),
            "pen_stamp" => self.emit(Stmt::Pen(PenOp::Stamp)),
            "pen_penDown" => self.emit(Stmt::Pen(PenOp::Down)),
            "pen_penUp" => self.emit(Stmt::Pen(PenOp::Up)),
            "pen_setPenColorToColor" => {
                let color = self.compile_input(block, "COLOR", InputType::Color)?;
                self.emit(Stmt::Pen(PenOp::SetColor(color)));
            }
            "pen_changePenSizeBy" => {
                let size = self.number(block, "SIZE")?;
                self.emit(Stmt::Pen(PenOp::ChangeSize(size)));
            }
            "pen_setPenSizeTo" => {
                let size = self.number(block, "SIZE")?;
                self.emit(Stmt::Pen(PenOp::SetSize(size)));
            }

            opcode if SILENT_NOOPS.contains(&opcode) => {}
            opcode => {
                tracing::warn!(sprite = %self.target.name, opcode, "unknown opcode compiled as no-op");
            }
        }
        Ok(())
    }

    /// Binds arguments positionally and emits the call with its resume label.
    fn compile_call(&mut self, block: &'p Block) -> Result<()> {
        let mutation = block.mutation.as_ref();
        let proccode = mutation.and_then(|m| m.proccode.as_deref()).unwrap_or_default();
        let Some(procedure) = self.procedure_index.get(proccode).copied() else {
            tracing::warn!(sprite = %self.target.name, proccode, "call to undefined procedure compiled as no-op");
            return Ok(());
        };

        let ids = mutation.map(|m| m.argument_ids()).unwrap_or_default();
        let arity = self.procedures[procedure.index()].params.len();
        let mut args = Vec::with_capacity(arity);
        for position in 0..arity {
            args.push(match ids.get(position) {
                Some(id) => self.compile_input(block, id, InputType::Any)?,
                None => Expr::Const(Value::empty()),
            });
        }

        let resume = self.new_label();
        self.emit(Stmt::Call { procedure, args, resume });
        self.emit(Stmt::Label(resume));
        Ok(())
    }

    // ========================================================================
    // Yielding constructs
    // ========================================================================

    /// Native loops are only allowed under warp with nothing to suspend on.
    fn runs_natively(&self, body: &[Stmt]) -> bool {
        self.warp && !body.iter().any(Stmt::contains_label)
    }

    /// ```text
    /// save; R.count = times
    /// L: if R.count >= 0.5 { R.count -= 1; body; queue L } else { restore }
    /// ```
    fn emit_repeat(&mut self, times: Expr, body: Vec<Stmt>) {
        if self.runs_natively(&body) {
            self.emit(Stmt::Repeat { times, body });
            return;
        }
        let label = self.new_label();
        self.emit(Stmt::Save);
        self.emit(Stmt::SetRegister(Reg::Count, times));
        self.emit(Stmt::Label(label));

        let mut then = Vec::with_capacity(body.len() + 2);
        then.push(Stmt::SetRegister(
            Reg::Count,
            Expr::Binary {
                op: BinaryOp::Subtract,
                lhs: Box::new(Expr::Register(Reg::Count)),
                rhs: Box::new(Expr::number(1.0)),
            },
        ));
        then.extend(body);
        then.push(Stmt::Queue(label));

        self.emit(Stmt::If {
            cond: Expr::Not(Box::new(Expr::Compare {
                op: CompareOp::Less,
                lhs: Box::new(Expr::Register(Reg::Count)),
                rhs: Box::new(Expr::number(0.5)),
            })),
            then,
            otherwise: vec![Stmt::Restore],
        });
    }

    fn emit_forever(&mut self, body: Vec<Stmt>) {
        if self.runs_natively(&body) {
            self.emit(Stmt::Forever(body));
            return;
        }
        let label = self.new_label();
        self.emit(Stmt::Label(label));
        self.buffer.extend(body);
        self.emit(Stmt::Queue(label));
    }

    fn emit_while(&mut self, cond: Expr, body: Vec<Stmt>) {
        if self.runs_natively(&body) {
            self.emit(Stmt::While { cond, body });
            return;
        }
        let label = self.new_label();
        self.emit(Stmt::Label(label));
        let mut then = body;
        then.push(Stmt::Queue(label));
        self.emit(Stmt::If { cond, then, otherwise: Vec::new() });
    }

    /// Waits at least one frame, then until `duration` seconds have passed.
    fn emit_timed_wait(&mut self, duration: Expr) {
        self.emit(Stmt::Save);
        self.emit(Stmt::SetRegister(Reg::Start, Expr::Now));
        self.emit(Stmt::SetRegister(Reg::Duration, duration));
        self.emit(Stmt::SetRegister(Reg::First, Expr::number(1.0)));
        let label = self.new_label();
        self.emit(Stmt::Label(label));
        self.emit(Stmt::If {
            cond: Expr::Or(Box::new(still_waiting()), Box::new(Expr::Register(Reg::First))),
            then: vec![
                Stmt::SetRegister(Reg::First, Expr::number(0.0)),
                Stmt::ForceQueue(label),
            ],
            otherwise: Vec::new(),
        });
        self.emit(Stmt::Restore);
    }

    fn emit_glide(&mut self, secs: Expr, x: Expr, y: Expr) {
        self.emit(Stmt::Save);
        self.emit(Stmt::SetRegister(Reg::Start, Expr::Now));
        self.emit(Stmt::SetRegister(Reg::Duration, secs));
        self.emit(Stmt::SetRegister(Reg::FromX, Expr::Sense(Sensor::X)));
        self.emit(Stmt::SetRegister(Reg::FromY, Expr::Sense(Sensor::Y)));
        self.emit(Stmt::SetRegister(Reg::ToX, x));
        self.emit(Stmt::SetRegister(Reg::ToY, y));
        let label = self.new_label();
        self.emit(Stmt::Label(label));
        self.emit(Stmt::Motion(MotionOp::GlideStep));
        self.emit(Stmt::If { cond: still_waiting(), then: vec![Stmt::ForceQueue(label)], otherwise: Vec::new() });
        self.emit(Stmt::Restore);
    }

    /// Polls the rendezvous group stored by a waiting broadcast.
    fn emit_group_wait(&mut self) {
        self.emit_poll(Expr::GroupRunning);
    }

    /// Polls the host ticket stored by ask or play-until-done.
    fn emit_ticket_wait(&mut self) {
        self.emit_poll(Expr::TicketPending);
    }

    fn emit_poll(&mut self, pending: Expr) {
        let label = self.new_label();
        self.emit(Stmt::Label(label));
        self.emit(Stmt::If { cond: pending, then: vec![Stmt::ForceQueue(label)], otherwise: Vec::new() });
    }

    // ========================================================================
    // Input helpers
    // ========================================================================

    fn number(&mut self, block: &'p Block, slot: &str) -> Result<Expr> {
        self.compile_input(block, slot, InputType::Number)
    }

    fn text(&mut self, block: &'p Block, slot: &str) -> Result<Expr> {
        self.compile_input(block, slot, InputType::String)
    }

    fn boolean(&mut self, block: &'p Block, slot: &str) -> Result<Expr> {
        self.compile_input(block, slot, InputType::Boolean)
    }

    fn any(&mut self, block: &'p Block, slot: &str) -> Result<Expr> {
        self.compile_input(block, slot, InputType::Any)
    }

    /// Resolves a variable or list field.
    pub(super) fn reference(&self, block: &Block, kind: Kind, field: &str) -> VarRef {
        let (name, id) = match block.fields.get(field) {
            Some(f) => (f.value.as_str(), f.id.as_deref()),
            None => {
                tracing::warn!(opcode = %block.opcode, field, "missing variable field");
                ("", None)
            }
        };
        self.scope.resolve(kind, name, id)
    }
}

/// `now() - R.start < R.duration`
fn still_waiting() -> Expr {
    Expr::Compare {
        op: CompareOp::Less,
        lhs: Box::new(Expr::Binary {
            op: BinaryOp::Subtract,
            lhs: Box::new(Expr::Now),
            rhs: Box::new(Expr::Register(Reg::Start)),
        }),
        rhs: Box::new(Expr::Register(Reg::Duration)),
    }
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Const(Value::Number(n)) => Expr::number(-n),
        other => Expr::Binary {
            op: BinaryOp::Subtract,
            lhs: Box::new(Expr::number(0.0)),
            rhs: Box::new(other),
        },
    }
}
