//! Code generation from blocks to IR.
//!
//! This module contains the `Compiler`, which walks one target's block
//! graph and emits a labeled IR script per hat. Statement handlers live in
//! `statements`, reporter handlers in `expressions`.
//!
//! Compilation never aborts on a bad block: unknown opcodes become no-ops
//! and missing inputs take their type's default, each with a warning.
//! Only structural defects (cycles, misplaced labels) are errors.

mod expressions;
mod scope;
mod statements;

#[cfg(test)]
mod tests;

pub use scope::{Kind, Scope};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::compiler::ir::{Expr, InputType, LabelId, ProcId, Stmt};
use crate::compiler::splitter::{self, Continuation};
use crate::compiler::{EventKey, Procedure, ScriptTable};
use crate::project::{Block, Input, TargetData};
use crate::runtime::value::Value;
use crate::{Error, Result};

/// What starts a compiled script.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// An event hat.
    Event(EventKey),
    /// A procedure definition.
    Procedure(ProcId),
}

/// One compiled, not yet split, script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// What starts it.
    pub trigger: Trigger,
    /// Label of the entry continuation.
    pub entry: LabelId,
    /// The labeled IR.
    pub body: Vec<Stmt>,
}

/// Compiles a target's blocks to IR.
pub struct Compiler<'p> {
    /// The target being compiled
    target: &'p TargetData,
    /// The stage, for backdrop names
    stage: Option<&'p TargetData>,
    /// Variable, list and parameter resolution
    pub scope: Scope<'p>,
    /// Procedures declared so far
    procedures: Vec<Procedure>,
    procedure_index: FxHashMap<String, ProcId>,
    /// Hat block id that owns each procedure
    procedure_hats: FxHashMap<String, ProcId>,
    /// Next label to hand out
    next_label: LabelId,
    /// Whether the script being compiled runs without screen refresh
    warp: bool,
    /// Procedure whose body is being compiled
    procedure: Option<ProcId>,
    /// Statements of the innermost open block
    buffer: Vec<Stmt>,
    /// Blocks on the current compilation path
    active: FxHashSet<&'p str>,
}

impl<'p> Compiler<'p> {
    /// Creates a compiler for `target`.
    pub fn new(target: &'p TargetData, stage: Option<&'p TargetData>) -> Self {
        Self {
            target,
            stage: if target.is_stage { Some(target) } else { stage },
            scope: Scope::new(target, stage),
            procedures: Vec::new(),
            procedure_index: FxHashMap::default(),
            procedure_hats: FxHashMap::default(),
            next_label: LabelId(0),
            warp: false,
            procedure: None,
            buffer: Vec::new(),
            active: FxHashSet::default(),
        }
    }

    /// Compiles every script of the target.
    pub fn compile(&mut self) -> Result<ScriptTable> {
        self.declare_procedures();

        let target = self.target;
        let mut scripts = Vec::new();
        for (id, hat) in target.top_level() {
            if let Some(script) = self.compile_hat(id, hat)? {
                scripts.push(script);
            }
        }
        self.finish(scripts)
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    /// Registers every procedure definition and reserves its entry label,
    /// so calls may precede definitions.
    fn declare_procedures(&mut self) {
        let target = self.target;
        for (id, hat) in target.top_level() {
            if hat.opcode != "procedures_definition" {
                continue;
            }
            let Some(prototype) = self.prototype(hat) else {
                tracing::warn!(sprite = %target.name, hat = id, "procedure definition without a prototype");
                continue;
            };
            let mutation = prototype.mutation.clone().unwrap_or_default();
            let Some(proccode) = mutation.proccode.clone() else {
                tracing::warn!(sprite = %target.name, hat = id, "procedure prototype without a signature");
                continue;
            };
            if self.procedure_index.contains_key(&proccode) {
                tracing::warn!(sprite = %target.name, %proccode, "duplicate procedure definition ignored");
                continue;
            }

            let proc_id = ProcId(self.procedures.len());
            let entry = self.new_label();
            self.procedures.push(Procedure {
                proccode: proccode.clone(),
                entry,
                warp: mutation.is_warp(),
                params: mutation.argument_names(),
            });
            self.procedure_index.insert(proccode, proc_id);
            self.procedure_hats.insert(id.to_string(), proc_id);
        }
    }

    fn prototype(&self, definition: &Block) -> Option<&'p Block> {
        let target = self.target;
        match definition.inputs.get("custom_block")? {
            Input::Block(id) => target.block(id),
            _ => None,
        }
    }

    /// Compiles one top-level stack. Stacks without a known hat produce
    /// nothing.
    pub fn compile_hat(&mut self, id: &str, hat: &'p Block) -> Result<Option<Script>> {
        let trigger = match hat.opcode.as_str() {
            "event_whenflagclicked" => Trigger::Event(EventKey::GreenFlag),
            "event_whenbroadcastreceived" => {
                Trigger::Event(EventKey::message(hat.field("BROADCAST_OPTION").unwrap_or_default()))
            }
            "event_whenkeypressed" => {
                Trigger::Event(EventKey::key(hat.field("KEY_OPTION").unwrap_or_default()))
            }
            "event_whenbackdropswitchesto" => {
                Trigger::Event(EventKey::backdrop(hat.field("BACKDROP").unwrap_or_default()))
            }
            "event_whenthisspriteclicked" | "event_whenstageclicked" => {
                Trigger::Event(EventKey::Clicked)
            }
            "control_start_as_clone" => Trigger::Event(EventKey::StartAsClone),
            "procedures_definition" => match self.procedure_hats.get(id) {
                Some(proc_id) => Trigger::Procedure(*proc_id),
                None => return Ok(None),
            },
            opcode if opcode.contains("_when") => {
                tracing::warn!(sprite = %self.target.name, opcode, "unsupported hat, script skipped");
                return Ok(None);
            }
            opcode => {
                tracing::trace!(sprite = %self.target.name, opcode, "loose stack skipped");
                return Ok(None);
            }
        };

        let entry = match &trigger {
            Trigger::Procedure(proc_id) => {
                let procedure = &self.procedures[proc_id.index()];
                self.warp = procedure.warp;
                self.procedure = Some(*proc_id);
                self.scope.begin_procedure(procedure.params.clone());
                procedure.entry
            }
            Trigger::Event(_) => {
                self.warp = false;
                self.procedure = None;
                self.new_label()
            }
        };

        self.buffer = vec![Stmt::Label(entry)];
        let compiled = self.compile_stack(hat.next.as_deref());
        if self.procedure.is_some() {
            self.emit(Stmt::EndCall);
        }
        self.emit(Stmt::Return);

        self.scope.end_procedure();
        self.procedure = None;
        self.warp = false;
        let body = std::mem::take(&mut self.buffer);
        compiled?;

        Ok(Some(Script { trigger, entry, body }))
    }

    /// Splits every script and assembles the table.
    fn finish(&mut self, scripts: Vec<Script>) -> Result<ScriptTable> {
        let mut slots: Vec<Option<Continuation>> = vec![None; self.next_label.index()];
        let mut listeners: FxHashMap<EventKey, Vec<LabelId>> = FxHashMap::default();

        for script in &scripts {
            for continuation in splitter::split(&script.body)? {
                let slot = slots.get_mut(continuation.label.index()).ok_or_else(|| {
                    Error::Internal(format!("label {} was never allocated", continuation.label))
                })?;
                *slot = Some(continuation);
            }
            if let Trigger::Event(key) = &script.trigger {
                listeners.entry(key.clone()).or_default().push(script.entry);
            }
        }

        let continuations = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| Error::Internal(format!("label L{} has no continuation", i)))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            sprite = %self.target.name,
            scripts = scripts.len(),
            continuations = continuations.len(),
            "compiled target"
        );

        Ok(ScriptTable {
            continuations,
            procedures: std::mem::take(&mut self.procedures),
            procedure_index: std::mem::take(&mut self.procedure_index),
            listeners,
        })
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn emit(&mut self, stmt: Stmt) {
        self.buffer.push(stmt);
    }

    fn new_label(&mut self) -> LabelId {
        let label = self.next_label;
        self.next_label = label.next();
        label
    }

    /// Compiles a chain of blocks linked by `next`.
    fn compile_stack(&mut self, first: Option<&'p str>) -> Result<()> {
        let target = self.target;
        let mut seen = FxHashSet::default();
        let mut cursor = first;
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(Error::Project(format!("block {id} links back into its own stack")));
            }
            let Some(block) = target.block(id) else {
                tracing::warn!(sprite = %target.name, block = id, "dangling block reference");
                break;
            };
            self.enter(id)?;
            self.compile_statement(block)?;
            self.active.remove(id);
            cursor = block.next.as_deref();
        }
        Ok(())
    }

    /// Compiles the stack plugged into a substack slot into a fresh block.
    fn compile_substack(&mut self, block: &'p Block, slot: &str) -> Result<Vec<Stmt>> {
        let first = match block.inputs.get(slot) {
            Some(Input::Block(id)) => Some(id.as_str()),
            _ => None,
        };
        let outer = std::mem::take(&mut self.buffer);
        let result = self.compile_stack(first);
        let body = std::mem::replace(&mut self.buffer, outer);
        result.map(|()| body)
    }

    /// Marks `id` as being compiled. A block reached again through its own
    /// inputs or substacks makes the graph cyclic.
    fn enter(&mut self, id: &'p str) -> Result<()> {
        if self.active.insert(id) {
            Ok(())
        } else {
            Err(Error::Project(format!("cyclic block graph at block {id}")))
        }
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Compiles an input slot coerced to `ty`.
    ///
    /// Literals and shadow menus fold to constants. A missing input yields
    /// the type's default.
    pub fn compile_input(&mut self, block: &'p Block, slot: &str, ty: InputType) -> Result<Expr> {
        let target = self.target;
        let expr = match block.inputs.get(slot) {
            None | Some(Input::Empty) => None,
            Some(Input::Literal(value)) => Some(Expr::Const(value.clone())),
            Some(Input::Broadcast(name)) => Some(Expr::text(name.clone())),
            Some(Input::Variable { name, id }) => {
                Some(Expr::Variable(self.scope.resolve(Kind::Variable, name, id.as_deref())))
            }
            Some(Input::List { name, id }) => {
                Some(Expr::ListContents(self.scope.resolve(Kind::List, name, id.as_deref())))
            }
            Some(Input::Block(id)) => match target.block(id) {
                Some(menu) if is_menu(menu) => menu
                    .fields
                    .values()
                    .next()
                    .map(|field| Expr::text(field.value.clone())),
                Some(reporter) => {
                    self.enter(id)?;
                    let expr = self.compile_reporter(reporter)?;
                    self.active.remove(id.as_str());
                    Some(expr)
                }
                None => None,
            },
        };

        Ok(match expr {
            Some(expr) => cast(ty, expr),
            None => {
                tracing::warn!(
                    sprite = %target.name,
                    opcode = %block.opcode,
                    slot,
                    "missing input, using default"
                );
                Expr::Const(ty.default_value())
            }
        })
    }

    /// Compiles a field value as a constant.
    fn field(&self, block: &Block, name: &str) -> String {
        match block.field(name) {
            Some(value) => value.to_string(),
            None => {
                tracing::warn!(
                    sprite = %self.target.name,
                    opcode = %block.opcode,
                    field = name,
                    "missing field, using default"
                );
                String::new()
            }
        }
    }

    /// Compiles an asset input, turning a literal that names an asset into
    /// its 1-based index so the runtime never confuses names with numbers.
    fn compile_asset_input(&mut self, block: &'p Block, slot: &str, names: &[String]) -> Result<Expr> {
        let expr = self.compile_input(block, slot, InputType::Any)?;
        if let Some(Value::String(name)) = expr.as_const() {
            if let Some(i) = names.iter().position(|n| n == name) {
                return Ok(Expr::number((i + 1) as f64));
            }
        }
        Ok(expr)
    }

    fn costume_names(&self) -> Vec<String> {
        self.target.costume_names()
    }

    fn backdrop_names(&self) -> Vec<String> {
        self.stage.map(|s| s.costume_names()).unwrap_or_default()
    }

    fn sound_names(&self) -> Vec<String> {
        self.target.sound_names()
    }
}

/// Shadow blocks with a single field and no inputs are menus.
fn is_menu(block: &Block) -> bool {
    block.shadow && block.inputs.is_empty() && block.fields.len() == 1
}

/// Type an expression is known to produce without coercion.
fn static_type(expr: &Expr) -> Option<InputType> {
    match expr {
        Expr::Compare { .. }
        | Expr::And(..)
        | Expr::Or(..)
        | Expr::Not(_)
        | Expr::Contains { .. }
        | Expr::ListContains { .. }
        | Expr::KeyPressed(_)
        | Expr::Touching(_)
        | Expr::GroupRunning
        | Expr::TicketPending => Some(InputType::Boolean),
        Expr::Join(..) | Expr::LetterOf { .. } | Expr::ListContents(_) => Some(InputType::String),
        Expr::Cast(ty, _) => Some(*ty),
        _ => None,
    }
}

/// Wraps `expr` in a coercion to `ty`, folding constants.
fn cast(ty: InputType, expr: Expr) -> Expr {
    match expr {
        Expr::Const(value) => Expr::Const(ty.coerce(value)),
        expr if ty == InputType::Any || static_type(&expr) == Some(ty) => expr,
        expr => Expr::Cast(ty, Box::new(expr)),
    }
}

impl Default for Compiler<'_> {
    fn default() -> Self {
        // An empty stage; used by tests exercising the emitter alone.
        static EMPTY: std::sync::OnceLock<TargetData> = std::sync::OnceLock::new();
        let stage = EMPTY.get_or_init(|| TargetData {
            is_stage: true,
            name: "Stage".into(),
            variables: Default::default(),
            lists: Default::default(),
            broadcasts: Default::default(),
            blocks: Default::default(),
            costumes: Vec::new(),
            sounds: Vec::new(),
            current_costume: 0,
            volume: 100.0,
            x: 0.0,
            y: 0.0,
            size: 100.0,
            direction: 90.0,
            visible: true,
            rotation_style: None,
        });
        Self::new(stage, None)
    }
}
