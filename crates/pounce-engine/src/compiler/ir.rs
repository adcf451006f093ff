//! Structured intermediate representation.
//!
//! Each script compiles to a tree of [`Stmt`] nodes with explicit
//! [`Stmt::Label`] markers at every point where the thread may suspend.
//! The splitter cuts a script at those markers into continuations; the
//! interpreter executes the resulting label-free trees directly.
//!
//! The `Display` impls render a readable, brace-delimited listing used by
//! `pounce --dump` and by tests.

use std::fmt;

use pounce_macros::{id_type, menu_enum};

use crate::runtime::value::Value;

id_type! {
    /// A suspension point, and the index of the continuation cut there.
    pub LabelId(usize) => "L"
}

id_type! {
    /// Index into a target's procedure table.
    pub ProcId(usize) => "P"
}

/// Where a variable or list lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    /// The running sprite (or clone).
    Target,
    /// The stage, shared by every sprite.
    Stage,
}

/// A resolved variable or list reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    /// Owner of the storage.
    pub scope: VarScope,
    /// Declared name.
    pub name: String,
}

impl VarRef {
    /// A sprite-local reference.
    pub fn local(name: impl Into<String>) -> Self {
        Self { scope: VarScope::Target, name: name.into() }
    }

    /// A stage (global) reference.
    pub fn global(name: impl Into<String>) -> Self {
        Self { scope: VarScope::Stage, name: name.into() }
    }
}

/// Numeric scratch registers used by compiler-emitted wait sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// Remaining iterations of a yielding `repeat`.
    Count,
    /// Start time of a timed wait, in seconds.
    Start,
    /// Length of a timed wait, in seconds.
    Duration,
    /// Set until the first check of a timed wait has yielded once.
    First,
    /// Glide origin x.
    FromX,
    /// Glide origin y.
    FromY,
    /// Glide destination x.
    ToX,
    /// Glide destination y.
    ToY,
}

impl Reg {
    /// Number of registers.
    pub const COUNT: usize = 8;

    /// Slot index in a register file.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// The type an input slot is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    /// Text
    String,
    /// Arithmetic number (never NaN)
    Number,
    /// Truthiness
    Boolean,
    /// Passed through as-is
    Any,
    /// List contents as text
    List,
    /// 24-bit RGB
    Color,
}

impl InputType {
    /// The value a missing input of this type takes.
    pub fn default_value(self) -> Value {
        match self {
            InputType::Number | InputType::Color => Value::Number(0.0),
            InputType::Boolean => Value::Boolean(false),
            InputType::String | InputType::Any | InputType::List => Value::empty(),
        }
    }

    /// Applies the coercion to a value.
    pub fn coerce(self, value: Value) -> Value {
        match self {
            InputType::Number => Value::Number(value.to_number()),
            InputType::Boolean => Value::Boolean(value.to_bool()),
            InputType::Color => Value::Number(f64::from(value.to_color())),
            InputType::String | InputType::List => match value {
                Value::String(_) => value,
                other => Value::String(other.to_text()),
            },
            InputType::Any => value,
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `mod`, with the sign of the divisor
    Mod,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `=`
    Equal,
}

menu_enum! {
    /// Functions of the `operator_mathop` menu.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MathFn {
        Abs => "abs",
        Floor => "floor",
        Ceiling => "ceiling",
        Sqrt => "sqrt",
        Sin => "sin",
        Cos => "cos",
        Tan => "tan",
        Asin => "asin",
        Acos => "acos",
        Atan => "atan",
        Ln => "ln",
        Log => "log",
        Exp => "e ^",
        Pow10 => "10 ^",
    }
}

menu_enum! {
    /// Units of `sensing_current`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum CurrentUnit {
        Year => "YEAR",
        Month => "MONTH",
        Date => "DATE",
        DayOfWeek => "DAYOFWEEK",
        Hour => "HOUR",
        Minute => "MINUTE",
        Second => "SECOND",
    }
}

menu_enum! {
    /// Graphic effects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Effect {
        Color => "color",
        Fisheye => "fisheye",
        Whirl => "whirl",
        Pixelate => "pixelate",
        Mosaic => "mosaic",
        Brightness => "brightness",
        Ghost => "ghost",
    }
}

menu_enum! {
    /// Sprite rotation styles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum RotationStyle {
        AllAround => "all around",
        LeftRight => "left-right",
        DontRotate => "don't rotate",
    }
}

menu_enum! {
    /// Options of `control_stop`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum StopOption {
        All => "all",
        ThisScript => "this script",
        OtherScripts => "other scripts in sprite",
        OtherScriptsInStage => "other scripts in stage",
    }
}

/// Reporters that read ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// Seconds since the timer was reset
    Timer,
    /// Last answer to `ask`
    Answer,
    /// Player username
    Username,
    /// Mouse x
    MouseX,
    /// Mouse y
    MouseY,
    /// Mouse button state
    MouseDown,
    /// Microphone loudness (always -1 without a microphone)
    Loudness,
    /// Fractional days since 2000-01-01
    DaysSince2000,
    /// Wall-clock component
    Current(CurrentUnit),
    /// Sprite x
    X,
    /// Sprite y
    Y,
    /// Sprite direction
    Direction,
    /// Sprite size
    Size,
    /// Target volume
    Volume,
    /// 1-based costume index
    CostumeNumber,
    /// Costume name
    CostumeName,
    /// 1-based backdrop index
    BackdropNumber,
    /// Backdrop name
    BackdropName,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A folded literal.
    Const(Value),
    /// Variable read.
    Variable(VarRef),
    /// `item (index) of list`
    ListItem { list: VarRef, index: Box<Expr> },
    /// `item # of (item) in list`
    ListIndexOf { list: VarRef, item: Box<Expr> },
    /// `length of list`
    ListLength(VarRef),
    /// `list contains (item)?`
    ListContains { list: VarRef, item: Box<Expr> },
    /// The list reporter: items joined for display.
    ListContents(VarRef),
    /// Raw procedure argument by position.
    Argument(usize),
    /// Register read.
    Register(Reg),
    /// Runtime clock, in seconds.
    Now,
    /// Whether the rendezvous group in the registers still has queued threads.
    GroupRunning,
    /// Whether the host ticket in the registers is still pending.
    TicketPending,
    /// Arithmetic.
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Comparison.
    Compare { op: CompareOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Logical and.
    And(Box<Expr>, Box<Expr>),
    /// Logical or.
    Or(Box<Expr>, Box<Expr>),
    /// Logical not.
    Not(Box<Expr>),
    /// `operator_mathop`
    Math { op: MathFn, arg: Box<Expr> },
    /// `round`
    Round(Box<Expr>),
    /// Text concatenation.
    Join(Box<Expr>, Box<Expr>),
    /// 1-based character of text.
    LetterOf { index: Box<Expr>, text: Box<Expr> },
    /// Character count.
    Length(Box<Expr>),
    /// Case-insensitive substring test.
    Contains { text: Box<Expr>, needle: Box<Expr> },
    /// `pick random`
    Random { from: Box<Expr>, to: Box<Expr> },
    /// Ambient state.
    Sense(Sensor),
    /// `key (name) pressed?`
    KeyPressed(Box<Expr>),
    /// `touching (object)?`
    Touching(Box<Expr>),
    /// `(property) of (object)`
    Of { property: String, object: Box<Expr> },
    /// Input coercion.
    Cast(InputType, Box<Expr>),
}

impl Expr {
    /// A numeric constant.
    pub fn number(n: f64) -> Self {
        Expr::Const(Value::Number(n))
    }

    /// A text constant.
    pub fn text(s: impl Into<String>) -> Self {
        Expr::Const(Value::String(s.into()))
    }

    /// The folded value, if this is a constant.
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }
}

/// Operations on lists.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOp {
    /// Append.
    Add { list: VarRef, item: Expr },
    /// Delete by index, `last`, `random` or `all`.
    Delete { list: VarRef, index: Expr },
    /// Remove every item.
    DeleteAll(VarRef),
    /// Insert before an index.
    Insert { list: VarRef, index: Expr, item: Expr },
    /// Overwrite an index.
    Replace { list: VarRef, index: Expr, item: Expr },
}

/// Sprite motion.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionOp {
    /// Move along the current direction.
    Move(Expr),
    /// Turn clockwise by degrees.
    Turn(Expr),
    /// Jump to coordinates.
    GotoXY { x: Expr, y: Expr },
    /// Jump to a sprite, `_mouse_` or `_random_`.
    GotoTarget(Expr),
    /// Interpolate between the glide registers.
    GlideStep,
    /// Set x.
    SetX(Expr),
    /// Set y.
    SetY(Expr),
    /// Change x.
    ChangeX(Expr),
    /// Change y.
    ChangeY(Expr),
    /// Set direction.
    PointIn(Expr),
    /// Face a sprite or `_mouse_`.
    PointTowards(Expr),
    /// Bounce off the stage edge.
    Bounce,
    /// Set rotation style.
    SetRotationStyle(RotationStyle),
}

/// Appearance.
#[derive(Debug, Clone, PartialEq)]
pub enum LooksOp {
    /// Switch costume by 1-based index or name.
    SwitchCostume(Expr),
    /// Advance the costume, wrapping.
    NextCostume,
    /// Speech or thought bubble; empty text clears it.
    Say { message: Expr, think: bool },
    /// Set size in percent.
    SetSize(Expr),
    /// Change size in percent.
    ChangeSize(Expr),
    /// Set an effect.
    SetEffect { effect: Effect, value: Expr },
    /// Change an effect.
    ChangeEffect { effect: Effect, by: Expr },
    /// Reset all effects.
    ClearEffects,
    /// Show.
    Show,
    /// Hide.
    Hide,
    /// Go to the front (`true`) or back layer.
    GoToFront(bool),
    /// Move forward by a number of layers.
    ChangeLayer(Expr),
}

/// Audio.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundOp {
    /// Start a sound by 1-based index or name.
    Play(Expr),
    /// Start a sound and store its ticket in the registers.
    PlayUntilDone(Expr),
    /// Stop every sound.
    StopAll,
    /// Set volume in percent.
    SetVolume(Expr),
    /// Change volume in percent.
    ChangeVolume(Expr),
}

/// Pen extension.
#[derive(Debug, Clone, PartialEq)]
pub enum PenOp {
    /// Clear the pen layer.
    Clear,
    /// Stamp the sprite.
    Stamp,
    /// Pen down.
    Down,
    /// Pen up.
    Up,
    /// Set pen color.
    SetColor(Expr),
    /// Set pen size.
    SetSize(Expr),
    /// Change pen size.
    ChangeSize(Expr),
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Suspension point. Only present before splitting.
    Label(LabelId),
    /// Continue at a label: inline under warp, otherwise yield.
    Queue(LabelId),
    /// Yield and continue at a label next pass, even under warp.
    ForceQueue(LabelId),
    /// Push a copy of the registers onto the save stack.
    Save,
    /// Pop the registers from the save stack.
    Restore,
    /// Write a register.
    SetRegister(Reg, Expr),
    /// Conditional.
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    /// Native counted loop. Never contains labels.
    Repeat { times: Expr, body: Vec<Stmt> },
    /// Native conditional loop. Never contains labels.
    While { cond: Expr, body: Vec<Stmt> },
    /// Native infinite loop. Never contains labels.
    Forever(Vec<Stmt>),
    /// End the thread.
    Return,
    /// Leave the current procedure and resume the caller.
    EndCall,
    /// Enter a procedure, resuming at `resume` on return.
    Call { procedure: ProcId, args: Vec<Expr>, resume: LabelId },
    /// Fire a message; with `wait`, the new group goes to the registers.
    Broadcast { message: Expr, wait: bool },
    /// Switch the stage backdrop and fire its listeners.
    SwitchBackdrop { backdrop: Expr, wait: bool },
    /// Variable assignment.
    SetVariable { var: VarRef, value: Expr },
    /// Variable increment.
    ChangeVariable { var: VarRef, by: Expr },
    /// List mutation.
    List(ListOp),
    /// Motion.
    Motion(MotionOp),
    /// Looks.
    Looks(LooksOp),
    /// Sound.
    Sound(SoundOp),
    /// Pen.
    Pen(PenOp),
    /// Ask a question; the ticket goes to the registers.
    Ask(Expr),
    /// Store the answer for the ticket in the registers.
    CollectAnswer,
    /// Reset the timer.
    ResetTimer,
    /// Clone a sprite by name, or `_myself_`.
    CreateClone(Expr),
    /// Delete the running clone.
    DeleteClone,
    /// Stop every thread.
    StopAll,
    /// Stop the target's other threads.
    StopOtherScripts,
}

impl Stmt {
    /// True for statements after which nothing in the same block runs.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Stmt::Return | Stmt::EndCall | Stmt::Queue(_) | Stmt::ForceQueue(_) | Stmt::Call { .. }
        )
    }

    /// True if a label occurs anywhere inside this statement.
    pub fn contains_label(&self) -> bool {
        match self {
            Stmt::Label(_) => true,
            Stmt::If { then, otherwise, .. } => {
                then.iter().any(Stmt::contains_label) || otherwise.iter().any(Stmt::contains_label)
            }
            Stmt::Repeat { body, .. } | Stmt::While { body, .. } | Stmt::Forever(body) => {
                body.iter().any(Stmt::contains_label)
            }
            _ => false,
        }
    }
}

// ============================================================================
// Listing
// ============================================================================

fn list(f: &mut fmt::Formatter<'_>, args: &[&Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            VarScope::Target => write!(f, "{:?}", self.name),
            VarScope::Stage => write!(f, "stage.{:?}", self.name),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(Value::String(s)) => write!(f, "{:?}", s),
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Variable(v) => write!(f, "var({})", v),
            Expr::ListItem { list: l, index } => write!(f, "item({}, {})", l, index),
            Expr::ListIndexOf { list: l, item } => write!(f, "indexof({}, {})", l, item),
            Expr::ListLength(l) => write!(f, "length({})", l),
            Expr::ListContains { list: l, item } => write!(f, "listcontains({}, {})", l, item),
            Expr::ListContents(l) => write!(f, "contents({})", l),
            Expr::Argument(i) => write!(f, "arg({})", i),
            Expr::Register(r) => write!(f, "R.{:?}", r),
            Expr::Now => f.write_str("now()"),
            Expr::GroupRunning => f.write_str("running(R.group)"),
            Expr::TicketPending => f.write_str("pending(R.ticket)"),
            Expr::Binary { op, lhs, rhs } => {
                write!(f, "{:?}(", op)?;
                list(f, &[lhs.as_ref(), rhs.as_ref()])?;
                f.write_str(")")
            }
            Expr::Compare { op, lhs, rhs } => {
                write!(f, "{:?}(", op)?;
                list(f, &[lhs.as_ref(), rhs.as_ref()])?;
                f.write_str(")")
            }
            Expr::And(a, b) => write!(f, "({} and {})", a, b),
            Expr::Or(a, b) => write!(f, "({} or {})", a, b),
            Expr::Not(a) => write!(f, "not({})", a),
            Expr::Math { op, arg } => write!(f, "{}({})", op, arg),
            Expr::Round(a) => write!(f, "round({})", a),
            Expr::Join(a, b) => write!(f, "join({}, {})", a, b),
            Expr::LetterOf { index, text } => write!(f, "letter({}, {})", index, text),
            Expr::Length(a) => write!(f, "strlen({})", a),
            Expr::Contains { text, needle } => write!(f, "contains({}, {})", text, needle),
            Expr::Random { from, to } => write!(f, "random({}, {})", from, to),
            Expr::Sense(s) => write!(f, "sense({:?})", s),
            Expr::KeyPressed(k) => write!(f, "key({})", k),
            Expr::Touching(t) => write!(f, "touching({})", t),
            Expr::Of { property, object } => write!(f, "of({:?}, {})", property, object),
            Expr::Cast(ty, e) => write!(f, "{:?}({})", ty, e),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

/// Renders a statement list, one statement per line.
pub struct Listing<'a>(pub &'a [Stmt]);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, self.0, 0)
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], depth: usize) -> fmt::Result {
    for stmt in stmts {
        write_stmt(f, stmt, depth)?;
    }
    Ok(())
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Stmt], depth: usize) -> fmt::Result {
    f.write_str("{\n")?;
    write_block(f, body, depth + 1)?;
    write!(f, "{:indent$}}}", "", indent = depth * 2)
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    write!(f, "{:indent$}", "", indent = depth * 2)?;
    match stmt {
        Stmt::Label(l) => write!(f, "{}:", l)?,
        Stmt::Queue(l) => write!(f, "queue {}", l)?,
        Stmt::ForceQueue(l) => write!(f, "force_queue {}", l)?,
        Stmt::Save => f.write_str("save")?,
        Stmt::Restore => f.write_str("restore")?,
        Stmt::SetRegister(r, e) => write!(f, "R.{:?} = {}", r, e)?,
        Stmt::If { cond, then, otherwise } => {
            write!(f, "if {} ", cond)?;
            write_body(f, then, depth)?;
            if !otherwise.is_empty() {
                f.write_str(" else ")?;
                write_body(f, otherwise, depth)?;
            }
        }
        Stmt::Repeat { times, body } => {
            write!(f, "repeat {} ", times)?;
            write_body(f, body, depth)?;
        }
        Stmt::While { cond, body } => {
            write!(f, "while {} ", cond)?;
            write_body(f, body, depth)?;
        }
        Stmt::Forever(body) => {
            f.write_str("forever ")?;
            write_body(f, body, depth)?;
        }
        Stmt::Return => f.write_str("return")?,
        Stmt::EndCall => f.write_str("end_call")?,
        Stmt::Call { procedure, args, resume } => {
            write!(f, "call {}(", procedure)?;
            let args: Vec<&Expr> = args.iter().collect();
            list(f, &args)?;
            write!(f, ") -> {}", resume)?;
        }
        Stmt::Broadcast { message, wait } => {
            write!(f, "broadcast{} {}", if *wait { "_and_wait" } else { "" }, message)?
        }
        Stmt::SwitchBackdrop { backdrop, wait } => {
            write!(f, "switch_backdrop{} {}", if *wait { "_and_wait" } else { "" }, backdrop)?
        }
        Stmt::SetVariable { var, value } => write!(f, "set {} = {}", var, value)?,
        Stmt::ChangeVariable { var, by } => write!(f, "change {} by {}", var, by)?,
        Stmt::List(op) => write!(f, "list {:?}", op)?,
        Stmt::Motion(op) => write!(f, "motion {:?}", op)?,
        Stmt::Looks(op) => write!(f, "looks {:?}", op)?,
        Stmt::Sound(op) => write!(f, "sound {:?}", op)?,
        Stmt::Pen(op) => write!(f, "pen {:?}", op)?,
        Stmt::Ask(q) => write!(f, "ask {}", q)?,
        Stmt::CollectAnswer => f.write_str("collect_answer")?,
        Stmt::ResetTimer => f.write_str("reset_timer")?,
        Stmt::CreateClone(t) => write!(f, "create_clone {}", t)?,
        Stmt::DeleteClone => f.write_str("delete_clone")?,
        Stmt::StopAll => f.write_str("stop_all")?,
        Stmt::StopOtherScripts => f.write_str("stop_other_scripts")?,
    }
    f.write_str("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_type_coerce() {
        assert_eq!(InputType::Number.coerce(Value::from("  ")), Value::Number(0.0));
        assert_eq!(InputType::String.coerce(Value::Number(2.0)), Value::from("2"));
        assert_eq!(InputType::Boolean.coerce(Value::from("false")), Value::Boolean(false));
        assert_eq!(InputType::Color.coerce(Value::from("#0f0")), Value::Number(65280.0));
    }

    #[test]
    fn test_terminators() {
        assert!(Stmt::Return.is_terminator());
        assert!(Stmt::Queue(LabelId(1)).is_terminator());
        assert!(!Stmt::Save.is_terminator());
    }

    #[test]
    fn test_listing() {
        let script = vec![
            Stmt::Label(LabelId(0)),
            Stmt::If {
                cond: Expr::Const(Value::Boolean(true)),
                then: vec![Stmt::Return],
                otherwise: vec![],
            },
        ];
        let text = Listing(&script).to_string();
        assert_eq!(text, "L0:\nif true {\n  return\n}\n");
    }
}
