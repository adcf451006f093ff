//! Collaborators invoked by compiled code.
//!
//! The engine does no rendering, audio or input handling itself. Every
//! primitive that needs one of those calls the [`Host`]. Requests that take
//! time (`ask`, `play sound until done`) return a [`Ticket`] which the
//! waiting thread polls once per frame.
//!
//! [`HeadlessHost`] records output and serves scripted input. Cloning it
//! yields a second handle to the same state, so a test can keep one handle
//! while the engine owns the other.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use pounce_macros::id_type;
use rustc_hash::{FxHashMap, FxHashSet};

id_type! {
    /// Handle for an asynchronous host request.
    pub Ticket(u64) => "T"
}

/// Half the stage width.
pub const STAGE_HALF_WIDTH: f64 = 240.0;
/// Half the stage height.
pub const STAGE_HALF_HEIGHT: f64 = 180.0;

/// What a touching query knows about the asking sprite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteView<'a> {
    /// Sprite name (clones share their parent's name).
    pub name: &'a str,
    /// Position.
    pub x: f64,
    /// Position.
    pub y: f64,
    /// Size in percent.
    pub size: f64,
}

/// Pen extension commands.
#[derive(Debug, Clone, PartialEq)]
pub enum PenCommand {
    /// Erase the pen layer.
    Clear,
    /// Stamp the sprite at its position.
    Stamp,
    /// Start drawing.
    Down,
    /// Stop drawing.
    Up,
    /// New pen color, 24-bit RGB.
    Color(u32),
    /// New pen diameter.
    Size(f64),
    /// A segment drawn while the pen is down.
    Line {
        /// Start point.
        from: (f64, f64),
        /// End point.
        to: (f64, f64),
    },
}

/// Layer moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerChange {
    /// Topmost.
    Front,
    /// Just above the stage.
    Back,
    /// Up (positive) or down by a number of layers.
    Forward(i64),
}

/// Rendering, audio and input collaborators.
pub trait Host: Send + Sync {
    /// Whether the sprite touches `object`: a sprite name, `_mouse_` or
    /// `_edge_`.
    fn touching(&self, sprite: SpriteView<'_>, object: &str) -> bool;

    /// Whether a key is held. `any` matches every key.
    fn key_pressed(&self, key: &str) -> bool;

    /// Mouse position in stage coordinates.
    fn mouse(&self) -> (f64, f64);

    /// Mouse button state.
    fn mouse_down(&self) -> bool;

    /// Microphone loudness, or -1 without a microphone.
    fn loudness(&self) -> f64 {
        -1.0
    }

    /// Shows a speech or thought bubble; an empty message removes it.
    fn say(&mut self, sprite: &str, message: &str, think: bool);

    /// Asks a question.
    fn ask(&mut self, question: &str) -> Ticket;

    /// Starts a sound.
    fn play_sound(&mut self, target: &str, sound: &str) -> Ticket;

    /// Whether a request is still pending.
    fn poll(&mut self, ticket: Ticket) -> bool;

    /// Takes the answer of a finished `ask`.
    fn take_answer(&mut self, ticket: Ticket) -> Option<String>;

    /// Stops every sound.
    fn stop_sounds(&mut self);

    /// Applies a pen command.
    fn pen(&mut self, sprite: &str, command: PenCommand);

    /// Moves a sprite between layers.
    fn layer(&mut self, sprite: &str, change: LayerChange);

    /// A target switched costume or backdrop.
    fn costume_changed(&mut self, _target: &str, _costume: &str) {}
}

/// Recorded host output and scripted host input.
#[derive(Debug, Default)]
pub struct HeadlessState {
    /// Bubbles shown, as `(sprite, message)`.
    pub speech: Vec<(String, String)>,
    /// Questions asked.
    pub questions: Vec<String>,
    /// Answers served to `ask`, in order.
    pub answers: VecDeque<String>,
    /// Sounds started, as `(target, sound)`.
    pub sounds: Vec<(String, String)>,
    /// Frames each sound stays pending.
    pub sound_frames: u32,
    /// Pen commands, as `(sprite, command)`.
    pub pen: Vec<(String, PenCommand)>,
    /// Layer moves.
    pub layers: Vec<(String, LayerChange)>,
    /// Held keys.
    pub keys: FxHashSet<String>,
    /// Scripted `(sprite, object)` contacts.
    pub contacts: FxHashSet<(String, String)>,
    /// Mouse position.
    pub mouse: (f64, f64),
    /// Mouse button.
    pub mouse_down: bool,
    pending: FxHashMap<Ticket, Pending>,
    next_ticket: Ticket,
}

#[derive(Debug)]
enum Pending {
    /// Waits for an answer to be available.
    Question,
    /// Counts down polls.
    Sound(u32),
    /// Answered, not yet collected.
    Answered(String),
}

/// A host that renders nothing.
#[derive(Debug, Clone, Default)]
pub struct HeadlessHost {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHost {
    /// Creates a host with no scripted input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the shared state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut HeadlessState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Queues an answer for the next question.
    pub fn push_answer(&self, answer: impl Into<String>) {
        self.state.lock().answers.push_back(answer.into());
    }

    /// Presses or releases a key.
    pub fn set_key(&self, key: &str, down: bool) {
        let key = crate::compiler::normalize_key(key);
        let mut state = self.state.lock();
        if down {
            state.keys.insert(key);
        } else {
            state.keys.remove(&key);
        }
    }

    /// Makes `sprite` touch (or stop touching) `object`.
    pub fn set_touching(&self, sprite: &str, object: &str, touching: bool) {
        let pair = (sprite.to_string(), object.to_string());
        let mut state = self.state.lock();
        if touching {
            state.contacts.insert(pair);
        } else {
            state.contacts.remove(&pair);
        }
    }

    /// Moves the mouse.
    pub fn set_mouse(&self, x: f64, y: f64, down: bool) {
        let mut state = self.state.lock();
        state.mouse = (x, y);
        state.mouse_down = down;
    }

    /// Messages shown by a sprite, oldest first.
    pub fn speech_of(&self, sprite: &str) -> Vec<String> {
        self.state
            .lock()
            .speech
            .iter()
            .filter(|(who, _)| who == sprite)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn issue(state: &mut HeadlessState, pending: Pending) -> Ticket {
        let ticket = state.next_ticket;
        state.next_ticket = ticket.next();
        state.pending.insert(ticket, pending);
        ticket
    }
}

impl Host for HeadlessHost {
    fn touching(&self, sprite: SpriteView<'_>, object: &str) -> bool {
        let state = self.state.lock();
        if state.contacts.contains(&(sprite.name.to_string(), object.to_string())) {
            return true;
        }
        match object {
            "_edge_" => sprite.x.abs() >= STAGE_HALF_WIDTH || sprite.y.abs() >= STAGE_HALF_HEIGHT,
            "_mouse_" => sprite.x == state.mouse.0 && sprite.y == state.mouse.1,
            _ => false,
        }
    }

    fn key_pressed(&self, key: &str) -> bool {
        let state = self.state.lock();
        match crate::compiler::normalize_key(key).as_str() {
            "any" => !state.keys.is_empty(),
            key => state.keys.contains(key),
        }
    }

    fn mouse(&self) -> (f64, f64) {
        self.state.lock().mouse
    }

    fn mouse_down(&self) -> bool {
        self.state.lock().mouse_down
    }

    fn say(&mut self, sprite: &str, message: &str, _think: bool) {
        self.state.lock().speech.push((sprite.to_string(), message.to_string()));
    }

    fn ask(&mut self, question: &str) -> Ticket {
        let mut state = self.state.lock();
        state.questions.push(question.to_string());
        Self::issue(&mut state, Pending::Question)
    }

    fn play_sound(&mut self, target: &str, sound: &str) -> Ticket {
        let mut state = self.state.lock();
        state.sounds.push((target.to_string(), sound.to_string()));
        let frames = state.sound_frames;
        Self::issue(&mut state, Pending::Sound(frames))
    }

    fn poll(&mut self, ticket: Ticket) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(pending) = state.pending.get_mut(&ticket) else {
            return false;
        };
        match pending {
            Pending::Question => match state.answers.pop_front() {
                Some(answer) => {
                    *pending = Pending::Answered(answer);
                    false
                }
                None => true,
            },
            Pending::Sound(frames) if *frames > 0 => {
                *frames -= 1;
                true
            }
            Pending::Sound(_) => {
                state.pending.remove(&ticket);
                false
            }
            Pending::Answered(_) => false,
        }
    }

    fn take_answer(&mut self, ticket: Ticket) -> Option<String> {
        match self.state.lock().pending.remove(&ticket) {
            Some(Pending::Answered(answer)) => Some(answer),
            _ => None,
        }
    }

    fn stop_sounds(&mut self) {
        self.state.lock().pending.retain(|_, p| !matches!(p, Pending::Sound(_)));
    }

    fn pen(&mut self, sprite: &str, command: PenCommand) {
        self.state.lock().pen.push((sprite.to_string(), command));
    }

    fn layer(&mut self, sprite: &str, change: LayerChange) {
        self.state.lock().layers.push((sprite.to_string(), change));
    }
}
