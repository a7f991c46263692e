//! Seat input state.
//!
//! The seat is always in exactly one interaction mode. Transitions
//! are driven by actions, never by the keyboard engine directly; the
//! keyboard engine only reads the mode to decide routing.

use tracing::warn;

use crate::core::view::ViewId;

/// The keyboard engine and key routing.
pub mod keyboard;

pub use keyboard::KeyboardState;

/// The interaction state of the seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum InputMode {
    /// Input flows to clients.
    Passthrough,
    /// A menu is open and consumes navigation keys.
    Menu,
    /// The window switcher is cycling.
    Cycle,
    /// A view is being moved interactively.
    Move,
    /// A view is being resized interactively.
    Resize,
    /// A drag-and-drop operation is in flight.
    Dnd,
}

impl InputMode {
    /// Whether a transition from this mode to `next` is allowed.
    ///
    /// Every mode can fall back to passthrough; all other modes are
    /// only reachable from passthrough, so two interactive modes can
    /// never stack.
    pub fn permits(self, next: InputMode) -> bool {
        self == next || next == InputMode::Passthrough || self == InputMode::Passthrough
    }
}

impl Default for InputMode {
    fn default() -> Self {
        InputMode::Passthrough
    }
}

/// Transient state of the window switcher while the seat is in
/// [`InputMode::Cycle`].
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    /// The view currently highlighted by the switcher.
    pub selected: Option<ViewId>,
    /// Set when all modifiers were released while bound keys were
    /// still held; cycling finishes on the next unbound key release.
    pub cancel_on_next_release: bool,
}

/// Checks and logs an input-mode transition.
///
/// Returns the mode to use; invalid transitions are refused and keep
/// the current mode.
pub fn transition(current: InputMode, next: InputMode) -> InputMode {
    if current.permits(next) {
        next
    } else {
        warn!("refusing input mode transition {} -> {}", current, next);
        current
    }
}
