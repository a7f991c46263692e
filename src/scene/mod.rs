//! This module provides tatamiwm's interface to the display stack.
//!
//! The compositor library that owns surfaces, outputs, seats and the
//! scene graph is an external collaborator. Everything the core needs
//! from it is expressed by the [`SceneConn`] trait; events flowing
//! the other way are [`SceneEvent`]s.

/// Core functionality of tatamiwm's interface with the scene backend.
pub mod core;
/// Low-level wrappers around scene backend events.
pub mod event;
/// A scene backend that runs without a display.
pub mod headless;
/// Type definitions for seat input state.
pub mod input;

pub use self::core::{NodeId, NodeTag, OutputId, SceneConn, SceneError, SsdPart, ViewId};
pub use self::event::{KeyEvent, SceneEvent};
pub use self::input::{keysym, KeyCode, ModMask};
