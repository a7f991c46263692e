//! tatamiwm is the window-management core of a Wayland compositor:
//! it owns the set of managed client windows ("views"), their workspaces
//! and stacking order, keyboard focus policy, an automatic tiling engine,
//! a keybinding engine with asynchronous shell-gated conditions, and an
//! out-of-band control channel driven by signals and runtime files.
//!
//! The display stack itself (scene graph, surfaces, seats, outputs) is
//! reached exclusively through the [`SceneConn`] trait, so the core never
//! links against a particular compositor library. A headless
//! implementation, [`HeadlessConn`], ships in-tree; it backs the test
//! suite and lets the binary run without a display.

#[macro_use]
extern crate bitflags;

#[macro_use]
mod log;

pub mod bindings;
pub mod core;
pub mod ctl;
pub mod input;
pub mod manager;
pub mod scene;
pub mod tiling;

pub use crate::core::types;
pub use crate::manager::{Config, Server};
pub use crate::scene::core::Result as SceneResult;
pub use crate::scene::core::SceneConn;
pub use crate::scene::headless::HeadlessConn;

use std::io;
use std::num::ParseIntError;
use std::ops::FnMut;

use crate::core::view::ViewId;
use crate::scene::core::SceneError;
use thiserror::Error;

/// Everything that could possibly go wrong while tatamiwm is running.
#[derive(Debug, Error, Clone)]
pub enum TatamiError {
    /// An error reported by the underlying scene backend.
    #[error(transparent)]
    SceneError(SceneError),

    /// Malformed configuration: unknown modifier, keysym, or field value.
    ///
    /// Not fatal; the offending item is logged and skipped at load time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation was attempted on a view that is no longer managed.
    #[error("Unknown view {0}")]
    ViewGone(ViewId),

    /// A commit was attempted on a view that is not currently mapped.
    #[error("View {0} is not mapped")]
    NotMapped(ViewId),

    /// Unable to spawn a condition or action command.
    #[error("Error while running program: {0}")]
    SpawnProc(String),

    /// A condition command did not produce output in time.
    #[error("Condition command timed out: {0}")]
    ConditionTimeout(String),

    /// A runtime file or directory could not be read or written.
    #[error("I/O error: {0}")]
    Io(String),

    /// A request to switch to a workspace unknown to tatamiwm.
    #[error("Unknown workspace {0}")]
    UnknownWorkspace(String),

    /// Could not parse an integer from external data.
    #[error("Could not parse integer from external data")]
    ParseInt,

    /// The compositor cannot start at all.
    #[error("Fatal: {0}")]
    FatalInit(String),

    /// An error not covered by tatamiwm.
    #[error("Error: {0}")]
    OtherError(String),
}

impl From<SceneError> for TatamiError {
    fn from(e: SceneError) -> TatamiError {
        TatamiError::SceneError(e)
    }
}

impl From<io::Error> for TatamiError {
    fn from(e: io::Error) -> TatamiError {
        TatamiError::Io(e.to_string())
    }
}

impl From<ParseIntError> for TatamiError {
    fn from(_: ParseIntError) -> TatamiError {
        TatamiError::ParseInt
    }
}

/// The general result type used by tatamiwm.
pub type Result<T> = ::core::result::Result<T, TatamiError>;

/// An error handler that can be used to handle an error type.
///
/// Typically this would be a standard logging function that writes
/// to a file or stdout, but it can be anything.
pub type ErrorHandler = Box<dyn FnMut(TatamiError)>;
