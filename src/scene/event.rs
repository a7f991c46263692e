//! Low-level wrappers around actual scene backend events.
//!
//! Translated to EventActions by the `Server`.

use super::core::{OutputId, ViewId};
use crate::core::output::Output;
use crate::core::types::{Margins, Rect};
use crate::core::view::FocusPolicy;
use crate::scene::input::{keysym::Keysym, KeyCode, ModMask};

/// Low-level wrapper around actual scene backend events.
#[derive(Debug, Clone)]
pub enum SceneEvent {
    /// A client toplevel was mapped and should be managed.
    ViewMapped(ViewMapEvent),
    /// A view's surface was unmapped.
    ViewUnmapped(ViewId),
    /// A view was destroyed.
    ViewDestroyed(ViewId),
    /// A view changed its title.
    ViewTitleChanged(ViewId, String),
    /// A client asked to enter or leave fullscreen.
    ViewRequestFullscreen(ViewId, bool),
    /// A client asked to be minimized or unminimized.
    ViewRequestMinimize(ViewId, bool),
    /// An interactive resize of a view finished with this geometry.
    ViewResizedByUser(ViewId, Rect),
    /// A key was pressed on a seat keyboard.
    KeyPress(KeyEvent),
    /// A key was released on a seat keyboard.
    KeyRelease(KeyEvent),
    /// The modifier state changed without a key event being delivered.
    ModifiersChanged(ModifiersEvent),
    /// The active keyboard layout changed.
    KeyboardLayoutChanged(usize),
    /// An output was connected.
    OutputAdded(Output),
    /// An output was disconnected.
    OutputRemoved(OutputId),
    /// Layer-shell exclusive zones changed an output's usable area.
    UsableAreaChanged(OutputId, Rect),
    /// Unknown event type, used as a catchall for events not tracked
    /// by tatamiwm.
    Unknown(u32),
}

/// Data associated with a view being mapped.
#[derive(Debug, Clone)]
pub struct ViewMapEvent {
    /// The handle issued for the new view.
    pub id: ViewId,
    /// The application identifier, if the client set one.
    pub app_id: String,
    /// The initial title.
    pub title: String,
    /// The geometry the client mapped at.
    pub geometry: Rect,
    /// The parent view for dialogs.
    pub parent: Option<ViewId>,
    /// Whether the view declared itself a modal dialog.
    pub modal: bool,
    /// The focus policy requested by window rules, if any.
    pub focus_policy: Option<FocusPolicy>,
    /// Server-side decoration thickness, if the view is decorated.
    pub margins: Option<Margins>,
    /// Whether the client mapped already wanting fullscreen.
    pub wants_fullscreen: bool,
}

/// Data associated with a key press or release event.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// The name of the input device that produced the event.
    pub device: String,
    /// Whether the device is a virtual keyboard.
    pub virtual_device: bool,
    /// The keycode of the key.
    pub keycode: KeyCode,
    /// The modifier state active at the time.
    pub mods: ModMask,
    /// Keysyms after keymap translation (shift level applied).
    pub translated: Vec<Keysym>,
    /// Keysyms at shift level zero.
    pub raw: Vec<Keysym>,
    /// The event timestamp in milliseconds.
    pub time_msec: u32,
}

/// Data associated with a modifier-only change.
#[derive(Debug, Clone)]
pub struct ModifiersEvent {
    /// The name of the input device that produced the event.
    pub device: String,
    /// Whether the device is a virtual keyboard.
    pub virtual_device: bool,
    /// The new modifier state.
    pub mods: ModMask,
}
