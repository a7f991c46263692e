//! Core functionality of tatamiwm's interface with the scene backend.
//!
//! This module defines core types and traits used throughout this
//! crate for talking to the display stack that owns surfaces, scene
//! nodes, outputs and the seat.

use thiserror::Error;

use crate::core::output::Output;
use crate::core::types::{Cardinal, Point, Rect};
use crate::scene::event::{KeyEvent, SceneEvent};
use crate::scene::input::{keysym::Keysym, KeyCode, MenuKey, ModMask};

/// A stable handle for a managed view.
///
/// Handles are issued by the backend when a toplevel maps and are
/// never reused for the lifetime of the compositor.
pub type ViewId = u64;

/// A stable handle for an output.
pub type OutputId = u32;

/// A handle for a node in the backend's scene graph.
pub type NodeId = u64;

/// A corner of a server-side decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// A part of a server-side decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdPart {
    Titlebar,
    Title,
    Button,
    Border(Cardinal),
    Corner(Corner),
}

/// The descriptor tag a scene node can carry in its opaque slot.
///
/// Walking up from the node under the cursor until one of these is
/// found classifies what the cursor is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTag {
    /// The root of the scene.
    Root,
    /// A client surface belonging to a view.
    View(ViewId),
    /// A layer-shell surface on an output.
    LayerSurface(OutputId),
    /// An item in an open menu.
    MenuItem(u32),
    /// An entry in the window-switcher on-screen display.
    CycleOsdItem(ViewId),
    /// A server-side decoration part of a view.
    Ssd(SsdPart, ViewId),
    /// An override-redirect X surface not managed by the compositor.
    XSurfaceUnmanaged,
}

/// Possible errors returned by the scene backend.
#[derive(Debug, Error, Clone)]
pub enum SceneError {
    /// An error in the connection to the display stack.
    #[error("Scene connection error: {0}")]
    Connection(String),

    /// A request referenced a view the backend does not know.
    #[error("Unknown view {0}")]
    UnknownView(ViewId),

    /// A commit was requested on a view with no mapped surface.
    #[error("View {0} is not mapped")]
    NotMapped(ViewId),

    /// A request referenced an output the backend does not know.
    #[error("Unknown output {0}")]
    UnknownOutput(OutputId),

    /// An internal backend error.
    #[error("Scene backend error: {0}")]
    ServerError(String),

    /// The backend does not support the request.
    #[error("Unsupported request: {0}")]
    Unsupported(&'static str),
}

/// Result type for SceneConn.
pub type Result<T> = ::core::result::Result<T, SceneError>;

/// A trait used to define the interface between tatamiwm and the
/// display stack.
///
/// SceneConn provides an abstraction layer over the compositor
/// library that owns surfaces, scene nodes, the seat and the outputs.
/// Its methods are designed to provide as thin a layer as possible,
/// mapping directly onto operations the library already exposes, with
/// type conversion to present dependency-agnostic types.
///
/// An implementation of `SceneConn` is required for running a
/// [`Server`](crate::manager::Server). The backend library never
/// appears in the server's public API, so the core can run on any
/// display stack with a proper implementor of this trait. This crate
/// provides one, [`HeadlessConn`](crate::scene::headless::HeadlessConn),
/// which runs without a display.
pub trait SceneConn {
    //* General operations

    /// Receives the next event from the backend.
    ///
    /// If no events are queued, returns Ok(None), allowing the event
    /// loop to continue and handle other processing. If the
    /// connection has an error, it returns Err.
    fn poll_next_event(&self) -> Result<Option<SceneEvent>>;

    /// Returns all currently connected outputs.
    fn all_outputs(&self) -> Result<Vec<Output>>;

    //* View plumbing

    /// Commits a new geometry to the client behind a view.
    ///
    /// Fails with [`SceneError::NotMapped`] if the view has no mapped
    /// surface to configure.
    fn configure_view(&self, view: ViewId, geom: Rect) -> Result<()>;

    /// Asks the client behind a view to close.
    fn close_view(&self, view: ViewId) -> Result<()>;

    /// Hides or shows a view's scene tree.
    fn set_view_hidden(&self, view: ViewId, hidden: bool) -> Result<()>;

    /// Restacks a view's scene tree above its siblings.
    fn raise_view(&self, view: ViewId) -> Result<()>;

    /// Restacks a view's scene tree below its siblings.
    fn lower_view(&self, view: ViewId) -> Result<()>;

    /// Tells the client whether it is the activated (focused) toplevel.
    fn set_activated(&self, view: ViewId, activated: bool) -> Result<()>;

    //* Seat and focus

    /// Gives keyboard focus to a view's surface.
    fn focus_view_surface(&self, view: ViewId) -> Result<()>;

    /// Sends a preferred-focus hint without forcing focus.
    fn offer_focus(&self, view: ViewId) -> Result<()>;

    /// Clears keyboard focus entirely.
    fn clear_keyboard_focus(&self);

    /// Warps the cursor to a layout position.
    fn warp_cursor(&self, to: Point);

    /// The current cursor position in layout coordinates.
    fn cursor_pos(&self) -> Point;

    /// Recomputes pointer focus from the current cursor position.
    fn update_pointer_focus(&self);

    /// Whether the session is currently locked.
    fn session_locked(&self) -> bool;

    /// Activates the keyboard layout with the given index.
    fn set_keyboard_layout(&self, index: usize);

    //* Scene graph introspection

    /// The topmost scene node at a layout position.
    fn node_at(&self, at: Point) -> Option<NodeId>;

    /// The parent of a scene node.
    fn node_parent(&self, node: NodeId) -> Option<NodeId>;

    /// The descriptor tag stored in a node's opaque slot, if any.
    fn node_tag(&self, node: NodeId) -> Option<NodeTag>;

    /// Converts a layout position into surface-local coordinates of a
    /// view's surface.
    fn surface_local(&self, view: ViewId, at: Point) -> Option<(f64, f64)>;

    /// The size of a view's surface in surface-local coordinates.
    fn view_surface_size(&self, view: ViewId) -> Option<(f64, f64)>;

    //* Layer shell

    /// Enables or disables the "top" layer on an output.
    fn set_top_layer_enabled(&self, output: OutputId, enabled: bool);

    //* Keyboard

    /// The active keyboard's repeat rate in Hz and delay in ms.
    fn repeat_info(&self) -> (i32, i32);

    /// Resolves a keysym to the keycodes producing it under the
    /// currently active keymap layout.
    fn keycodes_for_keysym(&self, sym: Keysym) -> Vec<KeyCode>;

    /// Forwards a key event to the focused client, routing it through
    /// the input-method grab if one is active.
    fn forward_key(&self, event: &KeyEvent, pressed: bool);

    /// Sends a modifier update to the focused client; with `broadcast`
    /// set, also to every unfocused seat client with fresh serials.
    fn forward_modifiers(&self, mods: ModMask, broadcast: bool);

    /// Switches to the given virtual terminal.
    fn switch_vt(&self, vt: u32) -> Result<()>;

    /// Routes a consumed key to menu navigation.
    fn notify_menu_key(&self, key: MenuKey);

    //* Provided methods

    /// Walks the scene graph upward from the node under `at` until a
    /// descriptor tag is found.
    fn tag_at(&self, at: Point) -> Option<NodeTag> {
        let mut node = self.node_at(at)?;
        loop {
            if let Some(tag) = self.node_tag(node) {
                return Some(tag);
            }
            node = self.node_parent(node)?;
        }
    }

    /// Surface-local cursor coordinates for a view, clamped so that
    /// fractional positions on the far edges stay inside the surface.
    fn surface_local_clamped(&self, view: ViewId, at: Point) -> Option<(f64, f64)> {
        let (mut x, mut y) = self.surface_local(view, at)?;
        if let Some((w, h)) = self.view_surface_size(view) {
            if x > w - 1.0 {
                x = w - 1.0;
            }
            if y > h - 1.0 {
                y = h - 1.0;
            }
        }
        Some((x, y))
    }
}
