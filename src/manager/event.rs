//! A translation layer for converting scene events into `Server`
//! actions.

use tracing::debug;

use crate::core::output::Output;
use crate::core::types::Rect;
use crate::scene::core::{OutputId, ViewId};
use crate::scene::event::{KeyEvent, ModifiersEvent, SceneEvent, ViewMapEvent};

/// High-level actions the server takes in response to scene events.
pub enum EventAction {
    /// Start managing a newly mapped view.
    MapView(ViewMapEvent),
    /// Stop showing an unmapped view.
    UnmapView(ViewId),
    /// Drop a destroyed view entirely.
    DestroyView(ViewId),
    /// Update a view's title.
    TitleChange(ViewId, String),
    /// Toggle the view in or out of fullscreen.
    SetFullscreen(ViewId, bool),
    /// Minimize or unminimize the view.
    SetMinimized(ViewId, bool),
    /// A user resize finished; the view becomes the tiling anchor.
    UserResize(ViewId, Rect),
    /// Run the keyboard engine on a press.
    RunKeyPress(KeyEvent),
    /// Run the keyboard engine on a release.
    RunKeyRelease(KeyEvent),
    /// Propagate a modifier-only change.
    UpdateModifiers(ModifiersEvent),
    /// Remember the new keyboard layout on the focused view.
    LayoutChanged(usize),
    /// Track a new output.
    OutputAdded(Output),
    /// Drop a disconnected output.
    OutputRemoved(OutputId),
    /// An output's usable area changed.
    UsableAreaChanged(OutputId, Rect),
}

impl EventAction {
    pub(crate) fn from_scene_event(event: SceneEvent) -> Vec<EventAction> {
        use EventAction::*;
        use SceneEvent as E;

        match event {
            E::ViewMapped(ev) => {
                debug!("map for view {}", ev.id);
                vec![MapView(ev)]
            }
            E::ViewUnmapped(id) => {
                debug!("unmap for view {}", id);
                vec![UnmapView(id)]
            }
            E::ViewDestroyed(id) => {
                debug!("destroy for view {}", id);
                vec![DestroyView(id)]
            }
            E::ViewTitleChanged(id, title) => vec![TitleChange(id, title)],
            E::ViewRequestFullscreen(id, on) => {
                debug!("fullscreen request for view {}: {}", id, on);
                vec![SetFullscreen(id, on)]
            }
            E::ViewRequestMinimize(id, on) => {
                debug!("minimize request for view {}: {}", id, on);
                vec![SetMinimized(id, on)]
            }
            E::ViewResizedByUser(id, geom) => {
                debug!("user resize of view {} to {}", id, geom);
                vec![UserResize(id, geom)]
            }
            E::KeyPress(ev) => vec![RunKeyPress(ev)],
            E::KeyRelease(ev) => vec![RunKeyRelease(ev)],
            E::ModifiersChanged(ev) => vec![UpdateModifiers(ev)],
            E::KeyboardLayoutChanged(idx) => vec![LayoutChanged(idx)],
            E::OutputAdded(output) => {
                debug!("output {} added", output.name());
                vec![OutputAdded(output)]
            }
            E::OutputRemoved(id) => {
                debug!("output {} removed", id);
                vec![OutputRemoved(id)]
            }
            E::UsableAreaChanged(id, usable) => vec![UsableAreaChanged(id, usable)],
            E::Unknown(code) => {
                debug!("unrecognised event: code {}", code);
                vec![]
            }
        }
    }
}
