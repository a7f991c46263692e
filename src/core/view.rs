//! This module exports View and ViewRing, which encapsulate data
//! about managed client windows and manage them internally respectively.

use std::collections::HashSet;

use tracing::debug;

use super::output::Output;
use super::ring::Ring;
use super::types::{Margins, Rect};

use crate::bindings::ActionKind;
use crate::scene::core::{OutputId, SceneConn, SceneError};
use crate::{Result, TatamiError};

pub use crate::scene::core::ViewId;

/// A Ring of type View.
///
/// Owns every view tracked by the compositor, in registration order.
/// Stacking order is not kept here; workspaces hold it as lists of
/// view handles.
pub type ViewRing = Ring<View>;

impl ViewRing {
    /// Wrapper around `Ring::remove` that takes a view ID instead of index.
    pub fn remove_by_id(&mut self, id: ViewId) -> Option<View> {
        if let Some(i) = self.get_idx(id) {
            self.remove(i)
        } else {
            None
        }
    }

    /// Wrapper around `Ring::index` that takes a view ID.
    pub fn get_idx(&self, id: ViewId) -> Option<usize> {
        self.element_by(|v| v.id() == id).map(|(i, _)| i)
    }

    /// Returns a reference to the view with the given ID.
    pub fn lookup(&self, id: ViewId) -> Option<&View> {
        if let Some(i) = self.get_idx(id) {
            self.get(i)
        } else {
            None
        }
    }

    /// Returns a mutable reference to the view with the given ID.
    pub fn lookup_mut(&mut self, id: ViewId) -> Option<&mut View> {
        if let Some(i) = self.get_idx(id) {
            self.get_mut(i)
        } else {
            None
        }
    }

    /// Tests whether the Ring contains a view with the given ID.
    pub fn contains(&self, id: ViewId) -> bool {
        self.get_idx(id).is_some()
    }

    /// Returns a reference to the view, or `ViewGone` if it is not managed.
    ///
    /// Mutating a destroyed view is a programming error, so unlike
    /// `lookup` this surfaces the failure to the error handler.
    pub fn expect(&self, id: ViewId) -> Result<&View> {
        self.lookup(id).ok_or(TatamiError::ViewGone(id))
    }

    /// Mutable counterpart of [`ViewRing::expect`].
    pub fn expect_mut(&mut self, id: ViewId) -> Result<&mut View> {
        self.lookup_mut(id).ok_or(TatamiError::ViewGone(id))
    }

    /// Finds the modal dialog attached to the given view, if any.
    ///
    /// Focus requests for a view with a modal dialog are redirected
    /// to the dialog.
    pub fn modal_dialog_of(&self, id: ViewId) -> Option<ViewId> {
        self.iter()
            .find(|v| v.parent == Some(id) && v.modal && v.mapped)
            .map(|v| v.id())
    }
}

bitflags! {
    /// Bitmask of the outputs a view currently intersects, by the
    /// output's index in the server's output ring.
    pub struct OutputMask: u32 {
        const NONE = 0;
    }
}

impl OutputMask {
    /// The mask bit for the output at the given ring index.
    pub fn output(idx: usize) -> OutputMask {
        OutputMask::from_bits_truncate(1u32.checked_shl(idx as u32).unwrap_or(0))
    }
}

/// Maximization state of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maximized {
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Default for Maximized {
    fn default() -> Self {
        Maximized::None
    }
}

/// Policy of whether a view wants keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FocusPolicy {
    /// The view is always given focus when requested.
    Always,
    /// The view is offered focus and is expected to take it.
    Likely,
    /// The view is offered focus but may decline it.
    Unlikely,
    /// The view never receives keyboard focus.
    Never,
}

/// Where a view lives in the stacking model: on a workspace, or in
/// one of the two global bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceBinding {
    Workspace(usize),
    AlwaysOnTop,
    AlwaysOnBottom,
}

impl WorkspaceBinding {
    #[inline(always)]
    pub fn is_band(&self) -> bool {
        !matches!(self, WorkspaceBinding::Workspace(_))
    }

    /// The workspace index, if the view is not in a band.
    pub fn workspace(&self) -> Option<usize> {
        match self {
            WorkspaceBinding::Workspace(i) => Some(*i),
            _ => None,
        }
    }
}

/// Layout-direction preference a window rule can attach to a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileDirection {
    Vertical,
    Horizontal,
}

/// Per-view rules consumed from the configuration.
#[derive(Debug, Clone, Default)]
pub struct WindowRules {
    /// The view keeps its position; the tiling engine never moves it.
    pub fixed_position: bool,
    /// Set to false to exclude the view from tiling entirely.
    pub no_tile: bool,
    /// Preferred split direction when this view participates in tiling.
    pub tile_direction: Option<TileDirection>,
}

/// Criteria sets for iterating over views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewFilter {
    Any,
    CurrentWorkspace,
    MappedAndFocusable,
    Tileable,
}

impl ViewFilter {
    /// Tests a view against this filter, given the current workspace index.
    pub fn matches(&self, view: &View, current_ws: usize) -> bool {
        match self {
            ViewFilter::Any => true,
            ViewFilter::CurrentWorkspace => view.binding.workspace() == Some(current_ws),
            ViewFilter::MappedAndFocusable => view.is_focusable(),
            ViewFilter::Tileable => {
                view.binding.workspace() == Some(current_ws) && view.mapped && view.is_tileable()
            }
        }
    }
}

/// Represents a managed client window.
///
/// Since this type is not Copy, it should not be passed around,
/// and should only be initialised and used within a `ViewRing`.
///
/// Instead of passing the entire View around, ViewIds can
/// be used instead.
#[derive(Debug, Clone)]
pub struct View {
    pub(crate) id: ViewId,
    pub(crate) app_id: String,
    pub(crate) title: String,

    /// Geometry last committed to the client.
    pub(crate) current: Rect,
    /// Geometry requested but not yet committed.
    pub(crate) pending: Rect,
    /// Pre-maximize geometry, restored on unmaximize.
    pub(crate) natural: Rect,
    pre_fullscreen: Option<Rect>,

    pub(crate) output: Option<OutputId>,
    pub(crate) outputs: OutputMask,
    pub(crate) binding: WorkspaceBinding,

    pub(crate) mapped: bool,
    pub(crate) been_mapped: bool,
    pub(crate) minimized: bool,
    pub(crate) fullscreen: bool,
    pub(crate) maximized: Maximized,
    pub(crate) tiled: bool,

    pub(crate) focus_policy: FocusPolicy,
    pub(crate) margins: Option<Margins>,
    pub(crate) layout_index: usize,

    pub(crate) parent: Option<ViewId>,
    pub(crate) modal: bool,

    pub(crate) rules: WindowRules,
    pub(crate) inhibited: HashSet<ActionKind>,
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl View {
    /// Creates a new view on the given workspace.
    pub fn new(id: ViewId, workspace: usize) -> Self {
        Self {
            id,
            app_id: String::new(),
            title: String::new(),
            current: Rect::zeroed(),
            pending: Rect::zeroed(),
            natural: Rect::zeroed(),
            pre_fullscreen: None,
            output: None,
            outputs: OutputMask::NONE,
            binding: WorkspaceBinding::Workspace(workspace),
            mapped: false,
            been_mapped: false,
            minimized: false,
            fullscreen: false,
            maximized: Maximized::None,
            tiled: false,
            focus_policy: FocusPolicy::Likely,
            margins: None,
            layout_index: 0,
            parent: None,
            modal: false,
            rules: WindowRules::default(),
            inhibited: HashSet::new(),
        }
    }

    #[inline(always)]
    pub fn id(&self) -> ViewId {
        self.id
    }

    #[inline(always)]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[inline(always)]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The geometry last committed to the client.
    #[inline(always)]
    pub fn current(&self) -> Rect {
        self.current
    }

    #[inline(always)]
    pub fn pending(&self) -> Rect {
        self.pending
    }

    /// The pre-maximize geometry.
    #[inline(always)]
    pub fn natural(&self) -> Rect {
        self.natural
    }

    #[inline(always)]
    pub fn binding(&self) -> WorkspaceBinding {
        self.binding
    }

    #[inline(always)]
    pub fn output(&self) -> Option<OutputId> {
        self.output
    }

    #[inline(always)]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    #[inline(always)]
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    #[inline(always)]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    #[inline(always)]
    pub fn maximized(&self) -> Maximized {
        self.maximized
    }

    #[inline(always)]
    pub fn is_tiled(&self) -> bool {
        self.tiled
    }

    #[inline(always)]
    pub fn focus_policy(&self) -> FocusPolicy {
        self.focus_policy
    }

    #[inline(always)]
    pub fn margins(&self) -> Option<Margins> {
        self.margins
    }

    /// Tests whether the view can take keyboard focus right now.
    pub fn is_focusable(&self) -> bool {
        self.mapped && !self.minimized && self.focus_policy != FocusPolicy::Never
    }

    /// Tests whether the view is eligible for automatic tiling.
    pub fn is_tileable(&self) -> bool {
        !self.minimized
            && !self.fullscreen
            && !self.binding.is_band()
            && !self.rules.fixed_position
            && !self.rules.no_tile
    }

    /// Tests whether any of the given action kinds is inhibited by
    /// the client.
    pub fn inhibits_any(&self, kinds: impl Iterator<Item = ActionKind>) -> bool {
        let mut kinds = kinds;
        kinds.any(|k| self.inhibited.contains(&k))
    }

    /// Marks the view as placed by the tiling engine, or clears the mark.
    pub fn set_tiled(&mut self, tiled: bool) {
        self.tiled = tiled;
    }

    /// Recomputes the bitmask of outputs this view intersects.
    pub fn update_output_mask<'a>(&mut self, outputs: impl Iterator<Item = &'a Output>) {
        let mut mask = OutputMask::NONE;
        for (i, o) in outputs.enumerate() {
            if self.current.intersects(&o.geometry()) {
                mask.insert(OutputMask::output(i));
            }
        }
        self.outputs = mask;
    }

    /// Commits a new geometry to the client.
    ///
    /// If the view is maximized, it is first unmaximized without
    /// storing its natural geometry. If it is tiled and the caller is
    /// not the tiling engine, the tiled flag is cleared.
    pub fn move_resize<C: SceneConn>(&mut self, conn: &C, rect: Rect, by_tiler: bool) -> Result<()> {
        if self.maximized != Maximized::None {
            self.maximized = Maximized::None;
        }
        if self.tiled && !by_tiler {
            self.tiled = false;
        }
        self.pending = rect;
        self.commit(conn)
    }

    /// Maximizes the view over the given usable area.
    ///
    /// With `store` set, the current geometry is saved so that a
    /// later restore returns to it.
    pub fn maximize<C: SceneConn>(
        &mut self,
        conn: &C,
        mode: Maximized,
        usable: Rect,
        store: bool,
    ) -> Result<()> {
        if mode == Maximized::None {
            return self.restore(conn);
        }
        if store && self.maximized == Maximized::None {
            self.natural = self.current;
        }
        self.pending = match mode {
            Maximized::Both => usable,
            Maximized::Horizontal => {
                Rect::new(usable.x, self.current.y, usable.width, self.current.height)
            }
            Maximized::Vertical => {
                Rect::new(self.current.x, usable.y, self.current.width, usable.height)
            }
            Maximized::None => unreachable!(),
        };
        self.maximized = mode;
        self.tiled = false;
        self.commit(conn)
    }

    /// Restores the view to its natural geometry.
    pub fn restore<C: SceneConn>(&mut self, conn: &C) -> Result<()> {
        if self.maximized == Maximized::None {
            return Ok(());
        }
        self.maximized = Maximized::None;
        self.pending = self.natural;
        self.commit(conn)
    }

    /// Minimizes or unminimizes the view.
    ///
    /// Minimizing an unmapped view is a no-op. Unminimizing shows the
    /// view again; the caller re-enters focus through the map path.
    pub fn set_minimized<C: SceneConn>(&mut self, conn: &C, minimize: bool) -> Result<()> {
        if minimize {
            if !self.mapped {
                debug!("minimize on unmapped view {}", self.id);
                return Ok(());
            }
            self.minimized = true;
            conn.set_view_hidden(self.id, true)?;
        } else if self.minimized {
            self.minimized = false;
            conn.set_view_hidden(self.id, false)?;
        }
        Ok(())
    }

    /// Puts the view into or takes it out of fullscreen.
    ///
    /// A view cannot be fullscreen and minimized at the same time, so
    /// entering fullscreen unminimizes first.
    pub fn set_fullscreen<C: SceneConn>(&mut self, conn: &C, on: bool, full: Rect) -> Result<()> {
        if on == self.fullscreen {
            return Ok(());
        }
        if on {
            if self.minimized {
                self.set_minimized(conn, false)?;
            }
            self.pre_fullscreen = Some(self.current);
            self.fullscreen = true;
            self.pending = full;
        } else {
            self.fullscreen = false;
            if let Some(saved) = self.pre_fullscreen.take() {
                self.pending = saved;
            }
        }
        self.commit(conn)
    }

    /// Pushes the pending geometry to the client.
    ///
    /// Commits on unmapped views return `NotMapped`, which callers
    /// are expected to drop with a debug log.
    pub fn commit<C: SceneConn>(&mut self, conn: &C) -> Result<()> {
        match conn.configure_view(self.id, self.pending) {
            Ok(()) => {
                self.current = self.pending;
                Ok(())
            }
            Err(SceneError::NotMapped(id)) => Err(TatamiError::NotMapped(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::headless::HeadlessConn;

    fn mapped_view(id: ViewId) -> View {
        let mut v = View::new(id, 0);
        v.mapped = true;
        v.been_mapped = true;
        v
    }

    #[test]
    fn maximize_then_restore_is_bit_identical() {
        let conn = HeadlessConn::new();
        let mut v = mapped_view(1);
        conn.note_mapped(1);

        let orig = Rect::new(30, 40, 640, 480);
        v.move_resize(&conn, orig, false).unwrap();

        let usable = Rect::new(0, 0, 1000, 600);
        v.maximize(&conn, Maximized::Both, usable, true).unwrap();
        assert_eq!(v.current(), usable);

        v.restore(&conn).unwrap();
        assert_eq!(v.current(), orig);
        assert_eq!(v.natural(), orig);
    }

    #[test]
    fn move_resize_clears_tiled_unless_tiler() {
        let conn = HeadlessConn::new();
        conn.note_mapped(1);
        let mut v = mapped_view(1);
        v.set_tiled(true);

        v.move_resize(&conn, Rect::new(0, 0, 100, 100), true).unwrap();
        assert!(v.is_tiled());

        v.move_resize(&conn, Rect::new(0, 0, 120, 100), false).unwrap();
        assert!(!v.is_tiled());
    }

    #[test]
    fn minimize_unmapped_is_noop() {
        let conn = HeadlessConn::new();
        let mut v = View::new(7, 0);
        v.set_minimized(&conn, true).unwrap();
        assert!(!v.is_minimized());
    }

    #[test]
    fn fullscreen_clears_minimized() {
        let conn = HeadlessConn::new();
        conn.note_mapped(3);
        let mut v = mapped_view(3);
        v.set_minimized(&conn, true).unwrap();

        v.set_fullscreen(&conn, true, Rect::new(0, 0, 1000, 600))
            .unwrap();
        assert!(v.is_fullscreen());
        assert!(!v.is_minimized());
    }

    #[test]
    fn commit_on_unmapped_view_is_notmapped() {
        let conn = HeadlessConn::new();
        let mut v = View::new(9, 0);
        let err = v
            .move_resize(&conn, Rect::new(0, 0, 10, 10), false)
            .unwrap_err();
        assert!(matches!(err, TatamiError::NotMapped(9)));
    }
}
