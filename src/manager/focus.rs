//! The focus controller: keyboard focus policy and cursor-context
//! resolution.

use tracing::{debug, instrument, warn};

use crate::core::types::Point;
use crate::core::view::{FocusPolicy, ViewId};
use crate::input::InputMode;
use crate::manager::Server;
use crate::scene::core::{Corner, NodeTag, OutputId, SceneConn, SsdPart};
use crate::types::Cardinal;
use crate::Result;

/// How far from a decoration corner a border hit still counts as a
/// corner resize.
const SSD_CORNER_RANGE: i32 = 16;

/// What the cursor is over, after walking the scene graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorContext {
    Root,
    /// A client surface, with the clamped surface-local coordinates.
    Client(ViewId, (f64, f64)),
    LayerSurface(OutputId),
    MenuItem(u32),
    CycleOsdItem(ViewId),
    Ssd(SsdContext, ViewId),
    UnmanagedXSurface,
    None,
}

/// A server-side decoration hit, refined by the resize hit-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdContext {
    Titlebar,
    Title,
    Button,
    ResizeEdge(Cardinal),
    ResizeCorner(Corner),
}

impl<C: SceneConn + 'static> Server<C> {
    /// Gives keyboard focus to a view according to its policy.
    ///
    /// With `raise` set, the view (and its modal dialogs) is also
    /// moved to the front of its workspace first.
    #[instrument(level = "debug", skip(self))]
    pub fn focus_view(&mut self, id: ViewId, raise: bool) -> Result<()> {
        if self.input_mode == InputMode::Cycle {
            debug!("not focusing view {}: window switcher active", id);
            return Ok(());
        }
        let view = match self.views.lookup(id) {
            Some(v) => v,
            None => {
                warn!("focus_view: view {} not managed", id);
                return Ok(());
            }
        };
        if !view.is_mapped() {
            debug!("not focusing unmapped view {}", id);
            return Ok(());
        }

        if view.is_minimized() {
            // unminimizing remaps the view; focus re-enters through
            // the map path
            let view = self.views.lookup_mut(id).unwrap();
            view.set_minimized(&self.conn, false)?;
            return Ok(());
        }

        let binding = view.binding();
        if let Some(ws) = binding.workspace() {
            if ws != self.desktop.current_idx() {
                // switch without chaining focus
                self.switch_workspace(ws, false)?;
            }
        }

        if raise {
            self.raise_view(id)?;
        }

        let target = self.views.modal_dialog_of(id).unwrap_or(id);
        let policy = self
            .views
            .lookup(target)
            .map(|v| v.focus_policy())
            .unwrap_or(FocusPolicy::Never);

        match policy {
            FocusPolicy::Always => {
                self.conn.focus_view_surface(target)?;
                self.note_focused(Some(target));
            }
            FocusPolicy::Likely | FocusPolicy::Unlikely => {
                self.conn.offer_focus(target)?;
                self.note_focused(Some(target));
            }
            FocusPolicy::Never => {}
        }
        Ok(())
    }

    /// The frontmost focusable, non-minimized view on a workspace.
    pub fn topmost_focusable(&self, workspace: usize) -> Option<ViewId> {
        self.desktop
            .stacking_of(workspace)
            .iter()
            .rev()
            .find(|id| {
                self.views
                    .lookup(**id)
                    .map(|v| v.is_focusable())
                    .unwrap_or(false)
            })
            .copied()
    }

    /// Focuses the frontmost focusable view on the current workspace,
    /// or clears keyboard focus if there is none.
    pub fn focus_topmost_view(&mut self) -> Result<()> {
        match self.topmost_focusable(self.desktop.current_idx()) {
            Some(id) => self.focus_view(id, false),
            None => {
                self.conn.clear_keyboard_focus();
                self.note_focused(None);
                Ok(())
            }
        }
    }

    /// Focuses the topmost focusable view intersecting an output and
    /// warps the cursor to it; with no candidate, the cursor is
    /// warped to the center of the output's usable area.
    pub fn focus_output(&mut self, output: OutputId) -> Result<()> {
        let Some((_, out)) = self.outputs.element_by(|o| o.id() == output) else {
            warn!("focus_output: unknown output {}", output);
            return Ok(());
        };
        let geometry = out.geometry();
        let usable = out.usable();

        let candidate = self
            .desktop
            .stacking()
            .iter()
            .rev()
            .find(|id| {
                self.views
                    .lookup(**id)
                    .map(|v| v.is_focusable() && v.current().intersects(&geometry))
                    .unwrap_or(false)
            })
            .copied();

        match candidate {
            Some(id) => {
                self.focus_view(id, false)?;
                let center = self.views.lookup(id).map(|v| v.current().center());
                if let Some(center) = center {
                    self.conn.warp_cursor(center);
                    self.conn.update_pointer_focus();
                }
            }
            None => {
                self.conn.warp_cursor(usable.center());
                self.conn.update_pointer_focus();
            }
        }
        Ok(())
    }

    /// Classifies what the cursor is currently over.
    pub fn cursor_context(&self) -> CursorContext {
        let at = self.conn.cursor_pos();
        let Some(tag) = self.conn.tag_at(at) else {
            return CursorContext::None;
        };

        match tag {
            NodeTag::Root => CursorContext::Root,
            NodeTag::View(id) => {
                let local = self.conn.surface_local_clamped(id, at).unwrap_or((0.0, 0.0));
                CursorContext::Client(id, local)
            }
            NodeTag::LayerSurface(output) => CursorContext::LayerSurface(output),
            NodeTag::MenuItem(item) => CursorContext::MenuItem(item),
            NodeTag::CycleOsdItem(id) => CursorContext::CycleOsdItem(id),
            NodeTag::Ssd(part, id) => CursorContext::Ssd(self.refine_ssd(part, id, at), id),
            NodeTag::XSurfaceUnmanaged => CursorContext::UnmanagedXSurface,
        }
    }

    /// The resize hit-test: border hits near a corner resolve to that
    /// corner, everything else keeps its part.
    fn refine_ssd(&self, part: SsdPart, id: ViewId, at: Point) -> SsdContext {
        let outer = self
            .views
            .lookup(id)
            .map(|v| match v.margins() {
                Some(m) => m.outset(v.current()),
                None => v.current(),
            })
            .unwrap_or_default();

        let near_left = at.x - outer.x <= SSD_CORNER_RANGE;
        let near_right = outer.right() - at.x <= SSD_CORNER_RANGE;
        let near_top = at.y - outer.y <= SSD_CORNER_RANGE;
        let near_bottom = outer.bottom() - at.y <= SSD_CORNER_RANGE;

        match part {
            SsdPart::Titlebar => SsdContext::Titlebar,
            SsdPart::Title => SsdContext::Title,
            SsdPart::Button => SsdContext::Button,
            SsdPart::Corner(c) => SsdContext::ResizeCorner(c),
            SsdPart::Border(edge) => {
                let corner = match edge {
                    Cardinal::Up | Cardinal::Down => {
                        let vertical = if edge == Cardinal::Up {
                            near_top
                        } else {
                            near_bottom
                        };
                        if vertical && near_left {
                            Some(if edge == Cardinal::Up {
                                Corner::TopLeft
                            } else {
                                Corner::BottomLeft
                            })
                        } else if vertical && near_right {
                            Some(if edge == Cardinal::Up {
                                Corner::TopRight
                            } else {
                                Corner::BottomRight
                            })
                        } else {
                            None
                        }
                    }
                    Cardinal::Left | Cardinal::Right => {
                        let horizontal = if edge == Cardinal::Left {
                            near_left
                        } else {
                            near_right
                        };
                        if horizontal && near_top {
                            Some(if edge == Cardinal::Left {
                                Corner::TopLeft
                            } else {
                                Corner::TopRight
                            })
                        } else if horizontal && near_bottom {
                            Some(if edge == Cardinal::Left {
                                Corner::BottomLeft
                            } else {
                                Corner::BottomRight
                            })
                        } else {
                            None
                        }
                    }
                };
                match corner {
                    Some(c) => SsdContext::ResizeCorner(c),
                    None => SsdContext::ResizeEdge(edge),
                }
            }
        }
    }
}
