//! The automatic tiling engine.
//!
//! When tiling is enabled, all tileable views on the current
//! workspace are arranged into a per-output grid. A manually resized
//! "anchor" view keeps its rectangle: only the views adjacent to it
//! are re-tiled, into the space the anchor leaves free. Grid mode
//! disables both anchor preservation and proactive fill.

pub(crate) mod anchor;
pub(crate) mod grid;

use strum::*;

use tracing::{debug, instrument};

use crate::core::types::Rect;
use crate::core::view::{TileDirection, ViewFilter, ViewId};
use crate::manager::Server;
use crate::scene::core::SceneConn;
use crate::{Result, TatamiError};

use anchor::{adjacent, adjust_anchor, proactive_fill, remaining_space};
use grid::{cells, grid_dims, stack_cells};

/// The externally visible tiling mode, as written to the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TilingStatus {
    /// Tiling is off; views stack freely.
    Stacking,
    /// Tiling is on with pure grid snapping.
    Grid,
    /// Tiling is on with anchor preservation and fill.
    Smart,
}

/// The anchor: the view most recently resized by the user, with the
/// rectangle it is preserved at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorState {
    pub view: ViewId,
    pub geometry: Rect,
}

/// Runtime state of the tiling engine.
#[derive(Debug, Clone, Default)]
pub struct TilingState {
    pub enabled: bool,
    pub grid_mode: bool,
    pub anchor: Option<AnchorState>,
}

impl TilingState {
    pub fn status(&self) -> TilingStatus {
        if !self.enabled {
            TilingStatus::Stacking
        } else if self.grid_mode {
            TilingStatus::Grid
        } else {
            TilingStatus::Smart
        }
    }
}

/// A geometry the engine wants committed to a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeAction {
    pub id: ViewId,
    pub geom: Rect,
}

impl ResizeAction {
    #[inline]
    pub fn new(id: ViewId, geom: Rect) -> Self {
        Self { id, geom }
    }
}

/// A view eligible for tiling, with its outer geometry and layout
/// preference, in stacking order back-to-front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tileable {
    pub id: ViewId,
    pub rect: Rect,
    pub direction: Option<TileDirection>,
}

/// Arranges the tileable views of one output.
///
/// Returns the geometries to commit, plus the adjusted anchor
/// rectangle to store back, if the anchor took part.
pub(crate) fn arrange_output(
    tileables: &[Tileable],
    usable: Rect,
    gap: i32,
    grid_mode: bool,
    anchor_in: Option<(ViewId, Rect)>,
) -> (Vec<ResizeAction>, Option<Rect>) {
    if tileables.is_empty() {
        return (Vec::new(), None);
    }

    let prefer_vertical = tileables
        .iter()
        .any(|t| t.direction == Some(TileDirection::Vertical));
    let prefer_horizontal = tileables
        .iter()
        .any(|t| t.direction == Some(TileDirection::Horizontal));

    let anchor_here = anchor_in.filter(|(id, _)| {
        !grid_mode && tileables.iter().any(|t| t.id == *id)
    });

    let (mut actions, new_anchor) = if let Some((anchor_id, anchor_rect)) = anchor_here {
        arrange_around_anchor(tileables, anchor_id, anchor_rect, usable, gap)
    } else {
        let spec = grid_dims(
            tileables.len(),
            usable.aspect_ratio(),
            prefer_vertical,
            prefer_horizontal,
        );
        let cells = cells(tileables.len(), usable, gap, spec);
        let actions = tileables
            .iter()
            .zip(cells)
            .map(|(t, c)| ResizeAction::new(t.id, c))
            .collect();
        (actions, None)
    };

    if !grid_mode {
        run_fill(tileables, &mut actions, new_anchor.map(|_| anchor_here.unwrap().0), usable, gap);
    }

    (actions, new_anchor)
}

fn arrange_around_anchor(
    tileables: &[Tileable],
    anchor_id: ViewId,
    anchor_rect: Rect,
    usable: Rect,
    gap: i32,
) -> (Vec<ResizeAction>, Option<Rect>) {
    let clamped = anchor_rect.clamp_within(&usable);

    let others: Vec<&Tileable> = tileables.iter().filter(|t| t.id != anchor_id).collect();
    let (adjacent_views, fixed_views): (Vec<&Tileable>, Vec<&Tileable>) = others
        .into_iter()
        .partition(|t| adjacent(&clamped, &t.rect, gap));

    let mut actions = Vec::new();
    let mut adjacent_rects: Vec<Rect> = Vec::new();

    if !adjacent_views.is_empty() {
        let current: Vec<Rect> = adjacent_views.iter().map(|t| t.rect).collect();
        let (side, strip) = remaining_space(&clamped, &current, &usable);
        let cells = stack_cells(adjacent_views.len(), strip, gap, side.horizontal());
        for (t, c) in adjacent_views.iter().zip(cells) {
            adjacent_rects.push(c);
            actions.push(ResizeAction::new(t.id, c));
        }
    }

    let fixed_rects: Vec<Rect> = fixed_views.iter().map(|t| t.rect).collect();
    let adjusted = adjust_anchor(clamped, &fixed_rects, &adjacent_rects, &usable, gap);
    actions.push(ResizeAction::new(anchor_id, adjusted));

    (actions, Some(adjusted))
}

/// Applies proactive fill over the final rectangles and folds any
/// changes back into the action list.
fn run_fill(
    tileables: &[Tileable],
    actions: &mut Vec<ResizeAction>,
    exclude: Option<ViewId>,
    usable: Rect,
    gap: i32,
) {
    let mut rects: Vec<(ViewId, Rect)> = tileables
        .iter()
        .map(|t| {
            let rect = actions
                .iter()
                .find(|a| a.id == t.id)
                .map(|a| a.geom)
                .unwrap_or(t.rect);
            (t.id, rect)
        })
        .collect();

    proactive_fill(&mut rects, exclude, &usable, gap);

    for (id, rect) in rects {
        if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
            action.geom = rect;
        } else {
            let unchanged = tileables
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.rect == rect)
                .unwrap_or(true);
            if !unchanged {
                actions.push(ResizeAction::new(id, rect));
            }
        }
    }
}

impl<C: SceneConn + 'static> Server<C> {
    /// Recomputes the tiled layout of every output.
    ///
    /// Never fails the compositor: geometry that comes out degenerate
    /// is skipped, and commits on unmapped views are dropped.
    #[instrument(level = "debug", skip(self))]
    pub fn retile_all(&mut self) -> Result<()> {
        if !self.tiling.enabled {
            return Ok(());
        }
        let ws = self.desktop.current_idx();
        let gap = self.config.gap;
        let order = self.desktop.stacking_of(ws);
        let outputs: Vec<_> = self.outputs.iter().cloned().collect();

        for output in outputs {
            let tileables: Vec<Tileable> = order
                .iter()
                .filter_map(|id| self.views.lookup(*id))
                .filter(|v| {
                    v.output() == Some(output.id())
                        && ViewFilter::Tileable.matches(v, ws)
                        && v.is_mapped()
                })
                .map(|v| Tileable {
                    id: v.id(),
                    rect: outer_rect(v),
                    direction: v.rules.tile_direction,
                })
                .collect();

            if tileables.is_empty() {
                continue;
            }

            let anchor = self.tiling.anchor.as_ref().and_then(|a| {
                let v = self.views.lookup(a.view)?;
                let here = v.is_mapped()
                    && v.output() == Some(output.id())
                    && v.binding().workspace() == Some(ws);
                if here {
                    Some((a.view, a.geometry))
                } else {
                    None
                }
            });

            let (actions, new_anchor) =
                arrange_output(&tileables, output.usable(), gap, self.tiling.grid_mode, anchor);

            if let (Some(state), Some(rect)) = (self.tiling.anchor.as_mut(), new_anchor) {
                state.geometry = rect;
            }
            self.apply_layout(actions)?;
        }
        Ok(())
    }

    fn apply_layout(&mut self, actions: Vec<ResizeAction>) -> Result<()> {
        for action in actions {
            let view = match self.views.lookup_mut(action.id) {
                Some(v) => v,
                None => continue,
            };
            let rect = match view.margins() {
                Some(m) => m.inset(action.geom),
                None => action.geom,
            };
            if rect.is_degenerate() {
                debug!("skipping degenerate geometry {} for view {}", rect, action.id);
                continue;
            }
            match view.move_resize(&self.conn, rect, true) {
                Ok(()) => view.set_tiled(true),
                Err(TatamiError::NotMapped(id)) => {
                    debug!("not committing to unmapped view {}", id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// The outer box of a view: its committed geometry grown by its SSD
/// margins.
fn outer_rect(view: &crate::core::view::View) -> Rect {
    match view.margins() {
        Some(m) => m.outset(view.current()),
        None => view.current(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USABLE: Rect = Rect {
        x: 0,
        y: 0,
        width: 1000,
        height: 600,
    };

    fn tileable(id: ViewId, rect: Rect) -> Tileable {
        Tileable {
            id,
            rect,
            direction: None,
        }
    }

    #[test]
    fn no_views_no_mutation() {
        let (actions, anchor) = arrange_output(&[], USABLE, 10, false, None);
        assert!(actions.is_empty());
        assert!(anchor.is_none());
    }

    #[test]
    fn anchor_keeps_rect_and_others_stack_on_the_left() {
        let anchor_rect = Rect::new(505, 10, 485, 580);
        let views = [
            tileable(1, Rect::new(10, 10, 485, 285)),
            tileable(2, anchor_rect),
            tileable(3, Rect::new(10, 305, 485, 285)),
        ];

        let (actions, new_anchor) =
            arrange_output(&views, USABLE, 10, false, Some((2, anchor_rect)));

        assert_eq!(new_anchor, Some(anchor_rect));
        let get = |id| actions.iter().find(|a| a.id == id).unwrap().geom;
        assert_eq!(get(1), Rect::new(10, 10, 485, 285));
        assert_eq!(get(3), Rect::new(10, 305, 485, 285));
        assert_eq!(get(2), anchor_rect);
    }

    #[test]
    fn anchor_filling_output_moves_nothing_else() {
        let anchor_rect = Rect::new(10, 10, 980, 580);
        let views = [tileable(1, anchor_rect)];
        let (actions, new_anchor) =
            arrange_output(&views, USABLE, 10, false, Some((1, anchor_rect)));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].geom, anchor_rect);
        assert_eq!(new_anchor, Some(anchor_rect));
    }

    #[test]
    fn grid_mode_ignores_the_anchor() {
        let anchor_rect = Rect::new(505, 10, 485, 580);
        let views = [
            tileable(1, Rect::new(10, 10, 485, 580)),
            tileable(2, anchor_rect),
        ];
        let (actions, new_anchor) =
            arrange_output(&views, USABLE, 10, true, Some((2, anchor_rect)));

        assert!(new_anchor.is_none());
        let get = |id| actions.iter().find(|a| a.id == id).unwrap().geom;
        assert_eq!(get(1), Rect::new(10, 10, 485, 580));
        assert_eq!(get(2), Rect::new(505, 10, 485, 580));
    }

    #[test]
    fn status_reflects_modes() {
        let mut state = TilingState::default();
        assert_eq!(state.status(), TilingStatus::Stacking);
        state.enabled = true;
        assert_eq!(state.status(), TilingStatus::Smart);
        state.grid_mode = true;
        assert_eq!(state.status(), TilingStatus::Grid);
        assert_eq!(state.status().to_string(), "grid");
    }
}
