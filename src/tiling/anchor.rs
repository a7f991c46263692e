//! Anchor preservation for the tiling engine.
//!
//! When the user has manually resized a view, that view becomes the
//! anchor: tiling keeps its rectangle and re-tiles only the views
//! adjacent to it, into the space the anchor leaves free.

use crate::core::types::Rect;
use crate::core::view::ViewId;

/// Edge-sharing tolerance on top of the configured gap.
pub(crate) const ADJACENCY_SLACK: i32 = 5;

/// The side of the anchor a strip of remaining space lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    /// Whether views re-tiled into this strip are laid out in a row.
    pub(crate) fn horizontal(self) -> bool {
        matches!(self, Side::Top | Side::Bottom)
    }
}

/// Tests whether a view is adjacent to the anchor: sharing an edge
/// within `gap + 5` pixels, or overlapping it outright.
pub(crate) fn adjacent(anchor: &Rect, view: &Rect, gap: i32) -> bool {
    if anchor.intersects(view) {
        return true;
    }
    let tol = gap + ADJACENCY_SLACK;
    let shares_vertical_edge = ((anchor.x - view.right()).abs() <= tol
        || (anchor.right() - view.x).abs() <= tol)
        && anchor.vertical_overlap(view) > 0;
    let shares_horizontal_edge = ((anchor.y - view.bottom()).abs() <= tol
        || (anchor.bottom() - view.y).abs() <= tol)
        && anchor.horizontal_overlap(view) > 0;
    shares_vertical_edge || shares_horizontal_edge
}

/// The side of the anchor a view lies on, judged by its center.
fn side_of(anchor: &Rect, view: &Rect) -> Side {
    let c = view.center();
    let a = anchor.center();
    let dx = c.x - a.x;
    let dy = c.y - a.y;
    if dx.abs() >= dy.abs() {
        if dx < 0 {
            Side::Left
        } else {
            Side::Right
        }
    } else if dy < 0 {
        Side::Top
    } else {
        Side::Bottom
    }
}

/// The strip of `area` on the given side of the anchor.
pub(crate) fn strip(side: Side, anchor: &Rect, area: &Rect) -> Rect {
    match side {
        Side::Left => Rect::new(area.x, area.y, anchor.x - area.x, area.height),
        Side::Right => Rect::new(
            anchor.right(),
            area.y,
            area.right() - anchor.right(),
            area.height,
        ),
        Side::Top => Rect::new(area.x, area.y, area.width, anchor.y - area.y),
        Side::Bottom => Rect::new(
            area.x,
            anchor.bottom(),
            area.width,
            area.bottom() - anchor.bottom(),
        ),
    }
}

/// Picks the strip to re-tile adjacent views into: the side they all
/// lie on if there is one, otherwise the largest free strip by area.
pub(crate) fn remaining_space(anchor: &Rect, adjacent: &[Rect], area: &Rect) -> (Side, Rect) {
    let mut sides = adjacent.iter().map(|r| side_of(anchor, r));
    if let Some(first) = sides.next() {
        if sides.all(|s| s == first) {
            return (first, strip(first, anchor, area));
        }
    }

    [Side::Left, Side::Right, Side::Top, Side::Bottom]
        .iter()
        .map(|s| (*s, strip(*s, anchor, area)))
        .max_by_key(|(_, r)| i64::from(r.width.max(0)) * i64::from(r.height.max(0)))
        .unwrap()
}

/// Adjusts the anchor's committed rectangle: shrink away from any
/// non-adjacent view it penetrates, clamp to the usable area, and if
/// nothing overlapped, grow into the largest free direction.
///
/// The result is written back as the new stored anchor geometry.
pub(crate) fn adjust_anchor(
    anchor: Rect,
    non_adjacent: &[Rect],
    adjacent: &[Rect],
    area: &Rect,
    gap: i32,
) -> Rect {
    let mut out = anchor;
    let mut overlapped = false;

    for r in non_adjacent {
        if out.intersection(r).is_none() {
            continue;
        }
        overlapped = true;
        out = shrink_away(out, r);
        if out.is_degenerate() {
            // shrinking consumed the anchor; fall back to clamping only
            out = anchor;
            break;
        }
    }

    out = out.clamp_within(area);

    if !overlapped {
        out = expand_anchor(out, non_adjacent, adjacent, area, gap);
    }
    out
}

/// Shrinks `a` so it no longer overlaps `r`, preferring the axis on
/// which the penetration is shallower, and on that axis the side the
/// overlap entered from. Falls back to the other side if the first
/// choice would consume the rectangle.
fn shrink_away(a: Rect, r: &Rect) -> Rect {
    let trim_right = |mut a: Rect| -> Rect {
        a.width = r.x - a.x;
        a
    };
    let trim_left = |mut a: Rect| -> Rect {
        let d = r.right() - a.x;
        a.x += d;
        a.width -= d;
        a
    };
    let trim_bottom = |mut a: Rect| -> Rect {
        a.height = r.y - a.y;
        a
    };
    let trim_top = |mut a: Rect| -> Rect {
        let d = r.bottom() - a.y;
        a.y += d;
        a.height -= d;
        a
    };

    let horizontal_first = a.horizontal_overlap(r) <= a.vertical_overlap(r);
    let candidates: [Rect; 4] = if horizontal_first {
        if r.center().x >= a.center().x {
            [trim_right(a), trim_left(a), trim_bottom(a), trim_top(a)]
        } else {
            [trim_left(a), trim_right(a), trim_top(a), trim_bottom(a)]
        }
    } else if r.center().y >= a.center().y {
        [trim_bottom(a), trim_top(a), trim_right(a), trim_left(a)]
    } else {
        [trim_top(a), trim_bottom(a), trim_left(a), trim_right(a)]
    };

    for c in candidates.iter() {
        if !c.is_degenerate() {
            return *c;
        }
    }
    a
}

/// Expands the anchor into the largest free direction, preferring
/// horizontal growth, if no other view blocks it.
fn expand_anchor(
    anchor: Rect,
    non_adjacent: &[Rect],
    adjacent: &[Rect],
    area: &Rect,
    gap: i32,
) -> Rect {
    let blocked = |strip: &Rect| {
        non_adjacent
            .iter()
            .chain(adjacent.iter())
            .any(|r| strip.intersects(r))
    };

    // (side, free pixels, horizontal)
    let free = [
        (Side::Right, area.right() - gap - anchor.right(), true),
        (Side::Left, anchor.x - (area.x + gap), true),
        (Side::Bottom, area.bottom() - gap - anchor.bottom(), false),
        (Side::Top, anchor.y - (area.y + gap), false),
    ];

    let best = free
        .iter()
        .filter(|(side, amount, _)| {
            *amount > gap && !blocked(&strip(*side, &anchor, area))
        })
        .max_by_key(|(_, amount, horizontal)| (i64::from(*horizontal), i64::from(*amount)));

    let Some((side, amount, _)) = best else {
        return anchor;
    };

    let mut out = anchor;
    match side {
        Side::Right => out.width += amount,
        Side::Left => {
            out.x -= amount;
            out.width += amount;
        }
        Side::Bottom => out.height += amount,
        Side::Top => {
            out.y -= amount;
            out.height += amount;
        }
    }
    out
}

/// One proactive-fill run: grows views into empty space at the sides
/// of the area, excluding the anchor view.
///
/// Views are visited in stacking order, back to front; the occupied
/// bounding rectangle is recomputed after each pass, up to 10 passes.
pub(crate) fn proactive_fill(
    rects: &mut [(ViewId, Rect)],
    exclude: Option<ViewId>,
    area: &Rect,
    gap: i32,
) {
    let tol = gap + ADJACENCY_SLACK;

    for _pass in 0..10 {
        let Some(bounds) = occupied_bounds(rects) else {
            return;
        };
        let mut expanded = false;

        let empty_right = area.right() - bounds.right();
        if empty_right > gap {
            let grow = empty_right - gap;
            for (id, r) in rects.iter_mut() {
                if Some(*id) != exclude && (bounds.right() - r.right()).abs() <= tol {
                    r.width += grow;
                    expanded = true;
                }
            }
        }

        let empty_left = bounds.x - area.x;
        if empty_left > gap {
            let grow = empty_left - gap;
            for (id, r) in rects.iter_mut() {
                if Some(*id) != exclude && (r.x - bounds.x).abs() <= tol {
                    r.x -= grow;
                    r.width += grow;
                    expanded = true;
                }
            }
        }

        let empty_bottom = area.bottom() - bounds.bottom();
        if empty_bottom > gap {
            let grow = empty_bottom - gap;
            for (id, r) in rects.iter_mut() {
                if Some(*id) != exclude && (bounds.bottom() - r.bottom()).abs() <= tol {
                    r.height += grow;
                    expanded = true;
                }
            }
        }

        let empty_top = bounds.y - area.y;
        if empty_top > gap {
            let grow = empty_top - gap;
            for (id, r) in rects.iter_mut() {
                if Some(*id) != exclude && (r.y - bounds.y).abs() <= tol {
                    r.y -= grow;
                    r.height += grow;
                    expanded = true;
                }
            }
        }

        if !expanded {
            return;
        }
    }
}

fn occupied_bounds(rects: &[(ViewId, Rect)]) -> Option<Rect> {
    let mut iter = rects.iter().map(|(_, r)| *r);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(&r)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AREA: Rect = Rect {
        x: 0,
        y: 0,
        width: 1000,
        height: 600,
    };

    #[test]
    fn edge_sharing_within_tolerance_is_adjacent() {
        let anchor = Rect::new(505, 10, 485, 580);
        // view ending 10px before the anchor's left edge
        let left = Rect::new(10, 10, 485, 285);
        assert!(adjacent(&anchor, &left, 10));

        // too far away
        let far = Rect::new(10, 10, 450, 285);
        assert!(!adjacent(&anchor, &far, 10));

        // overlap always counts
        let overlapping = Rect::new(400, 100, 200, 200);
        assert!(adjacent(&anchor, &overlapping, 10));
    }

    #[test]
    fn remaining_space_prefers_common_side() {
        let anchor = Rect::new(505, 10, 485, 580);
        let left_views = [Rect::new(10, 10, 485, 285), Rect::new(10, 305, 485, 285)];
        let (side, strip) = remaining_space(&anchor, &left_views, &AREA);
        assert_eq!(side, Side::Left);
        assert_eq!(strip, Rect::new(0, 0, 505, 600));
    }

    #[test]
    fn remaining_space_falls_back_to_largest_strip() {
        let anchor = Rect::new(300, 200, 200, 200);
        let around = [Rect::new(50, 200, 200, 100), Rect::new(550, 200, 200, 100)];
        let (side, _) = remaining_space(&anchor, &around, &AREA);
        // right strip (500 wide) beats left (300), top (200) and bottom (200)
        assert_eq!(side, Side::Right);
    }

    #[test]
    fn anchor_filling_output_leaves_no_adjacent_space() {
        let anchor = Rect::new(10, 10, 980, 580);
        let adjusted = adjust_anchor(anchor, &[], &[], &AREA, 10);
        assert_eq!(adjusted, anchor);
    }

    #[test]
    fn anchor_shrinks_away_from_fixed_views() {
        let anchor = Rect::new(100, 100, 500, 400);
        let fixed = [Rect::new(550, 100, 300, 400)];
        let adjusted = adjust_anchor(anchor, &fixed, &[], &AREA, 10);
        assert_eq!(adjusted, Rect::new(100, 100, 450, 400));
    }

    #[test]
    fn anchor_expands_into_free_space_preferring_horizontal() {
        let anchor = Rect::new(10, 10, 400, 580);
        let adjusted = adjust_anchor(anchor, &[], &[], &AREA, 10);
        assert_eq!(adjusted, Rect::new(10, 10, 980, 580));
    }

    #[test]
    fn anchor_does_not_expand_past_blocking_views() {
        let anchor = Rect::new(10, 10, 485, 580);
        let adj = [Rect::new(505, 10, 485, 580)];
        let adjusted = adjust_anchor(anchor, &[], &adj, &AREA, 10);
        assert_eq!(adjusted, anchor);
    }

    #[test]
    fn fill_grows_aligned_views_to_the_edge() {
        // two views leaving 300px free on the right
        let mut rects = vec![
            (1u64, Rect::new(10, 10, 330, 580)),
            (2u64, Rect::new(350, 10, 330, 580)),
        ];
        proactive_fill(&mut rects, None, &AREA, 10);
        // only the view on the occupied right edge grows
        assert_eq!(rects[0].1, Rect::new(10, 10, 330, 580));
        assert_eq!(rects[1].1, Rect::new(350, 10, 640, 580));
        assert_eq!(rects[1].1.right(), AREA.right() - 10);
    }

    #[test]
    fn fill_is_a_noop_on_a_full_grid() {
        let mut rects = vec![
            (1u64, Rect::new(10, 10, 485, 580)),
            (2u64, Rect::new(505, 10, 485, 580)),
        ];
        let before = rects.clone();
        proactive_fill(&mut rects, None, &AREA, 10);
        assert_eq!(rects, before);
    }
}
