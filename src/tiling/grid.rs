//! Grid dimension selection and cell math for the tiling engine.
//!
//! Cell positions are computed so that gaps between cells and at the
//! area edges are uniform; integer division remainders are absorbed
//! by the last column and the last row so the grid always reaches the
//! far edges of the area.

use crate::core::types::Rect;

/// The shape of a tiled grid for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GridSpec {
    pub cols: i32,
    pub rows: i32,
    /// Three views split as one full-height cell on the left and two
    /// half-height cells on the right.
    pub vertical_split_three: bool,
}

impl GridSpec {
    fn new(cols: i32, rows: i32) -> Self {
        Self {
            cols,
            rows,
            vertical_split_three: false,
        }
    }
}

/// Chooses grid dimensions for `n` views.
///
/// Tie-breakers come from view rules (`prefer_*`) and, failing those,
/// the aspect ratio of the area being tiled.
pub(crate) fn grid_dims(
    n: usize,
    aspect: f64,
    prefer_vertical: bool,
    prefer_horizontal: bool,
) -> GridSpec {
    match n {
        0 | 1 => GridSpec::new(1, 1),
        2 => GridSpec::new(2, 1),
        3 => {
            if prefer_vertical || (!prefer_horizontal && aspect <= 1.5) {
                GridSpec {
                    cols: 2,
                    rows: 2,
                    vertical_split_three: true,
                }
            } else {
                GridSpec::new(2, 2)
            }
        }
        4 => GridSpec::new(2, 2),
        5 => {
            if prefer_vertical || (!prefer_horizontal && aspect <= 1.3) {
                GridSpec::new(2, 3)
            } else {
                GridSpec::new(3, 2)
            }
        }
        6 => GridSpec::new(3, 2),
        _ => GridSpec::new(3, ((n + 2) / 3) as i32),
    }
}

/// Computes the `n` cell rectangles of a grid over `area`, row-major
/// from the top-left.
///
/// An incomplete last row is widened so its cells fill the row; the
/// last column and last row absorb rounding remainders.
pub(crate) fn cells(n: usize, area: Rect, gap: i32, spec: GridSpec) -> Vec<Rect> {
    if n == 0 || area.is_degenerate() {
        return Vec::new();
    }
    if spec.vertical_split_three && n == 3 {
        return vertical_split_three(area, gap);
    }

    let cols = spec.cols.max(1);
    let rows = spec.rows.max(1);
    let cell_w = (area.width - (cols + 1) * gap) / cols;
    let cell_h = (area.height - (rows + 1) * gap) / rows;

    let last_row_count = {
        let rem = n as i32 % cols;
        if rem == 0 {
            cols
        } else {
            rem
        }
    };

    let mut out = Vec::with_capacity(n);
    for i in 0..n as i32 {
        let row = i / cols;
        let col = i % cols;
        let last_row = row == rows - 1;

        let (w, x) = if last_row && last_row_count != cols {
            let w = (area.width - (last_row_count + 1) * gap) / last_row_count;
            (w, area.x + gap + col * (w + gap))
        } else {
            (cell_w, area.x + gap + col * (cell_w + gap))
        };
        let y = area.y + gap + row * (cell_h + gap);

        let mut cell = Rect::new(x, y, w, cell_h);
        // the last column and row absorb the division remainder
        let row_count = if last_row { last_row_count } else { cols };
        if col == row_count - 1 {
            cell.width = area.right() - gap - cell.x;
        }
        if last_row {
            cell.height = area.bottom() - gap - cell.y;
        }
        out.push(cell);
    }
    out
}

/// One full-height cell on the left, two half-height cells stacked on
/// the right.
fn vertical_split_three(area: Rect, gap: i32) -> Vec<Rect> {
    let cell_w = (area.width - 3 * gap) / 2;
    let cell_h = (area.height - 3 * gap) / 2;

    let left = Rect::new(area.x + gap, area.y + gap, cell_w, area.height - 2 * gap);
    let right_x = area.x + 2 * gap + cell_w;
    let right_w = area.right() - gap - right_x;
    let top = Rect::new(right_x, area.y + gap, right_w, cell_h);
    let bottom_y = area.y + 2 * gap + cell_h;
    let bottom = Rect::new(right_x, bottom_y, right_w, area.bottom() - gap - bottom_y);

    vec![left, top, bottom]
}

/// Computes `n` cells stacked along one axis of a strip.
///
/// Left/right strips stack their views in a single column; top/bottom
/// strips lay them out in a single row.
pub(crate) fn stack_cells(n: usize, strip: Rect, gap: i32, horizontal: bool) -> Vec<Rect> {
    if n == 0 || strip.is_degenerate() {
        return Vec::new();
    }
    let n_i = n as i32;
    let mut out = Vec::with_capacity(n);

    if horizontal {
        let cell_w = (strip.width - (n_i + 1) * gap) / n_i;
        let y = strip.y + gap;
        let h = strip.height - 2 * gap;
        for i in 0..n_i {
            let x = strip.x + gap + i * (cell_w + gap);
            let w = if i == n_i - 1 {
                strip.right() - gap - x
            } else {
                cell_w
            };
            out.push(Rect::new(x, y, w, h));
        }
    } else {
        let cell_h = (strip.height - (n_i + 1) * gap) / n_i;
        let x = strip.x + gap;
        let w = strip.width - 2 * gap;
        for i in 0..n_i {
            let y = strip.y + gap + i * (cell_h + gap);
            let h = if i == n_i - 1 {
                strip.bottom() - gap - y
            } else {
                cell_h
            };
            out.push(Rect::new(x, y, w, h));
        }
    }
    out
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
    fn two_views_split_side_by_side() {
        let spec = grid_dims(2, AREA.aspect_ratio(), false, false);
        let cells = cells(2, AREA, 10, spec);
        assert_eq!(cells[0], Rect::new(10, 10, 485, 580));
        assert_eq!(cells[1], Rect::new(505, 10, 485, 580));
    }

    #[test]
    fn three_views_on_wide_area_widen_last_row() {
        // aspect 1000/600 > 1.5, no preference
        let spec = grid_dims(3, AREA.aspect_ratio(), false, false);
        assert!(!spec.vertical_split_three);

        let cells = cells(3, AREA, 10, spec);
        assert_eq!(cells[0], Rect::new(10, 10, 485, 285));
        assert_eq!(cells[1], Rect::new(505, 10, 485, 285));
        assert_eq!(cells[2], Rect::new(10, 305, 980, 285));
    }

    #[test]
    fn three_views_vertical_preference_splits_left_full_height() {
        let spec = grid_dims(3, AREA.aspect_ratio(), true, false);
        assert!(spec.vertical_split_three);

        let cells = cells(3, AREA, 10, spec);
        assert_eq!(cells[0], Rect::new(10, 10, 485, 580));
        assert_eq!(cells[1], Rect::new(505, 10, 485, 285));
        assert_eq!(cells[2], Rect::new(505, 305, 485, 285));
    }

    #[test]
    fn single_view_fills_area_minus_gaps() {
        let spec = grid_dims(1, AREA.aspect_ratio(), false, false);
        let cells = cells(1, AREA, 10, spec);
        assert_eq!(cells, vec![Rect::new(10, 10, 980, 580)]);
    }

    #[test]
    fn five_views_follow_aspect_tiebreak() {
        // 1000/600 = 1.67 > 1.3: three columns
        assert_eq!(
            grid_dims(5, AREA.aspect_ratio(), false, false),
            GridSpec::new(3, 2)
        );
        // square-ish area: two columns, three rows
        assert_eq!(grid_dims(5, 1.0, false, false), GridSpec::new(2, 3));
    }

    #[test]
    fn seven_or_more_use_three_columns() {
        assert_eq!(grid_dims(7, 2.0, false, false), GridSpec::new(3, 3));
        assert_eq!(grid_dims(9, 2.0, false, false), GridSpec::new(3, 3));
        assert_eq!(grid_dims(10, 2.0, false, false), GridSpec::new(3, 4));
    }

    #[test]
    fn grid_cells_stay_within_area_and_disjoint() {
        for n in 1..=12usize {
            let spec = grid_dims(n, AREA.aspect_ratio(), false, false);
            let cells = cells(n, AREA, 10, spec);
            assert_eq!(cells.len(), n);
            for (i, a) in cells.iter().enumerate() {
                assert!(!a.is_degenerate(), "n={} cell {} degenerate", n, i);
                assert!(
                    a.x >= AREA.x && a.y >= AREA.y && a.right() <= AREA.right()
                        && a.bottom() <= AREA.bottom(),
                    "n={} cell {} out of area: {}",
                    n,
                    i,
                    a
                );
                for b in cells.iter().skip(i + 1) {
                    assert!(!a.intersects(b), "n={} cells overlap: {} {}", n, a, b);
                }
            }
        }
    }

    #[test]
    fn column_stack_in_left_strip() {
        let strip = Rect::new(0, 0, 505, 600);
        let cells = stack_cells(2, strip, 10, false);
        assert_eq!(cells[0], Rect::new(10, 10, 485, 285));
        assert_eq!(cells[1], Rect::new(10, 305, 485, 285));
    }
}
