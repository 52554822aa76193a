//! Chart sizing and subplot grid geometry
//!
//! All sizes are pixels. Axis domains are paper fractions in [0, 1], row 0 at
//! the top, and are rounded to six decimals so serialised figures stay
//! readable and stable.

use serde::Serialize;

pub const MIN_HEIGHT: u32 = 600;
pub const MAX_WIDTH: u32 = 1200;

pub const BAR_HEIGHT_PER_METRIC: u32 = 100;
pub const BAR_WIDTH_RATIO: f64 = 2.5;

pub const GROUPED_BAR_ROW_HEIGHT: u32 = 400;
pub const GROUPED_BAR_MARGIN: u32 = 150;

pub const TIME_SERIES_ROW_HEIGHT: u32 = 450;

pub const GRID_COLUMNS: usize = 2;
pub const HORIZONTAL_SPACING: f64 = 0.15;
const BASE_VERTICAL_SPACING: f64 = 0.2;
const MIN_VERTICAL_SPACING: f64 = 0.02;
const MAX_TOTAL_VERTICAL_SPACING: f64 = 0.8;

/// Single bar chart height: max(600, 100 × sub-metrics)
pub fn bar_height(sub_metrics: usize) -> u32 {
    MIN_HEIGHT.max(BAR_HEIGHT_PER_METRIC.saturating_mul(sub_metrics as u32))
}

/// Single bar chart width: min(1200, 2.5 × height)
pub fn bar_width(height: u32) -> u32 {
    let scaled = (f64::from(height) * BAR_WIDTH_RATIO).round() as u32;
    MAX_WIDTH.min(scaled)
}

/// Rows of a 2-column grid: ceil(cells / 2)
pub fn grid_rows(cells: usize) -> usize {
    cells.div_ceil(GRID_COLUMNS)
}

/// Columns actually used: a lone cell spans the full width
pub fn grid_columns(cells: usize) -> usize {
    cells.clamp(1, GRID_COLUMNS)
}

/// Grouped bar height: max(600, 400 × rows + 150)
pub fn grouped_bar_height(units: usize) -> u32 {
    let rows = grid_rows(units) as u32;
    MIN_HEIGHT.max(GROUPED_BAR_ROW_HEIGHT * rows + GROUPED_BAR_MARGIN)
}

/// Time series height: max(600, 450 × rows)
pub fn time_series_height(rows: usize) -> u32 {
    MIN_HEIGHT.max(TIME_SERIES_ROW_HEIGHT * rows as u32)
}

/// Gap between grid rows. Shrinks as rows grow and is bounded below by
/// 0.02 of the paper height, up to 41 rows. Past that the gaps together may
/// take at most 0.8 of the paper, so the floor gives way and every cell keeps
/// a visible share.
pub fn vertical_spacing(rows: usize) -> f64 {
    if rows <= 1 {
        return 0.0;
    }
    let gaps = (rows - 1) as f64;
    let ceiling = MAX_TOTAL_VERTICAL_SPACING / gaps;
    (BASE_VERTICAL_SPACING / gaps)
        .max(MIN_VERTICAL_SPACING)
        .min(ceiling)
}

/// One subplot cell with its axis domains
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub x: [f64; 2],
    pub y: [f64; 2],
}

impl GridCell {
    /// Paper position for a title centred above the cell
    pub fn title_anchor(&self) -> (f64, f64) {
        (round6((self.x[0] + self.x[1]) / 2.0), round6(self.y[1]))
    }
}

fn round6(v: f64) -> f64 {
    // `+ 0.0` folds -0.0 into 0.0
    (v * 1_000_000.0).round() / 1_000_000.0 + 0.0
}

/// Cells of a row-major grid holding `cells` subplots
pub fn grid_cells(cells: usize) -> Vec<GridCell> {
    if cells == 0 {
        return Vec::new();
    }
    let rows = grid_rows(cells);
    let cols = grid_columns(cells);
    let h_space = if cols > 1 { HORIZONTAL_SPACING } else { 0.0 };
    let v_space = vertical_spacing(rows);
    let cell_width = (1.0 - h_space * (cols - 1) as f64) / cols as f64;
    let cell_height = (1.0 - v_space * (rows - 1) as f64) / rows as f64;

    (0..cells)
        .map(|i| {
            let row = i / cols;
            let col = i % cols;
            let x0 = col as f64 * (cell_width + h_space);
            let y1 = 1.0 - row as f64 * (cell_height + v_space);
            GridCell {
                row,
                col,
                x: [round6(x0), round6(x0 + cell_width)],
                y: [round6(y1 - cell_height), round6(y1)],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_height() {
        assert_eq!(bar_height(3), 600);
        assert_eq!(bar_height(10), 1000);
        assert_eq!(bar_height(0), 600);
    }

    #[test]
    fn test_bar_width_is_capped() {
        assert_eq!(bar_width(600), 1200);
        assert_eq!(bar_width(400), 1000);
    }

    #[test]
    fn test_grid_rows() {
        assert_eq!(grid_rows(0), 0);
        assert_eq!(grid_rows(1), 1);
        assert_eq!(grid_rows(4), 2);
        assert_eq!(grid_rows(5), 3);
    }

    #[test]
    fn test_grouped_bar_height() {
        // 5 units, 3 rows: max(600, 400 * 3 + 150)
        assert_eq!(grouped_bar_height(5), 1350);
        assert_eq!(grouped_bar_height(1), 600);
        assert_eq!(grouped_bar_height(0), 600);
    }

    #[test]
    fn test_time_series_height() {
        assert_eq!(time_series_height(1), 600);
        assert_eq!(time_series_height(2), 900);
    }

    #[test]
    fn test_vertical_spacing_shrinks_with_rows() {
        assert_eq!(vertical_spacing(1), 0.0);
        assert!((vertical_spacing(2) - 0.2).abs() < 1e-12);
        assert!(vertical_spacing(5) < vertical_spacing(3));
        assert!((vertical_spacing(20) - 0.02).abs() < 1e-12);
        assert!((vertical_spacing(41) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_vertical_spacing_floor_yields_to_cell_share_past_41_rows() {
        assert!((vertical_spacing(50) - 0.8 / 49.0).abs() < 1e-12);
        assert!(vertical_spacing(50) < MIN_VERTICAL_SPACING);
        assert!((vertical_spacing(60) - 0.8 / 59.0).abs() < 1e-12);

        let cells = grid_cells(120);
        assert_eq!(grid_rows(120), 60);
        for cell in &cells {
            assert!(cell.y[0] >= 0.0);
            assert!(cell.y[1] > cell.y[0]);
            assert!(cell.y[1] <= 1.0);
        }
    }

    #[test]
    fn test_grid_cells_two_columns() {
        let cells = grid_cells(3);
        assert_eq!(cells.len(), 3);
        assert_eq!((cells[0].row, cells[0].col), (0, 0));
        assert_eq!((cells[1].row, cells[1].col), (0, 1));
        assert_eq!((cells[2].row, cells[2].col), (1, 0));
        assert_eq!(cells[0].x, [0.0, 0.425]);
        assert_eq!(cells[1].x, [0.575, 1.0]);
        assert_eq!(cells[0].y, [0.6, 1.0]);
        assert_eq!(cells[2].y, [0.0, 0.4]);
    }

    #[test]
    fn test_single_cell_spans_full_width() {
        let cells = grid_cells(1);
        assert_eq!(cells[0].x, [0.0, 1.0]);
        assert_eq!(cells[0].y, [0.0, 1.0]);
        assert_eq!(cells[0].title_anchor(), (0.5, 1.0));
    }
}
