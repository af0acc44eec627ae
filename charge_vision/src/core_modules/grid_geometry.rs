// THEORY:
// The `grid_geometry` module turns one calibrated bounding rectangle into the
// fixed set of cell rectangles the rest of the engine reads pixels from. It is
// the spatial half of the engine: everything downstream only ever sees a cell
// index and its rectangle.
//
// Key architectural principles:
// 1.  **Pure Derivation**: Regions are a function of `(border, layout)` and
//     nothing else. The same inputs always produce the same rectangles, so the
//     regions can be rebuilt whenever calibration changes.
// 2.  **Row-Major Identity**: Cell `i` sits at row `i / cols`, column `i % cols`.
//     Log records and classifier output refer to cells only by this index.
// 3.  **Truncating Arithmetic**: Boundaries are computed in floating point and
//     truncated toward zero. Neighbouring cells share the exact same boundary
//     expression, and rectangles are half-open, so cells never overlap.
// 4.  **Total Over Layouts**: An inset that eats the whole usable height does
//     not fail. It produces zero-area rectangles, which the sampler reads as
//     "no data".

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Calibrated bounding rectangle of the LED area, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRect")]
pub struct BorderRect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

/// Calibration files store the rectangle either as `[x, y, w, h]` or as an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRect {
    Tuple([i64; 4]),
    Named { x: i64, y: i64, w: i64, h: i64 },
}

impl From<RawRect> for BorderRect {
    fn from(raw: RawRect) -> Self {
        match raw {
            RawRect::Tuple([x, y, w, h]) => BorderRect { x, y, w, h },
            RawRect::Named { x, y, w, h } => BorderRect { x, y, w, h },
        }
    }
}

impl BorderRect {
    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }
}

/// Physical arrangement of the LED cells inside the border.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    /// Fraction of the border height dropped at the top and again at the bottom.
    pub vertical_inset: f64,
    /// Horizontal offset of the first column, as a fraction of one column width.
    pub column_shift: f64,
}

impl GridLayout {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            vertical_inset: 0.0,
            column_shift: 0.0,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// One addressable cell. Rectangles are half-open: `x1..x2`, `y1..y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRegion {
    pub index: usize,
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl CellRegion {
    pub fn width(&self) -> i64 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    pub fn is_degenerate(&self) -> bool {
        self.area() == 0
    }
}

/// Computes the row-major list of cell regions for a border and layout.
pub fn compute_regions(border: &BorderRect, layout: &GridLayout) -> Result<Vec<CellRegion>, ConfigError> {
    if border.w <= 0 || border.h <= 0 {
        return Err(ConfigError::InvalidBorder { w: border.w, h: border.h });
    }
    if layout.rows == 0 || layout.cols == 0 {
        return Err(ConfigError::InvalidLayout {
            rows: layout.rows,
            cols: layout.cols,
        });
    }

    let y_offset = (border.h as f64 * layout.vertical_inset) as i64;
    let y_start = border.y + y_offset;
    let usable_height = border.h - 2 * y_offset;

    let cell_width = border.w as f64 / layout.cols as f64;
    let x_start = (border.x as f64 + cell_width * layout.column_shift) as i64;
    let cell_height = usable_height as f64 / layout.rows as f64;

    let mut regions = Vec::with_capacity(layout.cell_count());
    for row in 0..layout.rows {
        let (y1, y2) = if usable_height > 0 {
            (
                (y_start as f64 + row as f64 * cell_height) as i64,
                (y_start as f64 + (row + 1) as f64 * cell_height) as i64,
            )
        } else {
            (y_start, y_start)
        };
        for col in 0..layout.cols {
            let x1 = (x_start as f64 + col as f64 * cell_width) as i64;
            let x2 = (x_start as f64 + (col + 1) as f64 * cell_width) as i64;
            regions.push(CellRegion {
                index: row * layout.cols + col,
                x1,
                y1,
                x2,
                y2,
            });
        }
    }
    Ok(regions)
}

/// Owns the regions for the current calibration and rebuilds them when it changes.
#[derive(Debug, Clone)]
pub struct GridGeometry {
    border: BorderRect,
    layout: GridLayout,
    regions: Vec<CellRegion>,
}

impl GridGeometry {
    pub fn new(border: BorderRect, layout: GridLayout) -> Result<Self, ConfigError> {
        let regions = compute_regions(&border, &layout)?;
        Ok(Self { border, layout, regions })
    }

    /// Replaces the calibrated border. On error the previous regions are kept.
    pub fn recalibrate(&mut self, border: BorderRect) -> Result<(), ConfigError> {
        self.regions = compute_regions(&border, &self.layout)?;
        self.border = border;
        Ok(())
    }

    pub fn regions(&self) -> &[CellRegion] {
        &self.regions
    }

    pub fn border(&self) -> BorderRect {
        self.border
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn cell_count(&self) -> usize {
        self.regions.len()
    }
}
