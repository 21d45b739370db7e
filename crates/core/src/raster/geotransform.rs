//! North-up affine georeferencing

use serde::{Deserialize, Serialize};

use crate::extent::Extent;

/// Maps cell indices to world coordinates for a north-up grid.
///
/// ```text
/// x = origin_x + col * cell_width
/// y = origin_y + row * cell_height     (cell_height < 0 for north-up)
/// ```
/// The origin is the outer corner of cell `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size along X
    pub cell_width: f64,
    /// Cell size along Y, negative for north-up grids
    pub cell_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_width,
            cell_height,
        }
    }

    /// Transform for square cells whose centres start at the upper-left
    /// corner of `extent` and step by `cell_size`.
    ///
    /// The first column is centred on `extent.x_min` and the first row on
    /// `extent.y_max`, so sample points on the extent boundary fall on cell
    /// centres.
    pub fn centred_on(extent: &Extent, cell_size: f64) -> Self {
        let half = 0.5 * cell_size;
        Self::new(extent.x_min - half, extent.y_max + half, cell_size, -cell_size)
    }

    /// World coordinates of the centre of cell `(col, row)`
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.cell_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.cell_height;
        (x, y)
    }

    /// Fractional `(col, row)` of a world coordinate.
    ///
    /// Cell `(c, r)` covers `[c, c + 1) x [r, r + 1)`; use `.floor()` for indices.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.cell_width == 0.0 || self.cell_height == 0.0 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.cell_width,
            (y - self.origin_y) / self.cell_height,
        )
    }

    /// Cell size along X (absolute)
    pub fn cell_size(&self) -> f64 {
        self.cell_width.abs()
    }

    /// Outer bounds of a grid with the given dimensions
    pub fn bounds(&self, cols: usize, rows: usize) -> Extent {
        let x1 = self.origin_x + cols as f64 * self.cell_width;
        let y1 = self.origin_y + rows as f64 * self.cell_height;
        Extent::new(self.origin_x, self.origin_y, x1, y1)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
