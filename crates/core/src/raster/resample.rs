//! Sampling raster values at arbitrary world coordinates

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{Raster, RasterElement};
use crate::error::Error;

/// Interpolation applied when a raster is read at a coordinate that does not
/// fall on a cell centre.
///
/// Kernels whose support leaves the grid or touches a no-data cell fall back
/// to the next simpler kernel: cubic kernels to bilinear, bilinear to nearest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// Value of the cell containing the coordinate
    Nearest,
    /// Bilinear interpolation between the four surrounding cell centres
    Bilinear,
    /// Catmull-Rom cubic convolution over a 4x4 window
    BicubicSpline,
    /// Cubic B-spline smoothing over a 4x4 window
    #[default]
    BSpline,
}

impl Resampling {
    pub const NAMES: [&'static str; 4] = ["nearest", "bilinear", "bicubic", "bspline"];
}

impl FromStr for Resampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "nn" => Ok(Resampling::Nearest),
            "bilinear" | "linear" => Ok(Resampling::Bilinear),
            "bicubic" | "bicubic_spline" | "cubic" => Ok(Resampling::BicubicSpline),
            "bspline" | "b_spline" | "b-spline" => Ok(Resampling::BSpline),
            _ => Err(Error::invalid(
                "resampling",
                s,
                format!("expected one of {}", Resampling::NAMES.join(", ")),
            )),
        }
    }
}

/// Catmull-Rom weights for the samples at offsets -1, 0, 1, 2.
fn catmull_rom(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

/// Uniform cubic B-spline weights for the samples at offsets -1, 0, 1, 2.
fn b_spline(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    let u = 1.0 - t;
    [
        u * u * u / 6.0,
        (3.0 * t3 - 6.0 * t2 + 4.0) / 6.0,
        (-3.0 * t3 + 3.0 * t2 + 3.0 * t + 1.0) / 6.0,
        t3 / 6.0,
    ]
}

impl<T: RasterElement> Raster<T> {
    /// Value at world coordinate `(x, y)`.
    ///
    /// Returns `None` outside the grid or when no valid cell can be found.
    pub fn sample(&self, x: f64, y: f64, method: Resampling) -> Option<f64> {
        if !self.contains(x, y) {
            return None;
        }
        let (col, row) = self.geo_to_pixel(x, y);

        match method {
            Resampling::Nearest => self.sample_nearest(col, row),
            Resampling::Bilinear => self
                .sample_bilinear(col, row)
                .or_else(|| self.sample_nearest(col, row)),
            Resampling::BicubicSpline => self
                .sample_cubic(col, row, catmull_rom)
                .or_else(|| self.sample_bilinear(col, row))
                .or_else(|| self.sample_nearest(col, row)),
            Resampling::BSpline => self
                .sample_cubic(col, row, b_spline)
                .or_else(|| self.sample_bilinear(col, row))
                .or_else(|| self.sample_nearest(col, row)),
        }
    }

    fn sample_nearest(&self, col: f64, row: f64) -> Option<f64> {
        self.valid_f64(row.floor() as isize, col.floor() as isize)
    }

    fn sample_bilinear(&self, col: f64, row: f64) -> Option<f64> {
        // Offsets relative to cell centres
        let gx = col - 0.5;
        let gy = row - 0.5;
        let (ix, iy) = (gx.floor(), gy.floor());
        let (dx, dy) = (gx - ix, gy - iy);
        let (ix, iy) = (ix as isize, iy as isize);

        let v00 = self.valid_f64(iy, ix)?;
        let v01 = self.valid_f64(iy, ix + 1)?;
        let v10 = self.valid_f64(iy + 1, ix)?;
        let v11 = self.valid_f64(iy + 1, ix + 1)?;

        Some(
            v00 * (1.0 - dx) * (1.0 - dy)
                + v01 * dx * (1.0 - dy)
                + v10 * (1.0 - dx) * dy
                + v11 * dx * dy,
        )
    }

    fn sample_cubic(&self, col: f64, row: f64, kernel: fn(f64) -> [f64; 4]) -> Option<f64> {
        let gx = col - 0.5;
        let gy = row - 0.5;
        let (ix, iy) = (gx.floor(), gy.floor());
        let wx = kernel(gx - ix);
        let wy = kernel(gy - iy);
        let (ix, iy) = (ix as isize, iy as isize);

        let mut sum = 0.0;
        for (j, wyj) in wy.iter().enumerate() {
            let r = iy - 1 + j as isize;
            for (i, wxi) in wx.iter().enumerate() {
                let c = ix - 1 + i as isize;
                sum += wxi * wyj * self.valid_f64(r, c)?;
            }
        }
        Some(sum)
    }
}
