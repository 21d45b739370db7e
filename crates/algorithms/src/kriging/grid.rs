//! Prediction over every cell of an output grid

use geokrig_core::{Error, Extent, GeoTransform, Progress, Raster, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::predictor::Kriging;
use super::variants::KrigingVariant;
use crate::maybe_rayon::map_rows;

/// Output grid geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDefinition {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
}

impl GridDefinition {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform) -> Self {
        Self {
            rows,
            cols,
            transform,
        }
    }

    /// Grid of square cells covering `extent`, with cell centres on
    /// `x_min + i·cell` and `y_max − j·cell`.
    pub fn from_extent(extent: &Extent, cell_size: f64) -> Result<Self> {
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(Error::invalid("cell_size", cell_size, "must be positive"));
        }
        let cols = 1 + (extent.width() / cell_size).floor() as usize;
        let rows = 1 + (extent.height() / cell_size).floor() as usize;
        Ok(Self::new(rows, cols, GeoTransform::centred_on(extent, cell_size)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidDimensions {
                width: self.cols,
                height: self.rows,
            });
        }
        if self.transform.cell_width == 0.0 || self.transform.cell_height == 0.0 {
            return Err(Error::invalid(
                "transform",
                format!("{:?}", self.transform),
                "cell size must not be zero",
            ));
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// Unit of the error raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMeasure {
    StandardDeviation,
    #[default]
    Variance,
}

impl ErrorMeasure {
    /// Convert a kriging variance into this unit.
    pub fn convert(self, variance: f64) -> f64 {
        match self {
            ErrorMeasure::Variance => variance,
            ErrorMeasure::StandardDeviation => variance.max(0.0).sqrt(),
        }
    }
}

impl fmt::Display for ErrorMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorMeasure::StandardDeviation => "stddev",
            ErrorMeasure::Variance => "variance",
        })
    }
}

impl FromStr for ErrorMeasure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stddev" | "sd" | "standard-deviation" | "standard_deviation" => {
                Ok(ErrorMeasure::StandardDeviation)
            }
            "variance" | "var" => Ok(ErrorMeasure::Variance),
            _ => Err(Error::invalid("error_measure", s, "expected stddev or variance")),
        }
    }
}

/// Rasters produced by [`predict_grid`]
#[derive(Debug, Clone)]
pub struct KrigingResult {
    pub prediction: Raster<f64>,
    /// Error estimate, when requested
    pub error: Option<Raster<f64>>,
    /// Cells left as no-data
    pub failed: usize,
}

/// Predict every cell of `grid`.
///
/// Rows are processed in parallel. Cells that cannot be predicted are NaN
/// (the no-data value of both rasters). `progress` is told after each
/// completed row; returning `false` cancels the run.
pub fn predict_grid<V: KrigingVariant>(
    kriging: &Kriging<V>,
    grid: &GridDefinition,
    error: Option<ErrorMeasure>,
    progress: &dyn Progress,
) -> Result<KrigingResult> {
    grid.validate()?;
    let (rows, cols) = (grid.rows, grid.cols);
    let transform = grid.transform;

    let cancelled = AtomicBool::new(false);
    let done = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let output: Vec<(f64, f64)> = map_rows(rows, |row| {
        let mut row_data = vec![(f64::NAN, f64::NAN); cols];
        if cancelled.load(Ordering::Relaxed) {
            return row_data;
        }

        let mut row_failed = 0;
        for (col, cell) in row_data.iter_mut().enumerate() {
            let (x, y) = transform.pixel_to_geo(col, row);
            match kriging.predict(x, y) {
                Some(p) => *cell = (p.value, p.variance),
                None => row_failed += 1,
            }
        }
        failed.fetch_add(row_failed, Ordering::Relaxed);

        let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
        if !progress.update(completed, rows) {
            cancelled.store(true, Ordering::Relaxed);
        }
        row_data
    });

    if cancelled.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    let failed = failed.into_inner();
    tracing::debug!(
        "{} kriging: {} of {} cells without prediction",
        kriging.variant().name(),
        failed,
        grid.cell_count()
    );

    let est_data: Vec<f64> = output.iter().map(|(v, _)| *v).collect();
    let prediction = Raster::from_vec(est_data, rows, cols)?
        .with_transform(transform)
        .with_nodata(Some(f64::NAN));

    let error = match error {
        Some(measure) => {
            let err_data: Vec<f64> = output.iter().map(|(_, e)| measure.convert(*e)).collect();
            Some(
                Raster::from_vec(err_data, rows, cols)?
                    .with_transform(transform)
                    .with_nodata(Some(f64::NAN)),
            )
        }
        None => None,
    };

    Ok(KrigingResult {
        prediction,
        error,
        failed,
    })
}
