//! Fit → Predict-All → Cross-validate

use geokrig_core::{Error, Progress, Raster, Result, Silent};
use serde::{Deserialize, Serialize};

use super::cross_validation::{cross_validate, CrossValidation, CrossValidationSummary};
use super::grid::{predict_grid, ErrorMeasure, GridDefinition};
use super::predictor::Kriging;
use super::system::Semivariance;
use super::variants::KrigingVariant;
use crate::points::{SamplePoint, WorkingPoints};
use crate::search::SearchParams;
use crate::variogram::{VariogramFitSession, VariogramSettings};

/// All options of a kriging run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrigingSettings {
    pub variogram: VariogramSettings,
    pub search: SearchParams,
    /// Block edge length for block kriging; `None` for point kriging
    pub block_size: Option<f64>,
    /// Produce the error raster (default true)
    pub compute_error: bool,
    pub error_measure: ErrorMeasure,
    /// Output cell size; the grid then covers the point extent
    pub cell_size: Option<f64>,
    /// Explicit output grid, takes precedence over `cell_size`
    pub grid: Option<GridDefinition>,
    pub cross_validation: CrossValidation,
    /// Refit the variogram for every cross-validation training set instead
    /// of reusing the model of the full run
    pub cv_refit: bool,
}

impl Default for KrigingSettings {
    fn default() -> Self {
        Self {
            variogram: VariogramSettings::default(),
            search: SearchParams::default(),
            block_size: None,
            compute_error: true,
            error_measure: ErrorMeasure::Variance,
            cell_size: None,
            grid: None,
            cross_validation: CrossValidation::None,
            cv_refit: false,
        }
    }
}

impl KrigingSettings {
    /// Check every option before any work is done.
    pub fn validate(&self) -> Result<()> {
        self.variogram.validate()?;
        self.search.validate()?;
        if let Some(b) = self.block_size {
            if !(b > 0.0) {
                return Err(Error::invalid("block_size", b, "must be positive"));
            }
        }
        match (&self.grid, self.cell_size) {
            (Some(grid), _) => grid.validate()?,
            (None, Some(c)) if !(c > 0.0) || !c.is_finite() => {
                return Err(Error::invalid("cell_size", c, "must be positive"));
            }
            (None, Some(_)) => {}
            (None, None) => {
                return Err(Error::invalid(
                    "grid",
                    "none",
                    "either an output grid or a cell size is required",
                ))
            }
        }
        if let CrossValidation::KFold(k) = self.cross_validation {
            if k < 2 {
                return Err(Error::invalid("cross_validation", k, "k-fold needs at least 2 folds"));
            }
        }
        Ok(())
    }

    /// Output grid for `points`
    pub fn output_grid(&self, points: &WorkingPoints) -> Result<GridDefinition> {
        match (self.grid, self.cell_size) {
            (Some(grid), _) => Ok(grid),
            (None, Some(cell)) => GridDefinition::from_extent(&points.extent(), cell),
            (None, None) => Err(Error::invalid("cell_size", "none", "required without a grid")),
        }
    }
}

/// Everything a kriging run produces
#[derive(Debug, Clone)]
pub struct KrigingOutput {
    pub session: VariogramFitSession,
    pub prediction: Raster<f64>,
    pub error: Option<Raster<f64>>,
    /// Cells left as no-data
    pub failed: usize,
    pub cross_validation: Option<CrossValidationSummary>,
}

/// Run the full pipeline for `points` with `variant`.
///
/// Values stay in the working (possibly log-transformed) space; applying
/// [`WorkingPoints::log_transform`] inversely is up to the caller.
pub fn interpolate<V: KrigingVariant>(
    points: &WorkingPoints,
    variant: V,
    settings: &KrigingSettings,
    progress: &dyn Progress,
) -> Result<KrigingOutput> {
    settings.validate()?;
    let grid = settings.output_grid(points)?;

    tracing::info!("fitting variogram to {} points", points.len());
    let session = VariogramFitSession::fit(points.points(), &settings.variogram, progress)?;
    tracing::info!("variogram model: {}", session.model().describe());

    let gamma = Semivariance::new(session.model().clone()).with_block(settings.block_size);
    let kriging = Kriging::new(
        variant.clone(),
        points.points(),
        gamma.clone(),
        settings.search.clone(),
    )?;

    tracing::info!(
        "{} kriging on {} x {} cells",
        kriging.variant().name(),
        grid.cols,
        grid.rows
    );
    let error_measure = settings.compute_error.then_some(settings.error_measure);
    let result = predict_grid(&kriging, &grid, error_measure, progress)?;

    let cross_validation = if settings.cross_validation == CrossValidation::None {
        None
    } else {
        tracing::info!("cross-validation");
        let train = |subset: &[SamplePoint]| -> Result<Kriging<V>> {
            let gamma = if settings.cv_refit {
                let fold = VariogramFitSession::fit(subset, &settings.variogram, &Silent)?;
                Semivariance::new(fold.into_model()).with_block(settings.block_size)
            } else {
                gamma.clone()
            };
            Kriging::new(variant.clone(), subset, gamma, settings.search.clone())
        };
        cross_validate(settings.cross_validation, points.points(), train, progress)?
    };

    Ok(KrigingOutput {
        session,
        prediction: result.prediction,
        error: result.error,
        failed: result.failed,
        cross_validation,
    })
}
