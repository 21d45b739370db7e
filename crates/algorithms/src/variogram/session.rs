//! One variogram fit: settings, empirical table and model, tied to the
//! point set they were derived from.

use geokrig_core::{Error, Extent, Progress, Result};
use serde::{Deserialize, Serialize};

use super::empirical::{
    diagonal, estimate_lag_distance, EmpiricalVariogram, LagEstimate, VariogramParams,
};
use super::formula::Formula;
use super::model::{model_formula, VariogramModel};
use crate::points::SamplePoint;

/// Variogram estimation and model options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariogramSettings {
    /// Number of lag classes (default 100)
    pub lag_classes: usize,
    /// Largest pair distance; `None` means the bounding-box diagonal
    pub max_distance: Option<f64>,
    /// Pair sampling stride (default 1)
    pub skip: usize,
    /// Family name or formula, optionally with `; name=value` clauses
    /// (default `a + b * x`)
    pub model: String,
    /// Only classes up to this distance are fitted; `None` means all
    pub fitting_range: Option<f64>,
}

impl Default for VariogramSettings {
    fn default() -> Self {
        Self {
            lag_classes: 100,
            max_distance: None,
            skip: 1,
            model: "a + b * x".into(),
            fitting_range: None,
        }
    }
}

impl VariogramSettings {
    /// Defaults derived from the point set: a stride growing with the point
    /// count, the mean nearest-neighbour distance as lag and half the
    /// bounding-box diagonal as maximum distance.
    pub fn suggest(points: &[SamplePoint]) -> Self {
        let skip = 1 + points.len() / 10_000;
        let max_distance = 0.5 * diagonal(points);
        let lag = estimate_lag_distance(points, LagEstimate::NearestNeighbour, skip);
        let params = VariogramParams::from_lag_distance(lag, max_distance, skip);
        Self {
            lag_classes: params.lag_classes,
            max_distance: (max_distance > 0.0).then_some(max_distance),
            skip,
            ..Default::default()
        }
    }

    pub fn params(&self) -> VariogramParams {
        VariogramParams {
            lag_classes: self.lag_classes,
            max_distance: self.max_distance,
            skip: self.skip.max(1),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.params().validate()?;
        if let Some(r) = self.fitting_range {
            if !(r > 0.0) {
                return Err(Error::invalid("fitting_range", r, "must be positive"));
            }
        }
        Formula::parse(&model_formula(&self.model))?;
        Ok(())
    }
}

/// Result of fitting a variogram to one point set.
///
/// Remembers the size and extent of the points it was computed from, so a
/// caller holding a session can tell whether it still applies.
#[derive(Debug, Clone)]
pub struct VariogramFitSession {
    settings: VariogramSettings,
    point_count: usize,
    extent: Option<Extent>,
    empirical: EmpiricalVariogram,
    model: VariogramModel,
}

impl VariogramFitSession {
    /// Estimate the empirical variogram of `points` and fit the model.
    pub fn fit(
        points: &[SamplePoint],
        settings: &VariogramSettings,
        progress: &dyn Progress,
    ) -> Result<Self> {
        settings.validate()?;
        let empirical = EmpiricalVariogram::estimate(points, &settings.params(), progress)?;
        let model = VariogramModel::fit(&settings.model, &empirical, settings.fitting_range)?;
        Ok(Self {
            settings: settings.clone(),
            point_count: points.len(),
            extent: point_extent(points),
            empirical,
            model,
        })
    }

    /// Whether `points` or `settings` differ from those this session was
    /// fitted with.
    pub fn is_stale_for(&self, points: &[SamplePoint], settings: &VariogramSettings) -> bool {
        self.point_count != points.len()
            || self.extent != point_extent(points)
            || &self.settings != settings
    }

    pub fn settings(&self) -> &VariogramSettings {
        &self.settings
    }

    pub fn empirical(&self) -> &EmpiricalVariogram {
        &self.empirical
    }

    pub fn model(&self) -> &VariogramModel {
        &self.model
    }

    pub fn into_model(self) -> VariogramModel {
        self.model
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Multi-line report of the fit
    pub fn summary(&self) -> String {
        let lines = [
            format!("Model            : {}", self.model.describe()),
            format!("Formula          : {}", self.model.formula_string()),
            format!("R²               : {:.2}%", 100.0 * self.model.r2()),
            format!("Fitting range    : {}", self.model.fitting_range()),
            format!("Samples in range : {}", self.model.data_count()),
            format!("Lag classes      : {}", self.empirical.len()),
            format!("Lag distance     : {}", self.empirical.lag_width),
            format!("Maximum distance : {}", self.empirical.max_distance),
        ];
        lines.join("\n")
    }
}

fn point_extent(points: &[SamplePoint]) -> Option<Extent> {
    Extent::from_coords(points.iter().map(|p| (p.x, p.y)))
}
