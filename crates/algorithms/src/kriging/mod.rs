//! Kriging interpolation
//!
//! A [`Kriging`] predictor combines a [`KrigingVariant`] (simple, ordinary
//! or universal), a fitted [`Semivariance`] and a neighbourhood search.
//! [`predict_grid`] runs it over an output grid, [`cross_validate`]
//! measures it on held-out points and [`interpolate`] chains variogram
//! fitting, grid prediction and cross-validation.
//!
//! Reference:
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.
//! Wackernagel, H. (2003). Multivariate Geostatistics. Springer.

mod cross_validation;
mod grid;
pub mod matrix;
mod pipeline;
mod predictor;
mod system;
mod variants;

pub use cross_validation::{cross_validate, CrossValidation, CrossValidationSummary, Residual};
pub use grid::{predict_grid, ErrorMeasure, GridDefinition, KrigingResult};
pub use pipeline::{interpolate, KrigingOutput, KrigingSettings};
pub use predictor::Kriging;
pub use system::{assemble, KrigingSystem, Semivariance};
pub use variants::{KrigingVariant, OrdinaryKriging, Prediction, SimpleKriging, UniversalKriging};
