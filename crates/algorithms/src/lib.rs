//! # geokrig algorithms
//!
//! Kriging interpolation of scattered sample points.
//!
//! ## Modules
//!
//! - **points**: sample points and the filtered working copy of a point layer
//! - **search**: k-d tree and neighbourhood selection
//! - **variogram**: empirical variogram, model formulas and fitting
//! - **kriging**: kriging systems, variants, grid prediction, cross-validation

pub(crate) mod maybe_rayon;

pub mod kriging;
pub mod points;
pub mod search;
pub mod variogram;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::kriging::{
        cross_validate, interpolate, predict_grid, CrossValidation, ErrorMeasure, GridDefinition,
        Kriging, KrigingSettings, KrigingVariant, OrdinaryKriging, Semivariance, SimpleKriging,
        UniversalKriging,
    };
    pub use crate::points::{LogTransform, SamplePoint, WorkingPoints};
    pub use crate::search::{SearchDirection, SearchParams, SpatialIndex};
    pub use crate::variogram::{
        EmpiricalVariogram, VariogramFamily, VariogramFitSession, VariogramModel,
        VariogramParams, VariogramSettings,
    };
    pub use geokrig_core::prelude::*;
}
