//! Variogram estimation and modelling
//!
//! - [`EmpiricalVariogram`]: binned semivariance of point pairs
//! - [`Formula`]: expression language for model functions
//! - [`fit_trend`]: Levenberg–Marquardt least squares
//! - [`VariogramModel`]: a fitted semivariance function of distance
//! - [`VariogramFitSession`]: table and model for one point set

mod empirical;
mod formula;
mod model;
mod session;
mod trend;

pub use empirical::{
    diagonal, estimate_lag_distance, EmpiricalVariogram, LagEstimate, VariogramClass,
    VariogramParams,
};
pub use formula::Formula;
pub use model::{model_formula, VariogramFamily, VariogramModel};
pub use session::{VariogramFitSession, VariogramSettings};
pub use trend::{fit_trend, TrendFit};
