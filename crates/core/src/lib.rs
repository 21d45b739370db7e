//! # geokrig core
//!
//! Shared data types for the geokrig kriging engine.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid container used for covariates and outputs
//! - `GeoTransform`: north-up affine mapping between cells and world coordinates
//! - `Resampling`: value-at-coordinate sampling of rasters
//! - `PointSource`: read-only access to sample point layers
//! - `Progress`: progress reporting with cooperative cancellation
//! - Native GeoTIFF I/O

pub mod error;
pub mod extent;
pub mod io;
pub mod progress;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use extent::Extent;
pub use progress::{Progress, Silent};
pub use raster::{GeoTransform, Raster, RasterElement, Resampling};
pub use vector::PointSource;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::extent::Extent;
    pub use crate::progress::{Progress, Silent};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, Resampling};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection, PointSource};
}
