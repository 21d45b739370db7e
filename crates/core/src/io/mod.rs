//! Reading covariate grids and writing kriging outputs

mod native;

pub use native::{read_geotiff, write_geotiff};
