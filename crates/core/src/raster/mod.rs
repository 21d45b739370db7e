//! Raster data structures and sampling

mod element;
mod geotransform;
mod grid;
mod resample;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use resample::Resampling;
