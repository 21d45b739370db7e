//! Cell value types

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Types that can be stored in a raster cell.
///
/// Every element converts losslessly enough to `f64` for sampling, which is
/// how covariates enter the kriging system regardless of their storage type.
pub trait RasterElement:
    Copy + Debug + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// No-data value used when a raster declares none
    fn default_nodata() -> Self;

    /// Whether this value is no-data, given the raster's declared sentinel.
    fn is_nodata(self, nodata: Option<Self>) -> bool;

    /// Convert to `f64`
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::MIN
                }

                fn is_nodata(self, nodata: Option<Self>) -> bool {
                    nodata == Some(self)
                }
            }
        )*
    };
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::NAN
                }

                fn is_nodata(self, nodata: Option<Self>) -> bool {
                    if !self.is_finite() {
                        return true;
                    }
                    match nodata {
                        Some(nd) => (self - nd).abs() <= <$t>::EPSILON * 100.0,
                        None => false,
                    }
                }
            }
        )*
    };
}

impl_int_element!(u8, u16, i16, i32);
impl_float_element!(f32, f64);
