//! Sample points and the filtered working copy used by every kriging stage

use geokrig_core::{Error, Extent, PointSource, Result};

/// A sample point with x, y coordinates and a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other_x: f64, other_y: f64) -> f64 {
        let dx = self.x - other_x;
        let dy = self.y - other_y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn dist(&self, other_x: f64, other_y: f64) -> f64 {
        self.dist_sq(other_x, other_y).sqrt()
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.value.is_finite()
    }
}

/// Logarithmic value transform `ln(1 + v - min)`.
///
/// The engine only ever sees transformed values; turning predictions back
/// into the original unit is left to the caller via [`LogTransform::inverse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogTransform {
    /// Smallest raw value of the layer
    pub minimum: f64,
}

impl LogTransform {
    pub fn forward(&self, value: f64) -> f64 {
        (1.0 + value - self.minimum).ln()
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value.exp() - 1.0 + self.minimum
    }
}

/// Filtered, optionally log-transformed copy of a point layer.
///
/// Records without a location or with a no-data value are dropped. At least
/// two points must survive.
#[derive(Debug, Clone)]
pub struct WorkingPoints {
    points: Vec<SamplePoint>,
    extent: Extent,
    log: Option<LogTransform>,
    skipped: usize,
}

impl WorkingPoints {
    /// Read `field` from every record of `source`.
    pub fn from_source<S: PointSource + ?Sized>(source: &S, field: &str, log: bool) -> Result<Self> {
        let total = source.point_count();
        let raw: Vec<SamplePoint> = (0..total)
            .filter_map(|i| {
                let (x, y) = source.point(i)?;
                let value = source.attribute(i, field)?;
                Some(SamplePoint::new(x, y, value))
            })
            .collect();
        Self::build(raw, total, log)
    }

    /// Use already materialised points; non-finite records are dropped.
    pub fn from_points(points: &[SamplePoint], log: bool) -> Result<Self> {
        Self::build(points.to_vec(), points.len(), log)
    }

    fn build(mut points: Vec<SamplePoint>, total: usize, log: bool) -> Result<Self> {
        points.retain(SamplePoint::is_finite);
        if points.len() < 2 {
            return Err(Error::InsufficientPoints {
                required: 2,
                found: points.len(),
            });
        }

        let log = log.then(|| LogTransform {
            minimum: points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min),
        });
        if let Some(t) = log {
            for p in &mut points {
                p.value = t.forward(p.value);
            }
        }

        let extent = Extent::from_coords(points.iter().map(|p| (p.x, p.y)))
            .ok_or(Error::InsufficientPoints { required: 2, found: 0 })?;

        if total > points.len() {
            tracing::debug!("{} of {} records skipped (no location or no value)", total - points.len(), total);
        }

        Ok(Self {
            skipped: total - points.len(),
            points,
            extent,
            log,
        })
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of the working points
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Transform applied at ingestion, if any
    pub fn log_transform(&self) -> Option<LogTransform> {
        self.log
    }

    /// Records dropped for missing location or value
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Arithmetic mean of the (transformed) values
    pub fn mean(&self) -> f64 {
        mean_value(&self.points)
    }
}

impl AsRef<[SamplePoint]> for WorkingPoints {
    fn as_ref(&self) -> &[SamplePoint] {
        &self.points
    }
}

/// A plain point slice carries a single attribute, returned for any field name.
impl PointSource for [SamplePoint] {
    fn point_count(&self) -> usize {
        self.len()
    }

    fn point(&self, index: usize) -> Option<(f64, f64)> {
        self.get(index).map(|p| (p.x, p.y))
    }

    fn attribute(&self, index: usize, _field: &str) -> Option<f64> {
        self.get(index).map(|p| p.value).filter(|v| v.is_finite())
    }
}

pub(crate) fn mean_value(points: &[SamplePoint]) -> f64 {
    if points.is_empty() {
        return f64::NAN;
    }
    points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geokrig_core::vector::{AttributeValue, Feature, FeatureCollection};

    #[test]
    fn test_nodata_records_dropped() {
        let fc: FeatureCollection = vec![
            Feature::point(0.0, 0.0).with_property("z", AttributeValue::Float(1.0)),
            Feature::point(1.0, 0.0).with_property("z", AttributeValue::Null),
            Feature::point(2.0, 0.0).with_property("z", AttributeValue::Int(3)),
            Feature::point(3.0, 0.0),
        ]
        .into_iter()
        .collect();

        let wp = WorkingPoints::from_source(&fc, "z", false).unwrap();
        assert_eq!(wp.len(), 2);
        assert_eq!(wp.skipped(), 2);
        assert_relative_eq!(wp.mean(), 2.0);
        assert_relative_eq!(wp.extent().x_max, 2.0);
    }

    #[test]
    fn test_slice_source() {
        let pts = [
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(4.0, 2.0, f64::NAN),
            SamplePoint::new(2.0, 1.0, 3.0),
        ];
        let source: &[SamplePoint] = &pts;
        assert_eq!(source.point_count(), 3);
        assert_eq!(source.attribute(1, "any"), None);
        assert_eq!(source.extent().map(|e| e.x_max), Some(4.0));

        let wp = WorkingPoints::from_source(source, "value", false).unwrap();
        assert_eq!(wp.len(), 2);
        assert_eq!(wp.skipped(), 1);
    }

    #[test]
    fn test_fewer_than_two_points() {
        let pts = [SamplePoint::new(0.0, 0.0, 1.0), SamplePoint::new(1.0, 1.0, f64::NAN)];
        match WorkingPoints::from_points(&pts, false) {
            Err(Error::InsufficientPoints { required: 2, found: 1 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_log_transform() {
        let pts = [
            SamplePoint::new(0.0, 0.0, 5.0),
            SamplePoint::new(1.0, 0.0, 10.0),
            SamplePoint::new(2.0, 0.0, 25.0),
        ];
        let wp = WorkingPoints::from_points(&pts, true).unwrap();
        let t = wp.log_transform().unwrap();
        assert_relative_eq!(t.minimum, 5.0);
        // The minimum maps to ln(1) = 0
        assert_relative_eq!(wp.points()[0].value, 0.0);
        assert_relative_eq!(wp.points()[1].value, 6.0_f64.ln());
        for (p, raw) in wp.points().iter().zip(&pts) {
            assert_relative_eq!(t.inverse(p.value), raw.value, epsilon = 1e-12);
        }
    }
}
