//! Point layers
//!
//! Sample points reach the engine through the [`PointSource`] trait. The
//! in-memory [`FeatureCollection`] implements it for point geometries with a
//! map of attributes, which is what the CLI builds from delimited text.

use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::extent::Extent;

/// Read-only access to a layer of sample points.
pub trait PointSource {
    /// Number of records, including ones without a usable location or value
    fn point_count(&self) -> usize;

    /// Location of record `index`, `None` if it has no point geometry
    fn point(&self, index: usize) -> Option<(f64, f64)>;

    /// Numeric attribute of record `index`; `None` represents no-data.
    fn attribute(&self, index: usize, field: &str) -> Option<f64>;

    /// Bounding box of all located records
    fn extent(&self) -> Option<Extent> {
        Extent::from_coords((0..self.point_count()).filter_map(|i| self.point(i)))
    }
}

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value. Text is parsed; null and non-finite values are `None`.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            AttributeValue::Null => return None,
            AttributeValue::Int(i) => *i as f64,
            AttributeValue::Float(f) => *f,
            AttributeValue::String(s) => s.trim().parse::<f64>().ok()?,
        };
        v.is_finite().then_some(v)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    /// Create a point feature
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            geometry: Some(Geometry::Point(Point::new(x, y))),
            properties: HashMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl PointSource for FeatureCollection {
    fn point_count(&self) -> usize {
        self.features.len()
    }

    fn point(&self, index: usize) -> Option<(f64, f64)> {
        match self.features.get(index)?.geometry.as_ref()? {
            Geometry::Point(p) => Some((p.x(), p.y())),
            _ => None,
        }
    }

    fn attribute(&self, index: usize, field: &str) -> Option<f64> {
        self.features.get(index)?.get_property(field)?.as_f64()
    }
}
