//! Axis-aligned bounding rectangles

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Extent {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min: x_min.min(x_max),
            y_min: y_min.min(y_max),
            x_max: x_min.max(x_max),
            y_max: y_min.max(y_max),
        }
    }

    /// Bounding box of a set of coordinates. `None` for an empty iterator.
    pub fn from_coords<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = coords.into_iter();
        let (x, y) = iter.next()?;
        let mut extent = Self::new(x, y, x, y);
        for (x, y) in iter {
            extent.expand_to(x, y);
        }
        Some(extent)
    }

    /// Grow the extent so that it includes `(x, y)`.
    pub fn expand_to(&mut self, x: f64, y: f64) {
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Length of the diagonal
    pub fn diagonal(&self) -> f64 {
        self.width().hypot(self.height())
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Whether `(x, y)` lies inside or on the boundary.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}
