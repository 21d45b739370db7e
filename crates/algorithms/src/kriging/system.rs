//! Kriging system assembly
//!
//! For `n` neighbourhood points, an optional unbiasedness edge and `t`
//! drift terms the system matrix has size `m = n + e + t`:
//! ```text
//! [ Γ  1  D ]    Γᵢⱼ = γ(|xᵢ - xⱼ|), Γᵢᵢ = 0
//! [ 1ᵀ 0  0 ]    1   = edge column (e = 1), absent for simple kriging
//! [ Dᵀ 0  0 ]    D   = drift values at each point (n × t)
//! ```

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use super::matrix::{invert, set_block_symmetric};
use crate::points::SamplePoint;
use crate::variogram::VariogramModel;

/// Semivariance between locations, optionally averaged over a square block.
#[derive(Debug, Clone)]
pub struct Semivariance {
    model: VariogramModel,
    /// Half the block edge length
    block: Option<f64>,
}

impl Semivariance {
    pub fn new(model: VariogramModel) -> Self {
        Self { model, block: None }
    }

    /// Average over blocks of edge length `size` instead of points.
    pub fn with_block(mut self, size: Option<f64>) -> Self {
        self.block = size.filter(|b| *b > 0.0).map(|b| 0.5 * b);
        self
    }

    pub fn model(&self) -> &VariogramModel {
        &self.model
    }

    pub fn block_size(&self) -> Option<f64> {
        self.block.map(|b| 2.0 * b)
    }

    /// Model value at `distance`, never negative.
    pub fn at_distance(&self, distance: f64) -> f64 {
        let v = self.model.evaluate(distance);
        if v > 0.0 {
            v
        } else {
            0.0
        }
    }

    fn at_offset(&self, dx: f64, dy: f64) -> f64 {
        self.at_distance((dx * dx + dy * dy).sqrt())
    }

    /// Semivariance between `(x1, y1)` and `(x2, y2)`.
    ///
    /// In block mode this is the mean over the centre offset and the four
    /// offsets shifted by half the block edge in each diagonal direction.
    pub fn between(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
        let (dx, dy) = (x1 - x2, y1 - y2);
        match self.block {
            None => self.at_offset(dx, dy),
            Some(b) => {
                (self.at_offset(dx, dy)
                    + self.at_offset(dx + b, dy + b)
                    + self.at_offset(dx + b, dy - b)
                    + self.at_offset(dx - b, dy + b)
                    + self.at_offset(dx - b, dy - b))
                    / 5.0
            }
        }
    }

    /// Semivariances from `(x, y)` to each of `points`
    pub fn to_points(&self, x: f64, y: f64, points: &[SamplePoint]) -> Array1<f64> {
        points.iter().map(|p| self.between(x, y, p.x, p.y)).collect()
    }
}

/// Assemble the system matrix for `points`.
///
/// `drift` holds one row per point and one column per drift term.
pub fn assemble(
    points: &[SamplePoint],
    gamma: &Semivariance,
    edge: bool,
    drift: ArrayView2<'_, f64>,
) -> Array2<f64> {
    let n = points.len();
    let e = usize::from(edge);
    let t = drift.ncols();
    let m = n + e + t;

    let mut w = Array2::zeros((m, m));
    for i in 0..n {
        let pi = &points[i];
        for j in (i + 1)..n {
            let pj = &points[j];
            let v = gamma.between(pi.x, pi.y, pj.x, pj.y);
            w[[i, j]] = v;
            w[[j, i]] = v;
        }
    }
    if edge {
        set_block_symmetric(&mut w, 0..n, n..n + 1, Array2::ones((n, 1)).view());
    }
    if t > 0 {
        set_block_symmetric(&mut w, 0..n, n + e..m, drift);
    }
    w
}

/// An inverted kriging system over a fixed neighbourhood.
#[derive(Debug, Clone)]
pub struct KrigingSystem {
    points: Vec<SamplePoint>,
    matrix: Array2<f64>,
    inverse: Array2<f64>,
    /// Drift terms in the system, as indices into the variant's drift vector
    drift: Vec<usize>,
}

impl KrigingSystem {
    /// Invert `matrix`; `None` if it is singular.
    pub fn new(points: Vec<SamplePoint>, matrix: Array2<f64>, drift: Vec<usize>) -> Option<Self> {
        let inverse = invert(&matrix).ok()?;
        Some(Self {
            points,
            matrix,
            inverse,
            drift,
        })
    }

    /// Neighbourhood points, in system order
    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    /// Number of points in the system
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> &Array2<f64> {
        &self.inverse
    }

    pub fn drift_terms(&self) -> &[usize] {
        &self.drift
    }

    /// Kriging weights for right-hand side `rhs` (all `m` unknowns).
    pub fn solve(&self, rhs: &Array1<f64>) -> Array1<f64> {
        self.inverse.dot(rhs)
    }

    /// `Σ λᵢ zᵢ` over the point weights
    pub fn weighted_sum(&self, lambda: ArrayView1<'_, f64>) -> f64 {
        self.points
            .iter()
            .zip(lambda.slice(s![..self.points.len()]))
            .map(|(p, l)| l * p.value)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear() -> Semivariance {
        Semivariance::new(VariogramModel::fixed("a + b * x; a=0; b=1").unwrap())
    }

    fn square() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(10.0, 0.0, 2.0),
            SamplePoint::new(0.0, 10.0, 3.0),
            SamplePoint::new(10.0, 10.0, 4.0),
        ]
    }

    #[test]
    fn test_negative_model_clamped() {
        let g = Semivariance::new(VariogramModel::fixed("x - 5").unwrap());
        assert_eq!(g.at_distance(1.0), 0.0);
        assert_eq!(g.at_distance(7.0), 2.0);
    }

    #[test]
    fn test_block_average() {
        let g = linear().with_block(Some(2.0));
        assert_eq!(g.block_size(), Some(2.0));
        // Offsets (0,0), (±1, ±1): 0 and four times √2
        assert_relative_eq!(g.between(0.0, 0.0, 0.0, 0.0), 4.0 * 2.0_f64.sqrt() / 5.0);
        let no_block = linear().with_block(Some(0.0));
        assert_eq!(no_block.block_size(), None);
    }

    #[test]
    fn test_assemble_ordinary_layout() {
        let pts = square();
        let w = assemble(&pts, &linear(), true, Array2::zeros((4, 0)).view());
        assert_eq!(w.dim(), (5, 5));
        for i in 0..4 {
            assert_eq!(w[[i, i]], 0.0);
            assert_eq!(w[[i, 4]], 1.0);
            assert_eq!(w[[4, i]], 1.0);
        }
        assert_eq!(w[[4, 4]], 0.0);
        assert_relative_eq!(w[[0, 1]], 10.0);
        assert_relative_eq!(w[[0, 3]], 200.0_f64.sqrt());
    }

    #[test]
    fn test_assemble_drift_layout() {
        let pts = square();
        let drift = Array2::from_shape_fn((4, 2), |(i, k)| if k == 0 { pts[i].x } else { pts[i].y });
        let w = assemble(&pts, &linear(), true, drift.view());
        assert_eq!(w.dim(), (7, 7));
        assert_eq!(w[[1, 5]], 10.0);
        assert_eq!(w[[5, 1]], 10.0);
        assert_eq!(w[[2, 6]], 10.0);
        assert_eq!(w[[6, 2]], 10.0);
        for i in 4..7 {
            for j in 4..7 {
                assert_eq!(w[[i, j]], 0.0);
            }
        }
        assert_eq!(w, w.t());
    }

    #[test]
    fn test_simple_layout_has_no_edge() {
        let pts = square();
        let w = assemble(&pts, &linear(), false, Array2::zeros((4, 0)).view());
        assert_eq!(w.dim(), (4, 4));
    }

    #[test]
    fn test_system_solve() {
        let pts = square();
        let w = assemble(&pts, &linear(), true, Array2::zeros((4, 0)).view());
        let sys = KrigingSystem::new(pts.clone(), w, Vec::new()).unwrap();
        assert_eq!(sys.len(), 4);
        // Right-hand side of a sample location reproduces that sample
        let mut rhs = linear().to_points(10.0, 0.0, &pts).to_vec();
        rhs.push(1.0);
        let lambda = sys.solve(&Array1::from(rhs));
        assert_relative_eq!(lambda[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(sys.weighted_sum(lambda.view()), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_system() {
        let pts = vec![SamplePoint::new(0.0, 0.0, 1.0); 3];
        let w = assemble(&pts, &linear(), true, Array2::zeros((3, 0)).view());
        assert!(KrigingSystem::new(pts, w, Vec::new()).is_none());
    }
}
