//! End-to-end behaviour of variogram estimation and kriging.
//!
//! Small hand-checkable layouts plus properties that must hold for any
//! point set (symmetric systems, unit weight sums, exact interpolation).

use approx::assert_relative_eq;
use geokrig_algorithms::kriging::{
    assemble, cross_validate, interpolate, CrossValidation, Kriging, KrigingSettings,
    KrigingVariant, OrdinaryKriging, Semivariance, SimpleKriging, UniversalKriging,
};
use geokrig_algorithms::points::{SamplePoint, WorkingPoints};
use geokrig_algorithms::search::SearchParams;
use geokrig_algorithms::variogram::{
    EmpiricalVariogram, VariogramModel, VariogramParams, VariogramSettings,
};
use geokrig_core::prelude::*;
use ndarray::Array2;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn five() -> Vec<SamplePoint> {
    vec![
        SamplePoint::new(0.0, 0.0, 1.0),
        SamplePoint::new(10.0, 0.0, 2.0),
        SamplePoint::new(0.0, 10.0, 3.0),
        SamplePoint::new(10.0, 10.0, 4.0),
        SamplePoint::new(5.0, 5.0, 2.5),
    ]
}

fn model(formula: &str) -> Semivariance {
    Semivariance::new(VariogramModel::fixed(formula).unwrap())
}

/// Deterministic scattered points in a 100 x 100 square
fn scattered(n: usize, seed: u64) -> Vec<SamplePoint> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|_| {
            let (x, y) = (next() * 100.0, next() * 100.0);
            SamplePoint::new(x, y, (x / 20.0).sin() * 5.0 + 0.05 * y + next())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reference layouts
// ---------------------------------------------------------------------------

#[test]
fn centre_sample_is_reproduced_by_ordinary_kriging() {
    let kriging = Kriging::new(
        OrdinaryKriging,
        &five(),
        model("linear; a=0; b=1"),
        SearchParams::global(),
    )
    .unwrap();
    let p = kriging.predict(5.0, 5.0).unwrap();
    assert_relative_eq!(p.value, 2.5, epsilon = 1e-9);
    assert_relative_eq!(p.variance, 0.0, epsilon = 1e-9);
}

#[test]
fn flat_variogram_far_query_gives_mean() {
    let kriging = Kriging::new(
        SimpleKriging::new(),
        &five(),
        model("1"),
        SearchParams::global(),
    )
    .unwrap();
    let p = kriging.predict(1.0e6, -1.0e6).unwrap();
    assert_relative_eq!(p.value, 2.5, epsilon = 1e-9);
}

#[test]
fn collinear_points_fill_three_lag_classes() {
    let points: Vec<SamplePoint> = (0..4)
        .map(|i| SamplePoint::new(i as f64, 0.0, i as f64))
        .collect();
    let params = VariogramParams {
        lag_classes: 3,
        max_distance: Some(3.0),
        skip: 1,
    };
    let v = EmpiricalVariogram::estimate(&points, &params, &Silent).unwrap();

    let counts: Vec<(usize, usize)> = v.classes.iter().map(|c| (c.class, c.count)).collect();
    assert_eq!(counts, vec![(1, 3), (2, 2), (3, 1)]);
    // Equal attribute spacing: γ(h) = h² / 2
    for c in &v.classes {
        assert_relative_eq!(c.semivariance, 0.5 * c.distance * c.distance, epsilon = 1e-12);
    }
}

#[test]
fn leave_one_out_on_linear_trend_is_perfect() {
    let points: Vec<SamplePoint> = (0..10)
        .map(|i| {
            let x = i as f64 * 3.0;
            let y = (i % 3) as f64 * 4.0;
            SamplePoint::new(x, y, 2.0 + 0.5 * x - 0.25 * y)
        })
        .collect();
    let gamma = model("linear-no-nugget; b=1");
    let train = |subset: &[SamplePoint]| {
        Kriging::new(
            UniversalKriging::new(Vec::new()).with_coordinates(true),
            subset,
            gamma.clone(),
            SearchParams::global(),
        )
    };
    let summary = cross_validate(CrossValidation::LeaveOneOut, &points, train, &Silent)
        .unwrap()
        .unwrap();

    assert_eq!(summary.samples, 10);
    assert_eq!(summary.residuals.len(), 10);
    assert_relative_eq!(summary.rmse, 0.0, epsilon = 1e-6);
    assert_relative_eq!(summary.r2, 100.0, epsilon = 1e-6);
}

#[test]
fn constant_covariate_matches_ordinary_kriging() {
    let covariate = Raster::filled(120, 120, 7.5)
        .with_transform(GeoTransform::new(-10.0, 110.0, 1.0, -1.0));
    let points = scattered(40, 7);
    let gamma = model("spherical; n=0.1; s=10; r=40");
    let search = SearchParams {
        max_points: 12,
        ..Default::default()
    };

    let universal = Kriging::new(
        UniversalKriging::new(vec![Arc::new(covariate)]),
        &points,
        gamma.clone(),
        search.clone(),
    )
    .unwrap();
    let ordinary = Kriging::new(OrdinaryKriging, &points, gamma, search).unwrap();

    for &(x, y) in &[(12.5, 40.0), (50.0, 50.0), (91.0, 3.5)] {
        let u = universal.predict(x, y).unwrap();
        let o = ordinary.predict(x, y).unwrap();
        assert_relative_eq!(u.value, o.value, epsilon = 1e-8);
        assert_relative_eq!(u.variance, o.variance, epsilon = 1e-8);
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn cumulative_semivariance_is_monotone() {
    // Irregular points on a line with a linear trend: every pair in a
    // farther class differs more than any pair in a nearer one
    let points: Vec<SamplePoint> = scattered(150, 3)
        .into_iter()
        .map(|p| SamplePoint::new(p.x, 0.0, 0.5 * p.x))
        .collect();
    let params = VariogramParams {
        lag_classes: 40,
        ..Default::default()
    };
    let v = EmpiricalVariogram::estimate(&points, &params, &Silent).unwrap();
    assert!(v.len() > 10);
    for pair in v.classes.windows(2) {
        assert!(pair[0].class < pair[1].class);
        assert!(pair[1].cumulative >= pair[0].cumulative - 1e-12);
    }
}

#[test]
fn assembled_system_is_symmetric() {
    let points = scattered(30, 11);
    let gamma = model("exponential; n=0.2; s=8; r=25").with_block(Some(2.0));
    let drift = Array2::from_shape_fn((points.len(), 2), |(i, j)| {
        if j == 0 {
            points[i].x
        } else {
            points[i].y
        }
    });
    let w = assemble(&points, &gamma, true, drift.view());
    assert_eq!(w.shape(), &[33, 33]);
    for i in 0..w.nrows() {
        for j in 0..w.ncols() {
            assert_eq!(w[[i, j]], w[[j, i]]);
        }
    }
}

#[test]
fn ordinary_and_universal_weights_sum_to_one() {
    let points = scattered(50, 5);
    let gamma = model("gaussian; n=0; s=10; r=30");
    let search = SearchParams {
        max_points: 10,
        ..Default::default()
    };
    let ordinary = Kriging::new(OrdinaryKriging, &points, gamma.clone(), search.clone()).unwrap();
    let universal = Kriging::new(
        UniversalKriging::new(Vec::new()).with_coordinates(true),
        &points,
        gamma,
        search,
    )
    .unwrap();

    for &(x, y) in &[(20.0, 20.0), (64.0, 13.0), (99.0, 99.0)] {
        for weights in [ordinary.weights(x, y), universal.weights(x, y)] {
            let weights = weights.unwrap();
            assert_eq!(weights.len(), 10);
            let sum: f64 = weights.iter().map(|(_, w)| w).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-8);
        }
    }
}

#[test]
fn exact_at_every_sample() {
    let points = scattered(25, 19);
    let kriging = Kriging::new(
        OrdinaryKriging,
        &points,
        model("spherical; n=0; s=12; r=50"),
        SearchParams::default(),
    )
    .unwrap();
    for p in &points {
        let pred = kriging.predict(p.x, p.y).unwrap();
        assert_relative_eq!(pred.value, p.value, epsilon = 1e-7);
        assert_relative_eq!(pred.variance, 0.0, epsilon = 1e-7);
    }
}

#[test]
fn global_inverse_matches_fresh_inverse() {
    let points = scattered(35, 23);
    let gamma = model("linear; a=0.5; b=0.2");
    let kriging = Kriging::new(OrdinaryKriging, &points, gamma.clone(), SearchParams::global()).unwrap();

    // Query a few cells first; the cached system must not change
    for i in 0..20 {
        let _ = kriging.predict(i as f64 * 5.0, 50.0);
    }
    let cached = kriging.global_system().unwrap();
    let fresh = OrdinaryKriging.build_system(points.clone(), &gamma).unwrap();
    assert_eq!(cached.inverse(), fresh.inverse());
}

#[test]
fn sparse_neighbourhood_is_no_data() {
    let points = vec![
        SamplePoint::new(0.0, 0.0, 1.0),
        SamplePoint::new(1.0, 0.0, 2.0),
        SamplePoint::new(0.0, 1.0, 3.0),
        SamplePoint::new(50.0, 50.0, 4.0),
    ];
    let search = SearchParams {
        min_points: 3,
        max_points: 8,
        max_radius: Some(5.0),
        ..Default::default()
    };
    let kriging = Kriging::new(OrdinaryKriging, &points, model("linear; a=0; b=1"), search).unwrap();
    assert!(kriging.predict(0.5, 0.5).is_some());
    assert!(kriging.predict(50.0, 49.0).is_none());
    assert!(kriging.weights(50.0, 49.0).is_none());
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

#[test]
fn interpolate_from_feature_collection() {
    let mut layer = FeatureCollection::new();
    for p in scattered(60, 31) {
        layer.push(Feature::point(p.x, p.y).with_property("z", AttributeValue::Float(p.value)));
    }
    layer.push(Feature::point(10.0, 10.0).with_property("z", AttributeValue::Null));

    let points = WorkingPoints::from_source(&layer, "z", false).unwrap();
    assert_eq!(points.len(), 60);
    assert_eq!(points.skipped(), 1);

    let settings = KrigingSettings {
        variogram: VariogramSettings {
            lag_classes: 20,
            model: "linear".into(),
            ..Default::default()
        },
        cell_size: Some(10.0),
        cross_validation: CrossValidation::KFold(5),
        ..Default::default()
    };
    let out = interpolate(&points, OrdinaryKriging, &settings, &Silent).unwrap();

    let (rows, cols) = out.prediction.shape();
    assert!(rows > 5 && cols > 5);
    let error = out.error.unwrap();
    assert_eq!(error.shape(), (rows, cols));
    let valid = out
        .prediction
        .data()
        .iter()
        .filter(|v| v.is_finite())
        .count();
    assert_eq!(valid + out.failed, rows * cols);

    let cv = out.cross_validation.unwrap();
    assert_eq!(cv.samples + cv.predictions_failed, 60);
    assert!(cv.rmse.is_finite());
}

#[test]
fn log_transform_round_trips_values() {
    let raw: Vec<SamplePoint> = scattered(30, 41)
        .into_iter()
        .map(|p| SamplePoint::new(p.x, p.y, p.value.abs() * 10.0 + 1.0))
        .collect();
    let points = WorkingPoints::from_points(&raw, true).unwrap();
    let transform = points.log_transform().unwrap();

    let kriging = Kriging::new(
        SimpleKriging::new(),
        points.points(),
        model("linear-no-nugget; b=0.1"),
        SearchParams::global(),
    )
    .unwrap();
    for p in &raw {
        let pred = kriging.predict(p.x, p.y).unwrap();
        assert_relative_eq!(transform.inverse(pred.value), p.value, epsilon = 1e-6);
    }
}

#[test]
fn variant_names() {
    assert_eq!(OrdinaryKriging.name(), "ordinary");
    assert_eq!(SimpleKriging::new().name(), "simple");
    assert_eq!(UniversalKriging::new(Vec::new()).name(), "universal");
}
