//! Benchmarks for variogram estimation and grid kriging

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geokrig_algorithms::kriging::{
    predict_grid, GridDefinition, Kriging, OrdinaryKriging, Semivariance,
};
use geokrig_algorithms::points::SamplePoint;
use geokrig_algorithms::search::SearchParams;
use geokrig_algorithms::variogram::{EmpiricalVariogram, VariogramModel, VariogramParams};
use geokrig_core::{Extent, Silent};

fn create_points(n: usize) -> Vec<SamplePoint> {
    let mut rng = 42_u64;
    let mut next = move || {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (rng >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..n)
        .map(|_| {
            let (x, y) = (next() * 1000.0, next() * 1000.0);
            let value = 0.05 * x + 10.0 * (y / 150.0).sin() + next();
            SamplePoint::new(x, y, value)
        })
        .collect()
}

fn bench_variogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("empirical_variogram");

    for n in [500, 2000].iter() {
        let points = create_points(*n);
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            b.iter(|| {
                EmpiricalVariogram::estimate(black_box(&points), &VariogramParams::default(), &Silent)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_grid");
    group.sample_size(10);

    let points = create_points(400);
    let model = VariogramModel::fixed("spherical; n=0.5; s=60; r=300").unwrap();
    let grid = GridDefinition::from_extent(&Extent::new(0.0, 0.0, 1000.0, 1000.0), 10.0).unwrap();

    let modes = [
        ("global", SearchParams::global()),
        ("local_16", SearchParams::default()),
    ];
    for (name, search) in modes.iter() {
        let kriging = Kriging::new(
            OrdinaryKriging,
            &points,
            Semivariance::new(model.clone()),
            search.clone(),
        )
        .unwrap();
        group.bench_function(*name, |b| {
            b.iter(|| predict_grid(black_box(&kriging), &grid, None, &Silent).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_variogram, bench_grid);
criterion_main!(benches);
