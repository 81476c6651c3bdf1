//! Benchmarks for recursive prediction and bootstrapping.

use autoreg_forecast::core::TimeSeries;
use autoreg_forecast::forecaster::{
    BootstrapConfig, FitOptions, Forecaster, ForecasterAutoreg, ForecasterAutoregDirect, Lags,
};
use autoreg_forecast::regressor::{DecisionTreeRegressor, LinearRegression};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_series(n: usize) -> TimeSeries {
    let values = (0..n)
        .map(|i| {
            let t = i as f64;
            50.0 + 10.0 * (2.0 * std::f64::consts::PI * t / 12.0).sin() + 0.1 * t
        })
        .collect();
    TimeSeries::from_values("y", values)
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive_predict");
    let y = generate_series(500);

    let mut linear = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(24).unwrap());
    linear.fit(&y, None, FitOptions::default()).unwrap();
    let mut tree = ForecasterAutoreg::new(DecisionTreeRegressor::new(), Lags::new(24).unwrap());
    tree.fit(&y, None, FitOptions::default()).unwrap();

    for steps in [12, 48, 96].iter() {
        group.bench_with_input(BenchmarkId::new("linear", steps), steps, |b, &steps| {
            b.iter(|| linear.predict(black_box(steps), None, None))
        });
        group.bench_with_input(BenchmarkId::new("tree", steps), steps, |b, &steps| {
            b.iter(|| tree.predict(black_box(steps), None, None))
        });
    }
    group.finish();
}

fn bench_bootstrapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_bootstrapping");
    let y = generate_series(500);

    let mut recursive = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(24).unwrap());
    recursive.fit(&y, None, FitOptions::default()).unwrap();
    let mut direct =
        ForecasterAutoregDirect::new(LinearRegression::new(), Lags::new(24).unwrap(), 24).unwrap();
    direct.fit(&y, None, FitOptions::default()).unwrap();

    for n_boot in [100, 250, 500].iter() {
        let config = BootstrapConfig::new(*n_boot);
        group.bench_with_input(BenchmarkId::new("recursive", n_boot), &config, |b, config| {
            b.iter(|| recursive.predict_bootstrapping(black_box(24), None, None, config))
        });
        group.bench_with_input(BenchmarkId::new("direct", n_boot), &config, |b, config| {
            b.iter(|| direct.predict_bootstrapping(black_box(24), None, None, config))
        });
    }
    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(20);

    for size in [200, 1000].iter() {
        let y = generate_series(*size);
        group.bench_with_input(BenchmarkId::new("linear", size), &y, |b, y| {
            b.iter(|| {
                let mut forecaster =
                    ForecasterAutoreg::new(LinearRegression::new(), Lags::new(24).unwrap());
                forecaster.fit(black_box(y), None, FitOptions::default())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_predict, bench_bootstrapping, bench_fit);
criterion_main!(benches);
