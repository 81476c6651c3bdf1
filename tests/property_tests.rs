//! Property-based tests for forecasters and backtesting folds.
//!
//! These tests verify invariants that should hold for all valid inputs,
//! using randomly generated time series data.

use autoreg_forecast::core::TimeSeries;
use autoreg_forecast::forecaster::residuals::cap_residuals;
use autoreg_forecast::forecaster::{
    BootstrapConfig, FitOptions, Forecaster, ForecasterAutoreg, ForecasterAutoregDirect, Lags,
    MAX_RESIDUALS,
};
use autoreg_forecast::model_selection::BacktestConfig;
use autoreg_forecast::regressor::{DecisionTreeRegressor, LinearRegression};
use proptest::prelude::*;

/// Strategy for generating valid time series values.
/// Adds small variation to avoid all-constant series.
fn valid_values_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    (min_len..max_len).prop_flat_map(|len| {
        prop::collection::vec(1.0..1000.0_f64, len).prop_map(|mut v| {
            for (i, val) in v.iter_mut().enumerate() {
                *val += (i as f64) * 0.001;
            }
            v
        })
    })
}

// =============================================================================
// Property: Forecast length matches requested horizon
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn recursive_forecast_length_matches_horizon(
        values in valid_values_strategy(20, 80),
        lags in 1usize..6,
        horizon in 1usize..20
    ) {
        let y = TimeSeries::from_values("y", values);
        let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(lags).unwrap());
        forecaster.fit(&y, None, FitOptions::default()).unwrap();
        let forecast = forecaster.predict(horizon, None, None).unwrap();
        prop_assert_eq!(forecast.horizon(), horizon);
        prop_assert_eq!(forecast.index(), &y.index().future(horizon).unwrap());
    }

    #[test]
    fn direct_forecast_length_matches_horizon(
        values in valid_values_strategy(30, 80),
        horizon in 1usize..8
    ) {
        let y = TimeSeries::from_values("y", values);
        let mut forecaster =
            ForecasterAutoregDirect::new(LinearRegression::new(), Lags::new(3).unwrap(), 8).unwrap();
        forecaster.fit(&y, None, FitOptions::default()).unwrap();
        prop_assert_eq!(forecaster.predict(horizon, None, None).unwrap().horizon(), horizon);
    }
}

// =============================================================================
// Property: Tree forecasts stay within the training range
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn tree_forecasts_are_bounded(
        values in valid_values_strategy(20, 80),
        horizon in 1usize..15
    ) {
        let y = TimeSeries::from_values("y", values.clone());
        let mut forecaster =
            ForecasterAutoreg::new(DecisionTreeRegressor::new(), Lags::new(3).unwrap());
        forecaster.fit(&y, None, FitOptions::default()).unwrap();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        for val in forecaster.predict(horizon, None, None).unwrap().point() {
            prop_assert!(val.is_finite(), "Forecast contains non-finite value: {}", val);
            prop_assert!(*val >= min - 1e-9 && *val <= max + 1e-9);
        }
    }
}

// =============================================================================
// Property: Bootstrapped quantiles are ordered
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn bootstrap_quantiles_are_monotone(
        values in valid_values_strategy(30, 60),
        seed in 0u64..1000
    ) {
        let y = TimeSeries::from_values("y", values);
        let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(2).unwrap());
        forecaster.fit(&y, None, FitOptions::default()).unwrap();
        let config = BootstrapConfig::new(50).with_random_state(seed);
        let q = forecaster
            .predict_quantiles(5, None, None, &[0.1, 0.5, 0.9], &config)
            .unwrap();
        for step in 0..5 {
            prop_assert!(q.values[0][step] <= q.values[1][step]);
            prop_assert!(q.values[1][step] <= q.values[2][step]);
        }
    }
}

// =============================================================================
// Property: Backtesting folds tile the test period
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn folds_are_contiguous(
        n in 20usize..200,
        steps in 1usize..12,
        gap in 0usize..5,
        fixed in any::<bool>()
    ) {
        let initial = n / 2;
        let config = BacktestConfig::new(steps, initial)
            .with_gap(gap)
            .with_fixed_train_size(fixed);
        let folds = config.folds(n, 3).unwrap();
        prop_assert_eq!(folds[0].test.start, initial + gap);
        prop_assert_eq!(folds.last().unwrap().test.end, n);
        for pair in folds.windows(2) {
            prop_assert_eq!(pair[0].test.end, pair[1].test.start);
        }
        for fold in &folds {
            prop_assert!(fold.test.len() <= steps);
            prop_assert_eq!(fold.last_window.end, fold.train.end);
            if fixed {
                prop_assert_eq!(fold.train.len(), initial);
            }
        }
    }

    #[test]
    fn residuals_are_capped(len in 0usize..30_000) {
        let residuals: Vec<f64> = (0..len).map(|i| i as f64).collect();
        prop_assert_eq!(cap_residuals(residuals).len(), len.min(MAX_RESIDUALS));
    }
}
