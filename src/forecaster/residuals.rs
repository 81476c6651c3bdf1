//! Residual storage and residual bootstrapping.
//!
//! Stored residual samples are bounded: when more than [`MAX_RESIDUALS`]
//! values are offered, a sample is drawn without replacement by a generator
//! seeded with [`RESIDUALS_SEED`], so fitting twice on the same data stores
//! the same residuals.

use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of residuals kept per key.
pub const MAX_RESIDUALS: usize = 1000;

/// Seed of the generator used to subsample residuals.
pub const RESIDUALS_SEED: u64 = 123;

/// Key under which multi-series forecasters pool residuals of all levels.
pub const UNKNOWN_LEVEL: &str = "_unknown_level";

/// Configuration for bootstrapped prediction paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of bootstrapped paths.
    pub n_boot: usize,
    /// Seed of the generator that samples residuals.
    pub random_state: u64,
    /// Use residuals stored at fit time instead of out-of-sample residuals.
    pub in_sample_residuals: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_boot: 250,
            random_state: 123,
            in_sample_residuals: true,
        }
    }
}

impl BootstrapConfig {
    /// Create a new bootstrap config with specified number of paths.
    pub fn new(n_boot: usize) -> Self {
        Self {
            n_boot,
            ..Default::default()
        }
    }

    /// Set random seed for reproducibility.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Choose between in-sample and out-of-sample residuals.
    pub fn with_in_sample_residuals(mut self, in_sample: bool) -> Self {
        self.in_sample_residuals = in_sample;
        self
    }

    /// Parse from JSON, missing fields take their default.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            ForecastError::InvalidParameter(format!("invalid bootstrap config: {}", e))
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_boot == 0 {
            return Err(ForecastError::InvalidParameter(
                "`n_boot` must be an integer greater than 0.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Keep at most [`MAX_RESIDUALS`] values using the seeded sampler.
pub fn cap_residuals(residuals: Vec<f64>) -> Vec<f64> {
    if residuals.len() <= MAX_RESIDUALS {
        return residuals;
    }
    let mut rng = StdRng::seed_from_u64(RESIDUALS_SEED);
    sample(&mut rng, residuals.len(), MAX_RESIDUALS)
        .into_iter()
        .map(|i| residuals[i])
        .collect()
}

/// Append to `current` until [`MAX_RESIDUALS`] is reached; extra values are dropped.
pub fn append_residuals(current: &mut Vec<f64>, new: &[f64]) {
    let free = MAX_RESIDUALS.saturating_sub(current.len());
    current.extend(new.iter().take(free));
}

/// Residuals sampled with replacement: `out[step][boot]`.
pub fn sample_residual_matrix(
    residuals: &[f64],
    steps: usize,
    n_boot: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Vec<f64>>> {
    if residuals.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "no residuals available to bootstrap".to_string(),
        ));
    }
    Ok((0..steps)
        .map(|_| {
            (0..n_boot)
                .map(|_| residuals[rng.gen_range(0..residuals.len())])
                .collect()
        })
        .collect())
}

/// Residual samples by key (forecast horizon, series level, ...).
///
/// A key may be present without residuals (`None`), which is how a forecaster
/// fitted with `store_in_sample_residuals = false` reports its horizons.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualStore<K: Ord> {
    residuals: BTreeMap<K, Option<Vec<f64>>>,
}

impl<K: Ord> Default for ResidualStore<K> {
    fn default() -> Self {
        Self {
            residuals: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> ResidualStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store in-sample residuals: NaN dropped, then capped.
    pub fn insert_in_sample(&mut self, key: K, residuals: Vec<f64>) {
        let clean = residuals.into_iter().filter(|r| !r.is_nan()).collect();
        self.residuals.insert(key, Some(cap_residuals(clean)));
    }

    /// Replace the residuals of `key`, capped.
    pub fn insert(&mut self, key: K, residuals: Vec<f64>) {
        self.residuals.insert(key, Some(cap_residuals(residuals)));
    }

    /// Append to the residuals of `key` up to the cap.
    pub fn append(&mut self, key: K, residuals: &[f64]) {
        match self.residuals.get_mut(&key) {
            Some(Some(current)) => append_residuals(current, residuals),
            _ => self.insert(key, residuals.to_vec()),
        }
    }

    /// Register `key` without residuals.
    pub fn insert_empty(&mut self, key: K) {
        self.residuals.insert(key, None);
    }

    /// Residuals of `key`, `None` when absent or not stored.
    pub fn get(&self, key: &K) -> Option<&[f64]> {
        self.residuals.get(key).and_then(|r| r.as_deref())
    }

    /// Mutable residuals of `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut Vec<f64>> {
        self.residuals.get_mut(key).and_then(|r| r.as_mut())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.residuals.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.residuals.keys()
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    /// All stored residuals, concatenated in key order.
    pub fn pooled(&self) -> Vec<f64> {
        self.residuals
            .values()
            .flatten()
            .flat_map(|r| r.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_keeps_short_samples() {
        let r = vec![1.0, 2.0, 3.0];
        assert_eq!(cap_residuals(r.clone()), r);
    }

    #[test]
    fn cap_is_deterministic() {
        let r: Vec<f64> = (0..1200).map(|v| v as f64).collect();
        let a = cap_residuals(r.clone());
        let b = cap_residuals(r);
        assert_eq!(a.len(), MAX_RESIDUALS);
        assert_eq!(a, b);
        let mut unique = a.clone();
        unique.sort_by(|x, y| x.partial_cmp(y).unwrap());
        unique.dedup();
        assert_eq!(unique.len(), MAX_RESIDUALS);
    }

    #[test]
    fn append_stops_at_cap() {
        let mut store = ResidualStore::new();
        store.insert(1usize, vec![0.0; 998]);
        store.append(1, &[1.0, 2.0, 3.0]);
        let r = store.get(&1).unwrap();
        assert_eq!(r.len(), MAX_RESIDUALS);
        assert_eq!(&r[996..], &[0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn empty_keys_report_none() {
        let mut store: ResidualStore<usize> = ResidualStore::new();
        store.insert_empty(1);
        store.insert_empty(2);
        assert!(store.contains_key(&1));
        assert!(store.get(&1).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn in_sample_drops_nan() {
        let mut store = ResidualStore::new();
        store.insert_in_sample("a".to_string(), vec![1.0, f64::NAN, 2.0]);
        assert_eq!(store.get(&"a".to_string()).unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn residual_matrix_shape_and_seed() {
        let r = [1.0, 2.0, 3.0];
        let a = sample_residual_matrix(&r, 3, 5, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = sample_residual_matrix(&r, 3, 5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|row| row.len() == 5));
        assert_eq!(a, b);
        assert!(sample_residual_matrix(&[], 1, 1, &mut StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn bootstrap_config_from_json_uses_defaults() {
        let cfg = BootstrapConfig::from_json(r#"{"n_boot": 10}"#).unwrap();
        assert_eq!(cfg.n_boot, 10);
        assert_eq!(cfg.random_state, 123);
        assert!(cfg.in_sample_residuals);
    }
}
