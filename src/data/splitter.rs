// ============================================================
// Layer 4 — Train/Valid/Test Splitter
// ============================================================
// Partitions record indices 0..n into three disjoint sets:
//   - valid: monitored during training
//   - test:  held out for the final evaluation
//   - train: everything else
//
//   val_split  = floor(valid_fraction * n)
//   test_split = val_split + floor(test_fraction * n)
//
//   indices (optionally shuffled)
//   ├── [0 .. val_split)           → valid
//   ├── [val_split .. test_split)  → test
//   └── [test_split .. n)          → train
//
// Why shuffle before splitting?
//   Stores are written source after source, so without
//   shuffling the held-out parts would come from the first
//   sources only (one receiver, one SNR sweep).
//
// Why a seeded ChaCha8 and not thread_rng?
//   The same seed and n must give the same partition on every
//   machine and every run, so valid and test never leak into
//   train between runs. ChaCha8Rng's stream is fixed by the
//   rand_chacha crate, not by the platform.
//
// Reference: rand / rand_chacha crate documentation

use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub valid_fraction: f64,
    pub test_fraction: f64,
    pub seed: u64,
    pub shuffle: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            valid_fraction: 0.05,
            test_fraction: 0.2,
            seed: 4,
            shuffle: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
    pub test: Vec<usize>,
}

impl Partition {
    pub fn total(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }
}

/// Split `0..n` according to `config`.
///
/// # Arguments
/// * `n`      - Number of records in the store
/// * `config` - Fractions, seed and whether to shuffle
///
/// # Errors
/// A fraction outside `[0, 1]`, or valid + test above 1.
pub fn partition(n: usize, config: &SplitConfig) -> Result<Partition> {
    let in_unit = |f: f64| (0.0..=1.0).contains(&f);
    ensure!(
        in_unit(config.valid_fraction) && in_unit(config.test_fraction),
        "split fractions must lie in [0, 1], got valid={} test={}",
        config.valid_fraction,
        config.test_fraction
    );
    ensure!(
        config.valid_fraction + config.test_fraction <= 1.0,
        "valid + test fractions exceed 1 ({} + {})",
        config.valid_fraction,
        config.test_fraction
    );

    let val_split = (config.valid_fraction * n as f64).floor() as usize;
    let test_split = (val_split + (config.test_fraction * n as f64).floor() as usize).min(n);

    let mut indices: Vec<usize> = (0..n).collect();
    if config.shuffle {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        indices.shuffle(&mut rng);
    }

    let train = indices.split_off(test_split);
    let test = indices.split_off(val_split);
    let valid = indices;

    tracing::debug!(
        "Dataset split: {} train, {} valid, {} test",
        train.len(),
        valid.len(),
        test.len()
    );

    Ok(Partition { train, valid, test })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_correct_split_sizes() {
        let p = partition(100, &SplitConfig::default()).unwrap();
        assert_eq!(p.valid.len(), 5);
        assert_eq!(p.test.len(), 20);
        assert_eq!(p.train.len(), 75);
    }

    #[test]
    fn test_all_indices_preserved_once() {
        let p = partition(57, &SplitConfig::default()).unwrap();
        let all: BTreeSet<usize> = p.train.iter().chain(&p.valid).chain(&p.test).copied().collect();
        assert_eq!(all.len(), 57);
        assert_eq!(p.total(), 57);
        assert_eq!(all.into_iter().collect::<Vec<_>>(), (0..57).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_partition() {
        let cfg = SplitConfig::default();
        assert_eq!(partition(200, &cfg).unwrap(), partition(200, &cfg).unwrap());

        let other = SplitConfig { seed: 5, ..cfg.clone() };
        assert_ne!(partition(200, &cfg).unwrap(), partition(200, &other).unwrap());
    }

    #[test]
    fn test_no_shuffle_keeps_order() {
        let cfg = SplitConfig {
            shuffle: false,
            ..SplitConfig::default()
        };
        let p = partition(20, &cfg).unwrap();
        assert_eq!(p.valid, vec![0]);
        assert_eq!(p.test, vec![1, 2, 3, 4]);
        assert_eq!(p.train, (5..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_dataset() {
        let p = partition(0, &SplitConfig::default()).unwrap();
        assert_eq!(p.total(), 0);
    }

    #[test]
    fn test_invalid_fractions() {
        let too_big = SplitConfig {
            valid_fraction: 0.6,
            test_fraction: 0.5,
            ..SplitConfig::default()
        };
        assert!(partition(10, &too_big).is_err());

        let negative = SplitConfig {
            valid_fraction: -0.1,
            ..SplitConfig::default()
        };
        assert!(partition(10, &negative).is_err());
    }
}
