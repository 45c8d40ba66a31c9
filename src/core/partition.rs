//! Train/val/test partitioning of accepted images.
//!
//! The accepted file list is shuffled once and cut into three contiguous
//! slices. Train and val take `floor(n * ratio)` files each and test takes
//! whatever is left, so the three sizes always add up to `n`.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ConfigError;
use crate::core::dataset::DatasetSplit;

/// Allowed distance between the ratio sum and 1.0
const RATIO_SUM_TOLERANCE: f64 = 0.01;

/// Target proportions for the train/val/test split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64, // e.g., 0.70 for 70%
    pub val: f64,   // e.g., 0.15 for 15%
    pub test: f64,  // e.g., 0.15 for 15%
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self::new(0.70, 0.15, 0.15)
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Self {
        Self { train, val, test }
    }

    /// Get the target ratio for a specific split
    pub fn get(&self, split: DatasetSplit) -> f64 {
        match split {
            DatasetSplit::Train => self.train,
            DatasetSplit::Val => self.val,
            DatasetSplit::Test => self.test,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidSplitRatios {
            train: self.train,
            val: self.val,
            test: self.test,
            reason,
        };

        let in_range = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        if !DatasetSplit::ALL.iter().all(|&s| in_range(self.get(s))) {
            return Err(invalid("each ratio must be within [0, 1]"));
        }
        if self.train + self.val > 1.0 + f64::EPSILON {
            return Err(invalid("train and val together exceed 1.0"));
        }
        if (self.train + self.val + self.test - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(invalid("ratios must sum to 1.0"));
        }
        Ok(())
    }
}

/// Result of partitioning: every accepted filename in exactly one subset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitAssignment {
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

impl SplitAssignment {
    pub fn get(&self, split: DatasetSplit) -> &[String] {
        match split {
            DatasetSplit::Train => &self.train,
            DatasetSplit::Val => &self.val,
            DatasetSplit::Test => &self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}

/// Subset sizes for `n` files: `(floor(n*train), floor(n*val), remainder)`
pub fn split_sizes(n: usize, ratios: &SplitRatios) -> (usize, usize, usize) {
    let train = ((n as f64 * ratios.train).floor() as usize).min(n);
    let val = ((n as f64 * ratios.val).floor() as usize).min(n - train);
    (train, val, n - train - val)
}

/// Shuffle `files` with `rng` and slice them into train/val/test
pub fn partition<R: Rng + ?Sized>(
    mut files: Vec<String>,
    ratios: &SplitRatios,
    rng: &mut R,
) -> SplitAssignment {
    files.shuffle(rng);

    let (train_count, val_count, _) = split_sizes(files.len(), ratios);
    let test = files.split_off(train_count + val_count);
    let val = files.split_off(train_count);
    let train = files;

    info!(
        "Data split: train={}, val={}, test={}",
        train.len(),
        val.len(),
        test.len()
    );

    SplitAssignment { train, val, test }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("lion_{:04}.jpg", i)).collect()
    }

    #[test]
    fn test_ten_images_split_seven_one_two() {
        let mut rng = StdRng::seed_from_u64(1);
        let assignment = partition(names(10), &SplitRatios::default(), &mut rng);

        assert_eq!(assignment.train.len(), 7);
        assert_eq!(assignment.val.len(), 1);
        assert_eq!(assignment.test.len(), 2);
    }

    #[test]
    fn test_subsets_are_disjoint_and_exhaustive() {
        let mut rng = StdRng::seed_from_u64(42);
        let input = names(37);
        let assignment = partition(input.clone(), &SplitRatios::default(), &mut rng);

        let mut seen = HashSet::new();
        for split in DatasetSplit::ALL {
            for name in assignment.get(split) {
                assert!(seen.insert(name.clone()), "{} assigned twice", name);
            }
        }
        assert_eq!(seen, input.into_iter().collect::<HashSet<_>>());
        assert_eq!(assignment.total(), 37);
    }

    #[test]
    fn test_sizes_stay_within_truncation_bounds() {
        let ratios = SplitRatios::new(0.6, 0.25, 0.15);
        for n in 0..200 {
            let (train, val, test) = split_sizes(n, &ratios);
            assert_eq!(train + val + test, n);
            assert!((train as f64 - 0.6 * n as f64).abs() < 1.0);
            assert!((val as f64 - 0.25 * n as f64).abs() < 1.0);
        }
    }

    #[test]
    fn test_empty_input() {
        let mut rng = StdRng::seed_from_u64(0);
        let assignment = partition(Vec::new(), &SplitRatios::default(), &mut rng);
        assert_eq!(assignment.total(), 0);
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = partition(names(50), &SplitRatios::default(), &mut StdRng::seed_from_u64(9));
        let b = partition(names(50), &SplitRatios::default(), &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_ratios() {
        assert!(SplitRatios::default().validate().is_ok());
        assert!(SplitRatios::new(0.8, 0.1, 0.1).validate().is_ok());
        assert!(SplitRatios::new(0.8, 0.3, 0.0).validate().is_err());
        assert!(SplitRatios::new(0.5, 0.2, 0.1).validate().is_err());
        assert!(SplitRatios::new(-0.1, 0.6, 0.5).validate().is_err());
        assert!(SplitRatios::new(f64::NAN, 0.5, 0.5).validate().is_err());
    }
}
