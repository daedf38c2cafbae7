//! Seeded train/validation partition of the sampled points.
//!
//! Point `i` receives the `i`-th draw of a generator seeded with the split
//! seed. Draws below the ratio are training, the rest validation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_SPLIT_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Fraction of points (in expectation) used for training.
    pub ratio: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self { ratio: DEFAULT_SPLIT_RATIO, seed: 0 }
    }
}

impl SplitParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ratio > 0.0 && self.ratio < 1.0) {
            return Err(ConfigError::InvalidSplitRatio(self.ratio));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    Training,
    Validation,
}

/// Per-point random value and the threshold that partitions them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitAssignment {
    ratio: f64,
    values: Vec<f64>,
}

impl SplitAssignment {
    /// Assign `n` points.
    pub fn assign(n: usize, params: &SplitParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let values: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let split = Self { ratio: params.ratio, values };
        info!(
            points = n,
            training = split.training_len(),
            validation = split.validation_len(),
            ratio = params.ratio,
            "split assigned"
        );
        Ok(split)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Random value of point `i`, in [0, 1).
    pub fn value(&self, i: usize) -> f64 {
        self.values[i]
    }

    pub fn subset(&self, i: usize) -> Subset {
        if self.values[i] < self.ratio {
            Subset::Training
        } else {
            Subset::Validation
        }
    }

    /// Ascending indices of the points in `subset`.
    pub fn indices(&self, subset: Subset) -> Vec<usize> {
        (0..self.values.len()).filter(|&i| self.subset(i) == subset).collect()
    }

    pub fn training_len(&self) -> usize {
        self.values.iter().filter(|&&v| v < self.ratio).count()
    }

    pub fn validation_len(&self) -> usize {
        self.values.len() - self.training_len()
    }
}
