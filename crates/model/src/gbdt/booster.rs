//! Tree ensemble with deterministic integer-only scoring

use super::tree::Tree;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default scale factor for fixed-point arithmetic (1e6)
pub const SCALE: i64 = 1_000_000;

/// Supported booster format version
pub const BOOSTER_VERSION: i32 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BoosterError {
    #[error("unsupported booster version {0}")]
    UnsupportedVersion(i32),

    #[error("scale must be positive, got {0}")]
    InvalidScale(i64),

    #[error("booster has no trees")]
    Empty,

    #[error("tree {index}: {reason}")]
    InvalidTree { index: usize, reason: String },

    #[error("tree {index} splits on feature {feature} but only {available} features are declared")]
    FeatureOutOfRange {
        index: usize,
        feature: usize,
        available: usize,
    },
}

/// GBDT ensemble producing a fixed-point score
///
/// `score = bias + sum(leaf * tree.weight / scale)` over all trees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booster {
    pub version: i32,
    pub scale: i64,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub bias: i64,
}

impl Booster {
    pub fn new(trees: Vec<Tree>, bias: i64) -> Self {
        Self {
            version: BOOSTER_VERSION,
            scale: SCALE,
            trees,
            bias,
        }
    }

    /// Check format version, scale and every tree, and that no split reads
    /// past the `feature_count` columns the model declares.
    pub fn validate(&self, feature_count: usize) -> Result<(), BoosterError> {
        if self.version != BOOSTER_VERSION {
            return Err(BoosterError::UnsupportedVersion(self.version));
        }
        if self.scale <= 0 {
            return Err(BoosterError::InvalidScale(self.scale));
        }
        if self.trees.is_empty() {
            return Err(BoosterError::Empty);
        }

        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|reason| BoosterError::InvalidTree { index, reason })?;

            if let Some(feature) = tree.max_feature_index() {
                if feature >= feature_count {
                    return Err(BoosterError::FeatureOutOfRange {
                        index,
                        feature,
                        available: feature_count,
                    });
                }
            }
        }

        Ok(())
    }

    /// Score one encoded feature vector.
    pub fn score(&self, features: &[i64]) -> i64 {
        let scale = i128::from(self.scale);
        let total = self.trees.iter().fold(i128::from(self.bias), |acc, tree| {
            let leaf = i128::from(tree.evaluate(features));
            acc + leaf * i128::from(tree.weight) / scale
        });

        total.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}
