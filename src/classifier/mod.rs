//! Classifier collaborator contract.
//!
//! The detector cascade ends in two learned stages that this crate does not
//! implement itself:
//! - a coarse randomized-ensemble classifier working on integer feature codes
//! - a fine nearest-neighbour classifier comparing normalized [`Pattern`]s
//!
//! Both are reached through the [`Classifier`] trait.
//!
//! [`Pattern`]: crate::patch::Pattern

mod traits;
#[cfg(test)]
pub(crate) mod mock;

pub use traits::Classifier;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Structure sizes and thresholds handed to the classifier on construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of ensemble members (ferns).
    pub num_trees: usize,
    /// Binary tests per ensemble member.
    pub num_features: usize,
    /// Per-member posterior threshold; windows need `num_trees * coarse_threshold`.
    pub coarse_threshold: f64,
    /// Relative-similarity threshold for a positive detection.
    pub fine_threshold: f64,
    /// Conservative-similarity threshold above which a track is confirmed.
    pub validity_threshold: f64,
    /// Correlation above which two patterns are considered the same.
    pub same_patch_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_trees: 10,
            num_features: 13,
            coarse_threshold: 0.6,
            fine_threshold: 0.65,
            validity_threshold: 0.7,
            same_patch_threshold: 0.95,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 || self.num_features == 0 {
            return Err(Error::InvalidConfig(
                "classifier num_trees and num_features must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("coarse_threshold", self.coarse_threshold),
            ("fine_threshold", self.fine_threshold),
            ("validity_threshold", self.validity_threshold),
            ("same_patch_threshold", self.same_patch_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "classifier {} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Answer of the fine classifier for one pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FineMatch {
    /// Similarity to the positive model relative to the negative one.
    pub relative_similarity: f64,
    /// Relative similarity against the earliest positive templates only.
    pub conservative_similarity: f64,
    /// The pattern is (nearly) identical to a stored positive template.
    pub is_positive: bool,
    /// Index of the most similar positive template, if any.
    pub nearest_positive: Option<usize>,
    /// The pattern is (nearly) identical to a stored negative template.
    pub is_negative: bool,
}

/// Ensemble feature codes with their training label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledFeatures {
    pub features: Vec<u32>,
    pub positive: bool,
}

impl LabeledFeatures {
    pub fn positive(features: Vec<u32>) -> Self {
        Self { features, positive: true }
    }

    pub fn negative(features: Vec<u32>) -> Self {
        Self { features, positive: false }
    }
}
