//! Classifier trait for the detection cascade.

use image::GrayImage;

use super::{ClassifierConfig, FineMatch, LabeledFeatures};
use crate::geometry::BoundingBox;
use crate::grid::WindowSize;
use crate::patch::Pattern;
use crate::Result;

/// Coarse ensemble plus fine nearest-neighbour classifier.
///
/// Implementations are driven from a single thread, one call at a time.
pub trait Classifier {
    /// Apply structure sizes and thresholds. Called once before anything else.
    fn configure(&mut self, config: &ClassifierConfig) -> Result<()>;

    /// Prepare feature tests for every accepted scanning scale.
    ///
    /// `scales[i]` is the window size of grid scale index `i`.
    fn prepare(&mut self, scales: &[WindowSize]);

    /// Length of the vectors returned by [`extract_features`](Self::extract_features).
    fn feature_count(&self) -> usize;

    /// Per-member coarse threshold; a window passes with confidence above
    /// `feature_count() * coarse_threshold()`.
    fn coarse_threshold(&self) -> f64;

    /// Relative-similarity threshold of the fine stage.
    fn fine_threshold(&self) -> f64;

    /// Conservative-similarity threshold that confirms a track.
    fn validity_threshold(&self) -> f64;

    /// Compute the ensemble feature codes of `bbox` at grid scale `scale_index`.
    fn extract_features(&self, frame: &GrayImage, bbox: &BoundingBox, scale_index: usize) -> Vec<u32>;

    /// Aggregated ensemble confidence of a feature vector.
    fn coarse_confidence(&self, features: &[u32]) -> f64;

    /// Query the nearest-neighbour model.
    fn fine_query(&self, pattern: &Pattern) -> FineMatch;

    /// Update the ensemble with labeled samples, repeating `bootstrap_rounds` passes.
    fn train_coarse(&mut self, samples: &[LabeledFeatures], bootstrap_rounds: usize);

    /// Update the nearest-neighbour model with one positive and many negative patterns.
    fn train_fine(&mut self, positive: &Pattern, negatives: &[Pattern]);

    /// Raise thresholds so that held-out negatives are rejected.
    fn calibrate_thresholds(&mut self, negative_features: &[Vec<u32>], negative_patterns: &[Pattern]);
}
