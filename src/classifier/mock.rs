//! Scripted classifier for unit tests.

use image::GrayImage;

use super::{Classifier, ClassifierConfig, FineMatch, LabeledFeatures};
use crate::geometry::{overlap, BoundingBox};
use crate::grid::WindowSize;
use crate::patch::Pattern;
use crate::Result;

/// Encodes each window's geometry, followed by a few of its pixel values, as
/// its features and accepts windows close to a configurable target box.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockClassifier {
    pub config: ClassifierConfig,
    pub scales: Vec<WindowSize>,
    pub target: Option<BoundingBox>,
    pub target_overlap: f64,
    pub fine: FineMatch,
    pub coarse_batches: Vec<Vec<LabeledFeatures>>,
    pub fine_batches: Vec<(Pattern, Vec<Pattern>)>,
    pub calibrations: Vec<(usize, usize)>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            target_overlap: 0.75,
            fine: FineMatch {
                relative_similarity: 1.0,
                conservative_similarity: 0.8,
                is_positive: true,
                nearest_positive: Some(0),
                is_negative: false,
            },
            ..Default::default()
        }
    }

    pub fn decode(features: &[u32]) -> BoundingBox {
        BoundingBox::new(
            features[0] as i32,
            features[1] as i32,
            features[2] as i32,
            features[3] as i32,
        )
    }
}

impl Classifier for MockClassifier {
    fn configure(&mut self, config: &ClassifierConfig) -> Result<()> {
        self.config = config.clone();
        Ok(())
    }

    fn prepare(&mut self, scales: &[WindowSize]) {
        self.scales = scales.to_vec();
    }

    fn feature_count(&self) -> usize {
        self.config.num_trees
    }

    fn coarse_threshold(&self) -> f64 {
        self.config.coarse_threshold
    }

    fn fine_threshold(&self) -> f64 {
        self.config.fine_threshold
    }

    fn validity_threshold(&self) -> f64 {
        self.config.validity_threshold
    }

    fn extract_features(&self, frame: &GrayImage, bbox: &BoundingBox, scale_index: usize) -> Vec<u32> {
        let mut features = vec![
            bbox.x as u32,
            bbox.y as u32,
            bbox.width as u32,
            bbox.height as u32,
            scale_index as u32,
        ];
        let (x0, y0) = (bbox.x as u32, bbox.y as u32);
        let (x1, y1) = ((bbox.right() - 1) as u32, (bbox.bottom() - 1) as u32);
        let (cx, cy) = ((x0 + x1) / 2, (y0 + y1) / 2);
        for (x, y) in [(cx, cy), (x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
            features.push(frame.get_pixel_checked(x, y).map_or(0, |p| p[0] as u32));
        }
        features
    }

    fn coarse_confidence(&self, features: &[u32]) -> f64 {
        match self.target {
            Some(target) if overlap(&Self::decode(features), &target) >= self.target_overlap => {
                self.config.num_trees as f64
            }
            _ => 0.0,
        }
    }

    fn fine_query(&self, _pattern: &Pattern) -> FineMatch {
        self.fine
    }

    fn train_coarse(&mut self, samples: &[LabeledFeatures], _bootstrap_rounds: usize) {
        self.coarse_batches.push(samples.to_vec());
    }

    fn train_fine(&mut self, positive: &Pattern, negatives: &[Pattern]) {
        self.fine_batches.push((positive.clone(), negatives.to_vec()));
    }

    fn calibrate_thresholds(&mut self, negative_features: &[Vec<u32>], negative_patterns: &[Pattern]) {
        self.calibrations.push((negative_features.len(), negative_patterns.len()));
    }
}
