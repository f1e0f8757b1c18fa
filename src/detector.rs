//! Scanning-window detector cascade.
//!
//! Every `scan_stride`-th grid window goes through three stages:
//! 1. variance filter against the session's variance floor
//! 2. coarse ensemble confidence
//! 3. fine nearest-neighbour verification of the best `max_candidates`

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::Classifier;
use crate::geometry::BoundingBox;
use crate::grid::Grid;
use crate::patch::{IntegralImage, Pattern};
use crate::{Error, Result};

/// Detector cascade settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Only every `scan_stride`-th grid window is evaluated.
    pub scan_stride: usize,
    /// Maximum windows handed from the coarse to the fine stage.
    pub max_candidates: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scan_stride: 7,
            max_candidates: 100,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scan_stride == 0 || self.max_candidates == 0 {
            return Err(Error::InvalidConfig(
                "detector scan_stride and max_candidates must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A window accepted by the full cascade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Conservative similarity from the fine classifier.
    pub confidence: f64,
    /// Relative similarity from the fine classifier.
    pub relative_similarity: f64,
    /// Index of the window in the grid.
    pub grid_index: usize,
}

/// Output of one detector pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
    /// Windows that passed the variance filter.
    pub variance_survivors: usize,
    /// Windows that passed the coarse stage, before capping.
    pub coarse_survivors: usize,
}

impl DetectionSet {
    /// Whether the detector fired this frame.
    pub fn detected(&self) -> bool {
        !self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Run the detector cascade over `frame`.
pub fn detect<C: Classifier + ?Sized>(
    frame: &GrayImage,
    grid: &Grid,
    variance_floor: f64,
    classifier: &C,
    config: &DetectorConfig,
    patch_size: u32,
) -> Result<DetectionSet> {
    let integral = IntegralImage::new(frame);
    let windows = grid.windows();
    let coarse_min = classifier.feature_count() as f64 * classifier.coarse_threshold();

    let mut variance_survivors = 0;
    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for (i, window) in windows.iter().enumerate().step_by(config.scan_stride.max(1)) {
        if integral.variance(&window.bbox) < variance_floor {
            continue;
        }
        variance_survivors += 1;

        let features = classifier.extract_features(frame, &window.bbox, window.scale_index);
        let confidence = classifier.coarse_confidence(&features);
        if confidence > coarse_min {
            candidates.push((i, confidence));
        }
    }
    let coarse_survivors = candidates.len();

    // Stable sort: equal confidences keep scan order
    if candidates.len() > config.max_candidates {
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(config.max_candidates);
    }

    let fine_threshold = classifier.fine_threshold();
    let mut detections = Vec::new();
    for (i, _) in candidates {
        let bbox = windows[i].bbox;
        let pattern = Pattern::extract(frame, &bbox, patch_size)?;
        let answer = classifier.fine_query(&pattern);
        if answer.relative_similarity > fine_threshold && answer.is_positive {
            detections.push(Detection {
                bbox,
                confidence: answer.conservative_similarity,
                relative_similarity: answer.relative_similarity,
                grid_index: i,
            });
        }
    }

    debug!(
        variance = variance_survivors,
        coarse = coarse_survivors,
        fine = detections.len(),
        "detector pass"
    );

    Ok(DetectionSet {
        detections,
        variance_survivors,
        coarse_survivors,
    })
}
