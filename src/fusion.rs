//! Per-frame fusion of tracker and detector hypotheses.
//!
//! [`fuse`] is a pure function of the tracker outcome and the detector
//! clusters for one frame. It decides which box to report, with what
//! confidence and validity, and whether a track exists for the next frame.

use serde::{Deserialize, Serialize};

use crate::clustering::Cluster;
use crate::geometry::{overlap, BoundingBox};

/// Clusters overlapping the tracked box less than this may re-anchor it.
pub const REANCHOR_OVERLAP: f64 = 0.5;

/// Clusters overlapping the tracked box more than this are averaged into it.
pub const CLOSE_OVERLAP: f64 = 0.7;

/// Weight of the tracked box in the weighted average with close clusters.
pub const TRACKER_WEIGHT: f64 = 10.0;

/// Whether the current estimate has been confirmed by the object model.
///
/// Only confirmed estimates are used to train the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Validity {
    Confirmed,
    #[default]
    Unconfirmed,
}

impl Validity {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Validity::Confirmed)
    }
}

/// Output of a successful short-term tracking step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackEstimate {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub validity: Validity,
}

/// The box reported for a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusedEstimate {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub validity: Validity,
}

/// Which branch of the fusion produced the frame's estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionDecision {
    /// Tracker output reported as is.
    Tracked,
    /// Tracker output averaged with this many close clusters.
    Blended(usize),
    /// A single far, more confident cluster replaced the tracker output.
    Reanchored,
    /// No valid track; a single cluster (re)started the track.
    Acquired,
    /// No estimate this frame.
    #[default]
    Lost,
}

/// Fuse one frame's tracker and detector outcomes.
///
/// `track` is `Some` only when a track existed entering the frame and the
/// short-term tracker produced a valid estimate. `clusters` is empty when
/// the detector did not fire.
///
/// Without a valid track, an estimate is produced only when the detector
/// yields exactly one cluster; several ambiguous clusters drop the frame.
pub fn fuse(track: Option<&TrackEstimate>, clusters: &[Cluster]) -> (Option<FusedEstimate>, FusionDecision) {
    let Some(track) = track else {
        return match clusters {
            [only] => (
                Some(FusedEstimate {
                    bbox: only.bbox,
                    confidence: only.confidence,
                    validity: Validity::Unconfirmed,
                }),
                FusionDecision::Acquired,
            ),
            _ => (None, FusionDecision::Lost),
        };
    };

    let tracked = FusedEstimate {
        bbox: track.bbox,
        confidence: track.confidence,
        validity: track.validity,
    };
    if clusters.is_empty() {
        return (Some(tracked), FusionDecision::Tracked);
    }

    let mut confident = clusters.iter().filter(|c| {
        overlap(&track.bbox, &c.bbox) < REANCHOR_OVERLAP && c.confidence > track.confidence
    });
    if let (Some(better), None) = (confident.next(), confident.next()) {
        return (
            Some(FusedEstimate {
                bbox: better.bbox,
                confidence: better.confidence,
                validity: Validity::Unconfirmed,
            }),
            FusionDecision::Reanchored,
        );
    }

    let close: Vec<&Cluster> = clusters
        .iter()
        .filter(|c| overlap(&track.bbox, &c.bbox) > CLOSE_OVERLAP)
        .collect();
    if close.is_empty() {
        return (Some(tracked), FusionDecision::Tracked);
    }

    let weight = TRACKER_WEIGHT + close.len() as f64;
    let blend = |pick: fn(&BoundingBox) -> i32| -> i32 {
        let sum: f64 = close.iter().map(|c| pick(&c.bbox) as f64).sum();
        ((TRACKER_WEIGHT * pick(&track.bbox) as f64 + sum) / weight).round() as i32
    };
    let bbox = BoundingBox::new(
        blend(|b| b.x),
        blend(|b| b.y),
        blend(|b| b.width),
        blend(|b| b.height),
    );

    (
        Some(FusedEstimate { bbox, ..tracked }),
        FusionDecision::Blended(close.len()),
    )
}
