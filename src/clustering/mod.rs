//! Detection clustering.
//!
//! Detections that agree spatially are merged into cluster hypotheses whose
//! box is the rounded mean of the member boxes and whose confidence is the
//! mean member confidence.
//!
//! Two strategies are available behind [`ClusterStrategy`]:
//! - `OverlapPartition` - equivalence classes of the "overlap >= 0.5" relation
//! - `SingleLinkage` - hierarchical agglomeration on `1 - overlap`, cut at a distance

mod linkage;
mod partition;

pub use linkage::{cut_dendrogram, single_linkage, LinkageScratch, Merge};
pub use partition::partition_by_overlap;

use serde::{Deserialize, Serialize};

use crate::detector::Detection;
use crate::geometry::{overlap, BoundingBox};

/// Detections overlapping at least this much belong to the same object.
pub const CLUSTER_OVERLAP: f64 = 0.5;

/// A merged detection hypothesis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cluster {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// Number of member detections.
    pub size: usize,
}

/// Clustering algorithm used for three or more detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterStrategy {
    /// Transitive closure of pairwise overlap >= 0.5.
    #[default]
    OverlapPartition,
    /// Single-linkage agglomeration on `1 - overlap`, cut at `cutoff`.
    SingleLinkage { cutoff: f64 },
}

impl ClusterStrategy {
    /// Assign a cluster label to every detection.
    ///
    /// Labels are dense and numbered in order of first appearance.
    pub fn labels(&self, boxes: &[BoundingBox], scratch: &mut LinkageScratch) -> Vec<usize> {
        match boxes.len() {
            0 => Vec::new(),
            1 => vec![0],
            2 => {
                if overlap(&boxes[0], &boxes[1]) >= CLUSTER_OVERLAP {
                    vec![0, 0]
                } else {
                    vec![0, 1]
                }
            }
            _ => match self {
                ClusterStrategy::OverlapPartition => partition_by_overlap(boxes, CLUSTER_OVERLAP),
                ClusterStrategy::SingleLinkage { cutoff } => {
                    let merges = single_linkage(boxes, scratch);
                    cut_dendrogram(&merges, boxes.len(), *cutoff)
                }
            },
        }
    }

    /// Cluster detections into averaged hypotheses.
    pub fn cluster(&self, detections: &[Detection], scratch: &mut LinkageScratch) -> Vec<Cluster> {
        let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
        let labels = self.labels(&boxes, scratch);
        let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);

        let mut sums = vec![[0.0f64; 5]; n_clusters];
        let mut counts = vec![0usize; n_clusters];
        for (detection, &label) in detections.iter().zip(&labels) {
            let b = &detection.bbox;
            let s = &mut sums[label];
            s[0] += b.x as f64;
            s[1] += b.y as f64;
            s[2] += b.width as f64;
            s[3] += b.height as f64;
            s[4] += detection.confidence;
            counts[label] += 1;
        }

        sums.iter()
            .zip(&counts)
            .filter(|(_, n)| **n > 0)
            .map(|(s, &n)| {
                let n_f = n as f64;
                Cluster {
                    bbox: BoundingBox::new(
                        (s[0] / n_f).round() as i32,
                        (s[1] / n_f).round() as i32,
                        (s[2] / n_f).round() as i32,
                        (s[3] / n_f).round() as i32,
                    ),
                    confidence: s[4] / n_f,
                    size: n,
                }
            })
            .collect()
    }
}

/// Renumber arbitrary labels densely in order of first appearance.
pub(crate) fn relabel(raw: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<Option<usize>> = vec![None; raw.iter().max().map_or(0, |&m| m + 1)];
    let mut next = 0;
    raw.iter()
        .map(|&r| {
            *mapping[r].get_or_insert_with(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}
