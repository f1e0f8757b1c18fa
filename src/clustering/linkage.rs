//! Single-linkage agglomerative clustering on box overlap distance.

use super::relabel;
use crate::geometry::{overlap, BoundingBox};

/// One agglomeration step.
///
/// Observations are numbered `0..n`; the cluster created by merge `k` is
/// numbered `n + k`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    /// Number of observations in the merged cluster.
    pub size: usize,
}

/// Reusable buffers for [`single_linkage`].
#[derive(Clone, Debug, Default)]
pub struct LinkageScratch {
    distances: Vec<f64>,
    active: Vec<bool>,
    ids: Vec<usize>,
    sizes: Vec<usize>,
}

impl LinkageScratch {
    fn reset(&mut self, n: usize) {
        self.distances.clear();
        self.distances.resize(n * n, f64::INFINITY);
        self.active.clear();
        self.active.resize(n, true);
        self.ids.clear();
        self.ids.extend(0..n);
        self.sizes.clear();
        self.sizes.resize(n, 1);
    }
}

/// Build the single-linkage dendrogram of `boxes` with distance `1 - overlap`.
///
/// Undefined (NaN) distances are treated as infinite and therefore merge last.
/// Returns `boxes.len() - 1` merges in order of non-decreasing distance.
pub fn single_linkage(boxes: &[BoundingBox], scratch: &mut LinkageScratch) -> Vec<Merge> {
    let n = boxes.len();
    if n < 2 {
        return Vec::new();
    }
    scratch.reset(n);

    for i in 0..n {
        for j in (i + 1)..n {
            let d = 1.0 - overlap(&boxes[i], &boxes[j]);
            let d = if d.is_nan() { f64::INFINITY } else { d };
            scratch.distances[i * n + j] = d;
            scratch.distances[j * n + i] = d;
        }
    }

    let mut merges = Vec::with_capacity(n - 1);
    for step in 0..(n - 1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !scratch.active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !scratch.active[j] {
                    continue;
                }
                let d = scratch.distances[i * n + j];
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, distance)) = best else {
            break;
        };

        let (a, b) = (scratch.ids[i], scratch.ids[j]);
        merges.push(Merge {
            left: a.min(b),
            right: a.max(b),
            distance,
            size: scratch.sizes[i] + scratch.sizes[j],
        });

        // Fold j into i, keeping the minimum distance to every other cluster
        for k in 0..n {
            if k == i || k == j || !scratch.active[k] {
                continue;
            }
            let dj = scratch.distances[j * n + k];
            if dj < scratch.distances[i * n + k] {
                scratch.distances[i * n + k] = dj;
                scratch.distances[k * n + i] = dj;
            }
        }
        scratch.active[j] = false;
        scratch.ids[i] = n + step;
        scratch.sizes[i] += scratch.sizes[j];
    }

    merges
}

/// Flat labels for `n` observations from a dendrogram, keeping only merges
/// whose distance is at most `cutoff`.
///
/// Merges that reference unknown cluster ids are ignored.
pub fn cut_dendrogram(merges: &[Merge], n: usize, cutoff: f64) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n).collect();
    // Representative observation of every cluster id
    let mut representative: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for merge in merges {
        let (Some(&a), Some(&b)) = (representative.get(merge.left), representative.get(merge.right)) else {
            representative.push(n);
            continue;
        };
        representative.push(a);
        if merge.distance <= cutoff && a < n && b < n {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let roots: Vec<usize> = (0..n).map(|i| find(&mut parent, i)).collect();
    relabel(&roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn boxes() -> Vec<BoundingBox> {
        vec![
            BoundingBox::new(0, 0, 10, 10),
            BoundingBox::new(1, 0, 10, 10),
            BoundingBox::new(100, 0, 10, 10),
            BoundingBox::new(101, 0, 10, 10),
        ]
    }

    #[test]
    fn test_linkage_merge_order() {
        let mut scratch = LinkageScratch::default();
        let merges = single_linkage(&boxes(), &mut scratch);

        assert_eq!(merges.len(), 3);
        assert_eq!((merges[0].left, merges[0].right), (0, 1));
        assert_eq!((merges[1].left, merges[1].right), (2, 3));
        assert_eq!((merges[2].left, merges[2].right), (4, 5));
        assert_eq!(merges[2].size, 4);
        assert_relative_eq!(merges[0].distance, 1.0 - 90.0 / 110.0, epsilon = 1e-12);
        assert_relative_eq!(merges[2].distance, 1.0);
        for pair in merges.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_cut_dendrogram() {
        let mut scratch = LinkageScratch::default();
        let merges = single_linkage(&boxes(), &mut scratch);

        assert_eq!(cut_dendrogram(&merges, 4, 0.5), vec![0, 0, 1, 1]);
        assert_eq!(cut_dendrogram(&merges, 4, 1.0), vec![0, 0, 0, 0]);
        assert_eq!(cut_dendrogram(&merges, 4, 0.0), vec![0, 1, 2, 3]);
        assert_eq!(cut_dendrogram(&merges, 4, f64::NAN), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cut_dendrogram_ignores_malformed_merges() {
        let merges = vec![Merge { left: 0, right: 42, distance: 0.0, size: 2 }];
        assert_eq!(cut_dendrogram(&merges, 2, 1.0), vec![0, 1]);
    }

    #[test]
    fn test_linkage_small_inputs() {
        let mut scratch = LinkageScratch::default();
        assert!(single_linkage(&[], &mut scratch).is_empty());
        assert!(single_linkage(&boxes()[..1], &mut scratch).is_empty());
    }

    #[test]
    fn test_scratch_reuse() {
        let mut scratch = LinkageScratch::default();
        let first = single_linkage(&boxes(), &mut scratch);
        let _ = single_linkage(&boxes()[..2], &mut scratch);
        let again = single_linkage(&boxes(), &mut scratch);
        assert_eq!(first, again);
    }
}
