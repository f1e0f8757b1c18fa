//! Equivalence-class partition of boxes by pairwise overlap.

use super::relabel;
use crate::geometry::{overlap, BoundingBox};

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Label boxes so that any two boxes overlapping by at least `threshold`
/// share a label, closed transitively.
pub fn partition_by_overlap(boxes: &[BoundingBox], threshold: f64) -> Vec<usize> {
    let n = boxes.len();
    let mut parent: Vec<usize> = (0..n).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            if overlap(&boxes[i], &boxes[j]) >= threshold {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let roots: Vec<usize> = (0..n).map(|i| find(&mut parent, i)).collect();
    relabel(&roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_chain() {
        let boxes = vec![
            BoundingBox::new(0, 0, 10, 10),
            BoundingBox::new(50, 50, 10, 10),
            BoundingBox::new(1, 0, 10, 10),
            BoundingBox::new(51, 51, 10, 10),
            BoundingBox::new(2, 0, 10, 10),
        ];
        assert_eq!(partition_by_overlap(&boxes, 0.5), vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_partition_all_disjoint() {
        let boxes: Vec<_> = (0..4).map(|i| BoundingBox::new(i * 20, 0, 10, 10)).collect();
        assert_eq!(partition_by_overlap(&boxes, 0.5), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_partition_threshold_is_inclusive() {
        // Intersection 200, union 400
        let a = BoundingBox::new(0, 0, 30, 10);
        let b = BoundingBox::new(10, 0, 30, 10);
        assert_eq!(overlap(&a, &b), 0.5);
        let c = BoundingBox::new(500, 0, 10, 10);
        assert_eq!(partition_by_overlap(&[a, b, c], 0.5), vec![0, 0, 1]);
    }
}
