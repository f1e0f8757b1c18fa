//! Box geometry: overlap, hulls, point seeding and motion prediction.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in pixel coordinates.
///
/// `x`/`y` is the top-left corner; the box covers `[x, x + width)` by
/// `[y, y + height)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Area in pixels, zero for degenerate boxes.
    #[inline]
    pub fn area(&self) -> i64 {
        if self.width <= 0 || self.height <= 0 {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    #[inline]
    pub fn min_side(&self) -> i32 {
        self.width.min(self.height)
    }

    /// Whether the box lies entirely inside a `frame_width x frame_height` image.
    pub fn is_inside(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= frame_width as i64
            && self.y as i64 + self.height as i64 <= frame_height as i64
    }

    /// Centre of the box in continuous pixel coordinates.
    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            self.x as f32 + (self.width - 1) as f32 * 0.5,
            self.y as f32 + (self.height - 1) as f32 * 0.5,
        )
    }
}

/// Intersection over union of two boxes.
///
/// Symmetric, in `[0, 1]`, and 0 for disjoint or degenerate boxes.
pub fn overlap(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0) as f64;
    let inter_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0) as f64;
    let intersection = inter_w * inter_h;

    let union = a.area() as f64 + b.area() as f64 - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Axis-aligned bounding box of a set of boxes.
///
/// Returns `None` for an empty set.
pub fn hull<'a, I>(boxes: I) -> Option<BoundingBox>
where
    I: IntoIterator<Item = &'a BoundingBox>,
{
    let mut iter = boxes.into_iter();
    let first = iter.next()?;

    let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.right(), first.bottom());
    for b in iter {
        x1 = x1.min(b.x);
        y1 = y1.min(b.y);
        x2 = x2.max(b.right());
        y2 = y2.max(b.bottom());
    }

    Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
}

/// Lay out a `count x count` regular grid of points inside `bbox`, inset by
/// `margin` pixels on every side.
///
/// Returns no points when the box is not larger than twice the margin.
pub fn seed_points(bbox: &BoundingBox, count: usize, margin: i32) -> Vec<Point2<f32>> {
    let inner_w = bbox.width - 2 * margin;
    let inner_h = bbox.height - 2 * margin;
    if count == 0 || inner_w <= 0 || inner_h <= 0 {
        return Vec::new();
    }

    let step_x = inner_w as f32 / count as f32;
    let step_y = inner_h as f32 / count as f32;
    let x0 = (bbox.x + margin) as f32;
    let y0 = (bbox.y + margin) as f32;

    let mut points = Vec::with_capacity(count * count);
    for row in 0..count {
        for col in 0..count {
            points.push(Point2::new(
                x0 + col as f32 * step_x,
                y0 + row as f32 * step_y,
            ));
        }
    }
    points
}

/// Upper median (the `n / 2` order statistic) of a sequence.
///
/// Reorders `values` in place. Returns `None` for an empty slice.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}

/// Predict the box following a set of point correspondences.
///
/// The prior box is translated by the per-axis median point offset and its
/// width and height are multiplied by the median ratio of pairwise point
/// distances. Translation applies to the top-left corner while scaling keeps
/// that corner fixed, so a pure scale change also shifts the box centre.
///
/// Returns `None` when there are no correspondences, or when the flow is
/// non-finite or moves the box outside the representable pixel range.
pub fn predict_box(
    from: &[Point2<f32>],
    to: &[Point2<f32>],
    prior: &BoundingBox,
) -> Option<BoundingBox> {
    let n = from.len().min(to.len());
    if n == 0 {
        return None;
    }

    let mut dx: Vec<f32> = (0..n).map(|i| to[i].x - from[i].x).collect();
    let mut dy: Vec<f32> = (0..n).map(|i| to[i].y - from[i].y).collect();
    let dx = median(&mut dx)?;
    let dy = median(&mut dy)?;

    let mut ratios = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let before = (from[i] - from[j]).norm();
            if before > f32::EPSILON {
                ratios.push((to[i] - to[j]).norm() / before);
            }
        }
    }
    let scale = median(&mut ratios).unwrap_or(1.0);

    let x = (prior.x as f64 + dx as f64).round();
    let y = (prior.y as f64 + dy as f64).round();
    let width = (prior.width as f64 * scale as f64).round();
    let height = (prior.height as f64 * scale as f64).round();

    let range = i32::MIN as f64..=i32::MAX as f64;
    let representable = [x, y, width, height, x + width, y + height]
        .iter()
        .all(|v| range.contains(v));
    if !representable {
        return None;
    }

    Some(BoundingBox::new(x as i32, y as i32, width as i32, height as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_overlap_identical() {
        let a = BoundingBox::new(10, 10, 20, 30);
        assert_relative_eq!(overlap(&a, &a), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_overlap_disjoint() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 20, 10, 10);
        assert_eq!(overlap(&a, &b), 0.0);

        // Touching edges share no area
        let c = BoundingBox::new(10, 0, 10, 10);
        assert_eq!(overlap(&a, &c), 0.0);
    }

    #[test]
    fn test_overlap_partial_and_symmetric() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 5, 10, 10);
        // Intersection: 5x5 = 25, Union: 100 + 100 - 25 = 175
        assert_relative_eq!(overlap(&a, &b), 25.0 / 175.0, epsilon = 1e-12);
        assert_eq!(overlap(&a, &b), overlap(&b, &a));
    }

    #[test]
    fn test_overlap_bounded() {
        let boxes = [
            BoundingBox::new(0, 0, 10, 10),
            BoundingBox::new(3, -2, 7, 30),
            BoundingBox::new(-5, 4, 40, 3),
            BoundingBox::new(2, 2, 0, 5),
        ];
        for a in &boxes {
            for b in &boxes {
                let o = overlap(a, b);
                assert!((0.0..=1.0).contains(&o), "overlap {} out of range", o);
            }
        }
    }

    #[test]
    fn test_overlap_zero_area() {
        let a = BoundingBox::new(5, 5, 0, 0);
        assert_eq!(overlap(&a, &a), 0.0);
    }

    #[test]
    fn test_hull() {
        let boxes = vec![
            BoundingBox::new(10, 20, 5, 5),
            BoundingBox::new(2, 30, 10, 10),
            BoundingBox::new(8, 4, 20, 2),
        ];
        assert_eq!(hull(&boxes), Some(BoundingBox::new(2, 4, 26, 36)));
        assert_eq!(hull(&Vec::<BoundingBox>::new()), None);
    }

    #[test]
    fn test_seed_points_grid() {
        let bbox = BoundingBox::new(100, 80, 40, 40);
        let points = seed_points(&bbox, 10, 5);

        assert_eq!(points.len(), 100);
        assert_relative_eq!(points[0].x, 105.0);
        assert_relative_eq!(points[0].y, 85.0);
        // Step is (40 - 10) / 10 = 3
        assert_relative_eq!(points[1].x, 108.0);
        assert_relative_eq!(points[10].y, 88.0);
        for p in &points {
            assert!(p.x >= 105.0 && p.x < 135.0);
            assert!(p.y >= 85.0 && p.y < 115.0);
        }
    }

    #[test]
    fn test_seed_points_box_smaller_than_margin() {
        let bbox = BoundingBox::new(0, 0, 8, 40);
        assert!(seed_points(&bbox, 10, 5).is_empty());
        assert!(seed_points(&BoundingBox::new(0, 0, 10, 10), 10, 5).is_empty());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0f32]), Some(3.0));
        assert_eq!(median(&mut [5.0f32, 1.0, 3.0]), Some(3.0));
        // Upper median for even length
        assert_eq!(median(&mut [4.0f32, 1.0, 2.0, 3.0]), Some(3.0));
    }

    #[test]
    fn test_predict_box_zero_flow() {
        let prior = BoundingBox::new(50, 60, 30, 20);
        let points = seed_points(&prior, 5, 2);
        assert_eq!(predict_box(&points, &points, &prior), Some(prior));
    }

    #[test]
    fn test_predict_box_translation() {
        let prior = BoundingBox::new(50, 60, 30, 20);
        let from = seed_points(&prior, 5, 2);
        let to: Vec<_> = from.iter().map(|p| Point2::new(p.x + 4.0, p.y - 3.0)).collect();

        assert_eq!(
            predict_box(&from, &to, &prior),
            Some(BoundingBox::new(54, 57, 30, 20))
        );
    }

    #[test]
    fn test_predict_box_scale_keeps_corner_reference() {
        let prior = BoundingBox::new(0, 0, 40, 20);
        let from = vec![
            Point2::new(10.0, 10.0),
            Point2::new(20.0, 10.0),
            Point2::new(10.0, 20.0),
        ];
        // Points spread by 2x around the first point
        let to: Vec<_> = from
            .iter()
            .map(|p| Point2::new(10.0 + (p.x - 10.0) * 2.0, 10.0 + (p.y - 10.0) * 2.0))
            .collect();

        let predicted = predict_box(&from, &to, &prior).unwrap();
        assert_eq!(predicted.width, 80);
        assert_eq!(predicted.height, 40);
        // Median offsets are zero, so the top-left corner stays put
        assert_eq!(predicted.x, 0);
        assert_eq!(predicted.y, 0);
    }

    #[test]
    fn test_predict_box_robust_to_outlier() {
        let prior = BoundingBox::new(10, 10, 20, 20);
        let from = seed_points(&prior, 3, 2);
        let mut to: Vec<_> = from.iter().map(|p| Point2::new(p.x + 2.0, p.y)).collect();
        to[4] = Point2::new(500.0, 500.0);

        let predicted = predict_box(&from, &to, &prior).unwrap();
        assert_eq!(predicted.x, 12);
        assert_eq!(predicted.y, 10);
    }

    #[test]
    fn test_predict_box_rejects_extreme_flow() {
        let prior = BoundingBox::new(10, 10, 20, 20);
        let from = seed_points(&prior, 3, 2);

        let far: Vec<_> = from.iter().map(|p| Point2::new(p.x + 3e9, p.y)).collect();
        assert_eq!(predict_box(&from, &far, &prior), None);

        let nan: Vec<_> = from.iter().map(|_| Point2::new(f32::NAN, f32::NAN)).collect();
        assert_eq!(predict_box(&from, &nan, &prior), None);

        let inf: Vec<_> = from.iter().map(|p| Point2::new(p.x, f32::INFINITY)).collect();
        assert_eq!(predict_box(&from, &inf, &prior), None);
    }

    #[test]
    fn test_is_inside_near_integer_limits() {
        let bbox = BoundingBox::new(i32::MAX - 5, 0, 20, 20);
        assert!(!bbox.is_inside(160, 120));
        // Edges past i32::MAX are still compared exactly
        assert!(bbox.is_inside(u32::MAX, 120));
    }

    #[test]
    fn test_predict_box_empty() {
        let prior = BoundingBox::new(0, 0, 10, 10);
        assert_eq!(predict_box(&[], &[], &prior), None);
    }

    #[test]
    fn test_predict_box_coincident_points() {
        let prior = BoundingBox::new(0, 0, 10, 10);
        let from = vec![Point2::new(3.0, 3.0), Point2::new(3.0, 3.0)];
        let to = vec![Point2::new(4.0, 3.0), Point2::new(4.0, 3.0)];
        // No usable pair -> unit scale
        assert_eq!(
            predict_box(&from, &to, &prior),
            Some(BoundingBox::new(1, 0, 10, 10))
        );
    }
}
