//! Short-term point tracker collaborator contract.

use image::GrayImage;
use nalgebra::Point2;

/// Point correspondences that survived frame-to-frame propagation.
///
/// `from[i]` in the previous frame moved to `to[i]` in the current frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointFlow {
    pub from: Vec<Point2<f32>>,
    pub to: Vec<Point2<f32>>,
}

impl PointFlow {
    pub fn len(&self) -> usize {
        self.from.len().min(self.to.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Frame-to-frame point tracker with a forward-backward consistency check.
pub trait PointTracker {
    /// Propagate `points` from `prev` to `curr`.
    ///
    /// Returns `None` when tracking failed outright. Otherwise only reliable
    /// correspondences are returned, and the median forward-backward error of
    /// this call is available from [`forward_backward_error`](Self::forward_backward_error).
    fn propagate(
        &mut self,
        prev: &GrayImage,
        curr: &GrayImage,
        points: &[Point2<f32>],
    ) -> Option<PointFlow>;

    /// Forward-backward error recorded by the last [`propagate`](Self::propagate) call, in pixels.
    fn forward_backward_error(&self) -> f64;
}
