//! Multiscale scanning-window grid.
//!
//! The grid is built once from the first frame and the initial box. Window
//! geometry never changes afterwards; only the per-window overlap with the
//! current reference box is refreshed between learning cycles. Positive and
//! negative window sets are derived as fresh index lists on every call.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{overlap, BoundingBox};
use crate::{Error, Result};

/// Scale factors applied to the initial box size (ratio 1.2 per step).
pub const GRID_SCALES: [f64; 21] = [
    0.16151, 0.19381, 0.23257, 0.27908, 0.33490, 0.40188, 0.48225, 0.57870, 0.69444, 0.83333,
    1.0, 1.20000, 1.44000, 1.72800, 2.07360, 2.48832, 2.98598, 3.58318, 4.29982, 5.15978,
    6.19174,
];

/// Window step as a fraction of the window's smaller side.
pub const GRID_SHIFT: f64 = 0.1;

/// Windows overlapping the reference box by more than this are positive.
pub const GOOD_OVERLAP: f64 = 0.6;

/// Size of one accepted scale tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: i32,
    pub height: i32,
}

/// One scanning window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridWindow {
    pub bbox: BoundingBox,
    /// Index into [`Grid::scales`].
    pub scale_index: usize,
    /// Overlap with the current reference box.
    pub overlap: f64,
}

/// Windows selected against a reference box.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlapSelection {
    /// Index of the window with maximum overlap.
    pub best: usize,
    /// Indices with overlap > 0.6, at most `max_good`, highest overlap first.
    pub good: Vec<usize>,
    /// Indices with overlap below the bad threshold, in grid order.
    pub bad: Vec<usize>,
}

/// Fixed multiscale set of scanning windows for one frame size.
#[derive(Clone, Debug)]
pub struct Grid {
    windows: Vec<GridWindow>,
    scales: Vec<WindowSize>,
    frame_width: u32,
    frame_height: u32,
}

impl Grid {
    /// Build the scanning grid for a frame of the given size around `initial`.
    ///
    /// Scales whose smaller side is below `min_window`, or that do not fit the
    /// frame, are skipped. Windows are enumerated scale-major, then row by row.
    pub fn build(
        frame_width: u32,
        frame_height: u32,
        initial: &BoundingBox,
        min_window: i32,
    ) -> Result<Self> {
        if initial.is_empty() {
            return Err(Error::InvalidBox(format!(
                "initial box {:?} has zero area",
                initial
            )));
        }

        let cols = frame_width as i64;
        let rows = frame_height as i64;
        let mut windows = Vec::new();
        let mut scales = Vec::new();

        for factor in GRID_SCALES {
            let width = (initial.width as f64 * factor).round() as i32;
            let height = (initial.height as f64 * factor).round() as i32;
            let min_side = width.min(height);
            if min_side < min_window || width as i64 > cols || height as i64 > rows {
                continue;
            }

            let scale_index = scales.len();
            scales.push(WindowSize { width, height });

            let step = ((GRID_SHIFT * min_side as f64).round() as usize).max(1);
            for y in (0..=(rows - height as i64)).step_by(step) {
                for x in (0..=(cols - width as i64)).step_by(step) {
                    let bbox = BoundingBox::new(x as i32, y as i32, width, height);
                    windows.push(GridWindow {
                        bbox,
                        scale_index,
                        overlap: overlap(&bbox, initial),
                    });
                }
            }
        }

        if windows.is_empty() {
            return Err(Error::EmptyGrid {
                box_width: initial.width,
                box_height: initial.height,
                frame_width,
                frame_height,
                min_window,
            });
        }

        debug!(
            windows = windows.len(),
            scales = scales.len(),
            "built scanning grid"
        );

        Ok(Self {
            windows,
            scales,
            frame_width,
            frame_height,
        })
    }

    pub fn windows(&self) -> &[GridWindow] {
        &self.windows
    }

    pub fn scales(&self) -> &[WindowSize] {
        &self.scales
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Frame size the grid was built for.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    /// Recompute every window's overlap against a new reference box.
    pub fn update_overlaps(&mut self, reference: &BoundingBox) {
        for window in &mut self.windows {
            window.overlap = overlap(&window.bbox, reference);
        }
    }

    /// Split the grid by the overlaps currently stored on each window.
    ///
    /// The best window is the first one of maximum overlap in grid order.
    pub fn select(&self, max_good: usize, bad_overlap: f64) -> OverlapSelection {
        let mut best = 0;
        let mut best_overlap = f64::NEG_INFINITY;
        let mut good = Vec::new();
        let mut bad = Vec::new();

        for (i, window) in self.windows.iter().enumerate() {
            if window.overlap > best_overlap {
                best_overlap = window.overlap;
                best = i;
            }
            if window.overlap > GOOD_OVERLAP {
                good.push(i);
            } else if window.overlap < bad_overlap {
                bad.push(i);
            }
        }

        // Stable sort keeps grid order among equal overlaps
        good.sort_by(|&a, &b| self.windows[b].overlap.total_cmp(&self.windows[a].overlap));
        good.truncate(max_good);

        OverlapSelection { best, good, bad }
    }

    /// Bounding boxes for a list of window indices.
    pub fn boxes<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a BoundingBox> + 'a {
        indices.iter().map(move |&i| &self.windows[i].bbox)
    }
}
