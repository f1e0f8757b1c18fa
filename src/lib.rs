//! # TLD - Tracking-Learning-Detection
//!
//! Long-term single-object tracking that fuses a short-term point tracker,
//! a scanning-window detector and an online P-N learner.
//!
//! The crate implements the integration and control layer: the multiscale
//! scanning grid, the variance rejection cascade, training-sample synthesis,
//! detection clustering and the per-frame fusion of tracker and detector
//! hypotheses. The feature classifier and the frame-to-frame point tracker are
//! collaborators supplied by the caller through the [`Classifier`] and
//! [`PointTracker`] traits.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tld_rs::{BoundingBox, Tld, TldConfig};
//!
//! let mut tld = Tld::new(TldConfig::default(), my_classifier, my_point_tracker)?;
//! tld.initialize(&first_frame, BoundingBox::new(100, 80, 40, 40))?;
//!
//! for pair in frames.windows(2) {
//!     let result = tld.process_frame(&pair[0], &pair[1])?;
//!     if let Some(bbox) = result.bbox {
//!         println!("object at {:?} (conf {:.2})", bbox, result.confidence);
//!     }
//! }
//! ```

// Public modules
pub mod geometry;
pub mod grid;
pub mod patch;
pub mod sampling;
pub mod classifier;
pub mod flow;
pub mod detector;
pub mod clustering;
pub mod fusion;
pub mod tld;

// Re-exports for convenience
pub use geometry::BoundingBox;
pub use grid::{Grid, GridWindow, OverlapSelection, WindowSize};
pub use patch::{IntegralImage, Pattern};
pub use classifier::{Classifier, ClassifierConfig, FineMatch, LabeledFeatures};
pub use flow::{PointFlow, PointTracker};
pub use detector::{Detection, DetectionSet, DetectorConfig};
pub use clustering::{Cluster, ClusterStrategy};
pub use fusion::{FusedEstimate, FusionDecision, TrackEstimate, Validity};
pub use tld::{FrameResult, LearnOutcome, Tld, TldConfig, TrackingConfig};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur while setting up or driving a TLD session.
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid bounding box: {0}")]
        InvalidBox(String),

        #[error("Scanning grid is empty: no scale of a {box_width}x{box_height} box fits a {frame_width}x{frame_height} frame with min window {min_window}")]
        EmptyGrid {
            box_width: i32,
            box_height: i32,
            frame_width: u32,
            frame_height: u32,
            min_window: i32,
        },

        #[error("Tracker has not been initialized")]
        NotInitialized,

        #[error("Frame size mismatch: expected {expected:?}, got {got:?}")]
        FrameSizeMismatch { expected: (u32, u32), got: (u32, u32) },
    }

    /// Result type for TLD operations
    pub type Result<T> = std::result::Result<T, Error>;
}
