//! TLD session: bootstrap, per-frame processing and online learning.

use image::GrayImage;
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, ClassifierConfig};
use crate::clustering::{ClusterStrategy, LinkageScratch};
use crate::detector::{self, DetectorConfig};
use crate::flow::PointTracker;
use crate::fusion::{fuse, FusionDecision, TrackEstimate, Validity};
use crate::geometry::{predict_box, seed_points, BoundingBox};
use crate::grid::{Grid, GOOD_OVERLAP};
use crate::patch::{IntegralImage, Pattern};
use crate::sampling::{self, SamplingParams};
use crate::{Error, Result};

/// Patterns less similar than this to the model are treated as an abrupt
/// appearance change and never learned from.
pub const MIN_LEARNING_SIMILARITY: f64 = 0.5;

/// Short-term tracking step settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Seed points per side of the regular grid laid inside the last box.
    pub seed_grid: usize,
    /// Inset of the seed grid from the box border, in pixels.
    pub seed_margin: i32,
    /// Tracks whose forward-backward error exceeds this (pixels) are invalid.
    pub max_fb_error: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            seed_grid: 10,
            seed_margin: 5,
            max_fb_error: 10.0,
        }
    }
}

/// Configuration for a TLD session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TldConfig {
    /// Minimum side of a scanning window.
    pub min_window: i32,
    /// Side of the normalized patterns given to the fine classifier.
    pub patch_size: u32,
    /// Positive sampling during initialization.
    pub init: SamplingParams,
    /// Positive sampling during online updates.
    pub update: SamplingParams,
    /// Windows overlapping the box less than this are negatives.
    pub bad_overlap: f64,
    /// Negative patterns per learning cycle.
    pub negative_patches: usize,
    /// Passes over the training set when updating the ensemble.
    pub bootstrap_rounds: usize,
    pub detector: DetectorConfig,
    pub tracking: TrackingConfig,
    pub clustering: ClusterStrategy,
    pub classifier: ClassifierConfig,
    /// Run the online learning step on confirmed frames.
    pub learning: bool,
    /// Seed of the session random generator used by [`Tld::new`].
    pub seed: u64,
}

impl Default for TldConfig {
    fn default() -> Self {
        Self {
            min_window: 15,
            patch_size: 15,
            init: SamplingParams::init(),
            update: SamplingParams::update(),
            bad_overlap: 0.2,
            negative_patches: 100,
            bootstrap_rounds: 2,
            detector: DetectorConfig::default(),
            tracking: TrackingConfig::default(),
            clustering: ClusterStrategy::default(),
            classifier: ClassifierConfig::default(),
            learning: true,
            seed: 0,
        }
    }
}

impl TldConfig {
    /// Check every size and threshold.
    pub fn validate(&self) -> Result<()> {
        if self.min_window <= 0 {
            return Err(Error::InvalidConfig(format!(
                "min_window must be positive, got {}",
                self.min_window
            )));
        }
        if self.patch_size == 0 {
            return Err(Error::InvalidConfig("patch_size must be positive".to_string()));
        }
        if !(self.bad_overlap > 0.0 && self.bad_overlap <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bad_overlap must be in (0, 1], got {}",
                self.bad_overlap
            )));
        }
        if self.negative_patches == 0 {
            return Err(Error::InvalidConfig("negative_patches must be positive".to_string()));
        }
        if self.tracking.seed_grid == 0 || self.tracking.seed_margin < 0 {
            return Err(Error::InvalidConfig(
                "tracking seed_grid must be positive and seed_margin non-negative".to_string(),
            ));
        }
        if !(self.tracking.max_fb_error > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tracking max_fb_error must be positive, got {}",
                self.tracking.max_fb_error
            )));
        }
        if let ClusterStrategy::SingleLinkage { cutoff } = self.clustering {
            if !cutoff.is_finite() || cutoff < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "single linkage cutoff must be finite and non-negative, got {}",
                    cutoff
                )));
            }
        }
        self.init.validate("init")?;
        self.update.validate("update")?;
        self.detector.validate()?;
        self.classifier.validate()
    }
}

/// Why the learning step did or did not train the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LearnOutcome {
    /// Learning was not attempted this frame.
    #[default]
    Skipped,
    /// The current patch differs too much from the model.
    AppearanceChange,
    /// The current patch is flatter than the variance floor.
    LowVariance,
    /// The current patch matches a known negative.
    KnownNegative,
    /// No grid window overlaps the current box enough; the estimate is
    /// downgraded to unconfirmed.
    NoGoodWindows,
    /// The classifier was updated.
    Trained { positives: usize, negatives: usize },
}

/// Outcome of processing one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameResult {
    /// Tracked point positions in the current frame.
    pub points: Vec<Point2<f32>>,
    /// Reported box, `None` when there is no estimate this frame.
    pub bbox: Option<BoundingBox>,
    /// Whether a track exists entering the next frame.
    pub has_track: bool,
    pub confidence: f64,
    pub validity: Validity,
    /// Whether the detector fired.
    pub detected: bool,
    pub decision: FusionDecision,
    pub learning: LearnOutcome,
}

/// Mutable per-session state, created by [`Tld::initialize`].
#[derive(Clone, Debug)]
struct Session {
    grid: Grid,
    last_box: BoundingBox,
    last_confidence: f64,
    last_validity: Validity,
    variance_floor: f64,
    has_track: bool,
}

/// Long-term single-object tracker.
///
/// Owns its classifier, point tracker and random generator; all state is
/// mutated only from [`initialize`](Self::initialize),
/// [`process_frame`](Self::process_frame) and [`learn`](Self::learn).
pub struct Tld<C, T, R = StdRng> {
    config: TldConfig,
    classifier: C,
    point_tracker: T,
    rng: R,
    scratch: LinkageScratch,
    session: Option<Session>,
}

impl<C: Classifier, T: PointTracker> Tld<C, T, StdRng> {
    /// Create a session whose random generator is seeded from `config.seed`.
    pub fn new(config: TldConfig, classifier: C, point_tracker: T) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, classifier, point_tracker, rng)
    }
}

impl<C: Classifier, T: PointTracker, R: Rng> Tld<C, T, R> {
    /// Create a session drawing every random sample from `rng`.
    pub fn with_rng(config: TldConfig, mut classifier: C, point_tracker: T, rng: R) -> Result<Self> {
        config.validate()?;
        classifier.configure(&config.classifier)?;

        Ok(Self {
            config,
            classifier,
            point_tracker,
            rng,
            scratch: LinkageScratch::default(),
            session: None,
        })
    }

    /// Build the scanning grid, bootstrap the classifier and start the track.
    ///
    /// Re-initializing discards the previous session state.
    pub fn initialize(&mut self, frame: &GrayImage, bbox: BoundingBox) -> Result<()> {
        if bbox.is_empty() {
            return Err(Error::InvalidBox(format!("initial box {:?} has zero area", bbox)));
        }
        if !bbox.is_inside(frame.width(), frame.height()) {
            return Err(Error::InvalidBox(format!(
                "initial box {:?} is not inside the {}x{} frame",
                bbox,
                frame.width(),
                frame.height()
            )));
        }
        let Self {
            config,
            classifier,
            rng,
            ..
        } = self;

        let grid = Grid::build(frame.width(), frame.height(), &bbox, config.min_window)?;
        let selection = grid.select(config.init.closest, config.bad_overlap);
        if selection.good.is_empty() {
            return Err(Error::InvalidBox(format!(
                "no scanning window overlaps the initial box {:?} by more than {}",
                bbox,
                GOOD_OVERLAP
            )));
        }
        let best_box = grid.windows()[selection.best].bbox;
        info!(
            windows = grid.len(),
            good = selection.good.len(),
            bad = selection.bad.len(),
            ?best_box,
            "initializing tracker"
        );

        classifier.prepare(grid.scales());

        let positives = sampling::generate_positive(
            frame,
            &grid,
            &selection,
            &*classifier,
            &config.init,
            config.patch_size,
            rng,
        )?;
        let variance_floor = positives.pattern.variance * 0.5;

        let integral = IntegralImage::new(frame);
        let negatives = sampling::generate_negative(
            frame,
            &integral,
            &grid,
            &selection.bad,
            variance_floor,
            &*classifier,
            config.negative_patches,
            config.patch_size,
            rng,
        )?;

        let (train_features, held_out_features) = sampling::split_holdout(negatives.features);
        let (train_patterns, held_out_patterns) = sampling::split_holdout(negatives.patterns);
        let samples = sampling::ensemble_training_set(positives.features, train_features, rng);

        classifier.train_coarse(&samples, config.bootstrap_rounds);
        classifier.train_fine(&positives.pattern, &train_patterns);
        classifier.calibrate_thresholds(&held_out_features, &held_out_patterns);

        info!(
            variance_floor,
            samples = samples.len(),
            negative_patterns = train_patterns.len(),
            "tracker initialized"
        );

        self.session = Some(Session {
            grid,
            last_box: best_box,
            last_confidence: 1.0,
            last_validity: Validity::Confirmed,
            variance_floor,
            has_track: true,
        });
        Ok(())
    }

    /// Process the next frame of the stream.
    ///
    /// `prev` is the frame the current track refers to and `curr` the new
    /// one. Tracking and detection failures are reported in the result, not as
    /// errors.
    pub fn process_frame(&mut self, prev: &GrayImage, curr: &GrayImage) -> Result<FrameResult> {
        let session = self.session.as_ref().ok_or(Error::NotInitialized)?;
        let expected = session.grid.frame_size();
        for frame in [prev, curr] {
            if frame.dimensions() != expected {
                warn!(?expected, got = ?frame.dimensions(), "dropping frame of unexpected size");
                return Err(Error::FrameSizeMismatch {
                    expected,
                    got: frame.dimensions(),
                });
            }
        }

        let (points, track) = if session.has_track {
            self.track(prev, curr)
        } else {
            (Vec::new(), None)
        };

        let Self {
            config,
            classifier,
            scratch,
            session,
            ..
        } = self;
        let session = session.as_mut().ok_or(Error::NotInitialized)?;

        let detections = detector::detect(
            curr,
            &session.grid,
            session.variance_floor,
            &*classifier,
            &config.detector,
            config.patch_size,
        )?;
        let clusters = if detections.detected() {
            config.clustering.cluster(&detections.detections, scratch)
        } else {
            Vec::new()
        };

        let (estimate, decision) = fuse(track.as_ref(), &clusters);
        match estimate {
            Some(estimate) => {
                session.last_box = estimate.bbox;
                session.last_confidence = estimate.confidence;
                session.last_validity = estimate.validity;
                session.has_track = true;
            }
            None => session.has_track = false,
        }

        debug!(
            tracked = track.is_some(),
            detections = detections.len(),
            clusters = clusters.len(),
            ?decision,
            last_box = ?session.last_box,
            "fused frame"
        );

        let should_learn =
            config.learning && session.has_track && session.last_validity.is_confirmed();
        let learning = if should_learn {
            self.learn(curr)?
        } else {
            LearnOutcome::Skipped
        };

        let session = self.session.as_ref().ok_or(Error::NotInitialized)?;
        Ok(FrameResult {
            points,
            bbox: estimate.map(|e| e.bbox),
            has_track: session.has_track,
            confidence: session.last_confidence,
            validity: session.last_validity,
            detected: detections.detected(),
            decision,
            learning,
        })
    }

    /// Short-term tracking step from the last box.
    fn track(&mut self, prev: &GrayImage, curr: &GrayImage) -> (Vec<Point2<f32>>, Option<TrackEstimate>) {
        let Some(session) = self.session.as_ref() else {
            return (Vec::new(), None);
        };
        let tracking = &self.config.tracking;

        let seeds = seed_points(&session.last_box, tracking.seed_grid, tracking.seed_margin);
        if seeds.is_empty() {
            debug!(last_box = ?session.last_box, "box too small to seed points");
            return (Vec::new(), None);
        }

        let Some(flow) = self.point_tracker.propagate(prev, curr, &seeds) else {
            debug!("point tracker failed");
            return (Vec::new(), None);
        };
        if flow.is_empty() {
            return (Vec::new(), None);
        }

        let fb_error = self.point_tracker.forward_backward_error();
        if !(fb_error <= tracking.max_fb_error) {
            debug!(fb_error, "unstable point flow");
            return (flow.to, None);
        }

        let predicted = predict_box(&flow.from, &flow.to, &session.last_box)
            .filter(|b| !b.is_empty() && b.is_inside(curr.width(), curr.height()));
        let Some(bbox) = predicted else {
            debug!("predicted box left the frame");
            return (flow.to, None);
        };

        let Ok(pattern) = Pattern::extract(curr, &bbox, self.config.patch_size) else {
            return (flow.to, None);
        };
        let answer = self.classifier.fine_query(&pattern);
        let validity = if answer.conservative_similarity > self.classifier.validity_threshold() {
            Validity::Confirmed
        } else {
            session.last_validity
        };

        (
            flow.to,
            Some(TrackEstimate {
                bbox,
                confidence: answer.conservative_similarity,
                validity,
            }),
        )
    }

    /// Update the classifier from the current box in `frame`.
    ///
    /// Learning is skipped for patches that look like an abrupt appearance
    /// change, are flatter than the variance floor, or match a negative.
    pub fn learn(&mut self, frame: &GrayImage) -> Result<LearnOutcome> {
        let Self {
            config,
            classifier,
            rng,
            session,
            ..
        } = self;
        let session = session.as_mut().ok_or(Error::NotInitialized)?;

        let pattern = match Pattern::extract(frame, &session.last_box, config.patch_size) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(error = %e, "cannot learn from current box");
                return Ok(LearnOutcome::Skipped);
            }
        };

        let answer = classifier.fine_query(&pattern);
        if answer.relative_similarity < MIN_LEARNING_SIMILARITY {
            debug!(similarity = answer.relative_similarity, "fast appearance change, not training");
            return Ok(LearnOutcome::AppearanceChange);
        }
        if pattern.variance < session.variance_floor {
            debug!(variance = pattern.variance, "low variance, not training");
            return Ok(LearnOutcome::LowVariance);
        }
        if answer.is_negative {
            debug!("patch is in negative data, not training");
            return Ok(LearnOutcome::KnownNegative);
        }

        session.grid.update_overlaps(&session.last_box);
        let selection = session.grid.select(config.update.closest, config.bad_overlap);
        if selection.good.is_empty() {
            session.last_validity = Validity::Unconfirmed;
            debug!("no grid window overlaps the box, not training");
            return Ok(LearnOutcome::NoGoodWindows);
        }

        let positives = sampling::generate_positive(
            frame,
            &session.grid,
            &selection,
            &*classifier,
            &config.update,
            config.patch_size,
            rng,
        )?;
        let integral = IntegralImage::new(frame);
        let negatives = sampling::generate_negative(
            frame,
            &integral,
            &session.grid,
            &selection.bad,
            session.variance_floor,
            &*classifier,
            config.negative_patches,
            config.patch_size,
            rng,
        )?;

        let outcome = LearnOutcome::Trained {
            positives: positives.features.len(),
            negatives: negatives.features.len(),
        };
        let samples = sampling::ensemble_training_set(positives.features, negatives.features, rng);
        classifier.train_coarse(&samples, config.bootstrap_rounds);
        classifier.train_fine(&positives.pattern, &negatives.patterns);

        debug!(?outcome, "classifier updated");
        Ok(outcome)
    }

    pub fn config(&self) -> &TldConfig {
        &self.config
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    pub fn point_tracker(&self) -> &T {
        &self.point_tracker
    }

    pub fn point_tracker_mut(&mut self) -> &mut T {
        &mut self.point_tracker
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Scanning grid, once initialized.
    pub fn grid(&self) -> Option<&Grid> {
        self.session.as_ref().map(|s| &s.grid)
    }

    /// Box carried into the next frame.
    pub fn last_box(&self) -> Option<BoundingBox> {
        self.session.as_ref().map(|s| s.last_box)
    }

    pub fn last_confidence(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.last_confidence)
    }

    pub fn last_validity(&self) -> Option<Validity> {
        self.session.as_ref().map(|s| s.last_validity)
    }

    /// Variance floor fixed at initialization.
    pub fn variance_floor(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.variance_floor)
    }

    pub fn has_track(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.has_track)
    }
}
