//! Training-sample synthesis (P-N mining).
//!
//! Positive samples come from grid windows that overlap the current box
//! strongly, optionally under random affine warps of their hull. Negative
//! samples come from windows far from the box. All randomness is drawn from a
//! caller-supplied generator so that a fixed seed reproduces the same buffers.

use image::imageops;
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::noise::gaussian_noise;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{Classifier, LabeledFeatures};
use crate::geometry::{hull, BoundingBox};
use crate::grid::{Grid, OverlapSelection};
use crate::patch::{IntegralImage, Pattern};
use crate::{Error, Result};

/// Negative windows scanned per requested negative pattern.
pub const NEGATIVE_SCAN_FACTOR: usize = 100;

/// Positive-sample generation parameters for one learning phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Maximum number of positive windows (closest to the box).
    pub closest: usize,
    /// Warp rounds; round 0 uses the unwarped frame.
    pub warps: usize,
    /// Standard deviation of additive pixel noise.
    pub noise: f64,
    /// Maximum rotation in degrees.
    pub angle: f64,
    /// Maximum shift as a fraction of the hull size.
    pub shift: f64,
    /// Maximum relative scale change.
    pub scale: f64,
}

impl SamplingParams {
    /// Parameters used when bootstrapping from the first frame.
    pub fn init() -> Self {
        Self {
            closest: 10,
            warps: 20,
            noise: 5.0,
            angle: 20.0,
            shift: 0.02,
            scale: 0.02,
        }
    }

    /// Parameters used by online updates.
    pub fn update() -> Self {
        Self {
            closest: 10,
            warps: 10,
            noise: 5.0,
            angle: 10.0,
            shift: 0.02,
            scale: 0.02,
        }
    }

    pub fn validate(&self, phase: &str) -> Result<()> {
        if self.closest == 0 || self.warps == 0 {
            return Err(Error::InvalidConfig(format!(
                "{} sampling needs positive closest and warps",
                phase
            )));
        }
        for (name, value) in [
            ("noise", self.noise),
            ("angle", self.angle),
            ("shift", self.shift),
            ("scale", self.scale),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} sampling {} must be finite and non-negative, got {}",
                    phase, name, value
                )));
            }
        }
        if self.scale >= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "{} sampling scale must be below 1, got {}",
                phase, self.scale
            )));
        }
        Ok(())
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::init()
    }
}

/// Positive training data for one learning cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct PositiveSamples {
    /// Canonical positive template (pattern of the best window).
    pub pattern: Pattern,
    /// Ensemble features of every good window over every warp round.
    pub features: Vec<Vec<u32>>,
}

/// Negative training data for one learning cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NegativeSamples {
    pub features: Vec<Vec<u32>>,
    pub patterns: Vec<Pattern>,
}

/// Copy of `frame` whose `region` is replaced by a randomly warped version.
///
/// The warp is an affine map about the region centre: rotation, anisotropic
/// scaling along a random axis and a small shift, followed by Gaussian noise
/// and an occasional light blur. Pixels outside `region` are untouched.
pub fn warp_region<R: Rng + ?Sized>(
    frame: &GrayImage,
    region: &BoundingBox,
    params: &SamplingParams,
    rng: &mut R,
) -> GrayImage {
    let mut out = frame.clone();
    if region.is_empty() || !region.is_inside(frame.width(), frame.height()) {
        return out;
    }

    let max_angle = params.angle.to_radians() as f32;
    let theta = rng.gen_range(-max_angle..=max_angle);
    let phi = rng.gen_range(-max_angle..=max_angle);
    let s = params.scale as f32;
    let lambda1 = rng.gen_range((1.0 - s)..=(1.0 + s));
    let lambda2 = rng.gen_range((1.0 - s)..=(1.0 + s));
    let max_tx = params.shift as f32 * region.width as f32;
    let max_ty = params.shift as f32 * region.height as f32;
    let tx = rng.gen_range(-max_tx..=max_tx);
    let ty = rng.gen_range(-max_ty..=max_ty);

    let c = region.center();
    let projection = Projection::translate(c.x + tx, c.y + ty)
        * Projection::rotate(theta)
        * Projection::rotate(-phi)
        * Projection::scale(lambda1, lambda2)
        * Projection::rotate(phi)
        * Projection::translate(-c.x, -c.y);
    let warped = warp(frame, &projection, Interpolation::Bilinear, Luma([0u8]));

    let mut patch = imageops::crop_imm(
        &warped,
        region.x as u32,
        region.y as u32,
        region.width as u32,
        region.height as u32,
    )
    .to_image();
    if params.noise > 0.0 {
        patch = gaussian_noise(&patch, 0.0, params.noise, rng.gen());
    }
    if rng.gen_bool(0.5) {
        patch = imageops::blur(&patch, 0.8);
    }

    imageops::replace(&mut out, &patch, region.x as i64, region.y as i64);
    out
}

/// Build positive samples around `selection.best`.
///
/// The canonical pattern comes from the best window of the unwarped frame.
/// Features are extracted from every good window on the unwarped frame
/// (round 0) and on `params.warps - 1` warped copies.
pub fn generate_positive<C, R>(
    frame: &GrayImage,
    grid: &Grid,
    selection: &OverlapSelection,
    classifier: &C,
    params: &SamplingParams,
    patch_size: u32,
    rng: &mut R,
) -> Result<PositiveSamples>
where
    C: Classifier + ?Sized,
    R: Rng + ?Sized,
{
    let windows = grid.windows();
    let best = windows
        .get(selection.best)
        .ok_or_else(|| Error::InvalidBox(format!("best window {} outside grid", selection.best)))?;
    let pattern = Pattern::extract(frame, &best.bbox, patch_size)?;

    let mut features = Vec::with_capacity(params.warps * selection.good.len());
    if let Some(region) = hull(grid.boxes(&selection.good)) {
        for round in 0..params.warps {
            let warped;
            let image = if round == 0 {
                frame
            } else {
                warped = warp_region(frame, &region, params, rng);
                &warped
            };
            for &i in &selection.good {
                let window = &windows[i];
                features.push(classifier.extract_features(image, &window.bbox, window.scale_index));
            }
        }
    }

    debug!(
        positives = features.len(),
        variance = pattern.variance,
        "generated positive samples"
    );

    Ok(PositiveSamples { pattern, features })
}

/// Build negative samples from the windows listed in `bad`.
///
/// The bad windows are shuffled once. Up to `max_patterns * 100` of them are
/// scanned for ensemble features, skipping those whose variance is below
/// `variance_floor`. The first `max_patterns` shuffled windows, regardless of
/// variance, become negative patterns.
#[allow(clippy::too_many_arguments)]
pub fn generate_negative<C, R>(
    frame: &GrayImage,
    integral: &IntegralImage,
    grid: &Grid,
    bad: &[usize],
    variance_floor: f64,
    classifier: &C,
    max_patterns: usize,
    patch_size: u32,
    rng: &mut R,
) -> Result<NegativeSamples>
where
    C: Classifier + ?Sized,
    R: Rng + ?Sized,
{
    let windows = grid.windows();
    let mut order = bad.to_vec();
    order.shuffle(rng);

    let budget = order.len().min(max_patterns.saturating_mul(NEGATIVE_SCAN_FACTOR));
    let mut features = Vec::new();
    for &i in &order[..budget] {
        let window = &windows[i];
        if variance_floor > 0.0 && integral.variance(&window.bbox) < variance_floor {
            continue;
        }
        features.push(classifier.extract_features(frame, &window.bbox, window.scale_index));
    }

    let patterns = order
        .iter()
        .take(max_patterns)
        .map(|&i| Pattern::extract(frame, &windows[i].bbox, patch_size))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        negatives = features.len(),
        patterns = patterns.len(),
        scanned = budget,
        "generated negative samples"
    );

    Ok(NegativeSamples { features, patterns })
}

/// Split a buffer into a training half and a held-out half.
///
/// The training half gets `len / 2` elements; the held-out half the rest.
pub fn split_holdout<T>(mut items: Vec<T>) -> (Vec<T>, Vec<T>) {
    let held_out = items.split_off(items.len() / 2);
    (items, held_out)
}

/// Label positive and negative feature vectors and shuffle them together.
pub fn ensemble_training_set<R: Rng + ?Sized>(
    positives: Vec<Vec<u32>>,
    negatives: Vec<Vec<u32>>,
    rng: &mut R,
) -> Vec<LabeledFeatures> {
    let mut samples: Vec<LabeledFeatures> = positives
        .into_iter()
        .map(LabeledFeatures::positive)
        .chain(negatives.into_iter().map(LabeledFeatures::negative))
        .collect();
    samples.shuffle(rng);
    samples
}
