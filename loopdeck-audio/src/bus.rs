//! Mix-bus math: gain, pan law, and the master soft clipper

use crate::track::{VOLUME_MAX_DB, VOLUME_MIN_DB};

/// Convert decibels to linear gain.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Constant-power pan law. -1.0 is hard left, 1.0 hard right.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Combined per-track stage: linear gain for volume and per-channel pan
/// gains, computed once per block.
#[inline]
pub fn track_stage(volume_db: f32, pan: f32) -> (f32, f32) {
    let gain = db_to_gain(volume_db.clamp(VOLUME_MIN_DB, VOLUME_MAX_DB));
    let (l, r) = pan_gains(pan);
    (gain * l, gain * r)
}

/// Soft clip threshold - lower value keeps the knee transparent
const SOFT_CLIP_THRESHOLD: f32 = 0.75;
/// Soft clip ceiling
const SOFT_CLIP_CEILING: f32 = 0.89;

/// Gentle soft clipper for the live master bus.
///
/// Pass-through below the threshold; above it an exponential knee
/// approaches the ceiling asymptotically.
#[inline(always)]
pub fn soft_clip(x: f32) -> f32 {
    let abs_x = x.abs();

    if abs_x <= SOFT_CLIP_THRESHOLD {
        return x;
    }

    let sign = x.signum();
    let knee_width = SOFT_CLIP_CEILING - SOFT_CLIP_THRESHOLD;
    let over = abs_x - SOFT_CLIP_THRESHOLD;
    let ratio = over / knee_width;

    let compressed = SOFT_CLIP_THRESHOLD + knee_width * (1.0 - (-ratio * 3.0).exp());
    sign * compressed.min(SOFT_CLIP_CEILING)
}
