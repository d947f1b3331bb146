//! Adaptive clipper with target-shave search
//!
//! Symmetric soft/hard sample clipper whose threshold is found by bisection
//! so that the resulting sample-peak drop lands on a requested target. Used
//! ahead of the limiter to convert surplus transient peaks into headroom
//! without spending limiter gain reduction on them.

use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::error::{DspError, DspResult};
use crate::metering::sample_peak_db;
use crate::{DB_FLOOR, db_to_linear};

/// Clipping transfer curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    /// `y = T * tanh(x / T)`, a rounded knee with no hard cutoff.
    Soft,
    /// Per-sample clamp to `+/-T`.
    Hard,
}

/// Record of one clipper invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipperOutcome {
    /// Sample peak before clipping, dBFS.
    pub peak_pre_dbfs: f32,
    /// Sample peak after clipping, dBFS.
    pub peak_post_dbfs: f32,
    /// Final clip threshold, dBFS.
    pub threshold_dbfs_used: f32,
    /// Requested peak reduction, dB.
    pub target_shave_db: f32,
    /// Achieved peak reduction, dB.
    pub actual_shave_db: f32,
    /// Approximate share of samples driven into the clip region, percent.
    /// Computed from the input samples above the final linear threshold, so
    /// it is an estimate for soft mode (which has no hard cutoff).
    pub clipped_sample_percent: f32,
}

impl ClipperOutcome {
    fn no_op(peak_pre_dbfs: f32, target_shave_db: f32) -> Self {
        Self {
            peak_pre_dbfs,
            peak_post_dbfs: peak_pre_dbfs,
            threshold_dbfs_used: peak_pre_dbfs,
            target_shave_db,
            actual_shave_db: 0.0,
            clipped_sample_percent: 0.0,
        }
    }
}

/// Maximum bisection iterations for the threshold search.
pub const MAX_ITERATIONS: usize = 6;

/// Convergence tolerance on the achieved shave, in dB.
pub const TOLERANCE_DB: f32 = 0.15;

/// Targets at or below this are treated as "no clipping requested".
pub const MIN_SHAVE_DB: f32 = 0.05;

/// Bisection search interval below the input peak, in dB.
const SEARCH_RANGE_DB: f32 = 12.0;

fn clip_sample(x: f32, threshold_linear: f32, mode: ClipMode) -> f32 {
    match mode {
        ClipMode::Hard => x.clamp(-threshold_linear, threshold_linear),
        ClipMode::Soft => threshold_linear * (x / threshold_linear).tanh(),
    }
}

/// Peak that would result from clipping at `threshold_db`, without touching
/// the buffer.
fn clipped_peak_db(buffer: &AudioBuffer, threshold_db: f32, mode: ClipMode) -> f32 {
    let t = db_to_linear(threshold_db);
    let mut peak = 0.0f32;
    for channel in buffer.channels() {
        for &s in channel {
            let a = clip_sample(s, t, mode).abs();
            if a > peak {
                peak = a;
            }
        }
    }
    crate::linear_to_db(peak)
}

fn apply_clip(buffer: &mut AudioBuffer, threshold_db: f32, mode: ClipMode) {
    let t = db_to_linear(threshold_db);
    for channel in buffer.channels_mut() {
        for s in channel.iter_mut() {
            *s = clip_sample(*s, t, mode);
        }
    }
}

fn fraction_above(buffer: &AudioBuffer, threshold_linear: f32) -> f32 {
    let total: usize = buffer.channels().iter().map(|c| c.len()).sum();
    if total == 0 {
        return 0.0;
    }
    let above: usize = buffer
        .channels()
        .iter()
        .map(|c| c.iter().filter(|s| s.abs() > threshold_linear).count())
        .sum();
    100.0 * above as f32 / total as f32
}

/// Clip the buffer so its sample peak drops by about `target_shave_db`.
///
/// Bisection over the clip threshold in `[peak_pre - 12 dB, peak_pre]`,
/// re-measuring the resulting peak each trial, until the achieved shave is
/// within [`TOLERANCE_DB`] of the target or [`MAX_ITERATIONS`] is reached
/// (best-effort: the closest trial wins). Targets <= [`MIN_SHAVE_DB`] and
/// silent buffers pass through untouched.
///
/// The output sample peak never exceeds the input sample peak.
pub fn clip_to_target_shave(
    mut buffer: AudioBuffer,
    target_shave_db: f32,
    mode: ClipMode,
) -> DspResult<(AudioBuffer, ClipperOutcome)> {
    buffer.ensure_valid()?;
    if !target_shave_db.is_finite() || target_shave_db < 0.0 {
        return Err(DspError::InvalidParameter(format!(
            "target shave must be finite and non-negative, got {target_shave_db}"
        )));
    }

    let peak_pre = sample_peak_db(&buffer);
    if target_shave_db <= MIN_SHAVE_DB || peak_pre <= DB_FLOOR {
        return Ok((buffer, ClipperOutcome::no_op(peak_pre, target_shave_db)));
    }

    let mut lo = peak_pre - SEARCH_RANGE_DB;
    let mut hi = peak_pre;
    let mut best_threshold = hi;
    let mut best_error = f32::INFINITY;

    for iteration in 0..MAX_ITERATIONS {
        let threshold = 0.5 * (lo + hi);
        let peak_post = clipped_peak_db(&buffer, threshold, mode);
        let shave = peak_pre - peak_post;
        let error = (shave - target_shave_db).abs();

        log::debug!(
            "clipper iter {iteration}: threshold {threshold:.2} dBFS, shave {shave:.2} dB (target {target_shave_db:.2})"
        );

        if error < best_error {
            best_error = error;
            best_threshold = threshold;
        }
        if error <= TOLERANCE_DB {
            break;
        }
        if shave > target_shave_db {
            // clipping too deep, raise the threshold
            lo = threshold;
        } else {
            hi = threshold;
        }
    }

    let clipped_percent = fraction_above(&buffer, db_to_linear(best_threshold));
    apply_clip(&mut buffer, best_threshold, mode);
    let peak_post = sample_peak_db(&buffer);

    let outcome = ClipperOutcome {
        peak_pre_dbfs: peak_pre,
        peak_post_dbfs: peak_post,
        threshold_dbfs_used: best_threshold,
        target_shave_db,
        actual_shave_db: peak_pre - peak_post,
        clipped_sample_percent: clipped_percent,
    };

    Ok((buffer, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_tiny_target_is_no_op() {
        let s = sine(1000.0, 48000, 0.5, 0.5);
        let buf = AudioBuffer::mono(s.clone(), 48000).unwrap();
        let (out, outcome) = clip_to_target_shave(buf, 0.03, ClipMode::Hard).unwrap();

        assert_eq!(outcome.actual_shave_db, 0.0);
        assert_eq!(outcome.clipped_sample_percent, 0.0);
        assert_eq!(out.channel(0).unwrap(), s.as_slice());
    }

    #[test]
    fn test_silent_buffer_is_no_op() {
        let buf = AudioBuffer::silent(2, 4800, 48000);
        let (_, outcome) = clip_to_target_shave(buf, 2.0, ClipMode::Soft).unwrap();
        assert_eq!(outcome.actual_shave_db, 0.0);
    }

    #[test]
    fn test_rejects_negative_target() {
        let buf = AudioBuffer::mono(vec![0.5; 100], 48000).unwrap();
        assert!(clip_to_target_shave(buf, -1.0, ClipMode::Hard).is_err());
    }

    #[test]
    fn test_hard_clip_hits_target_within_tolerance() {
        let s = sine(1000.0, 48000, 1.0, 0.8);
        let buf = AudioBuffer::stereo(s.clone(), s, 48000).unwrap();
        let (_, outcome) = clip_to_target_shave(buf, 2.0, ClipMode::Hard).unwrap();

        assert!(
            (outcome.actual_shave_db - 2.0).abs() <= TOLERANCE_DB + 0.05,
            "shave {} dB",
            outcome.actual_shave_db
        );
        assert!(outcome.clipped_sample_percent > 0.0);
        assert!(outcome.clipped_sample_percent < 100.0);
    }

    #[test]
    fn test_peak_never_increases() {
        for mode in [ClipMode::Soft, ClipMode::Hard] {
            for target in [0.5f32, 2.0, 6.0, 20.0] {
                let s = sine(440.0, 48000, 0.25, 0.9);
                let buf = AudioBuffer::mono(s, 48000).unwrap();
                let pre = sample_peak_db(&buf);
                let (out, outcome) = clip_to_target_shave(buf, target, mode).unwrap();
                let post = sample_peak_db(&out);
                assert!(post <= pre + 1e-4, "{mode:?} target {target}: {pre} -> {post}");
                assert!(outcome.actual_shave_db >= -1e-4);
            }
        }
    }

    #[test]
    fn test_transient_spike_shave() {
        // quiet bed with one full-scale spike
        let mut s = sine(1000.0, 48000, 1.0, 0.03);
        s[24000] = 1.0;
        let buf = AudioBuffer::mono(s, 48000).unwrap();
        let (_, outcome) = clip_to_target_shave(buf, 2.0, ClipMode::Hard).unwrap();

        assert!((outcome.actual_shave_db - 2.0).abs() <= TOLERANCE_DB);
        assert!(outcome.clipped_sample_percent > 0.0);
        assert!(outcome.clipped_sample_percent < 1.0);
    }

    #[test]
    fn test_soft_mode_reduces_peak_monotonically() {
        let s = sine(1000.0, 48000, 0.5, 0.9);
        let buf = AudioBuffer::mono(s, 48000).unwrap();
        let pre = sample_peak_db(&buf);
        let (out, outcome) = clip_to_target_shave(buf, 3.0, ClipMode::Soft).unwrap();
        assert!(sample_peak_db(&out) < pre);
        assert!(outcome.threshold_dbfs_used < pre);
    }
}
