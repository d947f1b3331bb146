//! Mid/side width processing
//!
//! Stereo decomposition (`mid = 0.5*(L+R)`, `side = 0.5*(L-R)`), side-channel
//! scaling and reconstruction. A pure linear combination that never clips by
//! itself; peak control is the ceiling enforcer's job.

use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::error::{DspError, DspResult};

/// Result of one width adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WidthOutcome {
    /// Side/mid RMS energy ratio before scaling (0 for mono input).
    pub side_to_mid_ratio_pre: f32,
    /// Side/mid RMS energy ratio after scaling (0 for mono input).
    pub side_to_mid_ratio_post: f32,
    /// Factor actually applied to the side channel.
    pub width_factor: f32,
}

/// Scale the stereo width by `width_factor` (1.0 = unchanged, 0.0 = mono).
///
/// Non-stereo buffers pass through untouched with both ratios reported as 0.
/// Clamping the factor to a safe band is the caller's policy; this primitive
/// applies whatever it is given (but rejects negative or non-finite values).
pub fn apply_width(
    mut buffer: AudioBuffer,
    width_factor: f32,
) -> DspResult<(AudioBuffer, WidthOutcome)> {
    buffer.ensure_valid()?;
    if !width_factor.is_finite() || width_factor < 0.0 {
        return Err(DspError::InvalidParameter(format!(
            "width factor must be finite and non-negative, got {width_factor}"
        )));
    }

    if buffer.num_channels() != 2 {
        return Ok((
            buffer,
            WidthOutcome {
                side_to_mid_ratio_pre: 0.0,
                side_to_mid_ratio_post: 0.0,
                width_factor,
            },
        ));
    }

    let frames = buffer.len();
    let mut mid_energy = 0.0f64;
    let mut side_energy = 0.0f64;

    {
        let channels = buffer.channels_mut();
        let (left_chs, right_chs) = channels.split_at_mut(1);
        let left = &mut left_chs[0];
        let right = &mut right_chs[0];

        for n in 0..frames {
            let mid = 0.5 * (left[n] + right[n]);
            let side = 0.5 * (left[n] - right[n]);

            mid_energy += (mid as f64) * (mid as f64);
            side_energy += (side as f64) * (side as f64);

            let side = side * width_factor;
            left[n] = mid + side;
            right[n] = mid - side;
        }
    }

    let ratio_pre = if mid_energy > 1e-12 {
        (side_energy / mid_energy).sqrt() as f32
    } else {
        0.0
    };

    Ok((
        buffer,
        WidthOutcome {
            side_to_mid_ratio_pre: ratio_pre,
            // side energy scales by factor^2, so the ratio scales linearly
            side_to_mid_ratio_post: ratio_pre * width_factor,
            width_factor,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stereo_fixture() -> AudioBuffer {
        let left: Vec<f32> = (0..4800)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin())
            .collect();
        let right: Vec<f32> = (0..4800)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 330.0 * i as f32 / 48000.0).sin())
            .collect();
        AudioBuffer::stereo(left, right, 48000).unwrap()
    }

    #[test]
    fn test_unity_width_is_identity() {
        let buf = stereo_fixture();
        let original = buf.clone();
        let (out, outcome) = apply_width(buf, 1.0).unwrap();

        for ch in 0..2 {
            for (a, b) in out
                .channel(ch)
                .unwrap()
                .iter()
                .zip(original.channel(ch).unwrap())
            {
                assert!((a - b).abs() < 1e-6);
            }
        }
        assert_relative_eq!(
            outcome.side_to_mid_ratio_pre,
            outcome.side_to_mid_ratio_post,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_zero_width_collapses_to_mono() {
        let (out, outcome) = apply_width(stereo_fixture(), 0.0).unwrap();
        let left = out.channel(0).unwrap();
        let right = out.channel(1).unwrap();
        for i in 0..left.len() {
            assert!((left[i] - right[i]).abs() < 1e-6);
        }
        assert_eq!(outcome.side_to_mid_ratio_post, 0.0);
    }

    #[test]
    fn test_wider_raises_side_ratio() {
        let (_, outcome) = apply_width(stereo_fixture(), 1.1).unwrap();
        assert!(outcome.side_to_mid_ratio_post > outcome.side_to_mid_ratio_pre);
        assert_relative_eq!(
            outcome.side_to_mid_ratio_post,
            outcome.side_to_mid_ratio_pre * 1.1,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_mono_passes_through() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin() * 0.4).collect();
        let buf = AudioBuffer::mono(samples.clone(), 48000).unwrap();
        let (out, outcome) = apply_width(buf, 1.5).unwrap();

        assert_eq!(out.channel(0).unwrap(), samples.as_slice());
        assert_eq!(outcome.side_to_mid_ratio_pre, 0.0);
        assert_eq!(outcome.side_to_mid_ratio_post, 0.0);
    }

    #[test]
    fn test_rejects_negative_factor() {
        assert!(apply_width(stereo_fixture(), -0.5).is_err());
    }
}
