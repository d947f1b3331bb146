//! Feed-forward compressor
//!
//! The dynamics primitive reused by every per-stem and per-bus stage and by
//! the final-mastering limiter. Policy-free: threshold, ratio and timing are
//! caller-supplied; the envelope state lives only inside a single call.

use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::error::{DspError, DspResult};
use crate::{db_to_linear, linear_to_db};

/// Parameters for one compressor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Level above which gain reduction starts, in dBFS.
    pub threshold_db: f32,
    /// Compression ratio, >= 1.0 (1.0 = no compression).
    pub ratio: f32,
    /// Attack time constant in milliseconds, > 0.
    pub attack_ms: f32,
    /// Release time constant in milliseconds, > 0.
    pub release_ms: f32,
    /// Static gain applied after reduction, in dB.
    pub makeup_gain_db: f32,
}

impl CompressorParams {
    /// Reject physically meaningless parameter combinations.
    pub fn validate(&self) -> DspResult<()> {
        if !self.threshold_db.is_finite() || !self.makeup_gain_db.is_finite() {
            return Err(DspError::InvalidParameter(
                "threshold and makeup gain must be finite".into(),
            ));
        }
        if !(self.ratio >= 1.0) {
            return Err(DspError::InvalidParameter(format!(
                "ratio must be >= 1.0, got {}",
                self.ratio
            )));
        }
        if !(self.attack_ms > 0.0) {
            return Err(DspError::InvalidParameter(format!(
                "attack must be positive, got {} ms",
                self.attack_ms
            )));
        }
        if !(self.release_ms > 0.0) {
            return Err(DspError::InvalidParameter(format!(
                "release must be positive, got {} ms",
                self.release_ms
            )));
        }
        Ok(())
    }
}

/// Gain-reduction statistics for one compressor pass, in dB (>= 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Time-averaged gain reduction over the whole buffer.
    pub avg_gain_reduction_db: f32,
    /// Peak gain reduction reached anywhere in the buffer.
    pub max_gain_reduction_db: f32,
}

fn envelope_coefficient(time_ms: f32, sample_rate: u32) -> f64 {
    (-1.0 / (time_ms as f64 / 1000.0 * sample_rate as f64)).exp()
}

/// Compress a buffer with a linked-stereo feed-forward detector.
///
/// Per sample: the instantaneous level is the peak absolute value across all
/// channels (linked detection, so the stereo image cannot shift). Level above
/// threshold produces a target reduction of `(level - threshold) * (1 - 1/ratio)`
/// dB, smoothed by a one-pole envelope with separate attack and release
/// coefficients, then applied (with makeup gain) as linear gain to every
/// channel.
pub fn compress(
    mut buffer: AudioBuffer,
    params: &CompressorParams,
) -> DspResult<(AudioBuffer, CompressionStats)> {
    buffer.ensure_valid()?;
    params.validate()?;

    let attack_coeff = envelope_coefficient(params.attack_ms, buffer.sample_rate());
    let release_coeff = envelope_coefficient(params.release_ms, buffer.sample_rate());
    let slope = 1.0 - 1.0 / params.ratio;
    let makeup = db_to_linear(params.makeup_gain_db);

    let frames = buffer.len();
    let channels = buffer.channels_mut();

    // Smoothed reduction in dB, shared across channels.
    let mut envelope_db = 0.0f64;
    let mut sum_reduction = 0.0f64;
    let mut max_reduction = 0.0f64;

    for n in 0..frames {
        let mut peak = 0.0f32;
        for channel in channels.iter() {
            let a = channel[n].abs();
            if a > peak {
                peak = a;
            }
        }

        let level_db = linear_to_db(peak);
        let over = level_db - params.threshold_db;
        let target_db = if over > 0.0 { (over * slope) as f64 } else { 0.0 };

        let coeff = if target_db > envelope_db {
            attack_coeff
        } else {
            release_coeff
        };
        envelope_db = coeff * envelope_db + (1.0 - coeff) * target_db;

        sum_reduction += envelope_db;
        if envelope_db > max_reduction {
            max_reduction = envelope_db;
        }

        let gain = db_to_linear(-envelope_db as f32) * makeup;
        for channel in channels.iter_mut() {
            channel[n] *= gain;
        }
    }

    let stats = CompressionStats {
        avg_gain_reduction_db: (sum_reduction / frames as f64) as f32,
        max_gain_reduction_db: max_reduction as f32,
    };

    Ok((buffer, stats))
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

    fn default_params() -> CompressorParams {
        CompressorParams {
            threshold_db: -18.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_gain_db: 0.0,
        }
    }

    #[test]
    fn test_rejects_bad_params() {
        let buf = AudioBuffer::mono(vec![0.1; 100], 48000).unwrap();

        let mut p = default_params();
        p.ratio = 0.5;
        assert!(compress(buf.clone(), &p).is_err());

        let mut p = default_params();
        p.attack_ms = 0.0;
        assert!(compress(buf.clone(), &p).is_err());

        let mut p = default_params();
        p.release_ms = -1.0;
        assert!(compress(buf, &p).is_err());
    }

    #[test]
    fn test_rejects_invalid_buffer() {
        let p = default_params();
        let empty = AudioBuffer::silent(2, 0, 48000);
        assert!(compress(empty, &p).is_err());

        let nan = AudioBuffer::mono(vec![0.0, f32::NAN], 48000).unwrap();
        assert!(compress(nan, &p).is_err());
    }

    #[test]
    fn test_no_op_below_threshold() {
        // -20 dBFS peak signal, -6 dB threshold: never crosses
        let s = sine(1000.0, 48000, 1.0, 0.1);
        let buf = AudioBuffer::stereo(s.clone(), s.clone(), 48000).unwrap();

        let mut p = default_params();
        p.threshold_db = -6.0;
        let (out, stats) = compress(buf, &p).unwrap();

        assert_eq!(stats.avg_gain_reduction_db, 0.0);
        assert_eq!(stats.max_gain_reduction_db, 0.0);
        for (a, b) in out.channel(0).unwrap().iter().zip(s.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_makeup_gain_only_below_threshold() {
        let s = sine(1000.0, 48000, 0.5, 0.1);
        let buf = AudioBuffer::mono(s.clone(), 48000).unwrap();

        let mut p = default_params();
        p.threshold_db = -6.0;
        p.makeup_gain_db = 6.0;
        let (out, stats) = compress(buf, &p).unwrap();

        assert_eq!(stats.avg_gain_reduction_db, 0.0);
        let gain = 10.0f32.powf(6.0 / 20.0);
        for (a, b) in out.channel(0).unwrap().iter().zip(s.iter()) {
            assert!((a - b * gain).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reduces_loud_signal() {
        let s = sine(1000.0, 48000, 1.0, 0.8); // about -1.9 dBFS
        let buf = AudioBuffer::stereo(s.clone(), s, 48000).unwrap();

        let p = default_params(); // threshold -18, ratio 4
        let (out, stats) = compress(buf, &p).unwrap();

        assert!(stats.max_gain_reduction_db > 6.0, "{:?}", stats);
        assert!(stats.avg_gain_reduction_db > 0.0);
        assert!(stats.avg_gain_reduction_db <= stats.max_gain_reduction_db);

        let out_peak: f32 = out
            .channel(0)
            .unwrap()
            .iter()
            .fold(0.0, |m, s| m.max(s.abs()));
        assert!(out_peak < 0.8);
    }

    #[test]
    fn test_linked_detection_preserves_balance() {
        // Hot left channel, quiet right: both must receive the same gain
        let left = sine(1000.0, 48000, 0.5, 0.9);
        let right = sine(1000.0, 48000, 0.5, 0.09);
        let buf = AudioBuffer::stereo(left.clone(), right.clone(), 48000).unwrap();

        let p = default_params();
        let (out, _) = compress(buf, &p).unwrap();

        // The L/R ratio must be preserved sample-for-sample
        let out_l = out.channel(0).unwrap();
        let out_r = out.channel(1).unwrap();
        for i in 1000..1100 {
            if left[i].abs() > 1e-3 {
                let expected = right[i] / left[i];
                let got = out_r[i] / out_l[i];
                assert!((expected - got).abs() < 1e-3);
            }
        }
    }
}
