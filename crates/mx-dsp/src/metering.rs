//! Level meters
//!
//! Sample peak, oversampled true peak (inter-sample aware), and gated
//! ITU-R BS.1770 / EBU R128 integrated loudness + loudness range over a
//! complete buffer. Every measurement is recomputed fresh from the buffer,
//! never incrementally updated, so repeated transforms cannot drift.

use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::error::{DspError, DspResult};
use crate::{DB_FLOOR, linear_to_db};

/// Default oversampling factor for true-peak detection.
pub const DEFAULT_OVERSAMPLE: usize = 4;

/// Absolute gate for block loudness, in LUFS.
const ABS_GATE_LUFS: f64 = -70.0;

/// Relative gate below the ungated mean for integrated loudness, in LU.
const REL_GATE_LU: f64 = 10.0;

/// Relative gate below the ungated mean for loudness range, in LU.
const LRA_REL_GATE_LU: f64 = 20.0;

/// BS.1770 loudness offset: loudness = -0.691 + 10*log10(power).
const LUFS_OFFSET: f64 = 0.691;

// Peak meters

fn sample_peak_linear(buffer: &AudioBuffer) -> f32 {
    let mut peak = 0.0f32;
    for channel in buffer.channels() {
        for &s in channel {
            let a = s.abs();
            if a > peak {
                peak = a;
            }
        }
    }
    peak
}

/// Maximum absolute sample value across all channels, in dBFS.
///
/// Returns [`DB_FLOOR`] for a silent or empty buffer; never fails.
pub fn sample_peak_db(buffer: &AudioBuffer) -> f32 {
    linear_to_db(sample_peak_linear(buffer))
}

/// Windowed-sinc interpolation filter, 16 taps per output phase.
fn interpolation_coeffs(factor: usize) -> Vec<f32> {
    let taps = 16 * factor;
    let mut coeffs = vec![0.0f32; taps];

    for i in 0..taps {
        let n = i as f32 - (taps as f32 - 1.0) / 2.0;
        let sinc = if n.abs() < 1e-3 {
            1.0
        } else {
            let x = std::f32::consts::PI * n / factor as f32;
            x.sin() / x
        };

        // Blackman window
        let window = 0.42
            - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (taps - 1) as f32).cos()
            + 0.08 * (4.0 * std::f32::consts::PI * i as f32 / (taps - 1) as f32).cos();

        // Each phase filter is the sinc sampled at unit spacing with a
        // fractional shift, so its passband gain is already unity.
        coeffs[i] = sinc * window;
    }

    coeffs
}

fn oversampled_peak(samples: &[f32], factor: usize, coeffs: &[f32]) -> f32 {
    let per_phase = coeffs.len() / factor;
    let mut peak = 0.0f32;

    for n in 0..samples.len() {
        for phase in 0..factor {
            let mut acc = 0.0f32;
            for i in 0..per_phase {
                if let Some(idx) = n.checked_sub(i) {
                    acc += samples[idx] * coeffs[i * factor + phase];
                }
            }
            let a = acc.abs();
            if a > peak {
                peak = a;
            }
        }
    }

    peak
}

/// True peak in dBTP via band-limited oversampling.
///
/// Each channel is upsampled by `oversample` with a windowed-sinc
/// interpolation filter and the peak of the oversampled signal is taken.
/// This catches inter-sample overshoot invisible to [`sample_peak_db`].
/// Empty channels fall back to the plain sample peak.
pub fn true_peak_db(buffer: &AudioBuffer, oversample: usize) -> DspResult<f32> {
    if oversample == 0 {
        return Err(DspError::InvalidParameter(
            "oversample factor must be positive".into(),
        ));
    }
    buffer.ensure_finite()?;

    let coeffs = interpolation_coeffs(oversample);
    let mut peak = sample_peak_linear(buffer);

    for channel in buffer.channels() {
        if channel.is_empty() {
            continue;
        }
        let os_peak = oversampled_peak(channel, oversample, &coeffs);
        if os_peak > peak {
            peak = os_peak;
        }
    }

    Ok(linear_to_db(peak))
}

// Gated loudness + loudness range

/// Biquad section state (transposed direct form II, f64 for headroom).
#[derive(Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// K-weighting pre-filter: high shelf (+4 dB) followed by ~38 Hz highpass.
///
/// Coefficients come from a bilinear transform of the ITU-R BS.1770 analog
/// prototype, so any sample rate measures correctly (the 48 kHz reference
/// coefficients in the spec are the same transform evaluated at 48 kHz).
struct KWeighting {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeighting {
    fn new(sample_rate: u32) -> Self {
        let fs = sample_rate as f64;

        // Stage 1: high shelf
        let shelf_fc = 1681.974450955533_f64;
        let shelf_q = 0.7071752369554196_f64;
        let shelf_gain_db = 3.999843853973347_f64;

        let a = 10.0_f64.powf(shelf_gain_db / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * shelf_fc / fs;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * shelf_q);

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        let shelf = Biquad::new(b0 / a0, b1 / a0, b2 / a0, a1 / a0, a2 / a0);

        // Stage 2: highpass
        let hp_fc = 38.13547087602444_f64;
        let hp_q = 0.5003270373238773_f64;

        let w0 = 2.0 * std::f64::consts::PI * hp_fc / fs;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * hp_q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        let highpass = Biquad::new(b0 / a0, b1 / a0, b2 / a0, a1 / a0, a2 / a0);

        Self { shelf, highpass }
    }

    fn process(&mut self, x: f64) -> f64 {
        self.highpass.process(self.shelf.process(x))
    }
}

fn power_to_lufs(power: f64) -> f64 {
    -LUFS_OFFSET + 10.0 * power.max(1e-15).log10()
}

fn lufs_to_power(lufs: f64) -> f64 {
    10.0_f64.powf((lufs + LUFS_OFFSET) / 10.0)
}

/// Which loudness algorithm produced a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoudnessMethod {
    /// Gated BS.1770 measurement (400 ms blocks, absolute + relative gate).
    Gated,
    /// Simplified RMS approximation used when the buffer is too short for
    /// gated blocks.
    /// Downstream QC should apply looser tolerances.
    RmsApproximation,
}

/// Integrated loudness and loudness range for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessMeasurement {
    /// Integrated loudness in LUFS.
    pub integrated_lufs: f32,
    /// Loudness range in LU.
    pub loudness_range_lu: f32,
    /// Algorithm used; callers must check this before trusting tolerances.
    pub method: LoudnessMethod,
}

/// Gated integrated loudness (LUFS) and loudness range (LU).
///
/// 400 ms blocks with 75% overlap, absolute gate at -70 LUFS, then a relative
/// gate 10 LU below the ungated mean. Loudness range is the 10th to 95th
/// percentile spread of gated short-term (3 s) loudness. Buffers shorter than
/// one gating block fall back to an RMS approximation, flagged in the result.
pub fn integrated_loudness_and_range(buffer: &AudioBuffer) -> DspResult<LoudnessMeasurement> {
    buffer.ensure_finite()?;

    let sample_rate = buffer.sample_rate() as usize;
    let frames = buffer.len();
    let block = sample_rate * 2 / 5; // 400 ms

    if frames < block {
        return Ok(rms_fallback(buffer));
    }

    // K-weight every channel once; per-frame power is the channel sum.
    let mut weighted_sq = vec![0.0f64; frames];
    for channel in buffer.channels() {
        let mut filter = KWeighting::new(buffer.sample_rate());
        for (i, &s) in channel.iter().enumerate() {
            let y = filter.process(s as f64);
            weighted_sq[i] += y * y;
        }
    }

    let mut prefix = vec![0.0f64; frames + 1];
    for i in 0..frames {
        prefix[i + 1] = prefix[i] + weighted_sq[i];
    }
    let window_power = |start: usize, len: usize| (prefix[start + len] - prefix[start]) / len as f64;

    // Momentary blocks, 75% overlap
    let hop = (block / 4).max(1);
    let mut block_powers = Vec::with_capacity(frames / hop + 1);
    let mut start = 0;
    while start + block <= frames {
        block_powers.push(window_power(start, block));
        start += hop;
    }

    let abs_gate = lufs_to_power(ABS_GATE_LUFS);
    let gated: Vec<f64> = block_powers
        .iter()
        .copied()
        .filter(|&p| p >= abs_gate)
        .collect();

    let integrated_lufs = if gated.is_empty() {
        DB_FLOOR as f64
    } else {
        let ungated_mean = gated.iter().sum::<f64>() / gated.len() as f64;
        let rel_gate = lufs_to_power(power_to_lufs(ungated_mean) - REL_GATE_LU);
        let kept: Vec<f64> = gated.iter().copied().filter(|&p| p >= rel_gate).collect();
        if kept.is_empty() {
            DB_FLOOR as f64
        } else {
            power_to_lufs(kept.iter().sum::<f64>() / kept.len() as f64)
        }
    };

    // Short-term (3 s) loudness for LRA
    let st_window = sample_rate * 3;
    let st_hop = sample_rate;
    let mut short_term = Vec::new();
    if frames >= st_window {
        let mut start = 0;
        while start + st_window <= frames {
            let power = window_power(start, st_window);
            if power >= abs_gate {
                short_term.push(power);
            }
            start += st_hop;
        }
    }

    Ok(LoudnessMeasurement {
        integrated_lufs: integrated_lufs as f32,
        loudness_range_lu: loudness_range(&short_term),
        method: LoudnessMethod::Gated,
    })
}

fn rms_fallback(buffer: &AudioBuffer) -> LoudnessMeasurement {
    log::warn!(
        "buffer too short for gated loudness ({} frames @ {} Hz), using RMS approximation",
        buffer.len(),
        buffer.sample_rate()
    );

    let frames = buffer.len();
    let mut power = 0.0f64;
    if frames > 0 {
        for channel in buffer.channels() {
            let sum_sq: f64 = channel.iter().map(|&s| (s as f64) * (s as f64)).sum();
            power += sum_sq / frames as f64;
        }
    }

    let integrated = if power > 0.0 {
        (10.0 * power.log10() - LUFS_OFFSET).max(DB_FLOOR as f64)
    } else {
        DB_FLOOR as f64
    };

    LoudnessMeasurement {
        integrated_lufs: integrated as f32,
        loudness_range_lu: 0.0,
        method: LoudnessMethod::RmsApproximation,
    }
}

/// Percentile spread of gated short-term block powers.
fn loudness_range(short_term_powers: &[f64]) -> f32 {
    if short_term_powers.len() < 2 {
        return 0.0;
    }

    let ungated_mean = short_term_powers.iter().sum::<f64>() / short_term_powers.len() as f64;
    let rel_gate = lufs_to_power(power_to_lufs(ungated_mean) - LRA_REL_GATE_LU);

    let mut kept: Vec<f64> = short_term_powers
        .iter()
        .copied()
        .filter(|&p| p >= rel_gate)
        .map(power_to_lufs)
        .collect();

    if kept.len() < 2 {
        return 0.0;
    }

    kept.sort_by(|a, b| a.total_cmp(b));

    let low_idx = kept.len() / 10;
    let high_idx = kept.len() * 95 / 100;
    if high_idx <= low_idx {
        return 0.0;
    }

    (kept[high_idx] - kept[low_idx]).max(0.0) as f32
}

// Snapshot

/// Complete level measurement of one buffer at one point in the chain.
///
/// Immutable once computed; the orchestrator takes a fresh snapshot after
/// every transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeteringSnapshot {
    /// Sample peak in dBFS.
    pub sample_peak_dbfs: f32,
    /// Oversampled true peak in dBTP.
    pub true_peak_dbtp: f32,
    /// Integrated loudness in LUFS.
    pub integrated_lufs: f32,
    /// Loudness range in LU.
    pub loudness_range_lu: f32,
    /// Crest factor (peak minus RMS) in dB.
    pub crest_factor_db: f32,
    /// Loudness algorithm used for this snapshot.
    pub loudness_method: LoudnessMethod,
}

/// Overall RMS level across all channels, in dB.
pub fn rms_db(buffer: &AudioBuffer) -> f32 {
    let frames = buffer.len();
    let channels = buffer.num_channels();
    if frames == 0 || channels == 0 {
        return DB_FLOOR;
    }

    let mut sum_sq = 0.0f64;
    for channel in buffer.channels() {
        sum_sq += channel.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
    }
    let rms = (sum_sq / (frames * channels) as f64).sqrt();
    linear_to_db(rms as f32)
}

/// Measure everything the orchestrator records per step.
pub fn measure(buffer: &AudioBuffer) -> DspResult<MeteringSnapshot> {
    buffer.ensure_finite()?;

    let sample_peak_dbfs = sample_peak_db(buffer);
    let true_peak_dbtp = true_peak_db(buffer, DEFAULT_OVERSAMPLE)?;
    let loudness = integrated_loudness_and_range(buffer)?;
    let rms = rms_db(buffer);
    let crest_factor_db = if sample_peak_dbfs > DB_FLOOR && rms > DB_FLOOR {
        sample_peak_dbfs - rms
    } else {
        0.0
    };

    Ok(MeteringSnapshot {
        sample_peak_dbfs,
        true_peak_dbtp,
        integrated_lufs: loudness.integrated_lufs,
        loudness_range_lu: loudness.loudness_range_lu,
        crest_factor_db,
        loudness_method: loudness.method,
    })
}
