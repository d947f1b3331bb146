//! Owned multi-channel audio buffer
//!
//! Channel-major layout: one contiguous `Vec<f32>` per channel, all channels
//! equal length. A buffer is owned by exactly one processing step at a time;
//! transforms take it by value and return it, meters borrow it read-only.

use crate::db_to_linear;
use crate::error::{DspError, DspResult};

/// Multi-channel 32-bit float audio buffer at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from channel-major sample data.
    ///
    /// All channels must have equal length and the sample rate must be
    /// positive.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> DspResult<Self> {
        if sample_rate == 0 {
            return Err(DspError::InvalidParameter(
                "sample rate must be positive".into(),
            ));
        }
        if let Some(first) = channels.first() {
            let len = first.len();
            if channels.iter().any(|c| c.len() != len) {
                return Err(DspError::InvalidBuffer(
                    "channel lengths differ".into(),
                ));
            }
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Create a stereo buffer from left/right channel data.
    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> DspResult<Self> {
        Self::from_channels(vec![left, right], sample_rate)
    }

    /// Create a mono buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> DspResult<Self> {
        Self::from_channels(vec![samples], sample_rate)
    }

    /// Create an all-zero buffer.
    pub fn silent(num_channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; num_channels],
            sample_rate,
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    /// True if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All channels, channel-major.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Mutable access to all channels.
    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// One channel's samples, if present.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Reject buffers containing NaN or infinite samples.
    ///
    /// Meters accept empty buffers (they report the floor sentinel), so this
    /// check is separate from [`AudioBuffer::ensure_valid`].
    pub fn ensure_finite(&self) -> DspResult<()> {
        for (ch, samples) in self.channels.iter().enumerate() {
            if let Some(frame) = samples.iter().position(|s| !s.is_finite()) {
                return Err(DspError::InvalidBuffer(format!(
                    "non-finite sample at channel {ch}, frame {frame}"
                )));
            }
        }
        Ok(())
    }

    /// Full entry validation for processing steps: non-empty and finite.
    pub fn ensure_valid(&self) -> DspResult<()> {
        if self.is_empty() {
            return Err(DspError::InvalidBuffer("empty buffer".into()));
        }
        self.ensure_finite()
    }

    /// Apply a uniform gain, in dB, to every sample in place.
    pub fn apply_gain_db(&mut self, gain_db: f32) {
        let gain = db_to_linear(gain_db);
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// True if every sample is exactly zero or denormally small.
    pub fn is_silent(&self) -> bool {
        self.channels
            .iter()
            .all(|c| c.iter().all(|s| s.abs() < 1e-12))
    }
}
