//! Mastering DSP primitives
//!
//! Batch (non-streaming) building blocks for the automated mastering
//! pipeline:
//!
//! - **Level meters**: sample peak, oversampled true peak, gated BS.1770
//!   integrated loudness and loudness range
//! - **Feed-forward compressor**: the dynamics primitive reused by every
//!   per-stem and per-bus stage
//! - **Adaptive clipper**: soft/hard clipping with a bisection search to hit
//!   a target peak shave
//! - **Mid/side width**: stereo width adjustment with ratio reporting
//!
//! All operations consume and produce complete in-memory buffers. The
//! primitives hold no global state and are safe to invoke concurrently on
//! distinct buffers.

#![warn(missing_docs)]
// DSP inner loops use explicit indexing
#![allow(clippy::needless_range_loop)]

pub mod buffer;
pub mod clipper;
pub mod dynamics;
pub mod metering;
pub mod stereo;

mod error;

pub use buffer::AudioBuffer;
pub use error::{DspError, DspResult};

/// Floor sentinel for dB conversions of silent or empty material.
pub const DB_FLOOR: f32 = -120.0;

/// Convert decibels to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, clamped to [`DB_FLOOR`].
pub fn linear_to_db(linear: f32) -> f32 {
    if linear > 0.0 {
        (20.0 * linear.log10()).max(DB_FLOOR)
    } else {
        DB_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_trip() {
        for db in [-60.0f32, -20.0, -6.0, 0.0, 3.0] {
            let lin = db_to_linear(db);
            assert!((linear_to_db(lin) - db).abs() < 1e-4);
        }
    }

    #[test]
    fn test_silence_hits_floor() {
        assert_eq!(linear_to_db(0.0), DB_FLOOR);
        assert_eq!(linear_to_db(-1.0), DB_FLOOR);
        assert_eq!(linear_to_db(1e-10), DB_FLOOR);
    }
}
