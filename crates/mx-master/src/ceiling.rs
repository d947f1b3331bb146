//! Ceiling enforcer
//!
//! Final guarantee of the pass: a single uniform linear trim that brings the
//! true peak to the ceiling. Never a clip and never a boost; quiet material
//! is left alone.

use serde::{Deserialize, Serialize};

use mx_dsp::metering::{DEFAULT_OVERSAMPLE, true_peak_db};
use mx_dsp::{AudioBuffer, DspError};

use crate::error::MasterResult;

/// Default margin below the ceiling at which no trim is taken, dB.
pub const DEFAULT_SAFETY_MARGIN_DB: f32 = 0.3;

/// Result of the final trim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CeilingOutcome {
    /// True peak before the trim, dBTP.
    pub true_peak_pre_dbtp: f32,
    /// Uniform gain applied, dB (<= 0).
    pub trim_db: f32,
    /// True peak after the trim, dBTP.
    pub true_peak_post_dbtp: f32,
}

/// Trim the buffer so its true peak does not exceed `ceiling_db`.
///
/// A peak already at or below `ceiling_db - safety_margin_db` passes through
/// untouched. Otherwise the trim is exactly `ceiling_db - true_peak`, clamped
/// to never be a boost.
pub fn enforce_ceiling(
    mut buffer: AudioBuffer,
    ceiling_db: f32,
    safety_margin_db: f32,
) -> MasterResult<(AudioBuffer, CeilingOutcome)> {
    buffer.ensure_valid()?;
    if !ceiling_db.is_finite() || !safety_margin_db.is_finite() || safety_margin_db < 0.0 {
        return Err(DspError::InvalidParameter(format!(
            "ceiling {ceiling_db} dB / margin {safety_margin_db} dB"
        ))
        .into());
    }

    let true_peak_pre = true_peak_db(&buffer, DEFAULT_OVERSAMPLE)?;
    if true_peak_pre <= ceiling_db - safety_margin_db {
        return Ok((
            buffer,
            CeilingOutcome {
                true_peak_pre_dbtp: true_peak_pre,
                trim_db: 0.0,
                true_peak_post_dbtp: true_peak_pre,
            },
        ));
    }

    let trim_db = (ceiling_db - true_peak_pre).min(0.0);
    if trim_db < 0.0 {
        buffer.apply_gain_db(trim_db);
    }
    let true_peak_post = true_peak_db(&buffer, DEFAULT_OVERSAMPLE)?;

    Ok((
        buffer,
        CeilingOutcome {
            true_peak_pre_dbtp: true_peak_pre,
            trim_db,
            true_peak_post_dbtp: true_peak_post,
        },
    ))
}
