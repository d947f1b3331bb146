//! Mastering targets and style presets
//!
//! `MasteringTargets` is the read-only contract for one mastering pass:
//! where the loudness and peak should land, and how aggressively each
//! processor may work to get there. Presets mirror common delivery targets;
//! an external style lookup can also supply targets as JSON, parsed
//! leniently with per-field fallback reporting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mx_dsp::clipper::ClipMode;

use crate::error::{MasterError, MasterResult};

/// Numeric targets and safety caps for one mastering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteringTargets {
    /// Integrated loudness to aim for, LUFS.
    pub target_lufs_integrated: f32,
    /// Minimum loudness range to preserve, LU. `None` disables the
    /// protective search.
    pub target_lra_min: Option<f32>,
    /// Maximum loudness range, LU. Informational (reported, not enforced).
    pub target_lra_max: Option<f32>,
    /// True-peak ceiling, dBTP. Must be <= 0.
    pub target_ceiling_dbtp: f32,
    /// Stereo width factor to aim for (1.0 = unchanged).
    pub target_width_factor: f32,
    /// Maximum limiter gain reduction the pass may spend, dB.
    pub max_limiter_gain_reduction_db: f32,
    /// Maximum width change, percent (clamps `|width_factor - 1|`).
    pub max_width_change_percent: f32,
    /// Maximum peak shave the clipper may take, dB.
    pub max_clipper_peak_shave_db: f32,
    /// Clipping curve for the peak-shave step.
    pub clipper_mode: ClipMode,
}

impl Default for MasteringTargets {
    fn default() -> Self {
        Self::streaming()
    }
}

impl MasteringTargets {
    /// Streaming platforms (-14 LUFS / -1 dBTP).
    pub fn streaming() -> Self {
        Self {
            target_lufs_integrated: -14.0,
            target_lra_min: Some(4.0),
            target_lra_max: Some(10.0),
            target_ceiling_dbtp: -1.0,
            target_width_factor: 1.0,
            max_limiter_gain_reduction_db: 6.0,
            max_width_change_percent: 10.0,
            max_clipper_peak_shave_db: 2.0,
            clipper_mode: ClipMode::Soft,
        }
    }

    /// Club/DJ playback (loud, dense).
    pub fn club() -> Self {
        Self {
            target_lufs_integrated: -8.0,
            target_lra_min: None,
            target_lra_max: Some(5.0),
            target_ceiling_dbtp: -0.1,
            target_width_factor: 1.05,
            max_limiter_gain_reduction_db: 8.0,
            max_width_change_percent: 10.0,
            max_clipper_peak_shave_db: 3.0,
            clipper_mode: ClipMode::Hard,
        }
    }

    /// Broadcast (-23 LUFS EBU R128).
    pub fn broadcast() -> Self {
        Self {
            target_lufs_integrated: -23.0,
            target_lra_min: Some(5.0),
            target_lra_max: Some(15.0),
            target_ceiling_dbtp: -1.0,
            target_width_factor: 1.0,
            max_limiter_gain_reduction_db: 4.0,
            max_width_change_percent: 10.0,
            max_clipper_peak_shave_db: 1.0,
            clipper_mode: ClipMode::Soft,
        }
    }

    /// Podcast/voice (-18 LUFS, narrowed image).
    pub fn podcast() -> Self {
        Self {
            target_lufs_integrated: -18.0,
            target_lra_min: None,
            target_lra_max: Some(6.0),
            target_ceiling_dbtp: -1.5,
            target_width_factor: 0.95,
            max_limiter_gain_reduction_db: 6.0,
            max_width_change_percent: 10.0,
            max_clipper_peak_shave_db: 1.5,
            clipper_mode: ClipMode::Soft,
        }
    }

    /// Reject physically meaningless target combinations.
    pub fn validate(&self) -> MasterResult<()> {
        if !self.target_lufs_integrated.is_finite()
            || !(-60.0..=0.0).contains(&self.target_lufs_integrated)
        {
            return Err(MasterError::InvalidTargets(format!(
                "target loudness out of range: {} LUFS",
                self.target_lufs_integrated
            )));
        }
        if !self.target_ceiling_dbtp.is_finite()
            || self.target_ceiling_dbtp > 0.0
            || self.target_ceiling_dbtp < -20.0
        {
            return Err(MasterError::InvalidTargets(format!(
                "ceiling must be in [-20, 0] dBTP, got {}",
                self.target_ceiling_dbtp
            )));
        }
        if !self.target_width_factor.is_finite()
            || !(0.0..=2.0).contains(&self.target_width_factor)
        {
            return Err(MasterError::InvalidTargets(format!(
                "width factor must be in [0, 2], got {}",
                self.target_width_factor
            )));
        }
        for (name, value) in [
            (
                "max_limiter_gain_reduction_db",
                self.max_limiter_gain_reduction_db,
            ),
            ("max_width_change_percent", self.max_width_change_percent),
            ("max_clipper_peak_shave_db", self.max_clipper_peak_shave_db),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MasterError::InvalidTargets(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.target_lra_min, self.target_lra_max) {
            if min > max {
                return Err(MasterError::InvalidTargets(format!(
                    "LRA range inverted: min {min} > max {max}"
                )));
            }
        }
        for (name, value) in [
            ("target_lra_min", self.target_lra_min),
            ("target_lra_max", self.target_lra_max),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(MasterError::InvalidTargets(format!(
                        "{name} must be finite and non-negative, got {v}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Targets parsed leniently from JSON, with the fields that fell back to
/// defaults listed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTargets {
    /// The resulting targets (always valid).
    pub targets: MasteringTargets,
    /// Fields that were missing or unusable and took their default value.
    pub fallback_fields: Vec<String>,
}

impl MasteringTargets {
    /// Parse targets from a JSON object, field by field.
    ///
    /// A style document produced upstream may be stale or hand-edited, so
    /// each field that is missing, mistyped, or outside its sane range falls
    /// back to the default and is reported in
    /// [`ParsedTargets::fallback_fields`] instead of failing the pass. Only
    /// a document that is not a JSON object at all is an error.
    pub fn from_json(json: &str) -> MasterResult<ParsedTargets> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| MasterError::MalformedTargets(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| MasterError::MalformedTargets("expected a JSON object".into()))?;

        let defaults = MasteringTargets::default();
        let mut fallback_fields = Vec::new();

        let mut number = |name: &str, default: f32, sane: &dyn Fn(f32) -> bool| -> f32 {
            match object.get(name).and_then(Value::as_f64).map(|v| v as f32) {
                Some(v) if sane(v) => v,
                _ => {
                    fallback_fields.push(name.to_string());
                    default
                }
            }
        };

        let target_lufs_integrated = number(
            "target_lufs_integrated",
            defaults.target_lufs_integrated,
            &|v| (-60.0..=0.0).contains(&v),
        );
        let target_ceiling_dbtp = number("target_ceiling_dbtp", defaults.target_ceiling_dbtp, &|v| {
            (-20.0..=0.0).contains(&v)
        });
        let target_width_factor = number("target_width_factor", defaults.target_width_factor, &|v| {
            (0.0..=2.0).contains(&v)
        });
        let max_limiter_gain_reduction_db = number(
            "max_limiter_gain_reduction_db",
            defaults.max_limiter_gain_reduction_db,
            &|v| v.is_finite() && v >= 0.0,
        );
        let max_width_change_percent = number(
            "max_width_change_percent",
            defaults.max_width_change_percent,
            &|v| v.is_finite() && v >= 0.0,
        );
        let max_clipper_peak_shave_db = number(
            "max_clipper_peak_shave_db",
            defaults.max_clipper_peak_shave_db,
            &|v| v.is_finite() && v >= 0.0,
        );

        // Optional fields: absent or null means "not configured", which is
        // not a fallback. Only a present-but-unusable value is.
        let mut optional = |name: &str, default: Option<f32>| -> Option<f32> {
            match object.get(name) {
                None | Some(Value::Null) => None,
                Some(v) => match v.as_f64().map(|v| v as f32) {
                    Some(v) if v.is_finite() && v >= 0.0 => Some(v),
                    _ => {
                        fallback_fields.push(name.to_string());
                        default
                    }
                },
            }
        };
        let mut target_lra_min = optional("target_lra_min", defaults.target_lra_min);
        let target_lra_max = optional("target_lra_max", defaults.target_lra_max);
        if let (Some(min), Some(max)) = (target_lra_min, target_lra_max) {
            if min > max {
                fallback_fields.push("target_lra_min".to_string());
                target_lra_min = None;
            }
        }

        let clipper_mode = match object.get("clipper_mode").and_then(Value::as_str) {
            Some("soft") => ClipMode::Soft,
            Some("hard") => ClipMode::Hard,
            _ => {
                fallback_fields.push("clipper_mode".to_string());
                defaults.clipper_mode
            }
        };

        if !fallback_fields.is_empty() {
            log::warn!("targets JSON used defaults for: {}", fallback_fields.join(", "));
        }

        Ok(ParsedTargets {
            targets: MasteringTargets {
                target_lufs_integrated,
                target_lra_min,
                target_lra_max,
                target_ceiling_dbtp,
                target_width_factor,
                max_limiter_gain_reduction_db,
                max_width_change_percent,
                max_clipper_peak_shave_db,
                clipper_mode,
            },
            fallback_fields,
        })
    }
}
