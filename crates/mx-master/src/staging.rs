//! Gain-staging policy
//!
//! Pure arithmetic over measured levels and targets. Decides how hard to
//! push into the loudness target, how much of that push the clipper should
//! absorb, and how much limiting the plan is expected to cost.

use serde::{Deserialize, Serialize};

use crate::targets::MasteringTargets;

/// Pre-gain below this leaves the clipper out of the plan.
pub const NO_SHAVE_BELOW_DB: f32 = 0.2;

/// Baseline clipper shave when limiting is projected, dB.
pub const MUSICAL_SHAVE_DB: f32 = 0.5;

/// Absolute cap on the staged pre-gain, dB.
pub const HARD_GAIN_CAP_DB: f32 = 12.0;

/// The staged plan for one mastering pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainPlan {
    /// Gain that would land exactly on the loudness target, dB.
    pub desired_gain_db: f32,
    /// Distance from the current true peak to the ceiling, dB.
    pub headroom_db: f32,
    /// Peak shave assigned to the clipper, dB.
    pub clipper_shave_db: f32,
    /// Headroom once the clipper has taken its shave, dB.
    pub effective_headroom_db: f32,
    /// Limiter gain reduction the plan expects to spend, dB.
    pub projected_limiter_gr_db: f32,
    /// Gain actually staged, after budget and safety caps, dB.
    pub pre_gain_db: f32,
}

/// Stage the pre-gain for a pass.
///
/// `recommended_shave_db` is an optional upstream hint (an analysis stage may
/// know the material tolerates clipping); the plan takes the largest of the
/// hint, a musical baseline scaled by projected limiting, and the excess
/// needed to keep limiting within `max_limiter_gain_reduction_db`, clamped to
/// `max_clipper_peak_shave_db`. Downward gain is never capped by the limiter
/// budget; `|pre_gain| <= 12 dB` always holds.
pub fn plan_gain(
    current_lufs: f32,
    current_true_peak_dbtp: f32,
    recommended_shave_db: Option<f32>,
    targets: &MasteringTargets,
) -> GainPlan {
    let desired_gain_db = targets.target_lufs_integrated - current_lufs;
    let headroom_db = targets.target_ceiling_dbtp - current_true_peak_dbtp;
    let budget = targets.max_limiter_gain_reduction_db;

    // How much limiting raising straight to target would need with no clipper.
    let limiting_without_shave = (desired_gain_db - headroom_db).max(0.0);

    let clipper_shave_db = if desired_gain_db <= NO_SHAVE_BELOW_DB {
        0.0
    } else {
        let scale = if limiting_without_shave <= 0.0 {
            0.0
        } else if budget > 0.0 {
            (limiting_without_shave / budget).min(1.0)
        } else {
            1.0
        };
        let musical = MUSICAL_SHAVE_DB * scale;
        let excess = (limiting_without_shave - budget).max(0.0);
        recommended_shave_db
            .unwrap_or(0.0)
            .max(musical)
            .max(excess)
            .clamp(0.0, targets.max_clipper_peak_shave_db)
    };

    let effective_headroom_db = headroom_db + clipper_shave_db;

    let mut pre_gain_db = if desired_gain_db > 0.0 {
        let limiting_needed = (desired_gain_db - effective_headroom_db).max(0.0);
        if limiting_needed > budget {
            effective_headroom_db + budget
        } else {
            desired_gain_db
        }
    } else {
        // Turning a mix down is never limited
        desired_gain_db
    };
    pre_gain_db = pre_gain_db.clamp(-HARD_GAIN_CAP_DB, HARD_GAIN_CAP_DB);

    let projected_limiter_gr_db = (pre_gain_db - effective_headroom_db).max(0.0);

    GainPlan {
        desired_gain_db,
        headroom_db,
        clipper_shave_db,
        effective_headroom_db,
        projected_limiter_gr_db,
        pre_gain_db,
    }
}
