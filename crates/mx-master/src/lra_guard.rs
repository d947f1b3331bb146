//! Loudness-range protective search
//!
//! A large pre-gain can push so much of the program into the limiter that
//! the loudness range collapses. When a minimum range is configured, the
//! staged gain is auditioned on disposable copies at decreasing trial gains
//! and the largest gain that still preserves the minimum wins.

use serde::{Deserialize, Serialize};

use mx_dsp::clipper::clip_to_target_shave;
use mx_dsp::dynamics::{CompressorParams, compress};
use mx_dsp::metering::integrated_loudness_and_range;
use mx_dsp::AudioBuffer;

use crate::error::MasterResult;
use crate::staging::GainPlan;
use crate::targets::MasteringTargets;

/// The search only runs for pre-gains above this, dB.
pub const TRIGGER_GAIN_DB: f32 = 2.0;

/// Gain decrement between trials, dB.
pub const STEP_DB: f32 = 1.0;

/// Maximum number of simulated trials.
pub const MAX_TRIALS: usize = 5;

/// One simulated gain trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LraTrial {
    /// Trial pre-gain, dB.
    pub gain_db: f32,
    /// Loudness range after simulating gain, clipper and limiter, LU.
    pub loudness_range_lu: f32,
    /// Whether this trial preserved the configured minimum.
    pub meets_minimum: bool,
}

/// Outcome of the protective search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LraDecision {
    /// Gain the pass should use instead of the staged one, dB.
    pub chosen_gain_db: f32,
    /// Every trial that was simulated, in search order.
    pub trials: Vec<LraTrial>,
}

fn simulate_trial(
    buffer: &AudioBuffer,
    gain_db: f32,
    plan: &GainPlan,
    targets: &MasteringTargets,
    limiter: &CompressorParams,
) -> MasterResult<f32> {
    let mut trial = buffer.clone();
    trial.apply_gain_db(gain_db);
    let (trial, _) = clip_to_target_shave(trial, plan.clipper_shave_db, targets.clipper_mode)?;
    let (trial, _) = compress(trial, limiter)?;
    let measurement = integrated_loudness_and_range(&trial)?;
    Ok(measurement.loudness_range_lu)
}

/// Audition the staged gain against the minimum loudness range.
///
/// Returns `None` when the guard does not apply (small gain, or no minimum
/// configured). Otherwise simulates the downstream chain at `pre_gain`,
/// `pre_gain - 1`, … on clones of the working buffer and picks the largest
/// gain whose simulated range meets the minimum; if none does, the trial with
/// the best observed range wins. Bounded, best-effort: the search never runs
/// more than [`MAX_TRIALS`] simulations.
pub fn protect_loudness_range(
    buffer: &AudioBuffer,
    plan: &GainPlan,
    targets: &MasteringTargets,
    limiter: &CompressorParams,
) -> MasterResult<Option<LraDecision>> {
    let Some(lra_min) = targets.target_lra_min else {
        return Ok(None);
    };
    if plan.pre_gain_db <= TRIGGER_GAIN_DB {
        return Ok(None);
    }

    let mut trials = Vec::with_capacity(MAX_TRIALS);
    let mut chosen: Option<f32> = None;

    for step in 0..MAX_TRIALS {
        let gain_db = plan.pre_gain_db - step as f32 * STEP_DB;
        if gain_db <= 0.0 {
            break;
        }

        let loudness_range_lu = simulate_trial(buffer, gain_db, plan, targets, limiter)?;
        let meets_minimum = loudness_range_lu >= lra_min;
        log::debug!(
            "lra trial {step}: gain {gain_db:.1} dB, range {loudness_range_lu:.2} LU (min {lra_min:.2})"
        );
        trials.push(LraTrial {
            gain_db,
            loudness_range_lu,
            meets_minimum,
        });

        // Trials run in descending gain order, so the first hit is the
        // largest qualifying gain.
        if meets_minimum {
            chosen = Some(gain_db);
            break;
        }
    }

    let chosen_gain_db = match chosen {
        Some(gain) => gain,
        None => {
            let best = trials.iter().fold(None::<&LraTrial>, |best, t| match best {
                Some(b) if b.loudness_range_lu >= t.loudness_range_lu => Some(b),
                _ => Some(t),
            });
            match best {
                Some(t) => {
                    log::warn!(
                        "no trial gain preserved {lra_min:.1} LU, keeping best at {:.1} dB",
                        t.gain_db
                    );
                    t.gain_db
                }
                None => plan.pre_gain_db,
            }
        }
    };

    Ok(Some(LraDecision {
        chosen_gain_db,
        trials,
    }))
}
