//! Mastering pass orchestrator
//!
//! Runs the fixed stage order: measure, gain-stage (with the protective
//! loudness-range search), clip, limit, adjust width, enforce the ceiling.
//! Levels are re-measured around every transition and collected into a
//! [`MasteringTrace`]; any stage error aborts the whole pass.

use mx_dsp::clipper::{MIN_SHAVE_DB, clip_to_target_shave};
use mx_dsp::dynamics::{CompressorParams, compress};
use mx_dsp::metering::measure;
use mx_dsp::stereo::apply_width;
use mx_dsp::AudioBuffer;

use crate::ceiling::{DEFAULT_SAFETY_MARGIN_DB, enforce_ceiling};
use crate::error::MasterResult;
use crate::lra_guard::protect_loudness_range;
use crate::staging::plan_gain;
use crate::targets::MasteringTargets;
use crate::trace::{MasteringReport, MasteringTrace, StageDetail};

/// Absolute safety band for the width factor.
const WIDTH_BAND: (f32, f32) = (0.9, 1.1);

/// Everything one mastering pass produces.
#[derive(Debug, Clone)]
pub struct MasteringOutcome {
    /// The mastered buffer.
    pub buffer: AudioBuffer,
    /// Full per-stage measurement trail.
    pub trace: MasteringTrace,
    /// Summary for the reporting layer.
    pub report: MasteringReport,
}

/// Final-mastering stage engine.
///
/// Holds only the targets; all per-pass state lives in the pass itself, so
/// one engine can master any number of independent buffers.
#[derive(Debug, Clone)]
pub struct MasteringEngine {
    targets: MasteringTargets,
}

impl MasteringEngine {
    /// Create an engine, rejecting invalid targets up front.
    pub fn new(targets: MasteringTargets) -> MasterResult<Self> {
        targets.validate()?;
        Ok(Self { targets })
    }

    /// The targets this engine masters toward.
    pub fn targets(&self) -> &MasteringTargets {
        &self.targets
    }

    /// Limiter parameterization for the final-limiting step: a high-ratio
    /// peak limiter sitting at the ceiling.
    pub(crate) fn limiter_params(targets: &MasteringTargets) -> CompressorParams {
        CompressorParams {
            threshold_db: targets.target_ceiling_dbtp,
            ratio: 20.0,
            attack_ms: 1.0,
            release_ms: 60.0,
            makeup_gain_db: 0.0,
        }
    }

    /// Width factor after the per-style cap and the absolute safety band.
    pub(crate) fn clamped_width_factor(targets: &MasteringTargets) -> f32 {
        let cap = targets.max_width_change_percent / 100.0;
        let delta = (targets.target_width_factor - 1.0).clamp(-cap, cap);
        (1.0 + delta).clamp(WIDTH_BAND.0, WIDTH_BAND.1)
    }

    /// Master one buffer.
    pub fn master(&self, buffer: AudioBuffer) -> MasterResult<MasteringOutcome> {
        self.master_with_hint(buffer, None)
    }

    /// Master one buffer with an upstream clipper-shave recommendation.
    pub fn master_with_hint(
        &self,
        mut buffer: AudioBuffer,
        recommended_shave_db: Option<f32>,
    ) -> MasterResult<MasteringOutcome> {
        buffer.ensure_valid()?;
        let targets = &self.targets;
        let mut trace = MasteringTrace::default();

        let input = measure(&buffer)?;
        log::info!(
            "mastering pass: {:.1} LUFS / {:.2} dBTP in, target {:.1} LUFS / {:.2} dBTP",
            input.integrated_lufs,
            input.true_peak_dbtp,
            targets.target_lufs_integrated,
            targets.target_ceiling_dbtp
        );

        // Stage the gain, then let the protective search veto it.
        let plan = plan_gain(
            input.integrated_lufs,
            input.true_peak_dbtp,
            recommended_shave_db,
            targets,
        );
        let limiter = Self::limiter_params(targets);
        let decision = protect_loudness_range(&buffer, &plan, targets, &limiter)?;
        let (applied_gain_db, lra_trials) = match decision {
            Some(d) => (d.chosen_gain_db, d.trials),
            None => (plan.pre_gain_db, Vec::new()),
        };

        buffer.apply_gain_db(applied_gain_db);
        let mut snapshot = measure(&buffer)?;
        trace.record(
            input,
            snapshot,
            StageDetail::Staged {
                pre_gain_db: applied_gain_db,
                desired_gain_db: plan.desired_gain_db,
                projected_limiter_gr_db: plan.projected_limiter_gr_db,
                lra_trials,
            },
        );

        // Clip only when the plan assigned a meaningful shave.
        let mut clipper_outcome = None;
        if plan.clipper_shave_db > MIN_SHAVE_DB {
            let pre = snapshot;
            let (clipped, outcome) =
                clip_to_target_shave(buffer, plan.clipper_shave_db, targets.clipper_mode)?;
            buffer = clipped;
            snapshot = measure(&buffer)?;
            trace.record(pre, snapshot, StageDetail::Clipped(outcome));
            clipper_outcome = Some(outcome);
        }

        // The limiter always runs; on already-compliant material it is a
        // measured no-op.
        let pre = snapshot;
        let (limited, limiter_stats) = compress(buffer, &limiter)?;
        buffer = limited;
        snapshot = measure(&buffer)?;
        trace.record(pre, snapshot, StageDetail::Limited(limiter_stats));

        let width_factor = Self::clamped_width_factor(targets);
        let mut width_outcome = None;
        if (width_factor - 1.0).abs() > f32::EPSILON {
            let pre = snapshot;
            let (widened, outcome) = apply_width(buffer, width_factor)?;
            buffer = widened;
            snapshot = measure(&buffer)?;
            trace.record(pre, snapshot, StageDetail::WidthAdjusted(outcome));
            width_outcome = Some(outcome);
        }

        let pre = snapshot;
        let (trimmed, ceiling_outcome) =
            enforce_ceiling(buffer, targets.target_ceiling_dbtp, DEFAULT_SAFETY_MARGIN_DB)?;
        buffer = trimmed;
        let output = measure(&buffer)?;
        trace.record(pre, output, StageDetail::Ceilinged(ceiling_outcome));

        let warnings = MasteringReport::collect_warnings(&output, targets);
        for warning in &warnings {
            log::warn!("{warning}");
        }
        log::info!(
            "mastering pass done: {:.1} LUFS / {:.2} dBTP out, gain {:+.1} dB, limiter max GR {:.2} dB, trim {:+.2} dB",
            output.integrated_lufs,
            output.true_peak_dbtp,
            applied_gain_db,
            limiter_stats.max_gain_reduction_db,
            ceiling_outcome.trim_db
        );

        let report = MasteringReport {
            input,
            output,
            applied_gain_db,
            clipper: clipper_outcome,
            limiter: limiter_stats,
            width: width_outcome,
            ceiling: ceiling_outcome,
            warnings,
        };

        Ok(MasteringOutcome {
            buffer,
            trace,
            report,
        })
    }
}
