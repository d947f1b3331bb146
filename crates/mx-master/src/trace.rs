//! Measurement trail and pass report
//!
//! Every transition of a mastering pass is recorded with a fresh
//! [`MeteringSnapshot`] on both sides plus the stage-specific numbers, so
//! downstream QC can replay exactly what the pass did. The trace is
//! append-only and serializes to JSON for the external reporting layer.

use serde::{Deserialize, Serialize};

use mx_dsp::clipper::ClipperOutcome;
use mx_dsp::dynamics::CompressionStats;
use mx_dsp::metering::{LoudnessMethod, MeteringSnapshot};
use mx_dsp::stereo::WidthOutcome;

use crate::ceiling::CeilingOutcome;
use crate::lra_guard::LraTrial;
use crate::targets::MasteringTargets;

/// Stage-specific record of one pass transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageDetail {
    /// Pre-gain applied after staging (and, when it ran, the protective
    /// loudness-range search).
    Staged {
        /// Gain actually applied, dB.
        pre_gain_db: f32,
        /// Gain the loudness target alone would have asked for, dB.
        desired_gain_db: f32,
        /// Limiting the plan expected this gain to cost, dB.
        projected_limiter_gr_db: f32,
        /// Trials of the protective search, empty when it did not run.
        lra_trials: Vec<LraTrial>,
    },
    /// Adaptive clipper result.
    Clipped(ClipperOutcome),
    /// Limiter gain-reduction statistics.
    Limited(CompressionStats),
    /// Stereo width adjustment.
    WidthAdjusted(WidthOutcome),
    /// Final ceiling trim.
    Ceilinged(CeilingOutcome),
}

/// One recorded transition: levels before, levels after, what was done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Snapshot of the buffer entering the stage.
    pub pre: MeteringSnapshot,
    /// Snapshot of the buffer leaving the stage.
    pub post: MeteringSnapshot,
    /// Stage-specific detail.
    pub detail: StageDetail,
}

/// Append-only record of one mastering pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteringTrace {
    /// Steps in execution order.
    pub steps: Vec<TraceStep>,
}

impl MasteringTrace {
    /// Record one completed transition.
    pub fn record(&mut self, pre: MeteringSnapshot, post: MeteringSnapshot, detail: StageDetail) {
        self.steps.push(TraceStep { pre, post, detail });
    }

    /// The snapshot entering the first stage, if any step was recorded.
    pub fn input_snapshot(&self) -> Option<&MeteringSnapshot> {
        self.steps.first().map(|s| &s.pre)
    }

    /// The snapshot leaving the last stage, if any step was recorded.
    pub fn output_snapshot(&self) -> Option<&MeteringSnapshot> {
        self.steps.last().map(|s| &s.post)
    }
}

/// Pass summary for the external reporting collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteringReport {
    /// Levels before the pass.
    pub input: MeteringSnapshot,
    /// Levels after the pass.
    pub output: MeteringSnapshot,
    /// Pre-gain applied, dB.
    pub applied_gain_db: f32,
    /// Clipper outcome, when the clipper ran.
    pub clipper: Option<ClipperOutcome>,
    /// Limiter gain-reduction statistics.
    pub limiter: CompressionStats,
    /// Width outcome, when width adjustment ran.
    pub width: Option<WidthOutcome>,
    /// Final ceiling trim.
    pub ceiling: CeilingOutcome,
    /// Quality warnings for downstream QC.
    pub warnings: Vec<String>,
}

impl MasteringReport {
    /// Derive the quality warnings from the final levels and targets.
    pub fn collect_warnings(
        output: &MeteringSnapshot,
        targets: &MasteringTargets,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        if (output.integrated_lufs - targets.target_lufs_integrated).abs() > 1.0 {
            warnings.push(format!(
                "integrated loudness {:.1} LUFS misses target {:.1} by more than 1 LU",
                output.integrated_lufs, targets.target_lufs_integrated
            ));
        }
        if output.true_peak_dbtp > targets.target_ceiling_dbtp + 0.1 {
            warnings.push(format!(
                "true peak {:.2} dBTP exceeds ceiling {:.2}",
                output.true_peak_dbtp, targets.target_ceiling_dbtp
            ));
        }
        if output.loudness_method == LoudnessMethod::RmsApproximation {
            warnings.push(
                "loudness measured with RMS approximation, apply looser QC tolerances".to_string(),
            );
        }
        if let Some(lra_min) = targets.target_lra_min {
            if output.loudness_range_lu < lra_min
                && output.loudness_method == LoudnessMethod::Gated
            {
                warnings.push(format!(
                    "loudness range {:.1} LU below configured minimum {:.1}",
                    output.loudness_range_lu, lra_min
                ));
            }
        }

        warnings
    }
}
