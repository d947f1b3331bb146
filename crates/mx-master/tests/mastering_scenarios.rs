//! End-to-end mastering pass scenarios

use mx_dsp::AudioBuffer;
use mx_dsp::clipper::ClipMode;
use mx_master::trace::StageDetail;
use mx_master::{MasteringEngine, MasteringTargets};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stereo_sine(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> AudioBuffer {
    let n = (seconds * sample_rate as f32) as usize;
    let s: Vec<f32> = (0..n)
        .map(|i| {
            amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
        })
        .collect();
    AudioBuffer::stereo(s.clone(), s, sample_rate).unwrap()
}

fn targets_11_lufs() -> MasteringTargets {
    MasteringTargets {
        target_lufs_integrated: -11.0,
        target_lra_min: None,
        target_lra_max: None,
        target_ceiling_dbtp: -1.0,
        target_width_factor: 1.0,
        max_limiter_gain_reduction_db: 6.0,
        max_width_change_percent: 10.0,
        max_clipper_peak_shave_db: 2.0,
        clipper_mode: ClipMode::Soft,
    }
}

#[test]
fn quiet_mix_is_raised_to_target() {
    init_logging();
    let engine = MasteringEngine::new(targets_11_lufs()).unwrap();
    let buffer = stereo_sine(997.0, 48000, 2.0, 0.1); // -20 dBFS peak

    let outcome = engine.master(buffer).unwrap();
    let report = &outcome.report;

    // Plenty of headroom: the applied gain is exactly the loudness deficit
    let deficit = -11.0 - report.input.integrated_lufs;
    assert!(
        (report.applied_gain_db - deficit).abs() < 1e-3,
        "gain {} vs deficit {}",
        report.applied_gain_db,
        deficit
    );
    assert!((report.output.integrated_lufs - -11.0).abs() < 1.0);
    assert!(report.output.true_peak_dbtp <= -1.0 + 0.05);
    assert!(report.clipper.is_none());
    assert!(report.limiter.max_gain_reduction_db < 0.5);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn compliant_mix_passes_nearly_untouched() {
    init_logging();
    let engine = MasteringEngine::new(targets_11_lufs()).unwrap();
    // Amplitude chosen so integrated loudness sits at the -11 LUFS target
    // (stereo sine measures 20*log10(amplitude) LUFS under K-weighting)
    let buffer = stereo_sine(997.0, 48000, 2.0, 0.2818);

    let outcome = engine.master(buffer).unwrap();
    let report = &outcome.report;

    assert!((report.input.integrated_lufs - -11.0).abs() < 0.3);
    assert!(report.applied_gain_db.abs() < 0.3);
    assert!(report.limiter.max_gain_reduction_db < 0.5);
    assert!(report.ceiling.trim_db.abs() < 0.1);
    assert!(report.clipper.is_none());
}

#[test]
fn transient_spike_is_shaved_then_ceilinged() {
    init_logging();
    let mut targets = targets_11_lufs();
    targets.clipper_mode = ClipMode::Hard;
    let engine = MasteringEngine::new(targets).unwrap();

    // -30 dBFS bed with a single full-scale spike
    let sr = 48000u32;
    let mut s: Vec<f32> = (0..(2 * sr) as usize)
        .map(|i| 0.0316 * (2.0 * std::f32::consts::PI * 997.0 * i as f32 / sr as f32).sin())
        .collect();
    s[48000] = 1.0;
    let buffer = AudioBuffer::stereo(s.clone(), s, sr).unwrap();

    let outcome = engine.master(buffer).unwrap();
    let report = &outcome.report;

    let clipper = report.clipper.expect("clipper must run for this material");
    assert_eq!(clipper.target_shave_db, 2.0);
    assert!(
        (clipper.actual_shave_db - clipper.target_shave_db).abs() <= 0.2,
        "shave {} dB",
        clipper.actual_shave_db
    );
    assert!(clipper.clipped_sample_percent > 0.0);
    assert!(clipper.clipped_sample_percent < 1.0);

    // Whatever the spike did upstream, the ceiling holds at the end
    assert!(report.output.true_peak_dbtp <= -1.0 + 0.1);
}

#[test]
fn trace_records_every_transition_in_order() {
    init_logging();
    let mut targets = targets_11_lufs();
    targets.target_width_factor = 1.05;
    let engine = MasteringEngine::new(targets).unwrap();
    let buffer = stereo_sine(440.0, 48000, 1.0, 0.2);

    let outcome = engine.master(buffer).unwrap();
    let trace = &outcome.trace;

    assert!(matches!(
        trace.steps.first().unwrap().detail,
        StageDetail::Staged { .. }
    ));
    assert!(matches!(
        trace.steps.last().unwrap().detail,
        StageDetail::Ceilinged(_)
    ));
    assert!(trace
        .steps
        .iter()
        .any(|s| matches!(s.detail, StageDetail::WidthAdjusted(_))));
    assert!(trace
        .steps
        .iter()
        .any(|s| matches!(s.detail, StageDetail::Limited(_))));

    // Adjacent steps chain: each stage's input is the previous stage's output
    for pair in trace.steps.windows(2) {
        assert_eq!(pair[0].post, pair[1].pre);
    }

    assert_eq!(*trace.input_snapshot().unwrap(), outcome.report.input);
    assert_eq!(*trace.output_snapshot().unwrap(), outcome.report.output);

    // The whole trace serializes for the reporting layer
    let json = serde_json::to_string(trace).unwrap();
    assert!(json.contains("\"stage\":\"staged\""));
}

#[test]
fn protective_search_runs_for_dynamic_material() {
    init_logging();
    let mut targets = targets_11_lufs();
    targets.target_lufs_integrated = -6.0;
    targets.target_lra_min = Some(2.0);
    let engine = MasteringEngine::new(targets).unwrap();

    // Quiet verse, loud chorus
    let sr = 48000usize;
    let mut s = Vec::with_capacity(sr * 8);
    for half in 0..2 {
        let amp = if half == 0 { 0.02f32 } else { 0.25 };
        for i in 0..sr * 4 {
            s.push(amp * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / sr as f32).sin());
        }
    }
    let buffer = AudioBuffer::stereo(s.clone(), s, sr as u32).unwrap();

    let outcome = engine.master(buffer).unwrap();

    let StageDetail::Staged { ref lra_trials, .. } = outcome.trace.steps[0].detail else {
        panic!("first step must be the staged gain");
    };
    assert!(!lra_trials.is_empty(), "the protective search should run");
    assert!(lra_trials[0].meets_minimum);
    assert!(outcome.report.output.loudness_range_lu >= 2.0);
}
