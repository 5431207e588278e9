use std::sync::{Arc, Mutex};

use openswing::classifier::{DenseLayer, ModelArtifact, MODEL_FILE};
use openswing::feedback::{FeedbackArea, Priority};
use openswing::pose::Joint;
use openswing::remote::TrainingRecord;
use openswing::synthetic::{SwingProfile, SyntheticSwing};
use openswing::{
    AnalysisError, AnalyzerConfig, CancelFlag, MemoryFrameSource, ModelBundle, ModelStore,
    PoseEstimator, Progress, SwingAnalysisResult, SwingAnalyzer, SwingLabel, FEATURE_COUNT,
};

fn baseline_models() -> Arc<ModelStore> {
    Arc::new(ModelStore::new(ModelBundle::baseline()))
}

fn analyze(swing: &SyntheticSwing, models: Arc<ModelStore>) -> openswing::Result<SwingAnalysisResult> {
    let analyzer = SwingAnalyzer::new(
        AnalyzerConfig::default(),
        models,
        Arc::new(swing.pose_track()),
    );
    let source = MemoryFrameSource::new(swing.frames.clone(), swing.fps);
    analyzer.analyze(source, &CancelFlag::new(), &|_| {})
}

#[test]
fn test_good_swing_end_to_end() {
    let swing = SyntheticSwing::generate(SwingProfile::good(), 7);
    let result = analyze(&swing, baseline_models()).unwrap();

    assert_eq!(result.frame_count, swing.frames.len());
    assert_eq!(result.features.len(), FEATURE_COUNT);
    assert!(result.features.as_slice().iter().all(|v| v.is_finite()));
    assert!(result.phases.is_monotonic());
    assert!(result.phases.impact < result.frame_count);

    let total: f64 = result.classification.probabilities.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(result.classification.confidence >= 1.0 / 3.0);

    assert!((0.0..=100.0).contains(&result.feedback.overall_score));
    assert!((0.0..=1.0).contains(&result.tracking_quality.overall_score));
    assert!(!result.flags.used_default_normalization);
    assert_eq!(result.flags.model_version, "baseline-1");
    assert!(result.flags.borrowed_joints.is_empty());
}

#[test]
fn test_good_swing_is_classified_good() {
    let swing = SyntheticSwing::generate(SwingProfile::good(), 7);
    let result = analyze(&swing, baseline_models()).unwrap();
    assert_eq!(result.classification.label, SwingLabel::GoodSwing);
    assert!(!result
        .feedback
        .recommendations
        .iter()
        .any(|r| r.area == FeedbackArea::SwingShape));
}

#[test]
fn test_steep_swing_is_classified_too_steep() {
    let swing = SyntheticSwing::generate(SwingProfile::steep(), 7);
    let result = analyze(&swing, baseline_models()).unwrap();
    assert_eq!(result.classification.label, SwingLabel::TooSteep);
    assert!(result.classification.confidence > 0.5);
    assert!(result
        .feedback
        .recommendations
        .iter()
        .any(|r| r.area == FeedbackArea::SwingShape && r.priority <= Priority::High));
}

#[test]
fn test_flat_swing_is_classified_too_flat() {
    let swing = SyntheticSwing::generate(SwingProfile::flat(), 7);
    let result = analyze(&swing, baseline_models()).unwrap();
    assert_eq!(result.classification.label, SwingLabel::TooFlat);
    assert!(result.classification.probability(SwingLabel::TooFlat) > 0.5);
}

#[test]
fn test_shoulders_first_swing_gets_critical_sequencing_fix() {
    let swing = SyntheticSwing::generate(SwingProfile::rushed(), 7);
    let result = analyze(&swing, baseline_models()).unwrap();
    assert!(result.kinematics.hip_lead_ms < 0.0);

    let sequencing = result
        .feedback
        .recommendations
        .iter()
        .find(|r| r.area == FeedbackArea::Sequencing)
        .expect("sequencing recommendation");
    assert_eq!(sequencing.priority, Priority::Critical);
    assert_eq!(result.feedback.recommendations[0].priority, Priority::Critical);
}

#[test]
fn test_gaps_filled_from_nearby_frames_are_flagged() {
    let mut swing = SyntheticSwing::generate(SwingProfile::good(), 9);
    for (i, pose) in swing.poses.iter_mut().enumerate() {
        if i % 3 == 1 {
            pose.joints.remove(&Joint::LeftShoulder);
        }
    }
    let result = analyze(&swing, baseline_models()).unwrap();
    assert!(result.flags.borrowed_joints.contains(&Joint::LeftShoulder));
    assert!(result.features.as_slice().iter().all(|v| v.is_finite()));
}

#[test]
fn test_progress_is_monotone_and_finishes() {
    let swing = SyntheticSwing::generate(SwingProfile::good(), 3);
    let analyzer = SwingAnalyzer::new(
        AnalyzerConfig::default(),
        baseline_models(),
        Arc::new(swing.pose_track()),
    );
    let seen = Mutex::new(Vec::new());
    let sink = |p: Progress| seen.lock().unwrap().push(p.fraction);
    let source = MemoryFrameSource::new(swing.frames.clone(), swing.fps);
    analyzer.analyze(source, &CancelFlag::new(), &sink).unwrap();

    let seen = seen.into_inner().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[test]
fn test_cancelled_analysis_returns_cancelled() {
    let swing = SyntheticSwing::generate(SwingProfile::good(), 3);
    let analyzer = SwingAnalyzer::new(
        AnalyzerConfig::default(),
        baseline_models(),
        Arc::new(swing.pose_track()),
    );
    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    // Cancel as soon as pose estimation reports progress
    let sink = move |p: Progress| {
        if p.fraction > 0.2 {
            trigger.cancel();
        }
    };
    let source = MemoryFrameSource::new(swing.frames.clone(), swing.fps);
    let err = analyzer.analyze(source, &cancel, &sink).unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled));
}

struct Blind;

impl PoseEstimator for Blind {
    fn name(&self) -> &str {
        "blind"
    }

    fn estimate(
        &self,
        _frame: &openswing::frame::Frame,
    ) -> openswing::Result<Option<openswing::pose::PoseObservation>> {
        Ok(None)
    }
}

#[test]
fn test_no_person_is_tracking_failure() {
    let swing = SyntheticSwing::generate(SwingProfile::good(), 3);
    let analyzer = SwingAnalyzer::new(AnalyzerConfig::default(), baseline_models(), Arc::new(Blind));
    let source = MemoryFrameSource::new(swing.frames, swing.fps);
    let err = analyzer
        .analyze(source, &CancelFlag::new(), &|_| {})
        .unwrap_err();
    assert!(matches!(err, AnalysisError::TrackingFailed(_)));
}

#[test]
fn test_missing_sidecar_is_flagged_in_result() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = ModelArtifact::Linear {
        version: "lin-test".into(),
        layer: DenseLayer {
            weights: vec![vec![0.0; FEATURE_COUNT]; 3],
            bias: vec![0.5, 0.0, 0.0],
        },
    };
    std::fs::write(
        dir.path().join(MODEL_FILE),
        serde_json::to_string(&artifact).unwrap(),
    )
    .unwrap();

    let bundle = ModelBundle::load_dir(dir.path()).unwrap();
    let swing = SyntheticSwing::generate(SwingProfile::good(), 5);
    let result = analyze(&swing, Arc::new(ModelStore::new(bundle))).unwrap();

    assert!(result.flags.used_default_normalization);
    assert_eq!(result.flags.model_version, "lin-test");
    assert_eq!(result.classification.label, SwingLabel::GoodSwing);
}

#[test]
fn test_missing_model_is_model_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelBundle::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, AnalysisError::ModelNotFound(_)));
}

#[test]
fn test_shared_analyzer_serves_concurrent_calls() {
    let good = SyntheticSwing::generate(SwingProfile::good(), 11);
    let analyzer = SwingAnalyzer::new(
        AnalyzerConfig::default(),
        baseline_models(),
        Arc::new(good.pose_track()),
    );

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let source = MemoryFrameSource::new(good.frames.clone(), good.fps);
                let analyzer = &analyzer;
                s.spawn(move || analyzer.analyze(source, &CancelFlag::new(), &|_| {}))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    for r in &results[1..] {
        assert_eq!(r.features, results[0].features);
        assert_eq!(r.phases, results[0].phases);
        assert_eq!(r.classification.label, results[0].classification.label);
    }
}

#[test]
fn test_result_round_trips_into_training_record() {
    let swing = SyntheticSwing::generate(SwingProfile::good(), 2);
    let result = analyze(&swing, baseline_models()).unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let parsed: SwingAnalysisResult = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.features.len(), FEATURE_COUNT);
    assert_eq!(parsed.classification.label, result.classification.label);

    let correction = SwingLabel::ALL
        .into_iter()
        .find(|&l| l != result.classification.label);
    let record = TrainingRecord::from_result(&parsed, correction);
    assert_eq!(record.model_version, "baseline-1");
    assert_eq!(record.user_correction, correction);
}
