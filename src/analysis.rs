use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::classifier::{ClassificationResult, ModelStore, SwingLabel};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::features::{self, ClipGeometry, FeatureVector, SwingKinematics};
use crate::feedback::{FeedbackEngine, FeedbackReport};
use crate::frame::FrameSource;
use crate::motion::MotionProfile;
use crate::phases::{self, SegmentationFlags, SwingPhases};
use crate::pose::{self, Joint, PoseEstimator};
use crate::quality::{self, TrackingQuality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Decoding,
    Motion,
    Pose,
    Segmentation,
    Features,
    Classification,
    Feedback,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub stage: AnalysisStage,
    /// 0.0..=1.0, never decreasing within one analysis
    pub fraction: f64,
}

/// Shared cancellation signal, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            log::info!("[ANALYZE] Cancelled");
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }
}

/// Forwards progress to the caller, dropping anything that would go backwards.
struct ProgressTracker<'a> {
    sink: &'a (dyn Fn(Progress) + Sync),
    last: Mutex<f64>,
}

impl<'a> ProgressTracker<'a> {
    fn new(sink: &'a (dyn Fn(Progress) + Sync)) -> Self {
        Self {
            sink,
            last: Mutex::new(0.0),
        }
    }

    fn report(&self, stage: AnalysisStage, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if fraction > *last || (fraction == 1.0 && stage == AnalysisStage::Done) {
            *last = fraction;
            (self.sink)(Progress { stage, fraction });
        }
    }
}

/// Where the pipeline fell back to defaults or estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFlags {
    /// Normalization sidecar was missing; probabilities are uncalibrated
    pub used_default_normalization: bool,
    pub normalization_version: Option<String>,
    pub model_version: String,
    pub segmentation: SegmentationFlags,
    pub defaulted_features: Vec<String>,
    /// Joints taken from a neighboring frame because they were missing where needed
    pub borrowed_joints: Vec<Joint>,
    pub club_head_borrowed: bool,
    pub club_speed_estimated: bool,
    /// Frames with a usable pose
    pub pose_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingAnalysisResult {
    pub analyzed_at: DateTime<Utc>,
    pub source: String,
    pub frame_count: usize,
    pub sample_rate: f64,
    pub phases: SwingPhases,
    pub features: FeatureVector,
    pub kinematics: SwingKinematics,
    pub classification: ClassificationResult,
    pub tracking_quality: TrackingQuality,
    pub feedback: FeedbackReport,
    pub flags: AnalysisFlags,
}

/// Runs the full pipeline on one clip per call.
///
/// Holds only shared read-only state, so one analyzer can serve concurrent calls.
pub struct SwingAnalyzer {
    config: AnalyzerConfig,
    models: Arc<ModelStore>,
    estimator: Arc<dyn PoseEstimator>,
    feedback: FeedbackEngine,
}

impl SwingAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        models: Arc<ModelStore>,
        estimator: Arc<dyn PoseEstimator>,
    ) -> Self {
        let feedback = FeedbackEngine::new(config.feedback.clone());
        Self {
            config,
            models,
            estimator,
            feedback,
        }
    }

    pub fn analyze<S: FrameSource>(
        &self,
        source: S,
        cancel: &CancelFlag,
        progress: &(dyn Fn(Progress) + Sync),
    ) -> Result<SwingAnalysisResult> {
        let tracker = ProgressTracker::new(progress);
        let description = source.describe();

        // Decode and reject clips too short to segment
        cancel.check()?;
        log::info!("[DECODE] Decoding {}", description);
        let clip = source
            .decode(self.config.target_fps)?
            .require_frames(self.config.min_frames)?;
        log::info!(
            "[DECODE] {} frames at {:.1} fps ({}x{})",
            clip.len(),
            clip.fps,
            clip.width,
            clip.height
        );
        tracker.report(AnalysisStage::Decoding, 0.15);

        // Frame-to-frame motion drives segmentation
        cancel.check()?;
        let motion = MotionProfile::from_frames(&clip.frames);
        tracker.report(AnalysisStage::Motion, 0.2);

        // Pose per frame, in parallel
        cancel.check()?;
        let total = clip.len();
        let poses = pose::estimate_all(
            self.estimator.as_ref(),
            &clip.frames,
            self.config.min_joint_confidence,
            |done| tracker.report(AnalysisStage::Pose, 0.2 + 0.5 * done as f64 / total as f64),
        )?;
        let pose_frames = poses
            .iter()
            .filter(|p| p.as_ref().is_some_and(|p| p.has_core()))
            .count();
        log::info!(
            "[POSE] {} usable poses in {} frames ({})",
            pose_frames,
            total,
            self.estimator.name()
        );
        // Too few frames with a golfer in them to measure anything
        if (pose_frames as f64) < self.config.min_tracked_fraction * total as f64 {
            return Err(AnalysisError::TrackingFailed(format!(
                "usable pose in only {} of {} frames",
                pose_frames, total
            )));
        }

        // Split into phases
        cancel.check()?;
        let segmentation = phases::segment(&motion, total, &self.config.segmentation)?;
        let phases = segmentation.phases;
        tracker.report(AnalysisStage::Segmentation, 0.75);

        // Features and tracking quality, the last stages that need frames
        cancel.check()?;
        let extraction = features::extract(
            ClipGeometry {
                fps: clip.fps,
                width: clip.width,
                height: clip.height,
            },
            &poses,
            &motion,
            phases,
            &self.config.extraction,
        );
        let tracking_quality = quality::assess(&clip.frames, &poses, &phases, &self.config.quality);
        let sample_rate = clip.fps;
        drop(clip);
        tracker.report(AnalysisStage::Features, 0.85);

        // Classify against one model snapshot
        cancel.check()?;
        let bundle = self.models.snapshot();
        let normalized = bundle.normalization.normalize(&extraction.features);
        let classification = bundle.classifier.predict(&normalized)?;
        log::info!(
            "[CLASSIFY] {} ({:.0}% confidence, model {})",
            classification.label,
            classification.confidence * 100.0,
            bundle.version()
        );
        tracker.report(AnalysisStage::Classification, 0.9);

        // Coaching feedback
        cancel.check()?;
        let feedback = self
            .feedback
            .evaluate(&extraction.kinematics, &classification, &tracking_quality);
        tracker.report(AnalysisStage::Feedback, 0.95);

        // Create result
        let result = SwingAnalysisResult {
            analyzed_at: Utc::now(),
            source: description,
            frame_count: total,
            sample_rate,
            phases,
            features: extraction.features,
            kinematics: extraction.kinematics,
            classification,
            tracking_quality,
            feedback,
            flags: AnalysisFlags {
                used_default_normalization: bundle.used_default_normalization,
                normalization_version: bundle.normalization.version.clone(),
                model_version: bundle.version().to_string(),
                segmentation: segmentation.flags,
                defaulted_features: extraction.defaulted,
                borrowed_joints: extraction.borrowed_joints,
                club_head_borrowed: extraction.club_head_borrowed,
                club_speed_estimated: extraction.kinematics.club_speed_estimated,
                pose_frames,
            },
        };
        tracker.report(AnalysisStage::Done, 1.0);
        Ok(result)
    }
}

impl SwingAnalysisResult {
    pub fn print_summary(&self) {
        let k = &self.kinematics;
        println!();
        println!("{}", "-".repeat(48));
        println!(
            "  Swing:        {} ({:.0}%)",
            self.classification.label,
            self.classification.confidence * 100.0
        );
        println!(
            "  Shape:        good {:.0}% / steep {:.0}% / flat {:.0}%",
            self.classification.probability(SwingLabel::GoodSwing) * 100.0,
            self.classification.probability(SwingLabel::TooSteep) * 100.0,
            self.classification.probability(SwingLabel::TooFlat) * 100.0
        );
        println!("  Score:        {:.0}/100", self.feedback.overall_score);
        println!(
            "  Club Speed:   {:.1} mph{}",
            k.club_speed_mph,
            if k.club_speed_estimated { " (est.)" } else { "" }
        );
        println!("  Tempo:        {:.1}:1", k.tempo_ratio);
        println!("  Hip Lead:     {:.0} ms", k.hip_lead_ms);
        println!("  Plane:        {:.2}", k.plane_consistency);
        println!("  Tracking:     {:.0}%", self.tracking_quality.overall_score * 100.0);
        if !self.flags.borrowed_joints.is_empty() {
            println!(
                "  Note:         gaps in {:?} filled from nearby frames",
                self.flags.borrowed_joints
            );
        }
        if self.flags.used_default_normalization {
            println!("  Note:         default normalization, confidence is uncalibrated");
        }
        for rec in &self.feedback.recommendations {
            println!("  [{:?}] {}", rec.priority, rec.issue);
        }
        for strength in &self.feedback.strengths {
            println!("  [+] {}", strength.description);
        }
        println!("{}", "-".repeat(48));
        println!();
    }
}
