use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::frame::Frame;

/// The 15 body joints the analyzer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Head,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    Pelvis,
}

impl Joint {
    pub const COUNT: usize = 15;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Head,
        Joint::Neck,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
        Joint::Pelvis,
    ];
}

/// Which side of the body faces the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

/// Lead/trail joint pairs resolved for a handedness.
#[derive(Debug, Clone, Copy)]
pub struct Sides {
    pub lead_shoulder: Joint,
    pub trail_shoulder: Joint,
    pub lead_elbow: Joint,
    pub lead_wrist: Joint,
    pub trail_wrist: Joint,
    pub lead_hip: Joint,
    pub trail_hip: Joint,
    pub lead_knee: Joint,
    pub trail_knee: Joint,
    pub lead_ankle: Joint,
    pub trail_ankle: Joint,
}

impl Handedness {
    pub fn sides(self) -> Sides {
        match self {
            Handedness::Right => Sides {
                lead_shoulder: Joint::LeftShoulder,
                trail_shoulder: Joint::RightShoulder,
                lead_elbow: Joint::LeftElbow,
                lead_wrist: Joint::LeftWrist,
                trail_wrist: Joint::RightWrist,
                lead_hip: Joint::LeftHip,
                trail_hip: Joint::RightHip,
                lead_knee: Joint::LeftKnee,
                trail_knee: Joint::RightKnee,
                lead_ankle: Joint::LeftAnkle,
                trail_ankle: Joint::RightAnkle,
            },
            Handedness::Left => Sides {
                lead_shoulder: Joint::RightShoulder,
                trail_shoulder: Joint::LeftShoulder,
                lead_elbow: Joint::RightElbow,
                lead_wrist: Joint::RightWrist,
                trail_wrist: Joint::LeftWrist,
                lead_hip: Joint::RightHip,
                trail_hip: Joint::LeftHip,
                lead_knee: Joint::RightKnee,
                trail_knee: Joint::LeftKnee,
                lead_ankle: Joint::RightAnkle,
                trail_ankle: Joint::LeftAnkle,
            },
        }
    }
}

/// Normalized image position with detector confidence. `(0, 0)` is a valid top-left point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_valid(&self, threshold: f64) -> bool {
        self.confidence >= threshold && self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 3]> for Keypoint {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Keypoint> for [f64; 3] {
    fn from(k: Keypoint) -> Self {
        [k.x, k.y, k.confidence]
    }
}

/// Joints detected in one frame. Undetected joints are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseObservation {
    #[serde(default)]
    pub joints: BTreeMap<Joint, Keypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_head: Option<Keypoint>,
}

impl PoseObservation {
    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.joints.get(&joint)
    }

    /// Drop low-confidence points; `None` if nothing usable is left.
    pub fn filtered(self, min_confidence: f64) -> Option<Self> {
        let joints: BTreeMap<Joint, Keypoint> = self
            .joints
            .into_iter()
            .filter(|(_, k)| k.is_valid(min_confidence))
            .collect();
        let club_head = self.club_head.filter(|k| k.is_valid(min_confidence));
        if joints.is_empty() && club_head.is_none() {
            return None;
        }
        Some(Self { joints, club_head })
    }

    /// Shoulders and hips are the minimum for rotation and phase features.
    pub fn has_core(&self) -> bool {
        [
            Joint::LeftShoulder,
            Joint::RightShoulder,
            Joint::LeftHip,
            Joint::RightHip,
        ]
        .iter()
        .all(|j| self.joints.contains_key(j))
    }
}

/// Per-frame pose detection. Implementations must be shareable across worker threads.
pub trait PoseEstimator: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, frame: &Frame) -> Result<Option<PoseObservation>>;
}

/// Run the estimator over every frame in parallel; output order matches frame order.
///
/// `on_frame` is called once per finished frame with the number completed so far.
pub fn estimate_all<F>(
    estimator: &dyn PoseEstimator,
    frames: &[Frame],
    min_confidence: f64,
    on_frame: F,
) -> Result<Vec<Option<PoseObservation>>>
where
    F: Fn(usize) + Sync,
{
    let done = std::sync::atomic::AtomicUsize::new(0);
    frames
        .par_iter()
        .map(|frame| {
            let pose = estimator
                .estimate(frame)?
                .and_then(|p| p.filtered(min_confidence));
            let n = done.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
            on_frame(n);
            Ok(pose)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEntry {
    pub timestamp: f64,
    #[serde(flatten)]
    pub pose: PoseObservation,
}

/// Keypoints produced offline by an external detector, matched to frames by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseTrack {
    pub frames: Vec<TrackEntry>,
    /// Maximum timestamp distance for a match, in seconds
    #[serde(default = "PoseTrack::default_tolerance")]
    pub tolerance: f64,
}

impl PoseTrack {
    fn default_tolerance() -> f64 {
        0.02
    }

    pub fn new(mut frames: Vec<TrackEntry>, tolerance: f64) -> Self {
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self { frames, tolerance }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let track: PoseTrack = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::InvalidArtifact(format!("pose track {}: {}", path.display(), e))
        })?;
        log::info!(
            "[POSE] Loaded {} tracked frames from {}",
            track.frames.len(),
            path.display()
        );
        Ok(Self::new(track.frames, track.tolerance))
    }

    fn nearest(&self, timestamp: f64) -> Option<&TrackEntry> {
        let idx = self
            .frames
            .partition_point(|e| e.timestamp < timestamp);
        let before = idx.checked_sub(1).and_then(|i| self.frames.get(i));
        let after = self.frames.get(idx);
        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp - b.timestamp <= a.timestamp - timestamp {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        ((best.timestamp - timestamp).abs() <= self.tolerance).then_some(best)
    }
}

impl PoseEstimator for PoseTrack {
    fn name(&self) -> &str {
        "pose-track"
    }

    fn estimate(&self, frame: &Frame) -> Result<Option<PoseObservation>> {
        Ok(self.nearest(frame.timestamp).map(|e| e.pose.clone()))
    }
}
