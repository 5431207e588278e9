//! Kinematic feature extraction.
//!
//! Turns per-frame poses plus phase boundaries into the fixed 35-element feature
//! vector the classifier consumes, and the raw kinematics the feedback rules use.
//! Distances are in torso lengths (shoulder midpoint to hip midpoint at address),
//! angles in degrees, durations in seconds.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use crate::error::{AnalysisError, Result};
use crate::geometry::{self, Point};
use crate::motion::MotionProfile;
use crate::phases::SwingPhases;
use crate::pose::{Handedness, Joint, PoseObservation, Sides};

pub const FEATURE_COUNT: usize = 35;

/// Positional names of the feature vector. The order is part of the model contract.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // Setup
    "spine_angle",
    "knee_flexion",
    "weight_distribution",
    "arm_hang_angle",
    "stance_width",
    // Backswing
    "max_shoulder_turn",
    "hip_turn_at_top",
    "x_factor",
    "swing_plane_angle",
    "arm_extension",
    "weight_shift",
    "wrist_hinge",
    "backswing_tempo",
    "head_movement",
    "knee_stability",
    // Transition
    "transition_tempo",
    "hip_lead",
    "weight_transfer_rate",
    "wrist_timing",
    "sequence_efficiency",
    // Downswing
    "hip_rotation_speed",
    "shoulder_rotation_speed",
    "club_path_angle",
    "attack_angle",
    "release_timing",
    "left_side_stability",
    "downswing_tempo",
    "power_generation",
    // Impact and finish
    "impact_position",
    "extension_through_impact",
    "follow_through_balance",
    "finish_quality",
    "overall_tempo",
    "rhythm_consistency",
    "swing_efficiency",
];

/// Population-typical values used when a feature cannot be measured.
const TYPICAL: [f64; FEATURE_COUNT] = [
    12.0,  // spine_angle
    25.0,  // knee_flexion
    50.0,  // weight_distribution
    15.0,  // arm_hang_angle
    1.1,   // stance_width
    85.0,  // max_shoulder_turn
    45.0,  // hip_turn_at_top
    40.0,  // x_factor
    73.0,  // swing_plane_angle
    165.0, // arm_extension
    0.1,   // weight_shift
    85.0,  // wrist_hinge
    0.75,  // backswing_tempo
    0.1,   // head_movement
    6.0,   // knee_stability
    0.08,  // transition_tempo
    30.0,  // hip_lead
    1.5,   // weight_transfer_rate
    0.2,   // wrist_timing
    0.67,  // sequence_efficiency
    400.0, // hip_rotation_speed
    600.0, // shoulder_rotation_speed
    0.0,   // club_path_angle
    -2.0,  // attack_angle
    0.7,   // release_timing
    0.05,  // left_side_stability
    0.25,  // downswing_tempo
    8.0,   // power_generation
    0.1,   // impact_position
    170.0, // extension_through_impact
    0.8,   // follow_through_balance
    0.75,  // finish_quality
    3.0,   // overall_tempo
    0.7,   // rhythm_consistency
    0.5,   // swing_efficiency
];

/// Index into the feature vector by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Feature {
    SpineAngle,
    KneeFlexion,
    WeightDistribution,
    ArmHangAngle,
    StanceWidth,
    MaxShoulderTurn,
    HipTurnAtTop,
    XFactor,
    SwingPlaneAngle,
    ArmExtension,
    WeightShift,
    WristHinge,
    BackswingTempo,
    HeadMovement,
    KneeStability,
    TransitionTempo,
    HipLead,
    WeightTransferRate,
    WristTiming,
    SequenceEfficiency,
    HipRotationSpeed,
    ShoulderRotationSpeed,
    ClubPathAngle,
    AttackAngle,
    ReleaseTiming,
    LeftSideStability,
    DownswingTempo,
    PowerGeneration,
    ImpactPosition,
    ExtensionThroughImpact,
    FollowThroughBalance,
    FinishQuality,
    OverallTempo,
    RhythmConsistency,
    SwingEfficiency,
}

impl Feature {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self as usize]
    }

    pub fn typical(self) -> f64 {
        TYPICAL[self as usize]
    }
}

/// Exactly 35 finite values in `FEATURE_NAMES` order. Serialized as a plain array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() != FEATURE_COUNT {
            return Err(AnalysisError::InvalidFeatureCount {
                expected: FEATURE_COUNT,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// Every feature at its population-typical value.
    pub fn typical() -> Self {
        Self(TYPICAL.to_vec())
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        self.0[feature.index()] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<f64>> for FeatureVector {
    type Error = AnalysisError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<FeatureVector> for Vec<f64> {
    fn from(v: FeatureVector) -> Self {
        v.0
    }
}

/// Raw swing measurements the feedback rules are written against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingKinematics {
    pub club_speed_mph: f64,
    /// Derived from hand speed because the club head was not tracked at impact
    pub club_speed_estimated: bool,
    /// 1.0 when the hands return down the backswing path
    pub plane_consistency: f64,
    pub tempo_ratio: f64,
    /// Hip peak rotation speed ahead of the shoulders' (negative: shoulders first)
    pub hip_lead_ms: f64,
    /// Lateral hip travel toward the target from top to finish, in torso lengths
    pub weight_transfer: f64,
    pub spine_angle_change: f64,
    pub head_movement: f64,
}

impl Default for SwingKinematics {
    fn default() -> Self {
        Self {
            club_speed_mph: 90.0,
            club_speed_estimated: true,
            plane_consistency: 0.8,
            tempo_ratio: Feature::OverallTempo.typical(),
            hip_lead_ms: Feature::HipLead.typical(),
            weight_transfer: 0.3,
            spine_angle_change: 5.0,
            head_movement: Feature::HeadMovement.typical(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub handedness: Handedness,
    /// Real-world torso length used to convert image distances to meters
    pub torso_length_m: f64,
    /// How many frames either side to borrow a missing joint from
    pub joint_search_radius: usize,
    /// Club-head speed over lead-hand speed, used when the club is not tracked
    pub hand_to_club_speed_ratio: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            handedness: Handedness::Right,
            torso_length_m: 0.5,
            joint_search_radius: 2,
            hand_to_club_speed_ratio: 3.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: FeatureVector,
    pub kinematics: SwingKinematics,
    /// Names of measurements that fell back to typical values
    pub defaulted: Vec<String>,
    /// Joints filled in from a neighboring frame at least once
    pub borrowed_joints: Vec<Joint>,
    pub club_head_borrowed: bool,
}

/// Frame geometry the extractor needs from the decoded clip.
#[derive(Debug, Clone, Copy)]
pub struct ClipGeometry {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl ClipGeometry {
    fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

const MPS_TO_MPH: f64 = 2.236_94;
const DEFAULT_TORSO: f64 = 0.25;

/// Joint lookups with nearest-frame fallback. Every fallback hit is remembered.
struct PoseTrackView<'a> {
    poses: &'a [Option<PoseObservation>],
    aspect: f64,
    radius: usize,
    borrowed: RefCell<BTreeSet<Joint>>,
    club_borrowed: Cell<bool>,
}

impl<'a> PoseTrackView<'a> {
    fn new(poses: &'a [Option<PoseObservation>], aspect: f64, radius: usize) -> Self {
        Self {
            poses,
            aspect,
            radius,
            borrowed: RefCell::new(BTreeSet::new()),
            club_borrowed: Cell::new(false),
        }
    }

    fn exact(&self, frame: usize, joint: Joint) -> Option<Point> {
        self.poses
            .get(frame)?
            .as_ref()?
            .get(joint)
            .map(|k| Point::new(k.x * self.aspect, k.y))
    }

    fn joint(&self, frame: usize, joint: Joint) -> Option<Point> {
        if let Some(p) = self.exact(frame, joint) {
            return Some(p);
        }
        let neighbor = (1..=self.radius).find_map(|d| {
            frame
                .checked_sub(d)
                .and_then(|f| self.exact(f, joint))
                .or_else(|| self.exact(frame + d, joint))
        })?;
        self.borrowed.borrow_mut().insert(joint);
        Some(neighbor)
    }

    fn mid(&self, frame: usize, a: Joint, b: Joint) -> Option<Point> {
        Some(self.joint(frame, a)?.midpoint(self.joint(frame, b)?))
    }

    fn span(&self, frame: usize, a: Joint, b: Joint) -> Option<f64> {
        Some(self.joint(frame, a)?.distance(self.joint(frame, b)?))
    }

    fn club_exact(&self, frame: usize) -> Option<Point> {
        self.poses
            .get(frame)?
            .as_ref()?
            .club_head
            .map(|k| Point::new(k.x * self.aspect, k.y))
    }

    fn club(&self, frame: usize) -> Option<Point> {
        if let Some(p) = self.club_exact(frame) {
            return Some(p);
        }
        let neighbor = (1..=self.radius).find_map(|d| {
            frame
                .checked_sub(d)
                .and_then(|f| self.club_exact(f))
                .or_else(|| self.club_exact(frame + d))
        })?;
        self.club_borrowed.set(true);
        Some(neighbor)
    }
}

struct Extractor<'a> {
    track: PoseTrackView<'a>,
    sides: Sides,
    phases: SwingPhases,
    motion: &'a MotionProfile,
    fps: f64,
    config: &'a ExtractionConfig,
    torso: f64,
    lead_dir: f64,
    defaulted: Vec<String>,
}

impl<'a> Extractor<'a> {
    fn or_typical(&mut self, feature: Feature, value: Option<f64>) -> f64 {
        match value {
            Some(v) if v.is_finite() => v,
            _ => {
                self.defaulted.push(feature.name().to_string());
                feature.typical()
            }
        }
    }

    fn or_default(&mut self, name: &str, value: Option<f64>, fallback: f64) -> f64 {
        match value {
            Some(v) if v.is_finite() => v,
            _ => {
                self.defaulted.push(name.to_string());
                fallback
            }
        }
    }

    fn shoulder_mid(&self, frame: usize) -> Option<Point> {
        self.track
            .mid(frame, self.sides.lead_shoulder, self.sides.trail_shoulder)
    }

    fn hip_mid(&self, frame: usize) -> Option<Point> {
        self.track.mid(frame, self.sides.lead_hip, self.sides.trail_hip)
    }

    fn wrist_mid(&self, frame: usize) -> Option<Point> {
        self.track
            .mid(frame, self.sides.lead_wrist, self.sides.trail_wrist)
    }

    fn shoulder_turn(&self, frame: usize) -> Option<f64> {
        let reference = self.track.span(
            self.phases.address,
            self.sides.lead_shoulder,
            self.sides.trail_shoulder,
        )?;
        let width = self
            .track
            .span(frame, self.sides.lead_shoulder, self.sides.trail_shoulder)?;
        Some(geometry::rotation_from_width(width, reference))
    }

    fn hip_turn(&self, frame: usize) -> Option<f64> {
        let reference =
            self.track
                .span(self.phases.address, self.sides.lead_hip, self.sides.trail_hip)?;
        let width = self
            .track
            .span(frame, self.sides.lead_hip, self.sides.trail_hip)?;
        Some(geometry::rotation_from_width(width, reference))
    }

    fn spine_angle(&self, frame: usize) -> Option<f64> {
        Some(geometry::inclination_from_vertical(
            self.hip_mid(frame)?,
            self.shoulder_mid(frame)?,
        ))
    }

    fn knee_flex(&self, frame: usize, hip: Joint, knee: Joint, ankle: Joint) -> Option<f64> {
        Some(
            180.0
                - geometry::angle_at(
                    self.track.joint(frame, hip)?,
                    self.track.joint(frame, knee)?,
                    self.track.joint(frame, ankle)?,
                ),
        )
    }

    fn lead_arm_angle(&self, frame: usize) -> Option<f64> {
        Some(geometry::angle_at(
            self.track.joint(frame, self.sides.lead_shoulder)?,
            self.track.joint(frame, self.sides.lead_elbow)?,
            self.track.joint(frame, self.sides.lead_wrist)?,
        ))
    }

    fn wrist_hinge(&self, frame: usize) -> Option<f64> {
        Some(
            180.0
                - geometry::angle_at(
                    self.track.joint(frame, self.sides.lead_elbow)?,
                    self.track.joint(frame, self.sides.lead_wrist)?,
                    self.track.club(frame)?,
                ),
        )
    }

    /// Per-frame rate of change of a measurement over an inclusive range, in units/s.
    fn rate_series<F>(&self, start: usize, end: usize, measure: F) -> Vec<(usize, f64)>
    where
        F: Fn(&Self, usize) -> Option<f64>,
    {
        let values: Vec<(usize, f64)> = (start..=end)
            .filter_map(|k| measure(self, k).map(|v| (k, v)))
            .collect();
        values
            .windows(2)
            .map(|w| {
                let dt = (w[1].0 - w[0].0) as f64 / self.fps;
                (w[1].0, (w[1].1 - w[0].1).abs() / dt)
            })
            .collect()
    }

    /// Per-frame point speed over an inclusive range, in meters per second.
    fn speed_series<F>(&self, start: usize, end: usize, locate: F) -> Vec<(usize, f64)>
    where
        F: Fn(&Self, usize) -> Option<Point>,
    {
        let meters_per_unit = self.config.torso_length_m / self.torso;
        let points: Vec<(usize, Point)> = (start..=end)
            .filter_map(|k| locate(self, k).map(|p| (k, p)))
            .collect();
        points
            .windows(2)
            .map(|w| {
                let dt = (w[1].0 - w[0].0) as f64 / self.fps;
                (w[1].0, w[1].1.distance(w[0].1) * meters_per_unit / dt)
            })
            .collect()
    }

    fn peak(series: &[(usize, f64)]) -> Option<(usize, f64)> {
        series
            .iter()
            .copied()
            .fold(None, |best, (k, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((k, v)),
            })
    }

    fn run(mut self) -> Extraction {
        let SwingPhases {
            address: a,
            backswing_start: bs,
            top_of_backswing: t,
            downswing_start: ds,
            impact: i,
            follow_through: f,
        } = self.phases;
        let s = self.sides;
        let mut v = vec![0.0; FEATURE_COUNT];

        // Setup
        v[Feature::SpineAngle.index()] = {
            let x = self.spine_angle(a);
            self.or_typical(Feature::SpineAngle, x)
        };
        v[Feature::KneeFlexion.index()] = {
            let legs: Vec<f64> = [
                self.knee_flex(a, s.lead_hip, s.lead_knee, s.lead_ankle),
                self.knee_flex(a, s.trail_hip, s.trail_knee, s.trail_ankle),
            ]
            .into_iter()
            .flatten()
            .collect();
            let x = geometry::mean(&legs);
            self.or_typical(Feature::KneeFlexion, x)
        };
        v[Feature::WeightDistribution.index()] = {
            let x = (|| {
                let hips = self.hip_mid(a)?;
                let lead = self.track.joint(a, s.lead_ankle)?;
                let trail = self.track.joint(a, s.trail_ankle)?;
                let gap = lead.x - trail.x;
                if gap.abs() < 1e-6 {
                    return None;
                }
                Some(((hips.x - trail.x) / gap * 100.0).clamp(0.0, 100.0))
            })();
            self.or_typical(Feature::WeightDistribution, x)
        };
        v[Feature::ArmHangAngle.index()] = {
            let x = (|| {
                Some(geometry::inclination_from_vertical(
                    self.wrist_mid(a)?,
                    self.shoulder_mid(a)?,
                ))
            })();
            self.or_typical(Feature::ArmHangAngle, x)
        };
        v[Feature::StanceWidth.index()] = {
            let x = (|| {
                let feet = self.track.span(a, s.lead_ankle, s.trail_ankle)?;
                let shoulders = self.track.span(a, s.lead_shoulder, s.trail_shoulder)?;
                (shoulders > 1e-6).then(|| feet / shoulders)
            })();
            self.or_typical(Feature::StanceWidth, x)
        };

        // Backswing
        let max_turn = (bs..=t)
            .filter_map(|k| self.shoulder_turn(k))
            .fold(None, |m: Option<f64>, x| Some(m.map_or(x, |m| m.max(x))));
        v[Feature::MaxShoulderTurn.index()] = self.or_typical(Feature::MaxShoulderTurn, max_turn);
        let hip_top = self.hip_turn(t);
        v[Feature::HipTurnAtTop.index()] = self.or_typical(Feature::HipTurnAtTop, hip_top);
        v[Feature::XFactor.index()] = {
            let x = (|| Some(self.shoulder_turn(t)? - self.hip_turn(t)?))();
            self.or_typical(Feature::XFactor, x)
        };
        v[Feature::SwingPlaneAngle.index()] = {
            let x = (|| Some(geometry::steepness(self.wrist_mid(a)?, self.wrist_mid(t)?)))();
            self.or_typical(Feature::SwingPlaneAngle, x)
        };
        v[Feature::ArmExtension.index()] = {
            let x = self.lead_arm_angle(t);
            self.or_typical(Feature::ArmExtension, x)
        };
        v[Feature::WeightShift.index()] = {
            let x = (|| {
                let dx = self.hip_mid(t)?.x - self.hip_mid(a)?.x;
                Some(-dx * self.lead_dir / self.torso)
            })();
            self.or_typical(Feature::WeightShift, x)
        };
        v[Feature::WristHinge.index()] = {
            let x = self.wrist_hinge(t);
            self.or_typical(Feature::WristHinge, x)
        };
        v[Feature::BackswingTempo.index()] = self.phases.backswing_secs(self.fps);
        let head_movement = {
            let x = (|| {
                let start = self.track.joint(a, Joint::Head)?;
                (a..=t)
                    .filter_map(|k| self.track.joint(k, Joint::Head))
                    .map(|p| p.distance(start) / self.torso)
                    .fold(None, |m: Option<f64>, d| Some(m.map_or(d, |m| m.max(d))))
            })();
            self.or_typical(Feature::HeadMovement, x)
        };
        v[Feature::HeadMovement.index()] = head_movement;
        v[Feature::KneeStability.index()] = {
            let x = (|| {
                let top = self.knee_flex(t, s.trail_hip, s.trail_knee, s.trail_ankle)?;
                let start = self.knee_flex(a, s.trail_hip, s.trail_knee, s.trail_ankle)?;
                Some((top - start).abs())
            })();
            self.or_typical(Feature::KneeStability, x)
        };

        // Transition
        v[Feature::TransitionTempo.index()] = self.pause_duration(t);

        // Peak rotation and hand speeds through the downswing
        let hip_speeds = self.rate_series(t, i, |e, k| e.hip_turn(k));
        let shoulder_speeds = self.rate_series(t, i, |e, k| e.shoulder_turn(k));
        let wrist_speeds = self.speed_series(t, f, |e, k| e.track.joint(k, e.sides.lead_wrist));
        let hip_peak = Self::peak(&hip_speeds);
        let shoulder_peak = Self::peak(&shoulder_speeds);
        let wrist_peak = Self::peak(&wrist_speeds);

        // Positive when the hips peak first
        let hip_lead = match (hip_peak, shoulder_peak) {
            (Some((hk, _)), Some((sk, _))) => Some((sk as f64 - hk as f64) / self.fps * 1000.0),
            _ => None,
        };
        v[Feature::HipLead.index()] = self.or_typical(Feature::HipLead, hip_lead);
        v[Feature::WeightTransferRate.index()] = {
            let x = (|| {
                let dx = self.hip_mid(i)?.x - self.hip_mid(t)?.x;
                Some(dx * self.lead_dir / self.torso / self.phases.downswing_secs(self.fps))
            })();
            self.or_typical(Feature::WeightTransferRate, x)
        };
        v[Feature::WristTiming.index()] = {
            let x = wrist_peak.map(|(k, _)| (k as f64 - ds as f64).max(0.0) / self.fps);
            self.or_typical(Feature::WristTiming, x)
        };
        v[Feature::SequenceEfficiency.index()] = {
            let x = match (hip_peak, shoulder_peak, wrist_peak) {
                (Some((h, _)), Some((sh, _)), Some((w, _))) => {
                    let ordered = [h <= sh, sh <= w, h <= w];
                    Some(ordered.iter().filter(|&&ok| ok).count() as f64 / 3.0)
                }
                _ => None,
            };
            self.or_typical(Feature::SequenceEfficiency, x)
        };

        // Downswing
        v[Feature::HipRotationSpeed.index()] =
            self.or_typical(Feature::HipRotationSpeed, hip_peak.map(|(_, s)| s));
        v[Feature::ShoulderRotationSpeed.index()] =
            self.or_typical(Feature::ShoulderRotationSpeed, shoulder_peak.map(|(_, s)| s));
        v[Feature::ClubPathAngle.index()] = {
            let x = (|| {
                let before = self.track.club(i.saturating_sub(1))?;
                let after = self.track.club(i + 1)?;
                let dx = (after.x - before.x) * self.lead_dir;
                let dy = before.y - after.y;
                if dx.abs() < 1e-9 && dy.abs() < 1e-9 {
                    return None;
                }
                Some(dy.atan2(dx).to_degrees())
            })();
            self.or_typical(Feature::ClubPathAngle, x)
        };
        v[Feature::AttackAngle.index()] = {
            let x = (|| {
                let before = self.track.club_exact(i.checked_sub(2)?)?;
                let at = self.track.club_exact(i)?;
                let dx = (at.x - before.x).abs();
                let dy = before.y - at.y; // Positive when rising
                if dx < 1e-9 && dy.abs() < 1e-9 {
                    return None;
                }
                Some(dy.atan2(dx).to_degrees())
            })();
            self.or_typical(Feature::AttackAngle, x)
        };
        v[Feature::ReleaseTiming.index()] = {
            let x = (|| {
                let top_hinge = self.wrist_hinge(t)?;
                if top_hinge <= 1e-6 || i <= t {
                    return None;
                }
                let released = (t..=i).find(|&k| {
                    self.wrist_hinge(k)
                        .map(|h| h < 0.5 * top_hinge)
                        .unwrap_or(false)
                })?;
                Some((released - t) as f64 / (i - t) as f64)
            })();
            self.or_typical(Feature::ReleaseTiming, x)
        };
        v[Feature::LeftSideStability.index()] = {
            let x = (|| {
                let top = self.track.joint(t, s.lead_knee)?;
                let impact = self.track.joint(i, s.lead_knee)?;
                Some((impact.x - top.x).abs() / self.torso)
            })();
            self.or_typical(Feature::LeftSideStability, x)
        };
        v[Feature::DownswingTempo.index()] = self.phases.downswing_secs(self.fps);
        // Hand speed before impact only
        let downswing_hand_peak = Self::peak(
            &wrist_speeds
                .iter()
                .copied()
                .filter(|&(k, _)| k <= i)
                .collect::<Vec<_>>(),
        );
        v[Feature::PowerGeneration.index()] =
            self.or_typical(Feature::PowerGeneration, downswing_hand_peak.map(|(_, s)| s));

        // Impact and finish
        v[Feature::ImpactPosition.index()] = {
            let x = (|| {
                let dx = self.wrist_mid(i)?.x - self.wrist_mid(a)?.x;
                Some(dx * self.lead_dir / self.torso)
            })();
            self.or_typical(Feature::ImpactPosition, x)
        };
        v[Feature::ExtensionThroughImpact.index()] = {
            let angles: Vec<f64> = (i..=(i + 3).min(f.max(i)))
                .filter_map(|k| self.lead_arm_angle(k))
                .collect();
            let x = geometry::mean(&angles);
            self.or_typical(Feature::ExtensionThroughImpact, x)
        };
        let balance = {
            let x = (|| {
                let feet = self.track.mid(f, s.lead_ankle, s.trail_ankle)?;
                let stance = self.track.span(f, s.lead_ankle, s.trail_ankle)?;
                let upper = self.track.joint(f, Joint::Head).or_else(|| self.shoulder_mid(f))?;
                let half = (stance / 2.0).max(1e-3);
                Some(1.0 - ((upper.x - feet.x).abs() / half).clamp(0.0, 1.0))
            })();
            self.or_typical(Feature::FollowThroughBalance, x)
        };
        v[Feature::FollowThroughBalance.index()] = balance;
        v[Feature::FinishQuality.index()] = {
            let x = (|| {
                let turn = self.hip_turn(f)?.min(90.0) / 90.0;
                let leg = geometry::angle_at(
                    self.track.joint(f, s.lead_hip)?,
                    self.track.joint(f, s.lead_knee)?,
                    self.track.joint(f, s.lead_ankle)?,
                ) / 180.0;
                Some(0.5 * turn + 0.5 * leg)
            })();
            self.or_typical(Feature::FinishQuality, x)
        };
        v[Feature::OverallTempo.index()] = self.phases.tempo_ratio(self.fps);
        v[Feature::RhythmConsistency.index()] = {
            let x = self.rhythm(bs, f);
            self.or_typical(Feature::RhythmConsistency, x)
        };
        v[Feature::SwingEfficiency.index()] = v[Feature::SequenceEfficiency.index()]
            * balance
            * (1.0 - head_movement.clamp(0.0, 1.0));

        // Raw values for the feedback rules
        let kinematics = self.kinematics(&v, i, &wrist_speeds);
        let features = FeatureVector(v);
        let borrowed_joints = self.track.borrowed.take().into_iter().collect();
        Extraction {
            features,
            kinematics,
            defaulted: self.defaulted,
            borrowed_joints,
            club_head_borrowed: self.track.club_borrowed.get(),
        }
    }

    /// Time spent near the motion minimum around the top of the backswing.
    fn pause_duration(&self, top: usize) -> f64 {
        if self.motion.is_empty() {
            return 1.0 / self.fps;
        }
        let top = top.min(self.motion.len() - 1);
        let limit = self.motion.get(top) * 1.25 + 1e-4;
        let mut start = top;
        while start > 0 && self.motion.get(start - 1) <= limit {
            start -= 1;
        }
        let mut end = top;
        while end + 1 < self.motion.len() && self.motion.get(end + 1) <= limit {
            end += 1;
        }
        (end - start + 1) as f64 / self.fps
    }

    /// 1.0 for a smooth motion envelope, lower when it jerks between samples.
    fn rhythm(&self, start: usize, end: usize) -> Option<f64> {
        let m = self.motion.magnitudes();
        if m.is_empty() {
            return None;
        }
        let end = end.min(m.len() - 1);
        if end < start + 2 {
            return None;
        }
        let window = &m[start..=end];
        let mean = geometry::mean(window)?;
        if mean <= 1e-9 {
            return None;
        }
        let jerk: Vec<f64> = window
            .windows(3)
            .map(|w| (w[2] - 2.0 * w[1] + w[0]).abs())
            .collect();
        Some(1.0 - (geometry::mean(&jerk)? / mean).clamp(0.0, 1.0))
    }

    fn kinematics(&mut self, v: &[f64], impact: usize, wrist_speeds: &[(usize, f64)]) -> SwingKinematics {
        let a = self.phases.address;
        let t = self.phases.top_of_backswing;
        let f = self.phases.follow_through;

        // Club speed from the tracked head, else from the hands
        let lo = impact.saturating_sub(2);
        let club_speeds = self.speed_series(lo, impact + 2, |e, k| e.track.club_exact(k));
        let (club_speed, estimated) = match Self::peak(&club_speeds) {
            Some((_, mps)) => (Some(mps * MPS_TO_MPH), false),
            None => {
                let hand = wrist_speeds
                    .iter()
                    .filter(|(k, _)| *k >= lo && *k <= impact + 2)
                    .map(|&(_, s)| s)
                    .fold(None, |m: Option<f64>, s| Some(m.map_or(s, |m| m.max(s))));
                (
                    hand.map(|mps| mps * self.config.hand_to_club_speed_ratio * MPS_TO_MPH),
                    true,
                )
            }
        };
        let club_speed_mph = self.or_default(
            "club_speed",
            club_speed,
            SwingKinematics::default().club_speed_mph,
        );

        let plane = self.plane_consistency();
        let plane_consistency = self.or_default(
            "plane_consistency",
            plane,
            SwingKinematics::default().plane_consistency,
        );

        let transfer = (|| {
            let dx = self.hip_mid(f)?.x - self.hip_mid(t)?.x;
            Some(dx * self.lead_dir / self.torso)
        })();
        let weight_transfer = self.or_default(
            "weight_transfer",
            transfer,
            SwingKinematics::default().weight_transfer,
        );

        let spine = (|| Some((self.spine_angle(impact)? - self.spine_angle(a)?).abs()))();
        let spine_angle_change = self.or_default(
            "spine_angle_change",
            spine,
            SwingKinematics::default().spine_angle_change,
        );

        SwingKinematics {
            club_speed_mph,
            club_speed_estimated: estimated,
            plane_consistency,
            tempo_ratio: v[Feature::OverallTempo.index()],
            hip_lead_ms: v[Feature::HipLead.index()],
            weight_transfer,
            spine_angle_change,
            head_movement: v[Feature::HeadMovement.index()],
        }
    }

    /// How closely the downswing hand path retraces the backswing path.
    fn plane_consistency(&self) -> Option<f64> {
        let SwingPhases {
            backswing_start: bs,
            top_of_backswing: t,
            impact: i,
            ..
        } = self.phases;
        let up: Vec<Point> = (bs..=t).filter_map(|k| self.wrist_mid(k)).collect();
        let down: Vec<Point> = (t..=i).filter_map(|k| self.wrist_mid(k)).collect();
        if up.len() < 2 || down.len() < 2 {
            return None;
        }
        let deviations: Vec<f64> = down
            .iter()
            .map(|&p| {
                up.windows(2)
                    .map(|seg| geometry::distance_to_segment(p, seg[0], seg[1]))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let mean = geometry::mean(&deviations)? / self.torso;
        Some((1.0 - mean / 0.5).clamp(0.0, 1.0))
    }
}

/// Compute the feature vector and raw kinematics for one segmented clip.
///
/// `poses` holds one entry per frame. Missing joints borrow from the nearest frame
/// within the configured radius before falling back to typical values, so the
/// vector is always complete and finite.
pub fn extract(
    geometry: ClipGeometry,
    poses: &[Option<PoseObservation>],
    motion: &MotionProfile,
    phases: SwingPhases,
    config: &ExtractionConfig,
) -> Extraction {
    let track = PoseTrackView::new(poses, geometry.aspect(), config.joint_search_radius);
    let sides = config.handedness.sides();
    let a = phases.address;

    // Body scale at address
    let mut defaulted = Vec::new();
    let torso = match track
        .mid(a, sides.lead_shoulder, sides.trail_shoulder)
        .zip(track.mid(a, sides.lead_hip, sides.trail_hip))
        .map(|(s, h)| s.distance(h))
    {
        Some(d) if d > 1e-3 => d,
        _ => {
            defaulted.push("torso_length".to_string());
            DEFAULT_TORSO
        }
    };

    // Image x of the target side relative to the trail side
    let lead_dir = track
        .joint(a, sides.lead_ankle)
        .zip(track.joint(a, sides.trail_ankle))
        .or_else(|| {
            track
                .joint(a, sides.lead_shoulder)
                .zip(track.joint(a, sides.trail_shoulder))
        })
        .map(|(lead, trail)| if lead.x >= trail.x { 1.0 } else { -1.0 })
        .unwrap_or(1.0);

    let extractor = Extractor {
        track,
        sides,
        phases,
        motion,
        fps: geometry.fps.max(1.0),
        config,
        torso,
        lead_dir,
        defaulted,
    };
    let extraction = extractor.run();

    if !extraction.defaulted.is_empty() {
        log::warn!(
            "[FEATURES] {} measurements used typical values: {}",
            extraction.defaulted.len(),
            extraction.defaulted.join(", ")
        );
    }
    if !extraction.borrowed_joints.is_empty() || extraction.club_head_borrowed {
        log::info!(
            "[FEATURES] Filled gaps from neighboring frames: joints {:?}, club head {}",
            extraction.borrowed_joints,
            extraction.club_head_borrowed
        );
    }
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SwingProfile, SyntheticSwing};

    fn geometry() -> ClipGeometry {
        ClipGeometry {
            fps: 30.0,
            width: 160,
            height: 120,
        }
    }

    /// Phase boundaries as the simulator laid them out.
    fn true_phases(profile: &SwingProfile) -> SwingPhases {
        let bs = profile.address_frames;
        let top = bs + profile.backswing_frames + profile.pause_frames - 1;
        let impact = profile.impact_frame();
        SwingPhases {
            address: 0,
            backswing_start: bs,
            top_of_backswing: top,
            downswing_start: top + 1,
            impact,
            follow_through: impact + 6,
        }
    }

    fn run(profile: SwingProfile) -> Extraction {
        let phases = true_phases(&profile);
        let swing = SyntheticSwing::generate(profile, 11);
        let poses: Vec<Option<PoseObservation>> = swing.poses.iter().cloned().map(Some).collect();
        let motion = MotionProfile::from_frames(&swing.frames);
        extract(geometry(), &poses, &motion, phases, &ExtractionConfig::default())
    }

    #[test]
    fn test_names_and_typicals_align() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        assert_eq!(Feature::SwingEfficiency.index(), FEATURE_COUNT - 1);
        assert_eq!(Feature::PowerGeneration.name(), "power_generation");
        assert_eq!(FeatureVector::typical().len(), FEATURE_COUNT);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let err = FeatureVector::new(vec![0.0; 34]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidFeatureCount {
                expected: 35,
                actual: 34
            }
        ));
        assert!(serde_json::from_str::<FeatureVector>("[1.0, 2.0]").is_err());
    }

    #[test]
    fn test_synthetic_swing_yields_complete_vector() {
        let extraction = run(SwingProfile::good());
        let features = &extraction.features;
        assert_eq!(features.len(), FEATURE_COUNT);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
        assert!(!extraction.defaulted.iter().any(|d| d == "torso_length"));

        let k = extraction.kinematics;
        assert!(!k.club_speed_estimated);
        assert!(k.club_speed_mph > 0.0);
        assert!(k.hip_lead_ms > 0.0, "hips should unwind first: {:?}", k);
        assert!(k.weight_transfer > 0.0);
        assert!(features.get(Feature::MaxShoulderTurn) > 60.0);
    }

    #[test]
    fn test_shoulders_first_gives_negative_hip_lead() {
        let extraction = run(SwingProfile::rushed());
        assert!(extraction.kinematics.hip_lead_ms < 0.0);
        assert!(extraction.kinematics.tempo_ratio < 2.5);
    }

    #[test]
    fn test_no_poses_falls_back_to_typical_values() {
        let profile = SwingProfile::good();
        let phases = true_phases(&profile);
        let poses = vec![None; profile.total_frames()];
        let motion = MotionProfile::from_magnitudes(&vec![0.01; profile.total_frames() - 1]);
        let extraction = extract(geometry(), &poses, &motion, phases, &ExtractionConfig::default());

        assert!(extraction.features.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(
            extraction.features.get(Feature::SpineAngle),
            Feature::SpineAngle.typical()
        );
        assert!(extraction.defaulted.iter().any(|d| d == "torso_length"));
        assert!(extraction.defaulted.iter().any(|d| d == "spine_angle"));
        assert!(extraction.kinematics.club_speed_estimated);
        assert_eq!(
            extraction.kinematics.club_speed_mph,
            SwingKinematics::default().club_speed_mph
        );
    }

    #[test]
    fn test_missing_joint_borrows_from_neighbor_frame() {
        let profile = SwingProfile::good();
        let phases = true_phases(&profile);
        let swing = SyntheticSwing::generate(profile, 5);
        let motion = MotionProfile::from_frames(&swing.frames);
        let full: Vec<Option<PoseObservation>> = swing.poses.iter().cloned().map(Some).collect();
        let mut gappy = full.clone();
        if let Some(pose) = gappy[0].as_mut() {
            pose.joints.remove(&Joint::LeftShoulder);
        }

        let config = ExtractionConfig::default();
        let a = extract(geometry(), &full, &motion, phases, &config);
        let b = extract(geometry(), &gappy, &motion, phases, &config);
        assert!(!b.defaulted.iter().any(|d| d == "spine_angle"));
        assert!(
            (a.features.get(Feature::SpineAngle) - b.features.get(Feature::SpineAngle)).abs()
                < 1e-9
        );
        assert!(a.borrowed_joints.is_empty());
        assert_eq!(b.borrowed_joints, vec![Joint::LeftShoulder]);
    }

    #[test]
    fn test_gaps_at_key_frames_are_recorded() {
        let profile = SwingProfile::good();
        let phases = true_phases(&profile);
        let swing = SyntheticSwing::generate(profile, 5);
        let motion = MotionProfile::from_frames(&swing.frames);
        let mut poses: Vec<Option<PoseObservation>> =
            swing.poses.iter().cloned().map(Some).collect();
        for frame in [phases.address, phases.top_of_backswing, phases.impact] {
            if let Some(pose) = poses[frame].as_mut() {
                pose.joints.remove(&Joint::LeftShoulder);
                pose.joints.remove(&Joint::LeftHip);
            }
        }

        let extraction = extract(geometry(), &poses, &motion, phases, &ExtractionConfig::default());
        assert!(extraction.borrowed_joints.contains(&Joint::LeftShoulder));
        assert!(extraction.borrowed_joints.contains(&Joint::LeftHip));
        assert!(!extraction.borrowed_joints.contains(&Joint::RightShoulder));
        assert!(!extraction.defaulted.iter().any(|d| d == "torso_length"));
    }
}
