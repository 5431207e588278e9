//! Rule-based coaching feedback.
//!
//! Every check compares one raw measurement against fixed thresholds. The same
//! inputs always produce the same report.

use serde::{Deserialize, Serialize};

use crate::carry::{self, ClubType};
use crate::classifier::{ClassificationResult, SwingLabel};
use crate::features::SwingKinematics;
use crate::quality::TrackingQuality;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Club used for yardage estimates
    pub club: ClubType,
    /// Ball speed over club speed; the club's typical value when unset
    pub smash_factor: Option<f64>,
    pub base_score: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            club: ClubType::Driver,
            smash_factor: None,
            base_score: 50.0,
        }
    }
}

/// Declaration order is severity order, so sorting puts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackArea {
    ClubSpeed,
    SwingPlane,
    SwingShape,
    Tempo,
    Sequencing,
    WeightTransfer,
    SpineAngle,
    HeadStability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRecommendation {
    pub area: FeedbackArea,
    pub priority: Priority,
    pub issue: String,
    pub solution: String,
    pub drill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_yardage_gain: Option<f64>,
    /// Percentage points of fairways/greens hit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_accuracy_gain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthArea {
    pub area: FeedbackArea,
    pub description: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliteBenchmark {
    pub metric: String,
    pub unit: String,
    pub user_value: f64,
    pub elite_average: f64,
    pub elite_range: (f64, f64),
    /// 0..=100, never extrapolated
    pub percentile: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeRecommendation {
    pub focus: String,
    pub drill: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub overall_score: f64,
    pub recommendations: Vec<ImprovementRecommendation>,
    pub strengths: Vec<StrengthArea>,
    pub benchmarks: Vec<EliteBenchmark>,
    pub practice_plan: Vec<PracticeRecommendation>,
}

// Check thresholds
const MIN_CLUB_SPEED_MPH: f64 = 85.0;
const STRONG_CLUB_SPEED_MPH: f64 = 105.0;
const PLANE_HIGH: f64 = 0.70;
const PLANE_MEDIUM: f64 = 0.80;
const STRONG_PLANE: f64 = 0.90;
const SHAPE_HIGH_CONFIDENCE: f64 = 0.6;
const SHAPE_CRITICAL_CONFIDENCE: f64 = 0.85;
const TEMPO_OUTER: (f64, f64) = (2.0, 4.0);
const TEMPO_INNER: (f64, f64) = (2.5, 3.5);
const STRONG_TEMPO: (f64, f64) = (2.8, 3.2);
const STRONG_HIP_LEAD_MS: f64 = 20.0;
const MIN_WEIGHT_TRANSFER: f64 = 0.15;
const STRONG_WEIGHT_TRANSFER: f64 = 0.35;
const SPINE_HIGH: f64 = 15.0;
const SPINE_MEDIUM: f64 = 10.0;
const STRONG_SPINE: f64 = 4.0;
const MAX_HEAD_MOVEMENT: f64 = 0.25;

// Score weights
const CRITICAL_PENALTY: f64 = 15.0;
const HIGH_PENALTY: f64 = 8.0;
const GOOD_SWING_BONUS: f64 = 10.0;

/// Percentile by linear interpolation between `floor` (0) and `ceiling` (100).
/// A ceiling below the floor means lower values are better.
pub fn percentile(value: f64, floor: f64, ceiling: f64) -> f64 {
    if !value.is_finite() || (ceiling - floor).abs() < 1e-12 {
        return 0.0;
    }
    ((value - floor) / (ceiling - floor) * 100.0).clamp(0.0, 100.0)
}

/// Tracked measurements that get an elite comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    ClubSpeed,
    PlaneConsistency,
    TempoRatio,
    HipLead,
    WeightTransfer,
    SpineAngleChange,
    HeadMovement,
}

impl Metric {
    fn name(self) -> &'static str {
        match self {
            Metric::ClubSpeed => "club_speed",
            Metric::PlaneConsistency => "plane_consistency",
            Metric::TempoRatio => "tempo_ratio",
            Metric::HipLead => "hip_lead",
            Metric::WeightTransfer => "weight_transfer",
            Metric::SpineAngleChange => "spine_angle_change",
            Metric::HeadMovement => "head_movement",
        }
    }

    fn value(self, k: &SwingKinematics) -> f64 {
        match self {
            Metric::ClubSpeed => k.club_speed_mph,
            Metric::PlaneConsistency => k.plane_consistency,
            Metric::TempoRatio => k.tempo_ratio,
            Metric::HipLead => k.hip_lead_ms,
            Metric::WeightTransfer => k.weight_transfer,
            Metric::SpineAngleChange => k.spine_angle_change,
            Metric::HeadMovement => k.head_movement,
        }
    }

    /// Inside the range no recommendation fires for.
    fn healthy(self, v: f64) -> bool {
        match self {
            Metric::ClubSpeed => v >= MIN_CLUB_SPEED_MPH,
            Metric::PlaneConsistency => v >= PLANE_MEDIUM,
            Metric::TempoRatio => (TEMPO_INNER.0..=TEMPO_INNER.1).contains(&v),
            Metric::HipLead => v >= 0.0,
            Metric::WeightTransfer => v >= MIN_WEIGHT_TRANSFER,
            Metric::SpineAngleChange => v <= SPINE_MEDIUM,
            Metric::HeadMovement => v <= MAX_HEAD_MOVEMENT,
        }
    }
}

struct BenchmarkRule {
    metric: Metric,
    unit: &'static str,
    elite_average: f64,
    elite_range: (f64, f64),
    floor: f64,
    ceiling: f64,
    /// Score bonus while the value stays out of trouble
    bonus: f64,
}

const BENCHMARKS: [BenchmarkRule; 7] = [
    BenchmarkRule {
        metric: Metric::ClubSpeed,
        unit: "mph",
        elite_average: 113.0,
        elite_range: (105.0, 125.0),
        floor: 60.0,
        ceiling: 125.0,
        bonus: 6.0,
    },
    BenchmarkRule {
        metric: Metric::PlaneConsistency,
        unit: "ratio",
        elite_average: 0.92,
        elite_range: (0.88, 0.97),
        floor: 0.4,
        ceiling: 1.0,
        bonus: 6.0,
    },
    BenchmarkRule {
        metric: Metric::TempoRatio,
        unit: "ratio",
        elite_average: 3.0,
        elite_range: (2.8, 3.2),
        // Scored on distance from 3:1
        floor: 1.5,
        ceiling: 0.0,
        bonus: 6.0,
    },
    BenchmarkRule {
        metric: Metric::HipLead,
        unit: "ms",
        elite_average: 40.0,
        elite_range: (20.0, 60.0),
        floor: -50.0,
        ceiling: 50.0,
        bonus: 6.0,
    },
    BenchmarkRule {
        metric: Metric::WeightTransfer,
        unit: "torso lengths",
        elite_average: 0.45,
        elite_range: (0.35, 0.6),
        floor: 0.0,
        ceiling: 0.5,
        bonus: 4.0,
    },
    BenchmarkRule {
        metric: Metric::SpineAngleChange,
        unit: "degrees",
        elite_average: 3.0,
        elite_range: (0.0, 5.0),
        floor: 20.0,
        ceiling: 2.0,
        bonus: 4.0,
    },
    BenchmarkRule {
        metric: Metric::HeadMovement,
        unit: "torso lengths",
        elite_average: 0.08,
        elite_range: (0.0, 0.12),
        floor: 0.4,
        ceiling: 0.05,
        bonus: 3.0,
    },
];

impl BenchmarkRule {
    fn value(&self, k: &SwingKinematics) -> f64 {
        self.metric.value(k)
    }

    fn scored_value(&self, k: &SwingKinematics) -> f64 {
        let v = self.value(k);
        if self.metric == Metric::TempoRatio {
            (v - 3.0).abs()
        } else {
            v
        }
    }

    fn healthy(&self, k: &SwingKinematics) -> bool {
        self.metric.healthy(self.value(k))
    }
}

pub struct FeedbackEngine {
    config: FeedbackConfig,
}

impl FeedbackEngine {
    pub fn new(config: FeedbackConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        kinematics: &SwingKinematics,
        classification: &ClassificationResult,
        quality: &TrackingQuality,
    ) -> FeedbackReport {
        let mut recommendations = Vec::new();
        let mut strengths = Vec::new();

        self.check_club_speed(kinematics, &mut recommendations, &mut strengths);
        check_plane(kinematics, &mut recommendations, &mut strengths);
        check_shape(classification, &mut recommendations);
        check_tempo(kinematics, &mut recommendations, &mut strengths);
        check_sequencing(kinematics, &mut recommendations, &mut strengths);
        check_weight_transfer(kinematics, &mut recommendations, &mut strengths);
        check_spine(kinematics, &mut recommendations, &mut strengths);
        check_head(kinematics, &mut recommendations);

        recommendations.sort_by_key(|r| r.priority);

        let benchmarks = BENCHMARKS
            .iter()
            .map(|rule| EliteBenchmark {
                metric: rule.metric.name().to_string(),
                unit: rule.unit.to_string(),
                user_value: rule.value(kinematics),
                elite_average: rule.elite_average,
                elite_range: rule.elite_range,
                percentile: percentile(rule.scored_value(kinematics), rule.floor, rule.ceiling),
            })
            .collect();

        let overall_score = self.score(kinematics, classification, quality, &recommendations);
        let practice_plan = practice_plan(&recommendations);

        log::info!(
            "[FEEDBACK] Score {:.0}, {} recommendations, {} strengths",
            overall_score,
            recommendations.len(),
            strengths.len()
        );

        FeedbackReport {
            overall_score,
            recommendations,
            strengths,
            benchmarks,
            practice_plan,
        }
    }

    fn score(
        &self,
        kinematics: &SwingKinematics,
        classification: &ClassificationResult,
        quality: &TrackingQuality,
        recommendations: &[ImprovementRecommendation],
    ) -> f64 {
        let bonuses: f64 = BENCHMARKS
            .iter()
            .filter(|rule| rule.healthy(kinematics))
            .map(|rule| rule.bonus)
            .sum();
        let shape_bonus = if classification.label == SwingLabel::GoodSwing {
            GOOD_SWING_BONUS * classification.confidence
        } else {
            0.0
        };
        let penalties: f64 = recommendations
            .iter()
            .map(|r| match r.priority {
                Priority::Critical => CRITICAL_PENALTY,
                Priority::High => HIGH_PENALTY,
                _ => 0.0,
            })
            .sum();

        let raw = (self.config.base_score + bonuses + shape_bonus - penalties) * quality.overall_score;
        if raw.is_finite() {
            raw.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    fn check_club_speed(
        &self,
        k: &SwingKinematics,
        recs: &mut Vec<ImprovementRecommendation>,
        strengths: &mut Vec<StrengthArea>,
    ) {
        let speed = k.club_speed_mph;
        if speed < MIN_CLUB_SPEED_MPH {
            let smash = self
                .config
                .smash_factor
                .unwrap_or_else(|| self.config.club.typical_smash_factor());
            let gain = carry::carry_gain_yards(speed, MIN_CLUB_SPEED_MPH, self.config.club, smash);
            recs.push(ImprovementRecommendation {
                area: FeedbackArea::ClubSpeed,
                priority: Priority::High,
                issue: format!(
                    "Club-head speed at impact is {:.0} mph, below {:.0} mph",
                    speed, MIN_CLUB_SPEED_MPH
                ),
                solution: "Build speed from the ground up: push into the lead leg and let the arms release freely through impact".to_string(),
                drill: "Overspeed swings: 3 sets of 5 alternating a light club and your driver".to_string(),
                estimated_yardage_gain: Some(gain.round()),
                estimated_accuracy_gain: None,
            });
        } else if speed >= STRONG_CLUB_SPEED_MPH {
            strengths.push(StrengthArea {
                area: FeedbackArea::ClubSpeed,
                description: format!("Tour-level club-head speed ({:.0} mph)", speed),
                value: speed,
            });
        }
    }
}

fn check_plane(
    k: &SwingKinematics,
    recs: &mut Vec<ImprovementRecommendation>,
    strengths: &mut Vec<StrengthArea>,
) {
    let plane = k.plane_consistency;
    let priority = if plane < PLANE_HIGH {
        Some(Priority::High)
    } else if plane < PLANE_MEDIUM {
        Some(Priority::Medium)
    } else {
        None
    };
    match priority {
        Some(priority) => recs.push(ImprovementRecommendation {
            area: FeedbackArea::SwingPlane,
            priority,
            issue: format!(
                "Hands leave the backswing path on the way down (consistency {:.2})",
                plane
            ),
            solution: "Start the downswing with the lower body so the hands drop back onto the backswing plane".to_string(),
            drill: "Alignment-stick plane drill: 10 slow swings keeping the shaft parallel to the stick".to_string(),
            estimated_yardage_gain: None,
            estimated_accuracy_gain: Some(((PLANE_MEDIUM - plane) * 50.0).clamp(2.0, 20.0).round()),
        }),
        None if plane >= STRONG_PLANE => strengths.push(StrengthArea {
            area: FeedbackArea::SwingPlane,
            description: format!("Consistent swing plane ({:.2})", plane),
            value: plane,
        }),
        None => {}
    }
}

fn check_shape(classification: &ClassificationResult, recs: &mut Vec<ImprovementRecommendation>) {
    let (issue, solution) = match classification.label {
        SwingLabel::GoodSwing => return,
        SwingLabel::TooSteep => (
            "Swing is too steep: the club approaches the ball from above the plane",
            "Shallow the club in transition by letting the trail elbow drop toward the hip",
        ),
        SwingLabel::TooFlat => (
            "Swing is too flat: the club travels too far around the body",
            "Set the club more upright on the takeaway and keep the hands in front of the chest",
        ),
    };
    if classification.confidence < SHAPE_HIGH_CONFIDENCE {
        return;
    }
    let priority = if classification.confidence >= SHAPE_CRITICAL_CONFIDENCE {
        Priority::Critical
    } else {
        Priority::High
    };
    recs.push(ImprovementRecommendation {
        area: FeedbackArea::SwingShape,
        priority,
        issue: format!("{} ({:.0}% confidence)", issue, classification.confidence * 100.0),
        solution: solution.to_string(),
        drill: "Pump drill: stop at the top, rehearse the first move down twice, then swing".to_string(),
        estimated_yardage_gain: None,
        estimated_accuracy_gain: Some(15.0),
    });
}

fn check_tempo(
    k: &SwingKinematics,
    recs: &mut Vec<ImprovementRecommendation>,
    strengths: &mut Vec<StrengthArea>,
) {
    let tempo = k.tempo_ratio;
    let outside = |range: (f64, f64)| tempo < range.0 || tempo > range.1;
    let priority = if outside(TEMPO_OUTER) {
        Some(Priority::High)
    } else if outside(TEMPO_INNER) {
        Some(Priority::Medium)
    } else {
        None
    };
    match priority {
        Some(priority) => {
            let direction = if tempo < 3.0 { "rushed" } else { "slow" };
            recs.push(ImprovementRecommendation {
                area: FeedbackArea::Tempo,
                priority,
                issue: format!("Tempo ratio {:.1}:1 is {} (target 3:1)", tempo, direction),
                solution: "Match a 3:1 backswing-to-downswing rhythm and let the club finish the backswing".to_string(),
                drill: "Metronome swings at 3:1, 15 reps".to_string(),
                estimated_yardage_gain: None,
                estimated_accuracy_gain: Some(5.0),
            });
        }
        None if (STRONG_TEMPO.0..=STRONG_TEMPO.1).contains(&tempo) => strengths.push(StrengthArea {
            area: FeedbackArea::Tempo,
            description: format!("Smooth tempo ({:.1}:1)", tempo),
            value: tempo,
        }),
        None => {}
    }
}

fn check_sequencing(
    k: &SwingKinematics,
    recs: &mut Vec<ImprovementRecommendation>,
    strengths: &mut Vec<StrengthArea>,
) {
    let lead = k.hip_lead_ms;
    if lead < 0.0 {
        recs.push(ImprovementRecommendation {
            area: FeedbackArea::Sequencing,
            priority: Priority::Critical,
            issue: format!(
                "Shoulders reach peak rotation speed {:.0} ms before the hips",
                -lead
            ),
            solution: "Let the hips start the downswing while the shoulders stay closed".to_string(),
            drill: "Step-through drill: step toward the target with the lead foot to trigger the hips first, 10 reps".to_string(),
            estimated_yardage_gain: Some(10.0),
            estimated_accuracy_gain: Some(10.0),
        });
    } else if lead >= STRONG_HIP_LEAD_MS {
        strengths.push(StrengthArea {
            area: FeedbackArea::Sequencing,
            description: format!("Hips lead the downswing by {:.0} ms", lead),
            value: lead,
        });
    }
}

fn check_weight_transfer(
    k: &SwingKinematics,
    recs: &mut Vec<ImprovementRecommendation>,
    strengths: &mut Vec<StrengthArea>,
) {
    let transfer = k.weight_transfer;
    if transfer < MIN_WEIGHT_TRANSFER {
        recs.push(ImprovementRecommendation {
            area: FeedbackArea::WeightTransfer,
            priority: Priority::High,
            issue: format!(
                "Little weight moves to the lead side ({:.2} torso lengths)",
                transfer
            ),
            solution: "Shift pressure into the lead foot before the arms start down and finish balanced on it".to_string(),
            drill: "Feet-together to split-stance drill, 10 reps".to_string(),
            estimated_yardage_gain: Some(8.0),
            estimated_accuracy_gain: None,
        });
    } else if transfer >= STRONG_WEIGHT_TRANSFER {
        strengths.push(StrengthArea {
            area: FeedbackArea::WeightTransfer,
            description: "Strong weight transfer to the lead side".to_string(),
            value: transfer,
        });
    }
}

fn check_spine(
    k: &SwingKinematics,
    recs: &mut Vec<ImprovementRecommendation>,
    strengths: &mut Vec<StrengthArea>,
) {
    let change = k.spine_angle_change;
    let priority = if change > SPINE_HIGH {
        Some(Priority::High)
    } else if change > SPINE_MEDIUM {
        Some(Priority::Medium)
    } else {
        None
    };
    match priority {
        Some(priority) => recs.push(ImprovementRecommendation {
            area: FeedbackArea::SpineAngle,
            priority,
            issue: format!("Spine angle changes {:.0} degrees between address and impact", change),
            solution: "Keep the chest over the ball and the hips back through impact".to_string(),
            drill: "Chair drill: keep the glutes touching a chair behind you through impact, 10 reps".to_string(),
            estimated_yardage_gain: None,
            estimated_accuracy_gain: Some(8.0),
        }),
        None if change <= STRONG_SPINE => strengths.push(StrengthArea {
            area: FeedbackArea::SpineAngle,
            description: "Spine angle held through impact".to_string(),
            value: change,
        }),
        None => {}
    }
}

fn check_head(k: &SwingKinematics, recs: &mut Vec<ImprovementRecommendation>) {
    if k.head_movement > MAX_HEAD_MOVEMENT {
        recs.push(ImprovementRecommendation {
            area: FeedbackArea::HeadStability,
            priority: Priority::Low,
            issue: format!(
                "Head moves {:.2} torso lengths during the backswing",
                k.head_movement
            ),
            solution: "Turn around a steady head instead of swaying off the ball".to_string(),
            drill: "Shadow drill: keep your head's shadow on a tee during the backswing".to_string(),
            estimated_yardage_gain: None,
            estimated_accuracy_gain: Some(3.0),
        });
    }
}

fn practice_plan(recommendations: &[ImprovementRecommendation]) -> Vec<PracticeRecommendation> {
    if recommendations.is_empty() {
        return vec![PracticeRecommendation {
            focus: "maintenance".to_string(),
            drill: "Half-speed swings at 3:1 tempo, then 10 full swings with a finish hold".to_string(),
            duration_minutes: 15,
        }];
    }
    recommendations
        .iter()
        .take(3)
        .map(|r| PracticeRecommendation {
            focus: serde_json::to_value(r.area)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            drill: r.drill.clone(),
            duration_minutes: match r.priority {
                Priority::Critical => 20,
                Priority::High => 15,
                _ => 10,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_kinematics() -> SwingKinematics {
        SwingKinematics {
            club_speed_mph: 100.0,
            club_speed_estimated: false,
            plane_consistency: 0.85,
            tempo_ratio: 3.0,
            hip_lead_ms: 30.0,
            weight_transfer: 0.3,
            spine_angle_change: 6.0,
            head_movement: 0.1,
        }
    }

    fn classification(label: SwingLabel, confidence: f64) -> ClassificationResult {
        let rest = (1.0 - confidence) / 2.0;
        let logits: Vec<f64> = SwingLabel::ALL
            .iter()
            .map(|&l| if l == label { confidence.ln() } else { rest.ln() })
            .collect();
        ClassificationResult::from_logits(&logits).unwrap()
    }

    fn perfect_quality() -> TrackingQuality {
        TrackingQuality::new(1.0, 1.0, 1.0, 1.0, 0.0)
    }

    fn engine() -> FeedbackEngine {
        FeedbackEngine::new(FeedbackConfig::default())
    }

    #[test]
    fn test_slow_club_speed_is_high_priority() {
        let k = SwingKinematics {
            club_speed_mph: 60.0,
            ..good_kinematics()
        };
        let report = engine().evaluate(&k, &classification(SwingLabel::GoodSwing, 0.8), &perfect_quality());
        let rec = report
            .recommendations
            .iter()
            .find(|r| r.area == FeedbackArea::ClubSpeed)
            .unwrap();
        assert_eq!(rec.priority, Priority::High);
        assert!(rec.estimated_yardage_gain.unwrap() > 0.0);
    }

    #[test]
    fn test_plane_and_tempo_strengths() {
        let k = SwingKinematics {
            plane_consistency: 0.95,
            tempo_ratio: 3.0,
            ..good_kinematics()
        };
        let report = engine().evaluate(&k, &classification(SwingLabel::GoodSwing, 0.8), &perfect_quality());
        let areas: Vec<FeedbackArea> = report.strengths.iter().map(|s| s.area).collect();
        assert!(areas.contains(&FeedbackArea::SwingPlane));
        assert!(areas.contains(&FeedbackArea::Tempo));
    }

    #[test]
    fn test_recommendations_sorted_critical_first() {
        let k = SwingKinematics {
            club_speed_mph: 70.0,
            hip_lead_ms: -30.0,
            head_movement: 0.4,
            plane_consistency: 0.75,
            ..good_kinematics()
        };
        let report = engine().evaluate(&k, &classification(SwingLabel::TooSteep, 0.9), &perfect_quality());
        let priorities: Vec<Priority> = report.recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities.first(), Some(&Priority::Critical));
        assert_eq!(priorities.last(), Some(&Priority::Low));
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(report.practice_plan.len(), 3);
    }

    #[test]
    fn test_low_confidence_shape_is_ignored() {
        let report = engine().evaluate(
            &good_kinematics(),
            &classification(SwingLabel::TooFlat, 0.5),
            &perfect_quality(),
        );
        assert!(!report
            .recommendations
            .iter()
            .any(|r| r.area == FeedbackArea::SwingShape));
    }

    #[test]
    fn test_one_benchmark_per_metric_with_clamped_percentiles() {
        let extreme = SwingKinematics {
            club_speed_mph: 1e6,
            club_speed_estimated: true,
            plane_consistency: -5.0,
            tempo_ratio: 40.0,
            hip_lead_ms: -1e4,
            weight_transfer: 9.0,
            spine_angle_change: 500.0,
            head_movement: -3.0,
        };
        let report = engine().evaluate(&extreme, &classification(SwingLabel::TooSteep, 0.95), &perfect_quality());
        assert_eq!(report.benchmarks.len(), 7);
        assert!(report
            .benchmarks
            .iter()
            .all(|b| (0.0..=100.0).contains(&b.percentile)));
        assert!((0.0..=100.0).contains(&report.overall_score));
    }

    #[test]
    fn test_benchmarks_report_their_own_metric() {
        let k = SwingKinematics {
            club_speed_mph: 101.0,
            club_speed_estimated: false,
            plane_consistency: 0.83,
            tempo_ratio: 2.9,
            hip_lead_ms: 17.0,
            weight_transfer: 0.41,
            spine_angle_change: 6.5,
            head_movement: 0.07,
        };
        let report = engine().evaluate(&k, &classification(SwingLabel::GoodSwing, 0.9), &perfect_quality());
        let value = |name: &str| {
            report
                .benchmarks
                .iter()
                .find(|b| b.metric == name)
                .map(|b| b.user_value)
                .unwrap()
        };
        assert_eq!(value("club_speed"), 101.0);
        assert_eq!(value("plane_consistency"), 0.83);
        assert_eq!(value("tempo_ratio"), 2.9);
        assert_eq!(value("hip_lead"), 17.0);
        assert_eq!(value("weight_transfer"), 0.41);
        assert_eq!(value("spine_angle_change"), 6.5);
        assert_eq!(value("head_movement"), 0.07);
    }

    #[test]
    fn test_score_is_discounted_by_tracking_quality() {
        let c = classification(SwingLabel::GoodSwing, 0.9);
        let full = engine().evaluate(&good_kinematics(), &c, &perfect_quality());
        let half = engine().evaluate(
            &good_kinematics(),
            &c,
            &TrackingQuality::new(0.5, 0.5, 0.5, 0.5, 0.5),
        );
        assert!((half.overall_score - full.overall_score * 0.5).abs() < 1e-9);
        assert!(full.overall_score <= 100.0);
    }

    #[test]
    fn test_clean_swing_gets_maintenance_plan() {
        let report = engine().evaluate(
            &good_kinematics(),
            &classification(SwingLabel::GoodSwing, 0.9),
            &perfect_quality(),
        );
        assert!(report.recommendations.is_empty());
        assert_eq!(report.practice_plan.len(), 1);
        assert_eq!(report.practice_plan[0].focus, "maintenance");
    }

    #[test]
    fn test_percentile_direction() {
        assert_eq!(percentile(125.0, 60.0, 125.0), 100.0);
        assert_eq!(percentile(30.0, 60.0, 125.0), 0.0);
        assert!((percentile(11.0, 20.0, 2.0) - 50.0).abs() < 1e-9);
        assert_eq!(percentile(f64::NAN, 0.0, 1.0), 0.0);
    }
}
