use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::frame::Frame;
use crate::pose::{Joint, Keypoint, PoseObservation, PoseTrack, TrackEntry};

/// Shape of a simulated swing. Angles in radians, durations in frames.
#[derive(Debug, Clone)]
pub struct SwingProfile {
    pub fps: f64,
    pub address_frames: usize,
    pub backswing_frames: usize,
    pub pause_frames: usize,
    pub downswing_frames: usize,
    pub hold_frames: usize,
    /// Arm angle at the top, measured from hanging straight down
    pub top_angle: f64,
    /// Above 1.0 lifts the hands more vertically (steeper plane)
    pub plane_tilt: f64,
    /// Lateral hand offset during the downswing, in height units (over the top when positive)
    pub downswing_offset: f64,
    /// Hips unwind before the shoulders
    pub hips_lead: bool,
    pub keypoint_jitter: f64,
    pub pixel_noise: u8,
}

impl SwingProfile {
    pub fn good() -> Self {
        Self {
            fps: 30.0,
            address_frames: 10,
            backswing_frames: 24,
            pause_frames: 2,
            downswing_frames: 8,
            hold_frames: 20,
            top_angle: 2.8,
            plane_tilt: 1.0,
            downswing_offset: 0.0,
            hips_lead: true,
            keypoint_jitter: 0.0,
            pixel_noise: 0,
        }
    }

    pub fn steep() -> Self {
        Self {
            plane_tilt: 1.6,
            downswing_offset: 0.08,
            ..Self::good()
        }
    }

    pub fn flat() -> Self {
        Self {
            plane_tilt: 0.7,
            downswing_offset: -0.05,
            ..Self::good()
        }
    }

    /// Quick backswing, shoulders fire first.
    pub fn rushed() -> Self {
        Self {
            backswing_frames: 14,
            downswing_frames: 8,
            hips_lead: false,
            ..Self::good()
        }
    }

    fn follow_frames(&self) -> usize {
        // Match the club's angular speed leaving impact
        let n = FINISH_ANGLE * PI * self.downswing_frames as f64 / (4.0 * self.top_angle);
        n.round().max(4.0) as usize
    }

    pub fn total_frames(&self) -> usize {
        self.address_frames
            + self.backswing_frames
            + self.pause_frames
            + self.downswing_frames
            + self.follow_frames()
            + self.hold_frames
    }

    /// Frame index of the true impact.
    pub fn impact_frame(&self) -> usize {
        self.address_frames + self.backswing_frames + self.pause_frames + self.downswing_frames
    }
}

const FINISH_ANGLE: f64 = 2.6;
const ARM_LENGTH: f64 = 0.28;
const CLUB_LENGTH: f64 = 0.36;
const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 120;

/// Body state at one instant. Angles in degrees for turns, radians for the arm.
#[derive(Debug, Clone, Copy)]
struct BodyState {
    arm: f64,
    hinge: f64,
    shoulder_turn: f64,
    hip_turn: f64,
    hip_shift: f64,
    hand_offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Address,
    Backswing(f64),
    Pause,
    Downswing(f64),
    Follow(f64),
    Hold,
}

fn smooth(u: f64) -> f64 {
    (FRAC_PI_2 * u).sin()
}

impl SwingProfile {
    fn stage(&self, frame: usize) -> Stage {
        let mut start = 0;
        let spans = [
            self.address_frames,
            self.backswing_frames,
            self.pause_frames,
            self.downswing_frames,
            self.follow_frames(),
        ];
        for (n, &len) in spans.iter().enumerate() {
            if frame < start + len || (n == 3 && frame == start + len) {
                let u = (frame - start) as f64 / len.max(1) as f64;
                return match n {
                    0 => Stage::Address,
                    1 => Stage::Backswing(u),
                    2 => Stage::Pause,
                    3 => Stage::Downswing(u),
                    _ => Stage::Follow(u),
                };
            }
            start += len;
        }
        Stage::Hold
    }

    fn body(&self, frame: usize) -> BodyState {
        let top = self.top_angle;
        match self.stage(frame) {
            Stage::Address => BodyState {
                arm: 0.0,
                hinge: 0.0,
                shoulder_turn: 0.0,
                hip_turn: 0.0,
                hip_shift: 0.0,
                hand_offset: 0.0,
            },
            Stage::Backswing(u) => {
                let e = smooth(u);
                BodyState {
                    arm: top * e,
                    hinge: FRAC_PI_2 * e,
                    shoulder_turn: 90.0 * e,
                    hip_turn: 45.0 * e,
                    hip_shift: -0.02 * e,
                    hand_offset: 0.0,
                }
            }
            Stage::Pause => BodyState {
                arm: top,
                hinge: FRAC_PI_2,
                shoulder_turn: 90.0,
                hip_turn: 45.0,
                hip_shift: -0.02,
                hand_offset: 0.0,
            },
            Stage::Downswing(u) => {
                let (fast, slow) = (smooth(u), u * u);
                let (hip_progress, shoulder_progress) = if self.hips_lead {
                    (fast, slow)
                } else {
                    (slow, fast)
                };
                BodyState {
                    arm: top * (1.0 - u * u),
                    hinge: FRAC_PI_2 * (1.0 - u * u * u),
                    shoulder_turn: 90.0 - 115.0 * shoulder_progress,
                    hip_turn: 45.0 - 85.0 * hip_progress,
                    hip_shift: -0.02 + 0.07 * u,
                    hand_offset: self.downswing_offset * (PI * u).sin(),
                }
            }
            Stage::Follow(u) => {
                let e = smooth(u);
                BodyState {
                    arm: -FINISH_ANGLE * e,
                    hinge: 0.0,
                    shoulder_turn: -25.0 - 65.0 * e,
                    hip_turn: -40.0 - 40.0 * e,
                    hip_shift: 0.05 + 0.02 * e,
                    hand_offset: 0.0,
                }
            }
            Stage::Hold => BodyState {
                arm: -FINISH_ANGLE,
                hinge: 0.0,
                shoulder_turn: -90.0,
                hip_turn: -80.0,
                hip_shift: 0.07,
                hand_offset: 0.0,
            },
        }
    }
}

/// Joint positions in height units (x scaled by aspect), before normalization.
struct Skeleton {
    joints: Vec<(Joint, f64, f64)>,
    hands: (f64, f64),
    club: (f64, f64),
}

fn skeleton(profile: &SwingProfile, state: BodyState) -> Skeleton {
    let aspect = FRAME_WIDTH as f64 / FRAME_HEIGHT as f64;
    let cx = 0.5 * aspect;
    let shoulder = (cx + 0.5 * state.hip_shift, 0.32);
    let pelvis = (cx + state.hip_shift, 0.55);
    let ws = 0.10 * state.shoulder_turn.to_radians().cos().abs();
    let wh = 0.07 * state.hip_turn.to_radians().cos().abs();

    let rx = ARM_LENGTH * 1.6 / profile.plane_tilt;
    let hands = (
        shoulder.0 - rx * state.arm.sin() + state.hand_offset,
        shoulder.1 + ARM_LENGTH * state.arm.cos(),
    );
    let psi = state.arm + state.hinge;
    let club = (
        hands.0 - CLUB_LENGTH * psi.sin(),
        hands.1 + CLUB_LENGTH * psi.cos(),
    );

    let lead_shoulder = (shoulder.0 + ws, shoulder.1);
    let trail_shoulder = (shoulder.0 - ws, shoulder.1);
    let lead_wrist = (hands.0 + 0.01, hands.1);
    let trail_wrist = (hands.0 - 0.01, hands.1);
    let elbow = |s: (f64, f64), w: (f64, f64)| ((s.0 + w.0) / 2.0 + 0.005, (s.1 + w.1) / 2.0);
    let knee_shift = 0.6 * state.hip_shift;

    let joints = vec![
        (Joint::Head, cx + 0.2 * state.hip_shift, 0.20),
        (Joint::Neck, shoulder.0, 0.27),
        (Joint::LeftShoulder, lead_shoulder.0, lead_shoulder.1),
        (Joint::RightShoulder, trail_shoulder.0, trail_shoulder.1),
        (
            Joint::LeftElbow,
            elbow(lead_shoulder, lead_wrist).0,
            elbow(lead_shoulder, lead_wrist).1,
        ),
        (
            Joint::RightElbow,
            elbow(trail_shoulder, trail_wrist).0,
            elbow(trail_shoulder, trail_wrist).1,
        ),
        (Joint::LeftWrist, lead_wrist.0, lead_wrist.1),
        (Joint::RightWrist, trail_wrist.0, trail_wrist.1),
        (Joint::LeftHip, pelvis.0 + wh, pelvis.1),
        (Joint::RightHip, pelvis.0 - wh, pelvis.1),
        (Joint::Pelvis, pelvis.0, pelvis.1),
        (Joint::LeftKnee, cx + 0.08 + knee_shift, 0.72),
        (Joint::RightKnee, cx - 0.08 + knee_shift, 0.73),
        (Joint::LeftAnkle, cx + 0.11, 0.90),
        (Joint::RightAnkle, cx - 0.11, 0.90),
    ];

    Skeleton {
        joints,
        hands,
        club,
    }
}

/// A simulated clip plus the pose track a detector would have produced for it.
#[derive(Debug, Clone)]
pub struct SyntheticSwing {
    pub frames: Vec<Frame>,
    pub poses: Vec<PoseObservation>,
    pub fps: f64,
    pub profile: SwingProfile,
}

impl SyntheticSwing {
    pub fn generate(profile: SwingProfile, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let aspect = FRAME_WIDTH as f64 / FRAME_HEIGHT as f64;
        let total = profile.total_frames();

        let mut frames = Vec::with_capacity(total);
        let mut poses = Vec::with_capacity(total);
        for index in 0..total {
            let state = profile.body(index);
            let skel = skeleton(&profile, state);

            let mut pose = PoseObservation::default();
            for &(joint, x, y) in &skel.joints {
                let jx = rng.gen_range(-1.0..=1.0) * profile.keypoint_jitter;
                let jy = rng.gen_range(-1.0..=1.0) * profile.keypoint_jitter;
                pose.joints.insert(
                    joint,
                    Keypoint::new(x / aspect + jx, y + jy, rng.gen_range(0.8..0.98)),
                );
            }
            let (club_x, club_y) = (skel.club.0 / aspect, skel.club.1);
            if (0.0..=1.0).contains(&club_x) && (0.0..=1.0).contains(&club_y) {
                pose.club_head = Some(Keypoint::new(club_x, club_y, rng.gen_range(0.6..0.9)));
            }

            frames.push(Frame {
                image: render(&skel, profile.pixel_noise, &mut rng),
                timestamp: index as f64 / profile.fps,
                index,
            });
            poses.push(pose);
        }

        Self {
            frames,
            poses,
            fps: profile.fps,
            profile,
        }
    }

    pub fn pose_track(&self) -> PoseTrack {
        let entries = self
            .frames
            .iter()
            .zip(&self.poses)
            .map(|(frame, pose)| TrackEntry {
                timestamp: frame.timestamp,
                pose: pose.clone(),
            })
            .collect();
        PoseTrack::new(entries, 0.25 / self.fps)
    }
}

/// Draw the moving parts as soft blobs over a static textured background.
fn render(skel: &Skeleton, noise: u8, rng: &mut StdRng) -> GrayImage {
    let h = FRAME_HEIGHT as f64;
    let mut buf = vec![0.0f64; (FRAME_WIDTH * FRAME_HEIGHT) as usize];
    for y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            let mut v = 90.0 + 40.0 * (y as f64 / h);
            if y > FRAME_HEIGHT * 2 / 3 && ((x / 2 + y / 2) % 2 == 0) {
                v += 25.0; // Turf texture
            }
            buf[(y * FRAME_WIDTH + x) as usize] = v;
        }
    }

    let mut blob = |cx: f64, cy: f64, sigma: f64, amp: f64| {
        let (px, py) = (cx * h, cy * h);
        let reach = 3.0 * sigma;
        let x0 = (px - reach).floor().max(0.0) as u32;
        let x1 = (px + reach).ceil().min(FRAME_WIDTH as f64 - 1.0).max(0.0) as u32;
        let y0 = (py - reach).floor().max(0.0) as u32;
        let y1 = (py + reach).ceil().min(FRAME_HEIGHT as f64 - 1.0).max(0.0) as u32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let d2 = (x as f64 - px).powi(2) + (y as f64 - py).powi(2);
                buf[(y * FRAME_WIDTH + x) as usize] += amp * (-d2 / (2.0 * sigma * sigma)).exp();
            }
        }
    };

    for &(joint, x, y) in &skel.joints {
        if matches!(
            joint,
            Joint::LeftShoulder | Joint::RightShoulder | Joint::LeftHip | Joint::RightHip
        ) {
            blob(x, y, 5.0, 50.0);
        }
    }
    blob(skel.hands.0, skel.hands.1, 4.0, 90.0);
    blob(skel.club.0, skel.club.1, 8.0, 120.0);

    let mut img = GrayImage::new(FRAME_WIDTH, FRAME_HEIGHT);
    for (i, p) in img.pixels_mut().enumerate() {
        let jitter = if noise > 0 {
            rng.gen_range(-(noise as f64)..=noise as f64)
        } else {
            0.0
        };
        *p = Luma([(buf[i] + jitter).round().clamp(0.0, 255.0) as u8]);
    }
    img
}

/// Produces a varied stream of swings for demo mode.
pub struct SwingSimulator {
    rng: StdRng,
    swing_number: u64,
}

impl SwingSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            swing_number: 0,
        }
    }

    pub fn next_swing(&mut self) -> SyntheticSwing {
        self.swing_number += 1;
        let n = self.swing_number;

        let mut profile = if n % 5 == 0 {
            // Every 5th swing comes over the top
            SwingProfile::steep()
        } else if n % 4 == 0 {
            SwingProfile::rushed()
        } else if n % 3 == 0 {
            SwingProfile::flat()
        } else {
            SwingProfile::good()
        };
        profile.top_angle *= self.rng.gen_range(0.93..1.05);
        profile.keypoint_jitter = self.rng.gen_range(0.0..0.003);
        profile.pixel_noise = self.rng.gen_range(0..3);

        log::info!("[MOCK] Simulating swing #{}...", n);
        let seed = self.rng.gen();
        SyntheticSwing::generate(profile, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionProfile;
    use crate::phases::{segment, SegmentationConfig};

    #[test]
    fn test_frame_and_pose_counts_match() {
        let swing = SyntheticSwing::generate(SwingProfile::good(), 1);
        assert_eq!(swing.frames.len(), swing.profile.total_frames());
        assert_eq!(swing.poses.len(), swing.frames.len());
        assert!(swing.frames.len() >= 30);
        assert!(swing.poses.iter().all(|p| p.joints.len() == Joint::COUNT));
    }

    #[test]
    fn test_club_visible_at_impact_not_at_top() {
        let profile = SwingProfile::good();
        let swing = SyntheticSwing::generate(profile.clone(), 2);
        assert!(swing.poses[profile.impact_frame()].club_head.is_some());
        let top = profile.address_frames + profile.backswing_frames;
        assert!(swing.poses[top].club_head.is_none());
    }

    #[test]
    fn test_segmentation_finds_swing_near_truth() {
        let profile = SwingProfile::good();
        let swing = SyntheticSwing::generate(profile.clone(), 3);
        let motion = MotionProfile::from_frames(&swing.frames);
        let seg = segment(&motion, swing.frames.len(), &SegmentationConfig::default()).unwrap();

        assert!(!seg.flags.backswing_start_defaulted);
        let top = profile.address_frames + profile.backswing_frames;
        assert!(seg.phases.top_of_backswing >= top - 2);
        assert!(seg.phases.top_of_backswing <= top + profile.pause_frames);
        // Club motion saturates around impact, so the peak can land a few frames either side
        let impact = profile.impact_frame() as i64;
        assert!((seg.phases.impact as i64 - impact).abs() <= 4, "{:?}", seg.phases);
        assert!(seg.phases.follow_through > seg.phases.impact);
    }

    #[test]
    fn test_same_seed_same_clip() {
        let a = SyntheticSwing::generate(SwingProfile::good(), 9);
        let b = SyntheticSwing::generate(SwingProfile::good(), 9);
        assert_eq!(a.poses, b.poses);
        assert_eq!(a.frames[20].image, b.frames[20].image);
    }

    #[test]
    fn test_simulator_varies_profiles() {
        let mut sim = SwingSimulator::new(42);
        let swings: Vec<SyntheticSwing> = (0..5).map(|_| sim.next_swing()).collect();
        assert!(swings[4].profile.plane_tilt > 1.0);
        assert!(!swings[3].profile.hips_lead);
    }
}
