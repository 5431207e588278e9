use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::phases::SwingPhases;
use crate::pose::{Joint, PoseObservation};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Mean luma range (0..1) considered well exposed
    pub brightness_low: f64,
    pub brightness_high: f64,
    /// Luma standard deviation that counts as full contrast
    pub contrast_reference: f64,
    /// Laplacian variance of a sharp frame, in normalized luma units
    pub sharpness_reference: f64,
    /// Subject height (head to ankles) that fills the frame comfortably
    pub ideal_subject_height: f64,
    /// Frames sampled for the image statistics
    pub sample_frames: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            brightness_low: 0.25,
            brightness_high: 0.75,
            contrast_reference: 0.15,
            sharpness_reference: 0.0015,
            ideal_subject_height: 0.7,
            sample_frames: 8,
        }
    }
}

/// How trustworthy the visual input was, independent of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingQuality {
    pub club_visibility: f64,
    pub body_visibility: f64,
    pub lighting_quality: f64,
    pub camera_angle: f64,
    /// 1.0 is fully blurred
    pub motion_blur: f64,
    pub overall_score: f64,
}

impl TrackingQuality {
    pub fn new(
        club_visibility: f64,
        body_visibility: f64,
        lighting_quality: f64,
        camera_angle: f64,
        motion_blur: f64,
    ) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let (c, b, l, a, m) = (
            clamp(club_visibility),
            clamp(body_visibility),
            clamp(lighting_quality),
            clamp(camera_angle),
            clamp(motion_blur),
        );
        Self {
            club_visibility: c,
            body_visibility: b,
            lighting_quality: l,
            camera_angle: a,
            motion_blur: m,
            overall_score: (c + b + l + a + (1.0 - m)) / 5.0,
        }
    }
}

/// Score the clip's reliability. Never fails; missing data scores low.
pub fn assess(
    frames: &[Frame],
    poses: &[Option<PoseObservation>],
    phases: &SwingPhases,
    config: &QualityConfig,
) -> TrackingQuality {
    let club_visibility = if poses.is_empty() {
        0.0
    } else {
        poses
            .iter()
            .filter(|p| p.as_ref().is_some_and(|p| p.club_head.is_some()))
            .count() as f64
            / poses.len() as f64
    };

    let address = poses.get(phases.address).and_then(Option::as_ref);
    let body_visibility = address.map_or(0.0, |p| p.joints.len() as f64 / Joint::COUNT as f64);

    let samples = sample(frames, config.sample_frames);
    let lighting_quality = mean_of(samples.iter().map(|f| lighting(&f.image, config)));
    let sharpness = mean_of(samples.iter().map(|f| laplacian_variance(&f.image)));
    let motion_blur = if config.sharpness_reference > 0.0 {
        1.0 - (sharpness / config.sharpness_reference).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let camera_angle = address.map_or(0.0, |p| camera_angle(p, config));

    let quality = TrackingQuality::new(
        club_visibility,
        body_visibility,
        lighting_quality,
        camera_angle,
        motion_blur,
    );
    log::debug!("[QUALITY] {:?}", quality);
    quality
}

fn sample(frames: &[Frame], count: usize) -> Vec<&Frame> {
    if frames.is_empty() || count == 0 {
        return Vec::new();
    }
    let step = (frames.len() / count).max(1);
    frames.iter().step_by(step).take(count).collect()
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Exposure inside the window scores 1, falling off linearly to 0 at black/white;
/// scaled down for flat, low-contrast frames.
fn lighting(image: &GrayImage, config: &QualityConfig) -> f64 {
    let n = (image.width() * image.height()) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = image.pixels().map(|p| p[0] as f64).sum::<f64>() / n / 255.0;
    let var = image
        .pixels()
        .map(|p| (p[0] as f64 / 255.0 - mean).powi(2))
        .sum::<f64>()
        / n;

    let exposure = if mean < config.brightness_low {
        mean / config.brightness_low.max(1e-6)
    } else if mean > config.brightness_high {
        (1.0 - mean) / (1.0 - config.brightness_high).max(1e-6)
    } else {
        1.0
    };
    let contrast = (var.sqrt() / config.contrast_reference.max(1e-6)).clamp(0.0, 1.0);
    exposure.clamp(0.0, 1.0) * (0.5 + 0.5 * contrast)
}

/// Variance of the 4-neighbour Laplacian over interior pixels, luma in [0, 1].
fn laplacian_variance(image: &GrayImage) -> f64 {
    let (w, h) = image.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| image.get_pixel(x, y)[0] as f64 / 255.0;
    let mut values = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            values.push(
                px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y),
            );
        }
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Face-on framing: golfer centred, filling a sensible share of the height, shoulders level.
fn camera_angle(pose: &PoseObservation, config: &QualityConfig) -> f64 {
    let mut parts = Vec::with_capacity(3);

    if let (Some(l), Some(r)) = (pose.get(Joint::LeftHip), pose.get(Joint::RightHip)) {
        let centre = (l.x + r.x) / 2.0;
        parts.push(1.0 - ((centre - 0.5).abs() / 0.5).clamp(0.0, 1.0));
    }

    let feet = [Joint::LeftAnkle, Joint::RightAnkle]
        .iter()
        .filter_map(|&j| pose.get(j))
        .map(|k| k.y)
        .fold(None, |m: Option<f64>, y| Some(m.map_or(y, |m| m.max(y))));
    if let (Some(head), Some(feet)) = (pose.get(Joint::Head), feet) {
        let height = (feet - head.y).abs();
        let ideal = config.ideal_subject_height.max(1e-6);
        parts.push(1.0 - ((height - ideal).abs() / ideal).clamp(0.0, 1.0));
    }

    if let (Some(l), Some(r)) = (pose.get(Joint::LeftShoulder), pose.get(Joint::RightShoulder)) {
        let dx = (l.x - r.x).abs().max(1e-6);
        let tilt = (l.y - r.y).abs().atan2(dx).to_degrees();
        parts.push(1.0 - (tilt / 30.0).clamp(0.0, 1.0));
    }

    mean_of(parts.into_iter())
}
