use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::motion::MotionProfile;

/// Tunable thresholds for breakpoint detection over the motion series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Backswing starts where motion jumps by more than this factor over the previous sample
    pub onset_ratio: f64,
    /// Motion below this is sensor/compression noise
    pub noise_floor: f64,
    /// Used when no onset is found in the first third of the clip
    pub default_backswing_start: usize,
    /// Samples after backswing start searched for the pause at the top
    pub top_window: usize,
    /// Samples after downswing start searched for peak motion
    pub impact_window: usize,
    /// Follow-through begins once motion falls below this fraction of impact motion
    pub follow_through_ratio: f64,
    pub follow_through_default_offset: usize,
    /// Treat any defaulted breakpoint as a tracking failure instead of degrading
    pub strict: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            onset_ratio: 1.5,
            noise_floor: 1e-3,
            default_backswing_start: 10,
            top_window: 30,
            impact_window: 20,
            follow_through_ratio: 0.3,
            follow_through_default_offset: 30,
            strict: false,
        }
    }
}

/// Frame indices of the six swing phases, monotone non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwingPhases {
    pub address: usize,
    pub backswing_start: usize,
    pub top_of_backswing: usize,
    pub downswing_start: usize,
    pub impact: usize,
    pub follow_through: usize,
}

impl SwingPhases {
    pub fn as_array(&self) -> [usize; 6] {
        [
            self.address,
            self.backswing_start,
            self.top_of_backswing,
            self.downswing_start,
            self.impact,
            self.follow_through,
        ]
    }

    pub fn is_monotonic(&self) -> bool {
        self.as_array().windows(2).all(|w| w[0] <= w[1])
    }

    /// Takeaway to top, in seconds (at least one frame).
    pub fn backswing_secs(&self, fps: f64) -> f64 {
        frames_to_secs(self.top_of_backswing.saturating_sub(self.backswing_start), fps)
    }

    /// Top to impact, in seconds (at least one frame).
    pub fn downswing_secs(&self, fps: f64) -> f64 {
        frames_to_secs(self.impact.saturating_sub(self.top_of_backswing), fps)
    }

    pub fn tempo_ratio(&self, fps: f64) -> f64 {
        self.backswing_secs(fps) / self.downswing_secs(fps)
    }
}

fn frames_to_secs(frames: usize, fps: f64) -> f64 {
    frames.max(1) as f64 / fps.max(1.0)
}

/// Which breakpoints were not detected and fell back to configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationFlags {
    pub backswing_start_defaulted: bool,
    pub top_defaulted: bool,
    pub follow_through_defaulted: bool,
    /// Some index ran past the end of the clip and was pulled back
    pub clamped: bool,
}

impl SegmentationFlags {
    pub fn any_defaulted(&self) -> bool {
        self.backswing_start_defaulted || self.top_defaulted || self.follow_through_defaulted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segmentation {
    pub phases: SwingPhases,
    pub flags: SegmentationFlags,
}

/// Split a clip of `frame_count` frames into swing phases from its motion profile.
///
/// Short clips are clamped rather than rejected unless `config.strict` is set.
pub fn segment(
    motion: &MotionProfile,
    frame_count: usize,
    config: &SegmentationConfig,
) -> Result<Segmentation> {
    let m = motion.magnitudes();
    let last_frame = frame_count.saturating_sub(1);
    let mut flags = SegmentationFlags::default();

    if m.is_empty() {
        flags = SegmentationFlags {
            backswing_start_defaulted: true,
            top_defaulted: true,
            follow_through_defaulted: true,
            clamped: true,
        };
        return finish(SwingPhases::at(0), flags, config);
    }
    let last_sample = m.len() - 1;

    let backswing_start = match find_onset(&m, config) {
        Some(i) => i,
        None => {
            flags.backswing_start_defaulted = true;
            config.default_backswing_start
        }
    };
    let backswing_start = clamp_to(backswing_start, last_sample, &mut flags);

    let top_start = backswing_start + 1;
    let top_end = (backswing_start + config.top_window).min(last_sample);
    let top_of_backswing = if top_start > top_end {
        flags.clamped = true;
        backswing_start
    } else {
        match deepest_local_minimum(&m, top_start, top_end) {
            Some(i) => i,
            None => {
                flags.top_defaulted = true;
                argmin(&m, top_start, top_end)
            }
        }
    };

    let downswing_start = clamp_to(top_of_backswing + 1, last_sample, &mut flags);

    let impact_end = (downswing_start + config.impact_window).min(last_sample);
    let impact = argmax(&m, downswing_start, impact_end);

    let threshold = config.follow_through_ratio * m[impact];
    let follow_through = match ((impact + 1)..m.len()).find(|&i| m[i] < threshold) {
        Some(i) => i,
        None => {
            flags.follow_through_defaulted = true;
            impact + config.follow_through_default_offset
        }
    };
    let follow_through = clamp_to(follow_through, last_sample, &mut flags);

    let mut phases = SwingPhases {
        address: 0,
        backswing_start,
        top_of_backswing,
        downswing_start,
        impact,
        follow_through,
    };
    enforce_bounds(&mut phases, last_frame, &mut flags);

    log::debug!(
        "[SEGMENT] address={} backswing={} top={} downswing={} impact={} finish={} ({:?})",
        phases.address,
        phases.backswing_start,
        phases.top_of_backswing,
        phases.downswing_start,
        phases.impact,
        phases.follow_through,
        flags
    );

    finish(phases, flags, config)
}

impl SwingPhases {
    fn at(index: usize) -> Self {
        Self {
            address: index,
            backswing_start: index,
            top_of_backswing: index,
            downswing_start: index,
            impact: index,
            follow_through: index,
        }
    }
}

fn finish(
    phases: SwingPhases,
    flags: SegmentationFlags,
    config: &SegmentationConfig,
) -> Result<Segmentation> {
    if config.strict && flags.any_defaulted() {
        return Err(AnalysisError::TrackingFailed(format!(
            "swing phases could not be detected ({:?})",
            flags
        )));
    }
    if flags.any_defaulted() {
        log::warn!("[SEGMENT] Using default breakpoints: {:?}", flags);
    }
    Ok(Segmentation { phases, flags })
}

fn clamp_to(index: usize, max: usize, flags: &mut SegmentationFlags) -> usize {
    if index > max {
        flags.clamped = true;
        max
    } else {
        index
    }
}

fn enforce_bounds(phases: &mut SwingPhases, last_frame: usize, flags: &mut SegmentationFlags) {
    let mut floor = 0;
    for slot in [
        &mut phases.address,
        &mut phases.backswing_start,
        &mut phases.top_of_backswing,
        &mut phases.downswing_start,
        &mut phases.impact,
        &mut phases.follow_through,
    ] {
        let value = (*slot).max(floor).min(last_frame);
        if value != *slot {
            flags.clamped = true;
        }
        *slot = value;
        floor = value;
    }
}

/// First sustained acceleration within the first third of the series.
fn find_onset(m: &[f64], config: &SegmentationConfig) -> Option<usize> {
    let limit = (m.len() / 3).max(1).min(m.len() - 1);
    (1..=limit).find(|&i| m[i] > config.onset_ratio * m[i - 1] && m[i] > config.noise_floor)
}

fn deepest_local_minimum(m: &[f64], start: usize, end: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in start.max(1)..=end {
        if i + 1 >= m.len() {
            break;
        }
        if m[i] <= m[i - 1] && m[i] < m[i + 1] {
            match best {
                Some(b) if m[b] <= m[i] => {}
                _ => best = Some(i),
            }
        }
    }
    best
}

fn argmin(m: &[f64], start: usize, end: usize) -> usize {
    (start..=end).fold(start, |best, i| if m[i] < m[best] { i } else { best })
}

fn argmax(m: &[f64], start: usize, end: usize) -> usize {
    if start > end {
        return start.min(m.len() - 1);
    }
    (start..=end).fold(start, |best, i| if m[i] > m[best] { i } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    /// Rise, fall to a single pause, rise to a single peak, decay.
    fn swing_wave() -> Vec<f64> {
        (0..60)
            .map(|i| match i {
                0..=12 => 0.02 + 0.05 * i as f64,
                13..=24 => 0.62 - 0.05 * (i - 12) as f64,
                25..=36 => 0.02 + 0.08 * (i - 24) as f64,
                _ => 0.98 - 0.04 * (i - 36) as f64,
            })
            .collect()
    }

    #[test]
    fn test_triangle_wave_top_and_impact() {
        let m = swing_wave();
        let config = SegmentationConfig::default();
        let seg = segment(&MotionProfile::from_magnitudes(&m), m.len() + 1, &config).unwrap();
        let p = seg.phases;

        let interior_min = (1..m.len() - 1)
            .filter(|&i| m[i] < m[i - 1] && m[i] < m[i + 1])
            .collect::<Vec<_>>();
        assert_eq!(interior_min, vec![24]);

        assert_eq!(p.backswing_start, 1);
        assert_eq!(p.top_of_backswing, 24);
        assert_eq!(p.downswing_start, 25);
        assert_eq!(p.impact, 36);
        assert!(p.top_of_backswing <= p.backswing_start + config.top_window);
        assert!(p.impact <= p.downswing_start + config.impact_window);
        assert_eq!(p.follow_through, 54);
        assert!(!seg.flags.any_defaulted());
    }

    #[test]
    fn test_flat_series_uses_defaults() {
        let m = vec![0.1; 40];
        let seg = segment(
            &MotionProfile::from_magnitudes(&m),
            41,
            &SegmentationConfig::default(),
        )
        .unwrap();
        assert!(seg.flags.backswing_start_defaulted);
        assert_eq!(seg.phases.backswing_start, 10);
        assert!(seg.phases.is_monotonic());
    }

    #[test]
    fn test_strict_mode_rejects_defaults() {
        let m = vec![0.1; 40];
        let config = SegmentationConfig {
            strict: true,
            ..SegmentationConfig::default()
        };
        let err = segment(&MotionProfile::from_magnitudes(&m), 41, &config).unwrap_err();
        assert!(matches!(err, AnalysisError::TrackingFailed(_)));
    }

    #[test]
    fn test_empty_motion_collapses_to_zero() {
        let seg = segment(
            &MotionProfile::default(),
            1,
            &SegmentationConfig::default(),
        )
        .unwrap();
        assert_eq!(seg.phases.as_array(), [0; 6]);
        assert!(seg.flags.clamped);
    }

    #[test]
    fn test_short_clip_is_clamped() {
        let m = vec![0.01, 0.05, 0.2, 0.1, 0.3];
        let seg = segment(
            &MotionProfile::from_magnitudes(&m),
            6,
            &SegmentationConfig::default(),
        )
        .unwrap();
        assert!(seg.phases.is_monotonic());
        assert!(seg.phases.follow_through < 6);
    }

    #[test]
    fn test_random_series_phases_are_monotone_and_in_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let config = SegmentationConfig::default();
        for _ in 0..300 {
            let len = rng.gen_range(30..240);
            let m: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..1.0)).collect();
            let frame_count = len + 1;
            let seg = segment(&MotionProfile::from_magnitudes(&m), frame_count, &config).unwrap();
            assert!(seg.phases.is_monotonic(), "{:?}", seg.phases);
            assert!(seg.phases.follow_through < frame_count);
        }
    }

    #[test]
    fn test_tempo_ratio_from_frames() {
        let phases = SwingPhases {
            address: 0,
            backswing_start: 10,
            top_of_backswing: 55,
            downswing_start: 56,
            impact: 70,
            follow_through: 90,
        };
        assert!((phases.tempo_ratio(60.0) - 45.0 / 15.0).abs() < 1e-12);
        assert!((phases.backswing_secs(60.0) - 0.75).abs() < 1e-12);
    }
}
