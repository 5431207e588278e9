use image::GrayImage;
use serde::Serialize;

use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionSample {
    pub frame_index: usize,
    pub magnitude: f64, // Mean absolute luma change in [0, 1]
}

/// Motion between each pair of adjacent frames; `frames.len() - 1` samples.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MotionProfile {
    pub samples: Vec<MotionSample>,
}

impl MotionProfile {
    pub fn from_frames(frames: &[Frame]) -> Self {
        let samples = frames
            .windows(2)
            .map(|pair| MotionSample {
                frame_index: pair[0].index,
                magnitude: frame_difference(&pair[0].image, &pair[1].image),
            })
            .collect();
        Self { samples }
    }

    pub fn from_magnitudes(magnitudes: &[f64]) -> Self {
        Self {
            samples: magnitudes
                .iter()
                .enumerate()
                .map(|(i, &m)| MotionSample {
                    frame_index: i,
                    magnitude: if m.is_finite() { m.max(0.0) } else { 0.0 },
                })
                .collect(),
        }
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.magnitude).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        self.samples.get(index).map(|s| s.magnitude).unwrap_or(0.0)
    }
}

/// Mean absolute pixel difference over the overlapping region, scaled to [0, 1].
pub fn frame_difference(a: &GrayImage, b: &GrayImage) -> f64 {
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());
    if width == 0 || height == 0 {
        return 0.0;
    }

    let mut total: u64 = 0;
    for y in 0..height {
        for x in 0..width {
            let pa = a.get_pixel(x, y).0[0] as i32;
            let pb = b.get_pixel(x, y).0[0] as i32;
            total += (pa - pb).unsigned_abs() as u64;
        }
    }
    total as f64 / (width as f64 * height as f64 * 255.0)
}
