use image::GrayImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{AnalysisError, Result};

/// One decoded grayscale frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: GrayImage,
    pub timestamp: f64, // Seconds from clip start
    pub index: usize,
}

/// A fully materialized clip at its effective sample rate.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub frames: Vec<Frame>,
    /// Rate the frames were sampled at
    pub fps: f64,
    /// Native rate of the source, when known
    pub source_fps: Option<f64>,
    pub width: u32,
    pub height: u32,
}

impl DecodedClip {
    pub fn from_frames(frames: Vec<Frame>, fps: f64, source_fps: Option<f64>) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| f.image.dimensions())
            .unwrap_or((0, 0));
        Self {
            frames,
            fps,
            source_fps,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Reject clips too short to segment. An empty clip is rejected the same way.
    pub fn require_frames(self, min_frames: usize) -> Result<Self> {
        if self.frames.len() < min_frames.max(1) {
            return Err(AnalysisError::InsufficientFrames {
                decoded: self.frames.len(),
                required: min_frames.max(1),
            });
        }
        Ok(self)
    }
}

/// Anything that can turn a finite clip into ordered frames.
///
/// `decode` consumes the source: a clip is decoded once.
pub trait FrameSource {
    fn describe(&self) -> String;
    fn decode(self, target_fps: f64) -> Result<DecodedClip>;
}

/// Effective sample rate: never above what the source actually recorded.
pub fn effective_fps(target_fps: f64, source_fps: Option<f64>) -> f64 {
    match source_fps {
        Some(src) if src > 0.0 && src < target_fps => src,
        _ => target_fps,
    }
}

/// Drop frames so a clip recorded at `source_fps` is sampled at `fps`, re-indexing the result.
fn resample(frames: Vec<Frame>, source_fps: f64, fps: f64) -> Vec<Frame> {
    if frames.is_empty() || fps >= source_fps {
        return frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| Frame {
                index: i,
                timestamp: i as f64 / source_fps,
                image: f.image,
            })
            .collect();
    }

    let duration = frames.len() as f64 / source_fps;
    let count = (duration * fps).floor().max(1.0) as usize;
    let mut slots: Vec<Option<Frame>> = frames.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(count);
    for k in 0..count {
        let src = ((k as f64 / fps) * source_fps).round() as usize;
        if let Some(frame) = slots.get_mut(src).and_then(Option::take) {
            out.push(Frame {
                index: out.len(),
                timestamp: out.len() as f64 / fps,
                image: frame.image,
            });
        }
    }
    out
}

/// Frames already in memory (synthetic clips, tests).
pub struct MemoryFrameSource {
    frames: Vec<Frame>,
    fps: f64,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        Self { frames, fps }
    }
}

impl FrameSource for MemoryFrameSource {
    fn describe(&self) -> String {
        format!("memory ({} frames @ {:.0} fps)", self.frames.len(), self.fps)
    }

    fn decode(self, target_fps: f64) -> Result<DecodedClip> {
        let fps = effective_fps(target_fps, Some(self.fps));
        let frames = resample(self.frames, self.fps, fps);
        Ok(DecodedClip::from_frames(frames, fps, Some(self.fps)))
    }
}

/// A directory of still frames (e.g. exported by a camera app), sorted by file name.
pub struct ImageSequenceSource {
    dir: PathBuf,
    fps: f64,
    width: u32,
}

impl ImageSequenceSource {
    const EXTENSIONS: [&'static str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

    pub fn new(dir: impl Into<PathBuf>, fps: f64, width: u32) -> Self {
        Self {
            dir: dir.into(),
            fps,
            width,
        }
    }

    fn list_images(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(AnalysisError::NoVideoTrack(self.dir.display().to_string()));
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| Self::EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for ImageSequenceSource {
    fn describe(&self) -> String {
        format!("image sequence {} @ {:.0} fps", self.dir.display(), self.fps)
    }

    fn decode(self, target_fps: f64) -> Result<DecodedClip> {
        let paths = self.list_images()?;
        log::debug!("[DECODE] {} images in {}", paths.len(), self.dir.display());

        let mut frames = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let img = image::open(path)
                .map_err(|e| AnalysisError::Decode(format!("{}: {}", path.display(), e)))?
                .to_luma8();
            let img = scale_to_width(img, self.width);
            frames.push(Frame {
                image: img,
                timestamp: i as f64 / self.fps,
                index: i,
            });
        }

        let fps = effective_fps(target_fps, Some(self.fps));
        let frames = resample(frames, self.fps, fps);
        Ok(DecodedClip::from_frames(frames, fps, Some(self.fps)))
    }
}

fn scale_to_width(img: GrayImage, width: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if width == 0 || w <= width {
        return img;
    }
    let height = even_height(w, h, width);
    image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle)
}

fn even_height(src_w: u32, src_h: u32, width: u32) -> u32 {
    let h = (src_h as f64 * width as f64 / src_w.max(1) as f64).round() as u32;
    (h / 2 * 2).max(2)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Decodes any container ffmpeg understands, piping raw 8-bit gray frames over stdout.
pub struct FfmpegFrameSource {
    path: PathBuf,
    width: u32,
}

impl FfmpegFrameSource {
    pub fn new(path: impl Into<PathBuf>, width: u32) -> Self {
        Self {
            path: path.into(),
            width,
        }
    }

    fn probe(&self) -> Result<(u32, u32, Option<f64>)> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(&self.path)
            .output()
            .map_err(|e| AnalysisError::Decode(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(AnalysisError::Decode(format!(
                "ffprobe failed on {}: {}",
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| AnalysisError::Decode(format!("unreadable ffprobe output: {}", e)))?;
        parse_probe(probe, &self.path)
    }
}

fn parse_probe(probe: ProbeOutput, path: &Path) -> Result<(u32, u32, Option<f64>)> {
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::NoVideoTrack(path.display().to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(AnalysisError::NoVideoTrack(path.display().to_string())),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

    Ok((width, height, fps))
}

/// Parse ffprobe rationals like "30000/1001".
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

impl FrameSource for FfmpegFrameSource {
    fn describe(&self) -> String {
        format!("video {}", self.path.display())
    }

    fn decode(self, target_fps: f64) -> Result<DecodedClip> {
        if !self.path.exists() {
            return Err(AnalysisError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", self.path.display()),
            )));
        }

        let (src_w, src_h, source_fps) = self.probe()?;
        let fps = effective_fps(target_fps, source_fps);
        let width = if self.width == 0 { src_w } else { self.width.min(src_w) };
        let height = even_height(src_w, src_h, width);

        log::info!(
            "[DECODE] {}x{} source @ {} -> {}x{} @ {:.1} fps",
            src_w,
            src_h,
            source_fps
                .map(|f| format!("{:.2} fps", f))
                .unwrap_or_else(|| "unknown rate".to_string()),
            width,
            height,
            fps
        );

        let output = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args([
                "-vf",
                &format!("fps={},scale={}:{}", fps, width, height),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "gray",
                "-",
            ])
            .output()
            .map_err(|e| AnalysisError::Decode(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(AnalysisError::Decode(format!(
                "ffmpeg failed on {}: {}",
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let frame_bytes = (width * height) as usize;
        let frames: Vec<Frame> = output
            .stdout
            .chunks_exact(frame_bytes)
            .enumerate()
            .filter_map(|(i, chunk)| {
                GrayImage::from_raw(width, height, chunk.to_vec()).map(|image| Frame {
                    image,
                    timestamp: i as f64 / fps,
                    index: i,
                })
            })
            .collect();

        Ok(DecodedClip::from_frames(frames, fps, source_fps))
    }
}
