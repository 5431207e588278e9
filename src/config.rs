use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::feedback::FeedbackConfig;
use crate::features::ExtractionConfig;
use crate::phases::SegmentationConfig;
use crate::quality::QualityConfig;

/// Top-level analyzer configuration.
///
/// Every section has defaults, so a TOML file only needs the keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Decode target; lowered to the source rate when the source is slower
    pub target_fps: f64,
    /// Clips with fewer decoded frames are rejected
    pub min_frames: usize,
    /// Width frames are scaled to before analysis
    pub analysis_width: u32,
    /// Joints reported below this confidence are dropped
    pub min_joint_confidence: f64,
    /// Minimum fraction of frames that need a usable pose
    pub min_tracked_fraction: f64,
    pub segmentation: SegmentationConfig,
    pub extraction: ExtractionConfig,
    pub quality: QualityConfig,
    pub feedback: FeedbackConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            min_frames: 30,
            analysis_width: 320,
            min_joint_confidence: 0.3,
            min_tracked_fraction: 0.5,
            segmentation: SegmentationConfig::default(),
            extraction: ExtractionConfig::default(),
            quality: QualityConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| {
            AnalysisError::InvalidArtifact(format!("config {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AnalyzerConfig = toml::from_str(
            r#"
            target_fps = 30.0

            [segmentation]
            impact_window = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.target_fps, 30.0);
        assert_eq!(config.min_frames, 30);
        assert_eq!(config.segmentation.impact_window, 12);
        assert_eq!(config.segmentation.top_window, 30);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = AnalyzerConfig::load(Path::new("/nonexistent/openswing.toml")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io(_)));
    }
}
