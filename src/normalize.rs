use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT};

const DEFAULT_MEAN: f64 = 50.0;
const DEFAULT_SCALE: f64 = 10.0;

/// Per-feature affine transform applied before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Default for NormalizationParameters {
    /// Uncalibrated fallback: mean 50, scale 10 for every feature.
    fn default() -> Self {
        Self {
            version: None,
            mean: vec![DEFAULT_MEAN; FEATURE_COUNT],
            scale: vec![DEFAULT_SCALE; FEATURE_COUNT],
        }
    }
}

/// Normalization parameters plus whether they came from the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedNormalization {
    pub params: NormalizationParameters,
    pub used_default: bool,
}

impl NormalizationParameters {
    /// Validate lengths and repair unusable scales.
    pub fn new(version: Option<String>, mean: Vec<f64>, mut scale: Vec<f64>) -> Result<Self> {
        if mean.len() != FEATURE_COUNT || scale.len() != FEATURE_COUNT {
            return Err(AnalysisError::InvalidArtifact(format!(
                "normalization needs {} means and scales, got {} and {}",
                FEATURE_COUNT,
                mean.len(),
                scale.len()
            )));
        }
        if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
            return Err(AnalysisError::InvalidArtifact(format!(
                "normalization mean[{}] is not finite",
                i
            )));
        }
        for s in scale.iter_mut() {
            if !s.is_finite() || s.abs() < 1e-12 {
                *s = 1.0;
            }
        }
        Ok(Self {
            version,
            mean,
            scale,
        })
    }

    /// Read a sidecar. A missing file falls back to defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<LoadedNormalization> {
        if !path.exists() {
            log::warn!(
                "[NORMALIZE] No normalization sidecar at {}, using default mode (mean {}, scale {})",
                path.display(),
                DEFAULT_MEAN,
                DEFAULT_SCALE
            );
            return Ok(LoadedNormalization {
                params: Self::default(),
                used_default: true,
            });
        }

        let text = std::fs::read_to_string(path)?;
        let raw: NormalizationParameters = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::InvalidArtifact(format!("normalization {}: {}", path.display(), e))
        })?;
        let params = Self::new(raw.version, raw.mean, raw.scale)?;
        log::info!(
            "[NORMALIZE] Loaded normalization {} from {}",
            params.version.as_deref().unwrap_or("(unversioned)"),
            path.display()
        );
        Ok(LoadedNormalization {
            params,
            used_default: false,
        })
    }

    pub fn normalize(&self, raw: &FeatureVector) -> Vec<f64> {
        raw.as_slice()
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    pub fn denormalize(&self, normalized: &[f64]) -> Result<FeatureVector> {
        if normalized.len() != FEATURE_COUNT {
            return Err(AnalysisError::InvalidFeatureCount {
                expected: FEATURE_COUNT,
                actual: normalized.len(),
            });
        }
        FeatureVector::new(
            normalized
                .iter()
                .zip(self.mean.iter().zip(&self.scale))
                .map(|(z, (m, s))| z * s + m)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ramp() -> FeatureVector {
        FeatureVector::new((0..FEATURE_COUNT).map(|i| i as f64 * 3.5 - 20.0).collect()).unwrap()
    }

    #[test]
    fn test_missing_sidecar_uses_default_mode() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = NormalizationParameters::load(&dir.path().join("normalization.json")).unwrap();
        assert!(loaded.used_default);
        assert!(loaded.params.mean.iter().all(|&m| m == 50.0));
        assert!(loaded.params.scale.iter().all(|&s| s == 10.0));

        let mut raw = FeatureVector::typical();
        raw.set(crate::features::Feature::SpineAngle, 60.0);
        let z = loaded.params.normalize(&raw);
        assert_eq!(z.len(), FEATURE_COUNT);
        assert!((z[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let params = NormalizationParameters::new(
            Some("v2".into()),
            (0..FEATURE_COUNT).map(|i| i as f64).collect(),
            (0..FEATURE_COUNT).map(|i| 0.5 + i as f64 / 10.0).collect(),
        )
        .unwrap();
        let raw = ramp();
        let back = params.denormalize(&params.normalize(&raw)).unwrap();
        for (a, b) in raw.as_slice().iter().zip(back.as_slice()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_scale_becomes_one() {
        let mut scale = vec![2.0; FEATURE_COUNT];
        scale[3] = 0.0;
        scale[4] = f64::NAN;
        let params = NormalizationParameters::new(None, vec![0.0; FEATURE_COUNT], scale).unwrap();
        assert_eq!(params.scale[3], 1.0);
        assert_eq!(params.scale[4], 1.0);
        assert!(params.normalize(&ramp()).iter().all(|z| z.is_finite()));
    }

    #[test]
    fn test_wrong_length_sidecar_is_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mean": [1.0, 2.0], "scale": [1.0, 1.0]}}"#).unwrap();
        let err = NormalizationParameters::load(file.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArtifact(_)));
    }

    #[test]
    fn test_denormalize_checks_length() {
        let err = NormalizationParameters::default()
            .denormalize(&[0.0; 10])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidFeatureCount { .. }));
    }
}
