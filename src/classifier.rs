//! Swing classification behind a swappable, versioned interface.
//!
//! Backends are loaded from a tagged JSON artifact (`linear` or `mlp`). A model
//! directory holds `model.json` plus the `normalization.json` sidecar it was
//! trained with; the pair is installed into a [`ModelStore`] as one bundle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{AnalysisError, Result};
use crate::features::{Feature, FeatureVector, FEATURE_COUNT};
use crate::normalize::NormalizationParameters;

pub const MODEL_FILE: &str = "model.json";
pub const NORMALIZATION_FILE: &str = "normalization.json";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SwingLabel {
    GoodSwing,
    TooSteep,
    TooFlat,
}

impl SwingLabel {
    /// Output order of every model backend.
    pub const ALL: [SwingLabel; 3] = [SwingLabel::GoodSwing, SwingLabel::TooSteep, SwingLabel::TooFlat];

    pub fn as_str(&self) -> &'static str {
        match self {
            SwingLabel::GoodSwing => "good_swing",
            SwingLabel::TooSteep => "too_steep",
            SwingLabel::TooFlat => "too_flat",
        }
    }
}

impl std::fmt::Display for SwingLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: SwingLabel,
    pub probabilities: BTreeMap<SwingLabel, f64>,
    /// Probability of the winning label
    pub confidence: f64,
    /// Winner minus runner-up
    pub confidence_gap: f64,
}

impl ClassificationResult {
    /// Softmax over logits in `SwingLabel::ALL` order.
    pub fn from_logits(logits: &[f64]) -> Result<Self> {
        if logits.len() != SwingLabel::ALL.len() || logits.iter().any(|l| !l.is_finite()) {
            return Err(AnalysisError::PredictionFailed(format!(
                "model produced invalid logits {:?}",
                logits
            )));
        }
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exp.iter().sum();

        let mut ranked: Vec<(SwingLabel, f64)> = SwingLabel::ALL
            .iter()
            .zip(&exp)
            .map(|(&label, e)| (label, e / sum))
            .collect();
        let probabilities = ranked.iter().copied().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(Self {
            label: ranked[0].0,
            probabilities,
            confidence: ranked[0].1,
            confidence_gap: ranked[0].1 - ranked[1].1,
        })
    }

    pub fn probability(&self, label: SwingLabel) -> f64 {
        self.probabilities.get(&label).copied().unwrap_or(0.0)
    }
}

/// A trained swing classifier. Implementations must be immutable after load.
pub trait SwingClassifier: Send + Sync {
    fn version(&self) -> &str;

    /// `normalized` must hold exactly `FEATURE_COUNT` values.
    fn predict(&self, normalized: &[f64]) -> Result<ClassificationResult>;
}

fn check_len(normalized: &[f64]) -> Result<()> {
    if normalized.len() != FEATURE_COUNT {
        return Err(AnalysisError::InvalidFeatureCount {
            expected: FEATURE_COUNT,
            actual: normalized.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// One row per output unit
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.first().map_or(0, |r| r.len())
    }

    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn validate(&self, inputs: usize) -> Result<()> {
        if self.outputs() == 0
            || self.bias.len() != self.outputs()
            || self.weights.iter().any(|row| row.len() != inputs)
        {
            return Err(AnalysisError::InvalidArtifact(format!(
                "dense layer expects {} inputs with matching bias, got {}x{} and {} biases",
                inputs,
                self.outputs(),
                self.inputs(),
                self.bias.len()
            )));
        }
        Ok(())
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

/// On-disk model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Multinomial logistic regression
    Linear { version: String, layer: DenseLayer },
    /// Feed-forward network, ReLU between layers
    Mlp {
        version: String,
        layers: Vec<DenseLayer>,
    },
}

impl ModelArtifact {
    pub fn version(&self) -> &str {
        match self {
            ModelArtifact::Linear { version, .. } | ModelArtifact::Mlp { version, .. } => version,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AnalysisError::ModelNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| AnalysisError::InvalidArtifact(format!("model {}: {}", path.display(), e)))
    }

    /// Check layer shapes and build the runtime classifier.
    pub fn into_classifier(self) -> Result<Box<dyn SwingClassifier>> {
        match self {
            ModelArtifact::Linear { version, layer } => {
                layer.validate(FEATURE_COUNT)?;
                if layer.outputs() != SwingLabel::ALL.len() {
                    return Err(AnalysisError::InvalidArtifact(format!(
                        "linear model must have {} outputs, has {}",
                        SwingLabel::ALL.len(),
                        layer.outputs()
                    )));
                }
                Ok(Box::new(LinearClassifier { version, layer }))
            }
            ModelArtifact::Mlp { version, layers } => {
                let mut width = FEATURE_COUNT;
                for layer in &layers {
                    layer.validate(width)?;
                    width = layer.outputs();
                }
                if layers.is_empty() || width != SwingLabel::ALL.len() {
                    return Err(AnalysisError::InvalidArtifact(format!(
                        "mlp must end in {} outputs",
                        SwingLabel::ALL.len()
                    )));
                }
                Ok(Box::new(MlpClassifier { version, layers }))
            }
        }
    }
}

pub struct LinearClassifier {
    version: String,
    layer: DenseLayer,
}

impl LinearClassifier {
    /// Built-in fallback keyed on how upright the hands travel to the top.
    pub fn baseline() -> Self {
        let plane = Feature::SwingPlaneAngle.index();
        let mut weights = vec![vec![0.0; FEATURE_COUNT]; 3];
        weights[1][plane] = 1.2;
        weights[2][plane] = -1.2;
        Self {
            version: "baseline-1".to_string(),
            layer: DenseLayer {
                weights,
                bias: vec![0.8, -0.6, -0.6],
            },
        }
    }
}

impl SwingClassifier for LinearClassifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, normalized: &[f64]) -> Result<ClassificationResult> {
        check_len(normalized)?;
        ClassificationResult::from_logits(&self.layer.forward(normalized))
    }
}

pub struct MlpClassifier {
    version: String,
    layers: Vec<DenseLayer>,
}

impl SwingClassifier for MlpClassifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, normalized: &[f64]) -> Result<ClassificationResult> {
        check_len(normalized)?;
        let last = self.layers.len() - 1;
        let mut activations = normalized.to_vec();
        for (n, layer) in self.layers.iter().enumerate() {
            activations = layer.forward(&activations);
            if n < last {
                activations.iter_mut().for_each(|a| *a = a.max(0.0));
            }
        }
        ClassificationResult::from_logits(&activations)
    }
}

/// A classifier together with the normalization it was trained against.
pub struct ModelBundle {
    pub classifier: Box<dyn SwingClassifier>,
    pub normalization: NormalizationParameters,
    /// Sidecar was missing and the uncalibrated default is in use
    pub used_default_normalization: bool,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("version", &self.classifier.version())
            .field("normalization", &self.normalization.version)
            .field("used_default_normalization", &self.used_default_normalization)
            .finish()
    }
}

impl ModelBundle {
    /// Baseline classifier with normalization centred on typical amateur values.
    pub fn baseline() -> Self {
        let mean = FeatureVector::typical().as_slice().to_vec();
        let mut scale: Vec<f64> = mean.iter().map(|m| (m.abs() * 0.2).max(0.05)).collect();
        scale[Feature::SwingPlaneAngle.index()] = 3.0;
        let normalization = NormalizationParameters {
            version: Some("baseline-1".to_string()),
            mean,
            scale,
        };
        Self {
            classifier: Box::new(LinearClassifier::baseline()),
            normalization,
            used_default_normalization: false,
        }
    }

    pub fn new(artifact: ModelArtifact, normalization: Option<NormalizationParameters>) -> Result<Self> {
        let classifier = artifact.into_classifier()?;
        let used_default_normalization = normalization.is_none();
        Ok(Self {
            classifier,
            normalization: normalization.unwrap_or_default(),
            used_default_normalization,
        })
    }

    /// Load `model.json` and its sidecar from a model directory.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let artifact = ModelArtifact::load(&dir.join(MODEL_FILE))?;
        let loaded = NormalizationParameters::load(&dir.join(NORMALIZATION_FILE))?;
        let bundle = Self {
            classifier: artifact.into_classifier()?,
            normalization: loaded.params,
            used_default_normalization: loaded.used_default,
        };
        log::info!(
            "[CLASSIFY] Loaded model {} from {}",
            bundle.version(),
            dir.display()
        );
        Ok(bundle)
    }

    pub fn version(&self) -> &str {
        self.classifier.version()
    }
}

/// Shared model slot. Analyses take a snapshot; `install` swaps in a new bundle
/// without disturbing analyses already holding the old one.
#[derive(Debug)]
pub struct ModelStore {
    current: RwLock<Arc<ModelBundle>>,
}

impl ModelStore {
    pub fn new(bundle: ModelBundle) -> Self {
        Self {
            current: RwLock::new(Arc::new(bundle)),
        }
    }

    pub fn snapshot(&self) -> Arc<ModelBundle> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn install(&self, bundle: ModelBundle) {
        let version = bundle.version().to_string();
        let bundle = Arc::new(bundle);
        match self.current.write() {
            Ok(mut guard) => *guard = bundle,
            Err(poisoned) => *poisoned.into_inner() = bundle,
        }
        log::info!("[CLASSIFY] Installed model {}", version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_vector(z: f64) -> Vec<f64> {
        let mut v = vec![0.0; FEATURE_COUNT];
        v[Feature::SwingPlaneAngle.index()] = z;
        v
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let model = LinearClassifier::baseline();
        for z in [-10.0, -1.5, 0.0, 0.7, 3.0, 40.0] {
            let result = model.predict(&plane_vector(z)).unwrap();
            assert_eq!(result.probabilities.len(), 3);
            let sum: f64 = result.probabilities.values().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(result.confidence_gap >= 0.0);
        }
    }

    #[test]
    fn test_baseline_follows_plane_angle() {
        let model = LinearClassifier::baseline();
        assert_eq!(model.predict(&plane_vector(0.0)).unwrap().label, SwingLabel::GoodSwing);
        assert_eq!(model.predict(&plane_vector(2.5)).unwrap().label, SwingLabel::TooSteep);
        assert_eq!(model.predict(&plane_vector(-2.5)).unwrap().label, SwingLabel::TooFlat);
    }

    #[test]
    fn test_wrong_length_rejected_before_inference() {
        let err = LinearClassifier::baseline().predict(&[0.0; 34]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidFeatureCount {
                expected: 35,
                actual: 34
            }
        ));
    }

    #[test]
    fn test_non_finite_output_is_prediction_failure() {
        let mut v = plane_vector(0.0);
        v[0] = f64::NAN;
        let mut layer = LinearClassifier::baseline().layer;
        layer.weights[0][0] = 1.0;
        let model = LinearClassifier {
            version: "nan".into(),
            layer,
        };
        assert!(matches!(
            model.predict(&v).unwrap_err(),
            AnalysisError::PredictionFailed(_)
        ));
    }

    #[test]
    fn test_mlp_artifact_from_json() {
        let hidden = vec![vec![0.1; FEATURE_COUNT]; 4];
        let json = serde_json::json!({
            "type": "mlp",
            "version": "mlp-7",
            "layers": [
                {"weights": hidden, "bias": [0.0, 0.1, 0.2, 0.3]},
                {"weights": [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 1.0]], "bias": [0.0, 0.0, 0.0]}
            ]
        });
        let artifact: ModelArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(artifact.version(), "mlp-7");
        let model = artifact.into_classifier().unwrap();
        let result = model.predict(&vec![1.0; FEATURE_COUNT]).unwrap();
        assert_eq!(result.label, SwingLabel::TooFlat);
    }

    #[test]
    fn test_mismatched_layer_is_invalid() {
        let artifact = ModelArtifact::Linear {
            version: "bad".into(),
            layer: DenseLayer {
                weights: vec![vec![0.0; 10]; 3],
                bias: vec![0.0; 3],
            },
        };
        assert!(matches!(
            artifact.into_classifier().err(),
            Some(AnalysisError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelBundle::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelNotFound(_)));
    }

    #[test]
    fn test_model_dir_without_sidecar_flags_default_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ModelArtifact::Linear {
            version: "lin-3".into(),
            layer: LinearClassifier::baseline().layer,
        };
        std::fs::write(
            dir.path().join(MODEL_FILE),
            serde_json::to_string(&artifact).unwrap(),
        )
        .unwrap();

        let bundle = ModelBundle::load_dir(dir.path()).unwrap();
        assert_eq!(bundle.version(), "lin-3");
        assert!(bundle.used_default_normalization);
        assert_eq!(bundle.normalization, NormalizationParameters::default());
    }

    #[test]
    fn test_install_swaps_bundle_without_touching_snapshots() {
        let store = ModelStore::new(ModelBundle::baseline());
        let before = store.snapshot();

        let artifact = ModelArtifact::Linear {
            version: "lin-4".into(),
            layer: LinearClassifier::baseline().layer,
        };
        store.install(ModelBundle::new(artifact, None).unwrap());

        assert_eq!(before.version(), "baseline-1");
        assert_eq!(store.snapshot().version(), "lin-4");
    }
}
