use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

use crate::analysis::SwingAnalysisResult;
use crate::classifier::{
    ModelArtifact, ModelBundle, ModelStore, SwingLabel, MODEL_FILE, NORMALIZATION_FILE,
};
use crate::features::FeatureVector;
use crate::normalize::NormalizationParameters;

/// One labelled example sent back for retraining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub model_version: String,
    pub features: FeatureVector,
    pub label: SwingLabel,
    pub confidence: f64,
    /// Label the golfer or coach says is correct, when it differs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_correction: Option<SwingLabel>,
    pub recorded_at: DateTime<Utc>,
}

impl TrainingRecord {
    pub fn from_result(result: &SwingAnalysisResult, user_correction: Option<SwingLabel>) -> Self {
        Self {
            model_version: result.flags.model_version.clone(),
            features: result.features.clone(),
            label: result.classification.label,
            confidence: result.classification.confidence,
            user_correction: user_correction.filter(|&l| l != result.classification.label),
            recorded_at: Utc::now(),
        }
    }
}

/// Model artifact pair as served by the sync endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteModel {
    pub version: String,
    pub model: ModelArtifact,
    #[serde(default)]
    pub normalization: Option<NormalizationParameters>,
}

impl RemoteModel {
    pub fn into_bundle(self) -> Result<ModelBundle> {
        let normalization = self
            .normalization
            .map(|n| NormalizationParameters::new(n.version, n.mean, n.scale))
            .transpose()?;
        Ok(ModelBundle::new(self.model, normalization)?)
    }

    /// Write `model.json` and, when present, the normalization sidecar.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let model = serde_json::to_string_pretty(&self.model).context("Failed to serialize model")?;
        std::fs::write(dir.join(MODEL_FILE), model)
            .with_context(|| format!("Failed to write model to {}", dir.display()))?;
        if let Some(normalization) = &self.normalization {
            let sidecar = serde_json::to_string_pretty(normalization)
                .context("Failed to serialize normalization")?;
            std::fs::write(dir.join(NORMALIZATION_FILE), sidecar)
                .with_context(|| format!("Failed to write normalization to {}", dir.display()))?;
        }
        log::info!("[SYNC] Saved model {} to {}", self.version, dir.display());
        Ok(())
    }

    /// Validate the pair, write it to `dir` when given, then swap it into `store`.
    ///
    /// Nothing is written or swapped if validation fails.
    pub fn install_into(&self, store: &ModelStore, dir: Option<&Path>) -> Result<()> {
        let bundle = self.clone().into_bundle()?;
        if let Some(dir) = dir {
            self.save_to(dir)?;
        }
        store.install(bundle);
        Ok(())
    }
}

/// HTTP client for the optional model service.
pub struct ModelSyncClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl ModelSyncClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            request_timeout,
        }
    }

    fn records_url(&self) -> String {
        format!("{}/training-records", self.base_url)
    }

    fn model_url(&self, version: &str) -> String {
        format!("{}/models/{}", self.base_url, version)
    }

    pub async fn upload_record(&self, record: &TrainingRecord) -> Result<()> {
        let url = self.records_url();
        log::debug!("[SYNC] Uploading training record to {}", url);

        let response = timeout(
            self.request_timeout,
            self.client.post(&url).json(record).send(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Timeout uploading to {}", url))?
        .with_context(|| format!("Connection error to {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("HTTP {} from {}", response.status(), url));
        }
        log::info!(
            "[SYNC] Uploaded record for model {} ({})",
            record.model_version,
            record.label
        );
        Ok(())
    }

    pub async fn fetch_model(&self, version: &str) -> Result<RemoteModel> {
        let url = self.model_url(version);
        log::info!("[SYNC] Fetching model {} from {}", version, url);

        let response = timeout(self.request_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| anyhow::anyhow!("Timeout fetching {}", url))?
            .with_context(|| format!("Connection error to {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("HTTP {} from {}", response.status(), url));
        }
        let model: RemoteModel = timeout(self.request_timeout, response.json())
            .await
            .map_err(|_| anyhow::anyhow!("Timeout reading {}", url))?
            .with_context(|| format!("Invalid model payload from {}", url))?;
        Ok(model)
    }
}
