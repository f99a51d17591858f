//! Embedding stage: vectorizes artifacts after the passes complete.
//!
//! Artifacts whose fingerprint already matches the sink's stored embedding
//! are skipped. Failures here never fail the run.

use crate::error::{GenerationError, ProviderError};
use crate::generation::RetryPolicy;
use crate::graph::ArtifactSink;
use crate::provider::clients::{build_provider_http_client, check_status, map_http_error};
use crate::types::{ContentHash, EmbeddingRecord, NodeId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    Ollama,
    OpenAI,
    Fake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_embedding_provider")]
    pub provider_type: EmbeddingProviderType,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Vector width of the fake backend
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> EmbeddingProviderType {
    EmbeddingProviderType::Fake
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider_type: default_embedding_provider(),
            model: default_embedding_model(),
            endpoint: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            dimensions: default_dimensions(),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.provider_type == EmbeddingProviderType::Fake && self.dimensions == 0 {
            return Err("dimensions must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn build_service(&self) -> Result<Arc<dyn EmbeddingService>, ProviderError> {
        match self.provider_type {
            EmbeddingProviderType::Ollama => Ok(Arc::new(OllamaEmbedder::new(
                self.model.clone(),
                self.endpoint.clone(),
            )?)),
            EmbeddingProviderType::OpenAI => {
                let var = self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
                let api_key = std::env::var(var).map_err(|_| {
                    ProviderError::NotConfigured(format!("embedding key variable {} is not set", var))
                })?;
                Ok(Arc::new(OpenAIEmbedder::new(
                    self.model.clone(),
                    api_key,
                    self.endpoint.clone(),
                )?))
            }
            EmbeddingProviderType::Fake => Ok(Arc::new(FakeEmbedder::new(self.dimensions))),
        }
    }
}

/// Ollama `/api/embed`
pub struct OllamaEmbedder {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(model: String, base_url: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_provider_http_client()?,
            model,
            base_url: base_url
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingService for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(map_http_error)?;
        let parsed: OllamaEmbedResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse embeddings: {}", e)))?;
        Ok(parsed.embeddings)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// OpenAI `/embeddings`
pub struct OpenAIEmbedder {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAIEmbedder {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_provider_http_client()?,
            model,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[derive(Deserialize)]
struct OpenAIEmbedResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingService for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(map_http_error)?;
        let mut parsed: OpenAIEmbedResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse embeddings: {}", e)))?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Deterministic unit vectors derived from the text hash
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dimensions: usize,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut bytes = vec![0u8; self.dimensions * 2];
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        hasher.finalize_xof().fill(&mut bytes);

        let raw: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]) as f32 / u16::MAX as f32 * 2.0 - 1.0)
            .collect();
        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return raw;
        }
        raw.into_iter().map(|v| v / norm).collect()
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingReport {
    pub candidates: usize,
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct EmbeddingStage {
    service: Arc<dyn EmbeddingService>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingStage {
    pub fn new(service: Arc<dyn EmbeddingService>, batch_size: usize) -> Self {
        Self {
            service,
            batch_size: batch_size.max(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Embed `(id, artifact)` pairs whose stored fingerprint is stale.
    pub async fn run(
        &self,
        artifacts: Vec<(NodeId, String)>,
        sink: &dyn ArtifactSink,
    ) -> EmbeddingReport {
        let mut report = EmbeddingReport {
            candidates: artifacts.len(),
            ..EmbeddingReport::default()
        };

        let mut pending = Vec::new();
        for (id, artifact) in artifacts {
            let fingerprint = ContentHash::of(&artifact);
            match sink.embedding_fingerprint(&id) {
                Ok(Some(stored)) if stored == fingerprint => report.skipped += 1,
                Ok(_) => pending.push((id, artifact, fingerprint)),
                Err(e) => {
                    warn!(node_id = %id, error = %e, "Could not read embedding fingerprint");
                    pending.push((id, artifact, fingerprint));
                }
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text, _)| text.clone()).collect();
            let (service, texts) = (&self.service, &texts);
            let vectors = self.retry.run("embed", move || service.embed(texts)).await;

            let vectors = match vectors {
                Ok(v) if v.len() == batch.len() => v,
                Ok(v) => {
                    warn!(expected = batch.len(), received = v.len(), "Embedding batch size mismatch");
                    report.failed += batch.len();
                    continue;
                }
                Err(e) => {
                    warn!(batch = batch.len(), error = %e, "Embedding batch failed");
                    report.failed += batch.len();
                    continue;
                }
            };

            let records: Vec<EmbeddingRecord> = batch
                .iter()
                .zip(vectors)
                .map(|((id, _, fingerprint), vector)| EmbeddingRecord {
                    id: id.clone(),
                    vector,
                    fingerprint: fingerprint.clone(),
                })
                .collect();

            match sink.write_embeddings(&records) {
                Ok(()) => {
                    debug!(batch = records.len(), "Embedding batch written");
                    report.embedded += records.len();
                }
                Err(e) => {
                    warn!(batch = records.len(), error = %e, "Embedding write failed");
                    report.failed += records.len();
                }
            }
        }

        info!(
            service = self.service.name(),
            candidates = report.candidates,
            embedded = report.embedded,
            skipped = report.skipped,
            failed = report.failed,
            "Embedding stage complete"
        );
        report
    }
}
