//! Model Provider Abstraction
//!
//! Unified interface over the chat-completion backends (OpenAI, DeepSeek,
//! Ollama, and an offline fake) and the adapter that exposes any of them to
//! the generation engine.

use crate::error::{GenerationError, ProviderError};
use crate::generation::{ContextPayload, GenerationService};
use crate::prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

pub mod clients;

pub use clients::{FakeClient, OllamaClient, OpenAICompatibleClient, FAKE_RESPONSE};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Completion options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>, // 0.0-2.0
    pub max_tokens: Option<u32>,  // Maximum tokens to generate
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Model provider client trait
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Generate a completion from a list of messages
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    DeepSeek,
    Ollama,
    Fake,
}

impl ProviderType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderType::OpenAI),
            "deepseek" => Some(ProviderType::DeepSeek),
            "ollama" => Some(ProviderType::Ollama),
            "fake" => Some(ProviderType::Fake),
            _ => None,
        }
    }

    fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderType::Ollama | ProviderType::Fake => None,
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,

    #[serde(default)]
    pub model: String,

    /// Inline key; prefer `api_key_env`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Base URL override (e.g. a local OpenAI-compatible server)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub options: CompletionOptions,
}

fn default_provider_type() -> ProviderType {
    ProviderType::Fake
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: String::new(),
            api_key: None,
            api_key_env: None,
            endpoint: None,
            options: CompletionOptions::default(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_type != ProviderType::Fake && self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid endpoint URL: {}", endpoint));
            }
        }
        if let Some(temperature) = self.options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!("Temperature must be in [0, 2], got {}", temperature));
            }
        }
        Ok(())
    }

    /// Inline key first, then the configured or conventional env variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let var = self
            .api_key_env
            .as_deref()
            .or_else(|| self.provider_type.default_api_key_env())?;
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }
}

/// Provider factory for creating provider clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        config: &ProviderConfig,
    ) -> Result<Box<dyn ModelProviderClient>, ProviderError> {
        match config.provider_type {
            ProviderType::OpenAI | ProviderType::DeepSeek => {
                let api_key = config.resolve_api_key().ok_or_else(|| {
                    ProviderError::NotConfigured(format!(
                        "no API key for {:?}; set api_key or api_key_env",
                        config.provider_type
                    ))
                })?;
                Ok(Box::new(OpenAICompatibleClient::new(
                    config.provider_type,
                    config.model.clone(),
                    api_key,
                    config.endpoint.clone(),
                )?))
            }
            ProviderType::Ollama => Ok(Box::new(OllamaClient::new(
                config.model.clone(),
                config.endpoint.clone(),
            )?)),
            ProviderType::Fake => Ok(Box::new(FakeClient::new())),
        }
    }
}

/// Exposes a chat-completion client as the engine's generation service
pub struct ProviderGenerationService {
    client: Box<dyn ModelProviderClient>,
    options: CompletionOptions,
}

impl ProviderGenerationService {
    pub fn new(client: Box<dyn ModelProviderClient>, options: CompletionOptions) -> Self {
        Self { client, options }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self::new(
            ProviderFactory::create_client(config)?,
            config.options.clone(),
        ))
    }
}

#[async_trait]
impl GenerationService for ProviderGenerationService {
    async fn generate(&self, payload: &ContextPayload) -> Result<String, GenerationError> {
        let messages = prompt::render_messages(payload);
        let started = Instant::now();

        let response = self
            .client
            .complete(messages, self.options.clone())
            .await
            .map_err(GenerationError::from)?;

        info!(
            node_id = %payload.node_id,
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            fold = payload.is_fold(),
            duration_ms = started.elapsed().as_millis() as u64,
            total_tokens = response.usage.total_tokens,
            "Provider request sent"
        );

        let content = response.content.trim();
        if content.is_empty() {
            debug!(node_id = %payload.node_id, finish_reason = ?response.finish_reason, "Empty completion");
            return Err(ProviderError::Malformed("empty completion".to_string()).into());
        }
        Ok(content.to_string())
    }

    fn name(&self) -> &str {
        self.client.provider_name()
    }
}
