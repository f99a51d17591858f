//! Concrete chat-completion clients.

use super::{
    ChatMessage, CompletionOptions, CompletionResponse, MessageRole, ModelProviderClient,
    ProviderType, TokenUsage,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text returned by the offline backend for every request.
pub const FAKE_RESPONSE: &str = "This part implements important functionalities.";

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_provider_http_client() -> Result<Client, ProviderError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Other(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn map_http_error(error: reqwest::Error) -> ProviderError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        ProviderError::Timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ProviderError::Connection(format!("Connection error: {}", error))
    } else {
        ProviderError::Other(format!("HTTP error: {}", error))
    }
}

pub(crate) fn map_status(status: u16, message: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthFailed(message),
        429 => ProviderError::RateLimit(message),
        404 => ProviderError::ModelNotFound(message),
        _ => ProviderError::RequestFailed { status, message },
    }
}

/// Turn a non-success response into a provider error, keeping the body text.
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status(status.as_u16(), error_text))
}

fn role_to_string(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

// OpenAI-compatible wire format (also served by DeepSeek and Ollama)
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

async fn post_chat_completion(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    model: &str,
    messages: Vec<ChatMessage>,
    options: CompletionOptions,
) -> Result<CompletionResponse, ProviderError> {
    let request = ChatCompletionRequest {
        model: model.to_string(),
        messages: messages
            .into_iter()
            .map(|msg| OpenAIMessage {
                role: role_to_string(msg.role).to_string(),
                content: msg.content,
            })
            .collect(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stream: false,
    };

    let mut builder = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(&request);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }

    let response = builder.send().await.map_err(map_http_error)?;
    let response = check_status(response).await?;

    let completion: ChatCompletionResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))?;

    let usage = completion.usage.unwrap_or_default();
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("No choices in response".to_string()))?;

    Ok(CompletionResponse {
        content: choice.message.content,
        model: completion.model,
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
        finish_reason: choice.finish_reason,
    })
}

/// OpenAI and DeepSeek client; both speak the same chat-completions API
pub struct OpenAICompatibleClient {
    client: Client,
    provider: &'static str,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAICompatibleClient {
    pub fn new(
        provider_type: ProviderType,
        model: String,
        api_key: String,
        base_url: Option<String>,
    ) -> Result<Self, ProviderError> {
        let (provider, default_base) = match provider_type {
            ProviderType::DeepSeek => ("deepseek", "https://api.deepseek.com/v1"),
            _ => ("openai", "https://api.openai.com/v1"),
        };
        Ok(Self {
            client: build_provider_http_client()?,
            provider,
            model,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelProviderClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        post_chat_completion(
            &self.client,
            &url,
            Some(&self.api_key),
            &self.model,
            messages,
            options,
        )
        .await
    }

    fn provider_name(&self) -> &str {
        self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Local Ollama server through its OpenAI-compatible endpoint
pub struct OllamaClient {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaClient {
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

#[async_trait]
impl ModelProviderClient for OllamaClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        post_chat_completion(&self.client, &url, None, &self.model, messages, options).await
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline backend that answers every request with [`FAKE_RESPONSE`]
#[derive(Debug, Default)]
pub struct FakeClient;

impl FakeClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelProviderClient for FakeClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let prompt_tokens: usize = messages.iter().map(|m| m.content.len().div_ceil(4)).sum();
        Ok(CompletionResponse {
            content: FAKE_RESPONSE.to_string(),
            model: "fake".to_string(),
            usage: TokenUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: 8,
                total_tokens: prompt_tokens as u32 + 8,
            },
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}
