//! Gemini LLM Provider
//!
//! Implementation of `LlmProvider` over the Generative Language REST API.
//! Attachments travel as `inline_data` parts, so images and PDFs reach the
//! model without local preprocessing.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
        TokenUsage,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key (`GOOGLE_API_KEY`)
    pub api_key: String,

    /// API base URL, overridable for proxies
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 180,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| AgentError::Config("GOOGLE_API_KEY is not set".into()))?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<RemoteModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteModel {
    name: String,
    display_name: Option<String>,
    input_token_limit: Option<u32>,
}

/// Gemini LLM provider
pub struct GeminiProvider {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(GeminiConfig::from_env()?)
    }

    /// Build the request body; system messages become the system instruction
    fn build_request(messages: &[Message], options: &GenerationOptions) -> GenerateRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut contents: Vec<Content> = Vec::new();
        for m in messages.iter().filter(|m| m.role != Role::System) {
            let role = match m.role {
                Role::Assistant => "model",
                _ => "user",
            };

            let mut parts: Vec<Part> = m
                .attachments
                .iter()
                .map(|a| Part::Inline {
                    inline_data: InlineData {
                        mime_type: a.media_type.clone(),
                        data: a.data.clone(),
                    },
                })
                .collect();
            if !m.content.is_empty() {
                parts.push(Part::Text { text: m.content.clone() });
            }
            // The API rejects contents without parts
            if parts.is_empty() {
                continue;
            }

            // Consecutive turns from the same side are merged into one content
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
                _ => contents.push(Content {
                    role: Some(role.into()),
                    parts,
                }),
            }
        }

        GenerateRequest {
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part::Text { text: system.join("\n\n") }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: options.temperature,
                top_p: options.top_p,
                max_output_tokens: options.max_tokens,
                stop_sequences: options.stop_sequences.clone(),
            },
        }
    }

    fn convert_completion(response: GenerateResponse, model: &str) -> Result<Completion> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("Gemini returned no candidates".into()))?;

        let reason = candidate.finish_reason.as_deref().unwrap_or("UNKNOWN");
        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text),
                        Part::Inline { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| AgentError::Provider(format!("Gemini returned no content (finish reason {})", reason)))?;

        let finish_reason = candidate.finish_reason.as_deref().map(|r| match r {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                FinishReason::ContentFilter
            }
            _ => FinishReason::Error,
        });

        Ok(Completion {
            content,
            model: model.to_string(),
            usage: response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
            truncated: finish_reason == Some(FinishReason::Length),
            finish_reason,
        })
    }

    fn status_error(status: reqwest::StatusCode, body: &str) -> AgentError {
        let detail = format!("HTTP {}: {}", status.as_u16(), body);
        match status.as_u16() {
            401 | 403 => AgentError::Auth(detail),
            429 => AgentError::RateLimited(detail),
            500..=599 => AgentError::ProviderUnavailable(detail),
            _ => AgentError::Provider(detail),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(Self::status_error(status, &body))
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: "Gemini".into(),
            version: Some("v1beta".into()),
            models,
            supports_attachments: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Gemini health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = Self::build_request(messages, options);
        let url = format!("{}/models/{}:generateContent", self.config.base_url, options.model);

        let raw = self
            .send(
                self.http
                    .post(url)
                    .query(&[("key", self.config.api_key.as_str())])
                    .json(&body),
            )
            .await?;

        let response: GenerateResponse =
            serde_json::from_str(&raw).map_err(|e| AgentError::Parse(e.to_string()))?;
        Self::convert_completion(response, &options.model)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let raw = self
            .send(
                self.http
                    .get(format!("{}/models", self.config.base_url))
                    .query(&[("key", self.config.api_key.as_str())]),
            )
            .await?;

        let list: ModelList =
            serde_json::from_str(&raw).map_err(|e| AgentError::Parse(e.to_string()))?;

        Ok(list
            .models
            .into_iter()
            .map(|m| {
                let id = m.name.trim_start_matches("models/").to_string();
                ModelInfo {
                    name: m.display_name.unwrap_or_else(|| id.clone()),
                    id,
                    context_length: m.input_token_limit,
                    supports_vision: true,
                }
            })
            .collect())
    }
}
