//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference. Images are
//! forwarded natively; text documents are inlined into the message body.

use agent_core::{
    error::{AgentError, Result},
    message::{AttachmentKind, Message, Role},
    provider::{
        Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
        TokenUsage,
    },
};
use async_trait::async_trait;
use base64::Engine as _;
use ollama_rs::{
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
        images::Image,
    },
    models::ModelOptions as OllamaOptions,
    Ollama,
};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self { host, port }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                    Role::Tool => MessageRole::User, // Tools appear as user context
                };

                let mut content = m.content.clone();
                let mut images = Vec::new();

                for attachment in &m.attachments {
                    match attachment.kind {
                        AttachmentKind::Image => images.push(Image::from_base64(&attachment.data)),
                        AttachmentKind::Document => {
                            content.push_str(&Self::inline_document(
                                &attachment.filename,
                                &attachment.media_type,
                                attachment.is_text().then_some(attachment.data.as_str()),
                            ));
                        }
                    }
                }

                let message = ChatMessage::new(role, content);
                if images.is_empty() {
                    message
                } else {
                    message.with_images(images)
                }
            })
            .collect()
    }

    /// Render a document attachment as message text
    fn inline_document(filename: &str, media_type: &str, text_base64: Option<&str>) -> String {
        let decoded = text_base64.and_then(|data| {
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        });

        match decoded {
            Some(text) => format!("\n\n[Document: {}]\n{}\n[End of document]", filename, text),
            None => format!(
                "\n\n[Document: {} ({}) attached but cannot be read by this model]",
                filename, media_type
            ),
        }
    }

    /// Convert Ollama response to agent completion
    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            content: response.message.content,
            model: model.to_string(),
            usage: response.final_data.as_ref().map(|d| {
                let prompt = u32::try_from(d.prompt_eval_count).unwrap_or(u32::MAX);
                let completion = u32::try_from(d.eval_count).unwrap_or(u32::MAX);
                TokenUsage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt.saturating_add(completion),
                }
            }),
            truncated: false,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
            .stop(opts.stop_sequences.clone())
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: "Ollama".into(),
            version: None, // Ollama API doesn't expose version
            models,
            supports_attachments: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let ollama_messages = Self::convert_messages(messages);
        let ollama_options = Self::build_options(options);

        let request = ChatMessageRequest::new(
            options.model.clone(),
            ollama_messages,
        ).options(ollama_options);

        let response = self.client
            .send_chat_messages(request)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(Self::convert_completion(response, &options.model))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self.client
            .list_local_models()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
                context_length: None, // Not exposed by Ollama API
                supports_vision: false, // Would need to check model details
            })
            .collect())
    }
}
