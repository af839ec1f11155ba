//! Mock LLM Provider
//!
//! For testing and demo purposes. Replies from a script or a closure and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo};

type Responder = Box<dyn Fn(&[Message]) -> String + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Func(Responder),
    Fail(String),
}

/// Deterministic provider for tests
pub struct MockProvider {
    script: Script,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Reply with each scripted response in order; errors once exhausted
    pub fn scripted(responses: Vec<String>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(responses.into())))
    }

    /// Compute each reply from the full message list
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&[Message]) -> String + Send + Sync + 'static,
    {
        Self::with_script(Script::Func(Box::new(responder)))
    }

    /// Fail every completion with a provider error
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(reason.into()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every message list passed to `complete`, in call order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "Mock".into(),
            version: None,
            models: self.list_models().await?,
            supports_attachments: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!matches!(self.script, Script::Fail(_)))
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let content = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| AgentError::Provider("mock script exhausted".into()))?,
            Script::Func(responder) => responder(messages),
            Script::Fail(reason) => return Err(AgentError::ProviderUnavailable(reason.clone())),
        };

        Ok(Completion::text(content, options.model.clone()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "mock".into(),
            name: "mock".into(),
            context_length: None,
            supports_vision: true,
        }])
    }
}
