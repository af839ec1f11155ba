//! Reasoning Session
//!
//! The decision step's own multi-turn context. Scoped to one consultation
//! and bounded to the most recent messages.

use std::sync::Arc;

use agent_core::{
    message::{Conversation, Message},
    provider::{GenerationOptions, LlmProvider},
};
use tokio::sync::Mutex;

use super::prompt::DECISION_SYSTEM_PROMPT;
use super::{AnalysisBundle, DecisionReport};
use crate::error::{AdvisorError, Result};

pub struct ReasoningSession {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    history_limit: usize,
    conversation: Mutex<Conversation>,
}

impl ReasoningSession {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, history_limit: usize) -> Self {
        Self {
            provider,
            options: GenerationOptions {
                temperature: 0.3,
                max_tokens: 4096,
                ..GenerationOptions::for_model(model)
            },
            history_limit,
            conversation: Mutex::new(Conversation::with_system_prompt(DECISION_SYSTEM_PROMPT)),
        }
    }

    /// Ask for a decision on the bundle, keeping the exchange in history
    pub async fn decide(&self, bundle: &AnalysisBundle) -> Result<DecisionReport> {
        bundle.validate()?;

        let mut conversation = self.conversation.lock().await;
        conversation.push(Message::user(bundle.to_prompt()));

        let completion = match self.provider.complete(conversation.messages(), &self.options).await {
            Ok(completion) => completion,
            Err(e) => {
                // unanswered prompt is not kept
                conversation.messages_mut().pop();
                tracing::warn!(error = %e, "Decision model call failed");
                return Err(e.into());
            }
        };

        let answer = completion.content.trim().to_string();
        if answer.is_empty() {
            conversation.messages_mut().pop();
            return Err(AdvisorError::ExternalService("decision model returned no text".into()));
        }

        conversation.push(Message::assistant(&answer));
        conversation.retain_recent(self.history_limit);

        tracing::debug!(
            history = conversation.len(),
            tokens = completion.usage.map(|u| u.total_tokens).unwrap_or(0),
            "Decision produced"
        );

        Ok(DecisionReport::parse(&answer, &bundle.absent()))
    }

    /// Messages currently held, system prompt included
    pub async fn history_len(&self) -> usize {
        self.conversation.lock().await.len()
    }

    /// Drop all exchanges, keeping the standing instructions
    pub async fn reset(&self) {
        *self.conversation.lock().await = Conversation::with_system_prompt(DECISION_SYSTEM_PROMPT);
    }
}
