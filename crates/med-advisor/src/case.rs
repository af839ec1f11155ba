//! Case Context
//!
//! All mutable state of one consultation: research store, decision
//! reasoning session, workflow tracker. Tools are bound to one context, so
//! nothing is shared between consultations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use agent_core::{LlmProvider, SessionId};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::AdvisorConfig;
use crate::decision::ReasoningSession;
use crate::error::{AdvisorError, Result};
use crate::store::ResearchStore;
use crate::workflow::Workflow;

pub struct CaseContext {
    id: SessionId,
    store: ResearchStore,
    reasoning: ReasoningSession,
    workflow: Workflow,
    research_slot: Mutex<()>,
    ended: AtomicBool,
    last_active: std::sync::Mutex<Instant>,
}

impl CaseContext {
    pub fn new(id: SessionId, decision_provider: Arc<dyn LlmProvider>, config: &AdvisorConfig) -> Self {
        Self {
            id,
            store: ResearchStore::new(),
            reasoning: ReasoningSession::new(
                decision_provider,
                config.decision_model.clone(),
                config.decision_history_limit,
            ),
            workflow: Workflow::new(config.require_research),
            research_slot: Mutex::new(()),
            ended: AtomicBool::new(false),
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn store(&self) -> &ResearchStore {
        &self.store
    }

    pub fn reasoning(&self) -> &ReasoningSession {
        &self.reasoning
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Serializes writers of the research slot
    pub fn research_slot(&self) -> &Mutex<()> {
        &self.research_slot
    }

    /// Record activity on the case
    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        self.last_active().elapsed()
    }

    /// Fail with `StaleSession` once the case has ended
    pub fn ensure_active(&self) -> Result<()> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(AdvisorError::StaleSession(self.id.to_string()));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.ended.load(Ordering::SeqCst)
    }

    /// Mark ended and drop the reasoning history
    pub async fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.reasoning.reset().await;
            tracing::info!(session = %self.id, "Case ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::MockProvider;

    #[tokio::test]
    async fn test_ended_case_is_stale() {
        let case = CaseContext::new(
            SessionId::from_string("case-1"),
            Arc::new(MockProvider::scripted(Vec::new())),
            &AdvisorConfig::default(),
        );
        assert!(case.ensure_active().is_ok());

        case.end().await;
        let err = case.ensure_active().unwrap_err();
        assert!(matches!(err, AdvisorError::StaleSession(ref id) if id == "case-1"));
        assert!(!case.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_time() {
        let case = CaseContext::new(
            SessionId::from_string("case-2"),
            Arc::new(MockProvider::scripted(Vec::new())),
            &AdvisorConfig::default(),
        );

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(case.idle_for(), Duration::from_secs(90));

        case.touch();
        assert_eq!(case.idle_for(), Duration::ZERO);
    }
}
