//! Consultation Workflow
//!
//! Tracks where a consultation is in the intake → research → decision
//! routine and rejects tool calls that would skip a mandatory step.
//!
//! ```text
//! CollectingSymptoms → CollectingImages? → CollectingDocuments? → CollectingAdditionalInfo
//!        → Researching → Retrieving? → Deciding → Presenting
//! ```

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use agent_core::{Attachment, AttachmentKind};
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStep {
    CollectingSymptoms,
    CollectingImages,
    CollectingDocuments,
    CollectingAdditionalInfo,
    Researching,
    Retrieving,
    Deciding,
    Presenting,
}

/// Serializable view of a workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub current: ConsultationStep,
    pub completed: Vec<ConsultationStep>,
    pub doctor_turns: usize,
    pub research_done: bool,
    pub decisions: usize,
}

#[derive(Debug)]
struct State {
    current: ConsultationStep,
    completed: BTreeSet<ConsultationStep>,
    doctor_turns: usize,
    research_done: bool,
    decisions: usize,
}

/// Per-consultation step tracker
#[derive(Debug)]
pub struct Workflow {
    require_research: bool,
    state: Mutex<State>,
}

impl Workflow {
    pub fn new(require_research: bool) -> Self {
        Self {
            require_research,
            state: Mutex::new(State {
                current: ConsultationStep::CollectingSymptoms,
                completed: BTreeSet::new(),
                doctor_turns: 0,
                research_done: false,
                decisions: 0,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Record a doctor turn and what it carried
    pub fn observe_turn(&self, message: &str, attachments: &[Attachment]) {
        self.with_state(|s| {
            s.doctor_turns += 1;

            let first = s.doctor_turns == 1;
            if first && !message.trim().is_empty() {
                s.completed.insert(ConsultationStep::CollectingSymptoms);
            }
            if attachments.iter().any(|a| a.kind == AttachmentKind::Image) {
                s.completed.insert(ConsultationStep::CollectingImages);
                s.current = ConsultationStep::CollectingImages;
            }
            if attachments.iter().any(|a| a.kind == AttachmentKind::Document) {
                s.completed.insert(ConsultationStep::CollectingDocuments);
                s.current = ConsultationStep::CollectingDocuments;
            }
            if !first && !message.trim().is_empty() {
                s.completed.insert(ConsultationStep::CollectingAdditionalInfo);
                s.current = ConsultationStep::CollectingAdditionalInfo;
            }
        });
    }

    /// Research needs at least one doctor turn to research
    pub fn begin_research(&self) -> Result<()> {
        self.with_state(|s| {
            if s.doctor_turns == 0 {
                tracing::warn!("Research requested before any doctor input");
                return Err(AdvisorError::OutOfOrder {
                    step: "research",
                    missing: "doctor input",
                });
            }
            s.current = ConsultationStep::Researching;
            Ok(())
        })
    }

    pub fn research_succeeded(&self) {
        self.with_state(|s| {
            s.research_done = true;
            s.completed.insert(ConsultationStep::Researching);
        });
    }

    pub fn record_retrieval(&self) {
        self.with_state(|s| {
            s.current = ConsultationStep::Retrieving;
            s.completed.insert(ConsultationStep::Retrieving);
        });
    }

    /// A decision needs a successful research call when research is mandatory
    pub fn begin_decision(&self) -> Result<()> {
        self.with_state(|s| {
            if self.require_research && !s.research_done {
                tracing::warn!("Decision requested before research");
                return Err(AdvisorError::OutOfOrder {
                    step: "decision_maker",
                    missing: "research",
                });
            }
            s.current = ConsultationStep::Deciding;
            Ok(())
        })
    }

    pub fn decision_made(&self) {
        self.with_state(|s| {
            s.decisions += 1;
            s.completed.insert(ConsultationStep::Deciding);
        });
    }

    pub fn mark_presented(&self) {
        self.with_state(|s| {
            s.current = ConsultationStep::Presenting;
            s.completed.insert(ConsultationStep::Presenting);
        });
    }

    pub fn current(&self) -> ConsultationStep {
        self.with_state(|s| s.current)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.with_state(|s| WorkflowSnapshot {
            current: s.current,
            completed: s.completed.iter().copied().collect(),
            doctor_turns: s.doctor_turns,
            research_done: s.research_done,
            decisions: s.decisions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Attachment {
        Attachment::new(AttachmentKind::Image, "xray.png", "image/png", "aGVsbG8=")
    }

    #[test]
    fn test_research_before_input_is_rejected() {
        let workflow = Workflow::new(true);
        let err = workflow.begin_research().unwrap_err();
        assert_eq!(err.code(), "out_of_order");
        assert_eq!(workflow.current(), ConsultationStep::CollectingSymptoms);
    }

    #[test]
    fn test_decision_requires_research() {
        let workflow = Workflow::new(true);
        workflow.observe_turn("fatigue and weight loss", &[]);
        assert!(matches!(
            workflow.begin_decision(),
            Err(AdvisorError::OutOfOrder { missing: "research", .. })
        ));

        workflow.begin_research().unwrap();
        workflow.research_succeeded();
        workflow.begin_decision().unwrap();
        workflow.decision_made();
        workflow.mark_presented();

        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.current, ConsultationStep::Presenting);
        assert_eq!(snapshot.decisions, 1);
        assert!(snapshot.completed.contains(&ConsultationStep::Researching));
    }

    #[test]
    fn test_failed_research_does_not_unlock_decision() {
        let workflow = Workflow::new(true);
        workflow.observe_turn("fatigue", &[]);
        workflow.begin_research().unwrap();
        assert!(workflow.begin_decision().is_err());
    }

    #[test]
    fn test_optional_research() {
        let workflow = Workflow::new(false);
        workflow.observe_turn("fatigue", &[]);
        assert!(workflow.begin_decision().is_ok());
    }

    #[test]
    fn test_turns_advance_collection_steps() {
        let workflow = Workflow::new(true);
        workflow.observe_turn("fatigue, weight loss", &[]);
        workflow.observe_turn("", &[image()]);
        assert_eq!(workflow.current(), ConsultationStep::CollectingImages);

        workflow.observe_turn("HbA1c was 8.1% last month", &[]);
        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.current, ConsultationStep::CollectingAdditionalInfo);
        assert_eq!(
            snapshot.completed,
            vec![
                ConsultationStep::CollectingSymptoms,
                ConsultationStep::CollectingImages,
                ConsultationStep::CollectingAdditionalInfo,
            ]
        );
    }
}
