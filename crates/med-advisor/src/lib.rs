//! # med-advisor
//!
//! Medical decision-support agent. A doctor's query, with optional images
//! and documents, is routed through a tool-calling conversation that
//! researches the question, synthesizes an explainable decision and
//! presents only that decision.
//!
//! ## Consultation flow
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Consultation (one per session id)                               │
//! │                                                                  │
//! │  doctor turn ──► Agent ──► research ──────────► ResearchStore    │
//! │                    │                                 │           │
//! │                    ├──► retrieve_tool_results ◄──────┘           │
//! │                    │                                             │
//! │                    └──► decision_maker ──► ReasoningSession      │
//! │                                 │                                │
//! │  reply ◄──── plain decision text┘                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every consultation owns its [`CaseContext`]: research results and
//! decision history never cross sessions. The [`Workflow`] rejects a
//! decision until research has succeeded (configurable).

pub mod case;
pub mod config;
pub mod consultation;
pub mod decision;
pub mod error;
pub mod intake;
pub mod research;
pub mod store;
pub mod svckit;
pub mod workflow;

pub use case::CaseContext;
pub use config::{AdvisorConfig, ResearchSettings};
pub use consultation::{Collaborators, Consultation, ConsultationManager, ConsultationReply};
pub use decision::{AnalysisBundle, DecisionReport, ReasoningSession};
pub use error::{AdvisorError, Result};
pub use intake::{StagedFile, UploadArea};
pub use research::{ReportType, ResearchPipeline, ResearchRequest};
pub use store::{ResearchStore, Slot};
pub use workflow::{ConsultationStep, Workflow, WorkflowSnapshot};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{DecisionTool, ResearchTool, ResultsRetrievalTool};
}

/// System prompt for the orchestrating agent
pub const MEDICAL_ASSISTANT_PROMPT: &str = r#"You are an AI assistant supporting medical professionals in the diagnostic process. Follow this routine strictly, in order, using only the provided tools:

1. Request and analyze the patient's symptoms.
2. If available, request medical images and analyze them.
3. If available, request EHRs and medical documents and analyze them.
4. Ask the doctor for any additional information.
5. Call `research` with a focused clinical question.
6. When the research result is returned, continue with the next steps.
7. If needed, call `retrieve_tool_results` to collect all stored results.
8. Call `decision_maker`, passing everything you collected. Leave an input empty if it was not provided; never invent it.
9. Present ONLY the `decision_maker` output to the doctor, without JSON or other formatting.

If a tool fails, tell the doctor plainly what could not be done and what is needed, or ask for the missing information.
Do not provide intermediate results or your own interpretations.
Always defer to the doctor's judgment."#;
