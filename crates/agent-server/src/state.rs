//! Application State

use std::sync::Arc;

use agent_core::LlmProvider;
use med_advisor::{ConsultationManager, UploadArea};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Orchestrating model provider (health and model listing)
    pub provider: Arc<dyn LlmProvider>,

    /// Live consultations keyed by session id
    pub consultations: Arc<ConsultationManager>,

    /// Staging directory for uploaded images and documents
    pub uploads: UploadArea,
}
