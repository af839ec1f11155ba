//! Error Types for the Medical Advisor

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {
    /// A required input (query, symptoms, message) was empty
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Research unavailable: {0}")]
    ResearchUnavailable(String),

    #[error("Research timed out after {0}s")]
    ResearchTimeout(u64),

    /// Model or research collaborator failed
    #[error("External service failure: {0}")]
    ExternalService(String),

    /// Session was ended; its state must not be reused
    #[error("Session {0} has ended")]
    StaleSession(String),

    /// The orchestrating agent ran out of reasoning steps for the turn
    #[error("Turn exceeded {0} reasoning steps")]
    StepLimit(usize),

    #[error("Step '{step}' requires '{missing}' first")]
    OutOfOrder {
        step: &'static str,
        missing: &'static str,
    },

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdvisorError {
    /// Stable code reported to the orchestrating agent and API clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::ResearchUnavailable(_) => "research_unavailable",
            Self::ResearchTimeout(_) => "research_timeout",
            Self::ExternalService(_) => "external_service_failure",
            Self::StaleSession(_) => "stale_session",
            Self::StepLimit(_) => "step_limit",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::InvalidUpload(_) => "invalid_upload",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Plain statement of what could not be done, without internals
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingInput(field) => format!(
                "The requested analysis could not be completed: the {} was not provided. Please supply it so no information has to be assumed.",
                field.replace('_', " ")
            ),
            Self::ResearchUnavailable(_) => {
                "The requested analysis could not be completed: the research step found no usable evidence.".into()
            }
            Self::ResearchTimeout(secs) => format!(
                "The requested analysis could not be completed: research did not finish within {} seconds.",
                secs
            ),
            Self::ExternalService(_) => {
                "The requested analysis could not be completed: an external service is unavailable. Please try again later.".into()
            }
            Self::StaleSession(_) => {
                "This consultation has ended. Please start a new one.".into()
            }
            Self::StepLimit(_) => {
                "The requested analysis could not be completed in the allowed number of steps. Please narrow the question or provide the missing details.".into()
            }
            Self::OutOfOrder { step, missing } => format!(
                "The requested analysis could not be completed: {} requires {} to be done first.",
                step, missing
            ),
            Self::InvalidUpload(reason) => format!("The file could not be accepted: {}", reason),
            _ => "The requested analysis could not be completed because of an internal error.".into(),
        }
    }
}

impl From<AgentError> for AdvisorError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config(msg) => Self::Config(msg),
            AgentError::Io(e) => Self::Io(e),
            AgentError::MaxIterations(steps) => Self::StepLimit(steps),
            other => Self::ExternalService(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_for_taxonomy() {
        let codes = [
            AdvisorError::MissingInput("symptoms").code(),
            AdvisorError::ResearchUnavailable("none".into()).code(),
            AdvisorError::ExternalService("down".into()).code(),
            AdvisorError::StaleSession("s".into()).code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_user_message_has_no_internals() {
        let err = AdvisorError::ExternalService("reqwest error: tcp connect 10.0.0.1:443".into());
        let msg = err.user_message();
        assert!(msg.starts_with("The requested analysis could not be completed"));
        assert!(!msg.contains("10.0.0.1"));
    }

    #[test]
    fn test_agent_error_maps_to_external_service() {
        let err: AdvisorError = AgentError::ProviderUnavailable("offline".into()).into();
        assert!(matches!(err, AdvisorError::ExternalService(_)));
        assert_eq!(
            AdvisorError::MissingInput("doctor_query").user_message(),
            "The requested analysis could not be completed: the doctor query was not provided. Please supply it so no information has to be assumed."
        );
    }

    #[test]
    fn test_step_limit_is_not_an_outage() {
        let err: AdvisorError = AgentError::MaxIterations(12).into();
        assert!(matches!(err, AdvisorError::StepLimit(12)));
        assert_eq!(err.code(), "step_limit");
        assert!(!err.user_message().contains("external service"));
    }
}
