//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Parse error (e.g., provider response parsing)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation exceeded its time budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Stable machine-readable code, surfaced in tool results and API errors
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Provider(_) => "provider_error",
            AgentError::ProviderUnavailable(_) => "provider_unavailable",
            AgentError::ToolNotFound(_) => "tool_not_found",
            AgentError::ToolValidation(_) => "tool_validation",
            AgentError::ToolExecution(_) => "tool_execution",
            AgentError::MaxIterations(_) => "max_iterations",
            AgentError::Parse(_) => "parse_error",
            AgentError::Timeout(_) => "timeout",
            AgentError::Config(_) => "config_error",
            AgentError::RateLimited(_) => "rate_limited",
            AgentError::Auth(_) => "auth_failed",
            AgentError::Io(_) => "io_error",
            AgentError::Json(_) => "json_error",
            AgentError::Other(_) => "internal_error",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(_) | AgentError::Parse(_) => {
                "The requested analysis could not be completed because the language model returned an error.".into()
            }
            AgentError::ProviderUnavailable(_) => {
                "The requested analysis could not be completed because the language model is unavailable. Please try again.".into()
            }
            AgentError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolValidation(msg) => format!("Invalid tool input: {}", msg),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::MaxIterations(_) => {
                "The requested analysis could not be completed in the allowed number of steps. Please narrow the question.".into()
            }
            AgentError::Timeout(secs) => {
                format!("The requested analysis could not be completed within {} seconds.", secs)
            }
            AgentError::RateLimited(_) => "Too many requests were made. Please wait a moment.".into(),
            AgentError::Auth(_) => "The language model rejected the configured credentials.".into(),
            _ => "The requested analysis could not be completed because of an unexpected error.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_details() {
        let err = AgentError::Provider("HTTP 500: stack trace at line 42".into());
        assert!(!err.user_message().contains("line 42"));
        assert_eq!(err.code(), "provider_error");
    }
}
