//! # agent-runtime
//!
//! Runtime providers for the medassist agent.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama
//! - **Gemini**: Google Generative Language API, with native image/PDF input
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::ProviderConfig;
//!
//! let config = ProviderConfig::from_env()?;
//! let provider = config.build()?;
//! ```

use std::sync::Arc;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

#[cfg(feature = "gemini")]
pub use gemini::GeminiProvider;

// Re-export core types for convenience
pub use agent_core::{AgentError, LlmProvider, Message, Result};

/// Which backend serves completions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    Gemini,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(AgentError::Config(format!("Unknown provider: {}", other))),
        }
    }

    /// Model used for the tool-calling conversation
    pub const fn default_agent_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2",
            Self::Gemini => "gemini-1.5-flash-002",
        }
    }

    /// Model used for the decision reasoning session
    pub const fn default_decision_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2",
            Self::Gemini => "gemini-1.5-pro-002",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Provider selection (`MEDASSIST_PROVIDER`)
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self> {
        match std::env::var("MEDASSIST_PROVIDER") {
            Ok(value) => Ok(Self {
                kind: ProviderKind::parse(&value)?,
            }),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Construct the configured provider from its own environment settings
    pub fn build(&self) -> Result<Arc<dyn LlmProvider>> {
        match self.kind {
            #[cfg(feature = "ollama")]
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::from_env())),
            #[cfg(feature = "gemini")]
            ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::from_env()?)),
            #[allow(unreachable_patterns)]
            kind => Err(AgentError::Config(format!(
                "Provider '{}' is not compiled into this build",
                kind
            ))),
        }
    }
}
