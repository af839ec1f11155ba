//! Advisor Configuration
//!
//! Environment-driven settings for consultations, research and decisions.

use std::time::Duration;

use crate::error::{AdvisorError, Result};
use crate::research::ReportType;

/// Consultation-level settings
#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    /// Model driving the tool-calling conversation
    pub agent_model: String,

    /// Model behind the decision reasoning session
    pub decision_model: String,

    /// Upper bound on one research call
    pub research_timeout: Duration,

    /// Non-system messages kept in the decision reasoning session
    pub decision_history_limit: usize,

    /// Reject decisions until research has succeeded in the session
    pub require_research: bool,

    /// Reasoning loop iterations per doctor turn
    pub max_iterations: usize,

    /// Report type requested from the research pipeline
    pub report_type: ReportType,

    /// Consultations idle longer than this are ended
    pub session_idle_timeout: Duration,

    /// Live consultations kept at once; the least recently active is ended first
    pub max_sessions: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            agent_model: "llama3.2".into(),
            decision_model: "llama3.2".into(),
            research_timeout: Duration::from_secs(300),
            decision_history_limit: 20,
            require_research: true,
            max_iterations: 12,
            report_type: ReportType::ResearchReport,
            session_idle_timeout: Duration::from_secs(3600),
            max_sessions: 1000,
        }
    }
}

impl AdvisorConfig {
    /// Read `MEDASSIST_*` variables, falling back to the given model defaults
    pub fn from_env(default_agent_model: &str, default_decision_model: &str) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            agent_model: env_or("MEDASSIST_MODEL", default_agent_model),
            decision_model: env_or("MEDASSIST_DECISION_MODEL", default_decision_model),
            research_timeout: Duration::from_secs(env_parse(
                "MEDASSIST_RESEARCH_TIMEOUT_SECS",
                defaults.research_timeout.as_secs(),
            )?),
            decision_history_limit: env_parse(
                "MEDASSIST_DECISION_HISTORY",
                defaults.decision_history_limit,
            )?,
            require_research: env_parse("MEDASSIST_REQUIRE_RESEARCH", defaults.require_research)?,
            max_iterations: env_parse("MEDASSIST_MAX_ITERATIONS", defaults.max_iterations)?,
            report_type: match std::env::var("MEDASSIST_REPORT_TYPE") {
                Ok(value) => ReportType::parse(&value)?,
                Err(_) => defaults.report_type,
            },
            session_idle_timeout: Duration::from_secs(env_parse(
                "MEDASSIST_SESSION_IDLE_SECS",
                defaults.session_idle_timeout.as_secs(),
            )?),
            max_sessions: env_parse("MEDASSIST_MAX_SESSIONS", defaults.max_sessions)?,
        })
    }
}

/// Research pipeline settings
#[derive(Clone, Debug)]
pub struct ResearchSettings {
    /// Model used for planning and composing reports
    pub model: String,

    /// Sub-queries planned per research call
    pub max_sub_queries: usize,

    /// Search hits requested per sub-query
    pub max_results_per_query: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            max_sub_queries: 3,
            max_results_per_query: 5,
        }
    }
}

impl ResearchSettings {
    pub fn from_env(model: &str) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            model: model.to_string(),
            max_sub_queries: env_parse("MEDASSIST_RESEARCH_SUBQUERIES", defaults.max_sub_queries)?,
            max_results_per_query: env_parse(
                "MEDASSIST_RESEARCH_RESULTS",
                defaults.max_results_per_query,
            )?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AdvisorError::Config(format!("{}={:?}: {}", key, raw, e)))
}
