//! Research Integration
//!
//! The research pipeline is an opaque collaborator: given a clinical
//! question it gathers evidence and composes a report. `ResearchTool`
//! only invokes it, bounds it, and captures its result.

pub mod mock;
mod pipeline;
mod search;

pub use mock::{StaticResearchPipeline, StaticSearch};
pub use pipeline::LlmResearchPipeline;
pub use search::{SearchBackend, SearchHit, TavilySearch};

use std::sync::Arc;

use agent_core::LlmProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ResearchSettings;
use crate::error::{AdvisorError, Result};

/// Kind of report the pipeline should compose
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Full narrative report with findings and sources
    ResearchReport,
    /// Annotated list of sources
    ResourceReport,
    /// Structured outline only
    OutlineReport,
}

impl ReportType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "research_report" => Ok(Self::ResearchReport),
            "resource_report" => Ok(Self::ResourceReport),
            "outline_report" => Ok(Self::OutlineReport),
            other => Err(AdvisorError::Config(format!("Unknown report type: {}", other))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResearchReport => "research_report",
            Self::ResourceReport => "resource_report",
            Self::OutlineReport => "outline_report",
        }
    }
}

/// One research task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    pub report_type: ReportType,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, report_type: ReportType) -> Self {
        Self {
            query: query.into(),
            report_type,
        }
    }
}

/// Multi-step research collaborator (Strategy pattern)
///
/// `Ok(None)` means the pipeline ran but produced no report; an `Err`
/// means a collaborator (model, search backend) failed.
#[async_trait]
pub trait ResearchPipeline: Send + Sync {
    async fn run(&self, request: &ResearchRequest) -> Result<Option<String>>;

    /// Pipeline name for logs
    fn name(&self) -> &str;
}

/// Stand-in when no search backend is configured; every run fails
pub struct UnavailableResearch {
    reason: String,
}

impl UnavailableResearch {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl ResearchPipeline for UnavailableResearch {
    async fn run(&self, _request: &ResearchRequest) -> Result<Option<String>> {
        Err(AdvisorError::ExternalService(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// LLM research over Tavily when `TAVILY_API_KEY` is set
pub fn pipeline_from_env(
    provider: Arc<dyn LlmProvider>,
    settings: ResearchSettings,
) -> Arc<dyn ResearchPipeline> {
    match TavilySearch::from_env() {
        Ok(search) => {
            tracing::info!(model = %settings.model, "Research pipeline: LLM + Tavily");
            Arc::new(LlmResearchPipeline::new(provider, Arc::new(search), settings))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Web search not configured - research calls will fail");
            Arc::new(UnavailableResearch::new("web search is not configured"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_research_is_external_failure() {
        let err = UnavailableResearch::new("no key")
            .run(&ResearchRequest::new("q", ReportType::ResearchReport))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "external_service_failure");
    }

    #[test]
    fn test_report_type_parse() {
        assert_eq!(ReportType::parse("outline_report").unwrap(), ReportType::OutlineReport);
        assert_eq!(ReportType::ResearchReport.as_str(), "research_report");
        assert!(ReportType::parse("custom").is_err());
    }
}
