//! Results Retrieval Tool
//!
//! Read accessor over the case's research store.

use std::collections::BTreeMap;
use std::sync::Arc;

use agent_core::{Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema};
use async_trait::async_trait;

use crate::case::CaseContext;
use crate::error::Result;

pub const NAME: &str = "retrieve_tool_results";

pub struct ResultsRetrievalTool {
    case: Arc<CaseContext>,
}

impl ResultsRetrievalTool {
    pub fn new(case: Arc<CaseContext>) -> Self {
        Self { case }
    }

    /// Everything stored so far; empty before any research
    pub async fn retrieve_all(&self) -> Result<BTreeMap<String, String>> {
        self.case.ensure_active()?;
        let results = self.case.store().read_all().await;
        self.case.workflow().record_retrieval();
        tracing::debug!(session = %self.case.id(), slots = results.len(), "Results retrieved");
        Ok(results)
    }
}

#[async_trait]
impl Tool for ResultsRetrievalTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "Retrieve all results stored by earlier tool calls in this consultation (currently the latest research report under \"research\").".into(),
            parameters: Vec::new(),
            category: Some("research".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, _call: &ToolCall) -> CoreResult<ToolResult> {
        let results = match self.retrieve_all().await {
            Ok(results) => results,
            Err(e) => return Ok(super::failure(NAME, &e)),
        };

        let data = serde_json::to_value(&results)?;
        let output = serde_json::to_string_pretty(&results)?;
        Ok(ToolResult::success(NAME, output).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorConfig;
    use crate::research::{ReportType, StaticResearchPipeline};
    use crate::svckit::ResearchTool;
    use agent_core::mock::MockProvider;
    use agent_core::SessionId;
    use std::time::Duration;

    fn case() -> Arc<CaseContext> {
        let case = CaseContext::new(
            SessionId::new(),
            Arc::new(MockProvider::scripted(Vec::new())),
            &AdvisorConfig::default(),
        );
        case.workflow().observe_turn("fatigue", &[]);
        Arc::new(case)
    }

    #[tokio::test]
    async fn test_cold_store_is_empty_not_error() {
        let tool = ResultsRetrievalTool::new(case());

        assert!(tool.retrieve_all().await.unwrap().is_empty());

        let result = tool.execute(&ToolCall::new(NAME)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "{}");
    }

    #[tokio::test]
    async fn test_returns_exactly_the_research_report() {
        let case = case();
        let research = ResearchTool::new(
            case.clone(),
            Arc::new(StaticResearchPipeline::echo()),
            Duration::from_secs(5),
            ReportType::ResearchReport,
        );
        let report = research.research("X").await.unwrap();

        let results = ResultsRetrievalTool::new(case).retrieve_all().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["research"], report);
    }
}
