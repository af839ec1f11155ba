//! Research Tool
//!
//! Runs the research pipeline for a clinical question and stores the
//! report in the case's research slot.

use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    tool::ParameterSchema,
    Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema,
};
use async_trait::async_trait;

use crate::case::CaseContext;
use crate::error::{AdvisorError, Result};
use crate::research::{ReportType, ResearchPipeline, ResearchRequest};
use crate::store::Slot;

pub const NAME: &str = "research";

pub struct ResearchTool {
    case: Arc<CaseContext>,
    pipeline: Arc<dyn ResearchPipeline>,
    timeout: Duration,
    report_type: ReportType,
}

impl ResearchTool {
    pub fn new(
        case: Arc<CaseContext>,
        pipeline: Arc<dyn ResearchPipeline>,
        timeout: Duration,
        report_type: ReportType,
    ) -> Self {
        Self {
            case,
            pipeline,
            timeout,
            report_type,
        }
    }

    /// Research `query` to completion and return the stored report
    ///
    /// Returns only once the pipeline has finished or the timeout has
    /// dropped it. A report is never empty.
    pub async fn research(&self, query: &str) -> Result<String> {
        self.case.ensure_active()?;

        let query = query.trim();
        if query.is_empty() {
            return Err(AdvisorError::MissingInput("query"));
        }
        self.case.workflow().begin_research()?;

        let _slot = self.case.research_slot().lock().await;
        tracing::info!(
            session = %self.case.id(),
            pipeline = self.pipeline.name(),
            query_len = query.len(),
            "Research started"
        );

        let request = ResearchRequest::new(query, self.report_type);
        let outcome = tokio::time::timeout(self.timeout, self.pipeline.run(&request))
            .await
            .map_err(|_| {
                tracing::warn!(session = %self.case.id(), timeout_secs = self.timeout.as_secs(), "Research timed out");
                AdvisorError::ResearchTimeout(self.timeout.as_secs())
            })??;

        let report = match outcome {
            Some(report) if !report.trim().is_empty() => report,
            _ => {
                return Err(AdvisorError::ResearchUnavailable(format!(
                    "no report produced for the query by {}",
                    self.pipeline.name()
                )));
            }
        };

        // a case ended mid-research must not receive the report
        self.case.ensure_active()?;
        self.case.store().write(Slot::Research, report.clone()).await;
        self.case.workflow().research_succeeded();

        tracing::info!(session = %self.case.id(), report_len = report.len(), "Research stored");
        Ok(report)
    }
}

#[async_trait]
impl Tool for ResearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "Conduct medical research on a clinical question and write a report. The report is also stored for retrieve_tool_results.".into(),
            parameters: vec![ParameterSchema::text(
                "query",
                "The clinical question to research",
                true,
            )],
            category: Some("research".into()),
            has_side_effects: true,
        }
    }

    // blank and missing queries are both reported as missing input
    fn validate(&self, _call: &ToolCall) -> CoreResult<()> {
        Ok(())
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let query = call.text_arg("query").unwrap_or_default();

        Ok(match self.research(query).await {
            Ok(report) => ToolResult::success(NAME, report),
            Err(e) => super::failure(NAME, &e),
        })
    }
}
