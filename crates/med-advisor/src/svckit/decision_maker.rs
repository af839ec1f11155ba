//! Decision Maker Tool
//!
//! Synthesizes the final recommendation from everything collected in the
//! consultation.

use std::sync::Arc;

use agent_core::{
    tool::ParameterSchema,
    Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema,
};
use async_trait::async_trait;

use crate::case::CaseContext;
use crate::decision::{AnalysisBundle, DecisionReport};
use crate::error::Result;
use crate::store::Slot;

pub const NAME: &str = "decision_maker";

pub struct DecisionTool {
    case: Arc<CaseContext>,
}

impl DecisionTool {
    pub fn new(case: Arc<CaseContext>) -> Self {
        Self { case }
    }

    /// Decide on the bundle within this case's reasoning session
    ///
    /// Without a research argument the case's stored research is used.
    pub async fn decide(&self, mut bundle: AnalysisBundle) -> Result<DecisionReport> {
        self.case.ensure_active()?;
        bundle.validate()?;
        self.case.workflow().begin_decision()?;

        if bundle.research.is_none() {
            bundle.research = self.case.store().get(Slot::Research).await;
        }

        tracing::info!(
            session = %self.case.id(),
            absent = bundle.absent().len(),
            "Decision requested"
        );

        let report = self.case.reasoning().decide(&bundle).await?;
        self.case.workflow().decision_made();
        Ok(report)
    }
}

#[async_trait]
impl Tool for DecisionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: NAME.into(),
            description: "Make the final, explainable decision from all collected inputs. Pass every input you have; leave an input empty when it was not provided.".into(),
            parameters: vec![
                ParameterSchema::text("doctor_query", "The doctor's question", true),
                ParameterSchema::text("symptoms", "The patient's symptoms", true),
                ParameterSchema::text("image_analysis_result", "Your analysis of the medical images", false),
                ParameterSchema::text(
                    "medical_document_analysis_result",
                    "Your analysis of the EHRs and medical documents",
                    false,
                ),
                ParameterSchema::text("research_result", "The research report", false),
                ParameterSchema::text(
                    "additional_info",
                    "Additional information that may matter for the decision",
                    false,
                ),
            ],
            category: Some("decision".into()),
            has_side_effects: true,
        }
    }

    // missing arguments surface as MissingInput from the bundle
    fn validate(&self, _call: &ToolCall) -> CoreResult<()> {
        Ok(())
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let report = match self.decide(AnalysisBundle::from_call(call)).await {
            Ok(report) => report,
            Err(e) => return Ok(super::failure(NAME, &e)),
        };

        let data = serde_json::to_value(&report)?;
        Ok(ToolResult::success(NAME, report.to_plain_text()).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorConfig;
    use agent_core::mock::MockProvider;
    use agent_core::SessionId;

    fn case_with(provider: Arc<MockProvider>, require_research: bool) -> Arc<CaseContext> {
        let config = AdvisorConfig {
            require_research,
            ..AdvisorConfig::default()
        };
        let case = CaseContext::new(SessionId::new(), provider, &config);
        case.workflow().observe_turn("fatigue and weight loss", &[]);
        Arc::new(case)
    }

    /// Echo the recommendation with whatever research the prompt carried
    fn reasoning_model() -> Arc<MockProvider> {
        Arc::new(MockProvider::from_fn(|messages| {
            let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            let research = prompt
                .split("### Research result\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or("none");
            format!(
                "### UNDERSTANDING\nPossible metabolic cause.\n### INPUT BREAKDOWN\nSymptoms fit hyperglycaemia.\n### UNCERTAINTY\nNo labs.\n### RECOMMENDATION\nOrder HbA1c; supported by: {}",
                research
            )
        }))
    }

    #[tokio::test]
    async fn test_scenario_no_image_or_document() {
        let case = case_with(reasoning_model(), false);
        let tool = DecisionTool::new(case);

        let call = ToolCall::new(NAME)
            .with_arg("doctor_query", "fatigue and weight loss")
            .with_arg("symptoms", "fatigue, weight loss, increased thirst")
            .with_arg("research_result", "diabetes mellitus type 2 overview...");
        let result = tool.execute(&call).await.unwrap();

        assert!(result.success);
        assert!(result.output.contains("no image analysis provided"));
        assert!(result.output.contains("no document analysis provided"));
        assert!(result.output.contains("Recommendation:\nOrder HbA1c; supported by: diabetes mellitus type 2 overview..."));

        let report: DecisionReport = serde_json::from_value(result.data.unwrap()).unwrap();
        assert!(report.structured);
    }

    #[tokio::test]
    async fn test_missing_symptoms_is_reported_not_fabricated() {
        let provider = reasoning_model();
        let tool = DecisionTool::new(case_with(provider.clone(), false));

        let call = ToolCall::new(NAME).with_arg("doctor_query", "fatigue");
        let result = tool.execute(&call).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.code.as_deref(), Some("missing_input"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_before_research_when_required() {
        let provider = reasoning_model();
        let tool = DecisionTool::new(case_with(provider.clone(), true));

        let call = ToolCall::new(NAME)
            .with_arg("doctor_query", "fatigue")
            .with_arg("symptoms", "fatigue");
        let result = tool.execute(&call).await.unwrap();

        assert_eq!(result.code.as_deref(), Some("out_of_order"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_stored_research_fills_missing_argument() {
        let case = case_with(reasoning_model(), false);
        case.store().write(Slot::Research, "stored T2DM report").await;

        let report = DecisionTool::new(case)
            .decide(AnalysisBundle::new("fatigue", "thirst"))
            .await
            .unwrap();
        assert!(report.recommendation.ends_with("stored T2DM report"));
        assert!(!report.absent_inputs.contains(&"no research result provided".to_string()));
    }
}
