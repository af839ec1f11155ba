//! Service Kit - Agent Tools
//!
//! Tools that implement `agent_core::Tool` for a consultation. Each tool is
//! bound to one [`CaseContext`](crate::case::CaseContext).

mod research_tool;
mod results_retrieval;
mod decision_maker;

pub use research_tool::ResearchTool;
pub use results_retrieval::ResultsRetrievalTool;
pub use decision_maker::DecisionTool;

use agent_core::ToolResult;

use crate::error::AdvisorError;

/// Structured failure result the orchestrating model can act on
fn failure(tool: &str, err: &AdvisorError) -> ToolResult {
    tracing::warn!(tool, code = err.code(), error = %err, "Tool failed");
    ToolResult::failure(tool, err.user_message()).with_code(err.code())
}
