//! Decision Synthesis
//!
//! Builds the reasoning prompt from an [`AnalysisBundle`], runs it through a
//! session-scoped [`ReasoningSession`] and parses the four-section
//! [`DecisionReport`] out of the answer.

mod prompt;
mod report;
mod session;

pub use prompt::{DECISION_SYSTEM_PROMPT, SECTION_HEADINGS};
pub use report::DecisionReport;
pub use session::ReasoningSession;

use agent_core::ToolCall;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// Optional inputs, each of which must be named when it is missing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionalInput {
    ImageAnalysis,
    DocumentAnalysis,
    Research,
    AdditionalInfo,
}

impl OptionalInput {
    pub const ALL: [Self; 4] = [
        Self::ImageAnalysis,
        Self::DocumentAnalysis,
        Self::Research,
        Self::AdditionalInfo,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::ImageAnalysis => "Medical image analysis",
            Self::DocumentAnalysis => "Medical document analysis",
            Self::Research => "Research result",
            Self::AdditionalInfo => "Additional information",
        }
    }

    /// Marker used in prompts and reports when the input was not supplied
    pub const fn absent_marker(self) -> &'static str {
        match self {
            Self::ImageAnalysis => "no image analysis provided",
            Self::DocumentAnalysis => "no document analysis provided",
            Self::Research => "no research result provided",
            Self::AdditionalInfo => "no additional information provided",
        }
    }
}

/// Everything one decision is based on
///
/// `None` means the input was not supplied. An analysis that was performed
/// and found nothing is `Some` with that finding as text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub doctor_query: Option<String>,
    pub symptoms: Option<String>,
    pub image_analysis: Option<String>,
    pub document_analysis: Option<String>,
    pub research: Option<String>,
    pub additional_info: Option<String>,
}

impl AnalysisBundle {
    pub fn new(doctor_query: impl Into<String>, symptoms: impl Into<String>) -> Self {
        Self {
            doctor_query: non_blank(doctor_query.into()),
            symptoms: non_blank(symptoms.into()),
            ..Self::default()
        }
    }

    pub fn with_image_analysis(mut self, text: impl Into<String>) -> Self {
        self.image_analysis = non_blank(text.into());
        self
    }

    pub fn with_document_analysis(mut self, text: impl Into<String>) -> Self {
        self.document_analysis = non_blank(text.into());
        self
    }

    pub fn with_research(mut self, text: impl Into<String>) -> Self {
        self.research = non_blank(text.into());
        self
    }

    pub fn with_additional_info(mut self, text: impl Into<String>) -> Self {
        self.additional_info = non_blank(text.into());
        self
    }

    /// Read the decision tool's arguments; blank strings count as absent
    pub fn from_call(call: &ToolCall) -> Self {
        let arg = |key: &str| call.text_arg(key).map(str::to_string);
        Self {
            doctor_query: arg("doctor_query"),
            symptoms: arg("symptoms"),
            image_analysis: arg("image_analysis_result"),
            document_analysis: arg("medical_document_analysis_result"),
            research: arg("research_result"),
            additional_info: arg("additional_info"),
        }
    }

    /// The doctor's query and the symptoms are mandatory
    pub fn validate(&self) -> Result<()> {
        if self.doctor_query.is_none() {
            return Err(AdvisorError::MissingInput("doctor_query"));
        }
        if self.symptoms.is_none() {
            return Err(AdvisorError::MissingInput("symptoms"));
        }
        Ok(())
    }

    pub fn optional(&self, input: OptionalInput) -> Option<&str> {
        match input {
            OptionalInput::ImageAnalysis => self.image_analysis.as_deref(),
            OptionalInput::DocumentAnalysis => self.document_analysis.as_deref(),
            OptionalInput::Research => self.research.as_deref(),
            OptionalInput::AdditionalInfo => self.additional_info.as_deref(),
        }
    }

    /// Optional inputs that were not supplied, in prompt order
    pub fn absent(&self) -> Vec<OptionalInput> {
        OptionalInput::ALL
            .into_iter()
            .filter(|input| self.optional(*input).is_none())
            .collect()
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
