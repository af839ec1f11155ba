//! Decision prompt construction

use super::{AnalysisBundle, OptionalInput};

/// Section headings the reasoning model must emit, in order
pub const SECTION_HEADINGS: [&str; 4] = [
    "UNDERSTANDING",
    "INPUT BREAKDOWN",
    "UNCERTAINTY",
    "RECOMMENDATION",
];

/// Standing instructions of the decision reasoning session
pub const DECISION_SYSTEM_PROMPT: &str = r#"You are a medical decision-support assistant for physicians. You synthesize the inputs a doctor provides (symptoms, image analysis, document analysis, research and additional information) into an explainable recommendation.

Rules that always apply:
- Base every statement on the supplied inputs and research text. Never invent studies, citations, statistics or findings.
- An input marked ABSENT was not provided. Do not assume what it would have shown.
- When the evidence is insufficient, say so plainly and propose further tests or investigations instead of asserting a diagnosis.
- Always defer to the doctor's judgment."#;

impl AnalysisBundle {
    /// Render the reasoning prompt for this bundle
    ///
    /// Every supplied field is embedded verbatim and every missing optional
    /// input is named with its absent marker.
    pub fn to_prompt(&self) -> String {
        let mut prompt = String::from("## Case inputs\n\n");

        field(&mut prompt, "Doctor query", self.doctor_query.as_deref(), "no doctor query provided");
        field(&mut prompt, "Patient symptoms", self.symptoms.as_deref(), "no symptoms provided");
        for input in OptionalInput::ALL {
            field(&mut prompt, input.label(), self.optional(input), input.absent_marker());
        }

        let absent = self.absent();
        if !absent.is_empty() {
            prompt.push_str("## Absent inputs\n\n");
            for input in &absent {
                prompt.push_str(&format!("- {}\n", input.absent_marker()));
            }
            prompt.push('\n');
        }

        prompt.push_str("## Required answer format\n\n");
        prompt.push_str("Answer with exactly these four sections, in this order, each introduced by its heading line:\n\n");
        prompt.push_str("### UNDERSTANDING\nRestate the clinical problem as you understand it from the inputs.\n\n");
        prompt.push_str("### INPUT BREAKDOWN\nFor each input, explain what it contributes to the decision.\n\n");
        prompt.push_str(
            "### UNCERTAINTY\nState every assumption and every gap in the evidence. List each absent input by its marker.\n\n",
        );
        prompt.push_str(
            "### RECOMMENDATION\nGive a clear, actionable recommendation and name the inputs that support it. \
             If the evidence is insufficient, recommend further testing instead of a diagnosis.\n\n",
        );
        prompt.push_str("Do not cite anything that is not in the inputs above.");

        prompt
    }
}

fn field(prompt: &mut String, label: &str, value: Option<&str>, absent_marker: &str) {
    match value {
        Some(text) => prompt.push_str(&format!("### {}\n{}\n\n", label, text)),
        None => prompt.push_str(&format!("### {}\n[ABSENT] {}\n\n", label, absent_marker)),
    }
}
