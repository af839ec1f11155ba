//! Decision report parsing and plain-text rendering

use serde::{Deserialize, Serialize};

use super::prompt::SECTION_HEADINGS;
use super::OptionalInput;

/// The four-part answer of the decision step
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    pub understanding: String,
    pub input_breakdown: String,
    pub uncertainty: String,
    pub recommendation: String,

    /// False when the model ignored the section format
    pub structured: bool,

    /// Absent-input markers of the bundle this report answers
    pub absent_inputs: Vec<String>,
}

impl DecisionReport {
    /// Split a model answer into its sections
    ///
    /// An answer without a recommendation heading is kept whole as the
    /// recommendation. Absent inputs are always listed under uncertainty.
    pub fn parse(raw: &str, absent: &[OptionalInput]) -> Self {
        let mut sections: [Option<String>; 4] = Default::default();
        let mut current: Option<usize> = None;

        for line in raw.lines() {
            if let Some(idx) = heading_index(line) {
                current = Some(idx);
                sections[idx].get_or_insert_with(String::new);
                continue;
            }
            if let Some(idx) = current {
                if let Some(body) = sections[idx].as_mut() {
                    body.push_str(line);
                    body.push('\n');
                }
            }
        }

        let [understanding, input_breakdown, uncertainty, recommendation] =
            sections.map(|s| s.map(|body| body.trim().to_string()));

        let mut report = match recommendation {
            Some(recommendation) if !recommendation.is_empty() => Self {
                understanding: understanding.unwrap_or_default(),
                input_breakdown: input_breakdown.unwrap_or_default(),
                uncertainty: uncertainty.unwrap_or_default(),
                recommendation,
                structured: true,
                absent_inputs: Vec::new(),
            },
            _ => Self {
                recommendation: raw.trim().to_string(),
                ..Self::default()
            },
        };

        report.absent_inputs = absent.iter().map(|i| i.absent_marker().to_string()).collect();
        report.disclose_absent_inputs();
        report
    }

    fn disclose_absent_inputs(&mut self) {
        let lower = self.uncertainty.to_lowercase();
        let missing: Vec<&str> = self
            .absent_inputs
            .iter()
            .map(String::as_str)
            .filter(|marker| !lower.contains(marker))
            .collect();

        if missing.is_empty() {
            return;
        }

        let mut listed = missing.iter().map(|m| format!("- {}", m)).collect::<Vec<_>>().join("\n");
        if !self.uncertainty.is_empty() {
            listed = format!("{}\n{}", self.uncertainty, listed);
        }
        self.uncertainty = listed;
    }

    /// Report text with markdown markup removed, as shown to the doctor
    pub fn to_plain_text(&self) -> String {
        let parts = [
            ("Understanding", &self.understanding),
            ("Input breakdown", &self.input_breakdown),
            ("Uncertainty", &self.uncertainty),
            ("Recommendation", &self.recommendation),
        ];

        let mut out = Vec::new();
        for (title, body) in parts {
            if body.is_empty() {
                continue;
            }
            let body = strip_markup(body);
            if self.structured || title == "Uncertainty" {
                out.push(format!("{}:\n{}", title, body));
            } else {
                out.push(body);
            }
        }
        out.join("\n\n")
    }
}

/// Which section heading, if any, this line is
fn heading_index(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    if !(trimmed.starts_with('#') || trimmed.starts_with("**")) {
        return None;
    }

    let name = trimmed
        .trim_start_matches('#')
        .trim()
        .trim_matches('*')
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_uppercase();

    SECTION_HEADINGS.iter().position(|h| *h == name)
}

fn strip_markup(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .map(|line| {
            let line = line.trim_end();
            let line = if line.trim_start().starts_with('#') {
                line.trim_start().trim_start_matches('#').trim_start()
            } else {
                line
            };
            line.replace("**", "").replace("__", "").replace('`', "")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCTURED: &str = "### UNDERSTANDING\nAdult with fatigue and weight loss.\n\n### INPUT BREAKDOWN\n- **Symptoms**: polyuria pattern\n- Research: T2DM overview\n\n### UNCERTAINTY\nNo labs were supplied.\n\n### RECOMMENDATION\nOrder **HbA1c** and fasting glucose, as the research on type 2 diabetes suggests.";

    #[test]
    fn test_parse_structured_answer() {
        let report = DecisionReport::parse(STRUCTURED, &[OptionalInput::ImageAnalysis]);

        assert!(report.structured);
        assert_eq!(report.understanding, "Adult with fatigue and weight loss.");
        assert!(report.input_breakdown.starts_with("- **Symptoms**"));
        assert!(report.recommendation.starts_with("Order **HbA1c**"));
        assert_eq!(report.uncertainty, "No labs were supplied.\n- no image analysis provided");
    }

    #[test]
    fn test_unstructured_answer_becomes_recommendation() {
        let report = DecisionReport::parse(
            "Consider type 2 diabetes; order HbA1c.",
            &[OptionalInput::ImageAnalysis, OptionalInput::DocumentAnalysis],
        );

        assert!(!report.structured);
        assert_eq!(report.recommendation, "Consider type 2 diabetes; order HbA1c.");
        assert_eq!(
            report.uncertainty,
            "- no image analysis provided\n- no document analysis provided"
        );
    }

    #[test]
    fn test_heading_variants() {
        assert_eq!(heading_index("## Recommendation"), Some(3));
        assert_eq!(heading_index("**UNCERTAINTY:**"), Some(2));
        assert_eq!(heading_index("### Input breakdown"), Some(1));
        assert_eq!(heading_index("Recommendation is below"), None);
    }

    #[test]
    fn test_plain_text_strips_markup() {
        let report = DecisionReport::parse(STRUCTURED, &[]);
        let text = report.to_plain_text();

        assert!(!text.contains("**"));
        assert!(!text.contains("###"));
        assert!(text.contains("Recommendation:\nOrder HbA1c and fasting glucose"));
    }

    #[test]
    fn test_marker_already_disclosed_is_not_repeated() {
        let raw = "### UNCERTAINTY\nThere was no image analysis provided.\n### RECOMMENDATION\nRepeat labs.";
        let report = DecisionReport::parse(raw, &[OptionalInput::ImageAnalysis]);
        assert_eq!(report.uncertainty, "There was no image analysis provided.");
    }
}
