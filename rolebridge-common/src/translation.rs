//! Translation data model
//!
//! Types exchanged between the analysis stage, the client, and the
//! synthesis stage. `AnalysisResult` arrives from the upstream model, so it is
//! decoded and checked at the boundary before anything else touches it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Confidence below which the model is told to ask before proceeding
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Which way a translation runs
///
/// Fixed for the lifetime of one request. Selects prompt templates and how
/// the analysis JSON is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranslationDirection {
    /// Product/business wording turned into an implementer-facing brief
    #[serde(rename = "pm-to-dev")]
    ForwardToImplementer,
    /// Technical wording turned into a stakeholder-facing summary
    #[serde(rename = "dev-to-pm")]
    ReverseToStakeholder,
}

impl TranslationDirection {
    /// Wire name used in requests and in the analysis JSON echo
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationDirection::ForwardToImplementer => "pm-to-dev",
            TranslationDirection::ReverseToStakeholder => "dev-to-pm",
        }
    }
}

impl fmt::Display for TranslationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pm-to-dev" => Ok(TranslationDirection::ForwardToImplementer),
            "dev-to-pm" => Ok(TranslationDirection::ReverseToStakeholder),
            other => Err(Error::InvalidInput(format!(
                "unknown direction '{}', expected 'pm-to-dev' or 'dev-to-pm'",
                other
            ))),
        }
    }
}

/// Pipeline stage, used for template lookup, token budgets and audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analysis,
    Synthesis,
    Direct,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analysis => "analysis",
            Stage::Synthesis => "synthesis",
            Stage::Direct => "direct",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a missing piece of information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
}

/// Data the model extracted from the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredData {
    pub logic_core: String,
    pub constraints: Vec<String>,
    pub tech_context: Vec<String>,
}

/// One information gap, with the assumption used when nobody answers it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingInfo {
    pub id: String,
    pub priority: Priority,
    pub question: String,
    pub reason: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub default_assumption: String,
}

/// Result of one analysis call
///
/// Immutable once parsed; consumed whole by the synthesis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub direction: TranslationDirection,
    pub intent: String,
    pub confidence_score: f64,
    pub structured_data: StructuredData,
    pub missing_info: Vec<MissingInfo>,
    pub can_proceed_directly: bool,
}

impl AnalysisResult {
    /// Decode model output into an `AnalysisResult` and check its shape
    ///
    /// Accepts one JSON object, optionally wrapped in a single Markdown code
    /// fence. Returns `Error::Protocol` for anything else.
    pub fn from_model_output(text: &str, expected: TranslationDirection) -> Result<Self> {
        let body = strip_code_fence(text);
        let result: AnalysisResult = serde_json::from_str(body)
            .map_err(|e| Error::Protocol(format!("analysis output is not a valid JSON object: {}", e)))?;
        result.validate(expected)?;
        Ok(result)
    }

    /// Structural checks serde cannot express
    pub fn validate(&self, expected: TranslationDirection) -> Result<()> {
        if self.direction != expected {
            return Err(Error::Protocol(format!(
                "analysis direction '{}' does not match request direction '{}'",
                self.direction, expected
            )));
        }

        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(Error::Protocol(format!(
                "confidenceScore {} outside [0, 1]",
                self.confidence_score
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.missing_info {
            if entry.id.trim().is_empty() {
                return Err(Error::Protocol("missingInfo entry with empty id".to_string()));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::Protocol(format!("duplicate missingInfo id '{}'", entry.id)));
            }
            if entry.default_assumption.trim().is_empty() {
                return Err(Error::Protocol(format!(
                    "missingInfo '{}' has no defaultAssumption",
                    entry.id
                )));
            }
        }

        Ok(())
    }

    /// True when the clarification step is skipped
    pub fn skips_clarification(&self) -> bool {
        self.can_proceed_directly || self.missing_info.is_empty()
    }

    /// Model claims it can proceed although its confidence is under the threshold
    pub fn has_inconsistent_confidence(&self) -> bool {
        self.can_proceed_directly && self.confidence_score < CONFIDENCE_THRESHOLD
    }

    /// Look up a gap by id
    pub fn missing_info_by_id(&self, id: &str) -> Option<&MissingInfo> {
        self.missing_info.iter().find(|m| m.id == id)
    }
}

/// User answer to one `MissingInfo` question
///
/// Absence of an answer for an id means the default assumption applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub answer: String,
}

impl Answer {
    pub fn new(id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            answer: answer.into(),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let inner = inner.trim_start();
    // Language tag, on its own line or followed directly by the object
    if let Some(tag) = inner.get(..4).filter(|t| t.eq_ignore_ascii_case("json")) {
        return inner[tag.len()..].trim();
    }
    match inner.find('\n') {
        Some(pos) if !inner[..pos].trim_start().starts_with('{') => inner[pos + 1..].trim(),
        _ => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(direction: &str, can_proceed: bool) -> String {
        format!(
            r#"{{
                "direction": "{}",
                "intent": "Export reports with one click",
                "confidenceScore": 0.82,
                "structuredData": {{
                    "logicCore": "export current report",
                    "constraints": ["must finish within 10s"],
                    "techContext": []
                }},
                "missingInfo": [
                    {{
                        "id": "Q1",
                        "priority": "HIGH",
                        "question": "Which file format?",
                        "reason": "Determines the export library",
                        "options": ["CSV", "XLSX"],
                        "defaultAssumption": "XLSX"
                    }}
                ],
                "canProceedDirectly": {}
            }}"#,
            direction, can_proceed
        )
    }

    #[test]
    fn test_direction_round_trip_names() {
        assert_eq!(
            "pm-to-dev".parse::<TranslationDirection>().unwrap(),
            TranslationDirection::ForwardToImplementer
        );
        assert_eq!(
            "dev-to-pm".parse::<TranslationDirection>().unwrap(),
            TranslationDirection::ReverseToStakeholder
        );
        assert!("sideways".parse::<TranslationDirection>().is_err());
        assert_eq!(
            serde_json::to_string(&TranslationDirection::ReverseToStakeholder).unwrap(),
            "\"dev-to-pm\""
        );
    }

    #[test]
    fn test_parse_valid_analysis() {
        let text = sample_json("pm-to-dev", false);
        let result =
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .unwrap();
        assert_eq!(result.missing_info.len(), 1);
        assert_eq!(result.missing_info[0].priority, Priority::High);
        assert_eq!(result.missing_info[0].default_assumption, "XLSX");
        assert!(!result.skips_clarification());
    }

    #[test]
    fn test_parse_fenced_analysis() {
        let text = format!("```json\n{}\n```", sample_json("pm-to-dev", true));
        let result =
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .unwrap();
        assert!(result.skips_clarification());
    }

    #[test]
    fn test_parse_single_line_fence() {
        let compact: serde_json::Value = serde_json::from_str(&sample_json("pm-to-dev", true)).unwrap();
        let direction = TranslationDirection::ForwardToImplementer;

        let tagged = format!("```json {}```", compact);
        assert!(AnalysisResult::from_model_output(&tagged, direction).is_ok());

        let bare = format!("```{}```", compact);
        assert!(AnalysisResult::from_model_output(&bare, direction).is_ok());
    }

    #[test]
    fn test_not_json_is_protocol_error() {
        let err = AnalysisResult::from_model_output(
            "not json at all",
            TranslationDirection::ForwardToImplementer,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_direction_mismatch_rejected() {
        let text = sample_json("dev-to-pm", false);
        let err =
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_missing_default_assumption_rejected() {
        let text = sample_json("pm-to-dev", false).replace(r#""defaultAssumption": "XLSX""#, r#""defaultAssumption": "  ""#);
        assert!(
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .is_err()
        );
    }

    #[test]
    fn test_missing_field_rejected() {
        let text = sample_json("pm-to-dev", false).replace(r#""intent": "Export reports with one click","#, "");
        assert!(
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .is_err()
        );
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let text = sample_json("pm-to-dev", false).replace("0.82", "1.4");
        assert!(
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .is_err()
        );
    }

    #[test]
    fn test_inconsistent_confidence_is_reported_not_fixed() {
        let text = sample_json("pm-to-dev", true).replace("0.82", "0.4");
        let result =
            AnalysisResult::from_model_output(&text, TranslationDirection::ForwardToImplementer)
                .unwrap();
        assert!(result.has_inconsistent_confidence());
        assert!(result.can_proceed_directly);
    }

    #[test]
    fn test_empty_missing_info_skips_clarification() {
        let mut result =
            AnalysisResult::from_model_output(&sample_json("pm-to-dev", false), TranslationDirection::ForwardToImplementer)
                .unwrap();
        result.missing_info.clear();
        assert!(result.skips_clarification());
    }
}
