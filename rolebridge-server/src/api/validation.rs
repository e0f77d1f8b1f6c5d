//! Request bodies and their validation
//!
//! Every check here runs before a stream opens; a failure becomes a single
//! 400 response and no model call is made.

use rolebridge_common::{AnalysisResult, Answer, TranslationDirection};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{AnalysisInput, DirectInput, SynthesisInput};

/// POST /api/translate
#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub direction: String,
    pub content: String,
}

/// POST /api/analyze
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub direction: String,
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// POST /api/synthesize
///
/// Fields are loosely typed so shape errors get a precise message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeRequest {
    #[serde(default)]
    pub analysis_json: Value,
    #[serde(default)]
    pub answers: Value,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl TranslateRequest {
    pub fn into_input(self, max_chars: usize) -> ApiResult<DirectInput> {
        let direction = parse_direction(&self.direction)?;
        check_content("content", &self.content, max_chars)?;
        Ok(DirectInput {
            direction,
            content: self.content,
        })
    }
}

impl AnalyzeRequest {
    pub fn into_input(self, max_chars: usize) -> ApiResult<AnalysisInput> {
        let direction = parse_direction(&self.direction)?;
        check_content("content", &self.content, max_chars)?;
        check_context(self.context.as_deref(), max_chars)?;
        Ok(AnalysisInput {
            direction,
            content: self.content,
            context: self.context,
        })
    }
}

impl SynthesizeRequest {
    pub fn into_input(self, max_chars: usize) -> ApiResult<SynthesisInput> {
        let analysis = parse_analysis(self.analysis_json)?;
        let answers = parse_answers(self.answers, &analysis)?;
        check_content("originalText", &self.original_text, max_chars)?;
        check_context(self.context.as_deref(), max_chars)?;
        Ok(SynthesisInput {
            analysis,
            answers,
            original_text: self.original_text,
            context: self.context,
        })
    }
}

pub fn parse_direction(value: &str) -> ApiResult<TranslationDirection> {
    Ok(value.parse::<TranslationDirection>()?)
}

/// Non-blank and at most `max_chars` Unicode scalar values
pub fn check_content(field: &str, value: &str, max_chars: usize) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    let chars = value.chars().count();
    if chars > max_chars {
        return Err(ApiError::BadRequest(format!(
            "{} is {} characters, limit is {}",
            field, chars, max_chars
        )));
    }
    Ok(())
}

fn check_context(context: Option<&str>, max_chars: usize) -> ApiResult<()> {
    match context {
        Some(context) if context.chars().count() > max_chars => Err(ApiError::BadRequest(format!(
            "context exceeds {} characters",
            max_chars
        ))),
        _ => Ok(()),
    }
}

/// Accepts the analysis as a JSON object or as a string holding one
fn parse_analysis(value: Value) -> ApiResult<AnalysisResult> {
    let value = match value {
        Value::Null => {
            return Err(ApiError::BadRequest("analysisJson is required".to_string()));
        }
        Value::String(text) if text.trim().is_empty() => {
            return Err(ApiError::BadRequest("analysisJson is required".to_string()));
        }
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| ApiError::BadRequest(format!("analysisJson is not JSON: {}", e)))?,
        other => other,
    };

    if value.as_object().map_or(true, |o| o.is_empty()) {
        return Err(ApiError::BadRequest(
            "analysisJson must be a non-empty object".to_string(),
        ));
    }

    let analysis: AnalysisResult = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("analysisJson has the wrong shape: {}", e)))?;
    analysis
        .validate(analysis.direction)
        .map_err(|e| ApiError::BadRequest(format!("analysisJson is invalid: {}", e)))?;
    Ok(analysis)
}

/// Answers must be an array; each id must name a gap, at most once
fn parse_answers(value: Value, analysis: &AnalysisResult) -> ApiResult<Vec<Answer>> {
    if !value.is_array() {
        return Err(ApiError::BadRequest(
            "answers must be an array (possibly empty)".to_string(),
        ));
    }
    let answers: Vec<Answer> = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("answers have the wrong shape: {}", e)))?;

    let mut seen = HashSet::new();
    for answer in &answers {
        if analysis.missing_info_by_id(&answer.id).is_none() {
            return Err(ApiError::BadRequest(format!(
                "answer id '{}' does not match any missingInfo entry",
                answer.id
            )));
        }
        if !seen.insert(answer.id.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "answer id '{}' given more than once",
                answer.id
            )));
        }
        if answer.answer.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "answer '{}' is empty; omit it to use the default assumption",
                answer.id
            )));
        }
    }
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis_value() -> Value {
        json!({
            "direction": "pm-to-dev",
            "intent": "支付对账",
            "confidenceScore": 0.55,
            "structuredData": {"logicCore": "reconcile", "constraints": [], "techContext": []},
            "missingInfo": [{
                "id": "Q1",
                "priority": "HIGH",
                "question": "expected load?",
                "reason": "sizing",
                "options": [],
                "defaultAssumption": "QPS<100"
            }],
            "canProceedDirectly": false
        })
    }

    fn synthesize(analysis: Value, answers: Value) -> ApiResult<SynthesisInput> {
        SynthesizeRequest {
            analysis_json: analysis,
            answers,
            original_text: "做对账".to_string(),
            context: None,
        }
        .into_input(5000)
    }

    #[test]
    fn test_content_ceiling_counts_characters() {
        let exact = "字".repeat(10);
        assert!(check_content("content", &exact, 10).is_ok());
        let over = "字".repeat(11);
        assert!(matches!(
            check_content("content", &over, 10),
            Err(ApiError::BadRequest(_))
        ));
        assert!(check_content("content", "   ", 10).is_err());
    }

    #[test]
    fn test_unknown_direction_rejected() {
        let request = TranslateRequest {
            direction: "sideways".to_string(),
            content: "x".to_string(),
        };
        let err = request.into_input(5000).unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn test_analysis_as_string_or_object() {
        assert!(synthesize(analysis_value(), json!([])).is_ok());
        let as_string = Value::String(analysis_value().to_string());
        assert!(synthesize(as_string, json!([])).is_ok());
    }

    #[test]
    fn test_synthesis_shape_errors() {
        assert!(synthesize(Value::Null, json!([])).is_err());
        assert!(synthesize(json!({}), json!([])).is_err());
        assert!(synthesize(json!({"intent": "x"}), json!([])).is_err());
        assert!(synthesize(analysis_value(), json!({"Q1": "a"})).is_err());
        assert!(synthesize(analysis_value(), Value::Null).is_err());
    }

    #[test]
    fn test_answer_ids_must_match_gaps() {
        let ok = synthesize(analysis_value(), json!([{"id": "Q1", "answer": "QPS<500"}])).unwrap();
        assert_eq!(ok.answers, vec![Answer::new("Q1", "QPS<500")]);

        assert!(synthesize(analysis_value(), json!([{"id": "Q9", "answer": "x"}])).is_err());
        assert!(synthesize(
            analysis_value(),
            json!([{"id": "Q1", "answer": "a"}, {"id": "Q1", "answer": "b"}])
        )
        .is_err());
        assert!(synthesize(analysis_value(), json!([{"id": "Q1", "answer": " "}])).is_err());
    }
}
