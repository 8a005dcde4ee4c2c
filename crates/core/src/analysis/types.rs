//! Canonical analysis result and normalization of workflow payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// Keys the workflow engine has used for the optimized document link.
const OPTIMIZED_URL_KEYS: &[&str] = &["optimizedDocumentUrl", "optimizedCvUrl", "downloadUrl", "fileUrl"];

/// Keys carrying the keywords found in the document.
const FOUND_KEYWORD_KEYS: &[&str] = &["keywords", "foundKeywords"];

/// Errors normalizing an external payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("analysis payload is not a JSON object (got {0})")]
    NotAnObject(&'static str),
}

/// Structured feedback for one analysed document.
///
/// Every collection defaults to empty so rendering never has to deal with
/// missing data. Serializes to the same shape the workflow engine emits, so
/// a serialized result normalizes back to itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Overall score, always within 0..=100.
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default, rename = "keywords")]
    pub found_keywords: BTreeSet<String>,
    #[serde(default)]
    pub missing_keywords: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_document_url: Option<String>,
}

impl AnalysisResult {
    /// Normalize a raw workflow payload into the canonical shape.
    ///
    /// Missing or out-of-range scores are pulled to the nearest bound,
    /// missing lists become empty. Only a non-object payload is an error.
    pub fn from_payload(payload: &Value) -> Result<Self, NormalizeError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| NormalizeError::NotAnObject(json_type_name(payload)))?;

        Ok(Self {
            score: normalize_score(obj.get("score")),
            strengths: string_list(obj, &["strengths"]),
            improvements: string_list(obj, &["improvements"]),
            found_keywords: string_list(obj, FOUND_KEYWORD_KEYS).into_iter().collect(),
            missing_keywords: string_list(obj, &["missingKeywords"])
                .into_iter()
                .collect(),
            optimized_document_url: first_string(obj, OPTIMIZED_URL_KEYS),
        })
    }

    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }
}

/// Coarse rating shown next to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    NeedsWork,
    Poor,
}

impl ScoreBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => ScoreBand::Excellent,
            80..=89 => ScoreBand::Good,
            70..=79 => ScoreBand::Fair,
            60..=69 => ScoreBand::NeedsWork,
            _ => ScoreBand::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreBand::Excellent => "Excellent",
            ScoreBand::Good => "Good",
            ScoreBand::Fair => "Fair",
            ScoreBand::NeedsWork => "Needs work",
            ScoreBand::Poor => "Poor",
        }
    }
}

/// File name offered when downloading the optimized document.
pub fn optimized_document_name(original: &str) -> String {
    let original = original.trim();
    if original.is_empty() {
        "optimized_cv.pdf".to_string()
    } else {
        format!("optimized_{}", original)
    }
}

fn normalize_score(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(x) if x.is_nan() => 0,
        Some(x) => x.round().clamp(0.0, 100.0) as u8,
        None => 0,
    }
}

/// First present key wins. Arrays keep their string entries; a single string
/// is read as a comma-separated list.
fn string_list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null())) else {
        return Vec::new();
    };

    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_payload_normalizes_verbatim() {
        let payload = json!({
            "score": 85,
            "strengths": ["Clear structure", "Quantified achievements"],
            "improvements": ["Add a summary"],
            "keywords": ["Rust", "Kubernetes"],
            "missingKeywords": ["Terraform"],
            "optimizedCvUrl": "https://files.example.com/optimized.pdf"
        });

        let result = AnalysisResult::from_payload(&payload).unwrap();
        assert_eq!(result.score, 85);
        assert_eq!(result.strengths, vec!["Clear structure", "Quantified achievements"]);
        assert_eq!(result.improvements, vec!["Add a summary"]);
        assert!(result.found_keywords.contains("Rust"));
        assert!(result.found_keywords.contains("Kubernetes"));
        assert_eq!(result.missing_keywords.len(), 1);
        assert_eq!(
            result.optimized_document_url.as_deref(),
            Some("https://files.example.com/optimized.pdf")
        );
    }

    #[test]
    fn test_serialized_result_normalizes_to_itself() {
        let result = AnalysisResult {
            score: 72,
            strengths: vec!["Concise".to_string()],
            improvements: vec!["Mention leadership".to_string(), "Fix dates".to_string()],
            found_keywords: ["Go", "SQL"].into_iter().map(String::from).collect(),
            missing_keywords: ["gRPC"].into_iter().map(String::from).collect(),
            optimized_document_url: Some("https://files.example.com/cv.pdf".to_string()),
        };

        let payload = serde_json::to_value(&result).unwrap();
        assert_eq!(AnalysisResult::from_payload(&payload).unwrap(), result);
    }

    #[test]
    fn test_missing_lists_become_empty() {
        let result = AnalysisResult::from_payload(&json!({ "score": 50 })).unwrap();
        assert_eq!(result.score, 50);
        assert!(result.strengths.is_empty());
        assert!(result.improvements.is_empty());
        assert!(result.found_keywords.is_empty());
        assert!(result.missing_keywords.is_empty());
        assert!(result.optimized_document_url.is_none());

        let result = AnalysisResult::from_payload(&json!({ "strengths": null })).unwrap();
        assert!(result.strengths.is_empty());
    }

    #[test]
    fn test_score_is_clamped() {
        let score = |v: Value| AnalysisResult::from_payload(&json!({ "score": v })).unwrap().score;
        assert_eq!(score(json!(-12)), 0);
        assert_eq!(score(json!(140)), 100);
        assert_eq!(score(json!(87.6)), 88);
        assert_eq!(score(json!("91")), 91);
        assert_eq!(score(json!("n/a")), 0);
        assert_eq!(score(json!(null)), 0);
        assert_eq!(AnalysisResult::from_payload(&json!({})).unwrap().score, 0);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert_eq!(
            AnalysisResult::from_payload(&json!([1, 2])),
            Err(NormalizeError::NotAnObject("array"))
        );
        assert!(AnalysisResult::from_payload(&json!("done")).is_err());
    }

    #[test]
    fn test_lenient_list_entries() {
        let payload = json!({
            "score": 70,
            "strengths": ["ok", 3, null, "  ", "fine"],
            "foundKeywords": "Rust, Tokio ,",
        });
        let result = AnalysisResult::from_payload(&payload).unwrap();
        assert_eq!(result.strengths, vec!["ok", "fine"]);
        assert_eq!(result.found_keywords.len(), 2);
        assert!(result.found_keywords.contains("Tokio"));
    }

    #[test]
    fn test_optimized_url_aliases() {
        let result = AnalysisResult::from_payload(&json!({ "downloadUrl": "https://a/b.pdf" })).unwrap();
        assert_eq!(result.optimized_document_url.as_deref(), Some("https://a/b.pdf"));

        let result = AnalysisResult::from_payload(&json!({ "fileUrl": "", "optimizedCvUrl": "https://c" })).unwrap();
        assert_eq!(result.optimized_document_url.as_deref(), Some("https://c"));
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(ScoreBand::from_score(100), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(90), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_score(89), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(70), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(65), ScoreBand::NeedsWork);
        assert_eq!(ScoreBand::from_score(12), ScoreBand::Poor);
        assert_eq!(ScoreBand::NeedsWork.label(), "Needs work");
    }

    #[test]
    fn test_optimized_document_name() {
        assert_eq!(optimized_document_name("resume.pdf"), "optimized_resume.pdf");
        assert_eq!(optimized_document_name(""), "optimized_cv.pdf");
    }
}
