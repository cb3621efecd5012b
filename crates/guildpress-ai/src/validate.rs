//! Per-stage shape checks applied to parsed model output before
//! anything is persisted. Each stage has a typed response; a response
//! that does not deserialize, uses an unknown enum value, or carries an
//! out-of-range score is rejected whole; the stage engine records the
//! batch as failed and moves on.

use serde::Deserialize;
use serde_json::Value;

use guildpress_core::types::{ExtractType, Relevance, Sentiment, Urgency};

use crate::error::AiError;

#[derive(Debug, Clone, Deserialize)]
pub struct FilterResponse {
    pub decisions: Vec<FilterDecision>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterDecision {
    pub id: String,
    pub keep: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorizeResponse {
    pub categorizations: Vec<Categorization>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Categorization {
    pub id: String,
    pub primary_topic: String,
    #[serde(default)]
    pub secondary_topics: Option<Vec<String>>,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    pub marketing_relevance: Relevance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub summary: Summary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Summary {
    pub headline: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub notable_messages: Option<Vec<String>>,
    #[serde(default)]
    pub themes: Option<Vec<String>>,
    #[serde(default)]
    pub sentiment_overview: Option<String>,
    #[serde(default)]
    pub action_items: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractResponse {
    pub extracts: Vec<ExtractItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractItem {
    pub id: String,
    #[serde(default)]
    pub source_message_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ExtractType,
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub requires_permission: Option<bool>,
}

impl ExtractItem {
    /// The message the extract came from; the explicit field wins over
    /// the echoed candidate id.
    pub fn source_id(&self) -> &str {
        self.source_message_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatResponse {
    pub formatted: String,
}

pub fn parse_filter(value: &Value) -> Result<FilterResponse, AiError> {
    let resp: FilterResponse = from_value(value, "filter")?;
    for decision in &resp.decisions {
        check_score("filter", "quality_score", decision.quality_score)?;
    }
    Ok(resp)
}

pub fn parse_categorize(value: &Value) -> Result<CategorizeResponse, AiError> {
    let resp: CategorizeResponse = from_value(value, "categorize")?;
    for cat in &resp.categorizations {
        if cat.primary_topic.trim().is_empty() {
            return Err(AiError::Validation(format!(
                "categorize: empty primary_topic for id {}",
                cat.id
            )));
        }
    }
    Ok(resp)
}

pub fn parse_summary(value: &Value) -> Result<SummaryResponse, AiError> {
    let resp: SummaryResponse = from_value(value, "summarize")?;
    if resp.summary.headline.trim().is_empty() {
        return Err(AiError::Validation("summarize: empty headline".into()));
    }
    Ok(resp)
}

pub fn parse_extracts(value: &Value) -> Result<ExtractResponse, AiError> {
    let resp: ExtractResponse = from_value(value, "extract")?;
    for extract in &resp.extracts {
        check_score("extract", "relevance_score", extract.relevance_score)?;
        if extract.content.trim().is_empty() {
            return Err(AiError::Validation(format!(
                "extract: empty content for id {}",
                extract.id
            )));
        }
    }
    Ok(resp)
}

pub fn parse_format(value: &Value) -> Result<FormatResponse, AiError> {
    from_value(value, "format")
}

fn from_value<T: serde::de::DeserializeOwned>(value: &Value, stage: &str) -> Result<T, AiError> {
    serde_json::from_value(value.clone())
        .map_err(|e| AiError::Validation(format!("{stage} response: {e}")))
}

fn check_score(stage: &str, field: &str, score: Option<f64>) -> Result<(), AiError> {
    match score {
        Some(s) if !(0.0..=1.0).contains(&s) => Err(AiError::Validation(format!(
            "{stage}: {field} {s} outside [0, 1]"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_accepts_minimal_decisions() {
        let resp = parse_filter(&json!({
            "decisions": [
                {"id": "1", "keep": true},
                {"id": "2", "keep": false, "reason": "noise", "quality_score": 0.1}
            ]
        }))
        .unwrap();
        assert_eq!(resp.decisions.len(), 2);
        assert!(resp.decisions[0].keep);
    }

    #[test]
    fn filter_rejects_missing_required_field() {
        let err = parse_filter(&json!({"decisions": [{"id": "1"}]})).unwrap_err();
        assert!(matches!(err, AiError::Validation(_)));
    }

    #[test]
    fn filter_rejects_out_of_range_score() {
        let err = parse_filter(&json!({
            "decisions": [{"id": "1", "keep": true, "quality_score": 1.5}]
        }))
        .unwrap_err();
        assert!(matches!(err, AiError::Validation(_)));
    }

    #[test]
    fn categorize_rejects_unknown_enum_value() {
        let err = parse_categorize(&json!({
            "categorizations": [{
                "id": "1",
                "primary_topic": "support",
                "sentiment": "ecstatic",
                "urgency": "low",
                "marketing_relevance": "high"
            }]
        }))
        .unwrap_err();
        assert!(matches!(err, AiError::Validation(_)));
    }

    #[test]
    fn categorize_accepts_full_entry() {
        let resp = parse_categorize(&json!({
            "categorizations": [{
                "id": "1",
                "primary_topic": "feature request",
                "secondary_topics": ["roadmap"],
                "sentiment": "positive",
                "urgency": "medium",
                "marketing_relevance": "high"
            }]
        }))
        .unwrap();
        assert_eq!(resp.categorizations[0].marketing_relevance, Relevance::High);
    }

    #[test]
    fn summary_requires_headline_and_key_points() {
        assert!(parse_summary(&json!({"summary": {"key_points": []}})).is_err());
        let resp = parse_summary(&json!({
            "summary": {"headline": "Busy day", "key_points": ["a", "b"]}
        }))
        .unwrap();
        assert_eq!(resp.summary.key_points.len(), 2);
    }

    #[test]
    fn extract_source_prefers_explicit_field() {
        let resp = parse_extracts(&json!({
            "extracts": [
                {"id": "9", "type": "quote", "content": "love it"},
                {"id": "9", "source_message_id": "7", "type": "faq", "content": "Q: a\nA: b"}
            ]
        }))
        .unwrap();
        assert_eq!(resp.extracts[0].source_id(), "9");
        assert_eq!(resp.extracts[1].source_id(), "7");
        assert_eq!(resp.extracts[1].kind, ExtractType::Faq);
    }

    #[test]
    fn extract_rejects_unknown_type() {
        let err = parse_extracts(&json!({
            "extracts": [{"id": "1", "type": "meme", "content": "x"}]
        }))
        .unwrap_err();
        assert!(matches!(err, AiError::Validation(_)));
    }
}
