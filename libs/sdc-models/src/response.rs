//! FHIR QuestionnaireResponse model

use crate::complex::Extension;
use crate::error::{Error, Result};
use crate::value::AnswerValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// FHIR QuestionnaireResponse resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    /// Resource type - always "QuestionnaireResponse"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Canonical URL of the Questionnaire being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<String>,

    #[serde(default)]
    pub status: QuestionnaireResponseStatus,

    /// Date the answers were gathered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authored: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,

    /// Additional content (subject, author, meta, ...)
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

fn default_resource_type() -> String {
    "QuestionnaireResponse".to_string()
}

impl Default for QuestionnaireResponse {
    fn default() -> Self {
        Self {
            resource_type: default_resource_type(),
            id: None,
            questionnaire: None,
            status: QuestionnaireResponseStatus::default(),
            authored: None,
            extension: Vec::new(),
            item: Vec::new(),
            other: Map::new(),
        }
    }
}

impl QuestionnaireResponse {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let response: Self = serde_json::from_str(json)?;
        if response.resource_type != "QuestionnaireResponse" {
            return Err(Error::InvalidResource(format!(
                "expected QuestionnaireResponse, got {}",
                response.resource_type
            )));
        }
        Ok(response)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Every response item, depth first, including items nested under answers.
    pub fn all_items(&self) -> Vec<&QuestionnaireResponseItem> {
        let mut out = Vec::new();
        for item in &self.item {
            item.collect_into(&mut out);
        }
        out
    }
}

/// in-progress | completed | amended | entered-in-error | stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionnaireResponseStatus {
    #[default]
    InProgress,
    Completed,
    Amended,
    EnteredInError,
    Stopped,
}

/// Groups and questions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponseItem {
    /// Pointer to specific item from Questionnaire
    pub link_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<QuestionnaireResponseAnswer>,

    /// Nested questionnaire response items (non-repeating groups)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

impl QuestionnaireResponseItem {
    pub fn new(link_id: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            ..Default::default()
        }
    }

    /// Answer values, skipping answers that only carry nested items
    pub fn answer_values(&self) -> impl Iterator<Item = &AnswerValue> {
        self.answer.iter().filter_map(|a| a.value.as_ref())
    }

    pub fn has_answer(&self) -> bool {
        self.answer_values().next().is_some()
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a QuestionnaireResponseItem>) {
        out.push(self);
        for child in &self.item {
            child.collect_into(out);
        }
        for answer in &self.answer {
            for child in &answer.item {
                child.collect_into(out);
            }
        }
    }
}

/// The response(s) to the question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireResponseAnswer {
    #[serde(flatten)]
    pub value: Option<AnswerValue>,

    /// Child items of a question, or of a repeated group occurrence
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,
}

impl QuestionnaireResponseAnswer {
    pub fn new(value: AnswerValue) -> Self {
        Self {
            value: Some(value),
            item: Vec::new(),
        }
    }
}

impl From<AnswerValue> for QuestionnaireResponseAnswer {
    fn from(value: AnswerValue) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_round_trip_keeps_unmodelled_fields() {
        let raw = json!({
            "resourceType": "QuestionnaireResponse",
            "questionnaire": "http://example.org/Questionnaire/q",
            "status": "completed",
            "subject": {"reference": "Patient/1"},
            "item": [{
                "linkId": "q1",
                "answer": [{
                    "valueBoolean": true,
                    "item": [{"linkId": "q1.1", "answer": [{"valueString": "x"}]}]
                }]
            }]
        });
        let response = QuestionnaireResponse::from_json_str(&raw.to_string()).unwrap();
        assert_eq!(response.status, QuestionnaireResponseStatus::Completed);
        assert_eq!(response.to_json().unwrap(), raw);
    }

    #[test]
    fn test_answer_without_value() {
        let answer: QuestionnaireResponseAnswer =
            serde_json::from_value(json!({"item": [{"linkId": "a"}]})).unwrap();
        assert!(answer.value.is_none());
        assert_eq!(answer.item.len(), 1);
    }

    #[test]
    fn test_all_items_descends_into_answers() {
        let response: QuestionnaireResponse = serde_json::from_value(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "in-progress",
            "item": [
                {"linkId": "g", "item": [{"linkId": "a"}]},
                {"linkId": "q", "answer": [{"valueInteger": 1, "item": [{"linkId": "b"}]}]}
            ]
        }))
        .unwrap();
        let ids: Vec<_> = response.all_items().iter().map(|i| i.link_id.as_str()).collect();
        assert_eq!(ids, vec!["g", "a", "q", "b"]);
    }
}
