//! FHIR Questionnaire model

use crate::complex::{Coding, Element, Extension};
use crate::error::{Error, Result};
use crate::value::AnswerValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// FHIR Questionnaire resource
///
/// A structured set of questions intended to guide the collection of
/// answers from end-users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    /// Resource type - always "Questionnaire"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Canonical identifier, referenced by responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// draft | active | retired | unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Contained resources, typically answer value sets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,

    /// Additional content
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

fn default_resource_type() -> String {
    "Questionnaire".to_string()
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self {
            resource_type: default_resource_type(),
            id: None,
            url: None,
            version: None,
            name: None,
            title: None,
            status: None,
            contained: Vec::new(),
            extension: Vec::new(),
            item: Vec::new(),
            other: Map::new(),
        }
    }
}

impl Questionnaire {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let questionnaire: Self = serde_json::from_str(json)?;
        if questionnaire.resource_type != "Questionnaire" {
            return Err(Error::InvalidResource(format!(
                "expected Questionnaire, got {}",
                questionnaire.resource_type
            )));
        }
        Ok(questionnaire)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Depth-first search for the item with `link_id`.
    pub fn find_item(&self, link_id: &str) -> Option<&QuestionnaireItem> {
        find_in(&self.item, link_id)
    }

    /// All items in depth-first definition order.
    pub fn all_items(&self) -> Vec<&QuestionnaireItem> {
        let mut out = Vec::new();
        collect(&self.item, &mut out);
        out
    }
}

fn find_in<'a>(items: &'a [QuestionnaireItem], link_id: &str) -> Option<&'a QuestionnaireItem> {
    items.iter().find_map(|item| {
        if item.link_id == link_id {
            Some(item)
        } else {
            find_in(&item.item, link_id)
        }
    })
}

fn collect<'a>(items: &'a [QuestionnaireItem], out: &mut Vec<&'a QuestionnaireItem>) {
    for item in items {
        out.push(item);
        collect(&item.item, out);
    }
}

/// Questions and sections within the Questionnaire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    /// Unique id for item in questionnaire
    pub link_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<Coding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(rename = "_prefix", skip_serializing_if = "Option::is_none")]
    pub prefix_element: Option<Element>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Translations and `cqf-expression` of `text`
    #[serde(rename = "_text", skip_serializing_if = "Option::is_none")]
    pub text_element: Option<Element>,

    /// Required by FHIR; a missing type is rejected when the engine loads
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_when: Vec<EnableWhen>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_behavior: Option<EnableBehavior>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeats: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    /// Canonical URL, or `#id` for a contained ValueSet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_value_set: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial: Vec<Initial>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

impl QuestionnaireItem {
    pub fn new(link_id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            link_id: link_id.into(),
            item_type: Some(item_type),
            ..Default::default()
        }
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn is_repeating(&self) -> bool {
        self.repeats.unwrap_or(false)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.unwrap_or(false)
    }

    pub fn item_type(&self) -> Option<ItemType> {
        self.item_type
    }

    pub fn is_group(&self) -> bool {
        self.item_type == Some(ItemType::Group)
    }

    pub fn is_display_item(&self) -> bool {
        self.item_type == Some(ItemType::Display)
    }

    /// A group whose occurrences are stored as separate answers
    pub fn is_repeated_group(&self) -> bool {
        self.is_group() && self.is_repeating()
    }

    /// Questions (not groups) with child items nest those children under
    /// each answer instead of under the response item.
    pub fn should_have_nested_items_under_answers(&self) -> bool {
        !self.item.is_empty() && (!self.is_group() || self.is_repeating())
    }

    pub fn extension(&self, url: &str) -> Option<&Extension> {
        self.extension.iter().find(|e| e.url == url)
    }

    pub fn extensions<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Extension> {
        self.extension.iter().filter(move |e| e.url == url)
    }
}

/// Item type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "display")]
    Display,
    #[serde(rename = "question")]
    Question,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "choice")]
    Choice,
    #[serde(rename = "open-choice")]
    OpenChoice,
    #[serde(rename = "attachment")]
    Attachment,
    #[serde(rename = "reference")]
    Reference,
    #[serde(rename = "quantity")]
    Quantity,
    #[serde(rename = "coding")]
    Coding,
}

impl ItemType {
    /// Whether an answer of `value`'s type may be recorded for this item type.
    pub fn accepts(&self, value: &AnswerValue) -> bool {
        matches!(
            (self, value),
            (ItemType::Question, _)
                | (ItemType::Boolean, AnswerValue::Boolean(_))
                | (ItemType::Decimal, AnswerValue::Decimal(_))
                | (ItemType::Integer, AnswerValue::Integer(_))
                | (ItemType::Date, AnswerValue::Date(_))
                | (ItemType::DateTime, AnswerValue::DateTime(_))
                | (ItemType::Time, AnswerValue::Time(_))
                | (ItemType::String | ItemType::Text, AnswerValue::String(_))
                | (ItemType::Url, AnswerValue::Uri(_))
                | (ItemType::Attachment, AnswerValue::Attachment(_))
                | (ItemType::Reference, AnswerValue::Reference(_))
                | (ItemType::Quantity, AnswerValue::Quantity(_))
                | (ItemType::Choice | ItemType::Coding, AnswerValue::Coding(_))
                | (
                    ItemType::OpenChoice,
                    AnswerValue::Coding(_) | AnswerValue::String(_)
                )
                // choice items may offer non-coding answer options
                | (
                    ItemType::Choice,
                    AnswerValue::Integer(_)
                        | AnswerValue::Date(_)
                        | AnswerValue::Time(_)
                        | AnswerValue::String(_)
                        | AnswerValue::Reference(_)
                )
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ItemType::Group => "group",
            ItemType::Display => "display",
            ItemType::Question => "question",
            ItemType::Boolean => "boolean",
            ItemType::Decimal => "decimal",
            ItemType::Integer => "integer",
            ItemType::Date => "date",
            ItemType::DateTime => "dateTime",
            ItemType::Time => "time",
            ItemType::String => "string",
            ItemType::Text => "text",
            ItemType::Url => "url",
            ItemType::Choice => "choice",
            ItemType::OpenChoice => "open-choice",
            ItemType::Attachment => "attachment",
            ItemType::Reference => "reference",
            ItemType::Quantity => "quantity",
            ItemType::Coding => "coding",
        }
    }
}

/// all | any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnableBehavior {
    All,
    Any,
}

/// exists | = | != | > | < | >= | <=
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnableWhenOperator {
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

/// Only allow data when a condition on another question holds
///
/// The comparison value is `answer[x]` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnableWhen", into = "RawEnableWhen")]
pub struct EnableWhen {
    /// linkId of the question that determines whether this item is enabled
    pub question: String,
    pub operator: EnableWhenOperator,
    pub answer: AnswerValue,
}

#[derive(Serialize, Deserialize)]
struct RawEnableWhen {
    question: String,
    operator: EnableWhenOperator,
    #[serde(flatten)]
    answer: Map<String, Value>,
}

impl TryFrom<RawEnableWhen> for EnableWhen {
    type Error = Error;

    fn try_from(raw: RawEnableWhen) -> Result<Self> {
        let answer = AnswerValue::from_prefixed("answer", &raw.answer)?.ok_or_else(|| {
            Error::InvalidFieldValue(format!(
                "enableWhen on '{}' has no answer[x]",
                raw.question
            ))
        })?;
        Ok(Self {
            question: raw.question,
            operator: raw.operator,
            answer,
        })
    }
}

impl From<EnableWhen> for RawEnableWhen {
    fn from(enable_when: EnableWhen) -> Self {
        let answer = enable_when
            .answer
            .to_prefixed("answer")
            .map(|(key, value)| Map::from_iter([(key, value)]))
            .unwrap_or_default();
        Self {
            question: enable_when.question,
            operator: enable_when.operator,
            answer,
        }
    }
}

/// Permitted answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(flatten)]
    pub value: AnswerValue,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_selected: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

impl AnswerOption {
    pub fn new(value: AnswerValue) -> Self {
        Self {
            value,
            initial_selected: None,
            extension: Vec::new(),
        }
    }

    pub fn is_initial_selected(&self) -> bool {
        self.initial_selected.unwrap_or(false)
    }
}

/// Initial value(s) when item is first rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initial {
    #[serde(flatten)]
    pub value: AnswerValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_questionnaire() {
        let q = Questionnaire::from_json_str(
            &json!({
                "resourceType": "Questionnaire",
                "url": "http://example.org/Questionnaire/q",
                "item": [{
                    "linkId": "group",
                    "type": "group",
                    "item": [{
                        "linkId": "dob",
                        "type": "date",
                        "enableWhen": [{"question": "consent", "operator": "=", "answerBoolean": true}]
                    }]
                }]
            })
            .to_string(),
        )
        .unwrap();
        let dob = q.find_item("dob").unwrap();
        assert_eq!(dob.item_type(), Some(ItemType::Date));
        assert_eq!(dob.enable_when[0].answer, AnswerValue::Boolean(true));
        assert_eq!(q.all_items().len(), 2);
    }

    #[test]
    fn test_enable_when_serializes_answer_prefix() {
        let ew = EnableWhen {
            question: "q".into(),
            operator: EnableWhenOperator::GreaterOrEqual,
            answer: AnswerValue::Integer(18),
        };
        assert_eq!(
            serde_json::to_value(&ew).unwrap(),
            json!({"question": "q", "operator": ">=", "answerInteger": 18})
        );
    }

    #[test]
    fn test_enable_when_without_answer_is_rejected() {
        let result: std::result::Result<EnableWhen, _> =
            serde_json::from_value(json!({"question": "q", "operator": "exists"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_resource_type() {
        let err = Questionnaire::from_json_str(r#"{"resourceType": "Patient"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidResource(_)));
    }

    #[test]
    fn test_answer_option_flattened_value() {
        let option: AnswerOption = serde_json::from_value(json!({
            "valueCoding": {"system": "s", "code": "a"},
            "initialSelected": true
        }))
        .unwrap();
        assert!(option.is_initial_selected());
        assert_eq!(option.value.as_coding().and_then(|c| c.code.as_deref()), Some("a"));
    }

    #[test]
    fn test_nested_items_under_answers() {
        let mut question = QuestionnaireItem::new("q", ItemType::Boolean);
        question.item.push(QuestionnaireItem::new("child", ItemType::String));
        assert!(question.should_have_nested_items_under_answers());

        let mut group = QuestionnaireItem::new("g", ItemType::Group);
        group.item.push(QuestionnaireItem::new("child", ItemType::String));
        assert!(!group.should_have_nested_items_under_answers());
        group.repeats = Some(true);
        assert!(group.should_have_nested_items_under_answers());
    }
}
