//! `value[x]` choice types
//!
//! FHIR JSON encodes a choice element as one key whose suffix names the type
//! (`valueBoolean`, `valueCoding`, ...). The enums here are externally tagged
//! with those keys and flattened into their owners.

use crate::complex::{
    Attachment, CodeableConcept, Coding, Expression, Quantity, Reference,
};
use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Value of an answer, an initial value or an answer option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnswerValue {
    #[serde(rename = "valueBoolean")]
    Boolean(bool),
    #[serde(rename = "valueDecimal", with = "rust_decimal::serde::float")]
    Decimal(Decimal),
    #[serde(rename = "valueInteger")]
    Integer(i64),
    #[serde(rename = "valueDate")]
    Date(String),
    #[serde(rename = "valueDateTime")]
    DateTime(String),
    #[serde(rename = "valueTime")]
    Time(String),
    #[serde(rename = "valueString")]
    String(String),
    #[serde(rename = "valueUri")]
    Uri(String),
    #[serde(rename = "valueAttachment")]
    Attachment(Attachment),
    #[serde(rename = "valueCoding")]
    Coding(Coding),
    #[serde(rename = "valueQuantity")]
    Quantity(Quantity),
    #[serde(rename = "valueReference")]
    Reference(Reference),
}

impl AnswerValue {
    /// FHIR type name of the value (`boolean`, `Coding`, ...)
    pub fn type_name(&self) -> &'static str {
        match self {
            AnswerValue::Boolean(_) => "boolean",
            AnswerValue::Decimal(_) => "decimal",
            AnswerValue::Integer(_) => "integer",
            AnswerValue::Date(_) => "date",
            AnswerValue::DateTime(_) => "dateTime",
            AnswerValue::Time(_) => "time",
            AnswerValue::String(_) => "string",
            AnswerValue::Uri(_) => "uri",
            AnswerValue::Attachment(_) => "Attachment",
            AnswerValue::Coding(_) => "Coding",
            AnswerValue::Quantity(_) => "Quantity",
            AnswerValue::Reference(_) => "Reference",
        }
    }

    /// `{"valueX": ...}` object, as it appears inside an answer
    pub fn to_json(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a single `{"valueX": ...}` object.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Re-key a choice written with another prefix, e.g. enableWhen's
    /// `answerCoding`, as `valueCoding` and parse it.
    pub fn from_prefixed(prefix: &str, fields: &Map<String, JsonValue>) -> Result<Option<Self>> {
        let mut found = fields
            .iter()
            .filter_map(|(key, value)| {
                let suffix = key.strip_prefix(prefix)?;
                suffix
                    .starts_with(|c: char| c.is_ascii_uppercase())
                    .then(|| (format!("value{suffix}"), value.clone()))
            });
        let Some((key, value)) = found.next() else {
            return Ok(None);
        };
        if found.next().is_some() {
            return Err(Error::InvalidFieldValue(format!(
                "more than one {prefix}[x] value"
            )));
        }
        let mut object = Map::new();
        object.insert(key, value);
        Self::from_json(JsonValue::Object(object)).map(Some)
    }

    /// Inverse of [`AnswerValue::from_prefixed`].
    pub fn to_prefixed(&self, prefix: &str) -> Result<(String, JsonValue)> {
        match self.to_json()? {
            JsonValue::Object(map) => map
                .into_iter()
                .next()
                .map(|(key, value)| {
                    let suffix = key.strip_prefix("value").unwrap_or(&key);
                    (format!("{prefix}{suffix}"), value)
                })
                .ok_or_else(|| Error::InvalidFieldValue("empty choice value".into())),
            other => Err(Error::InvalidFieldValue(format!(
                "choice value serialized as {other}"
            ))),
        }
    }

    pub fn as_coding(&self) -> Option<&Coding> {
        match self {
            AnswerValue::Coding(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnswerValue::String(s)
            | AnswerValue::Uri(s)
            | AnswerValue::Date(s)
            | AnswerValue::DateTime(s)
            | AnswerValue::Time(s) => Some(s),
            _ => None,
        }
    }

    /// Human readable rendering used for display text and messages
    pub fn display_string(&self) -> String {
        match self {
            AnswerValue::Boolean(b) => b.to_string(),
            AnswerValue::Decimal(d) => d.normalize().to_string(),
            AnswerValue::Integer(i) => i.to_string(),
            AnswerValue::Date(s)
            | AnswerValue::DateTime(s)
            | AnswerValue::Time(s)
            | AnswerValue::String(s)
            | AnswerValue::Uri(s) => s.clone(),
            AnswerValue::Attachment(a) => a.title.clone().or_else(|| a.url.clone()).unwrap_or_default(),
            AnswerValue::Coding(c) => c
                .display
                .clone()
                .or_else(|| c.code.clone())
                .unwrap_or_default(),
            AnswerValue::Quantity(q) => {
                let value = q.value.map(|v| v.normalize().to_string()).unwrap_or_default();
                match q.unit.as_deref().or(q.code.as_deref()) {
                    Some(unit) => format!("{value} {unit}"),
                    None => value,
                }
            }
            AnswerValue::Reference(r) => r
                .display
                .clone()
                .or_else(|| r.reference.clone())
                .unwrap_or_default(),
        }
    }
}

/// Value of an extension
///
/// A superset of [`AnswerValue`] covering the types SDC extensions carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtensionValue {
    #[serde(rename = "valueBoolean")]
    Boolean(bool),
    #[serde(rename = "valueDecimal", with = "rust_decimal::serde::float")]
    Decimal(Decimal),
    #[serde(rename = "valueInteger")]
    Integer(i64),
    #[serde(rename = "valuePositiveInt")]
    PositiveInt(u64),
    #[serde(rename = "valueUnsignedInt")]
    UnsignedInt(u64),
    #[serde(rename = "valueDate")]
    Date(String),
    #[serde(rename = "valueDateTime")]
    DateTime(String),
    #[serde(rename = "valueInstant")]
    Instant(String),
    #[serde(rename = "valueTime")]
    Time(String),
    #[serde(rename = "valueString")]
    String(String),
    #[serde(rename = "valueMarkdown")]
    Markdown(String),
    #[serde(rename = "valueCode")]
    Code(String),
    #[serde(rename = "valueId")]
    Id(String),
    #[serde(rename = "valueUri")]
    Uri(String),
    #[serde(rename = "valueUrl")]
    Url(String),
    #[serde(rename = "valueCanonical")]
    Canonical(String),
    #[serde(rename = "valueAttachment")]
    Attachment(Attachment),
    #[serde(rename = "valueCoding")]
    Coding(Coding),
    #[serde(rename = "valueCodeableConcept")]
    CodeableConcept(CodeableConcept),
    #[serde(rename = "valueQuantity")]
    Quantity(Quantity),
    #[serde(rename = "valueReference")]
    Reference(Reference),
    #[serde(rename = "valueExpression")]
    Expression(Expression),
}

impl ExtensionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtensionValue::String(s)
            | ExtensionValue::Markdown(s)
            | ExtensionValue::Code(s)
            | ExtensionValue::Id(s)
            | ExtensionValue::Uri(s)
            | ExtensionValue::Url(s)
            | ExtensionValue::Canonical(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an answer, when the type is one answers can hold.
    pub fn to_answer(&self) -> Option<AnswerValue> {
        Some(match self {
            ExtensionValue::Boolean(b) => AnswerValue::Boolean(*b),
            ExtensionValue::Decimal(d) => AnswerValue::Decimal(*d),
            ExtensionValue::Integer(i) => AnswerValue::Integer(*i),
            ExtensionValue::PositiveInt(i) | ExtensionValue::UnsignedInt(i) => {
                AnswerValue::Integer(i64::try_from(*i).ok()?)
            }
            ExtensionValue::Date(s) => AnswerValue::Date(s.clone()),
            ExtensionValue::DateTime(s) | ExtensionValue::Instant(s) => {
                AnswerValue::DateTime(s.clone())
            }
            ExtensionValue::Time(s) => AnswerValue::Time(s.clone()),
            ExtensionValue::String(s) | ExtensionValue::Markdown(s) => {
                AnswerValue::String(s.clone())
            }
            ExtensionValue::Uri(s) | ExtensionValue::Url(s) | ExtensionValue::Canonical(s) => {
                AnswerValue::Uri(s.clone())
            }
            ExtensionValue::Attachment(a) => AnswerValue::Attachment(a.clone()),
            ExtensionValue::Coding(c) => AnswerValue::Coding(c.clone()),
            ExtensionValue::Quantity(q) => AnswerValue::Quantity(q.clone()),
            ExtensionValue::Reference(r) => AnswerValue::Reference(r.clone()),
            ExtensionValue::Code(_)
            | ExtensionValue::Id(_)
            | ExtensionValue::CodeableConcept(_)
            | ExtensionValue::Expression(_) => return None,
        })
    }
}

impl From<AnswerValue> for ExtensionValue {
    fn from(value: AnswerValue) -> Self {
        match value {
            AnswerValue::Boolean(b) => ExtensionValue::Boolean(b),
            AnswerValue::Decimal(d) => ExtensionValue::Decimal(d),
            AnswerValue::Integer(i) => ExtensionValue::Integer(i),
            AnswerValue::Date(s) => ExtensionValue::Date(s),
            AnswerValue::DateTime(s) => ExtensionValue::DateTime(s),
            AnswerValue::Time(s) => ExtensionValue::Time(s),
            AnswerValue::String(s) => ExtensionValue::String(s),
            AnswerValue::Uri(s) => ExtensionValue::Uri(s),
            AnswerValue::Attachment(a) => ExtensionValue::Attachment(a),
            AnswerValue::Coding(c) => ExtensionValue::Coding(c),
            AnswerValue::Quantity(q) => ExtensionValue::Quantity(q),
            AnswerValue::Reference(r) => ExtensionValue::Reference(r),
        }
    }
}
