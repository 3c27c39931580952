//! FHIR complex data types used by questionnaires and responses

use crate::value::ExtensionValue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reference to a code defined by a terminology system
///
/// Equality ignores `display` and `userSelected`: two codings naming the
/// same concept are the same answer however they are labelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Translations of `display`
    #[serde(rename = "_display", skip_serializing_if = "Option::is_none")]
    pub display_element: Option<Element>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_selected: Option<bool>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn is(&self, system: &str, code: &str) -> bool {
        self.system.as_deref() == Some(system) && self.code.as_deref() == Some(code)
    }
}

impl PartialEq for Coding {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system && self.version == other.version && self.code == other.code
    }
}

/// Concept - reference to a terminology or just text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// First code from `system`
    pub fn code_in(&self, system: &str) -> Option<&str> {
        self.coding
            .iter()
            .find(|c| c.system.as_deref() == Some(system))
            .and_then(|c| c.code.as_deref())
    }
}

/// A measured amount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Decimal>,

    /// < | <= | >= | >
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A reference from one resource to another
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Content in a format defined elsewhere
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Base64 data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,
}

/// An expression that can be used to generate a value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name usable as `%name` from other expressions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// text/fhirpath | application/x-fhir-query | text/cql | ...
    pub language: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

pub const LANGUAGE_FHIRPATH: &str = "text/fhirpath";
pub const LANGUAGE_X_FHIR_QUERY: &str = "application/x-fhir-query";

impl Expression {
    pub fn fhirpath(expression: impl Into<String>) -> Self {
        Self {
            language: LANGUAGE_FHIRPATH.to_string(),
            expression: Some(expression.into()),
            ..Default::default()
        }
    }

    pub fn is_fhirpath(&self) -> bool {
        self.language == LANGUAGE_FHIRPATH
    }

    pub fn is_x_fhir_query(&self) -> bool {
        self.language == LANGUAGE_X_FHIR_QUERY
    }

    /// Expression text, or the empty string when only a reference is given.
    pub fn text(&self) -> &str {
        self.expression.as_deref().unwrap_or("")
    }
}

/// Additional content defined by implementations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,

    #[serde(flatten)]
    pub value: Option<ExtensionValue>,

    /// Remaining keys, notably `_valueX` primitive extensions
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Extension {
    pub fn new(url: impl Into<String>, value: ExtensionValue) -> Self {
        Self {
            url: url.into(),
            extension: Vec::new(),
            value: Some(value),
            other: Map::new(),
        }
    }

    /// Complex extension made of sub-extensions only
    pub fn complex(url: impl Into<String>, extension: Vec<Extension>) -> Self {
        Self {
            url: url.into(),
            extension,
            value: None,
            other: Map::new(),
        }
    }

    pub fn sub_extension(&self, url: &str) -> Option<&Extension> {
        self.extension.iter().find(|e| e.url == url)
    }

    pub fn sub_extensions<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Extension> {
        self.extension.iter().filter(move |e| e.url == url)
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match &self.value {
            Some(ExtensionValue::Expression(e)) => Some(e),
            _ => None,
        }
    }

    pub fn as_codeable_concept(&self) -> Option<&CodeableConcept> {
        match &self.value {
            Some(ExtensionValue::CodeableConcept(c)) => Some(c),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            Some(ExtensionValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// String-like primitive value (`string`, `code`, `uri`, `markdown`, ...)
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(ExtensionValue::as_str)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &self.value {
            Some(ExtensionValue::Integer(i)) => Some(*i),
            Some(ExtensionValue::PositiveInt(i) | ExtensionValue::UnsignedInt(i)) => {
                i64::try_from(*i).ok()
            }
            _ => None,
        }
    }

    /// The `_valueX` element carrying extensions on the primitive value,
    /// e.g. a `cqf-calculatedValue` on `minValue`.
    pub fn primitive_element(&self) -> Option<Element> {
        self.other
            .iter()
            .find(|(key, _)| key.starts_with("_value"))
            .and_then(|(_, value)| serde_json::from_value(value.clone()).ok())
    }
}

/// Extensions attached to a primitive through its `_field` sibling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coding_equality_ignores_display() {
        let a = Coding::new("http://loinc.org", "1234-5").with_display("One");
        let b = Coding::new("http://loinc.org", "1234-5").with_display("Other");
        assert_eq!(a, b);
        assert_ne!(a, Coding::new("http://snomed.info/sct", "1234-5"));
    }

    #[test]
    fn test_extension_value_round_trip() {
        let raw = json!({
            "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-calculatedExpression",
            "valueExpression": {"language": "text/fhirpath", "expression": "1 + 1"}
        });
        let ext: Extension = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(ext.as_expression().map(Expression::text), Some("1 + 1"));
        assert_eq!(serde_json::to_value(&ext).unwrap(), raw);
    }

    #[test]
    fn test_complex_extension_has_no_value() {
        let ext: Extension = serde_json::from_value(json!({
            "url": "outer",
            "extension": [{"url": "lang", "valueCode": "de"}]
        }))
        .unwrap();
        assert!(ext.value.is_none());
        assert_eq!(ext.sub_extension("lang").and_then(Extension::as_str), Some("de"));
    }

    #[test]
    fn test_primitive_element_is_kept() {
        let raw = json!({
            "url": "http://hl7.org/fhir/StructureDefinition/minValue",
            "_valueDate": {
                "extension": [{
                    "url": "http://hl7.org/fhir/StructureDefinition/cqf-calculatedValue",
                    "valueExpression": {"language": "text/fhirpath", "expression": "today()"}
                }]
            }
        });
        let ext: Extension = serde_json::from_value(raw.clone()).unwrap();
        assert!(ext.value.is_none());
        let element = ext.primitive_element().unwrap();
        assert_eq!(element.extension[0].as_expression().map(Expression::text), Some("today()"));
        assert_eq!(serde_json::to_value(&ext).unwrap(), raw);
    }

    #[test]
    fn test_quantity_decimal_value() {
        let q: Quantity =
            serde_json::from_value(json!({"value": 1.5, "unit": "kg", "code": "kg"})).unwrap();
        assert_eq!(q.value, Some(Decimal::new(15, 1)));
    }
}
