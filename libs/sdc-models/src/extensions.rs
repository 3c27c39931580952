//! SDC extension URLs and typed accessors
//!
//! Questionnaire behaviour beyond the core resource lives in extensions.
//! The accessors here turn them into typed values so the engine never
//! matches on URLs itself.

use crate::complex::{Coding, Expression, Extension};
use crate::questionnaire::{Questionnaire, QuestionnaireItem};
use crate::value::{AnswerValue, ExtensionValue};

pub const ITEM_CONTROL: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-itemControl";
pub const ITEM_CONTROL_SYSTEM: &str = "http://hl7.org/fhir/questionnaire-item-control";
/// Pre-standard item control URL still found in older forms
pub const ITEM_CONTROL_ANDROID_FHIR: &str =
    "https://github.com/google/android-fhir/StructureDefinition/questionnaire-itemControl";
pub const ITEM_CONTROL_SYSTEM_ANDROID_FHIR: &str =
    "https://github.com/google/android-fhir/questionnaire-item-control";

pub const HIDDEN: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-hidden";
pub const DISPLAY_CATEGORY: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-displayCategory";
pub const DISPLAY_CATEGORY_SYSTEM: &str = "http://hl7.org/fhir/questionnaire-display-category";
pub const DISPLAY_CATEGORY_INSTRUCTIONS: &str = "instructions";

pub const ENTRY_MODE: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-entryMode";
pub const LAUNCH_CONTEXT: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-launchContext";
pub const LAUNCH_CONTEXT_SYSTEM: &str = "http://hl7.org/fhir/uv/sdc/CodeSystem/launchContext";

pub const CALCULATED_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-calculatedExpression";
pub const ENABLE_WHEN_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-enableWhenExpression";
pub const ANSWER_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-answerExpression";
pub const INITIAL_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-initialExpression";
pub const ANSWER_OPTIONS_TOGGLE_EXPRESSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-answerOptionsToggleExpression";
pub const ANSWER_OPTIONS_TOGGLE_OPTION: &str = "option";
pub const ANSWER_OPTIONS_TOGGLE_EXPRESSION_PART: &str = "expression";

pub const VARIABLE: &str = "http://hl7.org/fhir/StructureDefinition/variable";
pub const CQF_CALCULATED_VALUE: &str = "http://hl7.org/fhir/StructureDefinition/cqf-calculatedValue";
pub const CQF_EXPRESSION: &str = "http://hl7.org/fhir/StructureDefinition/cqf-expression";

pub const MIN_VALUE: &str = "http://hl7.org/fhir/StructureDefinition/minValue";
pub const MAX_VALUE: &str = "http://hl7.org/fhir/StructureDefinition/maxValue";
pub const MIN_LENGTH: &str = "http://hl7.org/fhir/StructureDefinition/minLength";
pub const REGEX: &str = "http://hl7.org/fhir/StructureDefinition/regex";
pub const TRANSLATION: &str = "http://hl7.org/fhir/StructureDefinition/translation";

pub const LAST_LAUNCHED_TIMESTAMP: &str =
    "http://github.com/google-android/questionnaire-lastLaunched-timestamp";

/// Item control codes that decorate display items rather than render them
pub const ITEM_CONTROL_PAGE: &str = "page";
pub const ITEM_CONTROL_FLYOVER: &str = "flyover";
pub const ITEM_CONTROL_HELP: &str = "help";

/// How the user may move between pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryMode {
    /// Forward only; every page is validated before leaving it
    Sequential,
    /// Back freely, forward after validation
    PriorEdit,
    #[default]
    Random,
}

impl EntryMode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "sequential" => Some(EntryMode::Sequential),
            "prior-edit" => Some(EntryMode::PriorEdit),
            "random" => Some(EntryMode::Random),
            _ => None,
        }
    }
}

/// One `answerOptionsToggleExpression` group
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOptionsToggle {
    pub options: Vec<AnswerValue>,
    pub expression: Expression,
}

/// A declared launch context (`%patient`, `%user`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchContextDeclaration {
    /// Variable name, from the `name` Coding code or id
    pub name: Option<String>,
    /// System of the `name` Coding, when given as a Coding
    pub name_system: Option<String>,
    /// Allowed resource types
    pub resource_types: Vec<String>,
}

impl QuestionnaireItem {
    pub fn is_hidden(&self) -> bool {
        self.extension(HIDDEN)
            .and_then(Extension::as_bool)
            .unwrap_or(false)
    }

    /// Item control code from either the HL7 or the legacy extension
    pub fn item_control(&self) -> Option<&str> {
        self.extension
            .iter()
            .filter(|e| e.url == ITEM_CONTROL || e.url == ITEM_CONTROL_ANDROID_FHIR)
            .filter_map(Extension::as_codeable_concept)
            .flat_map(|cc| cc.coding.iter())
            .find(|c| {
                matches!(
                    c.system.as_deref(),
                    Some(ITEM_CONTROL_SYSTEM | ITEM_CONTROL_SYSTEM_ANDROID_FHIR)
                )
            })
            .and_then(|c| c.code.as_deref())
    }

    pub fn is_page(&self) -> bool {
        self.item_control() == Some(ITEM_CONTROL_PAGE)
    }

    pub fn display_category(&self) -> Option<&str> {
        self.extension(DISPLAY_CATEGORY)
            .and_then(Extension::as_codeable_concept)
            .and_then(|cc| cc.code_in(DISPLAY_CATEGORY_SYSTEM))
    }

    pub fn is_instructions(&self) -> bool {
        self.is_display_item() && self.display_category() == Some(DISPLAY_CATEGORY_INSTRUCTIONS)
    }

    pub fn is_flyover(&self) -> bool {
        self.is_display_item() && self.item_control() == Some(ITEM_CONTROL_FLYOVER)
    }

    pub fn is_help(&self) -> bool {
        self.is_display_item() && self.item_control() == Some(ITEM_CONTROL_HELP)
    }

    fn expression_extension(&self, url: &str) -> Option<&Expression> {
        self.extension(url).and_then(Extension::as_expression)
    }

    pub fn calculated_expression(&self) -> Option<&Expression> {
        self.expression_extension(CALCULATED_EXPRESSION)
    }

    pub fn enable_when_expression(&self) -> Option<&Expression> {
        self.expression_extension(ENABLE_WHEN_EXPRESSION)
    }

    pub fn answer_expression(&self) -> Option<&Expression> {
        self.expression_extension(ANSWER_EXPRESSION)
    }

    pub fn initial_expression(&self) -> Option<&Expression> {
        self.expression_extension(INITIAL_EXPRESSION)
    }

    /// `variable` extensions declared on this item, in declaration order
    pub fn variable_expressions(&self) -> Vec<&Expression> {
        self.extensions(VARIABLE)
            .filter_map(Extension::as_expression)
            .collect()
    }

    pub fn min_value(&self) -> Option<AnswerValue> {
        self.bound_literal(MIN_VALUE)
    }

    pub fn max_value(&self) -> Option<AnswerValue> {
        self.bound_literal(MAX_VALUE)
    }

    pub fn min_value_expression(&self) -> Option<Expression> {
        self.bound_expression(MIN_VALUE)
    }

    pub fn max_value_expression(&self) -> Option<Expression> {
        self.bound_expression(MAX_VALUE)
    }

    fn bound_literal(&self, url: &str) -> Option<AnswerValue> {
        self.extension(url)?.value.as_ref()?.to_answer()
    }

    fn bound_expression(&self, url: &str) -> Option<Expression> {
        self.extension(url)?
            .primitive_element()?
            .extension
            .iter()
            .find(|e| e.url == CQF_CALCULATED_VALUE)
            .and_then(Extension::as_expression)
            .cloned()
    }

    /// `cqf-expression` on `_text`, which replaces the displayed text
    pub fn text_expression(&self) -> Option<&Expression> {
        self.text_element
            .as_ref()?
            .extension
            .iter()
            .find(|e| e.url == CQF_EXPRESSION)
            .and_then(Extension::as_expression)
    }

    pub fn answer_options_toggle_expressions(&self) -> Vec<AnswerOptionsToggle> {
        self.extensions(ANSWER_OPTIONS_TOGGLE_EXPRESSION)
            .filter_map(|ext| {
                let expression = ext
                    .sub_extension(ANSWER_OPTIONS_TOGGLE_EXPRESSION_PART)?
                    .as_expression()?
                    .clone();
                let options = ext
                    .sub_extensions(ANSWER_OPTIONS_TOGGLE_OPTION)
                    .filter_map(|o| o.value.as_ref()?.to_answer())
                    .collect();
                Some(AnswerOptionsToggle {
                    options,
                    expression,
                })
            })
            .collect()
    }

    pub fn regex(&self) -> Option<&str> {
        self.extension(REGEX).and_then(Extension::as_str)
    }

    pub fn min_length(&self) -> Option<i64> {
        self.extension(MIN_LENGTH).and_then(Extension::as_integer)
    }

    /// Every expression carried by the item, each with the extension URL
    /// it came from.
    pub fn expressions(&self) -> Vec<(&'static str, Expression)> {
        let mut out = Vec::new();
        for (url, expr) in [
            (CALCULATED_EXPRESSION, self.calculated_expression()),
            (ENABLE_WHEN_EXPRESSION, self.enable_when_expression()),
            (ANSWER_EXPRESSION, self.answer_expression()),
            (INITIAL_EXPRESSION, self.initial_expression()),
            (CQF_EXPRESSION, self.text_expression()),
        ] {
            if let Some(expr) = expr {
                out.push((url, expr.clone()));
            }
        }
        for (url, expr) in [
            (MIN_VALUE, self.min_value_expression()),
            (MAX_VALUE, self.max_value_expression()),
        ] {
            if let Some(expr) = expr {
                out.push((url, expr));
            }
        }
        for toggle in self.answer_options_toggle_expressions() {
            out.push((ANSWER_OPTIONS_TOGGLE_EXPRESSION, toggle.expression));
        }
        out
    }
}

impl Questionnaire {
    pub fn extension(&self, url: &str) -> Option<&Extension> {
        self.extension.iter().find(|e| e.url == url)
    }

    /// `None` when the questionnaire does not declare one or the code is unknown
    pub fn entry_mode(&self) -> Option<EntryMode> {
        self.extension(ENTRY_MODE)
            .and_then(Extension::as_str)
            .and_then(EntryMode::from_code)
    }

    /// Paginated when any top-level item is a page
    pub fn is_paginated(&self) -> bool {
        self.item.iter().any(QuestionnaireItem::is_page)
    }

    pub fn variable_expressions(&self) -> Vec<&Expression> {
        self.extension
            .iter()
            .filter(|e| e.url == VARIABLE)
            .filter_map(Extension::as_expression)
            .collect()
    }

    pub fn launch_context_extensions(&self) -> impl Iterator<Item = &Extension> {
        self.extension.iter().filter(|e| e.url == LAUNCH_CONTEXT)
    }

    pub fn launch_contexts(&self) -> Vec<LaunchContextDeclaration> {
        self.launch_context_extensions()
            .map(|ext| {
                let (name, name_system) = match ext.sub_extension("name").and_then(|n| n.value.as_ref()) {
                    Some(ExtensionValue::Coding(Coding { system, code, .. })) => {
                        (code.clone(), system.clone())
                    }
                    Some(other) => (other.as_str().map(str::to_string), None),
                    None => (None, None),
                };
                let resource_types = ext
                    .sub_extensions("type")
                    .filter_map(Extension::as_str)
                    .map(str::to_string)
                    .collect();
                LaunchContextDeclaration {
                    name,
                    name_system,
                    resource_types,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::{CodeableConcept, Element};
    use crate::questionnaire::ItemType;
    use serde_json::json;

    fn item(raw: serde_json::Value) -> QuestionnaireItem {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_item_control_and_page() {
        let page = item(json!({
            "linkId": "p1",
            "type": "group",
            "extension": [{
                "url": ITEM_CONTROL,
                "valueCodeableConcept": {"coding": [{"system": ITEM_CONTROL_SYSTEM, "code": "page"}]}
            }]
        }));
        assert!(page.is_page());

        let legacy = QuestionnaireItem {
            extension: vec![Extension::new(
                ITEM_CONTROL_ANDROID_FHIR,
                ExtensionValue::CodeableConcept(CodeableConcept {
                    coding: vec![Coding::new(ITEM_CONTROL_SYSTEM_ANDROID_FHIR, "slider")],
                    text: None,
                }),
            )],
            ..QuestionnaireItem::new("s", ItemType::Integer)
        };
        assert_eq!(legacy.item_control(), Some("slider"));
    }

    #[test]
    fn test_min_value_expression_and_literal() {
        let q = item(json!({
            "linkId": "dob",
            "type": "date",
            "extension": [
                {
                    "url": MIN_VALUE,
                    "_valueDate": {"extension": [{
                        "url": CQF_CALCULATED_VALUE,
                        "valueExpression": {"language": "text/fhirpath", "expression": "today() - 90 years"}
                    }]}
                },
                {"url": MAX_VALUE, "valueDate": "2030-01-01"}
            ]
        }));
        assert_eq!(
            q.min_value_expression().as_ref().map(Expression::text),
            Some("today() - 90 years")
        );
        assert!(q.min_value().is_none());
        assert_eq!(q.max_value(), Some(AnswerValue::Date("2030-01-01".into())));
    }

    #[test]
    fn test_toggle_expressions() {
        let q = item(json!({
            "linkId": "c",
            "type": "choice",
            "extension": [{
                "url": ANSWER_OPTIONS_TOGGLE_EXPRESSION,
                "extension": [
                    {"url": "option", "valueCoding": {"system": "s", "code": "a"}},
                    {"url": "option", "valueCoding": {"system": "s", "code": "b"}},
                    {"url": "expression", "valueExpression": {"language": "text/fhirpath", "expression": "true"}}
                ]
            }]
        }));
        let toggles = q.answer_options_toggle_expressions();
        assert_eq!(toggles.len(), 1);
        assert_eq!(toggles[0].options.len(), 2);
        assert_eq!(toggles[0].expression.text(), "true");
    }

    #[test]
    fn test_text_expression() {
        let mut q = QuestionnaireItem::new("t", ItemType::Display);
        q.text_element = Some(Element {
            id: None,
            extension: vec![Extension::new(
                CQF_EXPRESSION,
                ExtensionValue::Expression(Expression::fhirpath("'Hello'")),
            )],
        });
        assert_eq!(q.text_expression().map(Expression::text), Some("'Hello'"));
        assert_eq!(q.expressions().len(), 1);
    }

    #[test]
    fn test_questionnaire_level_extensions() {
        let questionnaire: Questionnaire = serde_json::from_value(json!({
            "resourceType": "Questionnaire",
            "extension": [
                {"url": ENTRY_MODE, "valueCode": "prior-edit"},
                {"url": LAUNCH_CONTEXT, "extension": [
                    {"url": "name", "valueCoding": {"system": LAUNCH_CONTEXT_SYSTEM, "code": "patient"}},
                    {"url": "type", "valueCode": "Patient"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(questionnaire.entry_mode(), Some(EntryMode::PriorEdit));
        let contexts = questionnaire.launch_contexts();
        assert_eq!(contexts[0].name.as_deref(), Some("patient"));
        assert_eq!(contexts[0].resource_types, vec!["Patient".to_string()]);
    }
}
