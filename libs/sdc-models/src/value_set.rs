//! FHIR ValueSet model
//!
//! Only the parts needed to turn a value set into answer options: the
//! expansion, and the enumerated concepts of `compose` as a fallback.

use crate::complex::Coding;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// FHIR ValueSet resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSet {
    /// Resource type - always "ValueSet"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    /// Logical id, the target of `#id` answerValueSet references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Content logical definition (the "intension")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose: Option<ValueSetCompose>,

    /// Used when the value set is "expanded"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ValueSetExpansion>,

    /// Additional content
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

fn default_resource_type() -> String {
    "ValueSet".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetCompose {
    #[serde(default)]
    pub include: Vec<ValueSetInclude>,
}

/// Include codes from a code system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetInclude {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<ValueSetConcept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetConcept {
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetExpansion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<ValueSetExpansionContains>,
}

/// Codes in an expansion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSetExpansionContains {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// If user cannot select this entry
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub is_abstract: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<ValueSetExpansionContains>,
}

impl ValueSetExpansionContains {
    fn is_selectable(&self) -> bool {
        !self.is_abstract.unwrap_or(false) && !self.inactive.unwrap_or(false) && self.code.is_some()
    }

    fn to_coding(&self) -> Coding {
        Coding {
            system: self.system.clone(),
            version: self.version.clone(),
            code: self.code.clone(),
            display: self.display.clone(),
            ..Default::default()
        }
    }
}

impl ValueSet {
    /// Codings a user may pick: expansion entries (nested ones included)
    /// that are neither abstract nor inactive. Without an expansion, the
    /// concepts enumerated in `compose.include`.
    pub fn selectable_codings(&self) -> Vec<Coding> {
        if let Some(expansion) = &self.expansion {
            let mut out = Vec::new();
            flatten_contains(&expansion.contains, &mut out);
            return out;
        }
        self.compose
            .iter()
            .flat_map(|compose| compose.include.iter())
            .flat_map(|include| {
                include.concept.iter().map(move |concept| Coding {
                    system: include.system.clone(),
                    version: include.version.clone(),
                    code: Some(concept.code.clone()),
                    display: concept.display.clone(),
                    ..Default::default()
                })
            })
            .collect()
    }
}

fn flatten_contains(entries: &[ValueSetExpansionContains], out: &mut Vec<Coding>) {
    for entry in entries {
        if entry.is_selectable() {
            out.push(entry.to_coding());
        }
        flatten_contains(&entry.contains, out);
    }
}
