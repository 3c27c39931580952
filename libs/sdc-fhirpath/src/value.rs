//! FHIRPath values and collections.
//!
//! Every expression evaluates to a [`Collection`]. Items are either System
//! primitives or JSON objects carrying an optional FHIR type name. Objects are
//! produced by navigating into a resource; primitive JSON members are converted
//! on the way out using the type hint from choice-element suffixes
//! (`valueDate`, `valueDecimal`, ...).

use crate::error::{Error, Result};
use crate::temporal::{FhirDate, FhirDateTime, FhirTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value as JsonValue};
use smallvec::SmallVec;
use std::str::FromStr;
use std::sync::Arc;

const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// FHIR data type suffixes recognised on choice elements.
static CHOICE_TYPES: phf::Set<&'static str> = phf::phf_set! {
    "Boolean", "Integer", "Decimal", "String", "Uri", "Url", "Canonical", "Code",
    "Id", "Markdown", "Oid", "Uuid", "PositiveInt", "UnsignedInt", "Integer64",
    "Date", "DateTime", "Time", "Instant", "Base64Binary",
    "Coding", "CodeableConcept", "Quantity", "Reference", "Attachment",
    "Period", "Range", "Ratio", "Identifier", "HumanName", "Address",
    "ContactPoint", "Duration", "Age", "Count", "Distance", "Money",
    "SampledData", "Signature", "Timing", "Annotation", "Expression",
};

#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(Arc<str>),
    Date(FhirDate),
    DateTime(FhirDateTime),
    Time(FhirTime),
    Quantity {
        value: Decimal,
        unit: Arc<str>,
    },
    /// A complex element or resource
    Object {
        map: Map<String, JsonValue>,
        type_name: Option<Arc<str>>,
    },
}

/// A single FHIRPath item. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Value(Arc<ValueData>);

impl Value {
    pub fn new(data: ValueData) -> Self {
        Self(Arc::new(data))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueData::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::new(ValueData::Integer(value))
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::new(ValueData::Decimal(value))
    }

    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Self::new(ValueData::String(value.into()))
    }

    pub fn date(value: FhirDate) -> Self {
        Self::new(ValueData::Date(value))
    }

    pub fn date_time(value: FhirDateTime) -> Self {
        Self::new(ValueData::DateTime(value))
    }

    pub fn time(value: FhirTime) -> Self {
        Self::new(ValueData::Time(value))
    }

    pub fn quantity(value: Decimal, unit: impl Into<Arc<str>>) -> Self {
        Self::new(ValueData::Quantity {
            value,
            unit: unit.into(),
        })
    }

    pub fn object(map: Map<String, JsonValue>, type_name: Option<&str>) -> Self {
        let type_name = type_name
            .map(Arc::from)
            .or_else(|| map.get("resourceType").and_then(JsonValue::as_str).map(Arc::from));
        Self::new(ValueData::Object { map, type_name })
    }

    pub fn data(&self) -> &ValueData {
        &self.0
    }

    /// FHIRPath type name used by `is`, `as` and `ofType`
    pub fn type_name(&self) -> &str {
        match self.data() {
            ValueData::Boolean(_) => "Boolean",
            ValueData::Integer(_) => "Integer",
            ValueData::Decimal(_) => "Decimal",
            ValueData::String(_) => "String",
            ValueData::Date(_) => "Date",
            ValueData::DateTime(_) => "DateTime",
            ValueData::Time(_) => "Time",
            ValueData::Quantity { .. } => "Quantity",
            ValueData::Object { type_name, .. } => type_name.as_deref().unwrap_or("Element"),
        }
    }

    /// Whether this value is an instance of `type_name`, accepting FHIR
    /// primitive spellings (`string`, `dateTime`) for the System types.
    pub fn is_type(&self, type_name: &str) -> bool {
        let own = self.type_name();
        if own == type_name {
            return true;
        }
        let mut chars = type_name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => return false,
        };
        match (own, capitalized.as_str()) {
            (own, wanted) if own == wanted => true,
            ("String", "Code" | "Uri" | "Url" | "Canonical" | "Markdown" | "Id") => true,
            ("Integer", "PositiveInt" | "UnsignedInt") => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.data() {
            ValueData::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data() {
            ValueData::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer and Decimal both widen to Decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.data() {
            ValueData::Integer(i) => Some(Decimal::from(*i)),
            ValueData::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// System quantities, and FHIR `Quantity` objects with a numeric value
    pub fn as_quantity(&self) -> Option<(Decimal, String)> {
        match self.data() {
            ValueData::Quantity { value, unit } => Some((*value, unit.to_string())),
            ValueData::Object { map, .. } => {
                let value = map.get("value").and_then(json_decimal)?;
                let unit = map
                    .get("code")
                    .or_else(|| map.get("unit"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or("1");
                Some((value, unit.to_string()))
            }
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, JsonValue>> {
        match self.data() {
            ValueData::Object { map, .. } => Some(map),
            _ => None,
        }
    }

    /// Child elements named `name`, including choice elements `name[x]`.
    pub fn navigate(&self, name: &str) -> Collection {
        let Some(map) = self.as_object() else {
            return Collection::empty();
        };
        if let Some(child) = map.get(name) {
            return Collection::from_json_typed(child, None);
        }
        for (key, child) in map {
            if let Some(suffix) = key.strip_prefix(name) {
                if CHOICE_TYPES.contains(suffix) {
                    return Collection::from_json_typed(child, Some(suffix));
                }
            }
        }
        Collection::empty()
    }

    /// All direct child elements
    pub fn children(&self) -> Collection {
        let Some(map) = self.as_object() else {
            return Collection::empty();
        };
        let mut out = Collection::empty();
        for (key, child) in map {
            if key.starts_with('_') || key == "resourceType" {
                continue;
            }
            let suffix = choice_suffix(key);
            out.extend(Collection::from_json_typed(child, suffix));
        }
        out
    }

    /// Converts back to JSON. Temporal values render in FHIR string form and
    /// System quantities become UCUM `Quantity` objects.
    pub fn to_json(&self) -> JsonValue {
        match self.data() {
            ValueData::Boolean(b) => JsonValue::Bool(*b),
            ValueData::Integer(i) => JsonValue::from(*i),
            ValueData::Decimal(d) => decimal_to_json(*d),
            ValueData::String(s) => JsonValue::String(s.to_string()),
            ValueData::Date(d) => JsonValue::String(d.to_string()),
            ValueData::DateTime(d) => JsonValue::String(d.to_string()),
            ValueData::Time(t) => JsonValue::String(t.to_string()),
            ValueData::Quantity { value, unit } => serde_json::json!({
                "value": decimal_to_json(*value),
                "unit": unit.as_ref(),
                "system": UCUM_SYSTEM,
                "code": unit.as_ref(),
            }),
            ValueData::Object { map, .. } => JsonValue::Object(map.clone()),
        }
    }

    fn from_json_typed(json: &JsonValue, hint: Option<&str>) -> Option<Self> {
        let value = match json {
            JsonValue::Null | JsonValue::Array(_) => return None,
            JsonValue::Bool(b) => Value::boolean(*b),
            JsonValue::Number(n) => match (hint, n.as_i64()) {
                (Some("Decimal"), _) | (_, None) => Value::decimal(json_decimal(json)?),
                (_, Some(i)) => Value::integer(i),
            },
            JsonValue::String(s) => match hint {
                Some("Date") => FhirDate::parse(s)
                    .map(Value::date)
                    .unwrap_or_else(|| Value::string(s.as_str())),
                Some("DateTime" | "Instant") => FhirDateTime::parse(s)
                    .map(Value::date_time)
                    .unwrap_or_else(|| Value::string(s.as_str())),
                Some("Time") => FhirTime::parse(s)
                    .map(Value::time)
                    .unwrap_or_else(|| Value::string(s.as_str())),
                _ => Value::string(s.as_str()),
            },
            JsonValue::Object(map) => Value::object(map.clone(), hint),
        };
        Some(value)
    }
}

fn choice_suffix(key: &str) -> Option<&str> {
    let start = key.find(|c: char| c.is_ascii_uppercase())?;
    let suffix = &key[start..];
    CHOICE_TYPES.contains(suffix).then_some(suffix)
}

fn json_decimal(json: &JsonValue) -> Option<Decimal> {
    let JsonValue::Number(number) = json else {
        return None;
    };
    Decimal::from_str(&number.to_string())
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
}

pub(crate) fn decimal_to_json(value: Decimal) -> JsonValue {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        if let Some(i) = normalized.to_i64() {
            return JsonValue::from(i);
        }
    }
    value
        .to_f64()
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

/// Ordered FHIRPath collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection(SmallVec<[Value; 2]>);

impl Collection {
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    pub fn singleton(value: Value) -> Self {
        let mut items = SmallVec::new();
        items.push(value);
        Self(items)
    }

    /// Flattens arrays and drops nulls. Objects keep their `resourceType`
    /// as type name.
    pub fn from_json(json: &JsonValue) -> Self {
        Self::from_json_typed(json, None)
    }

    pub(crate) fn from_json_typed(json: &JsonValue, hint: Option<&str>) -> Self {
        match json {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|item| Value::from_json_typed(item, hint))
                .collect(),
            other => Value::from_json_typed(other, hint)
                .map(Collection::singleton)
                .unwrap_or_default(),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn first(&self) -> Option<&Value> {
        self.0.first()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// The single item, `None` when empty, an error for more than one.
    pub fn as_singleton(&self) -> Result<Option<&Value>> {
        match self.0.as_slice() {
            [] => Ok(None),
            [item] => Ok(Some(item)),
            items => Err(Error::TypeError(format!(
                "Expected a single item, got a collection of {}",
                items.len()
            ))),
        }
    }

    /// Singleton evaluation of collections as booleans: empty is unknown,
    /// a single non-boolean item is `true`.
    pub fn to_boolean(&self) -> Result<Option<bool>> {
        Ok(self
            .as_singleton()?
            .map(|item| item.as_bool().unwrap_or(true)))
    }

    pub fn as_boolean(&self) -> Result<bool> {
        self.as_singleton()?
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::TypeError("Expected a boolean".into()))
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self.as_singleton()?.map(Value::data) {
            Some(ValueData::Integer(i)) => Ok(*i),
            _ => Err(Error::TypeError("Expected an integer".into())),
        }
    }

    pub fn as_string(&self) -> Result<Arc<str>> {
        match self.as_singleton()?.map(Value::data) {
            Some(ValueData::String(s)) => Ok(s.clone()),
            _ => Err(Error::TypeError("Expected a string".into())),
        }
    }

    pub fn to_json(&self) -> Vec<JsonValue> {
        self.iter().map(Value::to_json).collect()
    }
}

impl Extend<Value> for Collection {
    fn extend<T: IntoIterator<Item = Value>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<Value> for Collection {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Value;
    type IntoIter = smallvec::IntoIter<[Value; 2]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Value> for Collection {
    fn from(value: Value) -> Self {
        Collection::singleton(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_choice_navigation_uses_suffix_type() {
        let answer = Collection::from_json(&json!({"valueDate": "2020-02-03"}));
        let value = answer.first().unwrap().navigate("value");
        assert!(matches!(value.first().unwrap().data(), ValueData::Date(_)));

        let coding = Collection::from_json(&json!({"valueCoding": {"code": "a"}}));
        let value = coding.first().unwrap().navigate("value");
        assert_eq!(value.first().unwrap().type_name(), "Coding");
    }

    #[test]
    fn test_decimal_hint_on_integral_json() {
        let answer = Collection::from_json(&json!({"valueDecimal": 5}));
        let value = answer.first().unwrap().navigate("value");
        assert_eq!(value.first().unwrap().as_decimal(), Some(Decimal::from(5)));
        assert!(matches!(value.first().unwrap().data(), ValueData::Decimal(_)));
    }

    #[test]
    fn test_arrays_flatten_and_null_drops() {
        let items = Collection::from_json(&json!([1, null, [2, 3]]));
        // Nested arrays are not FHIR JSON; only the outer level flattens.
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().unwrap().as_decimal(), Some(Decimal::ONE));
    }

    #[test]
    fn test_singleton_boolean_evaluation() {
        assert_eq!(Collection::empty().to_boolean().unwrap(), None);
        assert_eq!(
            Collection::singleton(Value::string("x")).to_boolean().unwrap(),
            Some(true)
        );
        let two: Collection = vec![Value::boolean(true), Value::boolean(false)]
            .into_iter()
            .collect();
        assert!(two.to_boolean().is_err());
    }

    #[test]
    fn test_decimal_to_json_keeps_integers_integral() {
        assert_eq!(decimal_to_json(Decimal::new(500, 2)), json!(5));
        assert_eq!(decimal_to_json(Decimal::new(55, 1)), json!(5.5));
    }
}
