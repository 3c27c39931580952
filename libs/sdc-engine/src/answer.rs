//! Comparing answers and turning FHIRPath results into answers

use crate::error::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sdc_fhirpath::{FhirDate, FhirDateTime, FhirTime, Value, ValueData};
use sdc_models::{AnswerValue, ItemType, Quantity};
use std::cmp::Ordering;

fn numeric(value: &AnswerValue) -> Option<Decimal> {
    match value {
        AnswerValue::Integer(i) => Some(Decimal::from(*i)),
        AnswerValue::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// Type-specific equality. Codings match on system and code. Attachments
/// have no defined equality and report [`Error::NotImplemented`].
pub fn equals(left: &AnswerValue, right: &AnswerValue) -> Result<bool> {
    use AnswerValue as A;
    let equal = match (left, right) {
        (A::Attachment(_), _) | (_, A::Attachment(_)) => {
            return Err(Error::NotImplemented("Attachment".into()))
        }
        (A::Boolean(a), A::Boolean(b)) => a == b,
        (A::Coding(a), A::Coding(b)) => a.system == b.system && a.code == b.code,
        (A::Quantity(a), A::Quantity(b)) => {
            a.value == b.value && quantity_unit(a) == quantity_unit(b)
        }
        (A::Reference(a), A::Reference(b)) => a.reference == b.reference,
        (A::String(a), A::String(b)) | (A::Uri(a), A::Uri(b)) => a == b,
        (A::Date(_) | A::DateTime(_) | A::Time(_), _) => compare(left, right) == Some(Ordering::Equal),
        _ => match (numeric(left), numeric(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    };
    Ok(equal)
}

fn quantity_unit(quantity: &Quantity) -> Option<&str> {
    quantity.code.as_deref().or(quantity.unit.as_deref())
}

/// Ordering between comparable answers. Dates of different precision are
/// incomparable when the shared part is equal.
pub fn compare(left: &AnswerValue, right: &AnswerValue) -> Option<Ordering> {
    use AnswerValue as A;
    match (left, right) {
        (A::Date(a), A::Date(b)) => FhirDate::parse(a)?.partial_compare(&FhirDate::parse(b)?),
        (A::Date(a), A::DateTime(b)) => FhirDate::parse(a)?
            .to_date_time()
            .partial_compare(&FhirDateTime::parse(b)?),
        (A::DateTime(a), A::Date(b)) => FhirDateTime::parse(a)?
            .partial_compare(&FhirDate::parse(b)?.to_date_time()),
        (A::DateTime(a), A::DateTime(b)) => {
            FhirDateTime::parse(a)?.partial_compare(&FhirDateTime::parse(b)?)
        }
        (A::Time(a), A::Time(b)) => FhirTime::parse(a)?.partial_compare(&FhirTime::parse(b)?),
        (A::String(a), A::String(b)) => Some(a.cmp(b)),
        (A::Quantity(a), A::Quantity(b)) if quantity_unit(a) == quantity_unit(b) => {
            a.value?.partial_cmp(&b.value?)
        }
        _ => numeric(left)?.partial_cmp(&numeric(right)?),
    }
}

/// Convert one FHIRPath result to an answer for an item of `item_type`.
/// Returns `None` for values the item cannot hold.
pub fn from_fhirpath(value: &Value, item_type: Option<ItemType>) -> Option<AnswerValue> {
    use ItemType as T;
    let answer = match (value.data(), item_type) {
        (ValueData::Boolean(b), _) => AnswerValue::Boolean(*b),
        (ValueData::Integer(i), Some(T::Decimal)) => AnswerValue::Decimal(Decimal::from(*i)),
        (ValueData::Integer(i), _) => AnswerValue::Integer(*i),
        (ValueData::Decimal(d), Some(T::Integer)) if d.fract().is_zero() => {
            AnswerValue::Integer(d.to_i64()?)
        }
        (ValueData::Decimal(d), _) => AnswerValue::Decimal(*d),
        (ValueData::String(s), Some(T::Date)) => AnswerValue::Date(s.to_string()),
        (ValueData::String(s), Some(T::DateTime)) => AnswerValue::DateTime(s.to_string()),
        (ValueData::String(s), Some(T::Time)) => AnswerValue::Time(s.to_string()),
        (ValueData::String(s), Some(T::Url)) => AnswerValue::Uri(s.to_string()),
        (ValueData::String(s), _) => AnswerValue::String(s.to_string()),
        (ValueData::Date(d), _) => AnswerValue::Date(d.to_string()),
        (ValueData::DateTime(d), Some(T::Date)) => AnswerValue::Date(d.date().to_string()),
        (ValueData::DateTime(d), _) => AnswerValue::DateTime(d.to_string()),
        (ValueData::Time(t), _) => AnswerValue::Time(t.to_string()),
        (ValueData::Quantity { value, unit }, _) => AnswerValue::Quantity(Quantity {
            value: Some(*value),
            unit: Some(unit.to_string()),
            system: Some("http://unitsofmeasure.org".into()),
            code: Some(unit.to_string()),
            ..Default::default()
        }),
        (ValueData::Object { map, type_name }, _) => {
            let json = serde_json::Value::Object(map.clone());
            let type_name = type_name.as_deref().or_else(|| guess_object_type(map))?;
            let key = match type_name {
                "Coding" => "valueCoding",
                "Quantity" => "valueQuantity",
                "Reference" => "valueReference",
                "Attachment" => "valueAttachment",
                _ => return None,
            };
            AnswerValue::from_json(serde_json::json!({ key: json })).ok()?
        }
    };
    Some(answer)
}

fn guess_object_type(map: &serde_json::Map<String, serde_json::Value>) -> Option<&'static str> {
    if map.contains_key("code") || map.contains_key("system") {
        if map.contains_key("value") {
            return Some("Quantity");
        }
        return Some("Coding");
    }
    if map.contains_key("reference") {
        return Some("Reference");
    }
    if map.contains_key("contentType") || map.contains_key("data") {
        return Some("Attachment");
    }
    None
}

/// Equality that falls back to structural comparison where
/// [`equals`] has no answer
pub fn same_value(left: &AnswerValue, right: &AnswerValue) -> bool {
    equals(left, right).unwrap_or(left == right)
}

/// Same selection, ignoring order and Coding display
pub fn same_answers(left: &[AnswerValue], right: &[AnswerValue]) -> bool {
    left.len() == right.len() && left.iter().all(|l| right.iter().any(|r| same_value(l, r)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_models::{Attachment, Coding};
    use std::str::FromStr;

    fn decimal(s: &str) -> AnswerValue {
        AnswerValue::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_numbers_compare_across_types() {
        assert!(equals(&AnswerValue::Integer(2), &decimal("2.0")).unwrap());
        assert_eq!(
            compare(&AnswerValue::Integer(3), &decimal("2.5")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_coding_equality_ignores_display() {
        let a = AnswerValue::Coding(Coding::new("s", "c").with_display("One"));
        let b = AnswerValue::Coding(Coding::new("s", "c").with_display("Other"));
        assert!(equals(&a, &b).unwrap());
    }

    #[test]
    fn test_dates() {
        let a = AnswerValue::Date("2024-01-01".into());
        let b = AnswerValue::Date("2024-02-01".into());
        assert_eq!(compare(&a, &b), Some(Ordering::Less));
        assert_eq!(compare(&AnswerValue::Date("2024".into()), &a), None);
    }

    #[test]
    fn test_incomparable_types() {
        assert_eq!(
            compare(&AnswerValue::Boolean(true), &AnswerValue::Integer(1)),
            None
        );
        assert!(!equals(&AnswerValue::Boolean(true), &AnswerValue::Integer(1)).unwrap());
    }

    #[test]
    fn test_attachment_equality_is_not_implemented() {
        let a = AnswerValue::Attachment(Attachment::default());
        assert!(matches!(equals(&a, &a), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_from_fhirpath_follows_item_type() {
        assert_eq!(
            from_fhirpath(&Value::integer(3), Some(ItemType::Decimal)),
            Some(decimal("3"))
        );
        assert_eq!(
            from_fhirpath(&Value::decimal(Decimal::new(40, 1)), Some(ItemType::Integer)),
            Some(AnswerValue::Integer(4))
        );
        assert_eq!(
            from_fhirpath(&Value::string("2024-03-15"), Some(ItemType::Date)),
            Some(AnswerValue::Date("2024-03-15".into()))
        );
        let mut coding = serde_json::Map::new();
        coding.insert("system".into(), "s".into());
        coding.insert("code".into(), "c".into());
        assert_eq!(
            from_fhirpath(&Value::object(coding, None), Some(ItemType::Choice)),
            Some(AnswerValue::Coding(Coding::new("s", "c")))
        );
    }
}
