//! Type conversion functions for FHIRPath.
//!
//! Each `toX()` returns empty when the single input cannot be converted; the
//! matching `convertsToX()` reports whether it could.

use super::boolean;
use crate::error::Result;
use crate::temporal::{FhirDate, FhirDateTime, FhirTime};
use crate::value::{decimal_to_json, Collection, Value, ValueData};
use rust_decimal::Decimal;
use std::str::FromStr;

fn convert(collection: &Collection, f: impl Fn(&Value) -> Option<Value>) -> Result<Collection> {
    Ok(collection
        .as_singleton()?
        .and_then(f)
        .map(Collection::singleton)
        .unwrap_or_default())
}

fn converts(collection: &Collection, f: impl Fn(&Value) -> Option<Value>) -> Result<Collection> {
    Ok(match collection.as_singleton()? {
        Some(value) => boolean(f(value).is_some()),
        None => Collection::empty(),
    })
}

fn boolean_of(value: &Value) -> Option<Value> {
    let result = match value.data() {
        ValueData::Boolean(b) => *b,
        ValueData::Integer(1) => true,
        ValueData::Integer(0) => false,
        ValueData::Decimal(d) if *d == Decimal::ONE => true,
        ValueData::Decimal(d) if d.is_zero() => false,
        ValueData::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(Value::boolean(result))
}

fn integer_of(value: &Value) -> Option<Value> {
    match value.data() {
        ValueData::Integer(_) => Some(value.clone()),
        ValueData::Boolean(b) => Some(Value::integer(i64::from(*b))),
        ValueData::String(s) => s.trim().parse::<i64>().ok().map(Value::integer),
        _ => None,
    }
}

fn decimal_of(value: &Value) -> Option<Value> {
    match value.data() {
        ValueData::Decimal(_) => Some(value.clone()),
        ValueData::Integer(i) => Some(Value::decimal(Decimal::from(*i))),
        ValueData::Boolean(b) => Some(Value::decimal(if *b { Decimal::ONE } else { Decimal::ZERO })),
        ValueData::String(s) => Decimal::from_str(s.trim()).ok().map(Value::decimal),
        _ => None,
    }
}

pub(crate) fn string_of(value: &Value) -> Option<String> {
    match value.data() {
        ValueData::String(s) => Some(s.to_string()),
        ValueData::Boolean(b) => Some(b.to_string()),
        ValueData::Integer(i) => Some(i.to_string()),
        ValueData::Decimal(d) => Some(d.to_string()),
        ValueData::Date(d) => Some(d.to_string()),
        ValueData::DateTime(d) => Some(d.to_string()),
        ValueData::Time(t) => Some(t.to_string()),
        ValueData::Quantity { value, unit } => Some(format!("{} '{}'", value, unit)),
        ValueData::Object { .. } => value
            .as_quantity()
            .map(|(v, unit)| format!("{} '{}'", decimal_to_json(v), unit)),
    }
}

pub fn to_boolean(collection: Collection) -> Result<Collection> {
    convert(&collection, boolean_of)
}

pub fn converts_to_boolean(collection: Collection) -> Result<Collection> {
    converts(&collection, boolean_of)
}

pub fn to_integer(collection: Collection) -> Result<Collection> {
    convert(&collection, integer_of)
}

pub fn converts_to_integer(collection: Collection) -> Result<Collection> {
    converts(&collection, integer_of)
}

pub fn to_decimal(collection: Collection) -> Result<Collection> {
    convert(&collection, decimal_of)
}

pub fn converts_to_decimal(collection: Collection) -> Result<Collection> {
    converts(&collection, decimal_of)
}

pub fn to_string(collection: Collection) -> Result<Collection> {
    convert(&collection, |v| string_of(v).map(Value::string))
}

pub fn converts_to_string(collection: Collection) -> Result<Collection> {
    converts(&collection, |v| string_of(v).map(Value::string))
}

pub fn to_date(collection: Collection) -> Result<Collection> {
    convert(&collection, |value| match value.data() {
        ValueData::Date(_) => Some(value.clone()),
        ValueData::DateTime(dt) => Some(Value::date(dt.date())),
        ValueData::String(s) => FhirDate::parse(s)
            .or_else(|| FhirDateTime::parse(s).map(|dt| dt.date()))
            .map(Value::date),
        _ => None,
    })
}

pub fn to_date_time(collection: Collection) -> Result<Collection> {
    convert(&collection, |value| match value.data() {
        ValueData::DateTime(_) => Some(value.clone()),
        ValueData::Date(d) => Some(Value::date_time(d.to_date_time())),
        ValueData::String(s) => FhirDateTime::parse(s).map(Value::date_time),
        _ => None,
    })
}

pub fn to_time(collection: Collection) -> Result<Collection> {
    convert(&collection, |value| match value.data() {
        ValueData::Time(_) => Some(value.clone()),
        ValueData::String(s) => FhirTime::parse(s).map(Value::time),
        _ => None,
    })
}

/// `toQuantity([unit])`. Only identity unit conversion is supported.
pub fn to_quantity(collection: Collection, unit: Option<&Collection>) -> Result<Collection> {
    let wanted = match unit {
        Some(unit) => super::single_string(unit, "toQuantity")?,
        None => None,
    };
    convert(&collection, |value| {
        let (amount, own_unit) = match value.data() {
            ValueData::Integer(_) | ValueData::Decimal(_) => (value.as_decimal()?, "1".to_string()),
            ValueData::String(s) => parse_quantity(s)?,
            _ => value.as_quantity()?,
        };
        match &wanted {
            Some(w) if w.as_ref() != own_unit => None,
            _ => Some(Value::quantity(amount, own_unit)),
        }
    })
}

fn parse_quantity(text: &str) -> Option<(Decimal, String)> {
    let text = text.trim();
    let (number, unit) = match text.split_once(' ') {
        Some((number, unit)) => (number, unit.trim().trim_matches('\'').to_string()),
        None => (text, "1".to_string()),
    };
    Some((Decimal::from_str(number).ok()?, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(value: Value) -> Collection {
        Collection::singleton(value)
    }

    #[test]
    fn test_to_integer_from_string() {
        assert_eq!(
            to_integer(one(Value::string("42"))).unwrap(),
            one(Value::integer(42))
        );
        assert!(to_integer(one(Value::string("4.2"))).unwrap().is_empty());
        assert!(!converts_to_integer(one(Value::string("x")))
            .unwrap()
            .as_boolean()
            .unwrap());
    }

    #[test]
    fn test_to_string_of_date() {
        let date = FhirDate::parse("2021-03").unwrap();
        assert_eq!(
            to_string(one(Value::date(date))).unwrap(),
            one(Value::string("2021-03"))
        );
    }

    #[test]
    fn test_to_quantity_from_string() {
        let result = to_quantity(one(Value::string("5 'kg'")), None).unwrap();
        assert_eq!(result, one(Value::quantity(Decimal::from(5), "kg")));
    }
}
