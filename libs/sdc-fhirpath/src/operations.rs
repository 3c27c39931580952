//! Equality, ordering and arithmetic on FHIRPath values.
//!
//! Comparisons return `Option` where FHIRPath defines an "unknown" outcome
//! (for example dates of different precision), which the evaluator turns
//! into an empty collection.

use crate::error::{Error, Result};
use crate::temporal::{CalendarUnit, FhirDate, FhirDateTime, FhirTime};
use crate::value::{Collection, Value, ValueData};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// `=` on two items
pub fn item_equals(left: &Value, right: &Value) -> Option<bool> {
    use ValueData as V;
    match (left.data(), right.data()) {
        (V::Boolean(a), V::Boolean(b)) => Some(a == b),
        (V::String(a), V::String(b)) => Some(a == b),
        (V::Integer(_) | V::Decimal(_), V::Integer(_) | V::Decimal(_)) => {
            Some(left.as_decimal() == right.as_decimal())
        }
        (V::Date(_) | V::DateTime(_) | V::Time(_), _) | (_, V::Date(_) | V::DateTime(_) | V::Time(_)) => {
            if !temporal_compatible(left, right) {
                return Some(false);
            }
            compare_temporal(left, right).map(|ordering| ordering == Ordering::Equal)
        }
        (V::Object { map: a, .. }, V::Object { map: b, .. }) => Some(a == b),
        _ => match (left.as_quantity(), right.as_quantity()) {
            (Some(a), Some(b)) => Some(quantities_equal(&a, &b)),
            _ => Some(false),
        },
    }
}

/// `~` on two items
pub fn item_equivalent(left: &Value, right: &Value) -> bool {
    use ValueData as V;
    match (left.data(), right.data()) {
        (V::String(a), V::String(b)) => normalize_whitespace(a) == normalize_whitespace(b),
        (V::Integer(_) | V::Decimal(_), V::Integer(_) | V::Decimal(_)) => {
            match (left.as_decimal(), right.as_decimal()) {
                (Some(a), Some(b)) => {
                    let scale = a.scale().min(b.scale());
                    a.round_dp(scale) == b.round_dp(scale)
                }
                _ => false,
            }
        }
        (V::Object { map: a, .. }, V::Object { map: b, .. }) => {
            // Codings are equivalent on system and code alone.
            let key = |m: &serde_json::Map<String, serde_json::Value>| {
                (m.get("system").cloned(), m.get("code").cloned())
            };
            if a.contains_key("code") && b.contains_key("code") {
                key(a) == key(b)
            } else {
                a == b
            }
        }
        _ => item_equals(left, right).unwrap_or(false),
    }
}

fn normalize_whitespace(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn quantities_equal(a: &(Decimal, String), b: &(Decimal, String)) -> bool {
    let same_unit = a.1 == b.1
        || matches!(
            (CalendarUnit::from_unit(&a.1), CalendarUnit::from_unit(&b.1)),
            (Some(x), Some(y)) if x == y
        );
    same_unit && a.0 == b.0
}

/// Collection `=`: empty operand gives empty, otherwise ordered pairwise.
pub fn equals(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut result = true;
    for (a, b) in left.iter().zip(right.iter()) {
        match item_equals(a, b) {
            Some(true) => {}
            Some(false) => return Some(false),
            None => result = false,
        }
    }
    // An unknown pair with no definite mismatch leaves the whole answer unknown.
    if result {
        Some(true)
    } else {
        None
    }
}

/// Collection `~`: order-independent, empty collections are equivalent.
pub fn equivalent(left: &Collection, right: &Collection) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut unmatched: Vec<&Value> = right.iter().collect();
    for a in left.iter() {
        match unmatched.iter().position(|b| item_equivalent(a, b)) {
            Some(pos) => {
                unmatched.swap_remove(pos);
            }
            None => return false,
        }
    }
    true
}

/// Ordering for `<`, `<=`, `>`, `>=`. `Ok(None)` means unknown.
pub fn compare(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    use ValueData as V;
    match (left.data(), right.data()) {
        (V::Integer(_) | V::Decimal(_), V::Integer(_) | V::Decimal(_)) => {
            Ok(left.as_decimal().partial_cmp(&right.as_decimal()))
        }
        (V::String(a), V::String(b)) => Ok(Some(a.cmp(b))),
        (V::Date(_) | V::DateTime(_) | V::Time(_), _) | (_, V::Date(_) | V::DateTime(_) | V::Time(_)) => {
            match compare_temporal(left, right) {
                Some(ordering) => Ok(Some(ordering)),
                None if temporal_compatible(left, right) => Ok(None),
                None => Err(incomparable(left, right)),
            }
        }
        _ => match (left.as_quantity(), right.as_quantity()) {
            (Some((a, ua)), Some((b, ub))) if ua == ub => Ok(a.partial_cmp(&b)),
            (Some(_), Some(_)) => Ok(None),
            _ => Err(incomparable(left, right)),
        },
    }
}

fn incomparable(left: &Value, right: &Value) -> Error {
    Error::TypeError(format!(
        "Cannot compare {} with {}",
        left.type_name(),
        right.type_name()
    ))
}

fn temporal_compatible(left: &Value, right: &Value) -> bool {
    as_temporal(left, right).is_some()
}

enum Temporal {
    Date(FhirDate, FhirDate),
    DateTime(FhirDateTime, FhirDateTime),
    Time(FhirTime, FhirTime),
}

/// Lines both operands up as the same temporal type, converting strings and
/// widening dates to dateTimes where needed.
fn as_temporal(left: &Value, right: &Value) -> Option<Temporal> {
    use ValueData as V;
    match (left.data(), right.data()) {
        (V::Date(a), V::Date(b)) => Some(Temporal::Date(*a, *b)),
        (V::DateTime(a), V::DateTime(b)) => Some(Temporal::DateTime(*a, *b)),
        (V::Time(a), V::Time(b)) => Some(Temporal::Time(*a, *b)),
        (V::Date(a), V::DateTime(b)) => Some(Temporal::DateTime(a.to_date_time(), *b)),
        (V::DateTime(a), V::Date(b)) => Some(Temporal::DateTime(*a, b.to_date_time())),
        (V::String(s), _) => {
            let converted = convert_like(s, right)?;
            as_temporal(&converted, right)
        }
        (_, V::String(s)) => {
            let converted = convert_like(s, left)?;
            as_temporal(left, &converted)
        }
        _ => None,
    }
}

fn convert_like(text: &str, like: &Value) -> Option<Value> {
    match like.data() {
        ValueData::Date(_) if !text.contains('T') => FhirDate::parse(text).map(Value::date),
        ValueData::Date(_) | ValueData::DateTime(_) => {
            FhirDateTime::parse(text).map(Value::date_time)
        }
        ValueData::Time(_) => FhirTime::parse(text).map(Value::time),
        _ => None,
    }
}

fn compare_temporal(left: &Value, right: &Value) -> Option<Ordering> {
    match as_temporal(left, right)? {
        Temporal::Date(a, b) => a.partial_compare(&b),
        Temporal::DateTime(a, b) => a.partial_compare(&b),
        Temporal::Time(a, b) => a.partial_compare(&b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Div,
    Mod,
}

/// Binary arithmetic on singletons. `Ok(None)` is an empty result (division
/// by zero, overflow).
pub fn arithmetic(op: ArithmeticOperator, left: &Value, right: &Value) -> Result<Option<Value>> {
    use ArithmeticOperator::*;
    use ValueData as V;
    match (left.data(), right.data()) {
        (V::Integer(a), V::Integer(b)) => Ok(integer_arithmetic(op, *a, *b)),
        (V::Integer(_) | V::Decimal(_), V::Integer(_) | V::Decimal(_)) => {
            let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
                return Ok(None);
            };
            Ok(decimal_arithmetic(op, a, b))
        }
        (V::String(a), V::String(b)) if op == Add => Ok(Some(Value::string(format!("{a}{b}")))),
        (V::Date(_) | V::DateTime(_) | V::Time(_), _) if matches!(op, Add | Subtract) => {
            let Some((amount, unit)) = right.as_quantity() else {
                return Err(type_mismatch(op, left, right));
            };
            let unit = CalendarUnit::from_unit(&unit).ok_or_else(|| {
                Error::InvalidOperation(format!("'{unit}' is not a calendar duration unit"))
            })?;
            let amount = if op == Subtract { -amount } else { amount };
            Ok(shift_temporal(left, amount, unit))
        }
        _ => quantity_arithmetic(op, left, right),
    }
}

fn integer_arithmetic(op: ArithmeticOperator, a: i64, b: i64) -> Option<Value> {
    use ArithmeticOperator::*;
    match op {
        Add => a.checked_add(b).map(Value::integer),
        Subtract => a.checked_sub(b).map(Value::integer),
        Multiply => a.checked_mul(b).map(Value::integer),
        Divide => decimal_arithmetic(Divide, Decimal::from(a), Decimal::from(b)),
        Div => a.checked_div(b).map(Value::integer),
        Mod => a.checked_rem(b).map(Value::integer),
    }
}

fn decimal_arithmetic(op: ArithmeticOperator, a: Decimal, b: Decimal) -> Option<Value> {
    use ArithmeticOperator::*;
    match op {
        Add => a.checked_add(b).map(Value::decimal),
        Subtract => a.checked_sub(b).map(Value::decimal),
        Multiply => a.checked_mul(b).map(Value::decimal),
        Divide => a.checked_div(b).map(|d| Value::decimal(d.normalize())),
        Div => a
            .checked_div(b)
            .and_then(|d| d.trunc().to_i64())
            .map(Value::integer),
        Mod => a.checked_rem(b).map(Value::decimal),
    }
}

fn quantity_arithmetic(op: ArithmeticOperator, left: &Value, right: &Value) -> Result<Option<Value>> {
    use ArithmeticOperator::*;
    match (left.as_quantity(), right.as_quantity(), right.as_decimal()) {
        (Some((a, ua)), Some((b, ub)), _) if matches!(op, Add | Subtract) => {
            if ua != ub {
                return Ok(None);
            }
            let value = if op == Add { a.checked_add(b) } else { a.checked_sub(b) };
            Ok(value.map(|v| Value::quantity(v, ua)))
        }
        (Some((a, unit)), None, Some(factor)) if matches!(op, Multiply | Divide) => {
            let value = if op == Multiply {
                a.checked_mul(factor)
            } else {
                a.checked_div(factor)
            };
            Ok(value.map(|v| Value::quantity(v, unit)))
        }
        _ => Err(type_mismatch(op, left, right)),
    }
}

fn shift_temporal(value: &Value, amount: Decimal, unit: CalendarUnit) -> Option<Value> {
    match value.data() {
        ValueData::Date(d) => d.add(amount, unit).map(Value::date),
        ValueData::DateTime(d) => d.add(amount, unit).map(Value::date_time),
        ValueData::Time(t) => {
            let shifted = FhirDateTime {
                value: chrono::NaiveDate::from_ymd_opt(2000, 1, 1)?.and_time(t.time),
                offset: None,
                precision: crate::temporal::DateTimePrecision::Millisecond,
            }
            .add(amount, unit)?;
            Some(Value::time(FhirTime {
                time: shifted.value.time(),
                precision: t.precision,
            }))
        }
        _ => None,
    }
}

fn type_mismatch(op: ArithmeticOperator, left: &Value, right: &Value) -> Error {
    Error::TypeError(format!(
        "Cannot apply {:?} to {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}
