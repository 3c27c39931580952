//! Math functions for FHIRPath.

use super::integer_arg;
use crate::error::{Error, Result};
use crate::value::{Collection, Value, ValueData};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};

fn numeric(
    collection: &Collection,
    function: &str,
    on_integer: impl Fn(i64) -> Option<Value>,
    on_decimal: impl Fn(Decimal) -> Option<Value>,
) -> Result<Collection> {
    let Some(value) = collection.as_singleton()? else {
        return Ok(Collection::empty());
    };
    let result = match value.data() {
        ValueData::Integer(i) => on_integer(*i),
        ValueData::Decimal(d) => on_decimal(*d),
        ValueData::Quantity { value: v, unit } if function == "abs" => {
            Some(Value::quantity(v.abs(), unit.clone()))
        }
        _ => {
            return Err(Error::TypeError(format!(
                "{}() expects a number, got {}",
                function,
                value.type_name()
            )))
        }
    };
    Ok(result.map(Collection::singleton).unwrap_or_default())
}

fn to_integer(value: Decimal) -> Option<Value> {
    value.to_i64().map(Value::integer)
}

pub fn abs(collection: Collection) -> Result<Collection> {
    numeric(
        &collection,
        "abs",
        |i| i.checked_abs().map(Value::integer),
        |d| Some(Value::decimal(d.abs())),
    )
}

pub fn ceiling(collection: Collection) -> Result<Collection> {
    numeric(&collection, "ceiling", |i| Some(Value::integer(i)), |d| to_integer(d.ceil()))
}

pub fn floor(collection: Collection) -> Result<Collection> {
    numeric(&collection, "floor", |i| Some(Value::integer(i)), |d| to_integer(d.floor()))
}

pub fn truncate(collection: Collection) -> Result<Collection> {
    numeric(&collection, "truncate", |i| Some(Value::integer(i)), |d| to_integer(d.trunc()))
}

pub fn round(collection: Collection, precision: Option<&Collection>) -> Result<Collection> {
    let precision = match precision {
        Some(arg) => integer_arg(arg, "round")?.unwrap_or(0),
        None => 0,
    };
    let places = u32::try_from(precision)
        .map_err(|_| Error::EvaluationError("round() precision must be >= 0".into()))?;
    numeric(
        &collection,
        "round",
        |i| Some(Value::decimal(Decimal::from(i))),
        |d| {
            Some(Value::decimal(d.round_dp_with_strategy(
                places,
                rust_decimal::RoundingStrategy::MidpointAwayFromZero,
            )))
        },
    )
}

pub fn sqrt(collection: Collection) -> Result<Collection> {
    numeric(
        &collection,
        "sqrt",
        |i| Decimal::from(i).sqrt().map(Value::decimal),
        |d| d.sqrt().map(Value::decimal),
    )
}

pub fn power(collection: Collection, exponent: &Collection) -> Result<Collection> {
    let Some(exponent) = exponent.as_singleton()?.and_then(Value::as_decimal) else {
        return Ok(Collection::empty());
    };
    let integral_exponent = exponent.fract().is_zero().then(|| exponent.to_i64()).flatten();
    numeric(
        &collection,
        "power",
        |base| match integral_exponent.and_then(|e| u32::try_from(e).ok()) {
            Some(e) => base.checked_pow(e).map(Value::integer),
            None => decimal_power(Decimal::from(base), exponent),
        },
        |base| decimal_power(base, exponent),
    )
}

fn decimal_power(base: Decimal, exponent: Decimal) -> Option<Value> {
    let result = base.to_f64()?.powf(exponent.to_f64()?);
    if result.is_finite() {
        Decimal::from_f64(result).map(Value::decimal)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(mantissa: i64, scale: u32) -> Collection {
        Collection::singleton(Value::decimal(Decimal::new(mantissa, scale)))
    }

    #[test]
    fn test_round_half_away_from_zero() {
        let result = round(dec(25, 1), None).unwrap();
        assert_eq!(result.first().unwrap().as_decimal(), Some(Decimal::from(3)));
        let result = round(dec(31415, 4), Some(&Collection::singleton(Value::integer(2)))).unwrap();
        assert_eq!(result.first().unwrap().as_decimal(), Some(Decimal::new(314, 2)));
    }

    #[test]
    fn test_floor_and_ceiling_return_integers() {
        assert_eq!(floor(dec(-15, 1)).unwrap(), Collection::singleton(Value::integer(-2)));
        assert_eq!(ceiling(dec(11, 1)).unwrap(), Collection::singleton(Value::integer(2)));
    }

    #[test]
    fn test_integer_power() {
        let result = power(
            Collection::singleton(Value::integer(2)),
            &Collection::singleton(Value::integer(10)),
        )
        .unwrap();
        assert_eq!(result, Collection::singleton(Value::integer(1024)));
    }
}
