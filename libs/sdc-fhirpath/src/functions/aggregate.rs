//! Aggregate functions: `sum()`, `min()`, `max()`, `avg()`.
//!
//! Sums of integers stay integers; any decimal operand widens the result.

use crate::error::{Error, Result};
use crate::operations::{arithmetic, compare, ArithmeticOperator};
use crate::value::{Collection, Value};
use rust_decimal::Decimal;
use std::cmp::Ordering;

pub fn sum(collection: Collection) -> Result<Collection> {
    let mut items = collection.into_iter();
    let Some(mut total) = items.next() else {
        return Ok(Collection::empty());
    };
    for item in items {
        match arithmetic(ArithmeticOperator::Add, &total, &item)? {
            Some(next) => total = next,
            None => return Ok(Collection::empty()),
        }
    }
    Ok(Collection::singleton(total))
}

fn extreme(collection: Collection, keep: Ordering) -> Result<Collection> {
    let mut items = collection.into_iter();
    let Some(mut best) = items.next() else {
        return Ok(Collection::empty());
    };
    for item in items {
        match compare(&item, &best)? {
            Some(ordering) if ordering == keep => best = item,
            Some(_) => {}
            None => return Ok(Collection::empty()),
        }
    }
    Ok(Collection::singleton(best))
}

pub fn min(collection: Collection) -> Result<Collection> {
    extreme(collection, Ordering::Less)
}

pub fn max(collection: Collection) -> Result<Collection> {
    extreme(collection, Ordering::Greater)
}

pub fn avg(collection: Collection) -> Result<Collection> {
    if collection.is_empty() {
        return Ok(Collection::empty());
    }
    let count = collection.len();
    let mut total = Decimal::ZERO;
    for item in &collection {
        let value = item.as_decimal().ok_or_else(|| {
            Error::TypeError(format!("avg() expects numbers, got {}", item.type_name()))
        })?;
        let Some(next) = total.checked_add(value) else {
            return Ok(Collection::empty());
        };
        total = next;
    }
    Ok(total
        .checked_div(Decimal::from(count))
        .map(|mean| Collection::singleton(Value::decimal(mean.normalize())))
        .unwrap_or_else(Collection::empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Collection {
        values.iter().map(|v| Value::integer(*v)).collect()
    }

    #[test]
    fn test_sum_of_integers() {
        assert_eq!(sum(ints(&[1, 2, 3])).unwrap(), ints(&[6]));
        assert!(sum(Collection::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min(ints(&[3, 1, 2])).unwrap(), ints(&[1]));
        assert_eq!(max(ints(&[3, 1, 2])).unwrap(), ints(&[3]));
    }

    #[test]
    fn test_avg() {
        let result = avg(ints(&[1, 2])).unwrap();
        assert_eq!(result.first().unwrap().as_decimal(), Some(Decimal::new(15, 1)));
    }

    #[test]
    fn test_avg_overflow_is_empty() {
        let values: Collection = vec![Value::decimal(Decimal::MAX), Value::decimal(Decimal::MAX)]
            .into_iter()
            .collect();
        assert!(avg(values).unwrap().is_empty());
    }
}
