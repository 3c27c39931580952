//! Subsetting functions: `single()`, `first()`, `last()`, `tail()`,
//! `skip()`, `take()`, `intersect()`, `exclude()`.

use super::existence::contains_item;
use super::integer_arg;
use crate::error::Result;
use crate::value::Collection;

pub fn single(collection: Collection) -> Result<Collection> {
    Ok(collection
        .as_singleton()?
        .cloned()
        .map(Collection::singleton)
        .unwrap_or_default())
}

pub fn first(collection: Collection) -> Result<Collection> {
    Ok(collection.into_iter().take(1).collect())
}

pub fn last(collection: Collection) -> Result<Collection> {
    Ok(collection.into_iter().last().map(Collection::singleton).unwrap_or_default())
}

pub fn tail(collection: Collection) -> Result<Collection> {
    Ok(collection.into_iter().skip(1).collect())
}

pub fn skip(collection: Collection, count: &Collection) -> Result<Collection> {
    let Some(count) = integer_arg(count, "skip")? else {
        return Ok(Collection::empty());
    };
    Ok(collection
        .into_iter()
        .skip(usize::try_from(count).unwrap_or(0))
        .collect())
}

pub fn take(collection: Collection, count: &Collection) -> Result<Collection> {
    let Some(count) = integer_arg(count, "take")? else {
        return Ok(Collection::empty());
    };
    Ok(collection
        .into_iter()
        .take(usize::try_from(count).unwrap_or(0))
        .collect())
}

pub fn intersect(collection: Collection, other: &Collection) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in collection {
        if contains_item(other, &item) && !contains_item(&out, &item) {
            out.push(item);
        }
    }
    Ok(out)
}

pub fn exclude(collection: Collection, other: &Collection) -> Result<Collection> {
    Ok(collection
        .into_iter()
        .filter(|item| !contains_item(other, item))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ints(values: &[i64]) -> Collection {
        values.iter().map(|v| Value::integer(*v)).collect()
    }

    #[test]
    fn test_skip_take_negative_counts() {
        assert_eq!(skip(ints(&[1, 2, 3]), &ints(&[-1])).unwrap(), ints(&[1, 2, 3]));
        assert!(take(ints(&[1, 2, 3]), &ints(&[-1])).unwrap().is_empty());
        assert_eq!(take(ints(&[1, 2, 3]), &ints(&[2])).unwrap(), ints(&[1, 2]));
    }

    #[test]
    fn test_single_errors_on_many() {
        assert!(single(ints(&[1, 2])).is_err());
        assert_eq!(single(ints(&[4])).unwrap(), ints(&[4]));
    }

    #[test]
    fn test_intersect_and_exclude() {
        assert_eq!(intersect(ints(&[1, 2, 2, 3]), &ints(&[2, 3])).unwrap(), ints(&[2, 3]));
        assert_eq!(exclude(ints(&[1, 2, 3]), &ints(&[2])).unwrap(), ints(&[1, 3]));
    }
}
