//! Existence and collection query functions for FHIRPath.
//!
//! `empty()`, `exists()`, `allTrue()`, `count()`, `distinct()` and friends.
//! `all(criteria)` and `exists(criteria)` are evaluated per item by the
//! evaluator and only reach this module without arguments.

use super::boolean;
use crate::error::{Error, Result};
use crate::operations::item_equals;
use crate::value::{Collection, Value};

pub fn empty(collection: Collection) -> Result<Collection> {
    Ok(boolean(collection.is_empty()))
}

pub fn exists(collection: Collection) -> Result<Collection> {
    Ok(boolean(!collection.is_empty()))
}

fn booleans(collection: &Collection, function: &str) -> Result<Vec<bool>> {
    collection
        .iter()
        .map(|item| {
            item.as_bool().ok_or_else(|| {
                Error::TypeError(format!("{}() requires a collection of booleans", function))
            })
        })
        .collect()
}

pub fn all_true(collection: Collection) -> Result<Collection> {
    Ok(boolean(booleans(&collection, "allTrue")?.into_iter().all(|b| b)))
}

pub fn any_true(collection: Collection) -> Result<Collection> {
    Ok(boolean(booleans(&collection, "anyTrue")?.into_iter().any(|b| b)))
}

pub fn all_false(collection: Collection) -> Result<Collection> {
    Ok(boolean(booleans(&collection, "allFalse")?.into_iter().all(|b| !b)))
}

pub fn any_false(collection: Collection) -> Result<Collection> {
    Ok(boolean(booleans(&collection, "anyFalse")?.into_iter().any(|b| !b)))
}

pub(crate) fn contains_item(collection: &Collection, item: &Value) -> bool {
    collection
        .iter()
        .any(|other| item_equals(item, other).unwrap_or(false))
}

pub fn subset_of(collection: Collection, other: &Collection) -> Result<Collection> {
    Ok(boolean(
        collection.iter().all(|item| contains_item(other, item)),
    ))
}

pub fn superset_of(collection: Collection, other: &Collection) -> Result<Collection> {
    Ok(boolean(
        other.iter().all(|item| contains_item(&collection, item)),
    ))
}

pub fn count(collection: Collection) -> Result<Collection> {
    Ok(Collection::singleton(Value::integer(collection.len() as i64)))
}

pub fn distinct(collection: Collection) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in collection {
        if !contains_item(&out, &item) {
            out.push(item);
        }
    }
    Ok(out)
}

pub fn is_distinct(collection: Collection) -> Result<Collection> {
    let len = collection.len();
    Ok(boolean(distinct(collection)?.len() == len))
}

/// True for a single primitive value
pub fn has_value(collection: Collection) -> Result<Collection> {
    let single_primitive = matches!(
        collection.as_slice(),
        [item] if item.as_object().is_none()
    );
    Ok(boolean(single_primitive))
}

pub fn not(collection: Collection) -> Result<Collection> {
    Ok(match collection.to_boolean()? {
        Some(value) => boolean(!value),
        None => Collection::empty(),
    })
}
