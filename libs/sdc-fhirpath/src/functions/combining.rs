//! Combining functions: `union()` (deduplicating, also the `|` operator)
//! and `combine()` (keeps duplicates).

use super::existence::contains_item;
use crate::error::Result;
use crate::value::Collection;

pub fn union(collection: Collection, other: &Collection) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in collection.into_iter().chain(other.iter().cloned()) {
        if !contains_item(&out, &item) {
            out.push(item);
        }
    }
    Ok(out)
}

pub fn combine(mut collection: Collection, other: &Collection) -> Result<Collection> {
    collection.extend(other.iter().cloned());
    Ok(collection)
}
