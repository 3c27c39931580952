//! Utility functions: `trace()`.

use super::single_string;
use crate::error::Result;
use crate::value::Collection;

/// Logs the input (or the projection argument) and returns the input unchanged.
pub fn trace(
    collection: Collection,
    name: &Collection,
    projection: Option<&Collection>,
) -> Result<Collection> {
    let label = single_string(name, "trace")?;
    let shown = projection.unwrap_or(&collection);
    tracing::debug!(
        name = label.as_deref().unwrap_or(""),
        values = ?shown.to_json(),
        "fhirpath trace"
    );
    Ok(collection)
}
