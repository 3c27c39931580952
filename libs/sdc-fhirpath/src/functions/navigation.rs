//! Tree navigation: `children()`, `descendants()`, `extension(url)`.

use super::single_string;
use crate::error::Result;
use crate::value::Collection;

pub fn children(collection: Collection) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in &collection {
        out.extend(item.children());
    }
    Ok(out)
}

pub fn descendants(collection: Collection) -> Result<Collection> {
    let mut out = Collection::empty();
    let mut frontier = children(collection)?;
    while !frontier.is_empty() {
        let next = children(frontier.clone())?;
        out.extend(frontier);
        frontier = next;
    }
    Ok(out)
}

/// Extensions on the input whose `url` equals the argument
pub fn extension(collection: Collection, url: &Collection) -> Result<Collection> {
    let Some(url) = single_string(url, "extension")? else {
        return Ok(Collection::empty());
    };
    let mut out = Collection::empty();
    for item in &collection {
        out.extend(item.navigate("extension").into_iter().filter(|ext| {
            ext.as_object()
                .and_then(|map| map.get("url"))
                .and_then(serde_json::Value::as_str)
                == Some(url.as_ref())
        }));
    }
    Ok(out)
}
