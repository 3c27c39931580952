//! String manipulation functions for FHIRPath.
//!
//! Inputs must be a single string; an empty input or an empty argument
//! yields an empty result. Indexes are in characters, not bytes.

use super::{boolean, integer_arg, single_string};
use super::conversion::string_of;
use crate::error::{Error, Result};
use crate::value::{Collection, Value};
use regex::Regex;

fn string_result(value: impl Into<std::sync::Arc<str>>) -> Collection {
    Collection::singleton(Value::string(value))
}

pub fn index_of(collection: Collection, substring: &Collection) -> Result<Collection> {
    let (Some(text), Some(needle)) = (
        single_string(&collection, "indexOf")?,
        single_string(substring, "indexOf")?,
    ) else {
        return Ok(Collection::empty());
    };
    let index = match text.find(needle.as_ref()) {
        Some(byte_index) => text[..byte_index].chars().count() as i64,
        None => -1,
    };
    Ok(Collection::singleton(Value::integer(index)))
}

pub fn substring(
    collection: Collection,
    start: &Collection,
    length: Option<&Collection>,
) -> Result<Collection> {
    let (Some(text), Some(start)) = (
        single_string(&collection, "substring")?,
        integer_arg(start, "substring")?,
    ) else {
        return Ok(Collection::empty());
    };
    let chars: Vec<char> = text.chars().collect();
    if start < 0 || start as usize >= chars.len() {
        return Ok(Collection::empty());
    }
    let start = start as usize;
    let end = match length {
        Some(length) => match integer_arg(length, "substring")? {
            Some(length) if length <= 0 => start,
            Some(length) => (start + length as usize).min(chars.len()),
            None => chars.len(),
        },
        None => chars.len(),
    };
    Ok(string_result(chars[start..end].iter().collect::<String>()))
}

fn predicate(
    collection: &Collection,
    arg: &Collection,
    function: &str,
    test: impl Fn(&str, &str) -> bool,
) -> Result<Collection> {
    match (
        single_string(collection, function)?,
        single_string(arg, function)?,
    ) {
        (Some(text), Some(arg)) => Ok(boolean(test(&text, &arg))),
        _ => Ok(Collection::empty()),
    }
}

pub fn starts_with(collection: Collection, prefix: &Collection) -> Result<Collection> {
    predicate(&collection, prefix, "startsWith", |t, p| t.starts_with(p))
}

pub fn ends_with(collection: Collection, suffix: &Collection) -> Result<Collection> {
    predicate(&collection, suffix, "endsWith", |t, s| t.ends_with(s))
}

pub fn contains(collection: Collection, substring: &Collection) -> Result<Collection> {
    predicate(&collection, substring, "contains", |t, s| t.contains(s))
}

fn map_string(
    collection: &Collection,
    function: &str,
    f: impl Fn(&str) -> String,
) -> Result<Collection> {
    Ok(single_string(collection, function)?
        .map(|text| string_result(f(&text)))
        .unwrap_or_default())
}

pub fn upper(collection: Collection) -> Result<Collection> {
    map_string(&collection, "upper", str::to_uppercase)
}

pub fn lower(collection: Collection) -> Result<Collection> {
    map_string(&collection, "lower", str::to_lowercase)
}

pub fn trim(collection: Collection) -> Result<Collection> {
    map_string(&collection, "trim", |t| t.trim().to_string())
}

pub fn replace(collection: Collection, pattern: &Collection, substitution: &Collection) -> Result<Collection> {
    match (
        single_string(&collection, "replace")?,
        single_string(pattern, "replace")?,
        single_string(substitution, "replace")?,
    ) {
        (Some(text), Some(pattern), Some(substitution)) => {
            Ok(string_result(text.replace(pattern.as_ref(), &substitution)))
        }
        _ => Ok(Collection::empty()),
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    // FHIRPath regexes match with single-line semantics.
    Regex::new(&format!("(?s){}", pattern))
        .map_err(|e| Error::EvaluationError(format!("Invalid regular expression '{}': {}", pattern, e)))
}

pub fn matches(collection: Collection, pattern: &Collection) -> Result<Collection> {
    match (
        single_string(&collection, "matches")?,
        single_string(pattern, "matches")?,
    ) {
        (Some(text), Some(pattern)) => Ok(boolean(compile(&pattern)?.is_match(&text))),
        _ => Ok(Collection::empty()),
    }
}

pub fn replace_matches(
    collection: Collection,
    pattern: &Collection,
    substitution: &Collection,
) -> Result<Collection> {
    match (
        single_string(&collection, "replaceMatches")?,
        single_string(pattern, "replaceMatches")?,
        single_string(substitution, "replaceMatches")?,
    ) {
        (Some(text), Some(pattern), Some(substitution)) => Ok(string_result(
            compile(&pattern)?
                .replace_all(&text, substitution.as_ref())
                .into_owned(),
        )),
        _ => Ok(Collection::empty()),
    }
}

pub fn length(collection: Collection) -> Result<Collection> {
    Ok(single_string(&collection, "length")?
        .map(|text| Collection::singleton(Value::integer(text.chars().count() as i64)))
        .unwrap_or_default())
}

pub fn to_chars(collection: Collection) -> Result<Collection> {
    Ok(single_string(&collection, "toChars")?
        .map(|text| {
            text.chars()
                .map(|c| Value::string(c.to_string()))
                .collect()
        })
        .unwrap_or_default())
}

pub fn split(collection: Collection, separator: &Collection) -> Result<Collection> {
    match (
        single_string(&collection, "split")?,
        single_string(separator, "split")?,
    ) {
        (Some(text), Some(separator)) => Ok(text
            .split(separator.as_ref())
            .map(Value::string)
            .collect()),
        _ => Ok(Collection::empty()),
    }
}

/// Joins the string form of every item
pub fn join(collection: Collection, separator: Option<&Collection>) -> Result<Collection> {
    let separator = match separator {
        Some(separator) => single_string(separator, "join")?,
        None => None,
    };
    let parts: Vec<String> = collection.iter().filter_map(string_of).collect();
    Ok(string_result(parts.join(separator.as_deref().unwrap_or(""))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Collection {
        Collection::singleton(Value::string(text))
    }

    fn i(value: i64) -> Collection {
        Collection::singleton(Value::integer(value))
    }

    #[test]
    fn test_substring_counts_characters() {
        assert_eq!(substring(s("héllo"), &i(1), Some(&i(3))).unwrap(), s("éll"));
        assert!(substring(s("abc"), &i(5), None).unwrap().is_empty());
    }

    #[test]
    fn test_matches_is_unanchored() {
        assert!(matches(s("abc123"), &s("[0-9]+")).unwrap().as_boolean().unwrap());
        assert!(matches(s("x"), &s("(")).is_err());
    }

    #[test]
    fn test_join_and_split() {
        let parts = split(s("a,b"), &s(",")).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(join(parts, Some(&s(" / "))).unwrap(), s("a / b"));
    }

    #[test]
    fn test_non_string_input_is_error() {
        assert!(upper(i(1)).is_err());
        assert!(upper(Collection::empty()).unwrap().is_empty());
    }
}
