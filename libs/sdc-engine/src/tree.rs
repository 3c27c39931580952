//! Walking the definition and response trees side by side

use crate::expression::ScopeEntry;
use crate::path::ItemPath;
use sdc_models::{QuestionnaireItem, QuestionnaireResponseItem};

/// What the visitor wants done with the children of the visited item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Descend,
    Skip,
}

/// Visit every response item that has a definition, depth first in
/// definition order. `scope` ends with the visited item.
pub fn walk<'a, F>(
    definitions: &'a [QuestionnaireItem],
    responses: &'a [QuestionnaireResponseItem],
    visit: &mut F,
) where
    F: FnMut(&ItemPath, &[ScopeEntry<'a>]) -> Walk,
{
    let mut scope = Vec::new();
    walk_level(definitions, responses, None, &mut scope, visit);
}

fn walk_level<'a, F>(
    definitions: &'a [QuestionnaireItem],
    responses: &'a [QuestionnaireResponseItem],
    parent: Option<(&ItemPath, Option<usize>)>,
    scope: &mut Vec<ScopeEntry<'a>>,
    visit: &mut F,
) where
    F: FnMut(&ItemPath, &[ScopeEntry<'a>]) -> Walk,
{
    for item in definitions {
        let Some(response) = responses.iter().find(|r| r.link_id == item.link_id) else {
            continue;
        };
        let path = match parent {
            None => ItemPath::root(&item.link_id),
            Some((parent, None)) => parent.child(&item.link_id),
            Some((parent, Some(index))) => parent.nested(index, &item.link_id),
        };

        scope.push(ScopeEntry {
            item,
            response: Some(response),
        });
        if visit(&path, scope) == Walk::Descend && !item.item.is_empty() {
            if item.should_have_nested_items_under_answers() {
                for (index, answer) in response.answer.iter().enumerate() {
                    walk_level(&item.item, &answer.item, Some((&path, Some(index))), scope, visit);
                }
            } else {
                walk_level(&item.item, &response.item, Some((&path, None)), scope, visit);
            }
        }
        scope.pop();
    }
}

/// First item with `link_id` in `items`, searching nested items and
/// answers depth first.
pub fn find_response_item<'a>(
    items: &'a [QuestionnaireResponseItem],
    link_id: &str,
) -> Option<&'a QuestionnaireResponseItem> {
    for item in items {
        if item.link_id == link_id {
            return Some(item);
        }
        if let Some(found) = find_response_item(&item.item, link_id) {
            return Some(found);
        }
        for answer in &item.answer {
            if let Some(found) = find_response_item(&answer.item, link_id) {
                return Some(found);
            }
        }
    }
    None
}
