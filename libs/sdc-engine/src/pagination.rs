//! Pages and entry mode
//!
//! A questionnaire is paginated when any top-level item carries the `page`
//! item control; every top-level item is then a page. Navigation only
//! lands on pages that are enabled and not hidden.

use crate::enablement::EnablementEvaluator;
use crate::error::Result;
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use sdc_models::{EntryMode, Questionnaire, QuestionnaireResponse};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuestionnairePage {
    pub index: usize,
    pub enabled: bool,
    pub hidden: bool,
}

impl QuestionnairePage {
    pub fn is_visible(&self) -> bool {
        self.enabled && !self.hidden
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionnairePagination {
    NotPaginated,
    Paginated {
        pages: Vec<QuestionnairePage>,
        current_page_index: usize,
    },
}

/// Page list for the current response; empty when not paginated.
pub fn compute_pages(
    questionnaire: &Questionnaire,
    response: &QuestionnaireResponse,
    view: &ResponseView,
    expressions: &ExpressionEvaluator,
) -> Result<Vec<QuestionnairePage>> {
    if !questionnaire.is_paginated() {
        return Ok(Vec::new());
    }
    let enablement = EnablementEvaluator::new(response, view, expressions);
    let pages = questionnaire
        .item
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let response_item = response.item.iter().find(|r| r.link_id == item.link_id);
            let scope = [ScopeEntry {
                item,
                response: response_item,
            }];
            QuestionnairePage {
                index,
                enabled: response_item.is_some() && enablement.is_enabled(item, &scope),
                hidden: item.is_hidden(),
            }
        })
        .collect();
    Ok(pages)
}

/// Tracks the current page and what the entry mode permits
#[derive(Debug, Clone)]
pub struct PageController {
    entry_mode: EntryMode,
    current: Option<usize>,
}

impl PageController {
    pub fn new(entry_mode: EntryMode) -> Self {
        Self {
            entry_mode,
            current: None,
        }
    }

    pub fn entry_mode(&self) -> EntryMode {
        self.entry_mode
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Keep the current page on a visible one: the first visible page at
    /// start, otherwise the closest following (or preceding) visible page.
    pub fn sync(&mut self, pages: &[QuestionnairePage]) {
        if pages.is_empty() {
            self.current = None;
            return;
        }
        let current = match self.current {
            Some(index) if pages.get(index).is_some_and(QuestionnairePage::is_visible) => Some(index),
            Some(index) => next_visible(pages, index).or_else(|| previous_visible(pages, index)),
            None => pages.iter().find(|p| p.is_visible()).map(|p| p.index),
        };
        // nothing visible: stay on the first page so the state stays well formed
        self.current = current.or(Some(0));
    }

    pub fn pagination(&self, pages: &[QuestionnairePage]) -> QuestionnairePagination {
        match self.current {
            Some(current_page_index) if !pages.is_empty() => QuestionnairePagination::Paginated {
                pages: pages.to_vec(),
                current_page_index,
            },
            _ => QuestionnairePagination::NotPaginated,
        }
    }

    pub fn has_next_page(&self, pages: &[QuestionnairePage]) -> bool {
        self.current.and_then(|c| next_visible(pages, c)).is_some()
    }

    pub fn has_previous_page(&self, pages: &[QuestionnairePage]) -> bool {
        self.current.and_then(|c| previous_visible(pages, c)).is_some()
    }

    pub fn next_page(&self, pages: &[QuestionnairePage]) -> Option<usize> {
        next_visible(pages, self.current?)
    }

    pub fn previous_page(&self, pages: &[QuestionnairePage]) -> Option<usize> {
        previous_visible(pages, self.current?)
    }

    /// Leaving a page forward requires it to be valid.
    pub fn validates_forward(&self) -> bool {
        matches!(self.entry_mode, EntryMode::Sequential | EntryMode::PriorEdit)
    }

    pub fn allows_backward(&self) -> bool {
        self.entry_mode != EntryMode::Sequential
    }

    /// Entering review requires every page to be valid.
    pub fn validates_all_before_review(&self) -> bool {
        self.entry_mode == EntryMode::PriorEdit
    }

    pub fn allows_jump(&self) -> bool {
        self.entry_mode != EntryMode::Sequential
    }

    pub fn move_to(&mut self, index: usize) {
        self.current = Some(index);
    }
}

fn next_visible(pages: &[QuestionnairePage], current: usize) -> Option<usize> {
    pages
        .iter()
        .find(|p| p.index > current && p.is_visible())
        .map(|p| p.index)
}

fn previous_visible(pages: &[QuestionnairePage], current: usize) -> Option<usize> {
    pages
        .iter()
        .rev()
        .find(|p| p.index < current && p.is_visible())
        .map(|p| p.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(visible: &[bool]) -> Vec<QuestionnairePage> {
        visible
            .iter()
            .enumerate()
            .map(|(index, v)| QuestionnairePage {
                index,
                enabled: true,
                hidden: !v,
            })
            .collect()
    }

    #[test]
    fn test_starts_on_first_visible_page() {
        let pages = pages(&[false, true, true, false]);
        let mut controller = PageController::new(EntryMode::Random);
        controller.sync(&pages);
        assert_eq!(controller.current(), Some(1));
        assert!(!controller.has_previous_page(&pages));
        assert!(controller.has_next_page(&pages));

        controller.move_to(2);
        // the hidden last page does not count
        assert!(!controller.has_next_page(&pages));
    }

    #[test]
    fn test_current_page_moves_off_disabled_page() {
        let mut list = pages(&[true, true, true]);
        let mut controller = PageController::new(EntryMode::Random);
        controller.sync(&list);
        controller.move_to(1);
        list[1].enabled = false;
        controller.sync(&list);
        assert_eq!(controller.current(), Some(2));
    }

    #[test]
    fn test_entry_modes() {
        let sequential = PageController::new(EntryMode::Sequential);
        assert!(sequential.validates_forward());
        assert!(!sequential.allows_backward());
        let prior_edit = PageController::new(EntryMode::PriorEdit);
        assert!(prior_edit.allows_backward());
        assert!(prior_edit.validates_all_before_review());
        let random = PageController::new(EntryMode::Random);
        assert!(!random.validates_forward());
    }
}
