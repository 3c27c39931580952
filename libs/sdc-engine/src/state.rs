//! Snapshots of what to render
//!
//! [`Projector`] folds the definition tree, the packed response, enablement,
//! validation and answer options into the ordered list of
//! [`QuestionnaireAdapterItem`]s. [`assemble`] adds the display mode and
//! the navigation buttons on top.

use crate::answer_options::OptionsContext;
use crate::calculated::evaluated_text;
use crate::config::EngineConfig;
use crate::enablement::EnablementEvaluator;
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use crate::pagination::{PageController, QuestionnairePage, QuestionnairePagination};
use crate::path::ItemPath;
use crate::validation::{validate, Bounds, ValidationResult};
use sdc_models::{
    AnswerValue, ItemType, Questionnaire, QuestionnaireItem, QuestionnaireResponse,
    QuestionnaireResponseItem,
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Everything a renderer needs, replaced as a whole on every change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionnaireState {
    pub items: Vec<QuestionnaireAdapterItem>,
    pub display_mode: DisplayMode,
    pub bottom_navigation: QuestionnaireNavigationUiState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionnaireAdapterItem {
    Question(Box<QuestionItem>),
    RepeatedGroupHeader {
        /// Path of the occurrence, e.g. `people#1`
        id: String,
        index: usize,
        title: Option<String>,
    },
    RepeatedGroupAddButton {
        path: ItemPath,
        enabled: bool,
    },
    Navigation(QuestionnaireNavigationUiState),
}

impl QuestionnaireAdapterItem {
    pub fn as_question(&self) -> Option<&QuestionItem> {
        match self {
            QuestionnaireAdapterItem::Question(question) => Some(question),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionItem {
    pub path: ItemPath,
    /// The item's definition without its nested items
    pub definition: QuestionnaireItem,
    pub answers: Vec<AnswerValue>,
    pub validation: ValidationResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_answer_options: Vec<AnswerValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_answer_value: Option<AnswerValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_answer_value: Option<AnswerValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_display_items: Vec<DisplayItem>,
    pub question_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flyover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub text_config: QuestionTextConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayItem {
    pub link_id: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QuestionTextConfiguration {
    pub show_asterisk: bool,
    pub show_required_text: bool,
    pub show_optional_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DisplayMode {
    EditMode {
        pagination: QuestionnairePagination,
        show_navigation_in_long_scroll: bool,
    },
    ReviewMode {
        show_edit_button: bool,
        show_navigation_in_long_scroll: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NavigationButton {
    #[default]
    Hidden,
    Enabled {
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl NavigationButton {
    fn shown(visible: bool, label: Option<String>) -> Self {
        if visible {
            NavigationButton::Enabled { label }
        } else {
            NavigationButton::Hidden
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, NavigationButton::Enabled { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuestionnaireNavigationUiState {
    pub previous: NavigationButton,
    pub next: NavigationButton,
    pub submit: NavigationButton,
    pub cancel: NavigationButton,
    pub review: NavigationButton,
}

/// Inputs of one projection pass
pub struct Projector<'a> {
    questionnaire: &'a Questionnaire,
    response: &'a QuestionnaireResponse,
    view: &'a ResponseView,
    expressions: &'a ExpressionEvaluator,
    options: &'a OptionsContext<'a>,
    modified: &'a BTreeSet<ItemPath>,
    config: &'a EngineConfig,
    enablement: EnablementEvaluator<'a>,
    review_mode: bool,
    /// Top-level item shown alone in paginated edit mode
    page: Option<usize>,
}

impl<'a> Projector<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        questionnaire: &'a Questionnaire,
        response: &'a QuestionnaireResponse,
        view: &'a ResponseView,
        expressions: &'a ExpressionEvaluator,
        options: &'a OptionsContext<'a>,
        modified: &'a BTreeSet<ItemPath>,
        config: &'a EngineConfig,
        review_mode: bool,
        page: Option<usize>,
    ) -> Self {
        Self {
            questionnaire,
            response,
            view,
            expressions,
            options,
            modified,
            config,
            enablement: EnablementEvaluator::new(response, view, expressions),
            review_mode,
            page,
        }
    }

    pub fn items(&self) -> Vec<QuestionnaireAdapterItem> {
        let mut out = Vec::new();
        let mut scope = Vec::new();
        for (index, definition) in self.questionnaire.item.iter().enumerate() {
            if self.page.is_some_and(|page| page != index) {
                continue;
            }
            self.project(
                std::slice::from_ref(definition),
                &self.response.item,
                None,
                &mut scope,
                &mut out,
            );
        }
        out
    }

    fn project(
        &self,
        definitions: &'a [QuestionnaireItem],
        responses: &'a [QuestionnaireResponseItem],
        parent: Option<(&ItemPath, Option<usize>)>,
        scope: &mut Vec<ScopeEntry<'a>>,
        out: &mut Vec<QuestionnaireAdapterItem>,
    ) {
        for definition in definitions {
            let Some(response) = responses.iter().find(|r| r.link_id == definition.link_id) else {
                continue;
            };
            let path = match parent {
                None => ItemPath::root(&definition.link_id),
                Some((parent, None)) => parent.child(&definition.link_id),
                Some((parent, Some(index))) => parent.nested(index, &definition.link_id),
            };
            scope.push(ScopeEntry {
                item: definition,
                response: Some(response),
            });
            if self.is_listed(definition, scope) {
                self.project_item(definition, response, &path, scope, out);
            }
            scope.pop();
        }
    }

    fn is_listed(&self, definition: &QuestionnaireItem, scope: &[ScopeEntry<'_>]) -> bool {
        !definition.is_hidden()
            && !is_supplementary(definition)
            && self.enablement.is_enabled(definition, scope)
    }

    fn project_item(
        &self,
        definition: &'a QuestionnaireItem,
        response: &'a QuestionnaireResponseItem,
        path: &ItemPath,
        scope: &mut Vec<ScopeEntry<'a>>,
        out: &mut Vec<QuestionnaireAdapterItem>,
    ) {
        if definition.is_repeated_group() {
            let title = definition
                .localized_text(self.locale())
                .map(str::to_string);
            for (index, occurrence) in response.answer.iter().enumerate() {
                out.push(QuestionnaireAdapterItem::RepeatedGroupHeader {
                    id: format!("{path}#{index}"),
                    index,
                    title: title.clone(),
                });
                self.project(&definition.item, &occurrence.item, Some((path, Some(index))), scope, out);
            }
            out.push(QuestionnaireAdapterItem::RepeatedGroupAddButton {
                path: path.clone(),
                enabled: !self.config.read_only && !self.review_mode && !definition.is_read_only(),
            });
            return;
        }

        out.push(QuestionnaireAdapterItem::Question(Box::new(
            self.question(definition, response, path, scope),
        )));
        if definition.should_have_nested_items_under_answers() {
            for (index, answer) in response.answer.iter().enumerate() {
                self.project(&definition.item, &answer.item, Some((path, Some(index))), scope, out);
            }
        } else {
            self.project(&definition.item, &response.item, Some((path, None)), scope, out);
        }
    }

    fn question(
        &self,
        definition: &QuestionnaireItem,
        response: &QuestionnaireResponseItem,
        path: &ItemPath,
        scope: &[ScopeEntry<'_>],
    ) -> QuestionItem {
        let locale = self.locale();
        let answers: Vec<AnswerValue> = response.answer_values().cloned().collect();
        let bounds = Bounds::evaluate(definition, self.expressions, self.view, scope);

        let validation = if definition.is_group() || definition.is_display_item() {
            ValidationResult::NotValidated
        } else if self.review_mode || self.modified.contains(path) {
            validate(definition, &answers, &bounds)
        } else {
            ValidationResult::NotValidated
        };

        let enabled_answer_options = if has_options(definition) {
            let options = self.options.answer_options(definition, path, scope);
            self.options.enabled_options(definition, options, scope)
        } else {
            Vec::new()
        };

        let supplementary: Vec<&QuestionnaireItem> = definition
            .item
            .iter()
            .filter(|child| is_supplementary(child))
            .filter(|child| {
                let mut child_scope = scope.to_vec();
                child_scope.push(ScopeEntry {
                    item: child,
                    response: None,
                });
                self.enablement.is_enabled(child, &child_scope)
            })
            .collect();
        let supplementary_text = |matches: fn(&QuestionnaireItem) -> bool| {
            supplementary
                .iter()
                .find(|child| matches(child))
                .and_then(|child| child.localized_text(locale))
                .map(str::to_string)
        };
        let instructions = supplementary_text(QuestionnaireItem::is_instructions);
        let flyover = supplementary_text(QuestionnaireItem::is_flyover);
        let help = supplementary_text(QuestionnaireItem::is_help);
        let enabled_display_items = supplementary
            .iter()
            .map(|child| DisplayItem {
                link_id: child.link_id.clone(),
                text: child.localized_text(locale).map(str::to_string),
            })
            .collect();

        QuestionItem {
            path: path.clone(),
            definition: QuestionnaireItem {
                item: Vec::new(),
                ..definition.clone()
            },
            answers,
            validation,
            enabled_answer_options,
            min_answer_value: bounds.min,
            max_answer_value: bounds.max,
            enabled_display_items,
            question_text: evaluated_text(definition, self.expressions, self.view, scope)
                .or_else(|| definition.localized_text(locale).map(str::to_string)),
            prefix: definition.localized_prefix(locale).map(str::to_string),
            instructions,
            flyover,
            help,
            text_config: QuestionTextConfiguration {
                show_asterisk: self.config.show_asterisk,
                show_required_text: self.config.show_required_text,
                show_optional_text: self.config.show_optional_text,
            },
        }
    }

    fn locale(&self) -> Option<&'a str> {
        self.config.locale.as_deref()
    }
}

/// Display items rendered as part of their parent question
fn is_supplementary(item: &QuestionnaireItem) -> bool {
    item.is_instructions() || item.is_flyover() || item.is_help()
}

fn has_options(item: &QuestionnaireItem) -> bool {
    !item.answer_option.is_empty()
        || item.answer_value_set.is_some()
        || item.answer_expression().is_some()
        || matches!(item.item_type(), Some(ItemType::Choice | ItemType::OpenChoice))
}

/// Wrap projected items with display mode and navigation.
pub fn assemble(
    mut items: Vec<QuestionnaireAdapterItem>,
    config: &EngineConfig,
    review_mode: bool,
    controller: &PageController,
    pages: &[QuestionnairePage],
) -> QuestionnaireState {
    let long_scroll = config.show_navigation_in_long_scroll;
    let submit_label = config.submit_button_text.clone();

    let (display_mode, navigation) = if review_mode || config.read_only {
        (
            DisplayMode::ReviewMode {
                show_edit_button: !config.read_only,
                show_navigation_in_long_scroll: long_scroll,
            },
            QuestionnaireNavigationUiState {
                submit: NavigationButton::shown(config.show_submit_button, submit_label),
                cancel: NavigationButton::shown(config.show_cancel_button, None),
                ..Default::default()
            },
        )
    } else if pages.is_empty() {
        let show_review = config.enable_review_page;
        (
            DisplayMode::EditMode {
                pagination: QuestionnairePagination::NotPaginated,
                show_navigation_in_long_scroll: long_scroll,
            },
            QuestionnaireNavigationUiState {
                review: NavigationButton::shown(show_review, None),
                submit: NavigationButton::shown(config.show_submit_button && !show_review, submit_label),
                cancel: NavigationButton::shown(config.show_cancel_button && !show_review, None),
                ..Default::default()
            },
        )
    } else {
        let has_next = controller.has_next_page(pages);
        let show_review = config.enable_review_page && !has_next;
        (
            DisplayMode::EditMode {
                pagination: controller.pagination(pages),
                show_navigation_in_long_scroll: long_scroll,
            },
            QuestionnaireNavigationUiState {
                previous: NavigationButton::shown(controller.has_previous_page(pages), None),
                next: NavigationButton::shown(has_next, None),
                review: NavigationButton::shown(show_review, None),
                submit: NavigationButton::shown(
                    config.show_submit_button && !show_review && !has_next,
                    submit_label,
                ),
                cancel: NavigationButton::shown(config.show_cancel_button && !show_review, None),
            },
        )
    };

    let bottom_navigation = if long_scroll {
        items.push(QuestionnaireAdapterItem::Navigation(navigation));
        QuestionnaireNavigationUiState::default()
    } else {
        navigation
    };

    QuestionnaireState {
        items,
        display_mode,
        bottom_navigation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_models::EntryMode;

    fn page(index: usize) -> QuestionnairePage {
        QuestionnairePage {
            index,
            enabled: true,
            hidden: false,
        }
    }

    #[test]
    fn test_not_paginated_review_replaces_submit() {
        let config = EngineConfig {
            enable_review_page: true,
            show_cancel_button: true,
            ..Default::default()
        };
        let controller = PageController::new(EntryMode::Random);
        let state = assemble(Vec::new(), &config, false, &controller, &[]);
        assert!(state.bottom_navigation.review.is_enabled());
        assert!(!state.bottom_navigation.submit.is_enabled());
        assert!(!state.bottom_navigation.cancel.is_enabled());
    }

    #[test]
    fn test_paginated_navigation() {
        let config = EngineConfig::default();
        let pages = vec![page(0), page(1)];
        let mut controller = PageController::new(EntryMode::Random);
        controller.sync(&pages);

        let first = assemble(Vec::new(), &config, false, &controller, &pages);
        assert!(first.bottom_navigation.next.is_enabled());
        assert!(!first.bottom_navigation.previous.is_enabled());
        assert!(!first.bottom_navigation.submit.is_enabled());

        controller.move_to(1);
        let last = assemble(Vec::new(), &config, false, &controller, &pages);
        assert!(last.bottom_navigation.previous.is_enabled());
        assert!(last.bottom_navigation.submit.is_enabled());
        assert_eq!(
            last.display_mode,
            DisplayMode::EditMode {
                pagination: QuestionnairePagination::Paginated {
                    pages,
                    current_page_index: 1
                },
                show_navigation_in_long_scroll: false,
            }
        );
    }

    #[test]
    fn test_read_only_is_review_without_edit() {
        let config = EngineConfig {
            read_only: true,
            ..Default::default()
        };
        let controller = PageController::new(EntryMode::Random);
        let state = assemble(Vec::new(), &config, false, &controller, &[]);
        assert_eq!(
            state.display_mode,
            DisplayMode::ReviewMode {
                show_edit_button: false,
                show_navigation_in_long_scroll: false
            }
        );
        assert!(state.bottom_navigation.submit.is_enabled());
    }

    #[test]
    fn test_long_scroll_appends_navigation_item() {
        let config = EngineConfig {
            show_navigation_in_long_scroll: true,
            ..Default::default()
        };
        let controller = PageController::new(EntryMode::Random);
        let state = assemble(Vec::new(), &config, false, &controller, &[]);
        assert!(matches!(
            state.items.last(),
            Some(QuestionnaireAdapterItem::Navigation(nav)) if nav.submit.is_enabled()
        ));
        assert_eq!(state.bottom_navigation, QuestionnaireNavigationUiState::default());
    }
}
