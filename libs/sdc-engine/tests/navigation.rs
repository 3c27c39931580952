mod test_support;

use pretty_assertions::assert_eq;
use sdc_engine::{DisplayMode, EngineConfig, QuestionnairePagination, ValidationResult};
use sdc_models::{AnswerValue, EntryMode};
use test_support::{engine, engine_with, listed, path, question};

fn current_page(mode: &DisplayMode) -> Option<usize> {
    match mode {
        DisplayMode::EditMode {
            pagination: QuestionnairePagination::Paginated { current_page_index, .. },
            ..
        } => Some(*current_page_index),
        _ => None,
    }
}

#[tokio::test]
async fn sequential_next_page_blocked_by_invalid_page() {
    let mut engine = engine("sequential_pages.json").await;
    let state = engine.state();
    assert_eq!(current_page(&state.display_mode), Some(0));
    assert_eq!(listed(&state), vec!["page-1", "name"]);
    assert_eq!(question(&state, "name").validation, ValidationResult::NotValidated);

    assert!(!engine.go_to_next_page().await.unwrap());
    let state = engine.state();
    assert_eq!(current_page(&state.display_mode), Some(0));
    assert_eq!(
        question(&state, "name").validation,
        ValidationResult::Invalid(vec!["Missing answer for required field.".into()])
    );
    // navigation is not an answer change
    assert_eq!(engine.modification_count(), 0);
}

#[tokio::test]
async fn next_page_skips_hidden_pages() {
    let mut engine = engine("sequential_pages.json").await;
    engine
        .set_answer(&path("page-1/name"), vec![AnswerValue::String("Ada".into())])
        .await
        .unwrap();
    assert!(engine.go_to_next_page().await.unwrap());

    let state = engine.state();
    assert_eq!(current_page(&state.display_mode), Some(2));
    assert_eq!(listed(&state), vec!["page-3", "email"]);
    assert!(state.bottom_navigation.submit.is_enabled());
    assert!(!state.bottom_navigation.next.is_enabled());
    assert!(!engine.go_to_next_page().await.unwrap());
}

#[tokio::test]
async fn sequential_mode_cannot_go_back() {
    let mut engine = engine("sequential_pages.json").await;
    engine
        .set_answer(&path("page-1/name"), vec![AnswerValue::String("Ada".into())])
        .await
        .unwrap();
    engine.go_to_next_page().await.unwrap();
    assert!(!engine.go_to_previous_page().await.unwrap());
    assert_eq!(engine.current_page(), Some(2));
    assert!(!engine.go_to_page(0).await.unwrap());
}

#[tokio::test]
async fn random_mode_moves_freely() {
    let config = EngineConfig {
        entry_mode: Some(EntryMode::Random),
        ..Default::default()
    };
    let mut engine = engine_with("sequential_pages.json", config).await;
    assert!(engine.go_to_next_page().await.unwrap());
    assert_eq!(engine.current_page(), Some(2));
    assert!(engine.go_to_previous_page().await.unwrap());
    assert_eq!(engine.current_page(), Some(0));
    // hidden pages cannot be jumped to
    assert!(!engine.go_to_page(1).await.unwrap());
    assert!(engine.go_to_page(2).await.unwrap());
}

#[tokio::test]
async fn prior_edit_review_requires_every_page_valid() {
    let config = EngineConfig {
        entry_mode: Some(EntryMode::PriorEdit),
        enable_review_page: true,
        ..Default::default()
    };
    let mut engine = engine_with("sequential_pages.json", config).await;
    assert!(!engine.set_review_mode(true).await.unwrap());
    assert!(!engine.is_review_mode());

    engine
        .set_answer(&path("page-1/name"), vec![AnswerValue::String("Ada".into())])
        .await
        .unwrap();
    assert!(engine.set_review_mode(true).await.unwrap());
    let state = engine.state();
    assert_eq!(
        state.display_mode,
        DisplayMode::ReviewMode {
            show_edit_button: true,
            show_navigation_in_long_scroll: false
        }
    );
    // review lists every page except the hidden one
    assert_eq!(listed(&state), vec!["page-1", "name", "page-3", "email"]);
}

#[tokio::test]
async fn not_paginated_without_page_controls() {
    let engine = engine("cascade.json").await;
    assert!(matches!(
        engine.state().display_mode,
        DisplayMode::EditMode {
            pagination: QuestionnairePagination::NotPaginated,
            ..
        }
    ));
}
