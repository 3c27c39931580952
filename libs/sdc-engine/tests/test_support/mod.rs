#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone};
use sdc_engine::{
    EngineConfig, ItemPath, QuestionItem, QuestionnaireEngine, QuestionnaireState,
};
use sdc_models::{AnswerValue, Coding};
use std::path::PathBuf;

/// 2024-03-15T09:00:00Z
pub fn fixed_now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .and_then(|tz| tz.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).single())
        .expect("valid fixed timestamp")
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    let path = fixture_path(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("reading fixture {}: {e}", path.display()))
}

pub async fn engine(name: &str) -> QuestionnaireEngine {
    engine_with(name, EngineConfig::default()).await
}

pub async fn engine_with(name: &str, config: EngineConfig) -> QuestionnaireEngine {
    QuestionnaireEngine::builder()
        .questionnaire_path(fixture_path(name))
        .config(config)
        .now(fixed_now())
        .build()
        .await
        .unwrap_or_else(|e| panic!("loading {name}: {e}"))
}

pub fn path(text: &str) -> ItemPath {
    text.parse().unwrap_or_else(|e| panic!("bad path {text}: {e}"))
}

pub fn questions(state: &QuestionnaireState) -> Vec<&QuestionItem> {
    state.items.iter().filter_map(|item| item.as_question()).collect()
}

/// Link ids of the listed questions, in order
pub fn listed(state: &QuestionnaireState) -> Vec<String> {
    questions(state)
        .into_iter()
        .map(|q| q.path.link_id().to_string())
        .collect()
}

pub fn question<'a>(state: &'a QuestionnaireState, link_id: &str) -> &'a QuestionItem {
    questions(state)
        .into_iter()
        .find(|q| q.path.link_id() == link_id)
        .unwrap_or_else(|| panic!("{link_id} is not listed"))
}

pub fn drink(code: &str) -> AnswerValue {
    AnswerValue::Coding(Coding::new("http://example.org/drinks", code))
}

pub fn codes(answers: &[AnswerValue]) -> Vec<String> {
    answers
        .iter()
        .filter_map(|a| a.as_coding())
        .filter_map(|c| c.code.clone())
        .collect()
}
