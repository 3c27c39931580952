use anyhow::{bail, Context};
use clap::Args;
use sdc_engine::{EngineConfig, ItemPath, QuestionnaireEngine};
use sdc_models::AnswerValue;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct Input {
    /// Questionnaire JSON file
    #[arg(short, long)]
    pub questionnaire: PathBuf,

    /// QuestionnaireResponse JSON file to continue
    #[arg(short, long)]
    pub response: Option<PathBuf>,

    /// Append an occurrence to a repeated group, e.g. `members`
    #[arg(long = "add-group", value_name = "PATH")]
    pub add_groups: Vec<String>,

    /// `PATH=JSON` where JSON is one answer value object or an array of them,
    /// e.g. `members#0/age={"valueInteger":42}`
    #[arg(short, long = "answer", value_name = "PATH=JSON")]
    pub answers: Vec<String>,

    /// `NAME=FILE` binding a launch context such as `patient`
    #[arg(long = "launch-context", value_name = "NAME=FILE")]
    pub launch_contexts: Vec<String>,
}

/// Parse `path=json` into a path and its answers.
pub fn parse_answer(raw: &str) -> anyhow::Result<(ItemPath, Vec<AnswerValue>)> {
    let Some((path, json)) = raw.split_once('=') else {
        bail!("expected PATH=JSON, got '{raw}'");
    };
    let path: ItemPath = path.trim().parse()?;
    let value: JsonValue =
        serde_json::from_str(json).with_context(|| format!("answer for {path} is not JSON"))?;
    let values = match value {
        JsonValue::Array(values) => values,
        JsonValue::Null => Vec::new(),
        single => vec![single],
    };
    let answers = values
        .into_iter()
        .map(AnswerValue::from_json)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("answer for {path} is not an answer value"))?;
    Ok((path, answers))
}

fn read_json(path: &PathBuf) -> anyhow::Result<JsonValue> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not JSON", path.display()))
}

pub async fn load(input: &Input, config: EngineConfig) -> anyhow::Result<QuestionnaireEngine> {
    let mut builder = QuestionnaireEngine::builder()
        .questionnaire_path(&input.questionnaire)
        .config(config);
    if let Some(response) = &input.response {
        builder = builder.response_path(response);
    }
    for binding in &input.launch_contexts {
        let Some((name, file)) = binding.split_once('=') else {
            bail!("expected NAME=FILE, got '{binding}'");
        };
        builder = builder.launch_context(name, read_json(&PathBuf::from(file))?);
    }
    let mut engine = builder
        .build()
        .await
        .with_context(|| format!("Failed to load {}", input.questionnaire.display()))?;

    for group in &input.add_groups {
        let path: ItemPath = group.parse()?;
        engine
            .add_repeated_group(&path)
            .await
            .with_context(|| format!("Failed to add an occurrence to {path}"))?;
    }
    for raw in &input.answers {
        let (path, answers) = parse_answer(raw)?;
        engine
            .set_answer(&path, answers)
            .await
            .with_context(|| format!("Failed to answer {path}"))?;
    }
    tracing::info!(
        changes = engine.modification_count(),
        "inputs applied"
    );
    Ok(engine)
}

pub async fn print_state(mut engine: QuestionnaireEngine, review: bool) -> anyhow::Result<()> {
    if review && !engine.set_review_mode(true).await? {
        tracing::warn!("review mode refused; showing edit mode");
    }
    println!("{}", serde_json::to_string_pretty(engine.state().as_ref())?);
    Ok(())
}

pub fn print_response(engine: &QuestionnaireEngine) -> anyhow::Result<()> {
    let response = engine.questionnaire_response()?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Returns whether every item is valid.
pub fn print_validation(engine: &QuestionnaireEngine) -> anyhow::Result<bool> {
    let results = engine.validate_all()?;
    let valid = !results.values().any(|r| r.is_invalid());
    let keyed: BTreeMap<String, _> = results
        .into_iter()
        .map(|(path, result)| (path.to_string(), result))
        .collect();
    println!("{}", serde_json::to_string_pretty(&keyed)?);
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_single_answer() {
        let (path, answers) = parse_answer(r#"members#0/age={"valueInteger":42}"#).unwrap();
        assert_eq!(path.to_string(), "members#0/age");
        assert_eq!(answers, vec![AnswerValue::Integer(42)]);
    }

    #[test]
    fn test_parse_many_and_clear() {
        let (_, answers) =
            parse_answer(r#"tags=[{"valueString":"a"},{"valueString":"b"}]"#).unwrap();
        assert_eq!(answers.len(), 2);
        let (_, cleared) = parse_answer("tags=null").unwrap();
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_answer("no-separator").is_err());
        assert!(parse_answer("age={not json}").is_err());
        assert!(parse_answer(r#"age={"valueNothing":1}"#).is_err());
    }
}
