mod test_support;

use pretty_assertions::assert_eq;
use sdc_engine::{Error, QuestionnaireAdapterItem, QuestionnaireEngine, ValidationResult};
use sdc_models::AnswerValue;
use serde_json::json;
use test_support::{engine, fixed_now, fixture, fixture_path, path, question};

#[tokio::test]
async fn new_response_round_trips() {
    let engine = engine("household.json").await;
    let exported = engine.questionnaire_response().unwrap();
    let value = serde_json::to_value(&exported).unwrap();
    assert_eq!(
        value,
        json!({
            "resourceType": "QuestionnaireResponse",
            "questionnaire": "http://example.org/Questionnaire/household",
            "status": "in-progress",
            "authored": "2024-03-15T09:00:00Z",
            "extension": [{
                "url": "http://github.com/google-android/questionnaire-lastLaunched-timestamp",
                "valueDateTime": "2024-03-15T09:00:00Z"
            }],
            "item": [
                {"linkId": "count", "text": "Members", "answer": [{"valueInteger": 0}]},
                {"linkId": "contact", "text": "Contact", "answer": [{"valueString": "none"}]}
            ]
        })
    );

    let reloaded = QuestionnaireEngine::builder()
        .questionnaire_path(fixture_path("household.json"))
        .response_json(value.to_string())
        .now(fixed_now())
        .build()
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(reloaded.questionnaire_response().unwrap()).unwrap(),
        value
    );
}

#[tokio::test]
async fn repeated_groups_add_remove_and_recalculate() {
    let mut engine = engine("household.json").await;
    let members = path("members");
    engine.add_repeated_group(&members).await.unwrap();
    engine.add_repeated_group(&members).await.unwrap();
    engine
        .set_answer(&path("members#1/member-name"), vec![AnswerValue::String("Bo".into())])
        .await
        .unwrap();

    let state = engine.state();
    assert_eq!(question(&state, "count").answers, vec![AnswerValue::Integer(2)]);
    let headers: Vec<usize> = state
        .items
        .iter()
        .filter_map(|item| match item {
            QuestionnaireAdapterItem::RepeatedGroupHeader { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(headers, vec![0, 1]);
    assert!(matches!(
        state.items.get(6),
        Some(QuestionnaireAdapterItem::RepeatedGroupAddButton { enabled: true, .. })
    ));

    engine.remove_repeated_group(&members, 0).await.unwrap();
    let exported = serde_json::to_value(engine.questionnaire_response().unwrap()).unwrap();
    assert_eq!(
        exported["item"][0],
        json!({
            "linkId": "members",
            "text": "Household member",
            "item": [
                {"linkId": "member-name", "text": "Name", "answer": [{"valueString": "Bo"}]},
                {"linkId": "member-age", "text": "Age"}
            ]
        })
    );
    assert_eq!(exported["item"][1]["answer"], json!([{"valueInteger": 1}]));
}

#[tokio::test]
async fn cycle_is_rejected_naming_both_items() {
    let error = QuestionnaireEngine::builder()
        .questionnaire_json(fixture("cycle.json"))
        .build()
        .await
        .err()
        .expect("cyclic questionnaire must not load");
    let Error::CyclicDependency { first, second } = &error else {
        panic!("unexpected error: {error}");
    };
    let mut named = vec![first.as_str(), second.as_str()];
    named.sort();
    assert_eq!(named, vec!["a", "b"]);
    assert!(error
        .to_string()
        .ends_with("have cyclic dependency in expression based extension"));
}

#[tokio::test]
async fn min_value_today_bound() {
    let mut engine = engine("appointment.json").await;
    let date = path("date");
    assert_eq!(
        question(&engine.state(), "date").min_answer_value,
        Some(AnswerValue::Date("2024-03-15".into()))
    );

    engine
        .set_answer(&date, vec![AnswerValue::Date("2024-03-01".into())])
        .await
        .unwrap();
    assert_eq!(
        question(&engine.state(), "date").validation,
        ValidationResult::Invalid(vec!["Minimum value allowed is:2024-03-15".into()])
    );

    engine
        .set_answer(&date, vec![AnswerValue::Date("2024-04-01".into())])
        .await
        .unwrap();
    assert_eq!(question(&engine.state(), "date").validation, ValidationResult::Valid);
}

#[tokio::test]
async fn mismatched_response_is_rejected() {
    let result = QuestionnaireEngine::builder()
        .questionnaire_path(fixture_path("cascade.json"))
        .response_json(
            json!({
                "resourceType": "QuestionnaireResponse",
                "questionnaire": "http://example.org/Questionnaire/other",
                "status": "in-progress"
            })
            .to_string(),
        )
        .build()
        .await;
    assert!(matches!(result, Err(Error::QuestionnaireMismatch { .. })));
}

#[tokio::test]
async fn out_of_range_date_calculation_leaves_item_empty() {
    let engine = QuestionnaireEngine::builder()
        .questionnaire_json(
            json!({
                "resourceType": "Questionnaire",
                "url": "http://example.org/Questionnaire/far-future",
                "status": "active",
                "item": [{
                    "linkId": "due",
                    "type": "date",
                    "text": "Due",
                    "readOnly": true,
                    "extension": [{
                        "url": "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-calculatedExpression",
                        "valueExpression": {
                            "language": "text/fhirpath",
                            "expression": "today() + 9999999999999999 days"
                        }
                    }]
                }]
            })
            .to_string(),
        )
        .now(fixed_now())
        .build()
        .await
        .unwrap();
    assert!(question(&engine.state(), "due").answers.is_empty());
}

#[tokio::test]
async fn malformed_date_time_answer_does_not_enable() {
    let engine = QuestionnaireEngine::builder()
        .questionnaire_json(
            json!({
                "resourceType": "Questionnaire",
                "url": "http://example.org/Questionnaire/visit",
                "status": "active",
                "item": [
                    {"linkId": "seen", "type": "dateTime", "text": "Seen at"},
                    {
                        "linkId": "follow-up",
                        "type": "string",
                        "text": "Follow-up notes",
                        "enableWhen": [{
                            "question": "seen",
                            "operator": ">",
                            "answerDateTime": "2024-01-01T09:00:00Z"
                        }]
                    }
                ]
            })
            .to_string(),
        )
        .response_json(
            json!({
                "resourceType": "QuestionnaireResponse",
                "questionnaire": "http://example.org/Questionnaire/visit",
                "status": "in-progress",
                "item": [{
                    "linkId": "seen",
                    "answer": [{"valueDateTime": "2024-01-01T10:00+1\u{e9}2"}]
                }]
            })
            .to_string(),
        )
        .now(fixed_now())
        .build()
        .await
        .unwrap();
    assert_eq!(test_support::listed(&engine.state()), vec!["seen"]);
}
