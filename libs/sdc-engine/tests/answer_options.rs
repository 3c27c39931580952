mod test_support;

use pretty_assertions::assert_eq;
use sdc_models::AnswerValue;
use test_support::{codes, drink, engine, path, question};

#[tokio::test]
async fn toggles_hide_options_only_when_every_group_is_false() {
    let mut engine = engine("toggle.json").await;
    let state = engine.state();
    // beer is only listed by the false group; juice is also in a true one
    assert_eq!(
        codes(&question(&state, "drink").enabled_answer_options),
        vec!["water", "juice"]
    );

    engine
        .set_answer(&path("adult"), vec![AnswerValue::Boolean(true)])
        .await
        .unwrap();
    assert_eq!(
        codes(&question(&engine.state(), "drink").enabled_answer_options),
        vec!["water", "beer", "juice"]
    );
}

#[tokio::test]
async fn disallowed_selection_is_cleared() {
    let mut engine = engine("toggle.json").await;
    engine
        .set_answer(&path("adult"), vec![AnswerValue::Boolean(true)])
        .await
        .unwrap();
    engine
        .set_answer(&path("drink"), vec![drink("beer"), drink("water")])
        .await
        .unwrap();
    assert_eq!(codes(&question(&engine.state(), "drink").answers), vec!["beer", "water"]);

    engine
        .set_answer(&path("adult"), vec![AnswerValue::Boolean(false)])
        .await
        .unwrap();
    let state = engine.state();
    assert_eq!(codes(&question(&state, "drink").answers), vec!["water"]);
    assert_eq!(
        codes(&question(&state, "drink").enabled_answer_options),
        vec!["water", "juice"]
    );

    let exported = engine.questionnaire_response().unwrap();
    let drink_item = exported
        .item
        .iter()
        .find(|item| item.link_id == "drink")
        .expect("drink is exported");
    let exported_answers: Vec<AnswerValue> = drink_item.answer_values().cloned().collect();
    assert_eq!(codes(&exported_answers), vec!["water"]);
}
