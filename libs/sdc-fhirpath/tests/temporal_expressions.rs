//! Date arithmetic and clock functions.

use serde_json::json;

mod test_support;
use test_support::{eval, eval_json, response_context};

#[test]
fn today_uses_injected_clock() {
    let ctx = response_context();
    assert_eq!(eval_json("today()", &ctx), vec![json!("2024-03-15")]);
}

#[test]
fn today_minus_years() {
    let ctx = response_context();
    assert_eq!(eval_json("today() - 18 years", &ctx), vec![json!("2006-03-15")]);
    assert_eq!(eval_json("today() + 1 'mo'", &ctx), vec![json!("2024-04-15")]);
}

#[test]
fn age_check_against_answer() {
    let ctx = response_context();
    let result = eval(
        "%resource.repeat(item).where(linkId = 'birth').answer.value <= today() - 18 years",
        &ctx,
    );
    assert!(result.as_boolean().unwrap());
}

#[test]
fn partial_dates_compare_to_empty_when_ambiguous() {
    let ctx = response_context();
    assert!(eval("@2024 < @2024-03-01", &ctx).is_empty());
    assert!(eval("@2023 < @2024-03-01", &ctx).as_boolean().unwrap());
}

#[test]
fn date_equality_across_precision() {
    let ctx = response_context();
    assert!(eval("@2024-03-15 = today()", &ctx).as_boolean().unwrap());
    assert!(eval("@2024-03 = @2024-03-15", &ctx).is_empty());
}

#[test]
fn now_is_a_date_time() {
    let ctx = response_context();
    assert!(eval("now() is DateTime", &ctx).as_boolean().unwrap());
    assert!(eval("now() > @2024-03-15T09:00:00+01:00", &ctx)
        .as_boolean()
        .unwrap());
}
