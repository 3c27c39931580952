#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone};
use sdc_fhirpath::{Collection, Context, Engine};
use serde_json::{json, Value as JsonValue};
use std::sync::OnceLock;

static ENGINE: OnceLock<Engine> = OnceLock::new();

pub fn engine() -> &'static Engine {
    ENGINE.get_or_init(Engine::new)
}

/// 2024-03-15T10:30:00+01:00
pub fn fixed_now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .and_then(|tz| tz.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).single())
        .expect("valid fixed timestamp")
}

/// A small in-progress response: a BMI form with a nested group.
pub fn bmi_response() -> JsonValue {
    json!({
        "resourceType": "QuestionnaireResponse",
        "status": "in-progress",
        "item": [
            {"linkId": "weight", "answer": [{"valueDecimal": 72.5}]},
            {"linkId": "height", "answer": [{"valueDecimal": 1.8}]},
            {
                "linkId": "history",
                "item": [
                    {"linkId": "smoker", "answer": [{"valueBoolean": true}]},
                    {
                        "linkId": "birth",
                        "answer": [{"valueDate": "1990-06-01"}]
                    },
                    {
                        "linkId": "gender",
                        "answer": [{"valueCoding": {"system": "http://hl7.org/fhir/administrative-gender", "code": "female", "display": "Female"}}]
                    }
                ]
            }
        ]
    })
}

pub fn response_context() -> Context {
    Context::from_json(&bmi_response()).with_now(fixed_now())
}

pub fn eval(expr: &str, ctx: &Context) -> Collection {
    engine()
        .evaluate_expr(expr, ctx)
        .unwrap_or_else(|e| panic!("evaluation of `{expr}` failed: {e}"))
}

pub fn eval_json(expr: &str, ctx: &Context) -> Vec<JsonValue> {
    eval(expr, ctx).to_json()
}
