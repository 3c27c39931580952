//! Property-based tests using QuickCheck

use quickcheck::{QuickCheck, TestResult};
use sdc_fhirpath::{Collection, Context};

mod test_support;

fn empty_context() -> Context {
    Context::new(Collection::empty())
}

#[test]
fn prop_addition_commutative() {
    fn prop(a: i32, b: i32) -> bool {
        let engine = test_support::engine();
        let ctx = empty_context();
        let left = engine.evaluate_expr(&format!("({a}) + ({b})"), &ctx).unwrap();
        let right = engine.evaluate_expr(&format!("({b}) + ({a})"), &ctx).unwrap();
        left == right
    }
    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(i32, i32) -> bool);
}

#[test]
fn prop_div_mod_reconstructs() {
    fn prop(a: i32, b: i32) -> TestResult {
        if b == 0 {
            return TestResult::discard();
        }
        let engine = test_support::engine();
        let ctx = empty_context();
        let expr = format!("(({a}) div ({b})) * ({b}) + (({a}) mod ({b}))");
        let result = engine.evaluate_expr(&expr, &ctx).unwrap();
        TestResult::from_bool(result.as_integer().unwrap() == i64::from(a))
    }
    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(i32, i32) -> TestResult);
}

#[test]
fn prop_string_length_matches() {
    fn prop(s: String) -> TestResult {
        if s.chars().any(|c| c == '\'' || c == '\\' || c.is_control()) {
            return TestResult::discard();
        }
        let engine = test_support::engine();
        let result = engine
            .evaluate_expr(&format!("'{s}'.length()"), &empty_context())
            .unwrap();
        TestResult::from_bool(result.as_integer().unwrap() == s.chars().count() as i64)
    }
    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(String) -> TestResult);
}

#[test]
fn prop_where_true_is_identity() {
    fn prop(values: Vec<i16>) -> bool {
        let engine = test_support::engine();
        let literal = values
            .iter()
            .map(|v| format!("({v})"))
            .collect::<Vec<_>>()
            .join(" | ");
        if literal.is_empty() {
            return true;
        }
        let ctx = empty_context();
        let all = engine.evaluate_expr(&literal, &ctx).unwrap();
        let filtered = engine
            .evaluate_expr(&format!("({literal}).where(true)"), &ctx)
            .unwrap();
        all == filtered
    }
    QuickCheck::new()
        .tests(100)
        .quickcheck(prop as fn(Vec<i16>) -> bool);
}
