//! End-to-end evaluation against the checkout fixture

use super::{context, customer, fixture_engine, patched, FIXTURE};
use serde_json::json;
use std::time::Duration;
use verdict_core::{
    EngineOptions, Error, EvalError, EvaluationError, RuleEngine, Value,
};

#[test]
fn test_every_rule_passes_for_good_customer() {
    let mut engine = fixture_engine("");
    engine.set_context(context(customer()));

    for name in engine.config().rules.keys().filter(|n| *n != "has_coupon") {
        let result = engine.evaluate_rule(name).unwrap();
        assert!(result.passed, "{} failed: {:?}", name, result.error);
    }
}

#[test]
fn test_inheritance_chain_failure_uses_rule_message() {
    let mut engine = fixture_engine("");
    engine.set_context(context(patched(customer(), json!({"user": {"age": 16}}))));

    let adult = engine.evaluate_rule("adult").unwrap();
    assert_eq!(
        adult.error,
        Some(EvaluationError::Failed("customer must be an adult".to_string()))
    );

    // `trusted` extends `verified` extends `adult`; the failing ancestor
    // stops the walk and the message belongs to the requested rule
    let trusted = engine.evaluate_rule("trusted").unwrap();
    assert!(!trusted.passed);
    assert_eq!(trusted.value, Some(Value::Bool(false)));
    assert_eq!(
        trusted.error,
        Some(EvaluationError::Failed(
            "rule 'trusted' did not pass evaluation".to_string()
        ))
    );
}

#[test]
fn test_chain_runtime_error_passes_through() {
    let mut engine = fixture_engine("");
    let mut json = customer();
    json["user"].as_object_mut().unwrap().remove("verified");
    engine.set_context(context(json));

    let result = engine.evaluate_rule("trusted").unwrap();
    assert_eq!(
        result.error,
        Some(EvaluationError::Runtime(EvalError::NoSuchKey(
            "verified".to_string()
        )))
    );
}

#[test]
fn test_checkout_collects_all_failures_when_lenient() {
    let mut engine = fixture_engine("");
    engine.set_context(context(patched(
        customer(),
        json!({"payment": {"amount": 50000, "currency": "JPY"}}),
    )));

    let result = engine.evaluate_ruleset("checkout").unwrap();
    assert!(!result.passed);
    assert_eq!(result.rule_results.len(), 4);
    assert!(!result.rule_results["amount_limit"].passed);
    assert!(!result.rule_results["currency_supported"].passed);
    assert_eq!(
        result.error,
        Some(EvaluationError::Failed("checkout blocked".to_string()))
    );
}

#[test]
fn test_staging_overlay_and_fail_fast() {
    let mut engine = fixture_engine("staging");
    assert!(engine.policy().stop_on_failure);
    assert_eq!(engine.policy().max_execution_time, Duration::from_secs(2));
    engine.set_context(context(customer()));

    // 1500 exceeds the staging limit of 500
    let result = engine.evaluate_ruleset("checkout").unwrap();
    assert!(!result.passed);
    let names: Vec<&str> = result.rule_results.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["verified", "amount_limit"]);
}

#[test]
fn test_or_ruleset_passes_on_any_member() {
    let mut engine = fixture_engine("staging");

    engine.set_context(context(customer()));
    let trusted_only = engine.evaluate_ruleset("discount").unwrap();
    assert!(trusted_only.passed);
    assert!(!trusted_only.rule_results["has_coupon"].passed);
    assert!(trusted_only.rule_results["trusted"].passed);

    engine.set_context(context(patched(
        customer(),
        json!({"user": {"orders": []}, "payment": {"coupon": "SAVE10"}}),
    )));
    let coupon_only = engine.evaluate_ruleset("discount").unwrap();
    assert!(coupon_only.passed);
    assert_eq!(coupon_only.rule_results.len(), 2);

    engine.set_context(context(patched(customer(), json!({"user": {"orders": []}}))));
    let neither = engine.evaluate_ruleset("discount").unwrap();
    assert!(!neither.passed);
    assert_eq!(
        neither.error,
        Some(EvaluationError::Failed(
            "ruleset 'discount' did not pass evaluation".to_string()
        ))
    );
}

#[test]
fn test_high_value_effective_members() {
    let mut engine = fixture_engine("");
    assert_eq!(
        engine.effective_rules("high_value").unwrap(),
        vec![
            "trusted",
            "high_value.card_on_file",
            "high_value.large_amount",
            "ruleset.high_value",
            "country_allowed",
        ]
    );

    engine.set_context(context(customer()));
    let result = engine.evaluate_ruleset("high_value").unwrap();
    assert!(result.passed, "{:?}", result.rule_results);
    assert_eq!(result.rule_results.len(), 5);

    engine.set_context(context(patched(customer(), json!({"payment": {"amount": 20}}))));
    let small = engine.evaluate_ruleset("high_value").unwrap();
    assert!(!small.passed);
    assert!(!small.rule_results["high_value.large_amount"].passed);
}

#[test]
fn test_evaluate_all_complete() {
    let mut engine = fixture_engine("");
    engine.set_context(context(customer()));

    let outcome = engine.evaluate_all();
    assert!(outcome.is_complete());
    let names: Vec<&str> = outcome.results.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["checkout", "discount", "high_value"]);
    assert!(outcome.results.values().all(|r| r.passed));
}

#[test]
fn test_evaluate_all_timeout_keeps_partial_results() {
    let mut engine = fixture_engine("load_test");
    engine.set_context(context(customer()));

    let outcome = engine.evaluate_all();
    assert!(!outcome.is_complete());
    assert!(outcome.results.len() < 3);
    assert!(matches!(outcome.error, Some(Error::Timeout { .. })));
    assert!(outcome.into_result().is_err());
}

#[test]
fn test_unknown_names() {
    let engine = fixture_engine("");
    assert!(matches!(
        engine.evaluate_rule("missing"),
        Err(Error::RuleNotFound(_))
    ));
    assert!(matches!(
        engine.evaluate_ruleset("unknown_ruleset"),
        Err(Error::RulesetNotFound(_))
    ));
}

#[test]
fn test_caller_globals_are_overwritten() {
    let mut engine = fixture_engine("staging");
    engine.set_context(context(patched(
        customer(),
        json!({"globals": {"max_amount": 1000000}}),
    )));

    assert!(!engine.evaluate_rule("amount_limit").unwrap().passed);
}

#[test]
fn test_builder_from_path_with_optimise() {
    let mut engine = RuleEngine::builder()
        .config_path(FIXTURE)
        .environment("staging")
        .options(EngineOptions { optimise: true })
        .build()
        .unwrap();
    engine.set_context(context(customer()));

    assert!(!engine.evaluate_ruleset("checkout").unwrap().passed);
    assert!(engine.evaluate_ruleset("discount").unwrap().passed);
}

#[test]
fn test_engine_is_shareable_across_threads() {
    let mut engine = fixture_engine("");
    engine.set_context(context(customer()));
    let engine = std::sync::Arc::new(engine);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.evaluate_ruleset("checkout").unwrap().passed)
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
