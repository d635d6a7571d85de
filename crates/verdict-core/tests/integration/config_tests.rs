//! Configuration loading, overlays and construction errors

use super::FIXTURE;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use verdict_core::{CompileError, Error, RuleEngine, RulesetConfig, Selector};

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_fixture_loads() {
    let config = RulesetConfig::from_file(FIXTURE).unwrap();

    assert_eq!(config.metadata.name, "checkout-rules");
    assert_eq!(config.rules.len(), 7);
    assert_eq!(config.rulesets["discount"].selector, Selector::Or);
    assert_eq!(config.rulesets["high_value"].custom_rules.len(), 2);
    assert_eq!(config.rules["trusted"].extends.as_deref(), Some("verified"));
}

#[test]
fn test_overlay_keeps_untouched_globals() {
    let base = RulesetConfig::from_file(FIXTURE).unwrap();
    let mut staged = base.clone();
    assert!(staged.apply_environment("staging"));

    assert_eq!(staged.globals["max_amount"], json!(500));
    for key in ["min_age", "supported_currencies", "blocked_countries"] {
        assert_eq!(staged.globals[key], base.globals[key], "{} changed", key);
    }
    assert_eq!(staged.error_handling.execution_policy, "strict");
    assert_eq!(
        staged.error_handling.custom_error_messages,
        base.error_handling.custom_error_messages
    );
}

#[test]
fn test_engine_reports_overlayed_config() {
    let engine = RuleEngine::from_file(FIXTURE, "staging").unwrap();
    assert_eq!(engine.config().globals["max_amount"], json!(500));

    let engine = RuleEngine::from_file(FIXTURE, "no_such_env").unwrap();
    assert_eq!(engine.config().globals["max_amount"], json!(10000));
    assert!(!engine.policy().stop_on_failure);
    assert_eq!(engine.policy().max_execution_time, Duration::from_secs(5));
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        RuleEngine::from_file("/no/such/rules.yml", ""),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_invalid_yaml_file() {
    let file = write_config("rules: {adult: [");
    assert!(matches!(
        RuleEngine::from_file(file.path(), ""),
        Err(Error::Yaml(_))
    ));
}

#[test]
fn test_invalid_duration_fails_construction() {
    let file = write_config(
        r#"
execution_policies:
  slow: { stop_on_failure: true, max_execution_time: "a while" }
error_handling:
  execution_policy: slow
"#,
    );

    let err = RuleEngine::from_file(file.path(), "").unwrap_err();
    match err {
        Error::InvalidDuration { policy, value, .. } => {
            assert_eq!(policy, "slow");
            assert_eq!(value, "a while");
        }
        other => panic!("Expected invalid duration, got {:?}", other),
    }
}

#[test]
fn test_missing_policy_fails_construction() {
    let file = write_config("rules: {ok: {expression: 'true'}}\n");
    let err = RuleEngine::from_file(file.path(), "").unwrap_err();
    assert!(matches!(err, Error::PolicyNotFound(ref name) if name.is_empty()));
}

#[test]
fn test_cycle_fails_construction() {
    let file = write_config(
        r#"
rules:
  a: { expression: "true", extends: b }
  b: { expression: "true", extends: c }
  c: { expression: "true", extends: a }
execution_policies:
  p: { stop_on_failure: true }
error_handling:
  execution_policy: p
"#,
    );

    match RuleEngine::from_file(file.path(), "").unwrap_err() {
        Error::InheritanceCycle { rule, chain } => {
            assert_eq!(rule, "a");
            assert_eq!(chain, vec!["a", "b", "c", "a"]);
        }
        other => panic!("Expected inheritance cycle, got {:?}", other),
    }
}

#[test]
fn test_compile_error_names_custom_rule() {
    let file = write_config(
        r#"
rulesets:
  rs:
    custom_rules:
      broken: { expression: "user.name.matches('[')" }
execution_policies:
  p: {}
error_handling:
  execution_policy: p
"#,
    );

    match RuleEngine::from_file(file.path(), "").unwrap_err() {
        Error::Compile { name, source } => {
            assert_eq!(name, "rs.broken");
            assert!(matches!(source, CompileError::InvalidRegex { .. }));
        }
        other => panic!("Expected compile error, got {:?}", other),
    }
}

#[test]
fn test_yaml_roundtrip_of_fixture() {
    let config = RulesetConfig::from_file(FIXTURE).unwrap();
    let reparsed = RulesetConfig::from_yaml_str(&config.to_yaml_string().unwrap()).unwrap();
    assert_eq!(reparsed, config);
}
