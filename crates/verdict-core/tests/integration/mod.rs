//! Integration tests for rule, ruleset and batch evaluation

mod config_tests;
mod engine_tests;
mod expression_tests;

use serde_json::json;
use verdict_core::{Context, RuleEngine};

pub const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/rules.yml");

/// Engine over the checkout fixture
pub fn fixture_engine(environment: &str) -> RuleEngine {
    RuleEngine::from_file(FIXTURE, environment).unwrap()
}

/// A customer and payment that satisfy every fixture rule except `has_coupon`
pub fn customer() -> serde_json::Value {
    json!({
        "user": {
            "age": 30,
            "verified": true,
            "orders": [101, 102, 103, 104],
            "country": "US"
        },
        "payment": {
            "amount": 1500,
            "currency": "USD",
            "card": "4111111111111111"
        }
    })
}

/// Apply a JSON merge of `patch` onto `base`, one level deep per section
pub fn patched(mut base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    if let (Some(base), Some(patch)) = (base.as_object_mut(), patch.as_object()) {
        for (section, fields) in patch {
            match (base.get_mut(section), fields.as_object()) {
                (Some(serde_json::Value::Object(target)), Some(fields)) => {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    base.insert(section.clone(), fields.clone());
                }
            }
        }
    }
    base
}

pub fn context(json: serde_json::Value) -> Context {
    Context::from_json(json).unwrap()
}
