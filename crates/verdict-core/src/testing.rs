//! Test utilities and helper functions
//!
//! Provides the reference configuration used across the test suites plus a
//! small builder for evaluation contexts, so individual tests only spell out
//! the fields they care about.

use crate::compiler::ExpressionCompiler;
use crate::config::RulesetConfig;
use crate::context::Context;
use crate::engine::RuleEngine;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

/// Reference configuration: six rules, three rulesets, two execution
/// policies and a development/production overlay.
pub const SAMPLE_CONFIG: &str = r#"
apiVersion: v1
kind: RulesetConfig
metadata:
  name: cel-rulesets-example
  description: Examples of CEL rule combinations and patterns

globals:
  min_age: 13
  max_retries: 5
  business_hours_start: 9
  business_hours_end: 17
  allowed_domains:
    - example.com
    - test.org

rules:
  age_validation:
    name: Age Validation
    description: Validates user age requirements
    expression: user.age >= globals.min_age
  email_format:
    name: Email Format Check
    description: Validates email format using regex
    expression: |
      user.email.matches("^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\\.[a-zA-Z]{2,}$")
  business_hours:
    name: Business Hours Check
    description: Validates if the request falls within business hours
    expression: |
      timestamp(request.time).getHours() >= globals.business_hours_start &&
      timestamp(request.time).getHours() < globals.business_hours_end
  rate_limiting:
    name: Rate Limiting
    description: Checks request rate limits
    expression: request.attempt <= globals.max_retries
  user_status:
    name: User Status Check
    description: Validates user account status
    expression: user.status == 'active' && !user.suspended
  user_tier:
    name: User Tier Check
    description: Validates user account tier
    expression: user.tier == 'premium' || user.tier == 'enterprise'

rulesets:
  user_registration:
    name: User Registration Validation
    description: All rules must pass for successful registration
    selector: AND
    rules:
      - age_validation
      - email_format
      - user_status
  request_throttling:
    name: Request Throttling Check
    description: At least one rule must pass to allow request
    selector: OR
    rules:
      - rate_limiting
      - user_tier
  domain_whitelist:
    name: Domain Whitelist Check
    description: Validates if email domain is in the allowed list
    expression: |
      globals.allowed_domains.exists(domain, user.email.endsWith('@' + domain))
    extends: email_format

execution_policies:
  fail_fast:
    name: Fail Fast Execution
    description: Stop execution on first rule failure
    stop_on_failure: true
    max_execution_time: 1ns
  collect_all:
    name: Collect All Results
    description: Execute all rules regardless of failures
    stop_on_failure: false
    max_execution_time: ""
  default_policy:
    name: Default Policy
    description: Stop on failure with the default time budget
    stop_on_failure: true

error_handling:
  execution_policy: collect_all
  custom_error_messages:
    age_validation: user must be at least 18 years old
    email_format: please provide a valid email address
    domain_whitelist: email domain is not allowed
    business_hours: service only available during business hours (9 AM - 5 PM)
    request_throttling: too many requests, please try again later

environments:
  development:
    globals:
      min_age: 13
    error_handling:
      execution_policy: ""
  production:
    globals:
      min_age: 18
    error_handling:
      execution_policy: fail_fast
      custom_error_messages:
        user_status: account is not active
"#;

/// Parse [`SAMPLE_CONFIG`]
pub fn sample_config() -> RulesetConfig {
    RulesetConfig::from_yaml_str(SAMPLE_CONFIG).expect("sample config parses")
}

/// Engine over [`SAMPLE_CONFIG`] with the bundled compiler
pub fn sample_engine(environment: &str) -> RuleEngine {
    RuleEngine::new(
        sample_config(),
        environment,
        Arc::new(ExpressionCompiler::new()),
    )
    .expect("sample engine builds")
}

/// A context in which every sample rule passes
pub fn passing_context() -> Context {
    ContextBuilder::new().build()
}

/// Builds evaluation contexts starting from a user and request that satisfy
/// every rule in [`SAMPLE_CONFIG`].
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    user: Map<String, JsonValue>,
    request: Map<String, JsonValue>,
    extra: Map<String, JsonValue>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            user: object(json!({
                "age": 25,
                "email": "alice@example.com",
                "status": "active",
                "suspended": false,
                "tier": "premium"
            })),
            request: object(json!({
                "attempt": 1,
                "time": "2024-01-15T10:00:00Z"
            })),
            extra: Map::new(),
        }
    }

    /// Set a field under `user`
    pub fn user(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.user.insert(key.to_string(), value.into());
        self
    }

    /// Remove a field from `user`
    pub fn without_user(mut self, key: &str) -> Self {
        self.user.remove(key);
        self
    }

    /// Set a field under `request`
    pub fn request(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.request.insert(key.to_string(), value.into());
        self
    }

    /// Set any other top-level binding
    pub fn binding(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Context {
        let mut root = self.extra;
        root.insert("user".to_string(), JsonValue::Object(self.user));
        root.insert("request".to_string(), JsonValue::Object(self.request));
        Context::from_json(JsonValue::Object(root)).expect("object context")
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn object(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}
