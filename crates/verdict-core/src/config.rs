//! Ruleset configuration document and environment overlay

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Free-form constants exposed to expressions as `globals`
pub type Globals = serde_json::Map<String, serde_json::Value>;

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesetConfig {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub globals: Globals,
    #[serde(default)]
    pub rules: IndexMap<String, Rule>,
    #[serde(default)]
    pub rulesets: IndexMap<String, Ruleset>,
    #[serde(default)]
    pub execution_policies: IndexMap<String, ExecutionPolicy>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub environments: IndexMap<String, Environment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A named boolean expression
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expression: String,
    /// Parent rule that must also pass
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub extends: Option<String>,
}

impl Rule {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Self::default()
        }
    }

    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// The extended rule, ignoring a blank name
    pub fn parent(&self) -> Option<&str> {
        non_blank(self.extends.as_deref())
    }
}

impl Ruleset {
    /// The inline expression, ignoring a blank one
    pub fn inline_expression(&self) -> Option<&str> {
        non_blank(self.expression.as_deref())
    }

    /// The extended rule, ignoring a blank name
    pub fn parent(&self) -> Option<&str> {
        non_blank(self.extends.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Empty strings in optional fields mean the field is absent
fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// How a ruleset combines member results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selector {
    /// Every member must pass. Also used for empty or unrecognised values.
    #[default]
    And,
    /// At least one member must pass
    Or,
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("or") {
            Selector::Or
        } else {
            Selector::And
        }
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::And => write!(f, "AND"),
            Selector::Or => write!(f, "OR"),
        }
    }
}

/// A named combination of rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "combination_type")]
    pub selector: Selector,
    #[serde(default)]
    pub rules: Vec<String>,
    /// Rules scoped to this ruleset, evaluated as `<ruleset>.<name>`
    #[serde(default)]
    pub custom_rules: BTreeMap<String, Rule>,
    /// Inline expression, evaluated as `ruleset.<name>`
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub expression: Option<String>,
    /// A top-level rule folded in ahead of the other members
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stop_on_failure: bool,
    /// Duration text such as `250ms` or `5s`; empty means the default
    #[serde(default)]
    pub max_execution_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandling {
    /// Name of the active execution policy
    #[serde(default)]
    pub execution_policy: String,
    /// Rule or ruleset name to failure message
    #[serde(default)]
    pub custom_error_messages: BTreeMap<String, String>,
}

/// Per-deployment overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub globals: Globals,
    /// Shorthand for `error_handling.execution_policy`; the nested field wins
    #[serde(default)]
    pub execution_policy: String,
    /// Shorthand for `error_handling.custom_error_messages`; nested entries win
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_error_messages: BTreeMap<String, String>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

impl Environment {
    fn messages(&self) -> impl Iterator<Item = (&String, &String)> {
        self.custom_error_messages
            .iter()
            .chain(&self.error_handling.custom_error_messages)
    }

    fn execution_policy(&self) -> &str {
        if self.error_handling.execution_policy.is_empty() {
            &self.execution_policy
        } else {
            &self.error_handling.execution_policy
        }
    }
}

impl RulesetConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        debug!(
            path = %path.display(),
            rules = config.rules.len(),
            rulesets = config.rulesets.len(),
            "loaded ruleset config"
        );
        Ok(config)
    }

    /// Serialize back to YAML
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Overlay the named environment onto this configuration.
    ///
    /// Unknown or empty names leave the configuration untouched. Returns
    /// whether an environment was applied. Applying the same environment
    /// twice yields the same result as applying it once.
    pub fn apply_environment(&mut self, environment: &str) -> bool {
        let Some(env) = self.environments.get(environment) else {
            debug!(environment, "no environment overlay applied");
            return false;
        };

        for (key, value) in &env.globals {
            self.globals.insert(key.clone(), value.clone());
        }

        let policy = env.execution_policy();
        if !policy.is_empty() {
            self.error_handling.execution_policy = policy.to_string();
        }

        for (key, message) in env.messages() {
            self.error_handling
                .custom_error_messages
                .insert(key.clone(), message.clone());
        }

        debug!(
            environment,
            globals = env.globals.len(),
            policy = %self.error_handling.execution_policy,
            "applied environment overlay"
        );
        true
    }

    /// Custom failure message for a rule or ruleset, if configured
    pub fn custom_error_message(&self, name: &str) -> Option<&str> {
        self.error_handling
            .custom_error_messages
            .get(name)
            .map(String::as_str)
    }
}

impl std::str::FromStr for RulesetConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_yaml_str(s)
    }
}
