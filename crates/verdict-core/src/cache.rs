//! Compiled program cache and rule inheritance chains

use crate::config::RulesetConfig;
use crate::program::{ExpressionEngine, Program};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Prefix for programs compiled from inline ruleset expressions
pub const RULESET_EXPRESSION_PREFIX: &str = "ruleset";

/// Program name of a ruleset's custom rule
pub fn custom_rule_name(ruleset: &str, custom: &str) -> String {
    format!("{}.{}", ruleset, custom)
}

/// Program name of a ruleset's inline expression
pub fn ruleset_expression_name(ruleset: &str) -> String {
    format!("{}.{}", RULESET_EXPRESSION_PREFIX, ruleset)
}

/// Every compiled program of a configuration, keyed by qualified name
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<String, Arc<dyn Program>>,
    /// Ancestors to evaluate before a rule, immediate parent first
    chains: HashMap<String, Vec<String>>,
}

impl ProgramCache {
    /// Compile every rule, custom rule and inline ruleset expression once
    /// and precompute inheritance chains.
    pub fn build(config: &RulesetConfig, engine: &dyn ExpressionEngine) -> Result<Self> {
        let mut cache = Self::default();
        let mut origins = HashMap::new();

        for (name, rule) in &config.rules {
            let origin = format!("rule '{}'", name);
            cache.compile(engine, &mut origins, name.clone(), origin, &rule.expression)?;
        }

        for (ruleset_name, ruleset) in &config.rulesets {
            for (custom, rule) in &ruleset.custom_rules {
                let origin = format!("custom rule '{}' of ruleset '{}'", custom, ruleset_name);
                let name = custom_rule_name(ruleset_name, custom);
                cache.compile(engine, &mut origins, name, origin, &rule.expression)?;
            }
            if let Some(expression) = ruleset.inline_expression() {
                let origin = format!("expression of ruleset '{}'", ruleset_name);
                let name = ruleset_expression_name(ruleset_name);
                cache.compile(engine, &mut origins, name, origin, expression)?;
            }
        }

        for (name, rule) in &config.rules {
            if let Some(parent) = rule.parent() {
                let chain = resolve_chain(config, name, parent)?;
                cache.chains.insert(name.clone(), chain);
            }
        }

        for (ruleset_name, ruleset) in &config.rulesets {
            for (custom, rule) in &ruleset.custom_rules {
                if let Some(parent) = rule.parent() {
                    let qualified = custom_rule_name(ruleset_name, custom);
                    let chain = resolve_chain(config, &qualified, parent)?;
                    cache.chains.insert(qualified, chain);
                }
            }
        }

        debug!(
            programs = cache.programs.len(),
            chains = cache.chains.len(),
            "compiled program cache"
        );
        Ok(cache)
    }

    /// Compile one program. `origins` maps each name taken so far to the
    /// definition that took it.
    fn compile(
        &mut self,
        engine: &dyn ExpressionEngine,
        origins: &mut HashMap<String, String>,
        name: String,
        origin: String,
        source: &str,
    ) -> Result<()> {
        if let Some(existing) = origins.get(&name) {
            return Err(Error::DuplicateProgram {
                name,
                existing: existing.clone(),
                duplicate: origin,
            });
        }

        let program = engine
            .compile(source)
            .map_err(|source| Error::Compile {
                name: name.clone(),
                source,
            })?;
        origins.insert(name.clone(), origin);
        self.programs.insert(name, program);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Program>> {
        self.programs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Ancestors of `name`, immediate parent first; empty when it extends nothing
    pub fn chain(&self, name: &str) -> &[String] {
        self.chains.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }
}

/// Walk `extends` links through the top-level rule table
fn resolve_chain<'a>(
    config: &'a RulesetConfig,
    name: &'a str,
    parent: &'a str,
) -> Result<Vec<String>> {
    let mut chain = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([name]);
    let mut child = name;
    let mut next = Some(parent);

    while let Some(parent) = next {
        if !seen.insert(parent) {
            let mut path: Vec<String> = std::iter::once(name.to_string()).chain(chain).collect();
            path.push(parent.to_string());
            return Err(Error::InheritanceCycle {
                rule: name.to_string(),
                chain: path,
            });
        }

        let rule = config.rules.get(parent).ok_or_else(|| Error::DanglingExtends {
            rule: child.to_string(),
            parent: parent.to_string(),
        })?;

        chain.push(parent.to_string());
        child = parent;
        next = rule.parent();
    }

    Ok(chain)
}
