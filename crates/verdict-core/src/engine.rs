use crate::cache::{custom_rule_name, ruleset_expression_name, ProgramCache};
use crate::compiler::ExpressionCompiler;
use crate::config::{RulesetConfig, Selector};
use crate::context::{build_evaluation_context, Context};
use crate::interpreter::EvalError;
use crate::policy::Policy;
use crate::program::{ExpressionEngine, Program};
use crate::value::Value;
use crate::{Error, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tracing::{debug, info, instrument, trace, warn};

/// Why a rule did not pass
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// The expression could not be evaluated against the context
    #[error(transparent)]
    Runtime(#[from] EvalError),

    /// The expression evaluated cleanly but not to `true`
    #[error("{0}")]
    Failed(String),

    #[error("rule '{0}' is not defined")]
    Unresolved(String),
}

impl EvaluationError {
    pub fn is_runtime(&self) -> bool {
        matches!(self, EvaluationError::Runtime(_))
    }
}

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub rule_name: String,
    pub passed: bool,
    /// Value of the last evaluated program in the chain
    pub value: Option<Value>,
    pub error: Option<EvaluationError>,
    pub duration: Duration,
}

/// Outcome of one ruleset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulesetResult {
    pub ruleset_name: String,
    pub passed: bool,
    /// Member results in evaluation order
    pub rule_results: IndexMap<String, RuleResult>,
    /// Set only when the ruleset did not pass
    pub error: Option<EvaluationError>,
    pub duration: Duration,
}

/// Results of a batch run, kept even when the batch stopped early
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: IndexMap<String, RulesetResult>,
    pub error: Option<Error>,
}

impl BatchOutcome {
    /// Every ruleset was evaluated
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Drop partial results in favour of the error, if any
    pub fn into_result(self) -> Result<IndexMap<String, RulesetResult>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

/// Engine construction options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Fold constant sub-expressions when the bundled compiler is used
    pub optimise: bool,
}

/// Evaluates rules and rulesets of one configuration against a context.
///
/// Configuration and compiled programs are fixed at construction. The
/// context is replaced through [`RuleEngine::set_context`].
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: Arc<RulesetConfig>,
    programs: Arc<ProgramCache>,
    policy: Policy,
    context: Context,
}

impl RuleEngine {
    /// Apply `environment`, resolve the execution policy and compile every
    /// expression with `engine`.
    pub fn new(
        mut config: RulesetConfig,
        environment: &str,
        engine: Arc<dyn ExpressionEngine>,
    ) -> Result<Self> {
        config.apply_environment(environment);
        let policy = config.execution_policy()?;
        let programs = ProgramCache::build(&config, engine.as_ref())?;
        let context = build_evaluation_context(Context::new(), &config.globals);

        info!(
            environment,
            rules = config.rules.len(),
            rulesets = config.rulesets.len(),
            programs = programs.len(),
            policy = %config.error_handling.execution_policy,
            "rule engine ready"
        );

        Ok(Self {
            config: Arc::new(config),
            programs: Arc::new(programs),
            policy,
            context,
        })
    }

    /// Load a YAML file and build an engine with the bundled compiler
    pub fn from_file(path: impl AsRef<Path>, environment: &str) -> Result<Self> {
        let config = RulesetConfig::from_file(path)?;
        Self::new(config, environment, Arc::new(ExpressionCompiler::new()))
    }

    pub fn builder() -> RuleEngineBuilder {
        RuleEngineBuilder::default()
    }

    /// The configuration after the environment overlay
    pub fn config(&self) -> &RulesetConfig {
        &self.config
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Replace the evaluation context.
    ///
    /// `globals`, `now` and `timestamp` are injected on top and win over any
    /// caller-supplied binding of the same name.
    pub fn set_context(&mut self, context: Context) {
        self.context = build_evaluation_context(context, &self.config.globals);
    }

    /// Evaluate a rule together with the rules it extends
    pub fn evaluate_rule(&self, name: &str) -> Result<RuleResult> {
        let program = self
            .programs
            .get(name)
            .ok_or_else(|| Error::RuleNotFound(name.to_string()))?;
        Ok(self.run_rule(name, program))
    }

    fn run_rule<'a>(&'a self, name: &str, program: &'a Arc<dyn Program>) -> RuleResult {
        let start = Instant::now();
        let ancestors = self
            .programs
            .chain(name)
            .iter()
            .filter_map(|parent| self.programs.get(parent));

        let mut value = None;
        let mut error = None;

        for step in ancestors.chain(std::iter::once(program)) {
            match step.evaluate(&self.context) {
                Ok(result) => {
                    let passed = result.as_bool() == Some(true);
                    trace!(rule = name, source = step.source(), %result, "evaluated rule step");
                    value = Some(result);
                    if !passed {
                        error = Some(EvaluationError::Failed(self.failure_message(name, "rule")));
                        break;
                    }
                }
                Err(err) => {
                    debug!(rule = name, source = step.source(), error = %err, "rule evaluation error");
                    error = Some(EvaluationError::Runtime(err));
                    break;
                }
            }
        }

        RuleResult {
            rule_name: name.to_string(),
            passed: error.is_none(),
            value,
            error,
            duration: start.elapsed(),
        }
    }

    fn failure_message(&self, name: &str, kind: &str) -> String {
        match self.config.custom_error_message(name) {
            Some(message) => message.to_string(),
            None => format!("{} '{}' did not pass evaluation", kind, name),
        }
    }

    /// Members of a ruleset in evaluation order: the extended rule, custom
    /// rules by name, the inline expression, then the listed rules.
    pub fn effective_rules(&self, name: &str) -> Result<Vec<String>> {
        let ruleset = self
            .config
            .rulesets
            .get(name)
            .ok_or_else(|| Error::RulesetNotFound(name.to_string()))?;

        let mut members = Vec::with_capacity(ruleset.rules.len() + ruleset.custom_rules.len() + 2);
        if let Some(parent) = ruleset.parent() {
            if self.config.rules.contains_key(parent) && self.programs.contains(parent) {
                members.push(parent.to_string());
            }
        }
        members.extend(
            ruleset
                .custom_rules
                .keys()
                .map(|custom| custom_rule_name(name, custom)),
        );
        if ruleset.inline_expression().is_some() {
            members.push(ruleset_expression_name(name));
        }
        members.extend(ruleset.rules.iter().cloned());
        Ok(members)
    }

    /// Evaluate every member of a ruleset and combine them with its selector
    #[instrument(skip(self), fields(passed = tracing::field::Empty))]
    pub fn evaluate_ruleset(&self, name: &str) -> Result<RulesetResult> {
        let start = Instant::now();
        let members = self.effective_rules(name)?;
        let selector = self.config.rulesets[name].selector;
        let stop_early = selector == Selector::And && self.policy.stop_on_failure;

        let mut rule_results = IndexMap::with_capacity(members.len());
        let mut unresolved = false;

        for member in members {
            let Some(program) = self.programs.get(&member) else {
                warn!(ruleset = name, rule = %member, "ruleset member is not defined");
                rule_results.insert(
                    member.clone(),
                    RuleResult {
                        rule_name: member.clone(),
                        passed: false,
                        value: None,
                        error: Some(EvaluationError::Unresolved(member)),
                        duration: Duration::ZERO,
                    },
                );
                unresolved = true;
                break;
            };

            let result = self.run_rule(&member, program);
            let failed = !result.passed;
            rule_results.insert(member, result);
            if failed && stop_early {
                break;
            }
        }

        let passed = !unresolved
            && match selector {
                Selector::And => rule_results.values().all(|r| r.passed),
                Selector::Or => rule_results.values().any(|r| r.passed),
            };
        tracing::Span::current().record("passed", passed);

        Ok(RulesetResult {
            ruleset_name: name.to_string(),
            passed,
            error: (!passed).then(|| EvaluationError::Failed(self.failure_message(name, "ruleset"))),
            rule_results,
            duration: start.elapsed(),
        })
    }

    /// Evaluate every ruleset in declaration order under the policy's
    /// time budget. The deadline is checked before each ruleset.
    #[instrument(skip(self))]
    pub fn evaluate_all(&self) -> BatchOutcome {
        let limit = self.policy.max_execution_time;
        let deadline = Instant::now().checked_add(limit);
        let mut results = IndexMap::with_capacity(self.config.rulesets.len());

        for name in self.config.rulesets.keys() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    ruleset = %name,
                    limit = ?limit,
                    completed = results.len(),
                    "execution deadline exceeded"
                );
                return BatchOutcome {
                    results,
                    error: Some(Error::Timeout {
                        ruleset: name.clone(),
                        limit,
                    }),
                };
            }

            match self.evaluate_ruleset(name) {
                Ok(result) => {
                    results.insert(name.clone(), result);
                }
                Err(error) => return BatchOutcome { results, error: Some(error) },
            }
        }

        BatchOutcome {
            results,
            error: None,
        }
    }
}

/// Builder for [`RuleEngine`]
pub struct RuleEngineBuilder {
    config: Option<RulesetConfig>,
    config_path: Option<PathBuf>,
    environment: String,
    engine: Option<Arc<dyn ExpressionEngine>>,
    options: EngineOptions,
    use_default_engine: bool,
}

impl Default for RuleEngineBuilder {
    fn default() -> Self {
        Self {
            config: None,
            config_path: None,
            environment: String::new(),
            engine: None,
            options: EngineOptions::default(),
            use_default_engine: true,
        }
    }
}

impl RuleEngineBuilder {
    pub fn config(mut self, config: RulesetConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a YAML file; ignored when `config` is set
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn expression_engine(mut self, engine: Arc<dyn ExpressionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Options for the bundled compiler; an explicit engine is used as is
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Fall back to [`ExpressionCompiler`] when no engine is given
    pub fn use_default_engine(mut self, enabled: bool) -> Self {
        self.use_default_engine = enabled;
        self
    }

    pub fn build(self) -> Result<RuleEngine> {
        let engine: Arc<dyn ExpressionEngine> = match self.engine {
            Some(engine) => engine,
            None if self.use_default_engine => Arc::new(
                ExpressionCompiler::new().with_optimise(self.options.optimise),
            ),
            None => return Err(Error::MissingExpressionEngine),
        };

        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => RulesetConfig::from_file(path)?,
            (None, None) => return Err(Error::MissingConfig),
        };

        RuleEngine::new(config, &self.environment, engine)
    }
}
