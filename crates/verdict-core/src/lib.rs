//! Declarative rule and ruleset evaluation.
//!
//! Rules are boolean expressions over a runtime context. Rulesets combine
//! rules with AND/OR selectors, and an execution policy decides whether AND
//! rulesets stop at the first failure and how long a full batch may run.
//!
//! ```
//! use verdict_core::{Context, RuleEngine, RulesetConfig, ExpressionCompiler};
//! use std::sync::Arc;
//!
//! let config: RulesetConfig = r#"
//! globals: { min_age: 18 }
//! rules:
//!   adult: { expression: "user.age >= globals.min_age" }
//! execution_policies:
//!   strict: { stop_on_failure: true }
//! error_handling:
//!   execution_policy: strict
//! "#.parse().unwrap();
//!
//! let mut engine = RuleEngine::new(config, "", Arc::new(ExpressionCompiler::new())).unwrap();
//! engine.set_context(Context::from_json(serde_json::json!({"user": {"age": 21}})).unwrap());
//! assert!(engine.evaluate_rule("adult").unwrap().passed);
//! ```

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod engine;
pub mod interpreter;
pub mod parser;
pub mod policy;
pub mod program;
pub mod value;

// Test utilities (available in tests and when used as a dependency with the feature)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::ProgramCache;
pub use compiler::{CompileError, ExpressionCompiler};
pub use config::{Rule, Ruleset, RulesetConfig, Selector};
pub use context::{build_evaluation_context, Context};
pub use engine::{
    BatchOutcome, EngineOptions, EvaluationError, RuleEngine, RuleEngineBuilder, RuleResult,
    RulesetResult,
};
pub use interpreter::EvalError;
pub use policy::Policy;
pub use program::{ExpressionEngine, Program};
pub use value::Value;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("execution policy '{0}' not found in config")]
    PolicyNotFound(String),

    #[error("invalid max_execution_time '{value}' in policy '{policy}'")]
    InvalidDuration {
        policy: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("failed to compile '{name}': {source}")]
    Compile {
        name: String,
        #[source]
        source: CompileError,
    },

    #[error("program '{name}' is defined by both {existing} and {duplicate}")]
    DuplicateProgram {
        name: String,
        existing: String,
        duplicate: String,
    },

    #[error("inheritance cycle at rule '{rule}': {}", chain.join(" -> "))]
    InheritanceCycle { rule: String, chain: Vec<String> },

    #[error("rule '{rule}' extends unknown rule '{parent}'")]
    DanglingExtends { rule: String, parent: String },

    #[error("no expression engine configured")]
    MissingExpressionEngine,

    #[error("no configuration provided")]
    MissingConfig,

    #[error("rule '{0}' not found")]
    RuleNotFound(String),

    #[error("ruleset '{0}' not found")]
    RulesetNotFound(String),

    #[error("execution timed out after {limit:?} before ruleset '{ruleset}'")]
    Timeout { ruleset: String, limit: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
