//! Verdict CLI
//!
//! Loads a ruleset configuration and a JSON context, then evaluates rules,
//! rulesets or the whole batch and prints the results.

use anyhow::{Context as _, Result};
use clap::Parser;
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};
use verdict_core::{Context, EngineOptions, RuleEngine, RuleResult, RulesetResult};

/// Evaluate rules and rulesets from a YAML configuration.
#[derive(Parser, Debug)]
#[command(name = "verdict", version, about)]
struct Cli {
    /// Ruleset configuration file (YAML).
    #[arg(long, short)]
    config: PathBuf,

    /// Environment overlay to apply.
    #[arg(long, short, default_value = "")]
    environment: String,

    /// Evaluation context as a JSON object file.
    #[arg(long)]
    context: Option<PathBuf>,

    /// Rule to evaluate; may be repeated.
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Ruleset to evaluate; may be repeated.
    #[arg(long = "ruleset")]
    rulesets: Vec<String>,

    /// Evaluate every ruleset under the execution policy deadline.
    #[arg(long)]
    all: bool,

    /// Fold constant sub-expressions at compile time.
    #[arg(long)]
    optimise: bool,

    /// Output format.
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut engine = RuleEngine::builder()
        .config_path(&cli.config)
        .environment(&cli.environment)
        .options(EngineOptions {
            optimise: cli.optimise,
        })
        .build()
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let context = match &cli.context {
        Some(path) => load_context(path)?,
        None => Context::new(),
    };
    engine.set_context(context);

    let mut report = Report::default();

    for name in &cli.rules {
        let result = engine.evaluate_rule(name)?;
        report.rule(&cli.format, &result);
    }

    for name in &cli.rulesets {
        let result = engine.evaluate_ruleset(name)?;
        report.ruleset(&cli.format, &result);
    }

    if cli.all || (cli.rules.is_empty() && cli.rulesets.is_empty()) {
        let outcome = engine.evaluate_all();
        for result in outcome.results.values() {
            report.ruleset(&cli.format, result);
        }
        if let Some(error) = outcome.error {
            report.batch_error(&cli.format, &error.to_string());
        }
    }

    if let OutputFormat::Json = cli.format {
        println!("{}", serde_json::to_string_pretty(&report.json)?);
    }

    debug!(failures = report.failures, "evaluation finished");
    Ok(if report.failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_context(path: &Path) -> Result<Context> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read context {}", path.display()))?;
    Context::from_json_str(&text).with_context(|| format!("invalid context {}", path.display()))
}

#[derive(Default)]
struct Report {
    json: Vec<JsonValue>,
    failures: usize,
}

impl Report {
    fn rule(&mut self, format: &OutputFormat, result: &RuleResult) {
        if !result.passed {
            self.failures += 1;
        }
        match format {
            OutputFormat::Text => println!("rule {}", rule_line(result)),
            OutputFormat::Json => self.json.push(json!({"rule": rule_json(result)})),
        }
    }

    fn ruleset(&mut self, format: &OutputFormat, result: &RulesetResult) {
        if !result.passed {
            self.failures += 1;
        }
        match format {
            OutputFormat::Text => {
                let mut line = format!(
                    "ruleset {}: {} ({:?})",
                    result.ruleset_name,
                    verdict(result.passed),
                    result.duration
                );
                if let Some(error) = &result.error {
                    line.push_str(&format!(" - {}", error));
                }
                println!("{}", line);
                for rule in result.rule_results.values() {
                    println!("  {}", rule_line(rule));
                }
            }
            OutputFormat::Json => {
                let rules: Vec<JsonValue> = result.rule_results.values().map(rule_json).collect();
                self.json.push(json!({
                    "ruleset": {
                        "name": result.ruleset_name,
                        "passed": result.passed,
                        "error": result.error.as_ref().map(ToString::to_string),
                        "duration_us": result.duration.as_micros() as u64,
                        "rules": rules,
                    }
                }));
            }
        }
    }

    fn batch_error(&mut self, format: &OutputFormat, message: &str) {
        self.failures += 1;
        match format {
            OutputFormat::Text => println!("batch stopped: {}", message),
            OutputFormat::Json => self.json.push(json!({"batch_error": message})),
        }
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

fn rule_line(result: &RuleResult) -> String {
    let mut line = format!(
        "{}: {} ({:?})",
        result.rule_name,
        verdict(result.passed),
        result.duration
    );
    if let Some(error) = &result.error {
        line.push_str(&format!(" - {}", error));
    }
    line
}

fn rule_json(result: &RuleResult) -> JsonValue {
    json!({
        "name": result.rule_name,
        "passed": result.passed,
        "value": result.value.as_ref().map(|v| v.to_json()),
        "error": result.error.as_ref().map(ToString::to_string),
        "duration_us": result.duration.as_micros() as u64,
    })
}
