//! Expression language through the public compiler API

use serde_json::json;
use verdict_core::{
    build_evaluation_context, CompileError, Context, EvalError, ExpressionCompiler,
    ExpressionEngine, Program, Value,
};

fn globals() -> serde_json::Map<String, serde_json::Value> {
    json!({
        "allowed_domains": ["example.com", "test.org"],
        "business_hours_start": 9,
        "business_hours_end": 17,
        "tiers": {"premium": 3, "basic": 1}
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn eval_with(source: &str, ctx: serde_json::Value) -> Result<Value, EvalError> {
    let ctx = build_evaluation_context(Context::from_json(ctx).unwrap(), &globals());
    let plain = ExpressionCompiler::new().compile(source).unwrap();
    let folded = ExpressionCompiler::new()
        .with_optimise(true)
        .compile(source)
        .unwrap();

    let result = plain.evaluate(&ctx);
    assert_eq!(
        result,
        folded.evaluate(&ctx),
        "optimise changed the result of {}",
        source
    );
    result
}

fn eval(source: &str) -> Result<Value, EvalError> {
    eval_with(
        source,
        json!({
            "user": {"email": "alice@test.org", "tier": "premium", "tags": ["a", "b", "c"]},
            "request": {"time": "2024-03-05T10:30:00Z", "attempt": 2}
        }),
    )
}

#[test]
fn test_domain_whitelist_expression() {
    let source = "globals.allowed_domains.exists(domain, user.email.endsWith('@' + domain))";
    assert_eq!(eval(source), Ok(Value::Bool(true)));

    let outsider = eval_with(source, json!({"user": {"email": "eve@evil.io"}}));
    assert_eq!(outsider, Ok(Value::Bool(false)));
}

#[test]
fn test_business_hours_expression() {
    let source = "timestamp(request.time).getHours() >= globals.business_hours_start && \
                  timestamp(request.time).getHours() < globals.business_hours_end";
    assert_eq!(eval(source), Ok(Value::Bool(true)));

    let late = eval_with(source, json!({"request": {"time": "2024-03-05T22:00:00Z"}}));
    assert_eq!(late, Ok(Value::Bool(false)));
}

#[test]
fn test_timestamp_accessors_and_durations() {
    assert_eq!(eval("timestamp(request.time).getFullYear()"), Ok(Value::Int(2024)));
    assert_eq!(eval("timestamp(request.time).getMonth()"), Ok(Value::Int(2)));
    assert_eq!(eval("timestamp(request.time).getDate()"), Ok(Value::Int(5)));
    assert_eq!(
        eval("timestamp(request.time) + duration('1h') > timestamp('2024-03-05T11:00:00Z')"),
        Ok(Value::Bool(true))
    );
    assert_eq!(eval("now() > timestamp(request.time)"), Ok(Value::Bool(true)));
}

#[test]
fn test_comprehension_macros() {
    assert_eq!(eval("user.tags.all(t, size(t) == 1)"), Ok(Value::Bool(true)));
    assert_eq!(eval("user.tags.exists_one(t, t == 'b')"), Ok(Value::Bool(true)));
    assert_eq!(eval("user.tags.exists_one(t, t != 'b')"), Ok(Value::Bool(false)));
    assert_eq!(eval("[1, 2, 3].exists(n, n % 2 == 0)"), Ok(Value::Bool(true)));
}

#[test]
fn test_maps_conditionals_and_indexing() {
    assert_eq!(eval("globals.tiers[user.tier]"), Ok(Value::Int(3)));
    assert_eq!(eval("'premium' in globals.tiers"), Ok(Value::Bool(true)));
    assert_eq!(
        eval("request.attempt > 1 ? 'retry' : 'first'"),
        Ok(Value::from("retry"))
    );
    assert_eq!(eval("{'a': 1, 'b': 2}.size()"), Ok(Value::Int(2)));
    assert_eq!(eval("user.tags[1]"), Ok(Value::from("b")));
}

#[test]
fn test_conversions() {
    assert_eq!(eval("int('42') + 1"), Ok(Value::Int(43)));
    assert_eq!(eval("double(request.attempt) / 4.0"), Ok(Value::Float(0.5)));
    assert_eq!(eval("string(request.attempt) + 'x'"), Ok(Value::from("2x")));
}

#[test]
fn test_runtime_errors() {
    assert_eq!(
        eval("user.missing"),
        Err(EvalError::NoSuchKey("missing".to_string()))
    );
    assert_eq!(
        eval("payment.amount > 0"),
        Err(EvalError::NoSuchAttribute("payment".to_string()))
    );
    assert_eq!(eval("request.attempt / 0"), Err(EvalError::DivisionByZero));
    assert!(matches!(
        eval("user.tier > 1"),
        Err(EvalError::NoMatchingOverload { .. })
    ));
    assert!(matches!(
        eval("user.tags[10]"),
        Err(EvalError::IndexOutOfRange(10))
    ));
}

#[test]
fn test_logical_operators_absorb_errors() {
    assert_eq!(eval("user.missing || true"), Ok(Value::Bool(true)));
    assert_eq!(eval("false && user.missing"), Ok(Value::Bool(false)));
    assert!(eval("user.missing && true").is_err());
}

#[test]
fn test_heterogeneous_equality() {
    assert_eq!(eval("user.tier == 1"), Ok(Value::Bool(false)));
    assert_eq!(eval("request.attempt == 2.0"), Ok(Value::Bool(true)));
}

#[test]
fn test_compile_errors() {
    let compiler = ExpressionCompiler::new();

    assert!(matches!(
        compiler.compile("account.id == 1"),
        Err(CompileError::UndeclaredReference(ref name)) if name == "account"
    ));
    assert!(matches!(
        compiler.compile("lookup(user.id)"),
        Err(CompileError::UndefinedFunction(_))
    ));
    assert!(matches!(
        compiler.compile("user.name.shout()"),
        Err(CompileError::UndefinedMethod(_))
    ));
    assert!(matches!(
        compiler.compile("user.name.matches('(')"),
        Err(CompileError::InvalidRegex { .. })
    ));
    assert!(matches!(
        compiler.compile("user.tags.exists(1, true)"),
        Err(CompileError::ParseError(_))
    ));
    assert!(matches!(
        compiler.compile("   "),
        Err(CompileError::EmptyExpression)
    ));
    assert!(compiler.with_variable("account").compile("account.id == 1").is_ok());
}
