//! Expression compiler: parse, check declarations, optionally fold constants

use crate::ast::nodes::{ComprehensionKind, Expression, Literal};
use crate::ast::visitor::{walk_expression, Visitor};
use crate::builtins::{self, RegexCache};
use crate::context::Context;
use crate::interpreter::{EvalError, Interpreter};
use crate::parser::{self, ParseError};
use crate::program::{ExpressionEngine, Program};
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Top-level variables every compiler declares
pub const DEFAULT_VARIABLES: &[&str] = &["user", "request", "payment", "globals", "rules", "rulesets"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("Undeclared reference: {0}")]
    UndeclaredReference(String),

    #[error("Undefined function: {0}")]
    UndefinedFunction(String),

    #[error("Undefined method: {0}")]
    UndefinedMethod(String),

    #[error("Invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Expression is empty")]
    EmptyExpression,
}

pub type CompileResult<T> = Result<T, CompileError>;

/// A checked expression ready for evaluation
#[derive(Debug)]
pub struct CompiledExpression {
    source: String,
    ast: Expression,
    interpreter: Interpreter,
}

impl CompiledExpression {
    /// The checked (and possibly folded) syntax tree
    pub fn ast(&self) -> &Expression {
        &self.ast
    }
}

impl Program for CompiledExpression {
    fn evaluate(&self, context: &Context) -> Result<Value, EvalError> {
        self.interpreter.evaluate(&self.ast, context)
    }

    fn source(&self) -> &str {
        &self.source
    }
}

/// The bundled [`ExpressionEngine`] for the CEL subset
#[derive(Debug, Clone)]
pub struct ExpressionCompiler {
    variables: BTreeSet<String>,
    optimise: bool,
    regexes: Arc<RegexCache>,
}

impl ExpressionCompiler {
    pub fn new() -> Self {
        Self {
            variables: DEFAULT_VARIABLES.iter().map(|v| v.to_string()).collect(),
            optimise: false,
            regexes: Arc::new(RegexCache::default()),
        }
    }

    /// Declare an additional top-level variable
    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.insert(name.into());
        self
    }

    /// Fold literal-only sub-expressions at compile time
    pub fn with_optimise(mut self, optimise: bool) -> Self {
        self.optimise = optimise;
        self
    }

    /// Replace the shared regex cache with one of the given capacity
    pub fn with_regex_cache_size(mut self, capacity: usize) -> Self {
        self.regexes = Arc::new(RegexCache::new(capacity));
        self
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    pub fn is_optimising(&self) -> bool {
        self.optimise
    }

    pub fn compile_expression(&self, source: &str) -> CompileResult<CompiledExpression> {
        if source.trim().is_empty() {
            return Err(CompileError::EmptyExpression);
        }

        let ast = parser::parse(source)?;

        let mut checker = DeclarationChecker {
            variables: &self.variables,
            regexes: &self.regexes,
            bound: Vec::new(),
            error: None,
        };
        checker.visit_expression(&ast);
        if let Some(error) = checker.error {
            return Err(error);
        }

        let interpreter = Interpreter::new(Arc::clone(&self.regexes));
        let ast = if self.optimise {
            fold_constants(ast, &interpreter)
        } else {
            ast
        };

        trace!(source, optimise = self.optimise, "compiled expression");

        Ok(CompiledExpression {
            source: source.to_string(),
            ast,
            interpreter,
        })
    }
}

impl Default for ExpressionCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine for ExpressionCompiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn Program>, CompileError> {
        Ok(Arc::new(self.compile_expression(source)?))
    }
}

/// Rejects undeclared variables, unknown functions and invalid literal regexes.
/// Keeps the first error found.
struct DeclarationChecker<'a> {
    variables: &'a BTreeSet<String>,
    regexes: &'a RegexCache,
    bound: Vec<String>,
    error: Option<CompileError>,
}

impl DeclarationChecker<'_> {
    fn report(&mut self, error: CompileError) {
        self.error.get_or_insert(error);
    }
}

impl Visitor for DeclarationChecker<'_> {
    fn visit_ident(&mut self, name: &str) {
        if !self.bound.iter().any(|b| b == name) && !self.variables.contains(name) {
            self.report(CompileError::UndeclaredReference(name.to_string()));
        }
    }

    fn visit_call(&mut self, name: &str, _args: &[Expression]) {
        if !builtins::is_function(name) {
            self.report(CompileError::UndefinedFunction(name.to_string()));
        }
    }

    fn visit_method(&mut self, _target: &Expression, name: &str, args: &[Expression]) {
        if !builtins::is_method(name) {
            self.report(CompileError::UndefinedMethod(name.to_string()));
            return;
        }

        if name == "matches" {
            if let Some(Literal::String(pattern)) = args.first().and_then(Expression::as_literal) {
                if let Err(e) = self.regexes.get_or_compile(pattern) {
                    self.report(CompileError::InvalidRegex {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn visit_comprehension(
        &mut self,
        _kind: ComprehensionKind,
        range: &Expression,
        variable: &str,
        predicate: &Expression,
    ) {
        self.visit_expression(range);
        self.bound.push(variable.to_string());
        self.visit_expression(predicate);
        self.bound.pop();
    }

    fn visit_expression(&mut self, expr: &Expression) {
        if self.error.is_none() {
            walk_expression(self, expr);
        }
    }
}

/// Replace literal-only operator nodes with their value.
///
/// Anything that fails to evaluate is left in place so the error still
/// surfaces at run time.
fn fold_constants(expr: Expression, interpreter: &Interpreter) -> Expression {
    let fold = |e: Box<Expression>| Box::new(fold_constants(*e, interpreter));
    let fold_all = |es: Vec<Expression>| -> Vec<Expression> {
        es.into_iter().map(|e| fold_constants(e, interpreter)).collect()
    };

    let expr = match expr {
        Expression::Select { operand, field } => Expression::Select {
            operand: fold(operand),
            field,
        },
        Expression::Index { operand, index } => Expression::Index {
            operand: fold(operand),
            index: fold(index),
        },
        Expression::Call { name, args } => Expression::Call {
            name,
            args: fold_all(args),
        },
        Expression::Method { target, name, args } => Expression::Method {
            target: fold(target),
            name,
            args: fold_all(args),
        },
        Expression::Binary { left, op, right } => Expression::Binary {
            left: fold(left),
            op,
            right: fold(right),
        },
        Expression::Logical { op, operands } => Expression::Logical {
            op,
            operands: fold_all(operands),
        },
        Expression::Negate(operand) => Expression::Negate(fold(operand)),
        Expression::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            let condition = fold(condition);
            match condition.as_literal() {
                Some(Literal::Bool(true)) => return fold_constants(*then_branch, interpreter),
                Some(Literal::Bool(false)) => return fold_constants(*else_branch, interpreter),
                _ => Expression::Conditional {
                    condition,
                    then_branch: fold(then_branch),
                    else_branch: fold(else_branch),
                },
            }
        }
        Expression::List(items) => Expression::List(fold_all(items)),
        Expression::Map(entries) => Expression::Map(
            entries
                .into_iter()
                .map(|(k, v)| (fold_constants(k, interpreter), fold_constants(v, interpreter)))
                .collect(),
        ),
        Expression::Has { operand, field } => Expression::Has {
            operand: fold(operand),
            field,
        },
        Expression::Comprehension {
            kind,
            range,
            variable,
            predicate,
        } => Expression::Comprehension {
            kind,
            range: fold(range),
            variable,
            predicate: fold(predicate),
        },
        leaf @ (Expression::Literal(_) | Expression::Ident(_)) => leaf,
    };

    if !is_constant_operation(&expr) {
        return expr;
    }

    match interpreter.evaluate(&expr, &Context::new()).map(to_literal) {
        Ok(Some(literal)) => Expression::Literal(literal),
        _ => expr,
    }
}

fn is_constant_operation(expr: &Expression) -> bool {
    let literal = |e: &Expression| e.as_literal().is_some();
    match expr {
        Expression::Binary { left, right, .. } => literal(left) && literal(right),
        Expression::Logical { operands, .. } => operands.iter().all(literal),
        Expression::Negate(operand) => literal(operand),
        _ => false,
    }
}

fn to_literal(value: Value) -> Option<Literal> {
    match value {
        Value::Null => Some(Literal::Null),
        Value::Bool(b) => Some(Literal::Bool(b)),
        Value::Int(i) => Some(Literal::Int(i)),
        Value::Float(f) => Some(Literal::Float(f)),
        Value::String(s) => Some(Literal::String(s)),
        _ => None,
    }
}
