//! Tree-walking interpreter for compiled expressions

use crate::ast::nodes::{
    ArithmeticOp, BinaryOp, ComparisonOp, ComprehensionKind, Expression, Literal, LogicalOp,
};
use crate::builtins::{self, RegexCache};
use crate::context::{Context, NOW_BINDING, TIMESTAMP_BINDING};
use crate::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Maximum comprehension nesting
const MAX_SCOPE_DEPTH: usize = 64;

/// Runtime evaluation error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("no matching overload for '{operation}' applied to ({operands})")]
    NoMatchingOverload { operation: String, operands: String },

    #[error("index out of range: {0}")]
    IndexOutOfRange(i64),

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulus by zero")]
    ModulusByZero,

    #[error("integer overflow in '{0}'")]
    Overflow(String),

    #[error("invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("'{0}' is not a function")]
    NotAFunction(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("comprehensions nested deeper than {0}")]
    ScopeOverflow(usize),
}

impl EvalError {
    pub(crate) fn no_overload(operation: impl std::fmt::Display, operands: &[Value]) -> Self {
        EvalError::NoMatchingOverload {
            operation: operation.to_string(),
            operands: operands
                .iter()
                .map(Value::type_name)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Variables visible during evaluation: comprehension locals over the context
struct Scope<'a> {
    context: &'a Context,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    fn new(context: &'a Context) -> Self {
        Self {
            context,
            locals: Vec::new(),
        }
    }

    fn resolve(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value)
            .or_else(|| self.context.get(name))
    }

    fn push(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        if self.locals.len() >= MAX_SCOPE_DEPTH {
            return Err(EvalError::ScopeOverflow(MAX_SCOPE_DEPTH));
        }
        self.locals.push((name.to_string(), value));
        Ok(())
    }

    fn pop(&mut self) {
        self.locals.pop();
    }
}

/// Expression interpreter
#[derive(Debug, Clone)]
pub struct Interpreter {
    regexes: Arc<RegexCache>,
}

impl Interpreter {
    pub fn new(regexes: Arc<RegexCache>) -> Self {
        Self { regexes }
    }

    /// Evaluate an expression against a context
    pub fn evaluate(&self, expr: &Expression, context: &Context) -> Result<Value, EvalError> {
        let mut scope = Scope::new(context);
        self.eval(expr, &mut scope)
    }

    fn eval(&self, expr: &Expression, scope: &mut Scope<'_>) -> Result<Value, EvalError> {
        match expr {
            Expression::Literal(literal) => Ok(literal_value(literal)),

            Expression::Ident(name) => scope
                .resolve(name)
                .cloned()
                .ok_or_else(|| EvalError::NoSuchAttribute(name.clone())),

            Expression::Select { operand, field } => {
                if let Some(found) = lookup(expr, scope) {
                    return found.cloned();
                }
                let base = self.eval(operand, scope)?;
                select(&base, field).cloned()
            }

            Expression::Index { operand, index } => {
                let base = self.eval(operand, scope)?;
                let index = self.eval(index, scope)?;
                index_value(&base, &index)
            }

            Expression::Call { name, args } => {
                let args = self.eval_all(args, scope)?;
                self.call(name, &args, scope)
            }

            Expression::Method { target, name, args } => {
                let target = self.eval(target, scope)?;
                let args = self.eval_all(args, scope)?;
                builtins::call_method(&target, name, &args, &self.regexes)
            }

            Expression::Binary { left, op, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                apply_binary(*op, left, right)
            }

            Expression::Logical { op, operands } => self.eval_logical(*op, operands, scope),

            Expression::Negate(operand) => match self.eval(operand, scope)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Overflow("-".to_string())),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Duration(d) => Ok(Value::Duration(-d)),
                other => Err(EvalError::no_overload("-", &[other])),
            },

            Expression::Conditional {
                condition,
                then_branch,
                else_branch,
            } => match self.eval(condition, scope)? {
                Value::Bool(true) => self.eval(then_branch, scope),
                Value::Bool(false) => self.eval(else_branch, scope),
                other => Err(EvalError::no_overload("_?_:_", &[other])),
            },

            Expression::List(items) => Ok(Value::List(self.eval_all(items, scope)?)),

            Expression::Map(entries) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key, scope)? {
                        Value::String(s) => s,
                        other => return Err(EvalError::no_overload("map key", &[other])),
                    };
                    map.insert(key, self.eval(value, scope)?);
                }
                Ok(Value::Map(map))
            }

            Expression::Has { operand, field } => match self.eval(operand, scope)? {
                Value::Map(map) => Ok(Value::Bool(map.contains_key(field))),
                other => Err(EvalError::no_overload("has", &[other])),
            },

            Expression::Comprehension {
                kind,
                range,
                variable,
                predicate,
            } => self.eval_comprehension(*kind, range, variable, predicate, scope),
        }
    }

    fn eval_all(&self, exprs: &[Expression], scope: &mut Scope<'_>) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    /// `now` and `timestamp` resolve through their context bindings first
    fn call(&self, name: &str, args: &[Value], scope: &Scope<'_>) -> Result<Value, EvalError> {
        if name == NOW_BINDING || name == TIMESTAMP_BINDING {
            match scope.context.get(name) {
                Some(Value::Function(function)) => return function.call(args),
                Some(_) => return Err(EvalError::NotAFunction(name.to_string())),
                None => {}
            }
        }
        builtins::call_function(name, args)
    }

    /// `&&` and `||` absorb errors when another operand decides the outcome
    fn eval_logical(
        &self,
        op: LogicalOp,
        operands: &[Expression],
        scope: &mut Scope<'_>,
    ) -> Result<Value, EvalError> {
        let decisive = match op {
            LogicalOp::And => false,
            LogicalOp::Or => true,
            LogicalOp::Not => {
                return match operands {
                    [operand] => match self.eval(operand, scope)? {
                        Value::Bool(b) => Ok(Value::Bool(!b)),
                        other => Err(EvalError::no_overload("!", &[other])),
                    },
                    _ => Err(EvalError::InvalidArgument {
                        function: "!".to_string(),
                        message: format!("expected 1 operand, got {}", operands.len()),
                    }),
                };
            }
        };

        let mut deferred = None;
        for operand in operands {
            match self.eval(operand, scope) {
                Ok(Value::Bool(b)) if b == decisive => return Ok(Value::Bool(decisive)),
                Ok(Value::Bool(_)) => {}
                Ok(other) => {
                    deferred.get_or_insert(EvalError::no_overload(op, &[other]));
                }
                Err(e) => {
                    deferred.get_or_insert(e);
                }
            }
        }

        match deferred {
            Some(e) => Err(e),
            None => Ok(Value::Bool(!decisive)),
        }
    }

    fn eval_comprehension(
        &self,
        kind: ComprehensionKind,
        range: &Expression,
        variable: &str,
        predicate: &Expression,
        scope: &mut Scope<'_>,
    ) -> Result<Value, EvalError> {
        let items: Vec<Value> = match self.eval(range, scope)? {
            Value::List(items) => items,
            Value::Map(map) => map.into_keys().map(Value::String).collect(),
            other => return Err(EvalError::no_overload(kind.name(), &[other])),
        };

        let mut matched = 0usize;
        let mut deferred = None;

        for item in items {
            scope.push(variable, item)?;
            let outcome = self.eval(predicate, scope);
            scope.pop();

            match (kind, outcome) {
                (ComprehensionKind::Exists, Ok(Value::Bool(true))) => return Ok(Value::Bool(true)),
                (ComprehensionKind::All, Ok(Value::Bool(false))) => return Ok(Value::Bool(false)),
                (ComprehensionKind::ExistsOne, Ok(Value::Bool(true))) => matched += 1,
                (_, Ok(Value::Bool(_))) => {}
                (ComprehensionKind::ExistsOne, Ok(other)) => {
                    return Err(EvalError::no_overload(kind.name(), &[other]))
                }
                (ComprehensionKind::ExistsOne, Err(e)) => return Err(e),
                (_, Ok(other)) => {
                    deferred.get_or_insert(EvalError::no_overload(kind.name(), &[other]));
                }
                (_, Err(e)) => {
                    deferred.get_or_insert(e);
                }
            }
        }

        if let Some(e) = deferred {
            return Err(e);
        }

        Ok(Value::Bool(match kind {
            ComprehensionKind::Exists => false,
            ComprehensionKind::All => true,
            ComprehensionKind::ExistsOne => matched == 1,
        }))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Arc::new(RegexCache::default()))
    }
}

/// Resolve identifier/selection chains by reference so large bindings
/// such as `globals` are not cloned for every field access.
fn lookup<'s>(expr: &Expression, scope: &'s Scope<'_>) -> Option<Result<&'s Value, EvalError>> {
    match expr {
        Expression::Ident(name) => Some(
            scope
                .resolve(name)
                .ok_or_else(|| EvalError::NoSuchAttribute(name.clone())),
        ),
        Expression::Select { operand, field } => {
            Some(lookup(operand, scope)?.and_then(|base| select(base, field)))
        }
        _ => None,
    }
}

fn select<'v>(base: &'v Value, field: &str) -> Result<&'v Value, EvalError> {
    match base {
        Value::Map(map) => map
            .get(field)
            .ok_or_else(|| EvalError::NoSuchKey(field.to_string())),
        other => Err(EvalError::no_overload(
            format!(".{}", field),
            std::slice::from_ref(other),
        )),
    }
}

fn index_value(base: &Value, index: &Value) -> Result<Value, EvalError> {
    match (base, index) {
        (Value::List(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|idx| items.get(idx))
            .cloned()
            .ok_or(EvalError::IndexOutOfRange(*i)),
        (Value::Map(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::NoSuchKey(key.clone())),
        _ => Err(EvalError::no_overload("_[_]", &[base.clone(), index.clone()])),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Comparison(op) => compare(op, left, right),
        BinaryOp::Arithmetic(op) => arithmetic(op, left, right),
        BinaryOp::In => match &right {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.equals(&left)))),
            Value::Map(map) => match &left {
                Value::String(key) => Ok(Value::Bool(map.contains_key(key))),
                _ => Ok(Value::Bool(false)),
            },
            _ => Err(EvalError::no_overload("in", &[left, right])),
        },
    }
}

fn compare(op: ComparisonOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let ordered = |accept: fn(Ordering) -> bool| {
        left.compare(&right)
            .map(accept)
            .ok_or_else(|| EvalError::no_overload(op, &[left.clone(), right.clone()]))
    };

    let result = match op {
        ComparisonOp::Eq => left.equals(&right),
        ComparisonOp::Neq => !left.equals(&right),
        ComparisonOp::Lt => ordered(Ordering::is_lt)?,
        ComparisonOp::LtEq => ordered(Ordering::is_le)?,
        ComparisonOp::Gt => ordered(Ordering::is_gt)?,
        ComparisonOp::GtEq => ordered(Ordering::is_ge)?,
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: ArithmeticOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow(op.to_string());

    match (op, &left, &right) {
        (_, Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Sub => a.checked_sub(b),
                ArithmeticOp::Mul => a.checked_mul(b),
                ArithmeticOp::Div if b == 0 => return Err(EvalError::DivisionByZero),
                ArithmeticOp::Div => a.checked_div(b),
                ArithmeticOp::Rem if b == 0 => return Err(EvalError::ModulusByZero),
                ArithmeticOp::Rem => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(overflow)
        }

        (_, Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (as_float(&left), as_float(&right));
            Ok(Value::Float(match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Sub => a - b,
                ArithmeticOp::Mul => a * b,
                ArithmeticOp::Div => a / b,
                ArithmeticOp::Rem => return Err(EvalError::no_overload(op, &[left.clone(), right.clone()])),
            }))
        }

        (ArithmeticOp::Add, Value::String(a), Value::String(b)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }

        (ArithmeticOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }

        (ArithmeticOp::Add, Value::Timestamp(t), Value::Duration(d))
        | (ArithmeticOp::Add, Value::Duration(d), Value::Timestamp(t)) => t
            .checked_add_signed(*d)
            .map(Value::Timestamp)
            .ok_or_else(overflow),

        (ArithmeticOp::Sub, Value::Timestamp(t), Value::Duration(d)) => t
            .checked_sub_signed(*d)
            .map(Value::Timestamp)
            .ok_or_else(overflow),

        (ArithmeticOp::Sub, Value::Timestamp(a), Value::Timestamp(b)) => {
            Ok(Value::Duration(a.signed_duration_since(*b)))
        }

        (ArithmeticOp::Add, Value::Duration(a), Value::Duration(b)) => {
            a.checked_add(b).map(Value::Duration).ok_or_else(overflow)
        }

        (ArithmeticOp::Sub, Value::Duration(a), Value::Duration(b)) => {
            a.checked_sub(b).map(Value::Duration).ok_or_else(overflow)
        }

        _ => Err(EvalError::no_overload(op, &[left, right])),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}
