//! Expression engine seam
//!
//! The rule engine only depends on these traits. [`crate::compiler::ExpressionCompiler`]
//! is the bundled implementation; tests and embedders can provide their own.

use crate::compiler::CompileError;
use crate::context::Context;
use crate::interpreter::EvalError;
use crate::value::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Compiles expression source text into reusable programs
pub trait ExpressionEngine: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn Program>, CompileError>;
}

/// A compiled, immutable expression that can be evaluated any number of
/// times, from any number of threads.
pub trait Program: Send + Sync + Debug {
    fn evaluate(&self, context: &Context) -> Result<Value, EvalError>;

    /// The source the program was compiled from
    fn source(&self) -> &str;
}

impl<E: ExpressionEngine + ?Sized> ExpressionEngine for Arc<E> {
    fn compile(&self, source: &str) -> Result<Arc<dyn Program>, CompileError> {
        (**self).compile(source)
    }
}
