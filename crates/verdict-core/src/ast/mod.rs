//! Abstract Syntax Tree (AST) for rule expressions
//!
//! The AST is produced by the parser with macros (`has`, `exists`, `all`,
//! `exists_one`) already expanded into dedicated nodes.

pub mod nodes;
pub mod visitor;

pub use nodes::{
    ArithmeticOp, BinaryOp, ComparisonOp, ComprehensionKind, Expression, Literal, LogicalOp,
};
pub use visitor::{walk_expression, Visitor};
