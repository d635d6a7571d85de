//! Visitor pattern for traversing AST

use super::nodes::{ComprehensionKind, Expression, Literal};

/// Visitor trait for AST traversal
pub trait Visitor: Sized {
    /// Visit an expression
    fn visit_expression(&mut self, expr: &Expression) {
        walk_expression(self, expr);
    }

    /// Visit a variable reference
    fn visit_ident(&mut self, _name: &str) {
        // Leaf node, no children
    }

    /// Visit a literal
    fn visit_literal(&mut self, _literal: &Literal) {
        // Leaf node, no children
    }

    /// Visit a global function call; arguments are walked afterwards
    fn visit_call(&mut self, _name: &str, _args: &[Expression]) {}

    /// Visit a receiver-style call; target and arguments are walked afterwards
    fn visit_method(&mut self, _target: &Expression, _name: &str, _args: &[Expression]) {}

    /// Visit a comprehension.
    ///
    /// The default walks the range and then the predicate. Visitors that track
    /// scopes override this to bind `variable` around the predicate.
    fn visit_comprehension(
        &mut self,
        _kind: ComprehensionKind,
        range: &Expression,
        _variable: &str,
        predicate: &Expression,
    ) {
        self.visit_expression(range);
        self.visit_expression(predicate);
    }
}

/// Walk an expression
pub fn walk_expression<V: Visitor>(visitor: &mut V, expr: &Expression) {
    match expr {
        Expression::Literal(literal) => {
            visitor.visit_literal(literal);
        }

        Expression::Ident(name) => {
            visitor.visit_ident(name);
        }

        Expression::Select { operand, .. } | Expression::Has { operand, .. } => {
            visitor.visit_expression(operand);
        }

        Expression::Index { operand, index } => {
            visitor.visit_expression(operand);
            visitor.visit_expression(index);
        }

        Expression::Call { name, args } => {
            visitor.visit_call(name, args);
            for arg in args {
                visitor.visit_expression(arg);
            }
        }

        Expression::Method { target, name, args } => {
            visitor.visit_method(target, name, args);
            visitor.visit_expression(target);
            for arg in args {
                visitor.visit_expression(arg);
            }
        }

        Expression::Binary { left, right, .. } => {
            visitor.visit_expression(left);
            visitor.visit_expression(right);
        }

        Expression::Logical { operands, .. } | Expression::List(operands) => {
            for operand in operands {
                visitor.visit_expression(operand);
            }
        }

        Expression::Negate(operand) => {
            visitor.visit_expression(operand);
        }

        Expression::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(then_branch);
            visitor.visit_expression(else_branch);
        }

        Expression::Map(entries) => {
            for (key, value) in entries {
                visitor.visit_expression(key);
                visitor.visit_expression(value);
            }
        }

        Expression::Comprehension {
            kind,
            range,
            variable,
            predicate,
        } => {
            visitor.visit_comprehension(*kind, range, variable, predicate);
        }
    }
}
