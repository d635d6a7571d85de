//! Recursive-descent parser for rule expressions
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, relations, `+ -`, `* / %`,
//! unary `! -`, then member access, indexing and calls.

use super::lexer::Lexer;
use super::token::{Token, TokenKind};
use crate::ast::nodes::{
    ArithmeticOp, BinaryOp, ComparisonOp, ComprehensionKind, Expression, Literal, LogicalOp,
};
use thiserror::Error;

/// Parse error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token: expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: String },

    #[error("Unexpected end of expression")]
    UnexpectedEof,

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid macro: {0}")]
    InvalidMacro(String),

    #[error("Expression nested too deeply (limit {0})")]
    TooDeep(usize),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Deepest tree the parser will build. Evaluation, folding and visitors
/// recurse on the tree, so this also bounds their stack use.
pub const MAX_NESTING: usize = 64;

/// Parser for rule expressions
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    /// Create a new parser from source code
    pub fn new(source: &str) -> Self {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize();
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    /// Parse a complete expression, rejecting trailing tokens
    pub fn parse(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_expression()?;
        if !self.is_at_end() {
            return Err(ParseError::UnexpectedToken {
                expected: "end of expression".to_string(),
                got: format!("{}", self.current().kind),
            });
        }
        Ok(expr)
    }

    /// Parse an expression
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.descend()?;
        let expr = self.parse_conditional();
        self.ascend(1);
        expr
    }

    fn parse_conditional(&mut self) -> ParseResult<Expression> {
        let condition = self.parse_logical_or()?;

        if self.check_token(TokenKind::Question) {
            self.advance();
            let then_branch = self.parse_logical_or()?;
            self.expect_token(TokenKind::Colon)?;
            let else_branch = self.parse_expression()?;
            return Ok(Expression::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }

        Ok(condition)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expression> {
        let mut operands = vec![self.parse_logical_and()?];

        while self.check_token(TokenKind::Or) {
            self.advance();
            operands.push(self.parse_logical_and()?);
        }

        Ok(Self::fold_logical(LogicalOp::Or, operands))
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expression> {
        let mut operands = vec![self.parse_relation()?];

        while self.check_token(TokenKind::And) {
            self.advance();
            operands.push(self.parse_relation()?);
        }

        Ok(Self::fold_logical(LogicalOp::And, operands))
    }

    fn fold_logical(op: LogicalOp, mut operands: Vec<Expression>) -> Expression {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expression::Logical { op, operands }
        }
    }

    fn parse_relation(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_addition()?;
        let mut chained = 0;

        while let Some(op) = self.parse_relation_op() {
            self.descend()?;
            chained += 1;
            self.advance();
            let right = self.parse_addition()?;
            left = Expression::binary(left, op, right);
        }

        self.ascend(chained);
        Ok(left)
    }

    fn parse_addition(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplication()?;
        let mut chained = 0;

        loop {
            let op = match self.current().kind {
                TokenKind::Plus => ArithmeticOp::Add,
                TokenKind::Minus => ArithmeticOp::Sub,
                _ => break,
            };
            self.descend()?;
            chained += 1;
            self.advance();
            let right = self.parse_multiplication()?;
            left = Expression::binary(left, BinaryOp::Arithmetic(op), right);
        }

        self.ascend(chained);
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;

        loop {
            let op = match self.current().kind {
                TokenKind::Star => ArithmeticOp::Mul,
                TokenKind::Slash => ArithmeticOp::Div,
                TokenKind::Percent => ArithmeticOp::Rem,
                _ => break,
            };
            self.descend()?;
            chained += 1;
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::binary(left, BinaryOp::Arithmetic(op), right);
        }

        self.ascend(chained);
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let negate = match self.current().kind {
            TokenKind::Not => false,
            TokenKind::Minus => true,
            _ => return self.parse_member(),
        };

        self.descend()?;
        self.advance();
        let operand = self.parse_unary()?;
        self.ascend(1);

        Ok(if negate {
            Expression::Negate(Box::new(operand))
        } else {
            Expression::not(operand)
        })
    }

    fn parse_member(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;

        loop {
            if self.check_token(TokenKind::Dot) || self.check_token(TokenKind::LBracket) {
                self.descend()?;
                chained += 1;
            }

            if self.check_token(TokenKind::Dot) {
                self.advance();
                let name = self.expect_identifier()?;

                if self.check_token(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    expr = Self::method_or_macro(expr, name, args)?;
                } else {
                    expr = Expression::select(expr, name);
                }
            } else if self.check_token(TokenKind::LBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.expect_token(TokenKind::RBracket)?;
                expr = Expression::Index {
                    operand: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        self.ascend(chained);
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let token_kind = self.current().kind.clone();

        match token_kind {
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Expression::literal(Literal::String(s)))
            }
            TokenKind::IntLit(n) => {
                self.advance();
                Ok(Expression::literal(Literal::Int(n)))
            }
            TokenKind::FloatLit(f) => {
                self.advance();
                Ok(Expression::literal(Literal::Float(f)))
            }
            TokenKind::BoolLit(b) => {
                self.advance();
                Ok(Expression::literal(Literal::Bool(b)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::literal(Literal::Null))
            }

            TokenKind::Ident(name) => {
                self.advance();
                if self.check_token(TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    Self::call_or_macro(name, args)
                } else {
                    Ok(Expression::Ident(name))
                }
            }

            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(TokenKind::RParen)?;
                Ok(expr)
            }

            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_sequence(TokenKind::RBracket, |p| p.parse_expression())?;
                Ok(Expression::List(items))
            }

            TokenKind::LBrace => {
                self.advance();
                let entries = self.parse_sequence(TokenKind::RBrace, |p| {
                    let key = p.parse_expression()?;
                    p.expect_token(TokenKind::Colon)?;
                    let value = p.parse_expression()?;
                    Ok((key, value))
                })?;
                Ok(Expression::Map(entries))
            }

            TokenKind::Eof => Err(ParseError::UnexpectedEof),

            TokenKind::Error(msg) => Err(ParseError::InvalidExpression(msg)),

            _ => Err(ParseError::InvalidExpression(format!(
                "Unexpected token: {}",
                token_kind
            ))),
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect_token(TokenKind::LParen)?;
        self.parse_sequence(TokenKind::RParen, |p| p.parse_expression())
    }

    /// Parse comma-separated items up to and including `close`.
    /// A trailing comma is accepted.
    fn parse_sequence<T>(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let mut items = Vec::new();

        while !self.check_token(close.clone()) {
            items.push(item(self)?);

            if self.check_token(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect_token(close)?;
        Ok(items)
    }

    fn call_or_macro(name: String, mut args: Vec<Expression>) -> ParseResult<Expression> {
        if name != "has" {
            return Ok(Expression::Call { name, args });
        }

        match (args.len(), args.pop()) {
            (1, Some(Expression::Select { operand, field })) => Ok(Expression::Has { operand, field }),
            _ => Err(ParseError::InvalidMacro(
                "has() requires a single field selection argument".to_string(),
            )),
        }
    }

    fn method_or_macro(
        target: Expression,
        name: String,
        mut args: Vec<Expression>,
    ) -> ParseResult<Expression> {
        let Some(kind) = ComprehensionKind::from_name(&name) else {
            return Ok(Expression::Method {
                target: Box::new(target),
                name,
                args,
            });
        };

        if args.len() != 2 {
            return Err(ParseError::InvalidMacro(format!(
                "{}() requires a variable and a predicate",
                kind.name()
            )));
        }

        let predicate = args.pop();
        match (args.pop(), predicate) {
            (Some(Expression::Ident(variable)), Some(predicate)) => Ok(Expression::Comprehension {
                kind,
                range: Box::new(target),
                variable,
                predicate: Box::new(predicate),
            }),
            _ => Err(ParseError::InvalidMacro(format!(
                "{}() variable must be a simple identifier",
                kind.name()
            ))),
        }
    }

    fn parse_relation_op(&self) -> Option<BinaryOp> {
        let op = match self.current().kind {
            TokenKind::Eq => ComparisonOp::Eq,
            TokenKind::Neq => ComparisonOp::Neq,
            TokenKind::Lt => ComparisonOp::Lt,
            TokenKind::Gt => ComparisonOp::Gt,
            TokenKind::LtEq => ComparisonOp::LtEq,
            TokenKind::GtEq => ComparisonOp::GtEq,
            TokenKind::In => return Some(BinaryOp::In),
            _ => return None,
        };
        Some(BinaryOp::Comparison(op))
    }

    // Helper methods

    /// Enter one level of nesting. The count is not unwound on error since
    /// the whole parse is abandoned.
    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::TooDeep(MAX_NESTING));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn current(&self) -> &Token {
        // tokenize() always terminates the stream with Eof
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn check_token(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.current().kind == kind
    }

    fn expect_token(&mut self, expected: TokenKind) -> ParseResult<()> {
        if self.check_token(expected.clone()) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::UnexpectedEof)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{}", expected),
                got: format!("{}", self.current().kind),
            })
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.current().kind {
            TokenKind::Ident(s) => {
                let result = s.clone();
                self.advance();
                Ok(result)
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof),
            _ => Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                got: format!("{}", self.current().kind),
            }),
        }
    }
}

/// Parse a complete expression from source
pub fn parse(source: &str) -> ParseResult<Expression> {
    Parser::new(source).parse()
}
