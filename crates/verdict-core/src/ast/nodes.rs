//! AST node definitions

use std::fmt;

/// An expression in the AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Literal(Literal),

    /// Variable reference (e.g., user)
    Ident(String),

    /// Field selection (e.g., user.age)
    Select { operand: Box<Expression>, field: String },

    /// Index access (e.g., list[0], map["key"])
    Index { operand: Box<Expression>, index: Box<Expression> },

    /// Global function call (e.g., size(x))
    Call { name: String, args: Vec<Expression> },

    /// Receiver-style call (e.g., email.endsWith("@x"))
    Method { target: Box<Expression>, name: String, args: Vec<Expression> },

    /// Binary operation (e.g., x == y, a + b, x in list)
    Binary { left: Box<Expression>, op: BinaryOp, right: Box<Expression> },

    /// Logical operation (&&, ||, !)
    Logical { op: LogicalOp, operands: Vec<Expression> },

    /// Arithmetic negation
    Negate(Box<Expression>),

    /// Ternary conditional
    Conditional {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },

    /// List construction
    List(Vec<Expression>),

    /// Map construction, entries in source order
    Map(Vec<(Expression, Expression)>),

    /// Field presence test, `has(a.b)`
    Has { operand: Box<Expression>, field: String },

    /// Quantifier macro over a list or map keys
    Comprehension {
        kind: ComprehensionKind,
        range: Box<Expression>,
        variable: String,
        predicate: Box<Expression>,
    },
}

impl Expression {
    /// Create a literal expression
    pub fn literal(value: Literal) -> Self {
        Self::Literal(value)
    }

    /// Create a variable reference
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    /// Create a field selection
    pub fn select(operand: Expression, field: impl Into<String>) -> Self {
        Self::Select {
            operand: Box::new(operand),
            field: field.into(),
        }
    }

    /// Create a dotted path such as `user.profile.age`
    pub fn path(segments: &[&str]) -> Self {
        let mut iter = segments.iter();
        let root = iter.next().copied().unwrap_or_default();
        iter.fold(Self::ident(root), |acc, seg| Self::select(acc, *seg))
    }

    /// Create a binary expression
    pub fn binary(left: Expression, op: BinaryOp, right: Expression) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Create a logical AND
    pub fn and(operands: Vec<Expression>) -> Self {
        Self::Logical { op: LogicalOp::And, operands }
    }

    /// Create a logical OR
    pub fn or(operands: Vec<Expression>) -> Self {
        Self::Logical { op: LogicalOp::Or, operands }
    }

    /// Create a NOT expression
    pub fn not(operand: Expression) -> Self {
        Self::Logical {
            op: LogicalOp::Not,
            operands: vec![operand],
        }
    }

    /// The literal payload, if this node is a literal
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

/// Literal values appearing in source
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Comparison(ComparisonOp),
    Arithmetic(ArithmeticOp),
    In,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Comparison(op) => write!(f, "{}", op),
            BinaryOp::Arithmetic(op) => write!(f, "{}", op),
            BinaryOp::In => write!(f, "in"),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Rem => "%",
        };
        write!(f, "{}", s)
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
            LogicalOp::Not => write!(f, "!"),
        }
    }
}

/// Quantifier macros
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    /// `exists(x, p)` - at least one element satisfies p
    Exists,
    /// `all(x, p)` - every element satisfies p
    All,
    /// `exists_one(x, p)` - exactly one element satisfies p
    ExistsOne,
}

impl ComprehensionKind {
    /// Macro name as written in source
    pub fn name(&self) -> &'static str {
        match self {
            ComprehensionKind::Exists => "exists",
            ComprehensionKind::All => "all",
            ComprehensionKind::ExistsOne => "exists_one",
        }
    }

    /// Look up a macro by its method name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exists" => Some(ComprehensionKind::Exists),
            "all" => Some(ComprehensionKind::All),
            "exists_one" => Some(ComprehensionKind::ExistsOne),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_path() {
        let expr = Expression::path(&["user", "profile", "age"]);
        assert_eq!(
            expr,
            Expression::select(
                Expression::select(Expression::ident("user"), "profile"),
                "age"
            )
        );
    }

    #[test]
    fn test_expression_logical_not() {
        let expr = Expression::not(Expression::path(&["user", "suspended"]));
        match expr {
            Expression::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::Not);
                assert_eq!(operands.len(), 1);
            }
            _ => panic!("Expected logical expression"),
        }
    }

    #[test]
    fn test_as_literal() {
        assert_eq!(
            Expression::literal(Literal::Int(3)).as_literal(),
            Some(&Literal::Int(3))
        );
        assert_eq!(Expression::ident("user").as_literal(), None);
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(BinaryOp::Comparison(ComparisonOp::GtEq).to_string(), ">=");
        assert_eq!(BinaryOp::Arithmetic(ArithmeticOp::Rem).to_string(), "%");
        assert_eq!(BinaryOp::In.to_string(), "in");
        assert_eq!(LogicalOp::Or.to_string(), "||");
        assert_eq!(Literal::String("a".to_string()).to_string(), "\"a\"");
    }

    #[test]
    fn test_comprehension_names() {
        for kind in [
            ComprehensionKind::Exists,
            ComprehensionKind::All,
            ComprehensionKind::ExistsOne,
        ] {
            assert_eq!(ComprehensionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ComprehensionKind::from_name("map"), None);
    }
}
