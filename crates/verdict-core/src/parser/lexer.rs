//! Lexer for rule expressions
//!
//! Newlines are ordinary whitespace, so multi-line YAML expressions lex the
//! same as single-line ones. `//` starts a comment that runs to end of line.

use super::token::{Token, TokenKind};

/// Lexer for tokenizing expression source
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    /// Create a new lexer from source code
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start_line = self.line;
        let start_column = self.column;

        if self.is_at_end() {
            return Token::new(TokenKind::Eof, String::new(), start_line, start_column);
        }

        let ch = self.current_char();

        if ch == '/' && self.peek_char() == Some('/') {
            self.skip_comment();
            return self.next_token();
        }

        if ch == '"' || ch == '\'' {
            return self.lex_string(ch);
        }

        if ch.is_ascii_digit() {
            return self.lex_number();
        }

        if ch.is_alphabetic() || ch == '_' {
            return self.lex_identifier_or_keyword();
        }

        self.lex_operator_or_punctuation()
    }

    /// Tokenize all input
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn advance(&mut self) -> char {
        let ch = self.current_char();
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        ch
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while !self.is_at_end() && self.current_char() != '\n' {
            self.advance();
        }
    }

    fn lex_string(&mut self, quote: char) -> Token {
        let start_line = self.line;
        let start_column = self.column;

        self.advance(); // opening quote

        let mut value = String::new();
        let mut escaped = false;

        while !self.is_at_end() {
            let ch = self.current_char();

            if escaped {
                match ch {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' | '"' | '\'' => value.push(ch),
                    // Unknown escapes are kept so regex classes like \d survive
                    _ => {
                        value.push('\\');
                        value.push(ch);
                    }
                }
                escaped = false;
                self.advance();
            } else if ch == '\\' {
                escaped = true;
                self.advance();
            } else if ch == quote {
                self.advance();
                return Token::new(
                    TokenKind::StringLit(value.clone()),
                    format!("{quote}{value}{quote}"),
                    start_line,
                    start_column,
                );
            } else if ch == '\n' {
                break;
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Token::new(
            TokenKind::Error("Unterminated string literal".to_string()),
            value,
            start_line,
            start_column,
        )
    }

    fn lex_number(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;

        let mut number_str = String::new();
        let mut is_float = false;

        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            number_str.push(self.advance());
        }

        if !self.is_at_end() && self.current_char() == '.' {
            if let Some(next_ch) = self.peek_char() {
                if next_ch.is_ascii_digit() {
                    is_float = true;
                    number_str.push(self.advance());

                    while !self.is_at_end() && self.current_char().is_ascii_digit() {
                        number_str.push(self.advance());
                    }
                }
            }
        }

        let kind = if is_float {
            number_str
                .parse::<f64>()
                .map(TokenKind::FloatLit)
                .unwrap_or_else(|_| TokenKind::Error(format!("Invalid float literal: {}", number_str)))
        } else {
            number_str
                .parse::<i64>()
                .map(TokenKind::IntLit)
                .unwrap_or_else(|_| {
                    TokenKind::Error(format!("Invalid integer literal: {}", number_str))
                })
        };

        Token::new(kind, number_str, start_line, start_column)
    }

    fn lex_identifier_or_keyword(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;

        let mut ident = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(self.advance());
            } else {
                break;
            }
        }

        let kind = match ident.as_str() {
            "in" => TokenKind::In,
            "null" => TokenKind::Null,
            "true" => TokenKind::BoolLit(true),
            "false" => TokenKind::BoolLit(false),
            _ => TokenKind::Ident(ident.clone()),
        };

        Token::new(kind, ident, start_line, start_column)
    }

    fn lex_operator_or_punctuation(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;

        let ch = self.advance();

        if !self.is_at_end() {
            let next_ch = self.current_char();
            let two_char = format!("{}{}", ch, next_ch);

            let kind = match two_char.as_str() {
                "==" => Some(TokenKind::Eq),
                "!=" => Some(TokenKind::Neq),
                "<=" => Some(TokenKind::LtEq),
                ">=" => Some(TokenKind::GtEq),
                "&&" => Some(TokenKind::And),
                "||" => Some(TokenKind::Or),
                _ => None,
            };

            if let Some(kind) = kind {
                self.advance();
                return Token::new(kind, two_char, start_line, start_column);
            }
        }

        let kind = match ch {
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '!' => TokenKind::Not,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            _ => TokenKind::Error(format!("Unexpected character: {}", ch)),
        };

        Token::new(kind, ch.to_string(), start_line, start_column)
    }
}
