//! Expression tokens
//!
//! Expressions embedded in constructs arrive as DSL tokens; standalone
//! expression text is scanned by the DSL lexer first. Both paths go
//! through [`from_dsl_tokens`], so there is exactly one expression token
//! set. Function names become [`ExprTok::Func`] here: the set of callable
//! names is fixed by this mapping, not by the parser.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::ast::{DurationLiteral, Function};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::parser::tokenizer::{Lexer, Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub enum ExprTok {
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Bool(bool),
    Duration(DurationLiteral),
    Ident(String),
    Func(Function),
    And,
    Or,
    Not,
    In,
    If,
    Then,
    Else,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Arrow,
}

impl std::fmt::Display for ExprTok {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExprTok::Int(i) => write!(f, "{}", i),
            ExprTok::Decimal(d) => write!(f, "{}", d),
            ExprTok::Str(s) => write!(f, "\"{}\"", s),
            ExprTok::Bool(b) => write!(f, "{}", b),
            ExprTok::Duration(d) => write!(f, "{}", d),
            ExprTok::Ident(name) => write!(f, "{}", name),
            ExprTok::Func(func) => write!(f, "{}", func.name()),
            ExprTok::And => f.write_str("and"),
            ExprTok::Or => f.write_str("or"),
            ExprTok::Not => f.write_str("not"),
            ExprTok::In => f.write_str("in"),
            ExprTok::If => f.write_str("if"),
            ExprTok::Then => f.write_str("then"),
            ExprTok::Else => f.write_str("else"),
            ExprTok::Eq => f.write_str("="),
            ExprTok::NotEq => f.write_str("!="),
            ExprTok::Lt => f.write_str("<"),
            ExprTok::Gt => f.write_str(">"),
            ExprTok::LtEq => f.write_str("<="),
            ExprTok::GtEq => f.write_str(">="),
            ExprTok::Plus => f.write_str("+"),
            ExprTok::Minus => f.write_str("-"),
            ExprTok::Star => f.write_str("*"),
            ExprTok::Slash => f.write_str("/"),
            ExprTok::LParen => f.write_str("("),
            ExprTok::RParen => f.write_str(")"),
            ExprTok::LBracket => f.write_str("["),
            ExprTok::RBracket => f.write_str("]"),
            ExprTok::Comma => f.write_str(","),
            ExprTok::Dot => f.write_str("."),
            ExprTok::Arrow => f.write_str("->"),
        }
    }
}

/// Expression token with source position
#[derive(Debug, Clone, PartialEq)]
pub struct ExprToken {
    pub tok: ExprTok,
    pub span: Span,
}

/// Scan standalone expression text
pub fn tokenize(text: &str) -> Result<Vec<ExprToken>, Diagnostic> {
    let (tokens, diagnostics) = Lexer::new(text).tokenize();
    if let Some(first) = diagnostics.into_iter().find(Diagnostic::is_error) {
        return Err(first);
    }
    from_dsl_tokens(&tokens)
}

/// Convert DSL tokens into expression tokens.
///
/// Layout tokens are dropped. Tokens that have no meaning inside an
/// expression (`:`) are rejected.
pub fn from_dsl_tokens(tokens: &[Token]) -> Result<Vec<ExprToken>, Diagnostic> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        let tok = match token.kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof => continue,
            TokenKind::Number => number(token)?,
            TokenKind::Str => ExprTok::Str(token.lexeme.clone()),
            TokenKind::Bool => ExprTok::Bool(token.lexeme == "true"),
            TokenKind::Duration => match DurationLiteral::parse_compact(&token.lexeme) {
                Some(d) => ExprTok::Duration(d),
                None => {
                    return Err(Diagnostic::error(
                        DiagnosticCode::ExprSyntax,
                        format!("invalid duration '{}'", token.lexeme),
                        &token.span,
                    ))
                }
            },
            TokenKind::And => ExprTok::And,
            TokenKind::Or => ExprTok::Or,
            TokenKind::Not => ExprTok::Not,
            TokenKind::In => ExprTok::In,
            TokenKind::If => ExprTok::If,
            TokenKind::Then => ExprTok::Then,
            TokenKind::Else => ExprTok::Else,
            TokenKind::Eq => ExprTok::Eq,
            TokenKind::NotEq => ExprTok::NotEq,
            TokenKind::Lt => ExprTok::Lt,
            TokenKind::Gt => ExprTok::Gt,
            TokenKind::LtEq => ExprTok::LtEq,
            TokenKind::GtEq => ExprTok::GtEq,
            TokenKind::Plus => ExprTok::Plus,
            TokenKind::Minus => ExprTok::Minus,
            TokenKind::Star => ExprTok::Star,
            TokenKind::Slash => ExprTok::Slash,
            TokenKind::LParen => ExprTok::LParen,
            TokenKind::RParen => ExprTok::RParen,
            TokenKind::LBracket => ExprTok::LBracket,
            TokenKind::RBracket => ExprTok::RBracket,
            TokenKind::Comma => ExprTok::Comma,
            TokenKind::Dot => ExprTok::Dot,
            TokenKind::Arrow => ExprTok::Arrow,
            TokenKind::Colon => {
                return Err(Diagnostic::error(
                    DiagnosticCode::ExprSyntax,
                    "unexpected ':' in expression",
                    &token.span,
                ))
            }
            // Identifiers and construct keywords used as field names
            _ => match Function::from_name(&token.lexeme) {
                Some(func) => ExprTok::Func(func),
                None => ExprTok::Ident(token.lexeme.clone()),
            },
        };
        out.push(ExprToken {
            tok,
            span: token.span.clone(),
        });
    }
    Ok(out)
}

fn number(token: &Token) -> Result<ExprTok, Diagnostic> {
    let invalid = || {
        Diagnostic::error(
            DiagnosticCode::ExprSyntax,
            format!("invalid number '{}'", token.lexeme),
            &token.span,
        )
    };
    if token.lexeme.contains('.') {
        Decimal::from_str(&token.lexeme)
            .map(ExprTok::Decimal)
            .map_err(|_| invalid())
    } else {
        token.lexeme.parse().map(ExprTok::Int).map_err(|_| invalid())
    }
}
