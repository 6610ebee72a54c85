//! Precedence-climbing expression parser
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := comparison ("and" comparison)*
//! comparison := additive (cmp_op additive | "not"? "in" list)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := ("not" | "-") unary | primary
//! primary    := literal | duration | path | "(" or_expr ")"
//!             | function "(" args ")" | "if" or_expr "then" or_expr "else" or_expr
//! ```
//!
//! `and` and `or` are left-associative and `and` binds tighter.
//! Comparisons do not chain.

use super::ast::*;
use super::lexer::{ExprTok, ExprToken};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::parser::tokenizer::Span;

/// Default nesting bound used when no options are supplied
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Parse a complete expression; every token must be consumed
pub fn parse(tokens: &[ExprToken], max_depth: usize) -> Result<Expr, Diagnostic> {
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    if tokens.is_empty() {
        return Err(Diagnostic::error(
            DiagnosticCode::ExprSyntax,
            "expected an expression",
            &Span::default(),
        ));
    }
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek_token() {
        return Err(Diagnostic::error(
            DiagnosticCode::ExprSyntax,
            format!("unexpected '{}' after expression", extra.tok),
            &extra.span,
        ));
    }
    Ok(expr)
}

struct ExprParser<'a> {
    tokens: &'a [ExprToken],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> ExprParser<'a> {
    // ── Token helpers ──────────────────────────────────

    fn peek_token(&self) -> Option<&'a ExprToken> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&'a ExprTok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_nth(&self, n: usize) -> Option<&'a ExprTok> {
        self.tokens.get(self.pos + n).map(|t| &t.tok)
    }

    fn advance(&mut self) -> Option<&'a ExprToken> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &ExprTok) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span.clone())
            .unwrap_or_default()
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(DiagnosticCode::ExprSyntax, message, &self.current_span())
    }

    fn expect(&mut self, expected: ExprTok) -> Result<(), Diagnostic> {
        if self.eat(&expected) {
            return Ok(());
        }
        Err(match self.peek() {
            Some(found) => self.error(format!("expected '{}', found '{}'", expected, found)),
            None => self.error(format!("expected '{}', found end of expression", expected)),
        })
    }

    fn enter(&mut self) -> Result<(), Diagnostic> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Diagnostic::error(
                DiagnosticCode::ExprTooDeep,
                format!("expression nesting exceeds the limit of {}", self.max_depth),
                &self.current_span(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ── Precedence levels ──────────────────────────────

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        self.enter()?;
        let mut left = self.parse_and()?;
        while self.eat(&ExprTok::Or) {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.leave();
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_comparison()?;
        while self.eat(&ExprTok::And) {
            let right = self.parse_comparison()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let left = self.parse_additive()?;

        let negated_in = self.peek() == Some(&ExprTok::Not) && self.peek_nth(1) == Some(&ExprTok::In);
        if negated_in || self.peek() == Some(&ExprTok::In) {
            if negated_in {
                self.advance();
            }
            self.advance();
            let list = self.parse_list()?;
            let expr = Expr::In {
                value: Box::new(left),
                list,
                negated: negated_in,
            };
            return self.reject_chained(expr);
        }

        let op = match self.peek() {
            Some(ExprTok::Eq) => BinaryOp::Eq,
            Some(ExprTok::NotEq) => BinaryOp::NotEq,
            Some(ExprTok::Lt) => BinaryOp::Lt,
            Some(ExprTok::Gt) => BinaryOp::Gt,
            Some(ExprTok::LtEq) => BinaryOp::LtEq,
            Some(ExprTok::GtEq) => BinaryOp::GtEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        self.reject_chained(binary(op, left, right))
    }

    fn reject_chained(&self, expr: Expr) -> Result<Expr, Diagnostic> {
        match self.peek() {
            Some(
                ExprTok::Eq
                | ExprTok::NotEq
                | ExprTok::Lt
                | ExprTok::Gt
                | ExprTok::LtEq
                | ExprTok::GtEq
                | ExprTok::In,
            ) => Err(self.error("comparison operators cannot be chained; use 'and'")),
            _ => Ok(expr),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        self.expect(ExprTok::LBracket)?;
        let mut items = Vec::new();
        if self.eat(&ExprTok::RBracket) {
            return Err(self.error("'in' list must not be empty"));
        }
        loop {
            items.push(self.parse_additive()?);
            if self.eat(&ExprTok::Comma) {
                continue;
            }
            self.expect(ExprTok::RBracket)?;
            return Ok(items);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(ExprTok::Plus) => BinaryOp::Add,
                Some(ExprTok::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(ExprTok::Star) => BinaryOp::Mul,
                Some(ExprTok::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek() {
            Some(ExprTok::Not) => UnaryOp::Not,
            Some(ExprTok::Minus) => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // ── Primary ────────────────────────────────────────

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let Some(token) = self.advance() else {
            return Err(self.error("unexpected end of expression"));
        };

        match &token.tok {
            ExprTok::Int(n) => {
                if let Some(unit) = self.duration_word() {
                    return Ok(Expr::Duration(DurationLiteral { amount: *n, unit }));
                }
                Ok(Expr::Literal(Literal::Int(*n)))
            }
            ExprTok::Decimal(d) => Ok(Expr::Literal(Literal::Decimal(*d))),
            ExprTok::Str(s) => Ok(Expr::Literal(Literal::Str(s.clone()))),
            ExprTok::Bool(b) => Ok(Expr::Literal(Literal::Bool(*b))),
            ExprTok::Duration(d) => Ok(Expr::Duration(*d)),
            ExprTok::LParen => {
                let inner = self.parse_or()?;
                self.expect(ExprTok::RParen)?;
                Ok(inner)
            }
            ExprTok::If => {
                let condition = self.parse_or()?;
                self.expect(ExprTok::Then)?;
                let then_branch = self.parse_or()?;
                self.expect(ExprTok::Else)?;
                let else_branch = self.parse_or()?;
                Ok(Expr::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                })
            }
            ExprTok::Func(func) => {
                if self.peek() == Some(&ExprTok::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    return Ok(Expr::FuncCall { func: *func, args });
                }
                if func.is_nullary() {
                    return Ok(Expr::FuncCall {
                        func: *func,
                        args: Vec::new(),
                    });
                }
                // A field that happens to share a function's name
                self.parse_path(func.name().to_string())
            }
            ExprTok::Ident(name) => {
                if self.peek() == Some(&ExprTok::LParen) {
                    return Err(Diagnostic::error(
                        DiagnosticCode::UnknownFunction,
                        format!(
                            "unknown function '{}'; available functions: {}",
                            name,
                            Function::all().map(Function::name).collect::<Vec<_>>().join(", ")
                        ),
                        &token.span,
                    ));
                }
                self.parse_path(name.clone())
            }
            other => Err(Diagnostic::error(
                DiagnosticCode::ExprSyntax,
                format!("unexpected '{}' in expression", other),
                &token.span,
            )),
        }
    }

    /// `14 days` → duration; only when the word is a unit name
    fn duration_word(&mut self) -> Option<DurationUnit> {
        let ExprTok::Ident(word) = self.peek()? else {
            return None;
        };
        let unit = DurationUnit::parse(word)?;
        // Compact suffixes stay field names when separated (`2 * d`)
        if word == unit.compact() || word == "min" {
            return None;
        }
        self.advance();
        Some(unit)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        if self.eat(&ExprTok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&ExprTok::Comma) {
                continue;
            }
            self.expect(ExprTok::RParen)?;
            return Ok(args);
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, Diagnostic> {
        let mut segments = vec![PathSegment {
            name: root,
            hop: Hop::Root,
        }];
        loop {
            let hop = match self.peek() {
                Some(ExprTok::Dot) => Hop::Dot,
                Some(ExprTok::Arrow) => Hop::Arrow,
                _ => break,
            };
            self.advance();
            let name = match self.advance().map(|t| &t.tok) {
                Some(ExprTok::Ident(name)) => name.clone(),
                Some(ExprTok::Func(func)) => func.name().to_string(),
                _ => return Err(self.error("expected a field name after '.' or '->'")),
            };
            segments.push(PathSegment { name, hop });
        }
        Ok(Expr::FieldRef(FieldPath { segments }))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;

    fn parse_text(text: &str) -> Result<Expr, Diagnostic> {
        parse(&tokenize(text)?, DEFAULT_MAX_DEPTH)
    }

    fn shown(text: &str) -> String {
        parse_text(text).unwrap().to_string()
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(shown("a or b and c"), "(a or (b and c))");
        assert_eq!(shown("a and b or c"), "((a and b) or c)");
    }

    #[test]
    fn test_boolean_operators_left_associative() {
        assert_eq!(shown("a or b or c"), "((a or b) or c)");
        assert_eq!(shown("a and b and c"), "((a and b) and c)");
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(shown("1 + 2 * 3 - 4"), "((1 + (2 * 3)) - 4)");
        assert_eq!(shown("(1 + 2) * 3"), "((1 + 2) * 3)");
    }

    #[test]
    fn test_comparison_over_arithmetic() {
        assert_eq!(shown("total * 2 >= limit + 1"), "((total * 2) >= (limit + 1))");
    }

    #[test]
    fn test_chained_comparison_rejected() {
        let err = parse_text("a < b < c").unwrap_err();
        assert!(err.message.contains("cannot be chained"));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(shown("not done"), "not done");
        assert_eq!(shown("-x * 2"), "(-x * 2)");
    }

    #[test]
    fn test_in_and_not_in() {
        assert_eq!(shown("status in [\"a\", \"b\"]"), "status in [\"a\", \"b\"]");
        assert_eq!(shown("status not in [\"a\"]"), "status not in [\"a\"]");
        assert!(parse_text("status in []").is_err());
    }

    #[test]
    fn test_duration_word_form_normalizes_to_compact() {
        assert_eq!(parse_text("14 days").unwrap(), parse_text("14d").unwrap());
        assert_eq!(parse_text("2 hours").unwrap(), parse_text("2h").unwrap());
    }

    #[test]
    fn test_arrow_path() {
        let expr = parse_text("self->signatory->aml_status = \"clear\"").unwrap();
        let Expr::Binary { left, .. } = expr else { panic!("expected comparison") };
        let Expr::FieldRef(path) = *left else { panic!("expected path") };
        assert_eq!(path.segments.len(), 3);
        assert_eq!(path.segments[2].hop, Hop::Arrow);
    }

    #[test]
    fn test_function_calls() {
        assert_eq!(shown("sum(lines.amount) > 0"), "(sum(lines.amount) > 0)");
        assert_eq!(shown("concat(a, \"-\", b)"), "concat(a, \"-\", b)");
    }

    #[test]
    fn test_today_without_parentheses() {
        assert_eq!(parse_text("today").unwrap(), parse_text("today()").unwrap());
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        let err = parse_text("foo(x)").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnknownFunction);
    }

    #[test]
    fn test_function_name_as_field() {
        assert_eq!(parse_text("count > 3").unwrap().to_string(), "(count > 3)");
    }

    #[test]
    fn test_if_expression() {
        assert_eq!(shown("if paid then 0 else total"), "if paid then 0 else total");
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse_text("a b").is_err());
        assert!(parse_text("(a").is_err());
        assert!(parse_text("").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        let err = parse(&tokenize(&deep).unwrap(), 16).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::ExprTooDeep);
        assert!(parse(&tokenize("((1))").unwrap(), 16).is_ok());
    }
}
