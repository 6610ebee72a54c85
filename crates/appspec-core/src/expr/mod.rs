//! Restricted expression language
//!
//! Used by computed fields, invariants, transition guards, access rules,
//! attention conditions and filters. The pipeline is
//! tokens → [`parse_expr`] → [`type_check`] → [`evaluate`].
//!
//! The language cannot loop and cannot call anything outside the fixed
//! [`Function`] set: `foo(x)` is rejected by the parser, so no accepted
//! tree contains an unknown call.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod typeck;

pub use ast::{
    BinaryOp, DurationLiteral, DurationUnit, Expr, ExprType, FieldPath, Function, Hop, Literal, PathSegment, UnaryOp,
};
pub use eval::{evaluate, Environment, EvalError, Value};
pub use lexer::{from_dsl_tokens, ExprTok, ExprToken};
pub use parser::DEFAULT_MAX_DEPTH;
pub use typeck::{resolve_path, type_check, FieldSchema, PathType, SchemaField};

use crate::diagnostics::{Diagnostic, Location};
use crate::parser::tokenizer::{Span, Token};

/// Parse DSL tokens into an expression and check that every path exists
/// in `schema`
pub fn parse_expr(tokens: &[Token], schema: &FieldSchema) -> Result<Expr, Diagnostic> {
    parse_expr_with_depth(tokens, schema, DEFAULT_MAX_DEPTH)
}

pub fn parse_expr_with_depth(tokens: &[Token], schema: &FieldSchema, max_depth: usize) -> Result<Expr, Diagnostic> {
    let expr_tokens = from_dsl_tokens(tokens)?;
    let expr = parser::parse(&expr_tokens, max_depth)?;
    check_paths(&expr, schema, &expr_tokens)?;
    Ok(expr)
}

/// Scan and parse standalone expression text
pub fn parse_text(text: &str, schema: &FieldSchema) -> Result<Expr, Diagnostic> {
    let expr_tokens = lexer::tokenize(text)?;
    let expr = parser::parse(&expr_tokens, DEFAULT_MAX_DEPTH)?;
    check_paths(&expr, schema, &expr_tokens)?;
    Ok(expr)
}

/// Parse without a schema; paths are checked later, once the linker
/// knows every entity
pub(crate) fn parse_unchecked(tokens: &[Token], max_depth: usize) -> Result<Expr, Diagnostic> {
    let expr_tokens = from_dsl_tokens(tokens)?;
    parser::parse(&expr_tokens, max_depth)
}

fn check_paths(expr: &Expr, schema: &FieldSchema, tokens: &[ExprToken]) -> Result<(), Diagnostic> {
    let mut result = Ok(());
    expr.walk_paths(&mut |path| {
        if result.is_err() {
            return;
        }
        if let Err(mut diagnostic) = resolve_path(path, schema) {
            diagnostic.location = Location::from(&path_span(path, tokens));
            result = Err(diagnostic);
        }
    });
    result
}

fn path_span(path: &FieldPath, tokens: &[ExprToken]) -> Span {
    let root = path.segments.first().map(|s| s.name.as_str()).unwrap_or_default();
    tokens
        .iter()
        .find(|t| matches!(&t.tok, ExprTok::Ident(name) if name == root))
        .or_else(|| tokens.first())
        .map(|t| t.span.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::parser::tokenizer::tokenize;

    fn schema() -> FieldSchema {
        FieldSchema::for_entity("Invoice").with_scalar("due_date", ExprType::Date)
    }

    #[test]
    fn test_parse_expr_accepts_known_paths() {
        let (tokens, _) = tokenize("due_date > today");
        let expr = parse_expr(&tokens, &schema()).unwrap();
        assert_eq!(type_check(&expr, &schema()).unwrap(), ExprType::Bool);
    }

    #[test]
    fn test_parse_expr_rejects_unknown_path_with_location() {
        let (tokens, _) = tokenize("1 < missing");
        let err = parse_expr(&tokens, &schema()).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnknownPath);
        assert_eq!(err.location.column, 5);
    }

    #[test]
    fn test_unknown_function_never_parses() {
        for name in ["foo", "eval", "exec", "loop", "map"] {
            let err = parse_text(&format!("{}(due_date)", name), &schema()).unwrap_err();
            assert_eq!(err.code, DiagnosticCode::UnknownFunction, "{}", name);
        }
    }
}
