//! Field declarations shared by entities, messages, services and foreign
//! models: `name: type modifiers* [= default]`

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{DefaultValue, DeleteBehavior, FieldModifier, FieldSpec, FieldType, LedgerSpec, RefKind};
use crate::parser::lines::Line;
use crate::parser::stream::{is_word, TokenStream};
use crate::parser::tokenizer::TokenKind;
use crate::parser::{Header, Parser};

/// Parse one field line. A field that fails local validation is reported,
/// recorded as a rejected member of `owner` and left out.
pub(crate) fn parse_field(p: &mut Parser, owner: &Header, line: &Line) -> Option<FieldSpec> {
    let Some((key, mut s)) = line.entry() else {
        p.unknown_key(owner, line);
        return None;
    };
    let name = key.lexeme.clone();
    let span = key.span.clone();

    let parsed = parse_type_spec(&mut s).and_then(|ty| {
        let modifiers = parse_modifiers(p, &mut s, &ty)?;
        let default = parse_default(&mut s)?;
        s.finish()?;
        Ok((ty, modifiers, default))
    });

    let result = match parsed {
        Ok((ty, modifiers, default)) => FieldSpec::new(name.clone(), ty, modifiers, default, span.clone()),
        Err(diagnostic) => Err(vec![diagnostic]),
    };
    match result {
        Ok(field) => Some(field),
        Err(errors) => {
            for error in errors {
                p.report(error);
            }
            p.reject_member(owner, &name, &span);
            None
        }
    }
}

/// Resolve a field type: scalars with parameters, `enum[...]` lists and
/// reference kinds with an optional delete behaviour
pub(crate) fn parse_type_spec(s: &mut TokenStream) -> Result<FieldType, Diagnostic> {
    let token = s.expect_word("field type")?;
    let span = token.span.clone();

    let ty = match token.lexeme.as_str() {
        "str" | "string" => {
            let length = if s.eat(TokenKind::LParen) {
                let n = s.expect_number("string length")?;
                s.expect(TokenKind::RParen)?;
                Some(n)
            } else {
                None
            };
            FieldType::string(length, &span)?
        }
        "decimal" => {
            s.expect(TokenKind::LParen)?;
            let precision = s.expect_number("decimal precision")?;
            s.expect(TokenKind::Comma)?;
            let scale = s.expect_number("decimal scale")?;
            s.expect(TokenKind::RParen)?;
            FieldType::decimal(precision, scale, &span)?
        }
        "money" => {
            let currency = if s.eat(TokenKind::LParen) {
                let code = s.expect_word("currency code")?;
                LedgerSpec::validate_currency(&code.lexeme, &code.span)?;
                s.expect(TokenKind::RParen)?;
                Some(code.lexeme.clone())
            } else {
                None
            };
            FieldType::Money { currency }
        }
        "enum" => {
            s.expect(TokenKind::LBracket)?;
            let mut values = vec![s.expect_word("enum value")?.lexeme.clone()];
            while s.eat(TokenKind::Comma) {
                values.push(s.expect_word("enum value")?.lexeme.clone());
            }
            s.expect(TokenKind::RBracket)?;
            FieldType::enumeration(values, &span)?
        }
        "text" => FieldType::Text,
        "int" => FieldType::Int,
        "bool" => FieldType::Bool,
        "date" => FieldType::Date,
        "datetime" => FieldType::Datetime,
        "uuid" => FieldType::Uuid,
        "email" => FieldType::Email,
        "json" => FieldType::Json,
        "file" => FieldType::File,
        "url" => FieldType::Url,
        "timezone" => FieldType::Timezone,
        word => match RefKind::parse(word) {
            Some(kind) => {
                let (target, target_span) = s.expect_dotted("target entity")?;
                let on_delete = s
                    .peek()
                    .filter(|t| is_word(t))
                    .and_then(|t| DeleteBehavior::parse(&t.lexeme));
                if on_delete.is_some() {
                    s.advance();
                }
                FieldType::reference(kind, &target, on_delete, &target_span)
            }
            None => {
                return Err(Diagnostic::error(
                    DiagnosticCode::InvalidType,
                    format!("unknown field type '{}'", word),
                    &span,
                ))
            }
        },
    };
    Ok(ty)
}

fn parse_modifiers(
    p: &mut Parser,
    s: &mut TokenStream,
    ty: &FieldType,
) -> Result<BTreeSet<FieldModifier>, Diagnostic> {
    let mut modifiers = BTreeSet::new();
    while let Some(token) = s.peek().filter(|t| is_word(t)) {
        s.advance();
        if let Some(modifier) = FieldModifier::parse(&token.lexeme) {
            if !modifiers.insert(modifier) {
                p.report(Diagnostic::warning(
                    DiagnosticCode::DuplicateModifier,
                    format!("modifier '{}' given more than once", token.lexeme),
                    &token.span,
                ));
            }
        } else if DeleteBehavior::parse(&token.lexeme).is_some() {
            return Err(Diagnostic::error(
                DiagnosticCode::ModifierConflict,
                format!("'{}' only applies to reference fields, not {}", token.lexeme, ty),
                &token.span,
            ));
        } else {
            return Err(Diagnostic::error(
                DiagnosticCode::UnexpectedToken,
                format!("unknown field modifier '{}'", token.lexeme),
                &token.span,
            ));
        }
    }
    Ok(modifiers)
}

fn parse_default(s: &mut TokenStream) -> Result<Option<DefaultValue>, Diagnostic> {
    if !s.eat(TokenKind::Eq) {
        return Ok(None);
    }
    parse_literal(s).map(Some)
}

/// `[-]number`, string, boolean or bare word
pub(crate) fn parse_literal(s: &mut TokenStream) -> Result<DefaultValue, Diagnostic> {
    let negative = s.eat(TokenKind::Minus);
    let Some(token) = s.advance() else {
        return Err(s.expected("default value"));
    };
    let value = match token.kind {
        TokenKind::Number => {
            let text = if negative {
                format!("-{}", token.lexeme)
            } else {
                token.lexeme.clone()
            };
            if let Ok(n) = text.parse::<i64>() {
                DefaultValue::Int(n)
            } else {
                let d = text.parse::<Decimal>().map_err(|_| {
                    Diagnostic::error(
                        DiagnosticCode::InvalidValue,
                        format!("invalid number '{}'", text),
                        &token.span,
                    )
                })?;
                DefaultValue::Decimal(d)
            }
        }
        _ if negative => return Err(s.expected("number")),
        TokenKind::Str => DefaultValue::Str(token.lexeme.clone()),
        TokenKind::Bool => DefaultValue::Bool(token.lexeme == "true"),
        _ if is_word(token) => DefaultValue::Word(token.lexeme.clone()),
        _ => {
            return Err(Diagnostic::error(
                DiagnosticCode::ExpectedToken,
                format!("expected default value, found '{}'", token.lexeme),
                &token.span,
            ))
        }
    };
    Ok(value)
}
