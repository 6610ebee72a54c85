//! `policy` and `tenancy`

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    Classification, ClassifyRule, Construct, ConstructKind, ErasureMode, PolicySpec, Reference, RetentionRule,
    TenancyMode, TenancySpec,
};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::tokenizer::TokenKind;
use crate::parser::{Header, Parser};

pub(super) fn policy(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = PolicySpec {
        name: header.name.clone(),
        title: header.title.clone(),
        classifications: Vec::new(),
        retention: Vec::new(),
        erasure: None,
        span: header.span.clone(),
    };
    for child in &line.children {
        let mut s = child.stream();
        match child.head() {
            Some("classify") => {
                s.advance();
                if let Some(rule) = p.take(classify(&mut s, child)) {
                    spec.classifications.push(rule);
                }
            }
            Some("retention") => {
                s.advance();
                if let Some(rule) = p.take(retention(&mut s, child)) {
                    spec.retention.push(rule);
                }
            }
            _ => match child.entry() {
                Some((key, mut value)) if key.lexeme == "erasure" => {
                    spec.erasure = p.take(value.choice("erasure mode", ErasureMode::parse));
                }
                _ => p.unknown_key(header, child),
            },
        }
    }
    Some(Construct::Policy(spec))
}

/// `Invoice.number as financial`; the last path segment is the field
fn classify(s: &mut TokenStream, line: &Line) -> Result<ClassifyRule, Diagnostic> {
    let (path, span) = s.expect_dotted("entity field")?;
    let Some((entity, field)) = path.rsplit_once('.') else {
        return Err(Diagnostic::error(
            DiagnosticCode::InvalidValue,
            format!("expected 'Entity.field', found '{}'", path),
            &span,
        ));
    };
    s.expect_keyword("as")?;
    let classification = s.choice("classification", Classification::parse)?;
    Ok(ClassifyRule {
        entity: Reference::new(ConstructKind::Entity, entity, span),
        field: field.to_string(),
        classification,
        span: line.span(),
    })
}

/// `Invoice: 7y`
fn retention(s: &mut TokenStream, line: &Line) -> Result<RetentionRule, Diagnostic> {
    let entity = s.expect_reference(ConstructKind::Entity)?;
    s.expect(TokenKind::Colon)?;
    let period = s.duration_value()?;
    Ok(RetentionRule {
        entity,
        period,
        span: line.span(),
    })
}

pub(super) fn tenancy(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = TenancySpec {
        name: header.name.clone(),
        title: header.title.clone(),
        mode: TenancyMode::default(),
        partition_key: None,
        span: header.span.clone(),
    };
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "mode" => {
                if let Some(mode) = p.take(value.choice("tenancy mode", TenancyMode::parse)) {
                    spec.mode = mode;
                }
            }
            "partition_key" => spec.partition_key = p.take(value.word_value("partition key")),
            _ => p.unknown_key(header, child),
        }
    }
    Some(Construct::Tenancy(spec))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, parse, parse_one};
    use super::*;
    use crate::expr::DurationUnit;

    #[test]
    fn test_policy_rules() {
        let source = r#"policy data_retention "Data retention":
  classify Invoice.number as financial
  classify billing.Customer.email as pii
  retention Invoice: 7y
  erasure: anonymize
"#;
        let Construct::Policy(policy) = parse_one(source) else {
            panic!("expected policy");
        };
        let rule = &policy.classifications[0];
        assert_eq!(rule.entity.name, "Invoice");
        assert_eq!(rule.field, "number");
        assert_eq!(rule.classification, Classification::Financial);
        assert_eq!(policy.classifications[1].entity.name, "billing.Customer");

        let retention = &policy.retention[0];
        assert_eq!(retention.period.amount, 7);
        assert_eq!(retention.period.unit, DurationUnit::Years);
        assert_eq!(policy.erasure, Some(ErasureMode::Anonymize));
    }

    #[test]
    fn test_classify_needs_a_field() {
        let (_, diags) = parse("policy p:\n  classify Invoice as pii\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::InvalidValue]);
    }

    #[test]
    fn test_unknown_classification() {
        let (_, diags) = parse("policy p:\n  classify Invoice.number as secret\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::InvalidValue]);
        assert!(diags[0].message.contains("secret"));
    }

    #[test]
    fn test_tenancy_singleton() {
        let Construct::Tenancy(t) = parse_one("tenancy \"Tenancy\":\n  mode: shared_schema\n  partition_key: tenant_id\n")
        else {
            panic!("expected tenancy");
        };
        assert_eq!(t.name, "tenancy");
        assert_eq!(t.title.as_deref(), Some("Tenancy"));
        assert_eq!(t.partition_key.as_deref(), Some("tenant_id"));
    }
}
