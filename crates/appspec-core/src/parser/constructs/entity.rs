//! `entity` and `enum`

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    AccessOp, AccessRule, ComputedField, Construct, EntityDraft, EntitySpec, EnumSpec, EnumValue, StateRef,
    Transition, TransitionConstraint,
};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::tokenizer::TokenKind;
use crate::parser::types::parse_field;
use crate::parser::{Header, Parser};

pub(super) fn entity(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut draft = EntityDraft {
        name: header.name.clone(),
        title: header.title.clone(),
        span: header.span.clone(),
        ..Default::default()
    };

    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "invariant" => {
                if let Some(expr) = p.expr(value.rest(), &key.span) {
                    draft.invariants.push(expr);
                }
            }
            "index" => {
                if let Some(fields) = p.take(value.list_value("field name")) {
                    draft.indexes.push((fields, key.span.clone()));
                }
            }
            "unique" => {
                if let Some(fields) = p.take(value.list_value("field name")) {
                    draft.unique_constraints.push((fields, key.span.clone()));
                }
            }
            "transitions" => {
                p.take(value.finish());
                for rule in &child.children {
                    if let Some(transition) = transition(p, rule) {
                        draft.transitions.push(transition);
                    }
                }
            }
            "access" => {
                p.take(value.finish());
                for rule in &child.children {
                    if let Some(rule) = access_rule(p, header, rule) {
                        draft.access.push(rule);
                    }
                }
            }
            _ if value.check_word("computed") => {
                value.advance();
                if let Some(expr) = p.expr(value.rest(), &key.span) {
                    draft.computed.push(ComputedField {
                        name: key.lexeme.clone(),
                        expr,
                        span: key.span.clone(),
                    });
                }
            }
            _ => {
                if let Some(field) = parse_field(p, header, child) {
                    draft.fields.push(field);
                }
            }
        }
    }

    match EntitySpec::new(draft) {
        Ok(entity) => Some(Construct::Entity(entity)),
        Err(errors) => {
            for error in errors {
                p.report(error);
            }
            None
        }
    }
}

// ── State machine ──────────────────────────────────────

/// `from -> to[: constraint, ...]`
fn transition(p: &mut Parser, line: &Line) -> Option<Transition> {
    let mut s = line.stream();
    let (from, to) = p.take(transition_states(&mut s))?;

    let mut constraints = Vec::new();
    if s.eat(TokenKind::Colon) {
        while !s.at_end() {
            if s.eat(TokenKind::Comma) {
                continue;
            }
            if s.eat_word("when") {
                let guard = p.expr(s.rest(), &line.span())?;
                constraints.push(TransitionConstraint::Guard(guard));
            } else {
                constraints.push(p.take(constraint(&mut s))?);
            }
        }
    }
    p.take(s.finish())?;

    Some(Transition {
        from,
        to,
        constraints,
        span: line.span(),
    })
}

fn transition_states(s: &mut TokenStream) -> Result<(StateRef, String), Diagnostic> {
    let from = if s.eat(TokenKind::Star) {
        StateRef::Any
    } else {
        StateRef::State(s.expect_word("source state or '*'")?.lexeme.clone())
    };
    s.expect(TokenKind::Arrow)?;
    let to = s.expect_word("target state")?.lexeme.clone();
    Ok((from, to))
}

fn constraint(s: &mut TokenStream) -> Result<TransitionConstraint, Diagnostic> {
    let word = s.expect_word("transition constraint")?;
    match word.lexeme.as_str() {
        "requires" => {
            let parenthesized = s.eat(TokenKind::LParen);
            let field = s.expect_word("field name")?.lexeme.clone();
            if parenthesized {
                s.expect(TokenKind::RParen)?;
            }
            Ok(TransitionConstraint::Requires(field))
        }
        "role" => Ok(TransitionConstraint::Role(role_list(s)?)),
        "auto" => {
            s.expect_keyword("after")?;
            Ok(TransitionConstraint::AutoAfter(s.expect_duration()?))
        }
        "manual" => Ok(TransitionConstraint::Manual),
        other => Err(Diagnostic::error(
            DiagnosticCode::UnexpectedToken,
            format!("unknown transition constraint '{}'", other),
            &word.span,
        )),
    }
}

/// `(a, b)` after `role`
fn role_list(s: &mut TokenStream) -> Result<Vec<String>, Diagnostic> {
    s.expect(TokenKind::LParen)?;
    let roles = s.expect_word_list("role")?;
    s.expect(TokenKind::RParen)?;
    Ok(roles)
}

// ── Access rules ───────────────────────────────────────

/// `op: [role(a, b)] [when] condition`
fn access_rule(p: &mut Parser, header: &Header, line: &Line) -> Option<AccessRule> {
    let Some((key, mut s)) = line.entry() else {
        p.unknown_key(header, line);
        return None;
    };
    let Some(op) = AccessOp::parse(&key.lexeme) else {
        p.report(Diagnostic::error(
            DiagnosticCode::InvalidValue,
            format!("unknown access operation '{}'", key.lexeme),
            &key.span,
        ));
        return None;
    };

    let mut roles = Vec::new();
    if s.check_word("role") && s.peek_nth(1).is_some_and(|t| t.kind == TokenKind::LParen) {
        s.advance();
        roles = p.take(role_list(&mut s))?;
        if !s.eat_word("when") {
            p.take(s.finish())?;
            return Some(AccessRule {
                op,
                roles,
                condition: None,
                span: key.span.clone(),
            });
        }
    }
    let condition = p.expr(s.rest(), &key.span)?;
    Some(AccessRule {
        op,
        roles,
        condition: Some(condition),
        span: key.span.clone(),
    })
}

// ── Enums ──────────────────────────────────────────────

pub(super) fn enumeration(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut values = Vec::new();
    for child in &line.children {
        let mut s = child.stream();
        if let Some((name, title)) = p.take(super::titled(&mut s, "enum value")) {
            values.push(EnumValue { name, title });
        }
    }
    match EnumSpec::new(header.name.clone(), header.title.clone(), values, header.span.clone()) {
        Ok(spec) => Some(Construct::Enum(spec)),
        Err(errors) => {
            for error in errors {
                p.report(error);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, parse, parse_one};
    use super::*;
    use crate::ir::{DeleteBehavior, FieldModifier, FieldType, RefKind};

    const INVOICE: &str = r#"entity Invoice "Invoice":
  id: uuid pk
  number: str(50) required unique
  total: decimal(10,2) required = 0
  status: enum[draft,sent,paid,void]=draft
  customer: ref Customer required
  lines: has_many InvoiceLine cascade
  due_date: date required
  created_at: datetime auto_add
  line_total: computed sum(lines.amount)
  invariant: due_date > created_at
  index: number, status
  unique: customer, number
  transitions:
    draft -> sent: requires number
    sent -> paid: role(accountant, admin)
    * -> void: role(admin)
    sent -> draft: manual
    sent -> void: auto after 30 days
    paid -> void: when total = 0
  access:
    read: role(admin, accountant)
    update: role(accountant) when status != "paid"
    delete: status = "draft"
"#;

    fn invoice() -> EntitySpec {
        match parse_one(INVOICE) {
            Construct::Entity(e) => e,
            other => panic!("expected entity, got {:?}", other),
        }
    }

    #[test]
    fn test_full_entity() {
        let e = invoice();
        assert_eq!(e.title.as_deref(), Some("Invoice"));
        assert_eq!(e.fields.len(), 8);
        assert_eq!(e.computed.len(), 1);
        assert_eq!(e.invariants.len(), 1);
        assert_eq!(e.indexes, vec![vec!["number".to_string(), "status".to_string()]]);
        assert_eq!(e.unique_constraints.len(), 1);
        assert_eq!(e.transitions.len(), 6);
        assert_eq!(e.access.len(), 3);
        assert_eq!(e.primary_key().map(|f| f.name.as_str()), Some("id"));
        assert_eq!(e.state_field().map(|f| f.name.as_str()), Some("status"));
    }

    #[test]
    fn test_field_details() {
        let e = invoice();
        let number = e.field("number").unwrap();
        assert!(number.has(FieldModifier::Required) && number.has(FieldModifier::Unique));
        match &e.field("lines").unwrap().ty {
            FieldType::Reference { kind, on_delete, .. } => {
                assert_eq!(*kind, RefKind::HasMany);
                assert_eq!(*on_delete, Some(DeleteBehavior::Cascade));
            }
            other => panic!("unexpected type {:?}", other),
        }
        assert!(e.field("line_total").is_none());
        assert!(e.has_member("line_total"));
    }

    #[test]
    fn test_transition_constraints() {
        let e = invoice();
        assert_eq!(e.transitions[0].constraints, vec![TransitionConstraint::Requires("number".into())]);
        assert_eq!(
            e.transitions[1].constraints,
            vec![TransitionConstraint::Role(vec!["accountant".into(), "admin".into()])]
        );
        assert_eq!(e.transitions[2].from, StateRef::Any);
        assert_eq!(e.transitions[3].constraints, vec![TransitionConstraint::Manual]);
        match &e.transitions[4].constraints[0] {
            TransitionConstraint::AutoAfter(d) => assert_eq!(d.to_string(), "30d"),
            other => panic!("unexpected constraint {:?}", other),
        }
        match &e.transitions[5].constraints[0] {
            TransitionConstraint::Guard(g) => assert_eq!(g.to_string(), "(total = 0)"),
            other => panic!("unexpected constraint {:?}", other),
        }
    }

    #[test]
    fn test_access_rules() {
        let e = invoice();
        assert_eq!(e.access[0].op, AccessOp::Read);
        assert_eq!(e.access[0].roles, vec!["admin".to_string(), "accountant".to_string()]);
        assert!(e.access[0].condition.is_none());
        assert_eq!(e.access[1].roles, vec!["accountant".to_string()]);
        assert!(e.access[1].condition.is_some());
        assert!(e.access[2].roles.is_empty());
        assert!(e.access[2].condition.is_some());
    }

    #[test]
    fn test_delete_behavior_on_scalar_rejected() {
        let (fragment, diags) = parse("entity A:\n  id: uuid pk\n  n: int cascade\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::ModifierConflict]);
        assert_eq!(fragment.rejected[0].member.as_deref(), Some("n"));
    }

    #[test]
    fn test_duplicate_modifier_warns_but_keeps_field() {
        let (fragment, diags) = parse("entity A:\n  id: uuid pk pk\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::DuplicateModifier]);
        assert!(!diags[0].is_error());
        assert_eq!(fragment.constructs.len(), 1);
    }

    #[test]
    fn test_unknown_state_in_transition() {
        let (fragment, diags) = parse("entity A:\n  status: enum[open,closed]\n  transitions:\n    open -> archived\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::InvalidTransition]);
        assert!(fragment.constructs.is_empty());
        assert_eq!(fragment.rejected[0].name, "A");
    }

    #[test]
    fn test_bad_invariant_expression() {
        let (_, diags) = parse("entity A:\n  n: int\n  invariant: n >\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::ExprSyntax]);
    }

    #[test]
    fn test_enum_construct() {
        match parse_one("enum Priority \"Priority\":\n  low \"Low\"\n  high \"High\"\n") {
            Construct::Enum(e) => {
                let names: Vec<_> = e.values.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, vec!["low", "high"]);
                assert_eq!(e.values[1].title.as_deref(), Some("High"));
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_enum_rejected() {
        let (fragment, diags) = parse("enum Empty:\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::InvalidType]);
        assert_eq!(fragment.rejected.len(), 1);
    }
}
