//! `flow`, `test`, `story`, `process`, `approval` and `sla`

use std::collections::BTreeMap;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    ApprovalSpec, Construct, ConstructKind, FlowAction, FlowSpec, FlowStep, Priority, ProcessSpec, ProcessStep,
    ProcessTrigger, Reference, SlaSpec, SlaTier, StepKind, StorySpec, TestAction, TestSpec, TimeoutAction,
};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::tokenizer::TokenKind;
use crate::parser::types::parse_literal;
use crate::parser::{Header, Parser};

use super::{entity_trigger, sub_header};

// ── Flow ───────────────────────────────────────────────

pub(super) fn flow(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = FlowSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        priority: None,
        steps: Vec::new(),
        tags: Vec::new(),
        span: header.span.clone(),
    };
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "priority" => spec.priority = p.take(value.choice("priority", Priority::parse)),
            "steps" => {
                for step in &child.children {
                    if let Some(action) = p.take(flow_action(&mut step.stream())) {
                        spec.steps.push(FlowStep {
                            action,
                            span: step.span(),
                        });
                    }
                }
            }
            "tags" => spec.tags = p.take(value.list_value("tag")).unwrap_or_default(),
            _ => p.unknown_key(header, child),
        }
    }
    Some(Construct::Flow(spec))
}

fn flow_action(s: &mut TokenStream) -> Result<FlowAction, Diagnostic> {
    let verb = s.expect_word("flow step")?;
    let action = match verb.lexeme.as_str() {
        "navigate" => FlowAction::Navigate(s.expect_reference(ConstructKind::Surface)?),
        "click" => FlowAction::Click(s.expect_word("action name")?.lexeme.clone()),
        "fill" => FlowAction::Fill {
            field: s.expect_word("field name")?.lexeme.clone(),
            value: s.expect_text("value")?,
        },
        "assert" => FlowAction::Assert {
            check: s.expect_word("assertion")?.lexeme.clone(),
            value: s.expect_text("value")?,
        },
        "wait" => FlowAction::Wait(s.expect_duration()?),
        other => {
            return Err(Diagnostic::error(
                DiagnosticCode::UnknownStatement,
                format!("unknown flow step '{}'", other),
                &verb.span,
            ))
        }
    };
    s.finish()?;
    Ok(action)
}

// ── Test ───────────────────────────────────────────────

pub(super) fn test(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut entity = None;
    let mut action = None;
    let mut data = BTreeMap::new();
    let mut expect = Vec::new();
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "entity" => entity = p.take(value.reference(ConstructKind::Entity)),
            "action" => action = p.take(value.choice("test action", TestAction::parse)),
            "data" => {
                for item in &child.children {
                    let Some((field, mut literal)) = item.entry() else {
                        p.unknown_key(header, item);
                        continue;
                    };
                    let parsed = parse_literal(&mut literal).and_then(|v| literal.finish().map(|_| v));
                    if let Some(v) = p.take(parsed) {
                        data.insert(field.lexeme.clone(), v);
                    }
                }
            }
            "expect" => {
                if let Some(e) = p.expr(value.rest(), &key.span) {
                    expect.push(e);
                }
            }
            _ => p.unknown_key(header, child),
        }
    }

    if entity.is_none() {
        p.missing_key(header, "entity");
    }
    if action.is_none() {
        p.missing_key(header, "action");
    }
    Some(Construct::Test(TestSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        entity: entity?,
        action: action?,
        data,
        expect,
        span: header.span.clone(),
    }))
}

// ── Story ──────────────────────────────────────────────

pub(super) fn story(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = StorySpec {
        name: header.name.clone(),
        title: header.title.clone(),
        actor: None,
        trigger: None,
        scope: Vec::new(),
        given: Vec::new(),
        when: Vec::new(),
        then: Vec::new(),
        span: header.span.clone(),
    };
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "actor" => spec.actor = p.take(value.text_value("actor")),
            "trigger" => spec.trigger = p.take(value.word_value("trigger")),
            "scope" => spec.scope = p.take(entity_list(&mut value)).unwrap_or_default(),
            "given" => spec.given = clauses(p, child, &mut value),
            "when" => spec.when = clauses(p, child, &mut value),
            "then" => spec.then = clauses(p, child, &mut value),
            _ => p.unknown_key(header, child),
        }
    }
    Some(Construct::Story(spec))
}

/// Bullets below the key, or a single string after it
fn clauses(p: &mut Parser, line: &Line, value: &mut TokenStream) -> Vec<String> {
    if value.at_end() {
        p.bullets(line)
    } else {
        p.take(value.string_value("clause")).into_iter().collect()
    }
}

fn entity_list(s: &mut TokenStream) -> Result<Vec<Reference>, Diagnostic> {
    let mut refs = vec![s.expect_reference(ConstructKind::Entity)?];
    while s.eat(TokenKind::Comma) {
        refs.push(s.expect_reference(ConstructKind::Entity)?);
    }
    s.finish()?;
    Ok(refs)
}

// ── Process ────────────────────────────────────────────

pub(super) fn process(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut trigger = None;
    let mut steps = Vec::new();
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "trigger" => trigger = p.take(process_trigger(&mut value)),
            "steps" => {
                for step in &child.children {
                    if let Some(step) = process_step(p, header, step) {
                        steps.push(step);
                    }
                }
            }
            _ => p.unknown_key(header, child),
        }
    }

    let Some(trigger) = trigger else {
        p.missing_key(header, "trigger");
        return None;
    };
    Some(Construct::Process(ProcessSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        trigger,
        steps,
        span: header.span.clone(),
    }))
}

/// `entity Invoice status -> sent`, `schedule "0 9 * * *"` or `manual`
fn process_trigger(s: &mut TokenStream) -> Result<ProcessTrigger, Diagnostic> {
    if s.check(TokenKind::Entity) {
        return entity_trigger(s).map(ProcessTrigger::Entity);
    }
    let trigger = if s.eat_word("schedule") {
        ProcessTrigger::Schedule(s.expect_string("cron expression")?)
    } else if s.eat_word("manual") {
        ProcessTrigger::Manual
    } else {
        return Err(s.expected("'entity', 'schedule' or 'manual'"));
    };
    s.finish()?;
    Ok(trigger)
}

fn process_step(p: &mut Parser, header: &Header, line: &Line) -> Option<ProcessStep> {
    let mut s = line.stream();
    if !s.eat_word("step") {
        p.unknown_key(header, line);
        return None;
    }
    let (name, _) = p.take(sub_header(&mut s, "step name"))?;

    let mut kind = None;
    let mut timeout = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "service" => {
                kind = p.take(value.reference(ConstructKind::Service)).map(StepKind::Service);
            }
            "human_task" => {
                kind = p.take(value.reference(ConstructKind::Surface)).map(StepKind::HumanTask);
            }
            "timeout" => timeout = p.take(value.duration_value()),
            _ => p.unknown_key(header, child),
        }
    }

    let Some(kind) = kind else {
        p.report(Diagnostic::error(
            DiagnosticCode::MissingKey,
            format!("step '{}' needs 'service' or 'human_task'", name),
            &line.span(),
        ));
        return None;
    };
    Some(ProcessStep {
        name,
        kind,
        timeout,
        span: line.span(),
    })
}

// ── Approval ───────────────────────────────────────────

pub(super) fn approval(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut entity = None;
    let mut trigger = None;
    let mut approver_role = None;
    let mut quorum = 1;
    let mut timeout = None;
    let mut on_timeout = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "entity" => entity = p.take(value.reference(ConstructKind::Entity)),
            "trigger" => trigger = p.expr(value.rest(), &key.span),
            "approver_role" => approver_role = p.take(value.word_value("role")),
            "quorum" => {
                let span = value.span();
                match p.take(value.number_value::<u32>("quorum")) {
                    Some(0) => p.report(Diagnostic::error(
                        DiagnosticCode::InvalidValue,
                        "quorum must be at least 1",
                        &span,
                    )),
                    Some(n) => quorum = n,
                    None => {}
                }
            }
            "timeout" => timeout = p.take(value.duration_value()),
            "on_timeout" => on_timeout = p.take(value.choice("timeout action", TimeoutAction::parse)),
            _ => p.unknown_key(header, child),
        }
    }

    for (key, missing) in [
        ("entity", entity.is_none()),
        ("trigger", trigger.is_none()),
        ("approver_role", approver_role.is_none()),
    ] {
        if missing {
            p.missing_key(header, key);
        }
    }
    Some(Construct::Approval(ApprovalSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        entity: entity?,
        trigger: trigger?,
        approver_role: approver_role?,
        quorum,
        timeout,
        on_timeout,
        span: header.span.clone(),
    }))
}

// ── SLA ────────────────────────────────────────────────

pub(super) fn sla(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut entity = None;
    let mut starts_when = None;
    let mut completes_when = None;
    let mut pauses_when = None;
    let mut tiers = Vec::new();
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "entity" => entity = p.take(value.reference(ConstructKind::Entity)),
            "starts_when" => starts_when = p.expr(value.rest(), &key.span),
            "completes_when" => completes_when = p.expr(value.rest(), &key.span),
            "pauses_when" => pauses_when = p.expr(value.rest(), &key.span),
            "tiers" => {
                for tier in &child.children {
                    let Some((level, mut after)) = tier.entry() else {
                        p.unknown_key(header, tier);
                        continue;
                    };
                    if let Some(after) = p.take(after.duration_value()) {
                        tiers.push(SlaTier {
                            level: level.lexeme.clone(),
                            after,
                        });
                    }
                }
            }
            _ => p.unknown_key(header, child),
        }
    }

    for (key, missing) in [
        ("entity", entity.is_none()),
        ("starts_when", starts_when.is_none()),
        ("completes_when", completes_when.is_none()),
    ] {
        if missing {
            p.missing_key(header, key);
        }
    }
    Some(Construct::Sla(SlaSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        entity: entity?,
        starts_when: starts_when?,
        completes_when: completes_when?,
        pauses_when,
        tiers,
        span: header.span.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, parse, parse_one};
    use super::*;
    use crate::expr::{DurationLiteral, DurationUnit};
    use crate::ir::{DefaultValue, EntityEvent, TriggerEvent};

    #[test]
    fn test_flow_steps() {
        let source = r#"flow pay_invoice "Pay invoice":
  priority: high
  steps:
    navigate invoice_list
    click view_detail
    fill amount "100"
    assert visible "Paid"
    wait 2s
  tags: billing, smoke
"#;
        let Construct::Flow(f) = parse_one(source) else {
            panic!("expected flow");
        };
        assert_eq!(f.priority, Some(Priority::High));
        let actions: Vec<_> = f.steps.iter().map(|s| &s.action).collect();
        assert!(matches!(actions[0], FlowAction::Navigate(r) if r.name == "invoice_list"));
        assert_eq!(actions[1], &FlowAction::Click("view_detail".into()));
        assert_eq!(
            actions[2],
            &FlowAction::Fill {
                field: "amount".into(),
                value: "100".into()
            }
        );
        assert_eq!(
            actions[4],
            &FlowAction::Wait(DurationLiteral {
                amount: 2,
                unit: DurationUnit::Seconds
            })
        );
        assert_eq!(f.tags, vec!["billing".to_string(), "smoke".to_string()]);
    }

    #[test]
    fn test_unknown_flow_step() {
        let (_, diags) = parse("flow f:\n  steps:\n    dance wildly\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::UnknownStatement]);
    }

    #[test]
    fn test_entity_test_construct() {
        let source = "test create_invoice \"Create invoice\":\n  entity: Invoice\n  action: create\n  data:\n    number: \"INV-1\"\n    amount: -5\n  expect: status = \"draft\"\n";
        let Construct::Test(t) = parse_one(source) else {
            panic!("expected test");
        };
        assert_eq!(t.action, TestAction::Create);
        assert_eq!(t.data.get("number"), Some(&DefaultValue::Str("INV-1".into())));
        assert_eq!(t.data.get("amount"), Some(&DefaultValue::Int(-5)));
        assert_eq!(t.expect.len(), 1);
    }

    #[test]
    fn test_story() {
        let source = r#"story mark_paid "Accountant marks invoice as paid":
  actor: accountant
  trigger: status_changed
  scope: Invoice
  given:
    - "Invoice is sent"
  then:
    - "Invoice status becomes paid"
"#;
        let Construct::Story(s) = parse_one(source) else {
            panic!("expected story");
        };
        assert_eq!(s.actor.as_deref(), Some("accountant"));
        assert_eq!(s.scope[0].kind, ConstructKind::Entity);
        assert_eq!(s.given, vec!["Invoice is sent".to_string()]);
        assert!(s.when.is_empty());
        assert_eq!(s.then.len(), 1);
    }

    #[test]
    fn test_process() {
        let source = r#"process collect "Collection":
  trigger: entity Invoice status -> sent
  steps:
    step remind:
      service: credit_check
      timeout: 3d
    step escalate:
      human_task: invoice_detail
"#;
        let Construct::Process(spec) = parse_one(source) else {
            panic!("expected process");
        };
        assert!(matches!(&spec.trigger, ProcessTrigger::Entity(t) if t.entity.name == "Invoice"));
        assert!(matches!(&spec.steps[0].kind, StepKind::Service(r) if r.name == "credit_check"));
        assert_eq!(spec.steps[0].timeout.as_ref().map(|d| d.amount), Some(3));
        assert!(matches!(&spec.steps[1].kind, StepKind::HumanTask(r) if r.kind == ConstructKind::Surface));
    }

    #[test]
    fn test_process_schedule_and_manual_triggers() {
        let Construct::Process(spec) = parse_one("process nightly:\n  trigger: schedule \"0 2 * * *\"\n") else {
            panic!("expected process");
        };
        assert_eq!(spec.trigger, ProcessTrigger::Schedule("0 2 * * *".into()));
        let Construct::Process(spec) = parse_one("process adhoc:\n  trigger: manual\n") else {
            panic!("expected process");
        };
        assert_eq!(spec.trigger, ProcessTrigger::Manual);
    }

    #[test]
    fn test_process_lifecycle_trigger() {
        let Construct::Process(spec) = parse_one("process p:\n  trigger: entity Invoice deleted\n") else {
            panic!("expected process");
        };
        let ProcessTrigger::Entity(t) = spec.trigger else {
            panic!("expected entity trigger");
        };
        assert_eq!(t.event, TriggerEvent::Lifecycle(EntityEvent::Deleted));
    }

    #[test]
    fn test_step_without_target() {
        let (_, diags) = parse("process p:\n  trigger: manual\n  steps:\n    step idle:\n      timeout: 1h\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::MissingKey]);
    }

    #[test]
    fn test_approval() {
        let source = "approval large_invoice \"Large invoice\":\n  entity: Invoice\n  trigger: total > 1000\n  approver_role: finance_lead\n  quorum: 2\n  timeout: 2d\n  on_timeout: escalate\n";
        let Construct::Approval(a) = parse_one(source) else {
            panic!("expected approval");
        };
        assert_eq!(a.quorum, 2);
        assert_eq!(a.approver_role, "finance_lead");
        assert_eq!(a.on_timeout, Some(TimeoutAction::Escalate));
    }

    #[test]
    fn test_approval_defaults_and_requirements() {
        let Construct::Approval(a) = parse_one("approval a:\n  entity: Invoice\n  trigger: true\n  approver_role: lead\n") else {
            panic!("expected approval");
        };
        assert_eq!(a.quorum, 1);

        let (fragment, diags) = parse("approval b:\n  entity: Invoice\n  quorum: 0\n");
        assert_eq!(
            codes(&diags),
            vec![DiagnosticCode::InvalidValue, DiagnosticCode::MissingKey, DiagnosticCode::MissingKey]
        );
        assert!(fragment.constructs.is_empty());
    }

    #[test]
    fn test_sla_tiers() {
        let source = "sla invoice_response \"Invoice response\":\n  entity: Invoice\n  starts_when: status = \"sent\"\n  completes_when: status = \"paid\"\n  tiers:\n    warning: 20d\n    breach: 30d\n";
        let Construct::Sla(sla) = parse_one(source) else {
            panic!("expected sla");
        };
        let levels: Vec<_> = sla.tiers.iter().map(|t| (t.level.as_str(), t.after.amount)).collect();
        assert_eq!(levels, vec![("warning", 20), ("breach", 30)]);
        assert!(sla.pauses_when.is_none());
    }
}
