//! `message`, `channel` and `event`

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    ChannelKind, ChannelSpec, Construct, ConstructKind, EntityEvent, EventSpec, MessageSpec, SendSpec,
};
use crate::parser::lines::Line;
use crate::parser::types::parse_field;
use crate::parser::{Header, Parser};

use super::{entity_trigger, sub_header};

pub(super) fn message(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let fields = line
        .children
        .iter()
        .filter_map(|child| parse_field(p, header, child))
        .collect();
    Some(Construct::Message(MessageSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        fields,
        span: header.span.clone(),
    }))
}

pub(super) fn channel(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut kind = None;
    let mut sends = Vec::new();
    for child in &line.children {
        match child.entry() {
            Some((key, mut value)) if key.lexeme == "kind" => {
                kind = p.take(value.choice("channel kind", ChannelKind::parse));
            }
            None if child.head() == Some("send") => {
                if let Some(send) = send(p, child) {
                    sends.push(send);
                }
            }
            _ => p.unknown_key(header, child),
        }
    }

    let Some(kind) = kind else {
        p.missing_key(header, "kind");
        return None;
    };
    Some(Construct::Channel(ChannelSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        kind,
        sends,
        span: header.span.clone(),
    }))
}

/// `send name:` with `message` and an optional `when` trigger
fn send(p: &mut Parser, line: &Line) -> Option<SendSpec> {
    let mut s = line.stream();
    s.advance();
    let (name, _) = p.take(sub_header(&mut s, "send name"))?;

    let mut message = None;
    let mut trigger = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.report(unknown_send_key(child));
            continue;
        };
        match key.lexeme.as_str() {
            "message" => message = p.take(value.reference(ConstructKind::Message)),
            "when" => trigger = p.take(entity_trigger(&mut value)),
            _ => p.report(unknown_send_key(child)),
        }
    }

    let Some(message) = message else {
        p.report(Diagnostic::error(
            DiagnosticCode::MissingKey,
            format!("send '{}' is missing required key 'message'", name),
            &line.span(),
        ));
        return None;
    };
    Some(SendSpec {
        name,
        message,
        trigger,
        span: line.span(),
    })
}

fn unknown_send_key(line: &Line) -> Diagnostic {
    let key = line.tokens.first().map(|t| t.lexeme.as_str()).unwrap_or_default();
    Diagnostic::error(
        DiagnosticCode::UnknownKey,
        format!("unknown key '{}' in send block", key),
        &line.span(),
    )
}

pub(super) fn event(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut source = None;
    let mut on = None;
    let mut topic = None;
    let mut payload = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "source" => source = p.take(value.reference(ConstructKind::Entity)),
            "on" => on = p.take(value.choice("entity event", EntityEvent::parse)),
            "topic" => topic = p.take(value.string_value("topic")),
            "payload" => payload = p.take(value.reference(ConstructKind::Message)),
            _ => p.unknown_key(header, child),
        }
    }

    if source.is_none() {
        p.missing_key(header, "source");
    }
    if on.is_none() {
        p.missing_key(header, "on");
    }
    Some(Construct::Event(EventSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        source: source?,
        on: on?,
        topic,
        payload,
        span: header.span.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, parse, parse_one};
    use super::*;
    use crate::ir::TriggerEvent;

    #[test]
    fn test_message_fields() {
        let source = "message InvoiceSent \"Invoice sent\":\n  invoice_id: uuid required\n  sent_at: datetime\n";
        let Construct::Message(m) = parse_one(source) else {
            panic!("expected message");
        };
        let names: Vec<_> = m.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["invoice_id", "sent_at"]);
    }

    #[test]
    fn test_channel_send_with_field_trigger() {
        let source = r#"channel notifications "Notifications":
  kind: email
  send invoice_sent:
    message: InvoiceSent
    when: entity Invoice status -> sent
"#;
        let Construct::Channel(c) = parse_one(source) else {
            panic!("expected channel");
        };
        assert_eq!(c.kind, ChannelKind::Email);
        let send = &c.sends[0];
        assert_eq!(send.message.kind, ConstructKind::Message);
        let trigger = send.trigger.as_ref().unwrap();
        assert_eq!(trigger.entity.name, "Invoice");
        assert_eq!(
            trigger.event,
            TriggerEvent::FieldChanged {
                field: "status".into(),
                to: "sent".into()
            }
        );
    }

    #[test]
    fn test_channel_requires_kind() {
        let (fragment, diags) = parse("channel c:\n  send s:\n    message: M\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::MissingKey]);
        assert_eq!(fragment.rejected[0].kind, ConstructKind::Channel);
    }

    #[test]
    fn test_send_with_lifecycle_trigger() {
        let source = "channel c:\n  kind: queue\n  send s:\n    message: M\n    when: entity Invoice created\n";
        let Construct::Channel(c) = parse_one(source) else {
            panic!("expected channel");
        };
        assert_eq!(
            c.sends[0].trigger.as_ref().map(|t| &t.event),
            Some(&TriggerEvent::Lifecycle(EntityEvent::Created))
        );
    }

    #[test]
    fn test_event() {
        let source = "event invoice_paid:\n  source: Invoice\n  on: updated\n  topic: \"billing.invoices\"\n  payload: InvoiceSent\n";
        let Construct::Event(e) = parse_one(source) else {
            panic!("expected event");
        };
        assert_eq!(e.on, EntityEvent::Updated);
        assert_eq!(e.topic.as_deref(), Some("billing.invoices"));
        assert_eq!(e.payload.map(|r| r.name), Some("InvoiceSent".to_string()));
    }

    #[test]
    fn test_event_unknown_lifecycle() {
        let (_, diags) = parse("event e:\n  source: Invoice\n  on: exploded\n");
        assert_eq!(
            codes(&diags),
            vec![DiagnosticCode::InvalidValue, DiagnosticCode::MissingKey]
        );
    }
}
