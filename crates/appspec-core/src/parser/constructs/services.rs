//! `service`, `foreign_model`, `integration` and `webhook`

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    Construct, ConstructKind, EntityEvent, FieldSpec, ForeignModelSpec, IntegrationAction, IntegrationSpec,
    Reference, ServiceCall, ServiceKind, ServiceSpec, SurfaceTrigger, SyncMode, SyncSpec, WebhookSpec,
};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::tokenizer::TokenKind;
use crate::parser::types::parse_field;
use crate::parser::{Header, Parser};

use super::sub_header;

// ── Service ────────────────────────────────────────────

pub(super) fn service(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = ServiceSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        kind: ServiceKind::default(),
        spec_url: None,
        auth_profile: None,
        input: Vec::new(),
        output: Vec::new(),
        guarantees: Vec::new(),
        stub: None,
        span: header.span.clone(),
    };
    let mut explicit_kind = false;

    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "kind" => {
                let kind = value.choice("service kind", |w| match w {
                    "domain_logic" => Some(ServiceKind::DomainLogic),
                    "external" => Some(ServiceKind::External),
                    _ => None,
                });
                if let Some(kind) = p.take(kind) {
                    spec.kind = kind;
                    explicit_kind = true;
                }
            }
            "spec" => {
                let url = value.expect_keyword("url").and_then(|_| value.string_value("spec url"));
                spec.spec_url = p.take(url);
            }
            "auth_profile" => spec.auth_profile = p.take(value.word_value("auth profile")),
            "input" => spec.input = field_block(p, header, child),
            "output" => spec.output = field_block(p, header, child),
            "guarantees" => spec.guarantees = p.bullets(child),
            "stub" => spec.stub = p.take(value.text_value("stub language")),
            _ => p.unknown_key(header, child),
        }
    }

    // a service described by a remote document is external unless told otherwise
    if spec.spec_url.is_some() && !explicit_kind {
        spec.kind = ServiceKind::External;
    }
    Some(Construct::Service(spec))
}

fn field_block(p: &mut Parser, header: &Header, line: &Line) -> Vec<FieldSpec> {
    line.children
        .iter()
        .filter_map(|child| parse_field(p, header, child))
        .collect()
}

// ── Foreign model ──────────────────────────────────────

pub(super) fn foreign_model(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut s = TokenStream::with_end(&header.extra, header.span.clone());
    let service = p.take(from_service(&mut s));

    let mut key = Vec::new();
    let mut fields = Vec::new();
    for child in &line.children {
        match child.entry() {
            Some((k, mut value)) if k.lexeme == "key" => {
                key = p.take(value.list_value("key field")).unwrap_or_default();
            }
            _ => {
                if let Some(field) = parse_field(p, header, child) {
                    fields.push(field);
                }
            }
        }
    }

    let Some(service) = service else {
        return None;
    };
    Some(Construct::ForeignModel(ForeignModelSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        service,
        key,
        fields,
        span: header.span.clone(),
    }))
}

/// `from stripe` after the foreign model's name
fn from_service(s: &mut TokenStream) -> Result<Reference, Diagnostic> {
    s.expect_keyword("from")?;
    s.reference(ConstructKind::Service)
}

// ── Integration ────────────────────────────────────────

pub(super) fn integration(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = IntegrationSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        services: Vec::new(),
        foreign_models: Vec::new(),
        actions: Vec::new(),
        syncs: Vec::new(),
        span: header.span.clone(),
    };

    for child in &line.children {
        let mut s = child.stream();
        match child.head() {
            Some("uses") => {
                s.advance();
                let target = if s.eat(TokenKind::Service) {
                    s.reference(ConstructKind::Service).map(|r| (r, true))
                } else if s.eat_word("foreign") || s.eat(TokenKind::ForeignModel) {
                    s.reference(ConstructKind::ForeignModel).map(|r| (r, false))
                } else {
                    Err(s.expected("'service' or 'foreign'"))
                };
                match p.take(target) {
                    Some((r, true)) => spec.services.push(r),
                    Some((r, false)) => spec.foreign_models.push(r),
                    None => {}
                }
            }
            Some("action") if child.entry().is_none() => {
                if let Some(action) = integration_action(p, header, child) {
                    spec.actions.push(action);
                }
            }
            Some("sync") if child.entry().is_none() => {
                if let Some(sync) = sync(p, header, child) {
                    spec.syncs.push(sync);
                }
            }
            _ => p.unknown_key(header, child),
        }
    }
    Some(Construct::Integration(spec))
}

fn integration_action(p: &mut Parser, header: &Header, line: &Line) -> Option<IntegrationAction> {
    let mut s = line.stream();
    s.advance();
    let (name, _) = p.take(sub_header(&mut s, "action name"))?;

    let mut action = IntegrationAction {
        name,
        trigger: None,
        call: None,
        span: line.span(),
    };
    for child in &line.children {
        let mut s = child.stream();
        match child.head() {
            Some("when") => {
                s.advance();
                action.trigger = p.take(surface_trigger(&mut s));
            }
            Some("call") => {
                s.advance();
                action.call = p.take(service_call(&mut s).and_then(|call| s.finish().map(|_| call)));
            }
            _ => p.unknown_key(header, child),
        }
    }
    Some(action)
}

/// `surface invoice_detail submitted`
fn surface_trigger(s: &mut TokenStream) -> Result<SurfaceTrigger, Diagnostic> {
    s.expect(TokenKind::Surface)?;
    let surface = s.expect_reference(ConstructKind::Surface)?;
    let event = s.expect_word("surface event")?.lexeme.clone();
    s.finish()?;
    Ok(SurfaceTrigger { surface, event })
}

/// `stripe.create_charge`, split at the last dot
fn service_call(s: &mut TokenStream) -> Result<ServiceCall, Diagnostic> {
    let (path, span) = s.expect_dotted("service operation")?;
    match path.rsplit_once('.') {
        Some((service, operation)) => Ok(ServiceCall {
            service: Reference::new(ConstructKind::Service, service, span),
            operation: operation.to_string(),
        }),
        None => Err(Diagnostic::error(
            DiagnosticCode::InvalidValue,
            format!("expected 'service.operation', found '{}'", path),
            &span,
        )),
    }
}

fn sync(p: &mut Parser, header: &Header, line: &Line) -> Option<SyncSpec> {
    let mut s = line.stream();
    s.advance();
    let (name, _) = p.take(sub_header(&mut s, "sync name"))?;

    let mut mode = None;
    let mut source = None;
    for child in &line.children {
        if let Some((key, mut value)) = child.entry() {
            if key.lexeme == "mode" {
                mode = p.take(sync_mode(&mut value));
            } else {
                p.unknown_key(header, child);
            }
            continue;
        }
        if child.head() == Some("from") {
            let mut s = child.stream();
            s.advance();
            source = p.take(sync_source(&mut s));
        } else {
            p.unknown_key(header, child);
        }
    }

    let Some((from, foreign_model, into)) = source else {
        p.report(Diagnostic::error(
            DiagnosticCode::MissingKey,
            format!("sync '{}' is missing 'from'", name),
            &line.span(),
        ));
        return None;
    };
    Some(SyncSpec {
        name,
        mode: mode.unwrap_or(SyncMode::EventDriven),
        from,
        foreign_model,
        into,
        span: line.span(),
    })
}

/// `scheduled "0 * * * *"` or `event_driven`
fn sync_mode(s: &mut TokenStream) -> Result<SyncMode, Diagnostic> {
    let mode = if s.eat_word("scheduled") {
        SyncMode::Scheduled(s.expect_string("cron expression")?)
    } else if s.eat_word("event_driven") {
        SyncMode::EventDriven
    } else {
        return Err(s.expected("'scheduled' or 'event_driven'"));
    };
    s.finish()?;
    Ok(mode)
}

/// `stripe.list_customers [as StripeCustomer] [into Customer]`
fn sync_source(s: &mut TokenStream) -> Result<(ServiceCall, Option<Reference>, Option<Reference>), Diagnostic> {
    let call = service_call(s)?;
    let foreign_model = if s.eat_word("as") {
        Some(s.expect_reference(ConstructKind::ForeignModel)?)
    } else {
        None
    };
    let into = if s.eat_word("into") {
        Some(s.expect_reference(ConstructKind::Entity)?)
    } else {
        None
    };
    s.finish()?;
    Ok((call, foreign_model, into))
}

// ── Webhook ────────────────────────────────────────────

pub(super) fn webhook(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut entity = None;
    let mut events = Vec::new();
    let mut url = None;
    let mut auth = None;
    let mut retry = None;

    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "entity" => entity = p.take(value.reference(ConstructKind::Entity)),
            "events" => events = p.take(event_list(&mut value)).unwrap_or_default(),
            "url" => url = p.take(value.string_value("url")),
            "auth" => auth = p.take(value.word_value("auth scheme")),
            "retry" => retry = p.take(value.number_value("retry count")),
            _ => p.unknown_key(header, child),
        }
    }

    if entity.is_none() {
        p.missing_key(header, "entity");
    }
    if url.is_none() {
        p.missing_key(header, "url");
    }
    Some(Construct::Webhook(WebhookSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        entity: entity?,
        events,
        url: url?,
        auth,
        retry,
        span: header.span.clone(),
    }))
}

fn event_list(s: &mut TokenStream) -> Result<Vec<EntityEvent>, Diagnostic> {
    let mut events = Vec::new();
    loop {
        let word = s.expect_word("entity event")?;
        let event = EntityEvent::parse(&word.lexeme).ok_or_else(|| {
            Diagnostic::error(
                DiagnosticCode::InvalidValue,
                format!("unknown entity event '{}'", word.lexeme),
                &word.span,
            )
        })?;
        events.push(event);
        if !s.eat(TokenKind::Comma) {
            break;
        }
    }
    s.finish()?;
    Ok(events)
}
