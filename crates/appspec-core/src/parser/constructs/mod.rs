//! Construct parsers, one module per category
//!
//! Every parser has the same shape: it receives the parsed header and the
//! header line (whose children are the body), reports its own diagnostics
//! and returns the finished node, or `None` when the construct cannot be
//! built at all. Sub-blocks that belong to a construct's own grammar
//! (`section`, `region`, `transfer`, ...) are parsed inside that module.

mod entity;
mod governance;
mod ledger;
mod llm;
mod messaging;
mod services;
mod ui;
mod workflow;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{Construct, ConstructKind, EntityEvent, EntityTrigger, TriggerEvent};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::tokenizer::TokenKind;
use crate::parser::{Header, Parser};

pub(crate) fn parse_construct(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    match header.kind {
        ConstructKind::Entity => entity::entity(p, header, line),
        ConstructKind::Enum => entity::enumeration(p, header, line),
        ConstructKind::Surface => ui::surface(p, header, line),
        ConstructKind::Workspace => ui::workspace(p, header, line),
        ConstructKind::View => ui::view(p, header, line),
        ConstructKind::Persona => ui::persona(p, header, line),
        ConstructKind::Service => services::service(p, header, line),
        ConstructKind::ForeignModel => services::foreign_model(p, header, line),
        ConstructKind::Integration => services::integration(p, header, line),
        ConstructKind::Webhook => services::webhook(p, header, line),
        ConstructKind::Flow => workflow::flow(p, header, line),
        ConstructKind::Test => workflow::test(p, header, line),
        ConstructKind::Story => workflow::story(p, header, line),
        ConstructKind::Process => workflow::process(p, header, line),
        ConstructKind::Approval => workflow::approval(p, header, line),
        ConstructKind::Sla => workflow::sla(p, header, line),
        ConstructKind::Message => messaging::message(p, header, line),
        ConstructKind::Channel => messaging::channel(p, header, line),
        ConstructKind::Event => messaging::event(p, header, line),
        ConstructKind::Ledger => ledger::ledger(p, header, line),
        ConstructKind::Transaction => ledger::transaction(p, header, line),
        ConstructKind::Policy => governance::policy(p, header, line),
        ConstructKind::Tenancy => governance::tenancy(p, header, line),
        ConstructKind::LlmModel => llm::model(p, header, line),
        ConstructKind::LlmIntent => llm::intent(p, header, line),
    }
}

/// `entity Invoice created` or `entity Invoice status -> sent`
pub(crate) fn entity_trigger(s: &mut TokenStream) -> Result<EntityTrigger, Diagnostic> {
    s.expect(TokenKind::Entity)?;
    let entity = s.expect_reference(ConstructKind::Entity)?;
    let word = s.expect_word("event or field")?;
    let event = if s.eat(TokenKind::Arrow) {
        let to = s.expect_word("target state")?;
        TriggerEvent::FieldChanged {
            field: word.lexeme.clone(),
            to: to.lexeme.clone(),
        }
    } else {
        let event = EntityEvent::parse(&word.lexeme).ok_or_else(|| {
            Diagnostic::error(
                DiagnosticCode::InvalidValue,
                format!("unknown entity event '{}'", word.lexeme),
                &word.span,
            )
        })?;
        TriggerEvent::Lifecycle(event)
    };
    s.finish()?;
    Ok(EntityTrigger { entity, event })
}

/// `name ["Title"]` filling the rest of the line
pub(crate) fn titled(s: &mut TokenStream, what: &str) -> Result<(String, Option<String>), Diagnostic> {
    let name = s.expect_word(what)?.lexeme.clone();
    let title = if s.check(TokenKind::Str) {
        Some(s.expect_string("title")?)
    } else {
        None
    };
    s.finish()?;
    Ok((name, title))
}

/// `name ["Title"]:` heading of a nested block (`section`, `region`, ...)
/// after its keyword
pub(crate) fn sub_header(s: &mut TokenStream, what: &str) -> Result<(String, Option<String>), Diagnostic> {
    let name = s.expect_word(what)?.lexeme.clone();
    let title = if s.check(TokenKind::Str) {
        Some(s.expect_string("title")?)
    } else {
        None
    };
    s.expect(TokenKind::Colon)?;
    s.finish()?;
    Ok((name, title))
}
