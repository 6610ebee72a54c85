//! `surface`, `workspace`, `view` and `persona`

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    Attention, AttentionLevel, Construct, ConstructKind, DisplayMode, PersonaSpec, Reference, Region, Section,
    SortDirection, SortKey, SurfaceAction, SurfaceField, SurfaceMode, SurfaceSpec, UxSpec, ViewSpec, WorkspaceSpec,
};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::tokenizer::TokenKind;
use crate::parser::{Header, Parser};

use super::{sub_header, titled};

// ── Surface ────────────────────────────────────────────

pub(super) fn surface(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = SurfaceSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        entity: None,
        mode: SurfaceMode::default(),
        sections: Vec::new(),
        actions: Vec::new(),
        ux: None,
        span: header.span.clone(),
    };
    // `field` lines outside any section
    let mut loose = Vec::new();

    for child in &line.children {
        if let Some((key, mut value)) = child.entry() {
            match key.lexeme.as_str() {
                "mode" => {
                    if let Some(mode) = p.take(value.choice("surface mode", SurfaceMode::parse)) {
                        spec.mode = mode;
                    }
                }
                "ux" => {
                    p.take(value.finish());
                    spec.ux = Some(ux(p, header, child));
                }
                _ => p.unknown_key(header, child),
            }
            continue;
        }
        let mut s = child.stream();
        match child.head() {
            Some("uses") => {
                if let Some(entity) = p.take(uses_entity(&mut s)) {
                    spec.entity = Some(entity);
                }
            }
            Some("section") => {
                if let Some(section) = section(p, header, child) {
                    spec.sections.push(section);
                }
            }
            Some("action") => {
                if let Some(action) = p.take(surface_action(&mut s, child)) {
                    spec.actions.push(action);
                }
            }
            Some("field") => {
                if let Some(field) = p.take(surface_field(&mut s, child)) {
                    loose.push(field);
                }
            }
            _ => p.unknown_key(header, child),
        }
    }

    if !loose.is_empty() {
        spec.sections.insert(
            0,
            Section {
                name: "main".to_string(),
                title: None,
                fields: loose,
                span: header.span.clone(),
            },
        );
    }
    Some(Construct::Surface(spec))
}

fn uses_entity(s: &mut TokenStream) -> Result<Reference, Diagnostic> {
    s.expect_keyword("uses")?;
    s.expect(TokenKind::Entity)?;
    s.reference(ConstructKind::Entity)
}

fn section(p: &mut Parser, header: &Header, line: &Line) -> Option<Section> {
    let mut s = line.stream();
    s.advance();
    let (name, title) = p.take(sub_header(&mut s, "section name"))?;
    let mut fields = Vec::new();
    for child in &line.children {
        if child.head() != Some("field") {
            p.unknown_key(header, child);
            continue;
        }
        if let Some(field) = p.take(surface_field(&mut child.stream(), child)) {
            fields.push(field);
        }
    }
    Some(Section {
        name,
        title,
        fields,
        span: line.span(),
    })
}

/// `field number "Number"`
fn surface_field(s: &mut TokenStream, line: &Line) -> Result<SurfaceField, Diagnostic> {
    s.expect_keyword("field")?;
    let (name, label) = titled(s, "field name")?;
    Ok(SurfaceField {
        name,
        label,
        span: line.span(),
    })
}

/// `action view_detail "View": -> surface invoice_detail`
fn surface_action(s: &mut TokenStream, line: &Line) -> Result<SurfaceAction, Diagnostic> {
    s.expect_keyword("action")?;
    let name = s.expect_word("action name")?.lexeme.clone();
    let label = if s.check(TokenKind::Str) {
        Some(s.expect_string("label")?)
    } else {
        None
    };
    s.expect(TokenKind::Colon)?;
    s.expect(TokenKind::Arrow)?;
    s.expect(TokenKind::Surface)?;
    let target = s.reference(ConstructKind::Surface)?;
    Ok(SurfaceAction {
        name,
        label,
        target,
        span: line.span(),
    })
}

fn ux(p: &mut Parser, header: &Header, line: &Line) -> UxSpec {
    let mut ux = UxSpec::default();
    for child in &line.children {
        if child.head() == Some("attention") && child.entry().is_none() {
            if let Some(attention) = attention(p, child) {
                ux.attention.push(attention);
            }
            continue;
        }
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "purpose" => ux.purpose = p.take(value.string_value("purpose")),
            "sort" => ux.sort = p.take(sort_value(&mut value)).unwrap_or_default(),
            "filter" => ux.filter = p.take(value.list_value("field name")).unwrap_or_default(),
            "search" => ux.search = p.take(value.list_value("field name")).unwrap_or_default(),
            "empty" => ux.empty = p.take(value.string_value("empty-state message")),
            _ => p.unknown_key(header, child),
        }
    }
    ux
}

/// `attention critical:` with `when`, `message` and optional `action`
fn attention(p: &mut Parser, line: &Line) -> Option<Attention> {
    let mut s = line.stream();
    s.advance();
    let level = p.take(attention_level(&mut s))?;

    let mut condition = None;
    let mut message = None;
    let mut action = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.report(unknown_in_block("attention", child));
            continue;
        };
        match key.lexeme.as_str() {
            "when" => condition = p.expr(value.rest(), &key.span),
            "message" => message = p.take(value.string_value("message")),
            "action" => action = p.take(value.reference(ConstructKind::Surface)),
            _ => p.report(unknown_in_block("attention", child)),
        }
    }

    for (key, missing) in [("when", condition.is_none()), ("message", message.is_none())] {
        if missing {
            p.report(Diagnostic::error(
                DiagnosticCode::MissingKey,
                format!("attention block is missing '{}'", key),
                &line.span(),
            ));
        }
    }
    Some(Attention {
        level,
        condition: condition?,
        message: message?,
        action,
        span: line.span(),
    })
}

fn attention_level(s: &mut TokenStream) -> Result<AttentionLevel, Diagnostic> {
    let word = s.expect_word("attention level")?;
    let level = AttentionLevel::parse(&word.lexeme).ok_or_else(|| {
        Diagnostic::error(
            DiagnosticCode::InvalidValue,
            format!("unknown attention level '{}'", word.lexeme),
            &word.span,
        )
    })?;
    s.expect(TokenKind::Colon)?;
    s.finish()?;
    Ok(level)
}

/// `due_date desc, number`
fn sort_value(s: &mut TokenStream) -> Result<Vec<SortKey>, Diagnostic> {
    let mut keys = Vec::new();
    loop {
        let field = s.expect_word("sort field")?.lexeme.clone();
        let direction = if s.eat_word("desc") {
            SortDirection::Desc
        } else {
            s.eat_word("asc");
            SortDirection::Asc
        };
        keys.push(SortKey { field, direction });
        if !s.eat(TokenKind::Comma) {
            break;
        }
    }
    s.finish()?;
    Ok(keys)
}

fn unknown_in_block(block: &str, line: &Line) -> Diagnostic {
    let key = line.tokens.first().map(|t| t.lexeme.as_str()).unwrap_or_default();
    Diagnostic::error(
        DiagnosticCode::UnknownKey,
        format!("unknown key '{}' in {} block", key, block),
        &line.span(),
    )
}

// ── Workspace ──────────────────────────────────────────

pub(super) fn workspace(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = WorkspaceSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        purpose: None,
        regions: Vec::new(),
        span: header.span.clone(),
    };
    for child in &line.children {
        match child.entry() {
            Some((key, mut value)) if key.lexeme == "purpose" => {
                spec.purpose = p.take(value.string_value("purpose"));
            }
            None if child.head() == Some("region") => {
                if let Some(region) = region(p, child) {
                    spec.regions.push(region);
                }
            }
            _ => p.unknown_key(header, child),
        }
    }
    Some(Construct::Workspace(spec))
}

fn region(p: &mut Parser, line: &Line) -> Option<Region> {
    let mut s = line.stream();
    s.advance();
    let (name, title) = p.take(sub_header(&mut s, "region name"))?;

    let mut source = None;
    let mut filter = None;
    let mut sort = Vec::new();
    let mut limit = None;
    let mut display = DisplayMode::default();
    let mut action = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.report(unknown_in_block("region", child));
            continue;
        };
        match key.lexeme.as_str() {
            "source" => source = p.take(value.reference(ConstructKind::Entity)),
            "filter" => filter = p.expr(value.rest(), &key.span),
            "sort" => sort = p.take(sort_value(&mut value)).unwrap_or_default(),
            "limit" => limit = p.take(value.number_value("limit")),
            "display" => {
                if let Some(mode) = p.take(value.choice("display", DisplayMode::parse)) {
                    display = mode;
                }
            }
            "action" => action = p.take(value.reference(ConstructKind::Surface)),
            _ => p.report(unknown_in_block("region", child)),
        }
    }

    let Some(source) = source else {
        p.report(Diagnostic::error(
            DiagnosticCode::MissingKey,
            format!("region '{}' is missing required key 'source'", name),
            &line.span(),
        ));
        return None;
    };
    Some(Region {
        name,
        title,
        source,
        filter,
        sort,
        limit,
        display,
        action,
        span: line.span(),
    })
}

// ── View ───────────────────────────────────────────────

pub(super) fn view(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut source = None;
    let mut filter = None;
    let mut fields = Vec::new();
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "source" => source = p.take(value.reference(ConstructKind::Entity)),
            "filter" => filter = p.expr(value.rest(), &key.span),
            "fields" if value.at_end() => {
                for item in &child.children {
                    if let Some(name) = p.take(item.stream().word_value("field name")) {
                        fields.push(name);
                    }
                }
            }
            "fields" => fields = p.take(value.list_value("field name")).unwrap_or_default(),
            _ => p.unknown_key(header, child),
        }
    }

    let Some(source) = source else {
        p.missing_key(header, "source");
        return None;
    };
    Some(Construct::View(ViewSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        source,
        filter,
        fields,
        span: header.span.clone(),
    }))
}

// ── Persona ────────────────────────────────────────────

pub(super) fn persona(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = PersonaSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        goals: Vec::new(),
        proficiency: None,
        default_workspace: None,
        span: header.span.clone(),
    };
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "goals" if value.at_end() => spec.goals = p.bullets(child),
            "goals" => spec.goals = p.take(text_list(&mut value)).unwrap_or_default(),
            "proficiency" => spec.proficiency = p.take(value.word_value("proficiency")),
            "default_workspace" => {
                spec.default_workspace = p.take(value.reference(ConstructKind::Workspace));
            }
            _ => p.unknown_key(header, child),
        }
    }
    Some(Construct::Persona(spec))
}

/// `"a", "b"`
fn text_list(s: &mut TokenStream) -> Result<Vec<String>, Diagnostic> {
    let mut items = vec![s.expect_text("text")?];
    while s.eat(TokenKind::Comma) {
        items.push(s.expect_text("text")?);
    }
    s.finish()?;
    Ok(items)
}
