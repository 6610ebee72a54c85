//! Parser dispatcher, token stream → [`ModuleFragment`]
//!
//! Reads the optional `module`, `app` and `use` headers, then hands every
//! top-level line to the construct parser selected by its keyword. A line
//! that starts with anything else is reported and skipped together with
//! its indented block, so one bad construct never hides the rest of the
//! file.
//!
//! Construct parsers live in [`constructs`], one module per category.
//! They return finished IR values and never call each other.

pub mod constructs;
pub mod lines;
pub mod stream;
pub mod tokenizer;
pub mod types;

use tracing::{debug, trace};

use crate::config::CompileOptions;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::expr::{self, DEFAULT_MAX_DEPTH};
use crate::ir::{AppHeader, ConstructKind, ModuleFragment, Rejected, SpannedExpr, UseDecl};
use lines::{build_lines, Line};
use tokenizer::{Span, Token, TokenKind};

/// Parser settings derived from [`CompileOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub max_expr_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_expr_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl From<&CompileOptions> for ParseOptions {
    fn from(options: &CompileOptions) -> Self {
        ParseOptions {
            max_expr_depth: options.max_expr_depth,
        }
    }
}

/// Parse one file's tokens with default options
pub fn parse_module(tokens: &[Token]) -> (ModuleFragment, Vec<Diagnostic>) {
    Parser::new(ParseOptions::default()).parse(tokens)
}

/// `keyword name ["Title"] [extra...]:` of a construct
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub kind: ConstructKind,
    pub name: String,
    pub title: Option<String>,
    /// Tokens between the title and the colon (`from stripe`)
    pub extra: Vec<Token>,
    pub span: Span,
}

/// Parser state for one file
pub struct Parser {
    options: ParseOptions,
    diagnostics: Diagnostics,
    rejected: Vec<Rejected>,
}

impl Parser {
    pub fn new(options: ParseOptions) -> Self {
        Parser {
            options,
            diagnostics: Diagnostics::new(),
            rejected: Vec::new(),
        }
    }

    pub fn parse(mut self, tokens: &[Token]) -> (ModuleFragment, Vec<Diagnostic>) {
        let lines = build_lines(tokens, &mut self.diagnostics);
        let mut fragment = ModuleFragment::default();

        for line in &lines {
            let Some(first) = line.tokens.first() else { continue };
            match first.kind {
                TokenKind::Module => self.module_header(line, &mut fragment),
                TokenKind::App => self.app_header(line, &mut fragment),
                TokenKind::Use => self.use_decl(line, &mut fragment),
                kind => match ConstructKind::from_token(kind) {
                    Some(construct) => {
                        let Some(header) = self.header(construct, line) else {
                            continue;
                        };
                        trace!(kind = %construct, name = %header.name, "dispatching construct");
                        match constructs::parse_construct(&mut self, &header, line) {
                            Some(node) => fragment.constructs.push(node),
                            None => {
                                debug!(kind = %construct, name = %header.name, "construct rejected");
                                self.rejected.push(Rejected {
                                    kind: construct,
                                    name: header.name.clone(),
                                    member: None,
                                    span: header.span.clone(),
                                });
                            }
                        }
                    }
                    None => {
                        debug!(line = first.span.line, "skipping unrecognized statement");
                        self.diagnostics.error(
                            DiagnosticCode::UnknownStatement,
                            format!("statement not recognized: '{}'", first.lexeme),
                            &first.span,
                        );
                    }
                },
            }
        }

        fragment.rejected = self.rejected;
        debug!(
            constructs = fragment.constructs.len(),
            rejected = fragment.rejected.len(),
            diagnostics = self.diagnostics.len(),
            "parsed module"
        );
        (fragment, self.diagnostics.into_vec())
    }

    // ── Headers ────────────────────────────────────────────

    fn module_header(&mut self, line: &Line, fragment: &mut ModuleFragment) {
        let mut s = line.stream();
        s.advance();
        let parsed = s.expect_dotted("module name").and_then(|(name, _)| {
            s.finish()?;
            Ok(name)
        });
        let Some(name) = self.take(parsed) else { return };
        if fragment.module.is_some() {
            self.diagnostics.error(
                DiagnosticCode::DuplicateHeader,
                "module is already declared in this file",
                &line.span(),
            );
            return;
        }
        fragment.module = Some(name);
        self.no_block(line);
    }

    fn app_header(&mut self, line: &Line, fragment: &mut ModuleFragment) {
        let mut s = line.stream();
        s.advance();
        let parsed = s.expect_word("app name").and_then(|name| {
            let title = if s.check(TokenKind::Str) {
                Some(s.expect_string("title")?)
            } else {
                None
            };
            s.eat(TokenKind::Colon);
            s.finish()?;
            Ok(AppHeader {
                name: name.lexeme.clone(),
                title,
                span: line.span(),
            })
        });
        let Some(app) = self.take(parsed) else { return };
        if fragment.app.is_some() {
            self.diagnostics.error(
                DiagnosticCode::DuplicateHeader,
                "app is already declared in this file",
                &line.span(),
            );
            return;
        }
        fragment.app = Some(app);
        self.no_block(line);
    }

    fn use_decl(&mut self, line: &Line, fragment: &mut ModuleFragment) {
        let mut s = line.stream();
        s.advance();
        let parsed = s.expect_dotted("module name").and_then(|(module, span)| {
            s.finish()?;
            Ok(UseDecl { module, span })
        });
        if let Some(decl) = self.take(parsed) {
            fragment.uses.push(decl);
        }
        self.no_block(line);
    }

    fn header(&mut self, kind: ConstructKind, line: &Line) -> Option<Header> {
        let mut s = line.stream();
        let keyword = s.advance()?;
        let parsed = (|| -> Result<Header, Diagnostic> {
            // Tenancy is a singleton and carries no name
            let name = if kind == ConstructKind::Tenancy {
                "tenancy".to_string()
            } else {
                s.expect_word(&format!("{} name", kind))?.lexeme.clone()
            };
            let title = if s.check(TokenKind::Str) {
                Some(s.expect_string("title")?)
            } else {
                None
            };
            let mut extra = Vec::new();
            while let Some(token) = s.peek().filter(|t| t.kind != TokenKind::Colon) {
                extra.push(token.clone());
                s.advance();
            }
            s.expect(TokenKind::Colon)?;
            s.finish()?;
            Ok(Header {
                kind,
                name,
                title,
                extra,
                span: keyword.span.clone(),
            })
        })();
        let header = self.take(parsed)?;
        if kind != ConstructKind::ForeignModel {
            if let Some(token) = header.extra.first() {
                self.diagnostics.error(
                    DiagnosticCode::UnexpectedToken,
                    format!("unexpected '{}' in {} header", token.lexeme, kind),
                    &token.span,
                );
            }
        }
        Some(header)
    }

    // ── Helpers for construct parsers ──────────────────────

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Report the error, if any, and hand back the value
    pub(crate) fn take<T>(&mut self, result: Result<T, Diagnostic>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(diagnostic) => {
                self.diagnostics.push(diagnostic);
                None
            }
        }
    }

    pub(crate) fn unknown_key(&mut self, header: &Header, line: &Line) {
        let key = line.tokens.first().map(|t| t.lexeme.as_str()).unwrap_or_default();
        self.diagnostics.error(
            DiagnosticCode::UnknownKey,
            format!("unknown key '{}' in {} '{}'", key, header.kind, header.name),
            &line.span(),
        );
    }

    pub(crate) fn missing_key(&mut self, header: &Header, key: &str) {
        self.diagnostics.error(
            DiagnosticCode::MissingKey,
            format!("{} '{}' is missing required key '{}'", header.kind, header.name, key),
            &header.span,
        );
    }

    /// Record a field dropped from an otherwise valid construct
    pub(crate) fn reject_member(&mut self, header: &Header, member: &str, span: &Span) {
        self.rejected.push(Rejected {
            kind: header.kind,
            name: header.name.clone(),
            member: Some(member.to_string()),
            span: span.clone(),
        });
    }

    /// Parse an embedded expression; paths are checked by the linker
    pub(crate) fn expr(&mut self, tokens: &[Token], at: &Span) -> Option<SpannedExpr> {
        let Some(first) = tokens.first() else {
            self.diagnostics
                .error(DiagnosticCode::ExprSyntax, "expected an expression", at);
            return None;
        };
        let span = first.span.clone();
        let parsed = expr::parse_unchecked(tokens, self.options.max_expr_depth);
        self.take(parsed).map(|expr| SpannedExpr { expr, span })
    }

    /// `- "text"` bullet lines under `line`
    pub(crate) fn bullets(&mut self, line: &Line) -> Vec<String> {
        let mut items = Vec::new();
        for child in &line.children {
            let mut s = child.stream();
            s.eat(TokenKind::Minus);
            if let Some(text) = self.take(s.text_value("list item")) {
                items.push(text);
            }
        }
        items
    }

    /// Report an indented block under a line that takes none
    pub(crate) fn no_block(&mut self, line: &Line) {
        if let Some(child) = line.children.first() {
            self.diagnostics.error(
                DiagnosticCode::UnexpectedToken,
                "unexpected indented block",
                &child.span(),
            );
        }
    }
}
