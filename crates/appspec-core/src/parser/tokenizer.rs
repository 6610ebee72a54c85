//! Lexer: converts DSL source text into a token stream
//!
//! Handles: construct keywords, identifiers, string/number/boolean literals,
//! compact duration literals (`14d`), operators and punctuation, and the
//! layout tokens `Newline`, `Indent` and `Dedent` synthesized from leading
//! whitespace. Comments (`#`) and blank lines produce nothing.
//!
//! Guarantees:
//! - Never panics: malformed input becomes diagnostics and lexing continues
//! - Balanced layout: every `Indent` is matched by a `Dedent` before `Eof`
//! - Deterministic: same input always produces same token stream

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};

/// Token kinds of the DSL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Header keywords
    Module,
    Use,
    App,

    // Construct keywords
    Entity,
    Surface,
    Workspace,
    Service,
    ForeignModel,
    Integration,
    Flow,
    Test,
    Story,
    Process,
    Message,
    Channel,
    Event,
    Ledger,
    Transaction,
    Policy,
    Tenancy,
    LlmModel,
    LlmIntent,
    Enum,
    View,
    Webhook,
    Approval,
    Sla,
    Persona,

    // Expression keywords
    And,
    Or,
    Not,
    In,
    If,
    Then,
    Else,

    // Literals
    Ident,
    Str,
    Number,
    Bool,
    Duration,

    // Symbols
    Colon,    // :
    Comma,    // ,
    Dot,      // .
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Eq,       // =
    NotEq,    // !=
    Lt,       // <
    Gt,       // >
    LtEq,     // <=
    GtEq,     // >=
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Arrow,    // ->

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("module", TokenKind::Module),
    ("use", TokenKind::Use),
    ("app", TokenKind::App),
    ("entity", TokenKind::Entity),
    ("surface", TokenKind::Surface),
    ("workspace", TokenKind::Workspace),
    ("service", TokenKind::Service),
    ("foreign_model", TokenKind::ForeignModel),
    ("integration", TokenKind::Integration),
    ("flow", TokenKind::Flow),
    ("test", TokenKind::Test),
    ("story", TokenKind::Story),
    ("process", TokenKind::Process),
    ("message", TokenKind::Message),
    ("channel", TokenKind::Channel),
    ("event", TokenKind::Event),
    ("ledger", TokenKind::Ledger),
    ("transaction", TokenKind::Transaction),
    ("policy", TokenKind::Policy),
    ("tenancy", TokenKind::Tenancy),
    ("llm_model", TokenKind::LlmModel),
    ("llm_intent", TokenKind::LlmIntent),
    ("enum", TokenKind::Enum),
    ("view", TokenKind::View),
    ("webhook", TokenKind::Webhook),
    ("approval", TokenKind::Approval),
    ("sla", TokenKind::Sla),
    ("persona", TokenKind::Persona),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
    ("in", TokenKind::In),
    ("if", TokenKind::If),
    ("then", TokenKind::Then),
    ("else", TokenKind::Else),
];

/// Units accepted directly after a number (`14d`, `30s`, `2h`)
pub const DURATION_SUFFIXES: &[&str] = &["s", "m", "min", "h", "d", "w", "y"];

impl TokenKind {
    /// Look up the keyword kind for an identifier-shaped word
    pub fn keyword(text: &str) -> Option<TokenKind> {
        KEYWORDS.iter().find(|(k, _)| *k == text).map(|(_, kind)| *kind)
    }

    /// True for every reserved word (which may still appear as a name)
    pub fn is_keyword(self) -> bool {
        KEYWORDS.iter().any(|(_, kind)| *kind == self)
    }

    /// True for keywords that start a top-level construct
    pub fn is_construct(self) -> bool {
        self.is_keyword()
            && !matches!(
                self,
                TokenKind::Module
                    | TokenKind::Use
                    | TokenKind::App
                    | TokenKind::And
                    | TokenKind::Or
                    | TokenKind::Not
                    | TokenKind::In
                    | TokenKind::If
                    | TokenKind::Then
                    | TokenKind::Else
            )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some((word, _)) = KEYWORDS.iter().find(|(_, kind)| kind == self) {
            return write!(f, "'{}'", word);
        }
        let text = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::Bool => "boolean",
            TokenKind::Duration => "duration",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::Dot => "'.'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Eq => "'='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Arrow => "'->'",
            TokenKind::Newline => "end of line",
            TokenKind::Indent => "indented block",
            TokenKind::Dedent => "end of block",
            TokenKind::Eof => "end of file",
            _ => "keyword",
        };
        f.write_str(text)
    }
}

/// Position in source text for error reporting
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token with source position.
///
/// For `Str` the lexeme is the decoded string contents; for every other
/// kind it is the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }
}

/// Tokenize source text with default options.
///
/// Returns the token stream (always terminated by `Eof`) together with
/// every lexical diagnostic.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).tokenize()
}

struct OpenBracket {
    lexeme: char,
    span: Span,
    /// Indentation of the line the bracket was opened on
    indent: usize,
}

/// Lexer for DSL source text
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    tab_width: usize,
    /// Open indentation levels; `false` marks a level adopted during
    /// dedent recovery that has no matching `Indent` token
    indent_stack: Vec<(usize, bool)>,
    /// Open `(` and `[`; line breaks inside them are insignificant
    brackets: Vec<OpenBracket>,
    line_has_tokens: bool,
    tokens: Vec<Token>,
    diagnostics: Diagnostics,
}

impl Lexer {
    /// Create a new lexer for the given input text
    pub fn new(text: &str) -> Self {
        Lexer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            tab_width: 4,
            indent_stack: vec![(0, true)],
            brackets: Vec::new(),
            line_has_tokens: false,
            tokens: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Column width of a tab when measuring indentation
    pub fn with_tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = tab_width.max(1);
        self
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut at_line_start = true;

        loop {
            if at_line_start {
                if !self.handle_line_start() {
                    break;
                }
                at_line_start = false;
            }

            self.skip_inline_whitespace();

            let Some(ch) = self.peek() else { break };

            match ch {
                '#' => self.skip_comment(),
                '\n' | '\r' => {
                    self.consume_line_break();
                    if !self.brackets.is_empty() && self.next_line_starts_construct() {
                        self.close_brackets();
                    }
                    if self.brackets.is_empty() {
                        self.end_logical_line();
                        at_line_start = true;
                    }
                }
                _ => self.next_token(ch),
            }
        }

        self.finish()
    }

    // ── Character helpers ──────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, span: Span) {
        self.tokens.push(Token::new(kind, lexeme, span));
        self.line_has_tokens = true;
    }

    // ── Layout ─────────────────────────────────────────────

    /// Measure indentation of the next non-blank line and emit layout tokens.
    /// Returns false at end of input.
    fn handle_line_start(&mut self) -> bool {
        loop {
            let span = self.current_span();
            let mut width = 0;
            let mut saw_space = false;
            let mut saw_tab = false;
            while let Some(ch) = self.peek() {
                match ch {
                    ' ' => {
                        width += 1;
                        saw_space = true;
                    }
                    '\t' => {
                        width += self.tab_width - (width % self.tab_width);
                        saw_tab = true;
                    }
                    _ => break,
                }
                self.advance();
            }

            match self.peek() {
                None => return false,
                Some('\n') | Some('\r') => {
                    self.consume_line_break();
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                Some(_) => {}
            }

            if saw_space && saw_tab {
                self.diagnostics.warning(
                    DiagnosticCode::MixedIndentation,
                    "indentation mixes tabs and spaces",
                    &span,
                );
            }

            let indent_span = self.current_span();
            self.apply_indent(width, &indent_span);
            return true;
        }
    }

    fn apply_indent(&mut self, width: usize, span: &Span) {
        let top = self.indent_width();
        if width > top {
            self.indent_stack.push((width, true));
            self.tokens.push(Token::new(TokenKind::Indent, "", span.clone()));
            return;
        }

        while self.indent_stack.len() > 1 && self.indent_width() > width {
            self.pop_indent(span);
        }

        if self.indent_width() != width {
            self.diagnostics.error(
                DiagnosticCode::InconsistentDedent,
                "unindent does not match any outer indentation level",
                span,
            );
            // Lines at this width continue the enclosing block
            self.indent_stack.push((width, false));
        }
    }

    fn indent_width(&self) -> usize {
        self.indent_stack.last().map(|(w, _)| *w).unwrap_or(0)
    }

    fn pop_indent(&mut self, span: &Span) {
        if let Some((_, real)) = self.indent_stack.pop() {
            if real {
                self.tokens.push(Token::new(TokenKind::Dedent, "", span.clone()));
            }
        }
    }

    fn end_logical_line(&mut self) {
        if self.line_has_tokens {
            let span = self.current_span();
            self.tokens.push(Token::new(TokenKind::Newline, "", span));
            self.line_has_tokens = false;
        }
    }

    /// True when the next line is a top-level statement no deeper than the
    /// line holding the outermost open bracket; the bracket cannot span it
    fn next_line_starts_construct(&self) -> bool {
        let Some(outer) = self.brackets.first() else {
            return false;
        };
        let mut at = self.position;
        let mut width = 0;
        while let Some(&ch) = self.input.get(at) {
            match ch {
                ' ' => width += 1,
                '\t' => width += self.tab_width - (width % self.tab_width),
                _ => break,
            }
            at += 1;
        }
        if width > outer.indent {
            return false;
        }

        let start = at;
        while self.input.get(at).is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_') {
            at += 1;
        }
        let word: String = self.input[start..at].iter().collect();
        let starts_statement = TokenKind::keyword(&word).is_some_and(|kind| {
            kind.is_construct() || matches!(kind, TokenKind::Module | TokenKind::Use | TokenKind::App)
        });
        let mut rest = self.input[at..].iter().skip_while(|c| **c == ' ' || **c == '\t');
        starts_statement && at > start && rest.next().is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
    }

    /// Report every open bracket and forget it
    fn close_brackets(&mut self) {
        for open in std::mem::take(&mut self.brackets) {
            self.diagnostics.error(
                DiagnosticCode::UnclosedBracket,
                format!("'{}' opened here is never closed", open.lexeme),
                &open.span,
            );
        }
    }

    fn finish(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        self.close_brackets();
        self.end_logical_line();
        let span = self.current_span();
        while self.indent_stack.len() > 1 {
            self.pop_indent(&span);
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", span));

        debug!(
            tokens = self.tokens.len(),
            diagnostics = self.diagnostics.len(),
            "tokenized source"
        );
        (self.tokens, self.diagnostics.into_vec())
    }

    // ── Whitespace & Comments ──────────────────────────────

    fn skip_inline_whitespace(&mut self) {
        while let Some(' ' | '\t') = self.peek() {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' || ch == '\r' {
                break;
            }
            self.advance();
        }
    }

    fn consume_line_break(&mut self) {
        if self.peek() == Some('\r') {
            self.advance();
        }
        if self.peek() == Some('\n') {
            self.advance();
        }
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self, ch: char) {
        let span = self.current_span();

        let two = self.peek_ahead(1);
        let (kind, width) = match (ch, two) {
            ('-', Some('>')) => (Some(TokenKind::Arrow), 2),
            ('!', Some('=')) => (Some(TokenKind::NotEq), 2),
            ('<', Some('=')) => (Some(TokenKind::LtEq), 2),
            ('>', Some('=')) => (Some(TokenKind::GtEq), 2),
            (':', _) => (Some(TokenKind::Colon), 1),
            (',', _) => (Some(TokenKind::Comma), 1),
            ('.', _) => (Some(TokenKind::Dot), 1),
            ('(', _) => (Some(TokenKind::LParen), 1),
            (')', _) => (Some(TokenKind::RParen), 1),
            ('[', _) => (Some(TokenKind::LBracket), 1),
            (']', _) => (Some(TokenKind::RBracket), 1),
            ('=', _) => (Some(TokenKind::Eq), 1),
            ('<', _) => (Some(TokenKind::Lt), 1),
            ('>', _) => (Some(TokenKind::Gt), 1),
            ('+', _) => (Some(TokenKind::Plus), 1),
            ('-', _) => (Some(TokenKind::Minus), 1),
            ('*', _) => (Some(TokenKind::Star), 1),
            ('/', _) => (Some(TokenKind::Slash), 1),
            _ => (None, 0),
        };

        if let Some(kind) = kind {
            let mut lexeme = String::new();
            for _ in 0..width {
                if let Some(c) = self.advance() {
                    lexeme.push(c);
                }
            }
            match kind {
                TokenKind::LParen | TokenKind::LBracket => self.brackets.push(OpenBracket {
                    lexeme: ch,
                    span: span.clone(),
                    indent: self.indent_width(),
                }),
                TokenKind::RParen | TokenKind::RBracket => {
                    self.brackets.pop();
                }
                _ => {}
            }
            self.push(kind, lexeme, span);
            return;
        }

        match ch {
            '"' => self.read_string(span),
            c if c.is_ascii_digit() => self.read_number(span),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier_or_keyword(span),
            _ => {
                self.advance();
                self.diagnostics.error(
                    DiagnosticCode::UnexpectedChar,
                    format!("unexpected character '{}'", ch),
                    &span,
                );
            }
        }
    }

    // ── String literals ────────────────────────────────────

    fn read_string(&mut self, span: Span) {
        self.advance(); // consume opening "
        let mut value = String::new();

        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    self.diagnostics.error(
                        DiagnosticCode::UnterminatedString,
                        format!("unterminated string starting at {}", span),
                        &span,
                    );
                    break;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    let escape_span = self.current_span();
                    self.advance();
                    match self.peek() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some(c) if c != '\n' && c != '\r' => {
                            self.diagnostics.error(
                                DiagnosticCode::InvalidEscape,
                                format!("invalid escape sequence '\\{}'", c),
                                &escape_span,
                            );
                            value.push(c);
                        }
                        _ => continue,
                    }
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        self.push(TokenKind::Str, value, span);
    }

    // ── Numbers & durations ────────────────────────────────

    fn read_number(&mut self, span: Span) {
        let start = self.position;
        let mut has_dot = false;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.'
                && !has_dot
                && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit())
            {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let digits_end = self.position;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let suffix: String = self.input[digits_end..self.position].iter().collect();

        if suffix.is_empty() {
            self.push(TokenKind::Number, text, span);
        } else if !has_dot && DURATION_SUFFIXES.contains(&suffix.as_str()) {
            self.push(TokenKind::Duration, text, span);
        } else {
            self.diagnostics.error(
                DiagnosticCode::InvalidNumber,
                format!("invalid number literal '{}'", text),
                &span,
            );
            let digits: String = self.input[start..digits_end].iter().collect();
            self.push(TokenKind::Number, digits, span);
        }
    }

    // ── Identifiers & Keywords ─────────────────────────────

    fn read_identifier_or_keyword(&mut self, span: Span) {
        let start = self.position;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let mut text: String = self.input[start..self.position].iter().collect();

        // `unique?` is a single modifier word
        if text == "unique" && self.peek() == Some('?') {
            self.advance();
            text.push('?');
        }

        let kind = match text.as_str() {
            "true" | "false" => TokenKind::Bool,
            _ => TokenKind::keyword(&text).unwrap_or(TokenKind::Ident),
        };

        self.push(kind, text, span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, diags) = tokenize(input);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn diagnostics(input: &str) -> Vec<Diagnostic> {
        tokenize(input).1
    }

    // ── Keywords ───────────────────────────────────────

    #[test]
    fn test_tokenize_construct_keywords() {
        assert_eq!(
            kinds("entity surface ledger"),
            vec![
                TokenKind::Entity,
                TokenKind::Surface,
                TokenKind::Ledger,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_every_construct_keyword_is_recognized() {
        for (word, kind) in KEYWORDS {
            let (tokens, _) = tokenize(word);
            assert_eq!(tokens[0].kind, *kind, "keyword {}", word);
        }
    }

    #[test]
    fn test_unique_nullable_is_one_word() {
        let (tokens, _) = tokenize("email: email unique?");
        assert_eq!(tokens[3].kind, TokenKind::Ident);
        assert_eq!(tokens[3].lexeme, "unique?");
    }

    // ── Literals ───────────────────────────────────────

    #[test]
    fn test_tokenize_string_escape_sequences() {
        let (tokens, _) = tokenize(r#""line\none\t\"q\"""#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme, "line\none\t\"q\"");
    }

    #[test]
    fn test_unterminated_string() {
        let diags = diagnostics("title: \"hello\nnext: 1");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnterminatedString);
        assert_eq!(diags[0].location.line, 1);
        assert_eq!(diags[0].location.column, 8);
    }

    #[test]
    fn test_invalid_escape_reported_and_recovered() {
        let (tokens, diags) = tokenize(r#""a\qb" x"#);
        assert_eq!(diags[0].code, DiagnosticCode::InvalidEscape);
        assert_eq!(tokens[0].lexeme, "aqb");
        assert_eq!(tokens[1].lexeme, "x");
    }

    #[test]
    fn test_numbers() {
        let (tokens, _) = tokenize("42 12.50");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].lexeme, "12.50");
    }

    #[test]
    fn test_compact_durations() {
        let (tokens, _) = tokenize("14d 2h 30min 7y");
        let lexemes: Vec<_> = tokens.iter().take(4).map(|t| (t.kind, t.lexeme.as_str())).collect();
        assert_eq!(
            lexemes,
            vec![
                (TokenKind::Duration, "14d"),
                (TokenKind::Duration, "2h"),
                (TokenKind::Duration, "30min"),
                (TokenKind::Duration, "7y"),
            ]
        );
    }

    #[test]
    fn test_invalid_number_suffix() {
        let diags = diagnostics("12abc");
        assert_eq!(diags[0].code, DiagnosticCode::InvalidNumber);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a -> b != c <= d >= e"),
            vec![
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::NotEq,
                TokenKind::Ident,
                TokenKind::LtEq,
                TokenKind::Ident,
                TokenKind::GtEq,
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    // ── Layout ─────────────────────────────────────────

    #[test]
    fn test_indent_and_dedent() {
        let input = "entity A:\n  id: uuid pk\n  name: str(20)\nentity B:\n  id: uuid pk\n";
        let k = kinds(input);
        let indents = k.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = k.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(k.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_multiple_dedents_in_one_step() {
        let input = "a:\n  b:\n    c: 1\nd: 2";
        let k = kinds(input);
        let pos = k.iter().position(|k| *k == TokenKind::Dedent).unwrap();
        assert_eq!(k[pos + 1], TokenKind::Dedent);
    }

    #[test]
    fn test_comments_and_blank_lines_emit_nothing() {
        let input = "# header\n\nentity A:\n\n  # note\n  id: uuid pk # trailing\n";
        let k = kinds(input);
        assert_eq!(k[0], TokenKind::Entity);
        assert!(!k.windows(2).any(|w| w[0] == TokenKind::Newline && w[1] == TokenKind::Newline));
    }

    #[test]
    fn test_inconsistent_dedent() {
        let input = "a:\n    b: 1\n  c: 2\n";
        let (tokens, diags) = tokenize(input);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::InconsistentDedent);
        assert_eq!(diags[0].location.line, 3);
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, dedents);
    }

    #[test]
    fn test_brackets_join_lines() {
        let input = "x: enum[a,\n  b,\n  c]\n";
        let k = kinds(input);
        assert!(!k.contains(&TokenKind::Indent));
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_unclosed_bracket_ends_at_next_construct() {
        let input = "entity A:\n  n: int\n  invariant: (n > 1\nentity B:\n  id: uuid pk\nentity C:\n  id: uuid pk\n";
        let (tokens, diags) = tokenize(input);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnclosedBracket);
        assert_eq!((diags[0].location.line, diags[0].location.column), (3, 14));

        let entities: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::Entity)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(entities.len(), 3);
        for i in &entities[1..] {
            assert_eq!(tokens[i - 1].kind, TokenKind::Dedent);
        }
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, dedents);
    }

    #[test]
    fn test_unclosed_bracket_at_end_of_input() {
        let (tokens, diags) = tokenize("x: enum[a,\n  b\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::UnclosedBracket);
        assert_eq!((diags[0].location.line, diags[0].location.column), (1, 8));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_key_named_like_construct_stays_inside_brackets() {
        let k = kinds("x: enum[a,\nmessage,\n  b]\n");
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_mixed_tabs_and_spaces_warns() {
        let diags = diagnostics("a:\n \tb: 1\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::MixedIndentation);
    }

    #[test]
    fn test_unexpected_character() {
        let (tokens, diags) = tokenize("a @ b");
        assert_eq!(diags[0].code, DiagnosticCode::UnexpectedChar);
        assert_eq!(tokens.iter().filter(|t| t.kind == TokenKind::Ident).count(), 2);
    }

    // ── Span tracking ──────────────────────────────────

    #[test]
    fn test_span_tracking() {
        let (tokens, _) = tokenize("entity A:\n  id: uuid");
        assert_eq!(tokens[0].span, Span { line: 1, column: 1, offset: 0 });
        assert_eq!(tokens[1].span, Span { line: 1, column: 8, offset: 7 });
        let id = tokens.iter().find(|t| t.lexeme == "id").unwrap();
        assert_eq!(id.span, Span { line: 2, column: 3, offset: 12 });
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n\n# only comments\n"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_tokenize_determinism_100_iterations() {
        let input = "module shop\nentity A \"A\":\n  id: uuid pk\n  due: date required\n";
        let first = tokenize(input);
        for i in 0..100 {
            assert_eq!(first, tokenize(input), "Determinism failure at iteration {}", i);
        }
    }

    proptest! {
        #[test]
        fn prop_indent_dedent_balanced(lines in proptest::collection::vec((0usize..6, "[a-z]{1,4}( [a-z0-9]{1,3})?"), 0..20)) {
            let source: String = lines
                .iter()
                .map(|(depth, body)| format!("{}{}\n", " ".repeat(depth * 2), body))
                .collect();
            let (tokens, _) = tokenize(&source);
            let mut open: i64 = 0;
            for token in &tokens {
                match token.kind {
                    TokenKind::Indent => open += 1,
                    TokenKind::Dedent => {
                        open -= 1;
                        prop_assert!(open >= 0, "dedent without matching indent");
                    }
                    _ => {}
                }
            }
            prop_assert_eq!(open, 0);
            prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        }
    }
}
