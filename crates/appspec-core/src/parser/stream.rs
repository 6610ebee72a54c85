//! Token cursor over one logical line
//!
//! Construct parsers work line by line: the layout tokens have already
//! been turned into a [`Line`](super::lines::Line) tree, so a stream only
//! ever sees the tokens between two `Newline`s.

use std::str::FromStr;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::expr::{DurationLiteral, DurationUnit};
use crate::ir::{ConstructKind, Reference};
use crate::parser::tokenizer::{Span, Token, TokenKind};

/// Identifiers and reserved words both work as names and keys
pub fn is_word(token: &Token) -> bool {
    token.kind == TokenKind::Ident || token.kind.is_keyword()
}

pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
    end: Span,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        let end = tokens.last().map(end_of).unwrap_or_default();
        TokenStream { tokens, pos: 0, end }
    }

    /// Stream over `tokens`, reporting end-of-line problems at `end`
    pub fn with_end(tokens: &'a [Token], end: Span) -> Self {
        let end = tokens.last().map(end_of).unwrap_or(end);
        TokenStream { tokens, pos: 0, end }
    }

    // ── Cursor ─────────────────────────────────────────────

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + n)
    }

    pub fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Span of the next token, or of the end of the line
    pub fn span(&self) -> Span {
        self.peek().map(|t| t.span.clone()).unwrap_or_else(|| self.end.clone())
    }

    /// Everything not consumed yet; the stream is left at the end
    pub fn rest(&mut self) -> &'a [Token] {
        let rest = &self.tokens[self.pos.min(self.tokens.len())..];
        self.pos = self.tokens.len();
        rest
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    /// Is the next token the bare word `word`?
    pub fn check_word(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| is_word(t) && t.lexeme == word)
    }

    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn eat_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // ── Errors ─────────────────────────────────────────────

    pub fn expected(&self, what: &str) -> Diagnostic {
        let found = match self.peek() {
            Some(t) if t.kind == TokenKind::Str => format!("string \"{}\"", t.lexeme),
            Some(t) if t.lexeme.is_empty() => t.kind.to_string(),
            Some(t) => format!("'{}'", t.lexeme),
            None => "end of line".to_string(),
        };
        Diagnostic::error(
            DiagnosticCode::ExpectedToken,
            format!("expected {}, found {}", what, found),
            &self.span(),
        )
    }

    /// Fail unless every token was consumed
    pub fn finish(&self) -> Result<(), Diagnostic> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(Diagnostic::error(
                DiagnosticCode::UnexpectedToken,
                format!("unexpected '{}'", t.lexeme),
                &t.span,
            )),
        }
    }

    // ── Expectations ───────────────────────────────────────

    pub fn expect(&mut self, kind: TokenKind) -> Result<&'a Token, Diagnostic> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                self.pos += 1;
                Ok(t)
            }
            _ => Err(self.expected(&kind.to_string())),
        }
    }

    pub fn expect_keyword(&mut self, word: &str) -> Result<&'a Token, Diagnostic> {
        match self.peek() {
            Some(t) if is_word(t) && t.lexeme == word => {
                self.pos += 1;
                Ok(t)
            }
            _ => Err(self.expected(&format!("'{}'", word))),
        }
    }

    pub fn expect_word(&mut self, what: &str) -> Result<&'a Token, Diagnostic> {
        match self.peek() {
            Some(t) if is_word(t) => {
                self.pos += 1;
                Ok(t)
            }
            _ => Err(self.expected(what)),
        }
    }

    pub fn expect_string(&mut self, what: &str) -> Result<String, Diagnostic> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Str => {
                self.pos += 1;
                Ok(t.lexeme.clone())
            }
            _ => Err(self.expected(what)),
        }
    }

    /// A quoted string or a bare word
    pub fn expect_text(&mut self, what: &str) -> Result<String, Diagnostic> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Str || is_word(t) => {
                self.pos += 1;
                Ok(t.lexeme.clone())
            }
            _ => Err(self.expected(what)),
        }
    }

    pub fn expect_number<T: FromStr>(&mut self, what: &str) -> Result<T, Diagnostic> {
        let Some(token) = self.peek().filter(|t| t.kind == TokenKind::Number) else {
            return Err(self.expected(what));
        };
        self.pos += 1;
        token.lexeme.parse().map_err(|_| {
            Diagnostic::error(
                DiagnosticCode::InvalidValue,
                format!("'{}' is not a valid {}", token.lexeme, what),
                &token.span,
            )
        })
    }

    /// `a.b.c`
    pub fn expect_dotted(&mut self, what: &str) -> Result<(String, Span), Diagnostic> {
        let first = self.expect_word(what)?;
        let mut name = first.lexeme.clone();
        while self.check(TokenKind::Dot) && self.peek_nth(1).is_some_and(is_word) {
            self.pos += 1;
            if let Some(part) = self.advance() {
                name.push('.');
                name.push_str(&part.lexeme);
            }
        }
        Ok((name, first.span.clone()))
    }

    /// `14d`, or the word form `14 days`
    pub fn expect_duration(&mut self) -> Result<DurationLiteral, Diagnostic> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Duration => {
                self.pos += 1;
                DurationLiteral::parse_compact(&t.lexeme).ok_or_else(|| {
                    Diagnostic::error(
                        DiagnosticCode::InvalidValue,
                        format!("invalid duration '{}'", t.lexeme),
                        &t.span,
                    )
                })
            }
            Some(t) if t.kind == TokenKind::Number => {
                let amount: i64 = self.expect_number("duration amount")?;
                let unit = self
                    .peek()
                    .filter(|u| is_word(u))
                    .and_then(|u| DurationUnit::parse(&u.lexeme))
                    .ok_or_else(|| self.expected("duration unit"))?;
                self.pos += 1;
                Ok(DurationLiteral { amount, unit })
            }
            _ => Err(self.expected("duration")),
        }
    }

    /// `a, b, c`
    pub fn expect_word_list(&mut self, what: &str) -> Result<Vec<String>, Diagnostic> {
        let mut words = vec![self.expect_dotted(what)?.0];
        while self.eat(TokenKind::Comma) {
            words.push(self.expect_dotted(what)?.0);
        }
        Ok(words)
    }

    // ── Whole values ───────────────────────────────────────
    //
    // Each of these consumes the rest of the line and fails on leftovers.

    pub fn word_value(&mut self, what: &str) -> Result<String, Diagnostic> {
        let word = self.expect_word(what)?.lexeme.clone();
        self.finish()?;
        Ok(word)
    }

    pub fn string_value(&mut self, what: &str) -> Result<String, Diagnostic> {
        let text = self.expect_string(what)?;
        self.finish()?;
        Ok(text)
    }

    pub fn text_value(&mut self, what: &str) -> Result<String, Diagnostic> {
        let text = self.expect_text(what)?;
        self.finish()?;
        Ok(text)
    }

    pub fn number_value<T: FromStr>(&mut self, what: &str) -> Result<T, Diagnostic> {
        let n = self.expect_number(what)?;
        self.finish()?;
        Ok(n)
    }

    pub fn duration_value(&mut self) -> Result<DurationLiteral, Diagnostic> {
        let d = self.expect_duration()?;
        self.finish()?;
        Ok(d)
    }

    pub fn list_value(&mut self, what: &str) -> Result<Vec<String>, Diagnostic> {
        let words = self.expect_word_list(what)?;
        self.finish()?;
        Ok(words)
    }

    /// A word from a closed vocabulary
    pub fn choice<T>(&mut self, what: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, Diagnostic> {
        let token = self.expect_word(what)?;
        self.finish()?;
        parse(token.lexeme.as_str()).ok_or_else(|| {
            Diagnostic::error(
                DiagnosticCode::InvalidValue,
                format!("unknown {} '{}'", what, token.lexeme),
                &token.span,
            )
        })
    }

    /// A possibly module-qualified construct name
    pub fn reference(&mut self, kind: ConstructKind) -> Result<Reference, Diagnostic> {
        let r = self.expect_reference(kind)?;
        self.finish()?;
        Ok(r)
    }

    pub fn expect_reference(&mut self, kind: ConstructKind) -> Result<Reference, Diagnostic> {
        let (name, span) = self.expect_dotted(&format!("{} name", kind))?;
        Ok(Reference::new(kind, name, span))
    }
}

fn end_of(token: &Token) -> Span {
    let width = match token.kind {
        TokenKind::Str => token.lexeme.chars().count() + 2,
        _ => token.lexeme.chars().count(),
    };
    Span {
        line: token.span.line,
        column: token.span.column + width,
        offset: token.span.offset + width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenizer::tokenize;

    fn line(source: &str) -> Vec<Token> {
        let (tokens, _) = tokenize(source);
        tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Eof))
            .collect()
    }

    #[test]
    fn test_keywords_are_words() {
        let tokens = line("entity event test");
        let mut s = TokenStream::new(&tokens);
        assert_eq!(s.list_value("name").unwrap_err().code, DiagnosticCode::UnexpectedToken);
        let mut s = TokenStream::new(&tokens);
        assert_eq!(s.expect_word("name").unwrap().lexeme, "entity");
        assert!(s.check_word("event"));
    }

    #[test]
    fn test_dotted_names() {
        let tokens = line("crm.Customer required");
        let mut s = TokenStream::new(&tokens);
        let (name, span) = s.expect_dotted("entity").unwrap();
        assert_eq!(name, "crm.Customer");
        assert_eq!(span.column, 1);
        assert!(s.check_word("required"));
    }

    #[test]
    fn test_word_and_compact_durations_agree() {
        let compact = line("14d");
        let words = line("14 days");
        assert_eq!(
            TokenStream::new(&compact).duration_value().unwrap(),
            TokenStream::new(&words).duration_value().unwrap()
        );
    }

    #[test]
    fn test_leftover_tokens_rejected() {
        let tokens = line("list grid");
        let err = TokenStream::new(&tokens).word_value("mode").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnexpectedToken);
        assert_eq!(err.location.column, 6);
    }

    #[test]
    fn test_expected_reports_end_of_line() {
        let tokens = line("role(");
        let mut s = TokenStream::new(&tokens);
        s.advance();
        s.advance();
        let err = s.expect_word("role").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::ExpectedToken);
        assert!(err.message.contains("end of line"));
    }

    #[test]
    fn test_choice_rejects_unknown_word() {
        let tokens = line("sideways");
        let err = TokenStream::new(&tokens)
            .choice("display", crate::ir::DisplayMode::parse)
            .unwrap_err();
        assert_eq!(err.code, DiagnosticCode::InvalidValue);
        assert_eq!(err.message, "unknown display 'sideways'");
    }
}
