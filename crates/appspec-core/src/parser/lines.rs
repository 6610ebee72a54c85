//! Layout tokens → line tree
//!
//! `Newline` ends a line, `Indent`/`Dedent` open and close the block of
//! children under the line before. The lexer guarantees the layout tokens
//! are balanced, so the tree is built in one pass. The tree is at most
//! [`MAX_BLOCK_DEPTH`] blocks deep whatever the input.

use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::parser::stream::{is_word, TokenStream};
use crate::parser::tokenizer::{Span, Token, TokenKind};

/// One logical source line and the indented block below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub tokens: Vec<Token>,
    pub children: Vec<Line>,
}

impl Line {
    pub fn span(&self) -> Span {
        self.tokens.first().map(|t| t.span.clone()).unwrap_or_default()
    }

    pub fn stream(&self) -> TokenStream<'_> {
        TokenStream::new(&self.tokens)
    }

    /// First token, if it is a word
    pub fn head(&self) -> Option<&str> {
        self.tokens.first().filter(|t| is_word(t)).map(|t| t.lexeme.as_str())
    }

    /// Split a `key: value` line; the stream covers the value
    pub fn entry(&self) -> Option<(&Token, TokenStream<'_>)> {
        match self.tokens.as_slice() {
            [key, colon, value @ ..] if is_word(key) && colon.kind == TokenKind::Colon => {
                Some((key, TokenStream::with_end(value, colon.span.clone())))
            }
            _ => None,
        }
    }
}

/// Deepest block nesting kept in the tree; lines below it join the block
/// at this depth
pub const MAX_BLOCK_DEPTH: usize = 64;

pub fn build_lines(tokens: &[Token], diagnostics: &mut Diagnostics) -> Vec<Line> {
    let mut pos = 0;
    block(tokens, &mut pos, 0, diagnostics)
}

fn block(tokens: &[Token], pos: &mut usize, depth: usize, diagnostics: &mut Diagnostics) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    // Indents folded into this block at the depth limit
    let mut flattened = 0;

    while let Some(token) = tokens.get(*pos) {
        match token.kind {
            TokenKind::Eof => break,
            TokenKind::Newline => *pos += 1,
            TokenKind::Dedent => {
                *pos += 1;
                if flattened > 0 {
                    flattened -= 1;
                } else if depth > 0 {
                    break;
                }
            }
            TokenKind::Indent if depth >= MAX_BLOCK_DEPTH => {
                *pos += 1;
                if flattened == 0 {
                    diagnostics.error(
                        DiagnosticCode::TooDeep,
                        format!("blocks nest deeper than {} levels", MAX_BLOCK_DEPTH),
                        &token.span,
                    );
                }
                flattened += 1;
            }
            TokenKind::Indent => {
                // Only reachable when the first line of a block is indented
                *pos += 1;
                let children = block(tokens, pos, depth + 1, diagnostics);
                diagnostics.error(DiagnosticCode::UnexpectedToken, "unexpected indentation", &token.span);
                match lines.last_mut() {
                    Some(last) => last.children.extend(children),
                    None => lines.extend(children),
                }
            }
            _ => {
                let start = *pos;
                while tokens
                    .get(*pos)
                    .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Eof))
                {
                    *pos += 1;
                }
                let line_tokens = tokens[start..*pos].to_vec();
                if tokens.get(*pos).is_some_and(|t| t.kind == TokenKind::Newline) {
                    *pos += 1;
                }
                let opens_block = tokens.get(*pos).is_some_and(|t| t.kind == TokenKind::Indent);
                let children = if opens_block && depth < MAX_BLOCK_DEPTH {
                    *pos += 1;
                    block(tokens, pos, depth + 1, diagnostics)
                } else {
                    Vec::new()
                };
                lines.push(Line {
                    tokens: line_tokens,
                    children,
                });
            }
        }
    }
    lines
}
