//! Diagnostics shared by every compiler stage
//!
//! Lexer, construct parsers, expression checker and linker all report
//! problems as [`Diagnostic`] values. Nothing is thrown across the public
//! API and nothing is dropped: stages accumulate into a [`Diagnostics`]
//! collector and hand the whole list back to the caller.

use serde::{Deserialize, Serialize};

use crate::parser::tokenizer::Span;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Stable, machine-readable diagnostic codes.
///
/// The string form (see [`DiagnosticCode::as_str`]) is part of the public
/// contract: editor tooling maps these onto quick-fixes, so existing codes
/// are never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DiagnosticCode {
    // Lexical
    UnexpectedChar,
    UnterminatedString,
    InvalidEscape,
    InvalidNumber,
    InconsistentDedent,
    MixedIndentation,
    UnclosedBracket,

    // Syntactic
    UnexpectedToken,
    ExpectedToken,
    UnknownStatement,
    UnknownKey,
    MissingKey,
    DuplicateHeader,
    TooDeep,

    // Local-semantic
    InvalidType,
    ModifierConflict,
    DuplicateModifier,
    DefaultMismatch,
    DuplicateField,
    MultiplePrimaryKeys,
    UnknownField,
    InvalidTransition,
    InvalidValue,

    // Expression language
    ExprSyntax,
    UnknownFunction,
    ExprTooDeep,
    TypeMismatch,
    UnknownPath,
    NotAReference,

    // Global-semantic
    DuplicateSymbol,
    UnknownModule,
    UnresolvedReference,
    AmbiguousReference,
    KindMismatch,
    ModuleAccess,
    DependencyCycle,
    RejectedConstruct,
    DuplicateLedgerAccount,
    MissingIdempotencyKey,
    CurrencyMismatch,
    SelfTransfer,
    SelfUse,
}

const CODE_NAMES: &[(DiagnosticCode, &str)] = &[
    (DiagnosticCode::UnexpectedChar, "lex.unexpected_char"),
    (DiagnosticCode::UnterminatedString, "lex.unterminated_string"),
    (DiagnosticCode::InvalidEscape, "lex.invalid_escape"),
    (DiagnosticCode::InvalidNumber, "lex.invalid_number"),
    (DiagnosticCode::InconsistentDedent, "lex.inconsistent_dedent"),
    (DiagnosticCode::MixedIndentation, "lex.mixed_indentation"),
    (DiagnosticCode::UnclosedBracket, "lex.unclosed_bracket"),
    (DiagnosticCode::UnexpectedToken, "parse.unexpected_token"),
    (DiagnosticCode::ExpectedToken, "parse.expected_token"),
    (DiagnosticCode::UnknownStatement, "parse.unknown_statement"),
    (DiagnosticCode::UnknownKey, "parse.unknown_key"),
    (DiagnosticCode::MissingKey, "parse.missing_key"),
    (DiagnosticCode::DuplicateHeader, "parse.duplicate_header"),
    (DiagnosticCode::TooDeep, "parse.too_deep"),
    (DiagnosticCode::InvalidType, "field.invalid_type"),
    (DiagnosticCode::ModifierConflict, "field.modifier_conflict"),
    (DiagnosticCode::DuplicateModifier, "field.duplicate_modifier"),
    (DiagnosticCode::DefaultMismatch, "field.default_mismatch"),
    (DiagnosticCode::DuplicateField, "entity.duplicate_field"),
    (DiagnosticCode::MultiplePrimaryKeys, "entity.multiple_pk"),
    (DiagnosticCode::UnknownField, "entity.unknown_field"),
    (DiagnosticCode::InvalidTransition, "entity.invalid_transition"),
    (DiagnosticCode::InvalidValue, "parse.invalid_value"),
    (DiagnosticCode::ExprSyntax, "expr.syntax"),
    (DiagnosticCode::UnknownFunction, "expr.unknown_function"),
    (DiagnosticCode::ExprTooDeep, "expr.too_deep"),
    (DiagnosticCode::TypeMismatch, "expr.type_mismatch"),
    (DiagnosticCode::UnknownPath, "expr.unknown_path"),
    (DiagnosticCode::NotAReference, "expr.not_a_reference"),
    (DiagnosticCode::DuplicateSymbol, "link.duplicate_symbol"),
    (DiagnosticCode::UnknownModule, "link.unknown_module"),
    (DiagnosticCode::UnresolvedReference, "link.unresolved_reference"),
    (DiagnosticCode::AmbiguousReference, "link.ambiguous_reference"),
    (DiagnosticCode::KindMismatch, "link.kind_mismatch"),
    (DiagnosticCode::ModuleAccess, "link.module_access"),
    (DiagnosticCode::DependencyCycle, "link.dependency_cycle"),
    (DiagnosticCode::RejectedConstruct, "link.rejected_construct"),
    (DiagnosticCode::DuplicateLedgerAccount, "ledger.duplicate_account"),
    (DiagnosticCode::MissingIdempotencyKey, "ledger.missing_idempotency_key"),
    (DiagnosticCode::CurrencyMismatch, "ledger.currency_mismatch"),
    (DiagnosticCode::SelfTransfer, "ledger.self_transfer"),
    (DiagnosticCode::SelfUse, "link.self_use"),
];

impl DiagnosticCode {
    /// Stable dotted code string, e.g. `link.module_access`
    pub fn as_str(self) -> &'static str {
        CODE_NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Inverse of [`DiagnosticCode::as_str`]
    pub fn from_code_str(s: &str) -> Option<Self> {
        CODE_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(code, _)| *code)
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DiagnosticCode> for String {
    fn from(code: DiagnosticCode) -> String {
        code.as_str().to_string()
    }
}

impl TryFrom<String> for DiagnosticCode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        DiagnosticCode::from_code_str(&value).ok_or_else(|| format!("unknown diagnostic code '{}'", value))
    }
}

/// Source location of a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Location {
            file: None,
            line,
            column,
        }
    }
}

impl From<&Span> for Location {
    fn from(span: &Span) -> Self {
        Location::new(span.line, span.column)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// A single located, severity-tagged compiler message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: &Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            location: Location::from(span),
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: &Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            code,
            message: message.into(),
            location: Location::from(span),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Attach a file path to the location
    pub fn in_file(mut self, file: &str) -> Self {
        self.location.file = Some(file.to_string());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] at {}: {}",
            self.severity, self.code, self.location, self.message
        )
    }
}

/// Accumulates diagnostics across a stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: &Span) {
        self.items.push(Diagnostic::error(code, message, span));
    }

    pub fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, span: &Span) {
        self.items.push(Diagnostic::warning(code, message, span));
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(other);
    }

    /// Returns true if at least one error-severity diagnostic was recorded
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.items.iter().filter(|d| d.is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Promote every warning to an error (used by `warnings_as_errors`)
pub fn promote_warnings(diagnostics: &mut [Diagnostic]) {
    for d in diagnostics.iter_mut() {
        d.severity = Severity::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_strings() {
        for (code, name) in CODE_NAMES {
            assert_eq!(code.as_str(), *name);
            assert_eq!(DiagnosticCode::from_code_str(name), Some(*code));
        }
    }

    #[test]
    fn test_code_names_are_unique() {
        let mut names: Vec<&str> = CODE_NAMES.iter().map(|(_, n)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CODE_NAMES.len());
    }

    #[test]
    fn test_diagnostic_serializes_code_as_string() {
        let span = Span { line: 3, column: 7, offset: 20 };
        let d = Diagnostic::error(DiagnosticCode::ModuleAccess, "missing use", &span).in_file("a.dsl");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["code"], "link.module_access");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["location"]["file"], "a.dsl");
        let back: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_display_includes_location_and_code() {
        let span = Span { line: 2, column: 5, offset: 0 };
        let d = Diagnostic::warning(DiagnosticCode::SelfUse, "module uses itself", &span);
        assert_eq!(d.to_string(), "warning [link.self_use] at 2:5: module uses itself");
    }

    #[test]
    fn test_collector_separates_errors_and_warnings() {
        let span = Span { line: 1, column: 1, offset: 0 };
        let mut diags = Diagnostics::new();
        diags.warning(DiagnosticCode::DuplicateModifier, "w", &span);
        assert!(!diags.has_errors());
        diags.error(DiagnosticCode::UnknownKey, "e", &span);
        assert!(diags.has_errors());
        assert_eq!(diags.errors().len(), 1);
        assert_eq!(diags.warnings().len(), 1);
    }
}
