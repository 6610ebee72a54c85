//! Field declarations and field types

use std::collections::{BTreeSet, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ConstructKind, Reference, References};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::expr::ExprType;
use crate::parser::tokenizer::Span;

/// The closed set of field type kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTypeKind {
    String,
    Text,
    Int,
    Decimal,
    Bool,
    Date,
    Datetime,
    Uuid,
    Enum,
    Ref,
    HasMany,
    HasOne,
    Embeds,
    BelongsTo,
    Email,
    Json,
    Money,
    File,
    Url,
    Timezone,
}

/// How a reference behaves when its target row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteBehavior {
    Cascade,
    Restrict,
    Nullify,
    Readonly,
}

impl DeleteBehavior {
    pub fn parse(word: &str) -> Option<DeleteBehavior> {
        match word {
            "cascade" => Some(DeleteBehavior::Cascade),
            "restrict" => Some(DeleteBehavior::Restrict),
            "nullify" => Some(DeleteBehavior::Nullify),
            "readonly" => Some(DeleteBehavior::Readonly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Ref,
    HasMany,
    HasOne,
    Embeds,
    BelongsTo,
}

impl RefKind {
    pub fn parse(word: &str) -> Option<RefKind> {
        match word {
            "ref" => Some(RefKind::Ref),
            "has_many" => Some(RefKind::HasMany),
            "has_one" => Some(RefKind::HasOne),
            "embeds" => Some(RefKind::Embeds),
            "belongs_to" => Some(RefKind::BelongsTo),
            _ => None,
        }
    }

    pub fn is_many(self) -> bool {
        self == RefKind::HasMany
    }
}

/// A resolved field type with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Str { max_length: Option<u32> },
    Text,
    Int,
    Decimal { precision: u32, scale: u32 },
    Bool,
    Date,
    Datetime,
    Uuid,
    Email,
    Json,
    Money { currency: Option<String> },
    File,
    Url,
    Timezone,
    Enum { values: Vec<String> },
    Reference {
        kind: RefKind,
        target: Reference,
        on_delete: Option<DeleteBehavior>,
    },
}

impl FieldType {
    /// `str(N)`; the length must be positive
    pub fn string(max_length: Option<u32>, span: &Span) -> Result<FieldType, Diagnostic> {
        if max_length == Some(0) {
            return Err(Diagnostic::error(
                DiagnosticCode::InvalidType,
                "string length must be at least 1",
                span,
            ));
        }
        Ok(FieldType::Str { max_length })
    }

    /// `decimal(P,S)`; requires `0 < P` and `S <= P`
    pub fn decimal(precision: u32, scale: u32, span: &Span) -> Result<FieldType, Diagnostic> {
        if precision == 0 || scale > precision {
            return Err(Diagnostic::error(
                DiagnosticCode::InvalidType,
                format!(
                    "invalid decimal({},{}): scale must not exceed a positive precision",
                    precision, scale
                ),
                span,
            ));
        }
        Ok(FieldType::Decimal { precision, scale })
    }

    /// `enum[a,b]`; at least one value, no duplicates
    pub fn enumeration(values: Vec<String>, span: &Span) -> Result<FieldType, Diagnostic> {
        if values.is_empty() {
            return Err(Diagnostic::error(
                DiagnosticCode::InvalidType,
                "enum type must list at least one value",
                span,
            ));
        }
        let mut seen = HashSet::new();
        for value in &values {
            if !seen.insert(value.as_str()) {
                return Err(Diagnostic::error(
                    DiagnosticCode::InvalidType,
                    format!("duplicate enum value '{}'", value),
                    span,
                ));
            }
        }
        Ok(FieldType::Enum { values })
    }

    pub fn reference(kind: RefKind, target: &str, on_delete: Option<DeleteBehavior>, span: &Span) -> FieldType {
        FieldType::Reference {
            kind,
            target: Reference::new(ConstructKind::Entity, target, span.clone()),
            on_delete,
        }
    }

    pub fn kind(&self) -> FieldTypeKind {
        match self {
            FieldType::Str { .. } => FieldTypeKind::String,
            FieldType::Text => FieldTypeKind::Text,
            FieldType::Int => FieldTypeKind::Int,
            FieldType::Decimal { .. } => FieldTypeKind::Decimal,
            FieldType::Bool => FieldTypeKind::Bool,
            FieldType::Date => FieldTypeKind::Date,
            FieldType::Datetime => FieldTypeKind::Datetime,
            FieldType::Uuid => FieldTypeKind::Uuid,
            FieldType::Email => FieldTypeKind::Email,
            FieldType::Json => FieldTypeKind::Json,
            FieldType::Money { .. } => FieldTypeKind::Money,
            FieldType::File => FieldTypeKind::File,
            FieldType::Url => FieldTypeKind::Url,
            FieldType::Timezone => FieldTypeKind::Timezone,
            FieldType::Enum { .. } => FieldTypeKind::Enum,
            FieldType::Reference { kind, .. } => match kind {
                RefKind::Ref => FieldTypeKind::Ref,
                RefKind::HasMany => FieldTypeKind::HasMany,
                RefKind::HasOne => FieldTypeKind::HasOne,
                RefKind::Embeds => FieldTypeKind::Embeds,
                RefKind::BelongsTo => FieldTypeKind::BelongsTo,
            },
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Datetime)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference { .. })
    }

    /// Scalar type seen by expressions; references have none
    pub fn expr_type(&self) -> Option<ExprType> {
        let ty = match self {
            FieldType::Int => ExprType::Int,
            FieldType::Decimal { .. } | FieldType::Money { .. } => ExprType::Decimal,
            FieldType::Bool => ExprType::Bool,
            FieldType::Date => ExprType::Date,
            FieldType::Datetime => ExprType::Datetime,
            FieldType::Reference { .. } => return None,
            FieldType::Str { .. }
            | FieldType::Text
            | FieldType::Uuid
            | FieldType::Email
            | FieldType::Json
            | FieldType::File
            | FieldType::Url
            | FieldType::Timezone
            | FieldType::Enum { .. } => ExprType::Str,
        };
        Some(ty)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FieldType::Str { max_length: Some(n) } => write!(f, "str({})", n),
            FieldType::Str { max_length: None } => write!(f, "str"),
            FieldType::Text => write!(f, "text"),
            FieldType::Int => write!(f, "int"),
            FieldType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Date => write!(f, "date"),
            FieldType::Datetime => write!(f, "datetime"),
            FieldType::Uuid => write!(f, "uuid"),
            FieldType::Email => write!(f, "email"),
            FieldType::Json => write!(f, "json"),
            FieldType::Money { currency: Some(c) } => write!(f, "money({})", c),
            FieldType::Money { currency: None } => write!(f, "money"),
            FieldType::File => write!(f, "file"),
            FieldType::Url => write!(f, "url"),
            FieldType::Timezone => write!(f, "timezone"),
            FieldType::Enum { values } => write!(f, "enum[{}]", values.join(",")),
            FieldType::Reference { kind, target, .. } => {
                let word = match kind {
                    RefKind::Ref => "ref",
                    RefKind::HasMany => "has_many",
                    RefKind::HasOne => "has_one",
                    RefKind::Embeds => "embeds",
                    RefKind::BelongsTo => "belongs_to",
                };
                write!(f, "{} {}", word, target.name)
            }
        }
    }
}

impl References for FieldType {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        if let FieldType::Reference { target, .. } = self {
            visit(target);
        }
    }
}

/// Field modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldModifier {
    Required,
    Optional,
    Pk,
    Unique,
    /// `unique?`: unique among non-null values; any number of nulls may coexist
    UniqueNullable,
    Indexed,
    AutoAdd,
    AutoUpdate,
}

impl FieldModifier {
    pub fn parse(word: &str) -> Option<FieldModifier> {
        match word {
            "required" => Some(FieldModifier::Required),
            "optional" => Some(FieldModifier::Optional),
            "pk" => Some(FieldModifier::Pk),
            "unique" => Some(FieldModifier::Unique),
            "unique?" => Some(FieldModifier::UniqueNullable),
            "indexed" => Some(FieldModifier::Indexed),
            "auto_add" => Some(FieldModifier::AutoAdd),
            "auto_update" => Some(FieldModifier::AutoUpdate),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            FieldModifier::Required => "required",
            FieldModifier::Optional => "optional",
            FieldModifier::Pk => "pk",
            FieldModifier::Unique => "unique",
            FieldModifier::UniqueNullable => "unique?",
            FieldModifier::Indexed => "indexed",
            FieldModifier::AutoAdd => "auto_add",
            FieldModifier::AutoUpdate => "auto_update",
        }
    }
}

const MODIFIER_CONFLICTS: &[(FieldModifier, FieldModifier)] = &[
    (FieldModifier::Required, FieldModifier::Optional),
    (FieldModifier::Pk, FieldModifier::Optional),
    (FieldModifier::Pk, FieldModifier::UniqueNullable),
    (FieldModifier::Unique, FieldModifier::UniqueNullable),
    (FieldModifier::Required, FieldModifier::UniqueNullable),
];

/// Literal default value of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Bool(bool),
    /// Bare word: an enum value, `today` or `now`
    Word(String),
}

impl DefaultValue {
    fn type_name(&self) -> &'static str {
        match self {
            DefaultValue::Int(_) => "int",
            DefaultValue::Decimal(_) => "decimal",
            DefaultValue::Str(_) => "str",
            DefaultValue::Bool(_) => "bool",
            DefaultValue::Word(_) => "word",
        }
    }
}

fn default_matches_type(ty: &FieldType, default: &DefaultValue) -> bool {
    match (ty, default) {
        (FieldType::Int, DefaultValue::Int(_)) => true,
        (FieldType::Decimal { .. } | FieldType::Money { .. }, DefaultValue::Int(_) | DefaultValue::Decimal(_)) => {
            true
        }
        (FieldType::Bool, DefaultValue::Bool(_)) => true,
        (FieldType::Str { max_length }, DefaultValue::Str(s)) => {
            max_length.map_or(true, |n| s.chars().count() <= n as usize)
        }
        (
            FieldType::Text | FieldType::Email | FieldType::Url | FieldType::Timezone | FieldType::Uuid,
            DefaultValue::Str(_),
        ) => true,
        (FieldType::Enum { values }, DefaultValue::Word(w) | DefaultValue::Str(w)) => values.contains(w),
        (FieldType::Date, DefaultValue::Word(w)) => w == "today",
        (FieldType::Datetime, DefaultValue::Word(w)) => w == "now",
        (FieldType::Date | FieldType::Datetime, DefaultValue::Str(_)) => true,
        _ => false,
    }
}

/// One field of an entity, message, service payload or foreign model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub modifiers: BTreeSet<FieldModifier>,
    pub default: Option<DefaultValue>,
    pub span: Span,
}

impl FieldSpec {
    /// Build a field, rejecting modifier and default combinations that
    /// are invalid for its type. Every problem is reported, not just the first.
    pub fn new(
        name: impl Into<String>,
        ty: FieldType,
        modifiers: BTreeSet<FieldModifier>,
        default: Option<DefaultValue>,
        span: Span,
    ) -> Result<FieldSpec, Vec<Diagnostic>> {
        let name = name.into();
        let mut errors = Vec::new();

        for (a, b) in MODIFIER_CONFLICTS {
            if modifiers.contains(a) && modifiers.contains(b) {
                errors.push(Diagnostic::error(
                    DiagnosticCode::ModifierConflict,
                    format!(
                        "field '{}' cannot be both '{}' and '{}'",
                        name,
                        a.keyword(),
                        b.keyword()
                    ),
                    &span,
                ));
            }
        }

        for modifier in [FieldModifier::AutoAdd, FieldModifier::AutoUpdate] {
            if modifiers.contains(&modifier) && !ty.is_temporal() {
                errors.push(Diagnostic::error(
                    DiagnosticCode::ModifierConflict,
                    format!(
                        "'{}' requires a date or datetime field, '{}' is {}",
                        modifier.keyword(),
                        name,
                        ty
                    ),
                    &span,
                ));
            }
        }

        if modifiers.contains(&FieldModifier::Pk) {
            if let FieldType::Reference { kind, .. } = &ty {
                if kind.is_many() {
                    errors.push(Diagnostic::error(
                        DiagnosticCode::ModifierConflict,
                        format!("has_many field '{}' cannot be a primary key", name),
                        &span,
                    ));
                }
            }
        }

        if let Some(default) = &default {
            if !default_matches_type(&ty, default) {
                errors.push(Diagnostic::error(
                    DiagnosticCode::DefaultMismatch,
                    format!(
                        "default value for '{}' has type {}, expected {}",
                        name,
                        default.type_name(),
                        ty
                    ),
                    &span,
                ));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(FieldSpec {
            name,
            ty,
            modifiers,
            default,
            span,
        })
    }

    pub fn has(&self, modifier: FieldModifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn is_pk(&self) -> bool {
        self.has(FieldModifier::Pk)
    }

    pub fn is_required(&self) -> bool {
        self.has(FieldModifier::Required) || self.is_pk()
    }

    /// True for `unique` and `unique?`
    pub fn is_unique(&self) -> bool {
        self.has(FieldModifier::Unique) || self.has(FieldModifier::UniqueNullable) || self.is_pk()
    }

    /// Under `unique?` several rows may hold null without conflicting
    pub fn nulls_distinct(&self) -> bool {
        self.has(FieldModifier::UniqueNullable)
    }
}

impl References for FieldSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.ty.for_each_ref(visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(list: &[FieldModifier]) -> BTreeSet<FieldModifier> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_required_optional_conflict() {
        let err = FieldSpec::new(
            "x",
            FieldType::Int,
            mods(&[FieldModifier::Required, FieldModifier::Optional]),
            None,
            Span::default(),
        )
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].code, DiagnosticCode::ModifierConflict);
    }

    #[test]
    fn test_unique_and_nullable_unique_are_distinct() {
        let strict = FieldSpec::new("a", FieldType::Int, mods(&[FieldModifier::Unique]), None, Span::default()).unwrap();
        let nullable =
            FieldSpec::new("b", FieldType::Int, mods(&[FieldModifier::UniqueNullable]), None, Span::default()).unwrap();
        assert!(strict.is_unique() && nullable.is_unique());
        assert!(!strict.nulls_distinct());
        assert!(nullable.nulls_distinct());
    }

    #[test]
    fn test_auto_add_requires_temporal() {
        let err = FieldSpec::new("a", FieldType::Int, mods(&[FieldModifier::AutoAdd]), None, Span::default());
        assert!(err.is_err());
        assert!(FieldSpec::new("b", FieldType::Datetime, mods(&[FieldModifier::AutoAdd]), None, Span::default()).is_ok());
    }

    #[test]
    fn test_enum_default_must_be_listed() {
        let span = Span::default();
        let ty = FieldType::enumeration(vec!["draft".into(), "sent".into()], &span).unwrap();
        assert!(FieldSpec::new("s", ty.clone(), BTreeSet::new(), Some(DefaultValue::Word("draft".into())), span.clone()).is_ok());
        let err = FieldSpec::new("s", ty, BTreeSet::new(), Some(DefaultValue::Word("paid".into())), span).unwrap_err();
        assert_eq!(err[0].code, DiagnosticCode::DefaultMismatch);
    }

    #[test]
    fn test_enum_requires_unique_values() {
        let span = Span::default();
        assert!(FieldType::enumeration(vec![], &span).is_err());
        assert!(FieldType::enumeration(vec!["a".into(), "a".into()], &span).is_err());
    }

    #[test]
    fn test_decimal_parameters() {
        let span = Span::default();
        assert!(FieldType::decimal(10, 2, &span).is_ok());
        assert!(FieldType::decimal(2, 4, &span).is_err());
        assert!(FieldType::string(Some(0), &span).is_err());
    }

    #[test]
    fn test_reports_every_problem() {
        let err = FieldSpec::new(
            "x",
            FieldType::Bool,
            mods(&[FieldModifier::Required, FieldModifier::Optional, FieldModifier::AutoUpdate]),
            Some(DefaultValue::Int(3)),
            Span::default(),
        )
        .unwrap_err();
        assert_eq!(err.len(), 3);
    }
}
