//! Data governance: classification, retention, erasure and tenancy

use serde::{Deserialize, Serialize};

use super::{Reference, References};
use crate::expr::DurationLiteral;
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Pii,
    PiiSensitive,
    Financial,
    Public,
    Internal,
}

impl Classification {
    pub fn parse(word: &str) -> Option<Classification> {
        match word {
            "pii" => Some(Classification::Pii),
            "pii_sensitive" => Some(Classification::PiiSensitive),
            "financial" => Some(Classification::Financial),
            "public" => Some(Classification::Public),
            "internal" => Some(Classification::Internal),
            _ => None,
        }
    }
}

/// `classify Invoice.number as financial`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassifyRule {
    pub entity: Reference,
    pub field: String,
    pub classification: Classification,
    pub span: Span,
}

/// `retention Invoice: 7y`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetentionRule {
    pub entity: Reference,
    pub period: DurationLiteral,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasureMode {
    Anonymize,
    Delete,
    Archive,
}

impl ErasureMode {
    pub fn parse(word: &str) -> Option<ErasureMode> {
        match word {
            "anonymize" => Some(ErasureMode::Anonymize),
            "delete" => Some(ErasureMode::Delete),
            "archive" => Some(ErasureMode::Archive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    pub title: Option<String>,
    pub classifications: Vec<ClassifyRule>,
    pub retention: Vec<RetentionRule>,
    pub erasure: Option<ErasureMode>,
    pub span: Span,
}

impl References for PolicySpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for rule in &mut self.classifications {
            visit(&mut rule.entity);
        }
        for rule in &mut self.retention {
            visit(&mut rule.entity);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenancyMode {
    #[default]
    SharedSchema,
    SchemaPerTenant,
    DatabasePerTenant,
}

impl TenancyMode {
    pub fn parse(word: &str) -> Option<TenancyMode> {
        match word {
            "shared_schema" => Some(TenancyMode::SharedSchema),
            "schema_per_tenant" => Some(TenancyMode::SchemaPerTenant),
            "database_per_tenant" => Some(TenancyMode::DatabasePerTenant),
            _ => None,
        }
    }
}

/// Tenancy is unnamed in source; it is registered as `tenancy`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenancySpec {
    pub name: String,
    pub title: Option<String>,
    pub mode: TenancyMode,
    pub partition_key: Option<String>,
    pub span: Span,
}

impl References for TenancySpec {
    fn for_each_ref(&mut self, _visit: &mut dyn FnMut(&mut Reference)) {}
}
