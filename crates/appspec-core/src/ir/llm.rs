//! LLM model configurations and intents

use serde::{Deserialize, Serialize};

use super::{Reference, References};
use crate::expr::DurationLiteral;
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LlmModelSpec {
    pub name: String,
    pub title: Option<String>,
    pub provider: String,
    pub model_id: String,
    pub tier: Option<String>,
    pub max_tokens: Option<u32>,
    pub span: Span,
}

impl References for LlmModelSpec {
    fn for_each_ref(&mut self, _visit: &mut dyn FnMut(&mut Reference)) {}
}

/// What to do with personal data before it reaches a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiPolicy {
    #[default]
    Allow,
    Redact,
    Block,
}

impl PiiPolicy {
    pub fn parse(word: &str) -> Option<PiiPolicy> {
        match word {
            "allow" => Some(PiiPolicy::Allow),
            "redact" => Some(PiiPolicy::Redact),
            "block" => Some(PiiPolicy::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LlmIntentSpec {
    pub name: String,
    pub title: Option<String>,
    pub model: Reference,
    pub prompt: String,
    pub output_schema: Option<Reference>,
    pub timeout: Option<DurationLiteral>,
    pub pii: PiiPolicy,
    pub span: Span,
}

impl References for LlmIntentSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.model);
        self.output_schema.for_each_ref(visit);
    }
}
