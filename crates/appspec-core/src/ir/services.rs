//! Services, foreign models, integrations and webhooks

use serde::{Deserialize, Serialize};

use super::{EntityEvent, FieldSpec, Reference, References};
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Business logic implemented in a stub
    #[default]
    DomainLogic,
    /// A third-party API described by an external spec
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub title: Option<String>,
    pub kind: ServiceKind,
    pub spec_url: Option<String>,
    pub auth_profile: Option<String>,
    pub input: Vec<FieldSpec>,
    pub output: Vec<FieldSpec>,
    pub guarantees: Vec<String>,
    pub stub: Option<String>,
    pub span: Span,
}

impl References for ServiceSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.input.for_each_ref(visit);
        self.output.for_each_ref(visit);
    }
}

/// A model owned by an external service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignModelSpec {
    pub name: String,
    pub title: Option<String>,
    pub service: Reference,
    pub key: Vec<String>,
    pub fields: Vec<FieldSpec>,
    pub span: Span,
}

impl References for ForeignModelSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.service);
        self.fields.for_each_ref(visit);
    }
}

/// `stripe.create_charge`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceCall {
    pub service: Reference,
    pub operation: String,
}

/// `when surface invoice_detail submitted`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceTrigger {
    pub surface: Reference,
    pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationAction {
    pub name: String,
    pub trigger: Option<SurfaceTrigger>,
    pub call: Option<ServiceCall>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Scheduled(String),
    EventDriven,
}

/// `from stripe.list_customers as StripeCustomer into Customer`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncSpec {
    pub name: String,
    pub mode: SyncMode,
    pub from: ServiceCall,
    pub foreign_model: Option<Reference>,
    pub into: Option<Reference>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationSpec {
    pub name: String,
    pub title: Option<String>,
    pub services: Vec<Reference>,
    pub foreign_models: Vec<Reference>,
    pub actions: Vec<IntegrationAction>,
    pub syncs: Vec<SyncSpec>,
    pub span: Span,
}

impl References for IntegrationSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.services.for_each_ref(visit);
        self.foreign_models.for_each_ref(visit);
        for action in &mut self.actions {
            if let Some(trigger) = &mut action.trigger {
                visit(&mut trigger.surface);
            }
            if let Some(call) = &mut action.call {
                visit(&mut call.service);
            }
        }
        for sync in &mut self.syncs {
            visit(&mut sync.from.service);
            sync.foreign_model.for_each_ref(visit);
            sync.into.for_each_ref(visit);
        }
    }
}

/// Outbound HTTP notification on entity lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub name: String,
    pub title: Option<String>,
    pub entity: Reference,
    pub events: Vec<EntityEvent>,
    pub url: String,
    pub auth: Option<String>,
    pub retry: Option<u32>,
    pub span: Span,
}

impl References for WebhookSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.entity);
    }
}
