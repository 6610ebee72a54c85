//! Messages, channels and events

use serde::{Deserialize, Serialize};

use super::{FieldSpec, Reference, References};
use crate::parser::tokenizer::Span;

/// Entity lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityEvent {
    Created,
    Updated,
    Deleted,
    Transitioned,
}

impl EntityEvent {
    pub fn parse(word: &str) -> Option<EntityEvent> {
        match word {
            "created" => Some(EntityEvent::Created),
            "updated" => Some(EntityEvent::Updated),
            "deleted" => Some(EntityEvent::Deleted),
            "transitioned" => Some(EntityEvent::Transitioned),
            _ => None,
        }
    }
}

/// What happened to an entity: `entity Invoice created` or
/// `entity Invoice status -> sent`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Lifecycle(EntityEvent),
    FieldChanged { field: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTrigger {
    pub entity: Reference,
    pub event: TriggerEvent,
}

impl References for EntityTrigger {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.entity);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageSpec {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub span: Span,
}

impl References for MessageSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.fields.for_each_ref(visit);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Queue,
    Stream,
    Webhook,
    Sms,
    Push,
}

impl ChannelKind {
    pub fn parse(word: &str) -> Option<ChannelKind> {
        match word {
            "email" => Some(ChannelKind::Email),
            "queue" => Some(ChannelKind::Queue),
            "stream" => Some(ChannelKind::Stream),
            "webhook" => Some(ChannelKind::Webhook),
            "sms" => Some(ChannelKind::Sms),
            "push" => Some(ChannelKind::Push),
            _ => None,
        }
    }
}

/// `send invoice_sent:` inside a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SendSpec {
    pub name: String,
    pub message: Reference,
    pub trigger: Option<EntityTrigger>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub title: Option<String>,
    pub kind: ChannelKind,
    pub sends: Vec<SendSpec>,
    pub span: Span,
}

impl References for ChannelSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for send in &mut self.sends {
            visit(&mut send.message);
            send.trigger.for_each_ref(visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSpec {
    pub name: String,
    pub title: Option<String>,
    pub source: Reference,
    pub on: EntityEvent,
    pub topic: Option<String>,
    pub payload: Option<Reference>,
    pub span: Span,
}

impl References for EventSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.source);
        self.payload.for_each_ref(visit);
    }
}
