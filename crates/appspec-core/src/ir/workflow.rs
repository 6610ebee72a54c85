//! Flows, tests, stories, processes, approvals and SLAs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DefaultValue, EntityTrigger, Reference, References, SpannedExpr};
use crate::expr::DurationLiteral;
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn parse(word: &str) -> Option<Priority> {
        match word {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// One scripted user interaction of an end-to-end flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    Navigate(Reference),
    Click(String),
    Fill { field: String, value: String },
    Assert { check: String, value: String },
    Wait(DurationLiteral),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowStep {
    pub action: FlowAction,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowSpec {
    pub name: String,
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub steps: Vec<FlowStep>,
    pub tags: Vec<String>,
    pub span: Span,
}

impl References for FlowSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for step in &mut self.steps {
            if let FlowAction::Navigate(surface) = &mut step.action {
                visit(surface);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestAction {
    Create,
    Update,
    Delete,
    Read,
}

impl TestAction {
    pub fn parse(word: &str) -> Option<TestAction> {
        match word {
            "create" => Some(TestAction::Create),
            "update" => Some(TestAction::Update),
            "delete" => Some(TestAction::Delete),
            "read" => Some(TestAction::Read),
            _ => None,
        }
    }
}

/// A declarative CRUD test against one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    pub title: Option<String>,
    pub entity: Reference,
    pub action: TestAction,
    pub data: BTreeMap<String, DefaultValue>,
    pub expect: Vec<SpannedExpr>,
    pub span: Span,
}

impl References for TestSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.entity);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorySpec {
    pub name: String,
    pub title: Option<String>,
    pub actor: Option<String>,
    pub trigger: Option<String>,
    pub scope: Vec<Reference>,
    pub given: Vec<String>,
    pub when: Vec<String>,
    pub then: Vec<String>,
    pub span: Span,
}

impl References for StorySpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.scope.for_each_ref(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessTrigger {
    Entity(EntityTrigger),
    Schedule(String),
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Service(Reference),
    HumanTask(Reference),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessStep {
    pub name: String,
    pub kind: StepKind,
    pub timeout: Option<DurationLiteral>,
    pub span: Span,
}

/// A long-running orchestration of service calls and human tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub title: Option<String>,
    pub trigger: ProcessTrigger,
    pub steps: Vec<ProcessStep>,
    pub span: Span,
}

impl References for ProcessSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        if let ProcessTrigger::Entity(trigger) = &mut self.trigger {
            trigger.for_each_ref(visit);
        }
        for step in &mut self.steps {
            match &mut step.kind {
                StepKind::Service(r) | StepKind::HumanTask(r) => visit(r),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    Escalate,
    Approve,
    Reject,
}

impl TimeoutAction {
    pub fn parse(word: &str) -> Option<TimeoutAction> {
        match word {
            "escalate" => Some(TimeoutAction::Escalate),
            "approve" => Some(TimeoutAction::Approve),
            "reject" => Some(TimeoutAction::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalSpec {
    pub name: String,
    pub title: Option<String>,
    pub entity: Reference,
    pub trigger: SpannedExpr,
    pub approver_role: String,
    pub quorum: u32,
    pub timeout: Option<DurationLiteral>,
    pub on_timeout: Option<TimeoutAction>,
    pub span: Span,
}

impl References for ApprovalSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.entity);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlaTier {
    pub level: String,
    pub after: DurationLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlaSpec {
    pub name: String,
    pub title: Option<String>,
    pub entity: Reference,
    pub starts_when: SpannedExpr,
    pub completes_when: SpannedExpr,
    pub pauses_when: Option<SpannedExpr>,
    pub tiers: Vec<SlaTier>,
    pub span: Span,
}

impl References for SlaSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(&mut self.entity);
    }
}
