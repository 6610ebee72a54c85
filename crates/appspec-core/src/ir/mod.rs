//! Intermediate representation
//!
//! Construct parsers return these types directly; there is no separate
//! parse-tree pass. Constructors such as [`EntitySpec::new`] and
//! [`FieldSpec::new`] enforce the invariants that are local to one
//! declaration, so a successful parse is a structurally valid node.
//! Everything that needs a second construct (does `Customer` exist, is
//! module `crm` in `uses`) is left to the linker.

pub mod app;
pub mod entity;
pub mod fields;
pub mod governance;
pub mod ledger;
pub mod llm;
pub mod messaging;
pub mod services;
pub mod ui;
pub mod workflow;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Location};
use crate::expr::{type_check, Expr, ExprType, FieldSchema};
use crate::parser::tokenizer::{Span, TokenKind};

pub use app::{AppSpec, Linked, ModuleSummary};
pub use entity::*;
pub use fields::*;
pub use governance::*;
pub use ledger::*;
pub use llm::*;
pub use messaging::*;
pub use services::*;
pub use ui::*;
pub use workflow::*;

// ── Names & references ─────────────────────────────────

/// A construct name qualified by its defining module
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub module: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        QualifiedName {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Every top-level construct kind of the DSL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
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
}

const CONSTRUCT_KEYWORDS: &[(ConstructKind, TokenKind, &str)] = &[
    (ConstructKind::Entity, TokenKind::Entity, "entity"),
    (ConstructKind::Surface, TokenKind::Surface, "surface"),
    (ConstructKind::Workspace, TokenKind::Workspace, "workspace"),
    (ConstructKind::Service, TokenKind::Service, "service"),
    (ConstructKind::ForeignModel, TokenKind::ForeignModel, "foreign_model"),
    (ConstructKind::Integration, TokenKind::Integration, "integration"),
    (ConstructKind::Flow, TokenKind::Flow, "flow"),
    (ConstructKind::Test, TokenKind::Test, "test"),
    (ConstructKind::Story, TokenKind::Story, "story"),
    (ConstructKind::Process, TokenKind::Process, "process"),
    (ConstructKind::Message, TokenKind::Message, "message"),
    (ConstructKind::Channel, TokenKind::Channel, "channel"),
    (ConstructKind::Event, TokenKind::Event, "event"),
    (ConstructKind::Ledger, TokenKind::Ledger, "ledger"),
    (ConstructKind::Transaction, TokenKind::Transaction, "transaction"),
    (ConstructKind::Policy, TokenKind::Policy, "policy"),
    (ConstructKind::Tenancy, TokenKind::Tenancy, "tenancy"),
    (ConstructKind::LlmModel, TokenKind::LlmModel, "llm_model"),
    (ConstructKind::LlmIntent, TokenKind::LlmIntent, "llm_intent"),
    (ConstructKind::Enum, TokenKind::Enum, "enum"),
    (ConstructKind::View, TokenKind::View, "view"),
    (ConstructKind::Webhook, TokenKind::Webhook, "webhook"),
    (ConstructKind::Approval, TokenKind::Approval, "approval"),
    (ConstructKind::Sla, TokenKind::Sla, "sla"),
    (ConstructKind::Persona, TokenKind::Persona, "persona"),
];

impl ConstructKind {
    pub fn from_token(kind: TokenKind) -> Option<ConstructKind> {
        CONSTRUCT_KEYWORDS
            .iter()
            .find(|(_, token, _)| *token == kind)
            .map(|(c, _, _)| *c)
    }

    pub fn keyword(self) -> &'static str {
        CONSTRUCT_KEYWORDS
            .iter()
            .find(|(c, _, _)| *c == self)
            .map(|(_, _, word)| *word)
            .unwrap_or("construct")
    }
}

impl std::fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A cross-construct reference.
///
/// `name` is the text written in the source, optionally module-qualified
/// (`crm.Customer`). `target` is empty after parsing and filled by the
/// linker; an [`AppSpec`] never contains an unresolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ConstructKind,
    pub name: String,
    pub span: Span,
    pub target: Option<QualifiedName>,
}

impl Reference {
    pub fn new(kind: ConstructKind, name: impl Into<String>, span: Span) -> Self {
        Reference {
            kind,
            name: name.into(),
            span,
            target: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

/// Visits every [`Reference`] held by an IR node
pub trait References {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference));
}

impl<T: References> References for Vec<T> {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for item in self.iter_mut() {
            item.for_each_ref(visit);
        }
    }
}

impl<T: References> References for Option<T> {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        if let Some(item) = self {
            item.for_each_ref(visit);
        }
    }
}

impl References for Reference {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(self);
    }
}

/// An embedded expression with the position of its first token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpannedExpr {
    pub expr: Expr,
    pub span: Span,
}

impl SpannedExpr {
    /// [`type_check`] with every diagnostic placed at this expression
    pub fn type_check(&self, schema: &FieldSchema) -> Result<ExprType, Diagnostic> {
        type_check(&self.expr, schema).map_err(|mut diagnostic| {
            diagnostic.location = Location::from(&self.span);
            diagnostic
        })
    }
}

impl std::fmt::Display for SpannedExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

// ── Constructs ─────────────────────────────────────────

/// One top-level construct of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Construct {
    Entity(EntitySpec),
    Surface(SurfaceSpec),
    Workspace(WorkspaceSpec),
    Service(ServiceSpec),
    ForeignModel(ForeignModelSpec),
    Integration(IntegrationSpec),
    Flow(FlowSpec),
    Test(TestSpec),
    Story(StorySpec),
    Process(ProcessSpec),
    Message(MessageSpec),
    Channel(ChannelSpec),
    Event(EventSpec),
    Ledger(LedgerSpec),
    Transaction(TransactionSpec),
    Policy(PolicySpec),
    Tenancy(TenancySpec),
    LlmModel(LlmModelSpec),
    LlmIntent(LlmIntentSpec),
    Enum(EnumSpec),
    View(ViewSpec),
    Webhook(WebhookSpec),
    Approval(ApprovalSpec),
    Sla(SlaSpec),
    Persona(PersonaSpec),
}

macro_rules! each_construct {
    ($value:expr, $node:ident => $body:expr) => {
        match $value {
            Construct::Entity($node) => $body,
            Construct::Surface($node) => $body,
            Construct::Workspace($node) => $body,
            Construct::Service($node) => $body,
            Construct::ForeignModel($node) => $body,
            Construct::Integration($node) => $body,
            Construct::Flow($node) => $body,
            Construct::Test($node) => $body,
            Construct::Story($node) => $body,
            Construct::Process($node) => $body,
            Construct::Message($node) => $body,
            Construct::Channel($node) => $body,
            Construct::Event($node) => $body,
            Construct::Ledger($node) => $body,
            Construct::Transaction($node) => $body,
            Construct::Policy($node) => $body,
            Construct::Tenancy($node) => $body,
            Construct::LlmModel($node) => $body,
            Construct::LlmIntent($node) => $body,
            Construct::Enum($node) => $body,
            Construct::View($node) => $body,
            Construct::Webhook($node) => $body,
            Construct::Approval($node) => $body,
            Construct::Sla($node) => $body,
            Construct::Persona($node) => $body,
        }
    };
}

impl Construct {
    pub fn kind(&self) -> ConstructKind {
        match self {
            Construct::Entity(_) => ConstructKind::Entity,
            Construct::Surface(_) => ConstructKind::Surface,
            Construct::Workspace(_) => ConstructKind::Workspace,
            Construct::Service(_) => ConstructKind::Service,
            Construct::ForeignModel(_) => ConstructKind::ForeignModel,
            Construct::Integration(_) => ConstructKind::Integration,
            Construct::Flow(_) => ConstructKind::Flow,
            Construct::Test(_) => ConstructKind::Test,
            Construct::Story(_) => ConstructKind::Story,
            Construct::Process(_) => ConstructKind::Process,
            Construct::Message(_) => ConstructKind::Message,
            Construct::Channel(_) => ConstructKind::Channel,
            Construct::Event(_) => ConstructKind::Event,
            Construct::Ledger(_) => ConstructKind::Ledger,
            Construct::Transaction(_) => ConstructKind::Transaction,
            Construct::Policy(_) => ConstructKind::Policy,
            Construct::Tenancy(_) => ConstructKind::Tenancy,
            Construct::LlmModel(_) => ConstructKind::LlmModel,
            Construct::LlmIntent(_) => ConstructKind::LlmIntent,
            Construct::Enum(_) => ConstructKind::Enum,
            Construct::View(_) => ConstructKind::View,
            Construct::Webhook(_) => ConstructKind::Webhook,
            Construct::Approval(_) => ConstructKind::Approval,
            Construct::Sla(_) => ConstructKind::Sla,
            Construct::Persona(_) => ConstructKind::Persona,
        }
    }

    pub fn name(&self) -> &str {
        each_construct!(self, node => &node.name)
    }

    pub fn title(&self) -> Option<&str> {
        each_construct!(self, node => node.title.as_deref())
    }

    pub fn span(&self) -> &Span {
        each_construct!(self, node => &node.span)
    }

    /// Snapshot of every reference in this construct
    pub fn references(&self) -> Vec<Reference> {
        let mut copy = self.clone();
        let mut out = Vec::new();
        copy.for_each_ref(&mut |r| out.push(r.clone()));
        out
    }
}

impl References for Construct {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        each_construct!(self, node => node.for_each_ref(visit))
    }
}

// ── Fragments & modules ────────────────────────────────

/// `use billing.shared`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UseDecl {
    pub module: String,
    pub span: Span,
}

/// `app shop "Shop"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppHeader {
    pub name: String,
    pub title: Option<String>,
    pub span: Span,
}

/// A construct, or a member of one, that failed local validation.
///
/// Recorded so the linker can register the name (references to it do not
/// turn into unresolved-reference noise) and refuse to build an `AppSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rejected {
    pub kind: ConstructKind,
    pub name: String,
    /// Set when only one member (a field) was dropped from an otherwise valid construct
    pub member: Option<String>,
    pub span: Span,
}

/// Parse result of one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleFragment {
    pub module: Option<String>,
    pub app: Option<AppHeader>,
    pub uses: Vec<UseDecl>,
    pub constructs: Vec<Construct>,
    pub rejected: Vec<Rejected>,
}

impl ModuleFragment {
    pub fn entities(&self) -> impl Iterator<Item = &EntitySpec> {
        self.constructs.iter().filter_map(|c| match c {
            Construct::Entity(e) => Some(e),
            _ => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&Construct> {
        self.constructs.iter().find(|c| c.name() == name)
    }
}

/// One source file's contribution to a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIR {
    pub name: String,
    pub file: String,
    pub uses: Vec<String>,
    pub fragment: ModuleFragment,
}

impl ModuleIR {
    pub fn new(name: impl Into<String>, file: impl Into<String>, fragment: ModuleFragment) -> Self {
        let uses = fragment.uses.iter().map(|u| u.module.clone()).collect();
        ModuleIR {
            name: name.into(),
            file: file.into(),
            uses,
            fragment,
        }
    }

    /// Module named by the fragment's `module` header, else by the file stem
    pub fn from_fragment(file: &str, fragment: ModuleFragment) -> Self {
        let name = match &fragment.module {
            Some(name) => name.clone(),
            None => default_module_name(file),
        };
        ModuleIR::new(name, file, fragment)
    }
}

fn default_module_name(file: &str) -> String {
    let base = file.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(file);
    let stem = base.split('.').next().unwrap_or(base);
    if stem.is_empty() {
        "main".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_keywords_round_trip() {
        for (kind, token, word) in CONSTRUCT_KEYWORDS {
            assert_eq!(ConstructKind::from_token(*token), Some(*kind));
            assert_eq!(kind.keyword(), *word);
            assert_eq!(TokenKind::keyword(word), Some(*token));
        }
        assert_eq!(CONSTRUCT_KEYWORDS.len(), 25);
    }

    #[test]
    fn test_spanned_type_check_reports_at_expression() {
        let spanned = SpannedExpr {
            expr: Expr::FieldRef(crate::expr::FieldPath::simple("missing")),
            span: Span {
                line: 7,
                column: 12,
                offset: 40,
            },
        };
        let err = spanned.type_check(&FieldSchema::for_entity("Invoice")).unwrap_err();
        assert_eq!(err.code, crate::diagnostics::DiagnosticCode::UnknownPath);
        assert_eq!((err.location.line, err.location.column), (7, 12));
    }

    #[test]
    fn test_default_module_name_from_path() {
        assert_eq!(default_module_name("specs/billing.dsl"), "billing");
        assert_eq!(default_module_name("crm.dsl"), "crm");
        assert_eq!(default_module_name(""), "main");
    }

    #[test]
    fn test_module_ir_takes_uses_from_fragment() {
        let fragment = ModuleFragment {
            module: Some("billing".into()),
            uses: vec![UseDecl {
                module: "crm".into(),
                span: Span::default(),
            }],
            ..Default::default()
        };
        let module = ModuleIR::from_fragment("x.dsl", fragment);
        assert_eq!(module.name, "billing");
        assert_eq!(module.uses, vec!["crm".to_string()]);
    }
}
