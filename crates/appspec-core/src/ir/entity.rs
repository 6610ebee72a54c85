//! Entities, state machines, access rules and enums

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{FieldSpec, FieldType, Reference, References, SpannedExpr};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::expr::DurationLiteral;
use crate::parser::tokenizer::Span;

/// Source state of a transition; `*` is kept as `Any`, not expanded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateRef {
    Any,
    State(String),
}

impl std::fmt::Display for StateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StateRef::Any => f.write_str("*"),
            StateRef::State(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionConstraint {
    Requires(String),
    Role(Vec<String>),
    AutoAfter(DurationLiteral),
    Manual,
    Guard(SpannedExpr),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub from: StateRef,
    pub to: String,
    pub constraints: Vec<TransitionConstraint>,
    pub span: Span,
}

impl Transition {
    /// Does this rule apply when leaving `state`?
    pub fn applies_from(&self, state: &str) -> bool {
        match &self.from {
            StateRef::Any => true,
            StateRef::State(s) => s == state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOp {
    Create,
    Read,
    List,
    Update,
    Delete,
}

impl AccessOp {
    pub fn parse(word: &str) -> Option<AccessOp> {
        match word {
            "create" => Some(AccessOp::Create),
            "read" => Some(AccessOp::Read),
            "list" => Some(AccessOp::List),
            "update" => Some(AccessOp::Update),
            "delete" => Some(AccessOp::Delete),
            _ => None,
        }
    }
}

/// `update: role(accountant) when status != "paid"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRule {
    pub op: AccessOp,
    pub roles: Vec<String>,
    pub condition: Option<SpannedExpr>,
    pub span: Span,
}

/// `line_total: computed sum(lines.amount)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputedField {
    pub name: String,
    pub expr: SpannedExpr,
    pub span: Span,
}

/// Everything an entity block declared, before local validation
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub computed: Vec<ComputedField>,
    pub invariants: Vec<SpannedExpr>,
    pub indexes: Vec<(Vec<String>, Span)>,
    pub unique_constraints: Vec<(Vec<String>, Span)>,
    pub transitions: Vec<Transition>,
    pub access: Vec<AccessRule>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub computed: Vec<ComputedField>,
    pub invariants: Vec<SpannedExpr>,
    pub indexes: Vec<Vec<String>>,
    pub unique_constraints: Vec<Vec<String>>,
    pub transitions: Vec<Transition>,
    pub access: Vec<AccessRule>,
    pub span: Span,
}

impl EntitySpec {
    /// Validate a draft: at most one primary key, unique member names,
    /// index and unique lists over declared fields, transitions over the
    /// states of the state field.
    pub fn new(draft: EntityDraft) -> Result<EntitySpec, Vec<Diagnostic>> {
        let mut errors = Vec::new();

        let mut seen = BTreeSet::new();
        let member_names = draft
            .fields
            .iter()
            .map(|f| (&f.name, &f.span))
            .chain(draft.computed.iter().map(|c| (&c.name, &c.span)));
        for (name, span) in member_names {
            if !seen.insert(name.as_str()) {
                errors.push(Diagnostic::error(
                    DiagnosticCode::DuplicateField,
                    format!("duplicate field '{}' in entity '{}'", name, draft.name),
                    span,
                ));
            }
        }

        let pks: Vec<&FieldSpec> = draft.fields.iter().filter(|f| f.is_pk()).collect();
        if pks.len() > 1 {
            errors.push(Diagnostic::error(
                DiagnosticCode::MultiplePrimaryKeys,
                format!(
                    "entity '{}' declares {} primary keys ({}); at most one is allowed",
                    draft.name,
                    pks.len(),
                    pks.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
                &pks[1].span,
            ));
        }

        for (list, span) in draft.indexes.iter().chain(draft.unique_constraints.iter()) {
            for field in list {
                if !draft.fields.iter().any(|f| &f.name == field) {
                    errors.push(Diagnostic::error(
                        DiagnosticCode::UnknownField,
                        format!("entity '{}' has no field '{}'", draft.name, field),
                        span,
                    ));
                }
            }
        }

        if !draft.transitions.is_empty() {
            check_transitions(&draft, &mut errors);
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(EntitySpec {
            name: draft.name,
            title: draft.title,
            fields: draft.fields,
            computed: draft.computed,
            invariants: draft.invariants,
            indexes: draft.indexes.into_iter().map(|(l, _)| l).collect(),
            unique_constraints: draft.unique_constraints.into_iter().map(|(l, _)| l).collect(),
            transitions: draft.transitions,
            access: draft.access,
            span: draft.span,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.field(name).is_some() || self.computed.iter().any(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.is_pk())
    }

    /// The enum field driving the state machine
    pub fn state_field(&self) -> Option<&FieldSpec> {
        state_field(&self.fields)
    }
}

fn state_field(fields: &[FieldSpec]) -> Option<&FieldSpec> {
    let is_enum = |f: &&FieldSpec| matches!(f.ty, FieldType::Enum { .. });
    if let Some(named) = fields
        .iter()
        .filter(is_enum)
        .find(|f| f.name == "status" || f.name == "state")
    {
        return Some(named);
    }
    let mut enums = fields.iter().filter(is_enum);
    match (enums.next(), enums.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn check_transitions(draft: &EntityDraft, errors: &mut Vec<Diagnostic>) {
    let Some(field) = state_field(&draft.fields) else {
        errors.push(Diagnostic::error(
            DiagnosticCode::InvalidTransition,
            format!(
                "entity '{}' declares transitions but has no state field (an enum named 'status' or 'state')",
                draft.name
            ),
            &draft.span,
        ));
        return;
    };
    let FieldType::Enum { values } = &field.ty else {
        return;
    };

    for transition in &draft.transitions {
        let mut states: Vec<&str> = vec![transition.to.as_str()];
        if let StateRef::State(from) = &transition.from {
            states.push(from);
        }
        for state in states {
            if !values.iter().any(|v| v == state) {
                errors.push(Diagnostic::error(
                    DiagnosticCode::InvalidTransition,
                    format!(
                        "'{}' is not a state of '{}.{}' (states: {})",
                        state,
                        draft.name,
                        field.name,
                        values.join(", ")
                    ),
                    &transition.span,
                ));
            }
        }
        for constraint in &transition.constraints {
            if let TransitionConstraint::Requires(required) = constraint {
                if !draft.fields.iter().any(|f| &f.name == required) {
                    errors.push(Diagnostic::error(
                        DiagnosticCode::UnknownField,
                        format!("transition requires unknown field '{}'", required),
                        &transition.span,
                    ));
                }
            }
        }
    }
}

impl References for EntitySpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        self.fields.for_each_ref(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub title: Option<String>,
}

/// A named, reusable enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumSpec {
    pub name: String,
    pub title: Option<String>,
    pub values: Vec<EnumValue>,
    pub span: Span,
}

impl EnumSpec {
    pub fn new(
        name: String,
        title: Option<String>,
        values: Vec<EnumValue>,
        span: Span,
    ) -> Result<EnumSpec, Vec<Diagnostic>> {
        let names = values.iter().map(|v| v.name.clone()).collect();
        FieldType::enumeration(names, &span).map_err(|e| vec![e])?;
        Ok(EnumSpec {
            name,
            title,
            values,
            span,
        })
    }
}

impl References for EnumSpec {
    fn for_each_ref(&mut self, _visit: &mut dyn FnMut(&mut Reference)) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FieldModifier;

    fn field(name: &str, ty: FieldType, pk: bool) -> FieldSpec {
        let modifiers = if pk { [FieldModifier::Pk].into_iter().collect() } else { BTreeSet::new() };
        FieldSpec::new(name, ty, modifiers, None, Span::default()).unwrap()
    }

    fn status() -> FieldType {
        FieldType::enumeration(vec!["draft".into(), "sent".into()], &Span::default()).unwrap()
    }

    fn draft(fields: Vec<FieldSpec>) -> EntityDraft {
        EntityDraft {
            name: "Invoice".into(),
            fields,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_pk_accepted() {
        let entity = EntitySpec::new(draft(vec![field("id", FieldType::Uuid, true)])).unwrap();
        assert_eq!(entity.primary_key().map(|f| f.name.as_str()), Some("id"));
    }

    #[test]
    fn test_no_pk_accepted() {
        assert!(EntitySpec::new(draft(vec![field("name", FieldType::Text, false)])).is_ok());
    }

    #[test]
    fn test_two_pks_rejected() {
        let err = EntitySpec::new(draft(vec![
            field("id", FieldType::Uuid, true),
            field("code", FieldType::Int, true),
        ]))
        .unwrap_err();
        assert_eq!(err[0].code, DiagnosticCode::MultiplePrimaryKeys);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = EntitySpec::new(draft(vec![
            field("a", FieldType::Int, false),
            field("a", FieldType::Text, false),
        ]))
        .unwrap_err();
        assert_eq!(err[0].code, DiagnosticCode::DuplicateField);
    }

    #[test]
    fn test_transition_states_checked_against_enum() {
        let mut d = draft(vec![field("status", status(), false)]);
        d.transitions.push(Transition {
            from: StateRef::Any,
            to: "paid".into(),
            constraints: vec![],
            span: Span::default(),
        });
        let err = EntitySpec::new(d).unwrap_err();
        assert_eq!(err[0].code, DiagnosticCode::InvalidTransition);
    }

    #[test]
    fn test_wildcard_transition_applies_everywhere() {
        let t = Transition {
            from: StateRef::Any,
            to: "sent".into(),
            constraints: vec![TransitionConstraint::Manual],
            span: Span::default(),
        };
        assert!(t.applies_from("draft"));
        assert!(t.applies_from("archived"));
    }

    #[test]
    fn test_index_over_unknown_field() {
        let mut d = draft(vec![field("a", FieldType::Int, false)]);
        d.indexes.push((vec!["b".into()], Span::default()));
        assert_eq!(EntitySpec::new(d).unwrap_err()[0].code, DiagnosticCode::UnknownField);
    }
}
