//! Cross-construct validation over the resolved construct list
//!
//! Runs after reference resolution, so every check here can follow a
//! reference's `target` instead of re-resolving names. A check whose
//! input did not resolve is skipped; the resolver already reported it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::Placed;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::expr::{Expr, ExprType, FieldSchema, SchemaField};
use crate::ir::{
    Construct, EntitySpec, FieldSpec, FieldType, LedgerSpec, QualifiedName, Reference, SpannedExpr,
    TransitionConstraint,
};
use crate::parser::tokenizer::Span;

/// What an embedded expression must evaluate to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Bool,
    Numeric,
}

type FieldMap = BTreeMap<String, SchemaField>;

struct Validator<'a> {
    constructs: &'a [Placed],
    index: BTreeMap<QualifiedName, usize>,
    partial: &'a BTreeSet<QualifiedName>,
    diagnostics: Vec<Diagnostic>,
}

/// Run every check. An expression is skipped only when its own schema or
/// one of its arrow hops lost a field to a failed reference.
///
/// `partial` names constructs the parser dropped a member from.
pub(crate) fn validate(constructs: &[Placed], partial: &BTreeSet<QualifiedName>) -> Vec<Diagnostic> {
    let index = constructs
        .iter()
        .enumerate()
        .map(|(i, c)| (QualifiedName::new(c.module.as_str(), c.node.name()), i))
        .collect();
    let mut v = Validator {
        constructs,
        index,
        partial,
        diagnostics: Vec::new(),
    };

    v.check_ledgers();
    v.check_transactions();
    v.check_member_lists();
    v.check_expressions();
    v.diagnostics
}

impl<'a> Validator<'a> {
    fn lookup(&self, reference: &Reference) -> Option<&'a Construct> {
        let target = reference.target.as_ref()?;
        self.index.get(target).map(|&i| &self.constructs[i].node)
    }

    fn entity(&self, reference: &Reference) -> Option<&'a EntitySpec> {
        match self.lookup(reference)? {
            Construct::Entity(e) => Some(e),
            _ => None,
        }
    }

    fn ledger(&self, reference: &Reference) -> Option<&'a LedgerSpec> {
        match self.lookup(reference)? {
            Construct::Ledger(l) => Some(l),
            _ => None,
        }
    }

    fn report(&mut self, file: &str, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic.in_file(file));
    }

    // ── Ledgers & transactions ─────────────────────────────

    /// `(ledger_id, account_code)` identifies one account app-wide
    fn check_ledgers(&mut self) {
        let mut seen: BTreeMap<(u64, u64), QualifiedName> = BTreeMap::new();
        for placed in self.constructs {
            let Construct::Ledger(ledger) = &placed.node else {
                continue;
            };
            let key = (ledger.ledger_id, ledger.account_code);
            let name = QualifiedName::new(placed.module.as_str(), ledger.name.as_str());
            match seen.get(&key) {
                Some(first) => {
                    let message = format!(
                        "ledger '{}' reuses ledger_id {} / account_code {} of '{}'",
                        name, ledger.ledger_id, ledger.account_code, first
                    );
                    self.report(
                        &placed.file,
                        Diagnostic::error(DiagnosticCode::DuplicateLedgerAccount, message, &ledger.span),
                    );
                }
                None => {
                    seen.insert(key, name);
                }
            }
        }
    }

    fn check_transactions(&mut self) {
        for placed in self.constructs {
            let Construct::Transaction(tx) = &placed.node else {
                continue;
            };
            if tx.idempotency_key.is_none() {
                self.report(
                    &placed.file,
                    Diagnostic::error(
                        DiagnosticCode::MissingIdempotencyKey,
                        format!("transaction '{}' has no idempotency_key", tx.name),
                        &tx.span,
                    ),
                );
            }

            for transfer in &tx.transfers {
                if transfer.debit.target.is_some() && transfer.debit.target == transfer.credit.target {
                    self.report(
                        &placed.file,
                        Diagnostic::warning(
                            DiagnosticCode::SelfTransfer,
                            format!(
                                "transfer '{}' debits and credits the same ledger '{}'",
                                transfer.name, transfer.debit.name
                            ),
                            &transfer.span,
                        ),
                    );
                }
                let (Some(debit), Some(credit)) = (self.ledger(&transfer.debit), self.ledger(&transfer.credit)) else {
                    continue;
                };
                if debit.currency != credit.currency {
                    self.report(
                        &placed.file,
                        Diagnostic::error(
                            DiagnosticCode::CurrencyMismatch,
                            format!(
                                "transfer '{}' debits '{}' ({}) but credits '{}' ({})",
                                transfer.name, debit.name, debit.currency, credit.name, credit.currency
                            ),
                            &transfer.span,
                        ),
                    );
                }
            }
        }
    }

    // ── Field names used by other constructs ───────────────

    fn check_member_lists(&mut self) {
        for placed in self.constructs {
            let mut missing: Vec<(String, String, Span)> = Vec::new();
            match &placed.node {
                Construct::Surface(surface) => {
                    let Some(entity) = surface.entity.as_ref().and_then(|r| self.entity(r)) else {
                        continue;
                    };
                    for field in surface.fields() {
                        if !entity.has_member(&field.name) {
                            missing.push((field.name.clone(), entity.name.clone(), field.span.clone()));
                        }
                    }
                    if let Some(ux) = &surface.ux {
                        let named = ux
                            .sort
                            .iter()
                            .map(|k| &k.field)
                            .chain(&ux.filter)
                            .chain(&ux.search);
                        for name in named {
                            if !entity.has_member(name) {
                                missing.push((name.clone(), entity.name.clone(), surface.span.clone()));
                            }
                        }
                    }
                }
                Construct::Workspace(workspace) => {
                    for region in &workspace.regions {
                        let Some(entity) = self.entity(&region.source) else {
                            continue;
                        };
                        for key in &region.sort {
                            if !entity.has_member(&key.field) {
                                missing.push((key.field.clone(), entity.name.clone(), region.span.clone()));
                            }
                        }
                    }
                }
                Construct::View(view) => {
                    let Some(entity) = self.entity(&view.source) else {
                        continue;
                    };
                    for name in &view.fields {
                        if !entity.has_member(name) {
                            missing.push((name.clone(), entity.name.clone(), view.span.clone()));
                        }
                    }
                }
                Construct::ForeignModel(model) => {
                    for key in &model.key {
                        if !model.fields.iter().any(|f| &f.name == key) {
                            missing.push((key.clone(), model.name.clone(), model.span.clone()));
                        }
                    }
                }
                Construct::Policy(policy) => {
                    for rule in &policy.classifications {
                        let Some(entity) = self.entity(&rule.entity) else {
                            continue;
                        };
                        if entity.field(&rule.field).is_none() {
                            missing.push((rule.field.clone(), entity.name.clone(), rule.span.clone()));
                        }
                    }
                }
                _ => {}
            }
            for (field, owner, span) in missing {
                self.report(
                    &placed.file,
                    Diagnostic::error(
                        DiagnosticCode::UnknownField,
                        format!("{} '{}' uses unknown field '{}' of '{}'", placed.node.kind(), placed.node.name(), field, owner),
                        &span,
                    ),
                );
            }
        }
    }

    // ── Expressions ────────────────────────────────────────

    fn check_expressions(&mut self) {
        let typing = self.entity_schemas();

        for placed in self.constructs {
            // (expression, expected type, description, schema)
            let mut checks: Vec<(&SpannedExpr, Expect, &str, Option<Bound<'_>>)> = Vec::new();
            let own = QualifiedName::new(placed.module.as_str(), placed.node.name());
            match &placed.node {
                Construct::Entity(entity) => {
                    let schema = typing.own(&own);
                    for invariant in &entity.invariants {
                        checks.push((invariant, Expect::Bool, "invariant", schema));
                    }
                    for transition in &entity.transitions {
                        for constraint in &transition.constraints {
                            if let TransitionConstraint::Guard(guard) = constraint {
                                checks.push((guard, Expect::Bool, "transition guard", schema));
                            }
                        }
                    }
                    for rule in &entity.access {
                        if let Some(condition) = &rule.condition {
                            checks.push((condition, Expect::Bool, "access condition", schema));
                        }
                    }
                }
                Construct::Surface(surface) => {
                    let schema = typing.bound(surface.entity.as_ref());
                    for attention in surface.ux.iter().flat_map(|ux| &ux.attention) {
                        checks.push((&attention.condition, Expect::Bool, "attention condition", schema));
                    }
                }
                Construct::Workspace(workspace) => {
                    for region in &workspace.regions {
                        if let Some(filter) = &region.filter {
                            checks.push((filter, Expect::Bool, "region filter", typing.bound(Some(&region.source))));
                        }
                    }
                }
                Construct::View(view) => {
                    if let Some(filter) = &view.filter {
                        checks.push((filter, Expect::Bool, "view filter", typing.bound(Some(&view.source))));
                    }
                }
                Construct::Approval(approval) => {
                    let schema = typing.bound(Some(&approval.entity));
                    checks.push((&approval.trigger, Expect::Bool, "approval trigger", schema));
                }
                Construct::Sla(sla) => {
                    let schema = typing.bound(Some(&sla.entity));
                    checks.push((&sla.starts_when, Expect::Bool, "starts_when", schema));
                    checks.push((&sla.completes_when, Expect::Bool, "completes_when", schema));
                    if let Some(pauses) = &sla.pauses_when {
                        checks.push((pauses, Expect::Bool, "pauses_when", schema));
                    }
                }
                Construct::Test(test) => {
                    let schema = typing.bound(Some(&test.entity));
                    for expect in &test.expect {
                        checks.push((expect, Expect::Bool, "test expectation", schema));
                    }
                }
                Construct::Transaction(tx) => {
                    for transfer in &tx.transfers {
                        checks.push((&transfer.amount, Expect::Numeric, "transfer amount", typing.bound(None)));
                    }
                }
                _ => {}
            }

            for (expr, expect, what, bound) in checks {
                let Some(bound) = bound.filter(|b| typing.checkable(&expr.expr, b)) else {
                    trace!(construct = %own, what, "expression depends on a failed reference; skipped");
                    continue;
                };
                if let Some(diagnostic) = check_expr(expr, expect, what, bound.schema) {
                    self.report(&placed.file, diagnostic);
                }
            }
        }
    }

    /// Schemas of every entity, keyed by qualified name. Computed fields
    /// are typed in declaration order and become visible to later computed
    /// fields, to every other expression, and across arrow hops.
    ///
    /// An entity whose schema lost a field is marked incomplete: a member
    /// the parser dropped, a reference that did not resolve, or a computed
    /// field that did not type.
    fn entity_schemas(&mut self) -> Typing {
        let entities: Vec<(&'a Placed, &'a EntitySpec)> = self
            .constructs
            .iter()
            .filter_map(|p| match &p.node {
                Construct::Entity(e) => Some((p, e)),
                _ => None,
            })
            .collect();

        let mut maps: BTreeMap<String, FieldMap> = entities
            .iter()
            .map(|(p, e)| (qualified(p), declared_fields(&e.fields)))
            .collect();
        let mut incomplete: BTreeSet<String> = entities
            .iter()
            .filter(|(p, e)| {
                self.partial.contains(&QualifiedName::new(p.module.as_str(), e.name.as_str()))
                    || e.fields.iter().any(|f| dangling(f, &maps))
            })
            .map(|(p, _)| qualified(p))
            .collect();

        for (placed, entity) in &entities {
            let key = qualified(placed);
            let mut schema = FieldSchema {
                entity: Some(entity.name.clone()),
                fields: maps.get(&key).cloned().unwrap_or_default(),
                entities: maps.clone(),
            };
            for computed in &entity.computed {
                let own_incomplete = incomplete.contains(&key);
                if !checkable(&computed.expr.expr, &schema, own_incomplete, &incomplete) {
                    trace!(entity = %key, field = %computed.name, "computed field depends on a failed reference");
                    incomplete.insert(key.clone());
                    continue;
                }
                match computed.expr.type_check(&schema) {
                    Ok(ty) => {
                        trace!(entity = %key, field = %computed.name, ty = %ty, "computed field typed");
                        schema.fields.insert(computed.name.clone(), SchemaField::Scalar(ty));
                    }
                    Err(diagnostic) => {
                        incomplete.insert(key.clone());
                        self.report(&placed.file, diagnostic);
                    }
                }
            }
            maps.insert(key, schema.fields);
        }

        let schemas = entities
            .iter()
            .map(|(placed, entity)| {
                let schema = FieldSchema {
                    entity: Some(entity.name.clone()),
                    fields: maps.get(&qualified(placed)).cloned().unwrap_or_default(),
                    entities: maps.clone(),
                };
                (QualifiedName::new(placed.module.as_str(), entity.name.as_str()), schema)
            })
            .collect();
        let unbound = FieldSchema {
            entities: maps,
            ..FieldSchema::default()
        };
        Typing {
            schemas,
            unbound,
            incomplete,
        }
    }
}

/// Entity schemas for expression checking
struct Typing {
    schemas: BTreeMap<QualifiedName, FieldSchema>,
    /// No own fields; types expressions that are not bound to an entity
    unbound: FieldSchema,
    incomplete: BTreeSet<String>,
}

/// The schema an expression is checked against
#[derive(Clone, Copy)]
struct Bound<'s> {
    schema: &'s FieldSchema,
    incomplete: bool,
}

impl Typing {
    fn own(&self, entity: &QualifiedName) -> Option<Bound<'_>> {
        let schema = self.schemas.get(entity)?;
        Some(Bound {
            schema,
            incomplete: self.incomplete.contains(&entity.to_string()),
        })
    }

    /// `None` when the construct names an entity that did not resolve
    fn bound(&self, reference: Option<&Reference>) -> Option<Bound<'_>> {
        match reference {
            None => Some(Bound {
                schema: &self.unbound,
                incomplete: false,
            }),
            Some(r) => self.own(r.target.as_ref()?),
        }
    }

    fn checkable(&self, expr: &Expr, bound: &Bound) -> bool {
        checkable(expr, bound.schema, bound.incomplete, &self.incomplete)
    }
}

/// False when some path of `expr` reaches a field that is missing only
/// because a reference failed upstream. Genuinely unknown fields on
/// complete entities stay checkable so the checker reports them.
fn checkable(expr: &Expr, schema: &FieldSchema, own_incomplete: bool, incomplete: &BTreeSet<String>) -> bool {
    let mut ok = true;
    expr.walk_paths(&mut |path| {
        let mut fields = &schema.fields;
        let mut tainted = own_incomplete;
        for segment in path.fields() {
            match fields.get(&segment.name) {
                None => {
                    ok &= !tainted;
                    return;
                }
                Some(SchemaField::Reference { target, .. }) => match schema.entities.get(target) {
                    Some(next) => {
                        fields = next;
                        tainted = incomplete.contains(target);
                    }
                    None => {
                        ok = false;
                        return;
                    }
                },
                Some(SchemaField::Scalar(_)) => return,
            }
        }
    });
    ok
}

/// A reference field whose target is not a linked entity
fn dangling(field: &FieldSpec, entities: &BTreeMap<String, FieldMap>) -> bool {
    match &field.ty {
        FieldType::Reference { target, .. } => target
            .target
            .as_ref()
            .map_or(true, |t| !entities.contains_key(&t.to_string())),
        _ => false,
    }
}

fn qualified(placed: &Placed) -> String {
    QualifiedName::new(placed.module.as_str(), placed.node.name()).to_string()
}

/// Expression view of declared fields; unresolved references are left out
fn declared_fields(fields: &[FieldSpec]) -> FieldMap {
    let mut map = FieldMap::new();
    for field in fields {
        let schema_field = match &field.ty {
            FieldType::Reference { kind, target, .. } => match &target.target {
                Some(t) => SchemaField::Reference {
                    target: t.to_string(),
                    many: kind.is_many(),
                },
                None => continue,
            },
            ty => match ty.expr_type() {
                Some(t) => SchemaField::Scalar(t),
                None => continue,
            },
        };
        map.insert(field.name.clone(), schema_field);
    }
    map
}

fn check_expr(expr: &SpannedExpr, expect: Expect, what: &str, schema: &FieldSchema) -> Option<Diagnostic> {
    let ty = match expr.type_check(schema) {
        Ok(ty) => ty,
        Err(diagnostic) => return Some(diagnostic),
    };
    let (ok, wanted) = match expect {
        Expect::Bool => (ty == ExprType::Bool, "bool"),
        Expect::Numeric => (ty.is_numeric(), "int or decimal"),
    };
    if ok {
        return None;
    }
    Some(Diagnostic::error(
        DiagnosticCode::TypeMismatch,
        format!("{} must be {}, found {}", what, wanted, ty),
        &expr.span,
    ))
}
