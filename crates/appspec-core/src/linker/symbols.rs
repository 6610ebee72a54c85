//! Global symbol table and reference resolution
//!
//! Symbols are keyed by `(module, name)`. A reference is resolved in this
//! order: an explicit `module.Name` qualification, the referencing module
//! itself, then every other module that defines the name with the
//! reference's kind. When several modules qualify, those in the
//! referencing module's `uses` win; the reference is ambiguous only if more
//! than one remains. Resolution and access are separate questions: a
//! symbol found in a module that is not in `uses` still resolves, and the
//! missing `use` is reported on top.

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{ConstructKind, QualifiedName, Reference};
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub kind: ConstructKind,
    pub file: String,
    pub span: Span,
    /// Registered from a construct the parser could not build
    pub rejected: bool,
}

/// Outcome of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(QualifiedName),
    /// Found, but the defining module is not in the referencing module's `uses`
    Undeclared(QualifiedName, Diagnostic),
    Failed(Diagnostic),
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<QualifiedName, Symbol>,
    /// Name → modules defining it
    by_name: BTreeMap<String, BTreeSet<String>>,
    /// Module → modules it declares in `use`
    uses: BTreeMap<String, BTreeSet<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_module(&mut self, module: &str, uses: impl IntoIterator<Item = String>) {
        self.uses.entry(module.to_string()).or_default().extend(uses);
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.uses.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.uses.keys().map(String::as_str)
    }

    pub fn uses(&self, module: &str) -> impl Iterator<Item = &str> {
        self.uses.get(module).into_iter().flatten().map(String::as_str)
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Register a top-level name; a second definition in the same module
    /// is rejected and the first one kept
    pub fn insert(&mut self, module: &str, name: &str, symbol: Symbol) -> Result<(), Diagnostic> {
        let key = QualifiedName::new(module, name);
        if let Some(existing) = self.symbols.get(&key) {
            return Err(Diagnostic::error(
                DiagnosticCode::DuplicateSymbol,
                format!(
                    "'{}' is already defined in module '{}' as {} at {}:{}",
                    name, module, existing.kind, existing.file, existing.span.line
                ),
                &symbol.span,
            ));
        }
        self.uses.entry(module.to_string()).or_default();
        self.by_name
            .entry(name.to_string())
            .or_default()
            .insert(module.to_string());
        self.symbols.insert(key, symbol);
        Ok(())
    }

    pub fn resolve(&self, reference: &Reference, from: &str) -> Resolution {
        let target = match self.lookup(reference, from) {
            Ok(target) => target,
            Err(diagnostic) => return Resolution::Failed(diagnostic),
        };

        // lookup only returns names present in the table
        let kind = self.symbols.get(&target).map(|s| s.kind);
        if kind != Some(reference.kind) {
            let found = kind.map(|k| k.to_string()).unwrap_or_default();
            return Resolution::Failed(Diagnostic::error(
                DiagnosticCode::KindMismatch,
                format!("expected {} '{}', found {}", reference.kind, reference.name, found),
                &reference.span,
            ));
        }

        if target.module != from && !self.uses.get(from).is_some_and(|u| u.contains(&target.module)) {
            let diagnostic = Diagnostic::error(
                DiagnosticCode::ModuleAccess,
                format!(
                    "module '{}' references '{}' defined in module '{}' without 'use {}'",
                    from, target.name, target.module, target.module
                ),
                &reference.span,
            );
            return Resolution::Undeclared(target, diagnostic);
        }
        Resolution::Found(target)
    }

    fn lookup(&self, reference: &Reference, from: &str) -> Result<QualifiedName, Diagnostic> {
        if let Some((module, name)) = reference.name.rsplit_once('.') {
            let target = QualifiedName::new(module, name);
            if self.symbols.contains_key(&target) {
                return Ok(target);
            }
            let message = if self.has_module(module) {
                format!("module '{}' has no {} '{}'", module, reference.kind, name)
            } else {
                format!("unknown module '{}' in reference '{}'", module, reference.name)
            };
            return Err(Diagnostic::error(
                DiagnosticCode::UnresolvedReference,
                message,
                &reference.span,
            ));
        }

        let defining: Vec<&str> = self
            .by_name
            .get(&reference.name)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let of_kind = |module: &&str| self.kind_of(module, &reference.name) == Some(reference.kind);

        if defining.contains(&from) && of_kind(&from) {
            return Ok(QualifiedName::new(from, reference.name.as_str()));
        }
        let candidates: Vec<&str> = defining.iter().copied().filter(|m| *m != from).filter(of_kind).collect();
        let used: Vec<&str> = candidates
            .iter()
            .copied()
            .filter(|m| self.uses(from).any(|u| u == *m))
            .collect();
        let narrowed = if used.is_empty() { candidates } else { used };

        match narrowed.as_slice() {
            [module] => Ok(QualifiedName::new(*module, reference.name.as_str())),
            // only other kinds carry the name; resolve reports the mismatch
            [] => match defining.iter().find(|m| **m == from).or_else(|| defining.first()) {
                Some(module) => Ok(QualifiedName::new(*module, reference.name.as_str())),
                None => Err(Diagnostic::error(
                    DiagnosticCode::UnresolvedReference,
                    format!("unresolved {} reference '{}'", reference.kind, reference.name),
                    &reference.span,
                )),
            },
            many => Err(Diagnostic::error(
                DiagnosticCode::AmbiguousReference,
                format!(
                    "'{}' is defined in modules {}; qualify the reference",
                    reference.name,
                    many.join(", ")
                ),
                &reference.span,
            )),
        }
    }

    fn kind_of(&self, module: &str, name: &str) -> Option<ConstructKind> {
        self.symbols.get(&QualifiedName::new(module, name)).map(|s| s.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(kind: ConstructKind) -> Symbol {
        Symbol {
            kind,
            file: "test.dsl".into(),
            span: Span::default(),
            rejected: false,
        }
    }

    fn table() -> SymbolTable {
        let mut t = SymbolTable::new();
        t.declare_module("billing", vec!["crm".to_string()]);
        t.declare_module("crm", Vec::new());
        t.declare_module("hr", Vec::new());
        t.insert("billing", "Invoice", symbol(ConstructKind::Entity)).unwrap();
        t.insert("crm", "Customer", symbol(ConstructKind::Entity)).unwrap();
        t.insert("crm", "Contact", symbol(ConstructKind::Entity)).unwrap();
        t.insert("hr", "Contact", symbol(ConstructKind::Entity)).unwrap();
        t.insert("hr", "Employee", symbol(ConstructKind::Entity)).unwrap();
        t
    }

    fn entity_ref(name: &str) -> Reference {
        Reference::new(ConstructKind::Entity, name, Span::default())
    }

    #[test]
    fn test_duplicate_in_same_module() {
        let mut t = table();
        let err = t.insert("crm", "Customer", symbol(ConstructKind::Surface)).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::DuplicateSymbol);
        assert_eq!(t.get(&QualifiedName::new("crm", "Customer")).unwrap().kind, ConstructKind::Entity);
    }

    #[test]
    fn test_own_module_then_declared_use() {
        let t = table();
        assert_eq!(
            t.resolve(&entity_ref("Invoice"), "billing"),
            Resolution::Found(QualifiedName::new("billing", "Invoice"))
        );
        assert_eq!(
            t.resolve(&entity_ref("Customer"), "billing"),
            Resolution::Found(QualifiedName::new("crm", "Customer"))
        );
    }

    #[test]
    fn test_undeclared_module_access_still_resolves() {
        let t = table();
        let Resolution::Undeclared(target, diagnostic) = t.resolve(&entity_ref("Employee"), "billing") else {
            panic!("expected module access violation");
        };
        assert_eq!(target, QualifiedName::new("hr", "Employee"));
        assert_eq!(diagnostic.code, DiagnosticCode::ModuleAccess);
        for part in ["billing", "Employee", "hr", "use hr"] {
            assert!(diagnostic.message.contains(part), "{}", diagnostic.message);
        }
    }

    #[test]
    fn test_used_module_wins_over_unrelated_definition() {
        let t = table();
        assert_eq!(
            t.resolve(&entity_ref("Contact"), "billing"),
            Resolution::Found(QualifiedName::new("crm", "Contact"))
        );
        assert_eq!(
            t.resolve(&entity_ref("crm.Contact"), "billing"),
            Resolution::Found(QualifiedName::new("crm", "Contact"))
        );
    }

    #[test]
    fn test_ambiguous_only_when_several_remain() {
        let mut t = table();
        t.declare_module("payroll", Vec::new());
        let Resolution::Failed(err) = t.resolve(&entity_ref("Contact"), "payroll") else {
            panic!("expected ambiguity");
        };
        assert_eq!(err.code, DiagnosticCode::AmbiguousReference);
        assert!(err.message.contains("crm, hr"), "{}", err.message);

        t.declare_module("billing", vec!["hr".to_string()]);
        let Resolution::Failed(err) = t.resolve(&entity_ref("Contact"), "billing") else {
            panic!("expected ambiguity");
        };
        assert_eq!(err.code, DiagnosticCode::AmbiguousReference);
    }

    #[test]
    fn test_other_kinds_do_not_compete() {
        let mut t = table();
        t.declare_module("ui", Vec::new());
        t.insert("ui", "Customer", symbol(ConstructKind::Surface)).unwrap();
        t.insert("ui", "Employee", symbol(ConstructKind::Surface)).unwrap();
        assert_eq!(
            t.resolve(&entity_ref("Customer"), "billing"),
            Resolution::Found(QualifiedName::new("crm", "Customer"))
        );
        // not in billing's uses, but still the only entity of that name
        let Resolution::Undeclared(target, _) = t.resolve(&entity_ref("Employee"), "billing") else {
            panic!("expected module access violation");
        };
        assert_eq!(target, QualifiedName::new("hr", "Employee"));

        let surface = Reference::new(ConstructKind::Surface, "Employee", Span::default());
        let Resolution::Undeclared(target, _) = t.resolve(&surface, "billing") else {
            panic!("expected module access violation");
        };
        assert_eq!(target, QualifiedName::new("ui", "Employee"));
    }

    #[test]
    fn test_unresolved_and_kind_mismatch() {
        let t = table();
        let Resolution::Failed(err) = t.resolve(&entity_ref("Nope"), "billing") else {
            panic!("expected failure");
        };
        assert_eq!(err.code, DiagnosticCode::UnresolvedReference);

        let Resolution::Failed(err) = t.resolve(&entity_ref("ghost.Invoice"), "billing") else {
            panic!("expected failure");
        };
        assert!(err.message.contains("unknown module 'ghost'"));

        let surface = Reference::new(ConstructKind::Surface, "Invoice", Span::default());
        let Resolution::Failed(err) = t.resolve(&surface, "billing") else {
            panic!("expected failure");
        };
        assert_eq!(err.code, DiagnosticCode::KindMismatch);
        assert_eq!(err.message, "expected surface 'Invoice', found entity");
    }
}
