//! Linker: merges parsed modules into one [`AppSpec`]
//!
//! Phases run in a fixed order over inputs sorted by module name, so the
//! same set of fragments always yields the same diagnostics in the same
//! order and a byte-identical `AppSpec`:
//!
//! 1. merge fragments that belong to the same module
//! 2. register every top-level name in the [`SymbolTable`]
//! 3. check `use` declarations and the module dependency graph
//! 4. resolve every cross-construct reference
//! 5. run the cross-construct validators
//!
//! An `AppSpec` is only produced when no error diagnostic was reported.

pub mod cycles;
pub mod symbols;
mod validate;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::CompileOptions;
use crate::diagnostics::{promote_warnings, Diagnostic, DiagnosticCode, Diagnostics};
use crate::ir::{
    AppHeader, AppSpec, Construct, Linked, ModuleIR, ModuleSummary, QualifiedName, Rejected, References, UseDecl,
};
use crate::parser::tokenizer::Span;
use symbols::{Resolution, Symbol, SymbolTable};

/// A construct with the module and file it came from
#[derive(Debug, Clone)]
pub(crate) struct Placed {
    pub module: String,
    pub file: String,
    pub node: Construct,
}

/// Everything the linker learned; `app` is `None` whenever `diagnostics`
/// holds an error
#[derive(Debug, Clone)]
pub struct LinkOutput {
    pub app: Option<AppSpec>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LinkOutput {
    pub fn into_result(self) -> Result<AppSpec, Vec<Diagnostic>> {
        match self.app {
            Some(app) => Ok(app),
            None => Err(self.diagnostics),
        }
    }
}

/// All fragments of one module, in file order
#[derive(Default)]
struct MergedModule {
    files: Vec<String>,
    uses: Vec<(UseDecl, String)>,
    apps: Vec<(AppHeader, String)>,
    constructs: Vec<(Construct, String)>,
    rejected: Vec<(Rejected, String)>,
}

impl MergedModule {
    fn use_span(&self, target: &str) -> Option<(&Span, &str)> {
        self.uses
            .iter()
            .find(|(decl, _)| decl.module == target)
            .map(|(decl, file)| (&decl.span, file.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Linker {
    warnings_as_errors: bool,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &CompileOptions) -> Self {
        Linker {
            warnings_as_errors: options.warnings_as_errors,
        }
    }

    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn link(&self, mut modules: Vec<ModuleIR>) -> LinkOutput {
        modules.sort_by(|a, b| (&a.name, &a.file).cmp(&(&b.name, &b.file)));
        debug!(fragments = modules.len(), "linking");

        let merged = merge(modules);
        let mut diagnostics = Diagnostics::new();

        let header = app_header(&merged, &mut diagnostics);
        let (symbols, mut placed, partial) = register(&merged, &mut diagnostics);
        debug!(modules = merged.len(), symbols = symbols.len(), partial = partial.len(), "symbols registered");

        check_uses(&merged, &symbols, &mut diagnostics);
        let unresolved = resolve(&symbols, &mut placed, &mut diagnostics);
        debug!(unresolved, "references resolved");

        placed.sort_by(|a, b| (a.module.as_str(), a.node.name()).cmp(&(b.module.as_str(), b.node.name())));
        diagnostics.extend(validate::validate(&placed, &partial));

        let mut diagnostics = diagnostics.into_vec();
        if self.warnings_as_errors {
            promote_warnings(&mut diagnostics);
        }
        if diagnostics.iter().any(Diagnostic::is_error) {
            debug!(diagnostics = diagnostics.len(), "link failed");
            return LinkOutput { app: None, diagnostics };
        }

        let (name, title) = match header {
            Some(h) => (h.name, h.title),
            None => (merged.keys().next().cloned().unwrap_or_else(|| "app".to_string()), None),
        };
        let modules = merged
            .iter()
            .map(|(name, module)| ModuleSummary {
                name: name.clone(),
                files: module.files.clone(),
                uses: module
                    .uses
                    .iter()
                    .map(|(decl, _)| decl.module.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            })
            .collect();
        let constructs = placed
            .into_iter()
            .map(|p| Linked {
                module: p.module,
                node: p.node,
            })
            .collect();

        let app = AppSpec {
            name,
            title,
            modules,
            constructs,
        };
        debug!(app = %app.name, constructs = app.constructs.len(), "link complete");
        LinkOutput {
            app: Some(app),
            diagnostics,
        }
    }
}

/// Link with default settings
pub fn link(modules: Vec<ModuleIR>) -> Result<AppSpec, Vec<Diagnostic>> {
    Linker::new().link(modules).into_result()
}

// ── Phases ─────────────────────────────────────────────

/// Expects `modules` sorted by `(name, file)`
fn merge(modules: Vec<ModuleIR>) -> BTreeMap<String, MergedModule> {
    let mut merged: BTreeMap<String, MergedModule> = BTreeMap::new();
    for module in modules {
        let entry = merged.entry(module.name).or_default();
        let file = module.file;
        let fragment = module.fragment;
        entry.files.push(file.clone());
        entry
            .uses
            .extend(fragment.uses.into_iter().map(|u| (u, file.clone())));
        entry.apps.extend(fragment.app.map(|a| (a, file.clone())));
        entry
            .constructs
            .extend(fragment.constructs.into_iter().map(|c| (c, file.clone())));
        entry
            .rejected
            .extend(fragment.rejected.into_iter().map(|r| (r, file.clone())));
    }
    merged
}

/// At most one `app` header across the whole application
fn app_header(merged: &BTreeMap<String, MergedModule>, diagnostics: &mut Diagnostics) -> Option<AppHeader> {
    let mut headers = merged.values().flat_map(|m| m.apps.iter());
    let (first, _) = headers.next()?;
    for (extra, file) in headers {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticCode::DuplicateHeader,
                format!("second 'app' header '{}'; the application is already named '{}'", extra.name, first.name),
                &extra.span,
            )
            .in_file(file),
        );
    }
    Some(first.clone())
}

/// Build the symbol table. Returns the constructs that were registered and
/// the names of constructs that lost a member to the parser.
fn register(
    merged: &BTreeMap<String, MergedModule>,
    diagnostics: &mut Diagnostics,
) -> (SymbolTable, Vec<Placed>, BTreeSet<QualifiedName>) {
    let mut symbols = SymbolTable::new();
    for (name, module) in merged {
        symbols.declare_module(name, module.uses.iter().map(|(decl, _)| decl.module.clone()));
    }

    let mut placed = Vec::new();
    let mut partial = BTreeSet::new();
    for (module_name, module) in merged {
        for (construct, file) in &module.constructs {
            let symbol = Symbol {
                kind: construct.kind(),
                file: file.clone(),
                span: construct.span().clone(),
                rejected: false,
            };
            match symbols.insert(module_name, construct.name(), symbol) {
                Ok(()) => placed.push(Placed {
                    module: module_name.clone(),
                    file: file.clone(),
                    node: construct.clone(),
                }),
                Err(d) => diagnostics.push(d.in_file(file)),
            }
        }

        for (item, file) in &module.rejected {
            let message = match &item.member {
                Some(member) => {
                    partial.insert(QualifiedName::new(module_name.as_str(), item.name.as_str()));
                    format!(
                        "{} '{}' dropped invalid member '{}'; the application cannot be linked",
                        item.kind, item.name, member
                    )
                }
                None => {
                    let symbol = Symbol {
                        kind: item.kind,
                        file: file.clone(),
                        span: item.span.clone(),
                        rejected: true,
                    };
                    if let Err(d) = symbols.insert(module_name, &item.name, symbol) {
                        diagnostics.push(d.in_file(file));
                    }
                    format!("{} '{}' is invalid; the application cannot be linked", item.kind, item.name)
                }
            };
            diagnostics.push(Diagnostic::error(DiagnosticCode::RejectedConstruct, message, &item.span).in_file(file));
        }
    }
    (symbols, placed, partial)
}

/// Self-use, unknown modules and dependency cycles
fn check_uses(merged: &BTreeMap<String, MergedModule>, symbols: &SymbolTable, diagnostics: &mut Diagnostics) {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, module) in merged {
        let edges = graph.entry(name.clone()).or_default();
        for (decl, file) in &module.uses {
            if &decl.module == name {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::SelfUse,
                        format!("module '{}' uses itself", name),
                        &decl.span,
                    )
                    .in_file(file),
                );
            } else if !symbols.has_module(&decl.module) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticCode::UnknownModule,
                        format!("module '{}' uses unknown module '{}'", name, decl.module),
                        &decl.span,
                    )
                    .in_file(file),
                );
            } else {
                edges.insert(decl.module.clone());
            }
        }
    }

    for cycle in cycles::find_cycles(&graph) {
        let path = cycles::render(&cycle);
        debug!(cycle = %path, "dependency cycle");
        let next = cycle.get(1).unwrap_or(&cycle[0]);
        let site = merged.get(&cycle[0]).and_then(|m| m.use_span(next));
        let default_span = Span::default();
        let (span, file) = site.unwrap_or((&default_span, ""));
        let diagnostic = Diagnostic::error(
            DiagnosticCode::DependencyCycle,
            format!("module dependency cycle: {}", path),
            span,
        );
        diagnostics.push(if file.is_empty() { diagnostic } else { diagnostic.in_file(file) });
    }
}

/// Fill every reference target. Returns how many references failed.
fn resolve(symbols: &SymbolTable, placed: &mut [Placed], diagnostics: &mut Diagnostics) -> usize {
    let mut failed = 0;
    for Placed { module, file, node } in placed.iter_mut() {
        node.for_each_ref(&mut |reference| match symbols.resolve(reference, module) {
            Resolution::Found(target) => reference.target = Some(target),
            Resolution::Undeclared(target, diagnostic) => {
                reference.target = Some(target);
                diagnostics.push(diagnostic.in_file(file));
            }
            Resolution::Failed(diagnostic) => {
                failed += 1;
                diagnostics.push(diagnostic.in_file(file));
            }
        });
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ConstructKind;
    use crate::parser::parse_module;
    use crate::parser::tokenizer::tokenize;

    fn module(file: &str, source: &str) -> ModuleIR {
        let (tokens, lex) = tokenize(source);
        assert!(lex.is_empty(), "lexer diagnostics: {:?}", lex);
        let (fragment, diags) = parse_module(&tokens);
        assert!(diags.is_empty(), "parse diagnostics: {:?}", diags);
        ModuleIR::from_fragment(file, fragment)
    }

    fn codes(diags: &[Diagnostic]) -> Vec<DiagnosticCode> {
        diags.iter().map(|d| d.code).collect()
    }

    const CRM: &str = "module crm\nentity Customer \"Customer\":\n  id: uuid pk\n  name: str(100) required\n";

    const BILLING: &str = r#"module billing
app shop "Shop"
use crm
entity Invoice "Invoice":
  id: uuid pk
  total: decimal(10,2) required
  customer: ref Customer required
  invariant: total >= 0
"#;

    #[test]
    fn test_links_two_modules() {
        let app = link(vec![module("billing.dsl", BILLING), module("crm.dsl", CRM)]).unwrap();
        assert_eq!(app.name, "shop");
        assert_eq!(app.title.as_deref(), Some("Shop"));
        let names: Vec<_> = app.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["billing", "crm"]);
        assert!(app.dangling_references().is_empty());

        let Some(invoice) = app.entity(&crate::ir::QualifiedName::new("billing", "Invoice")) else {
            panic!("Invoice missing");
        };
        let refs = Construct::Entity(invoice.clone()).references();
        assert_eq!(refs[0].target, Some(crate::ir::QualifiedName::new("crm", "Customer")));
    }

    #[test]
    fn test_missing_use_reports_module_access_once() {
        let billing = BILLING.replace("use crm\n", "");
        let err = link(vec![module("billing.dsl", &billing), module("crm.dsl", CRM)]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::ModuleAccess]);
        let message = &err[0].message;
        for part in ["billing", "Customer", "crm", "use crm"] {
            assert!(message.contains(part), "{}", message);
        }
        assert_eq!(err[0].location.file.as_deref(), Some("billing.dsl"));
    }

    #[test]
    fn test_module_spanning_two_files() {
        let a = module("crm/a.dsl", "module crm\nentity A:\n  id: uuid pk\n");
        let b = module("crm/b.dsl", "module crm\nentity B:\n  id: uuid pk\n  a: ref A\n");
        let app = link(vec![b, a]).unwrap();
        assert_eq!(app.name, "crm");
        assert_eq!(app.modules[0].files, vec!["crm/a.dsl".to_string(), "crm/b.dsl".to_string()]);
        assert_eq!(app.constructs.len(), 2);
    }

    #[test]
    fn test_unrelated_module_does_not_make_reference_ambiguous() {
        let hr = module("hr.dsl", "module hr\nentity Contact:\n  id: uuid pk\n");
        let crm = module("crm.dsl", "module crm\nentity Contact:\n  id: uuid pk\n");
        let billing = module(
            "billing.dsl",
            "module billing\nuse crm\nentity Invoice:\n  id: uuid pk\n  contact: ref Contact\n",
        );
        let app = link(vec![billing, crm, hr]).unwrap();
        let invoice = app.entity(&QualifiedName::new("billing", "Invoice")).unwrap();
        let refs = Construct::Entity(invoice.clone()).references();
        assert_eq!(refs[0].target, Some(QualifiedName::new("crm", "Contact")));
    }

    #[test]
    fn test_duplicate_symbol_across_files() {
        let a = module("crm/a.dsl", "module crm\nentity A:\n  id: uuid pk\n");
        let b = module("crm/b.dsl", "module crm\nentity A:\n  id: uuid pk\n");
        let err = link(vec![a, b]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::DuplicateSymbol]);
        assert_eq!(err[0].location.file.as_deref(), Some("crm/b.dsl"));
    }

    #[test]
    fn test_dependency_cycle() {
        let a = module("a.dsl", "module a\nuse b\n");
        let b = module("b.dsl", "module b\nuse a\n");
        let err = link(vec![a, b]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::DependencyCycle]);
        assert!(err[0].message.contains("a -> b -> a"), "{}", err[0].message);
        assert_eq!(err[0].location.file.as_deref(), Some("a.dsl"));
        assert_eq!(err[0].location.line, 2);
    }

    #[test]
    fn test_unknown_and_self_use() {
        let out = Linker::new().link(vec![module("a.dsl", "module a\nuse a\nuse ghost\n")]);
        assert!(out.app.is_none());
        assert_eq!(codes(&out.diagnostics), vec![DiagnosticCode::SelfUse, DiagnosticCode::UnknownModule]);
        assert!(!out.diagnostics[0].is_error());
    }

    #[test]
    fn test_warnings_as_errors_blocks_app() {
        let source = "module a\nuse a\nentity A:\n  id: uuid pk\n";
        assert!(Linker::new().link(vec![module("a.dsl", source)]).app.is_some());
        let out = Linker::new().warnings_as_errors(true).link(vec![module("a.dsl", source)]);
        assert!(out.app.is_none());
        assert!(out.diagnostics[0].is_error());
    }

    #[test]
    fn test_rejected_construct_blocks_without_cascade() {
        let (tokens, _) = tokenize("module a\nentity A:\n  id: uuid pk\n  n: int pk\nentity B:\n  id: uuid pk\n  a: ref A\n");
        let (fragment, parse_diags) = parse_module(&tokens);
        assert_eq!(codes(&parse_diags), vec![DiagnosticCode::MultiplePrimaryKeys]);
        let err = link(vec![ModuleIR::from_fragment("a.dsl", fragment)]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::RejectedConstruct]);
    }

    #[test]
    fn test_currency_mismatch() {
        let source = r#"module money
ledger Wallet:
  account_code: 1001
  ledger_id: 1
  account_type: liability
  currency: GBP
ledger Revenue:
  account_code: 4001
  ledger_id: 1
  account_type: revenue
  currency: USD
transaction Pay:
  idempotency_key: payment_id
  transfer fund:
    debit: Wallet
    credit: Revenue
    amount: 100
"#;
        let err = link(vec![module("money.dsl", source)]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::CurrencyMismatch]);
        assert!(err[0].message.contains("GBP") && err[0].message.contains("USD"));
    }

    #[test]
    fn test_missing_idempotency_key_and_duplicate_account() {
        let source = r#"ledger A:
  account_code: 1
  ledger_id: 1
  account_type: asset
  currency: GBP
ledger B:
  account_code: 1
  ledger_id: 1
  account_type: asset
  currency: GBP
transaction T:
  transfer t:
    debit: A
    credit: B
    amount: 5
"#;
        let err = link(vec![module("money.dsl", source)]).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![DiagnosticCode::DuplicateLedgerAccount, DiagnosticCode::MissingIdempotencyKey]
        );
    }

    #[test]
    fn test_surface_field_must_exist() {
        let source = "entity A:\n  id: uuid pk\n  name: str(50)\nsurface a_list:\n  uses entity A\n  section main:\n    field name\n    field colour\n";
        let err = link(vec![module("a.dsl", source)]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::UnknownField]);
        assert!(err[0].message.contains("colour"));
    }

    #[test]
    fn test_invariant_must_be_bool() {
        let source = "entity A:\n  id: uuid pk\n  n: int\n  invariant: n + 1\n";
        let err = link(vec![module("a.dsl", source)]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::TypeMismatch]);
        assert_eq!(err[0].location.line, 4);
    }

    #[test]
    fn test_unresolved_kind_is_reported() {
        let source = "entity A:\n  id: uuid pk\n  b: ref Missing\n";
        let err = link(vec![module("a.dsl", source)]).unwrap_err();
        assert_eq!(codes(&err), vec![DiagnosticCode::UnresolvedReference]);
        assert!(err[0].message.contains(&ConstructKind::Entity.to_string()));
    }

    #[test]
    fn test_failed_reference_skips_only_dependent_expressions() {
        let source = r#"entity A:
  id: uuid pk
  b: ref Missing
  invariant: b = "x"
entity B:
  id: uuid pk
  n: int
  invariant: n + 1
entity C:
  id: uuid pk
  a: ref A
  invariant: a->b = "x"
  invariant: colour = "red"
"#;
        let err = link(vec![module("a.dsl", source)]).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![
                DiagnosticCode::UnresolvedReference,
                DiagnosticCode::TypeMismatch,
                DiagnosticCode::UnknownPath,
            ]
        );
        assert_eq!(err[1].location.line, 8);
        assert_eq!(err[2].location.line, 13);
        assert!(err[2].message.contains("colour"), "{}", err[2].message);
    }

    #[test]
    fn test_default_app_name() {
        let app = link(vec![module("zeta.dsl", "entity Z:\n  id: uuid pk\n")]).unwrap();
        assert_eq!(app.name, "zeta");
        let empty = link(Vec::new()).unwrap();
        assert_eq!(empty.name, "app");
    }

    #[test]
    fn test_deterministic_over_100_iterations() {
        let inputs = vec![module("crm.dsl", CRM), module("billing.dsl", BILLING)];
        let first = link(inputs.clone()).unwrap();
        for _ in 0..100 {
            let mut shuffled = inputs.clone();
            shuffled.reverse();
            let app = link(shuffled).unwrap();
            assert_eq!(app, first);
            assert_eq!(app.fingerprint(), first.fingerprint());
        }
    }
}
