//! AppSpec Core - compiler front end for the AppSpec application DSL
//!
//! Turns `.dsl` source files into one validated, immutable [`AppSpec`].
//!
//! # Architecture
//!
//! ```text
//! source text → Lexer → tokens → construct parsers → ModuleFragment
//!                                                         ↓
//!                 ModuleIR (one per file) ──────────→ Linker → AppSpec
//!                                                         ↑
//!                      expression parser + type checker ──┘
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: the same files always give the same diagnostics and
//!   a byte-identical `AppSpec`, whatever their order or thread scheduling
//! - **Recovering**: one bad construct is reported and skipped; the rest of
//!   the file is still parsed and checked
//! - **Sound**: every reference in a returned `AppSpec` names an existing
//!   construct of the expected kind

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod ir;
pub mod linker;
pub mod parser;

use rayon::prelude::*;
use tracing::{debug, instrument};

pub use config::CompileOptions;
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Location, Severity};
pub use error::{Error, Result};
pub use expr::{evaluate, parse_expr, type_check, Environment, Value};
pub use ir::{AppSpec, ModuleFragment, ModuleIR};
pub use linker::{link, LinkOutput, Linker};
pub use parser::tokenizer::tokenize;
pub use parser::{parse_module, ParseOptions, Parser};

/// One input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Tokenize and parse one file. Diagnostics carry the file path.
pub fn parse_source(file: &SourceFile, options: &CompileOptions) -> (ModuleIR, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = parser::tokenizer::Lexer::new(&file.text)
        .with_tab_width(options.tab_width)
        .tokenize();
    let (fragment, parse_diagnostics) = Parser::new(ParseOptions::from(options)).parse(&tokens);
    diagnostics.extend(parse_diagnostics);

    let diagnostics = diagnostics.into_iter().map(|d| d.in_file(&file.path)).collect();
    (ModuleIR::from_fragment(&file.path, fragment), diagnostics)
}

/// Parse every file, then link. Files are independent and are parsed on the
/// rayon pool when `options.parallel` is set; linking is sequential.
///
/// Parse and link diagnostics are returned together. `app` is `Some` only if
/// none of them is an error.
#[instrument(skip_all, fields(files = files.len()))]
pub fn compile(files: &[SourceFile], options: &CompileOptions) -> LinkOutput {
    let mut parsed: Vec<(ModuleIR, Vec<Diagnostic>)> = if options.parallel {
        files.par_iter().map(|f| parse_source(f, options)).collect()
    } else {
        files.iter().map(|f| parse_source(f, options)).collect()
    };
    parsed.sort_by(|(a, _), (b, _)| (&a.name, &a.file).cmp(&(&b.name, &b.file)));

    let mut diagnostics = Vec::new();
    let mut modules = Vec::with_capacity(parsed.len());
    for (module, file_diagnostics) in parsed {
        diagnostics.extend(file_diagnostics);
        modules.push(module);
    }
    debug!(modules = modules.len(), parse_diagnostics = diagnostics.len(), "files parsed");

    let linked = Linker::from_options(options).link(modules);
    diagnostics.extend(linked.diagnostics);
    if options.warnings_as_errors {
        diagnostics::promote_warnings(&mut diagnostics);
    }

    let app = if diagnostics.iter().any(Diagnostic::is_error) {
        None
    } else {
        linked.app
    };
    LinkOutput { app, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new("crm.dsl", "module crm\nentity Customer:\n  id: uuid pk\n  name: str(80) required\n"),
            SourceFile::new(
                "billing.dsl",
                "module billing\nuse crm\nentity Invoice:\n  id: uuid pk\n  customer: ref Customer required\n",
            ),
        ]
    }

    #[test]
    fn test_compile_sequential_and_parallel_agree() {
        let sequential = compile(&files(), &CompileOptions { parallel: false, ..CompileOptions::default() });
        let parallel = compile(&files(), &CompileOptions::default());
        assert!(sequential.diagnostics.is_empty(), "{:?}", sequential.diagnostics);
        assert_eq!(sequential.app, parallel.app);
        assert!(parallel.app.is_some());
    }

    #[test]
    fn test_parse_diagnostics_block_app_and_carry_file() {
        let mut inputs = files();
        inputs.push(SourceFile::new("broken.dsl", "entity Broken:\n  x: widget\n"));
        let out = compile(&inputs, &CompileOptions::default());
        assert!(out.app.is_none());
        let first = &out.diagnostics[0];
        assert_eq!(first.code, DiagnosticCode::InvalidType);
        assert_eq!(first.location.file.as_deref(), Some("broken.dsl"));
    }

    #[test]
    fn test_parse_source_uses_file_stem() {
        let (module, diagnostics) = parse_source(
            &SourceFile::new("specs/orders.dsl", "entity Order:\n  id: uuid pk\n"),
            &CompileOptions::default(),
        );
        assert!(diagnostics.is_empty());
        assert_eq!(module.name, "orders");
        assert_eq!(module.file, "specs/orders.dsl");
    }
}
