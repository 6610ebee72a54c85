//! Malformed input: the front end reports and keeps going

use appspec_core::ir::Construct;
use appspec_core::{compile, parse_module, tokenize, CompileOptions, DiagnosticCode, SourceFile};

#[test]
fn unclosed_bracket_does_not_swallow_later_constructs() {
    let source = "entity A:\n  id: uuid pk\n  n: int\n  invariant: (n > 1\nentity B:\n  id: uuid pk\nentity C:\n  id: uuid pk\n";
    let (tokens, lex) = tokenize(source);
    assert_eq!(lex.len(), 1);
    assert_eq!(lex[0].code, DiagnosticCode::UnclosedBracket);
    assert_eq!(lex[0].location.line, 4);

    let (fragment, _) = parse_module(&tokens);
    let names: Vec<&str> = fragment.constructs.iter().map(Construct::name).collect();
    assert!(names.contains(&"B") && names.contains(&"C"), "{:?}", names);

    let out = compile(&[SourceFile::new("a.dsl", source)], &CompileOptions::default());
    assert!(out.app.is_none());
    assert!(out
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::UnclosedBracket && d.location.file.as_deref() == Some("a.dsl")));
}

#[test]
fn deeply_indented_file_is_reported_not_fatal() {
    let source: String = (0..4000).map(|i| format!("{}k{}: 1\n", " ".repeat(i), i)).collect();
    let out = compile(&[SourceFile::new("deep.dsl", source)], &CompileOptions::default());
    assert!(out.app.is_none());
    let too_deep: Vec<_> = out
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::TooDeep)
        .collect();
    assert_eq!(too_deep.len(), 1);
    assert_eq!(too_deep[0].location.line, 66);
}
