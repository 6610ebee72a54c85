//! End-to-end scenarios through the public API

use appspec_core::expr::{parse_text, DurationLiteral, DurationUnit, Expr, ExprType, FieldSchema};
use appspec_core::ir::{Construct, QualifiedName};
use appspec_core::{
    compile, evaluate, parse_module, tokenize, type_check, CompileOptions, DiagnosticCode, Environment, SourceFile,
    Value,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

fn codes(output: &appspec_core::LinkOutput) -> Vec<DiagnosticCode> {
    output.diagnostics.iter().map(|d| d.code).collect()
}

const CRM: &str = r#"module crm
entity Customer "Customer":
  id: uuid pk
  name: str(120) required
  email: email unique?
"#;

const BILLING: &str = r#"module billing
app shop "Shop"
use crm
entity Invoice "Invoice":
  id: uuid pk
  number: str(20) required unique
  customer: ref Customer required
  total: decimal(10,2) required = 0
  due_date: date required
  status: enum[draft,sent,paid]=draft
  invariant: due_date > today
  transitions:
    draft -> sent
    sent -> paid: role(accountant)
"#;

// ── Entity with FK and invariant ───────────────────────

#[test]
fn entity_with_foreign_key_and_invariant() {
    let (tokens, lex) = tokenize(BILLING);
    assert!(lex.is_empty(), "{:?}", lex);
    let (fragment, diagnostics) = parse_module(&tokens);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    let Some(Construct::Entity(invoice)) = fragment.find("Invoice") else {
        panic!("Invoice not parsed");
    };
    let schema = FieldSchema::for_entity("Invoice").with_scalar("due_date", ExprType::Date);
    let ty = type_check(&invoice.invariants[0].expr, &schema).unwrap();
    assert_eq!(ty, ExprType::Bool);

    let out = compile(
        &[SourceFile::new("crm.dsl", CRM), SourceFile::new("billing.dsl", BILLING)],
        &CompileOptions::default(),
    );
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    let app = out.app.unwrap();
    assert!(app.entity(&QualifiedName::new("billing", "Invoice")).is_some());
}

// ── Missing use ────────────────────────────────────────

#[test]
fn missing_use_is_one_module_access_error() {
    let billing = BILLING.replace("use crm\n", "");
    let out = compile(
        &[SourceFile::new("crm.dsl", CRM), SourceFile::new("billing.dsl", &billing)],
        &CompileOptions::default(),
    );
    assert!(out.app.is_none());
    assert_eq!(codes(&out), vec![DiagnosticCode::ModuleAccess]);
    let message = &out.diagnostics[0].message;
    assert!(message.contains("billing"), "{}", message);
    assert!(message.contains("Customer"), "{}", message);
    assert!(message.contains("crm"), "{}", message);
}

// ── Duration arithmetic ────────────────────────────────

#[test]
fn today_plus_fourteen_days() {
    let now = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap().and_hms_opt(9, 30, 0).unwrap();
    let env = Environment::new(now);
    let expr = parse_text("today() + 14d", &FieldSchema::new()).unwrap();
    let expected = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
    assert_eq!(evaluate(&expr, &env).unwrap(), Value::Date(expected));
}

#[test]
fn duration_spellings_are_identical() {
    let compact = parse_text("14d", &FieldSchema::new()).unwrap();
    let words = parse_text("14 days", &FieldSchema::new()).unwrap();
    assert_eq!(compact, words);
    assert_eq!(
        compact,
        Expr::Duration(DurationLiteral {
            amount: 14,
            unit: DurationUnit::Days
        })
    );
}

#[test]
fn unknown_function_is_not_an_expression() {
    let err = parse_text("foo(x)", &FieldSchema::new()).unwrap_err();
    assert_eq!(err.code, DiagnosticCode::UnknownFunction);
}

// ── Ledger currency mismatch ───────────────────────────

#[test]
fn transfer_between_currencies_is_rejected() {
    let source = r#"module finance
ledger CustomerWallet "Customer Wallet":
  account_code: 1001
  ledger_id: 1
  account_type: liability
  currency: GBP
ledger Revenue "Revenue":
  account_code: 4001
  ledger_id: 1
  account_type: revenue
  currency: USD
transaction RecordPayment "Record payment":
  idempotency_key: payment_id
  transfer fund:
    debit: CustomerWallet
    credit: Revenue
    amount: 100
"#;
    let (tokens, _) = tokenize(source);
    let (fragment, diagnostics) = parse_module(&tokens);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert_eq!(fragment.constructs.len(), 3);

    let out = compile(&[SourceFile::new("finance.dsl", source)], &CompileOptions::default());
    assert!(out.app.is_none());
    assert_eq!(codes(&out), vec![DiagnosticCode::CurrencyMismatch]);
    assert_eq!(out.diagnostics[0].location.file.as_deref(), Some("finance.dsl"));
}
