//! `ledger` and `transaction`

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::ir::{
    AccountType, Construct, ConstructKind, ExecutionMode, LedgerSpec, TransactionSpec, TransferSpec,
};
use crate::parser::lines::Line;
use crate::parser::stream::TokenStream;
use crate::parser::{Header, Parser};

use super::sub_header;

pub(super) fn ledger(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut account_code = None;
    let mut ledger_id = None;
    let mut account_type = None;
    let mut currency = None;
    let mut flags = Vec::new();
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "account_code" => account_code = p.take(value.number_value("account code")),
            "ledger_id" => ledger_id = p.take(value.number_value("ledger id")),
            "account_type" => account_type = p.take(value.choice("account type", AccountType::parse)),
            "currency" => currency = p.take(currency_value(&mut value)),
            "flags" => flags = p.take(value.list_value("flag")).unwrap_or_default(),
            _ => p.unknown_key(header, child),
        }
    }

    for (key, missing) in [
        ("account_code", account_code.is_none()),
        ("ledger_id", ledger_id.is_none()),
        ("account_type", account_type.is_none()),
        ("currency", currency.is_none()),
    ] {
        if missing {
            p.missing_key(header, key);
        }
    }
    Some(Construct::Ledger(LedgerSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        account_code: account_code?,
        ledger_id: ledger_id?,
        account_type: account_type?,
        currency: currency?,
        flags,
        span: header.span.clone(),
    }))
}

fn currency_value(s: &mut TokenStream) -> Result<String, Diagnostic> {
    let code = s.expect_word("currency code")?;
    LedgerSpec::validate_currency(&code.lexeme, &code.span)?;
    s.finish()?;
    Ok(code.lexeme.clone())
}

pub(super) fn transaction(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut spec = TransactionSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        idempotency_key: None,
        execution: ExecutionMode::default(),
        transfers: Vec::new(),
        span: header.span.clone(),
    };
    for child in &line.children {
        if let Some((key, mut value)) = child.entry() {
            match key.lexeme.as_str() {
                "idempotency_key" => spec.idempotency_key = p.take(value.word_value("idempotency key")),
                "execution" => {
                    let mode = value.choice("execution mode", |w| match w {
                        "sync" => Some(ExecutionMode::Sync),
                        "async" => Some(ExecutionMode::Async),
                        _ => None,
                    });
                    if let Some(mode) = p.take(mode) {
                        spec.execution = mode;
                    }
                }
                _ => p.unknown_key(header, child),
            }
            continue;
        }
        if child.head() == Some("transfer") {
            if let Some(transfer) = transfer(p, child) {
                spec.transfers.push(transfer);
            }
        } else {
            p.unknown_key(header, child);
        }
    }
    Some(Construct::Transaction(spec))
}

fn transfer(p: &mut Parser, line: &Line) -> Option<TransferSpec> {
    let mut s = line.stream();
    s.advance();
    let (name, _) = p.take(sub_header(&mut s, "transfer name"))?;

    let mut debit = None;
    let mut credit = None;
    let mut amount = None;
    let mut code = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.report(unknown_transfer_key(child));
            continue;
        };
        match key.lexeme.as_str() {
            "debit" => debit = p.take(value.reference(ConstructKind::Ledger)),
            "credit" => credit = p.take(value.reference(ConstructKind::Ledger)),
            "amount" => amount = p.expr(value.rest(), &key.span),
            "code" => code = p.take(value.number_value("transfer code")),
            _ => p.report(unknown_transfer_key(child)),
        }
    }

    for (key, missing) in [
        ("debit", debit.is_none()),
        ("credit", credit.is_none()),
        ("amount", amount.is_none()),
    ] {
        if missing {
            p.report(Diagnostic::error(
                DiagnosticCode::MissingKey,
                format!("transfer '{}' is missing required key '{}'", name, key),
                &line.span(),
            ));
        }
    }
    Some(TransferSpec {
        name,
        debit: debit?,
        credit: credit?,
        amount: amount?,
        code,
        span: line.span(),
    })
}

fn unknown_transfer_key(line: &Line) -> Diagnostic {
    let key = line.tokens.first().map(|t| t.lexeme.as_str()).unwrap_or_default();
    Diagnostic::error(
        DiagnosticCode::UnknownKey,
        format!("unknown key '{}' in transfer block", key),
        &line.span(),
    )
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, parse, parse_one};
    use super::*;

    #[test]
    fn test_ledger() {
        let source = "ledger CustomerWallet \"Customer Wallet\":\n  account_code: 1001\n  ledger_id: 1\n  account_type: liability\n  currency: GBP\n  flags: debits_must_not_exceed_credits\n";
        let Construct::Ledger(l) = parse_one(source) else {
            panic!("expected ledger");
        };
        assert_eq!((l.account_code, l.ledger_id), (1001, 1));
        assert_eq!(l.account_type, AccountType::Liability);
        assert_eq!(l.currency, "GBP");
        assert_eq!(l.flags, vec!["debits_must_not_exceed_credits".to_string()]);
    }

    #[test]
    fn test_ledger_bad_currency_is_rejected() {
        let source = "ledger W:\n  account_code: 1\n  ledger_id: 1\n  account_type: asset\n  currency: pounds\n";
        let (fragment, diags) = parse(source);
        assert_eq!(
            codes(&diags),
            vec![DiagnosticCode::InvalidValue, DiagnosticCode::MissingKey]
        );
        assert_eq!(fragment.rejected[0].name, "W");
    }

    #[test]
    fn test_transaction() {
        let source = r#"transaction RecordPayment "Record payment":
  idempotency_key: payment_id
  execution: async
  transfer fund:
    debit: CustomerWallet
    credit: Revenue
    amount: 100
    code: 1
"#;
        let Construct::Transaction(t) = parse_one(source) else {
            panic!("expected transaction");
        };
        assert_eq!(t.idempotency_key.as_deref(), Some("payment_id"));
        assert_eq!(t.execution, ExecutionMode::Async);
        let transfer = &t.transfers[0];
        assert_eq!(transfer.debit.kind, ConstructKind::Ledger);
        assert_eq!(transfer.credit.name, "Revenue");
        assert_eq!(transfer.code, Some(1));
    }

    #[test]
    fn test_transfer_missing_credit_is_dropped() {
        let source = "transaction T:\n  idempotency_key: k\n  transfer t:\n    debit: A\n    amount: 1\n";
        let (fragment, diags) = parse(source);
        assert_eq!(codes(&diags), vec![DiagnosticCode::MissingKey]);
        let Construct::Transaction(t) = &fragment.constructs[0] else {
            panic!("expected transaction");
        };
        assert!(t.transfers.is_empty());
    }
}
