//! Double-entry ledgers and transactions

use serde::{Deserialize, Serialize};

use super::{Reference, References, SpannedExpr};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::parser::tokenizer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub fn parse(word: &str) -> Option<AccountType> {
        match word {
            "asset" => Some(AccountType::Asset),
            "liability" => Some(AccountType::Liability),
            "equity" => Some(AccountType::Equity),
            "revenue" => Some(AccountType::Revenue),
            "expense" => Some(AccountType::Expense),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerSpec {
    pub name: String,
    pub title: Option<String>,
    pub account_code: u64,
    pub ledger_id: u64,
    pub account_type: AccountType,
    /// ISO 4217 code, upper case
    pub currency: String,
    pub flags: Vec<String>,
    pub span: Span,
}

impl LedgerSpec {
    pub fn validate_currency(currency: &str, span: &Span) -> Result<(), Diagnostic> {
        if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(())
        } else {
            Err(Diagnostic::error(
                DiagnosticCode::InvalidValue,
                format!("currency '{}' is not a three-letter ISO 4217 code", currency),
                span,
            ))
        }
    }
}

impl References for LedgerSpec {
    fn for_each_ref(&mut self, _visit: &mut dyn FnMut(&mut Reference)) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

/// One leg pair: move `amount` from `debit` to `credit`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferSpec {
    pub name: String,
    pub debit: Reference,
    pub credit: Reference,
    pub amount: SpannedExpr,
    pub code: Option<u32>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionSpec {
    pub name: String,
    pub title: Option<String>,
    /// Required; checked by the linker so every transaction is reported
    pub idempotency_key: Option<String>,
    pub execution: ExecutionMode,
    pub transfers: Vec<TransferSpec>,
    pub span: Span,
}

impl References for TransactionSpec {
    fn for_each_ref(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for transfer in &mut self.transfers {
            visit(&mut transfer.debit);
            visit(&mut transfer.credit);
        }
    }
}
