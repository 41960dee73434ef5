use thiserror::Error;

use crate::db::StoreError;

/// Every failure `execute` can surface. Callers translate these to prose;
/// each variant carries a stable kind tag for machine consumption.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be greater than 0.00")]
    InvalidAmount,
    #[error("recipient could not be resolved")]
    RecipientNotFound,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("a source bank account must be selected")]
    MissingSourceAccount,
    #[error("cannot send money to your own bank account")]
    SelfTransferNotAllowed,
    #[error("the selected bank account does not belong to the sender")]
    UnauthorizedAccount,
    #[error("unsupported {0}")]
    UnsupportedTransactionType(String),
    #[error("failed to generate a unique identifier after {0} attempts")]
    IdentifierGenerationExhausted(u32),
    #[error("the ledger is busy, retry the transaction")]
    StoreConflict,
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount => "invalid_amount",
            LedgerError::RecipientNotFound => "recipient_not_found",
            LedgerError::InsufficientFunds => "insufficient_funds",
            LedgerError::MissingSourceAccount => "missing_source_account",
            LedgerError::SelfTransferNotAllowed => "self_transfer_not_allowed",
            LedgerError::UnauthorizedAccount => "unauthorized_account",
            LedgerError::UnsupportedTransactionType(_) => "unsupported_transaction_type",
            LedgerError::IdentifierGenerationExhausted(_) => "identifier_generation_exhausted",
            LedgerError::StoreConflict => "store_conflict",
            LedgerError::Store(_) => "store_failure",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            // the floor re-check under row locks is the authoritative
            // sufficient-funds decision
            StoreError::BalanceFloor => LedgerError::InsufficientFunds,
            StoreError::Conflict | StoreError::UniqueViolation(_) => LedgerError::StoreConflict,
            other => LedgerError::Store(other),
        }
    }
}
