use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use self::model::{BankAccount, Transaction, User, Wallet};

pub mod memory;
pub mod model;
pub mod postgres;

/// A balance-bearing entity a posting can target. Wallets and bank accounts
/// are treated uniformly during a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LedgerRef {
    Wallet(Uuid),
    Account(Uuid),
}

/// One balance delta against one ledger. A negative delta is a debit and is
/// subject to the non-negative balance floor.
#[derive(Debug, Clone, Copy)]
pub struct Posting {
    pub ledger: LedgerRef,
    pub delta: Decimal,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("debit would drive the balance below zero")]
    BalanceFloor,
    #[error("referenced row does not exist")]
    MissingRow,
    #[error("lock or serialization conflict, retry the operation")]
    Conflict,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    return StoreError::UniqueViolation(
                        db_err.constraint().unwrap_or("unknown").to_string(),
                    );
                }
                // serialization_failure / lock_not_available
                Some("40001") | Some("55P03") => return StoreError::Conflict,
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

/// Durable storage for accounts, wallets and transaction records.
///
/// Balance mutation happens exclusively through [`commit_transaction`], which
/// applies all postings and the record inside one atomic unit of work. There
/// is no standalone balance write.
///
/// [`commit_transaction`]: LedgerStore::commit_transaction
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates the user and their wallet in the same atomic unit.
    async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn insert_account(&self, account: &BankAccount) -> Result<(), StoreError>;

    async fn account_by_id(&self, id: Uuid) -> Result<Option<BankAccount>, StoreError>;

    async fn account_by_number(&self, number: &str) -> Result<Option<BankAccount>, StoreError>;

    async fn accounts_by_owner(&self, owner: Uuid) -> Result<Vec<BankAccount>, StoreError>;

    async fn account_number_exists(&self, number: &str) -> Result<bool, StoreError>;

    async fn receipt_exists(&self, receipt: &str) -> Result<bool, StoreError>;

    /// Applies every posting and persists the record, all-or-nothing. Debit
    /// floors are re-checked under the row locks; a violation rolls the unit
    /// back with [`StoreError::BalanceFloor`].
    async fn commit_transaction(
        &self,
        postings: &[Posting],
        record: &Transaction,
    ) -> Result<(), StoreError>;

    /// Persists a terminal-status record without touching any balance. Used
    /// for the audit rows of failed transactions.
    async fn insert_transaction(&self, record: &Transaction) -> Result<(), StoreError>;

    /// Newest first.
    async fn transactions_by_sender(&self, sender: Uuid) -> Result<Vec<Transaction>, StoreError>;

    async fn transaction_by_receipt(
        &self,
        receipt: &str,
    ) -> Result<Option<Transaction>, StoreError>;
}
