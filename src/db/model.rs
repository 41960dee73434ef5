use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::error::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

/// A user's primary cash balance. Exactly one per user, created together
/// with the user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BankAccount {
    pub id: Uuid,
    pub owner: Uuid,
    /// 10-digit, unique, never reassigned once set.
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Audit record of one ledger operation. Rows are only ever persisted in a
/// terminal status; `Pending` exists in memory during construction only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub sender: Uuid,
    /// Resolved only for wallet-to-wallet transfers.
    pub recipient: Option<Uuid>,
    /// Email for wallet transfers, account number for bank transfers.
    pub recipient_address: Option<String>,
    pub sender_bank_account: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub transaction_category: TransactionCategory,
    pub transaction_status: TransactionStatus,
    pub amount: Decimal,
    /// 5-digit, unique, assigned exactly once.
    pub receipt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Current,
    Business,
}

/// Which ledger the money moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Wallet,
    BankAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    Transfer,
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

// The HTTP boundary accepts these discriminants as free-form strings; inside
// the engine they are closed enums with exhaustive matching.

impl TryFrom<&str> for TransactionType {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "wallet" => Ok(Self::Wallet),
            "bank_account" => Ok(Self::BankAccount),
            other => Err(LedgerError::UnsupportedTransactionType(format!(
                "transaction type: {other}"
            ))),
        }
    }
}

impl TryFrom<&str> for TransactionCategory {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transfer" => Ok(Self::Transfer),
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            other => Err(LedgerError::UnsupportedTransactionType(format!(
                "transaction category: {other}"
            ))),
        }
    }
}

impl TryFrom<&str> for AccountType {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "savings" => Ok(Self::Savings),
            "current" => Ok(Self::Current),
            "business" => Ok(Self::Business),
            other => Err(LedgerError::UnsupportedTransactionType(format!(
                "account type: {other}"
            ))),
        }
    }
}
