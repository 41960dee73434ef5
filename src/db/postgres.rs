use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{BankAccount, Transaction, User, Wallet};
use super::{LedgerRef, LedgerStore, Posting, StoreError};

/// Postgres-backed store. Every balance mutation runs inside one database
/// transaction with `SELECT ... FOR UPDATE` row locks taken in a fixed
/// global order, so two transfers touching the same pair of rows in opposite
/// directions cannot deadlock.
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, email, first_name, last_name, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

        // the wallet exists from the moment the user does
        sqlx::query("INSERT INTO wallets (user_id, balance, last_update) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(Decimal::ZERO)
            .bind(user.created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, first_name, last_name, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT user_id, balance, last_update FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(wallet)
    }

    async fn insert_account(&self, account: &BankAccount) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bank_accounts \
             (id, owner, account_number, account_type, balance, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(account.id)
        .bind(account.owner)
        .bind(&account.account_number)
        .bind(account.account_type)
        .bind(account.balance)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<BankAccount>, StoreError> {
        let account = sqlx::query_as::<_, BankAccount>(
            "SELECT id, owner, account_number, account_type, balance, is_active, created_at \
             FROM bank_accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn account_by_number(&self, number: &str) -> Result<Option<BankAccount>, StoreError> {
        let account = sqlx::query_as::<_, BankAccount>(
            "SELECT id, owner, account_number, account_type, balance, is_active, created_at \
             FROM bank_accounts WHERE account_number = $1",
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn accounts_by_owner(&self, owner: Uuid) -> Result<Vec<BankAccount>, StoreError> {
        let accounts = sqlx::query_as::<_, BankAccount>(
            "SELECT id, owner, account_number, account_type, balance, is_active, created_at \
             FROM bank_accounts WHERE owner = $1 ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn account_number_exists(&self, number: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bank_accounts WHERE account_number = $1)",
        )
        .bind(number)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn receipt_exists(&self, receipt: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE receipt = $1)",
        )
        .bind(receipt)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn commit_transaction(
        &self,
        postings: &[Posting],
        record: &Transaction,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // lock rows in fixed global order: wallets before accounts, then by id
        let mut ordered: Vec<Posting> = postings.to_vec();
        ordered.sort_by_key(|posting| posting.ledger);

        for posting in &ordered {
            match posting.ledger {
                LedgerRef::Wallet(user_id) => {
                    let balance = sqlx::query_scalar::<_, Decimal>(
                        "SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE",
                    )
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(StoreError::MissingRow)?;
                    if balance + posting.delta < Decimal::ZERO {
                        return Err(StoreError::BalanceFloor);
                    }
                    sqlx::query(
                        "UPDATE wallets SET balance = balance + $1, last_update = $2 \
                         WHERE user_id = $3",
                    )
                    .bind(posting.delta)
                    .bind(Utc::now())
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                }
                LedgerRef::Account(id) => {
                    let balance = sqlx::query_scalar::<_, Decimal>(
                        "SELECT balance FROM bank_accounts WHERE id = $1 FOR UPDATE",
                    )
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(StoreError::MissingRow)?;
                    if balance + posting.delta < Decimal::ZERO {
                        return Err(StoreError::BalanceFloor);
                    }
                    sqlx::query("UPDATE bank_accounts SET balance = balance + $1 WHERE id = $2")
                        .bind(posting.delta)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        insert_record(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_transaction(&self, record: &Transaction) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_record(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn transactions_by_sender(&self, sender: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let records = sqlx::query_as::<_, Transaction>(
            "SELECT id, sender, recipient, recipient_address, sender_bank_account, \
             transaction_type, transaction_category, transaction_status, amount, receipt, \
             created_at, updated_at \
             FROM transactions WHERE sender = $1 ORDER BY created_at DESC",
        )
        .bind(sender)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn transaction_by_receipt(
        &self,
        receipt: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let record = sqlx::query_as::<_, Transaction>(
            "SELECT id, sender, recipient, recipient_address, sender_bank_account, \
             transaction_type, transaction_category, transaction_status, amount, receipt, \
             created_at, updated_at \
             FROM transactions WHERE receipt = $1",
        )
        .bind(receipt)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}

async fn insert_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &Transaction,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO transactions \
         (id, sender, recipient, recipient_address, sender_bank_account, transaction_type, \
          transaction_category, transaction_status, amount, receipt, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(record.id)
    .bind(record.sender)
    .bind(record.recipient)
    .bind(record.recipient_address.as_deref())
    .bind(record.sender_bank_account)
    .bind(record.transaction_type)
    .bind(record.transaction_category)
    .bind(record.transaction_status)
    .bind(record.amount)
    .bind(&record.receipt)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
