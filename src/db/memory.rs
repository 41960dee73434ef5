use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::model::{BankAccount, Transaction, User, Wallet};
use super::{LedgerRef, LedgerStore, Posting, StoreError};

#[derive(Debug, Default)]
struct Shelves {
    users: HashMap<Uuid, User>,
    users_by_email: HashMap<String, Uuid>,
    wallets: HashMap<Uuid, Wallet>,
    accounts: HashMap<Uuid, BankAccount>,
    numbers: HashMap<String, Uuid>,
    transactions: Vec<Transaction>,
    receipts: HashSet<String>,
}

/// Mutex-guarded store with the same commit semantics as the Postgres
/// backend. The whole commit runs under one lock, which gives it the
/// atomicity the database transaction gives the real store. Used by the
/// integration tests and as a datastore-free dev backend.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: Mutex<Shelves>,
}

impl InMemoryLedgerStore {
    fn lock(&self) -> MutexGuard<'_, Shelves> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, StoreError> {
        let mut shelves = self.lock();
        if shelves.users_by_email.contains_key(email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            created_at: Utc::now(),
        };
        shelves.users_by_email.insert(user.email.clone(), user.id);
        shelves.wallets.insert(
            user.id,
            Wallet {
                user_id: user.id,
                balance: Decimal::ZERO,
                last_update: user.created_at,
            },
        );
        shelves.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let shelves = self.lock();
        let user = shelves
            .users_by_email
            .get(email)
            .and_then(|id| shelves.users.get(id))
            .cloned();
        Ok(user)
    }

    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.lock().wallets.get(&user_id).cloned())
    }

    async fn insert_account(&self, account: &BankAccount) -> Result<(), StoreError> {
        let mut shelves = self.lock();
        if shelves.numbers.contains_key(&account.account_number) {
            return Err(StoreError::UniqueViolation(
                "bank_accounts_account_number_key".to_string(),
            ));
        }
        if !shelves.users.contains_key(&account.owner) {
            return Err(StoreError::MissingRow);
        }
        shelves
            .numbers
            .insert(account.account_number.clone(), account.id);
        shelves.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<BankAccount>, StoreError> {
        Ok(self.lock().accounts.get(&id).cloned())
    }

    async fn account_by_number(&self, number: &str) -> Result<Option<BankAccount>, StoreError> {
        let shelves = self.lock();
        let account = shelves
            .numbers
            .get(number)
            .and_then(|id| shelves.accounts.get(id))
            .cloned();
        Ok(account)
    }

    async fn accounts_by_owner(&self, owner: Uuid) -> Result<Vec<BankAccount>, StoreError> {
        let shelves = self.lock();
        let mut accounts: Vec<BankAccount> = shelves
            .accounts
            .values()
            .filter(|account| account.owner == owner)
            .cloned()
            .collect();
        accounts.sort_by_key(|account| account.created_at);
        Ok(accounts)
    }

    async fn account_number_exists(&self, number: &str) -> Result<bool, StoreError> {
        Ok(self.lock().numbers.contains_key(number))
    }

    async fn receipt_exists(&self, receipt: &str) -> Result<bool, StoreError> {
        Ok(self.lock().receipts.contains(receipt))
    }

    async fn commit_transaction(
        &self,
        postings: &[Posting],
        record: &Transaction,
    ) -> Result<(), StoreError> {
        let mut shelves = self.lock();
        if shelves.receipts.contains(&record.receipt) {
            return Err(StoreError::UniqueViolation(
                "transactions_receipt_key".to_string(),
            ));
        }

        // stage every new balance before mutating anything, so a floor
        // violation leaves the store untouched
        let mut staged: HashMap<LedgerRef, Decimal> = HashMap::new();
        for posting in postings {
            let current = match staged.get(&posting.ledger) {
                Some(balance) => *balance,
                None => match posting.ledger {
                    LedgerRef::Wallet(user_id) => shelves
                        .wallets
                        .get(&user_id)
                        .map(|wallet| wallet.balance)
                        .ok_or(StoreError::MissingRow)?,
                    LedgerRef::Account(id) => shelves
                        .accounts
                        .get(&id)
                        .map(|account| account.balance)
                        .ok_or(StoreError::MissingRow)?,
                },
            };
            let next = current + posting.delta;
            if next < Decimal::ZERO {
                return Err(StoreError::BalanceFloor);
            }
            staged.insert(posting.ledger, next);
        }

        let now = Utc::now();
        for (ledger, balance) in staged {
            match ledger {
                LedgerRef::Wallet(user_id) => {
                    if let Some(wallet) = shelves.wallets.get_mut(&user_id) {
                        wallet.balance = balance;
                        wallet.last_update = now;
                    }
                }
                LedgerRef::Account(id) => {
                    if let Some(account) = shelves.accounts.get_mut(&id) {
                        account.balance = balance;
                    }
                }
            }
        }
        shelves.receipts.insert(record.receipt.clone());
        shelves.transactions.push(record.clone());
        Ok(())
    }

    async fn insert_transaction(&self, record: &Transaction) -> Result<(), StoreError> {
        let mut shelves = self.lock();
        if shelves.receipts.contains(&record.receipt) {
            return Err(StoreError::UniqueViolation(
                "transactions_receipt_key".to_string(),
            ));
        }
        shelves.receipts.insert(record.receipt.clone());
        shelves.transactions.push(record.clone());
        Ok(())
    }

    async fn transactions_by_sender(&self, sender: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let shelves = self.lock();
        let mut records: Vec<Transaction> = shelves
            .transactions
            .iter()
            .filter(|record| record.sender == sender)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn transaction_by_receipt(
        &self,
        receipt: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let shelves = self.lock();
        let record = shelves
            .transactions
            .iter()
            .find(|record| record.receipt == receipt)
            .cloned();
        Ok(record)
    }
}
