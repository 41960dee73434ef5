use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::model::{
    AccountType, BankAccount, Transaction, TransactionCategory, TransactionStatus,
    TransactionType, Wallet,
};
use crate::db::{LedgerRef, LedgerStore, Posting, StoreError};

use self::error::LedgerError;
use self::ident::IdentifierGenerator;

pub mod error;
pub mod ident;

/// Write retries after a write-time unique-constraint collision. Distinct
/// from [`ident::MAX_ATTEMPTS`], which bounds the read-checked draw loop.
const WRITE_ATTEMPTS: u32 = 16;

/// A caller-supplied money movement, not yet validated. Callers are expected
/// to have authenticated `sender`; everything else is checked here.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    pub sender: Uuid,
    pub transaction_type: TransactionType,
    pub transaction_category: TransactionCategory,
    pub amount: Decimal,
    pub recipient_address: Option<String>,
    pub sender_bank_account: Option<Uuid>,
}

/// Output of the validation phase: the postings to apply and the recipient
/// user if one was resolved. Selecting the ledger happens exactly once, here.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub postings: Vec<Posting>,
    pub recipient: Option<Uuid>,
}

/// Validates transaction intents and executes them against the store as
/// all-or-nothing units of work.
pub struct LedgerEngine<S> {
    store: S,
    ident: IdentifierGenerator,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ident: IdentifierGenerator,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-only phase: resolves identifiers to concrete ledgers and runs
    /// every check that can fail before mutation. Balance reads here are
    /// advisory; the commit re-checks debit floors under the row locks.
    pub async fn validate(&self, intent: &TransactionIntent) -> Result<ExecutionPlan, LedgerError> {
        // rejected before any lookup
        if intent.amount <= Decimal::ZERO || intent.amount.normalize().scale() > 2 {
            return Err(LedgerError::InvalidAmount);
        }

        match intent.transaction_category {
            TransactionCategory::Transfer => self.plan_transfer(intent).await,
            TransactionCategory::Deposit => self.plan_single(intent, intent.amount).await,
            TransactionCategory::Withdrawal => self.plan_single(intent, -intent.amount).await,
        }
    }

    async fn plan_transfer(&self, intent: &TransactionIntent) -> Result<ExecutionPlan, LedgerError> {
        match intent.transaction_type {
            TransactionType::Wallet => {
                let address = intent
                    .recipient_address
                    .as_deref()
                    .filter(|address| serde_email::is_valid_email(*address))
                    .ok_or(LedgerError::RecipientNotFound)?;
                let recipient = self
                    .store
                    .user_by_email(address)
                    .await?
                    .ok_or(LedgerError::RecipientNotFound)?;
                self.store
                    .wallet_by_user(recipient.id)
                    .await?
                    .ok_or(LedgerError::RecipientNotFound)?;
                let sender_wallet = self.sender_wallet(intent.sender).await?;
                if sender_wallet.balance < intent.amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                Ok(ExecutionPlan {
                    postings: vec![
                        Posting {
                            ledger: LedgerRef::Wallet(intent.sender),
                            delta: -intent.amount,
                        },
                        Posting {
                            ledger: LedgerRef::Wallet(recipient.id),
                            delta: intent.amount,
                        },
                    ],
                    recipient: Some(recipient.id),
                })
            }
            TransactionType::BankAccount => {
                let address = intent
                    .recipient_address
                    .as_deref()
                    .ok_or(LedgerError::RecipientNotFound)?;
                let recipient_account = self
                    .store
                    .account_by_number(address)
                    .await?
                    .ok_or(LedgerError::RecipientNotFound)?;
                let source = self.sender_account(intent).await?;
                if recipient_account.id == source.id {
                    return Err(LedgerError::SelfTransferNotAllowed);
                }
                if source.balance < intent.amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                Ok(ExecutionPlan {
                    postings: vec![
                        Posting {
                            ledger: LedgerRef::Account(source.id),
                            delta: -intent.amount,
                        },
                        Posting {
                            ledger: LedgerRef::Account(recipient_account.id),
                            delta: intent.amount,
                        },
                    ],
                    recipient: None,
                })
            }
        }
    }

    /// Deposit or withdrawal: one posting against the selected ledger.
    async fn plan_single(
        &self,
        intent: &TransactionIntent,
        delta: Decimal,
    ) -> Result<ExecutionPlan, LedgerError> {
        let ledger = match intent.transaction_type {
            TransactionType::Wallet => {
                let wallet = self.sender_wallet(intent.sender).await?;
                if delta < Decimal::ZERO && wallet.balance < intent.amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                LedgerRef::Wallet(intent.sender)
            }
            TransactionType::BankAccount => {
                let source = self.sender_account(intent).await?;
                if delta < Decimal::ZERO && source.balance < intent.amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                LedgerRef::Account(source.id)
            }
        };
        Ok(ExecutionPlan {
            postings: vec![Posting { ledger, delta }],
            recipient: None,
        })
    }

    async fn sender_wallet(&self, sender: Uuid) -> Result<Wallet, LedgerError> {
        // every user owns a wallet from creation; a missing row is a store fault
        self.store
            .wallet_by_user(sender)
            .await?
            .ok_or(LedgerError::Store(StoreError::MissingRow))
    }

    /// Resolves and authorizes the operating bank account of an intent.
    async fn sender_account(&self, intent: &TransactionIntent) -> Result<BankAccount, LedgerError> {
        let source_id = intent
            .sender_bank_account
            .ok_or(LedgerError::MissingSourceAccount)?;
        let source = self
            .store
            .account_by_id(source_id)
            .await?
            .ok_or(LedgerError::MissingSourceAccount)?;
        if source.owner != intent.sender {
            return Err(LedgerError::UnauthorizedAccount);
        }
        Ok(source)
    }

    /// Validates the intent and applies it atomically. On success the
    /// returned record is Completed with a fresh receipt; on failure the
    /// typed error is returned and a Failed record is persisted for audit
    /// (best effort). A record never leaves here Pending.
    pub async fn execute(&self, intent: &TransactionIntent) -> Result<Transaction, LedgerError> {
        let plan = match self.validate(intent).await {
            Ok(plan) => plan,
            // no lookups have happened and nothing is worth recording
            Err(LedgerError::InvalidAmount) => return Err(LedgerError::InvalidAmount),
            Err(err) => {
                self.record_failure(intent, None).await;
                return Err(err);
            }
        };

        let mut record = self.new_record(intent, plan.recipient, TransactionStatus::Completed);
        match self.persist_with_receipt(&mut record, &plan.postings).await {
            Ok(()) => {
                tracing::info!(receipt = %record.receipt, "transaction completed");
                Ok(record)
            }
            Err(err) => {
                tracing::warn!(error = %err, "transaction failed at commit time");
                self.record_failure(intent, plan.recipient).await;
                Err(err)
            }
        }
    }

    /// Opens a bank account with a fresh unique number and zero balance.
    pub async fn create_account(
        &self,
        owner: Uuid,
        account_type: AccountType,
    ) -> Result<BankAccount, LedgerError> {
        for _ in 0..WRITE_ATTEMPTS {
            let account_number = self.ident.next_account_number(&self.store).await?;
            let account = BankAccount {
                id: Uuid::new_v4(),
                owner,
                account_number,
                account_type,
                balance: Decimal::ZERO,
                is_active: true,
                created_at: Utc::now(),
            };
            match self.store.insert_account(&account).await {
                Ok(()) => return Ok(account),
                Err(StoreError::UniqueViolation(constraint)) => {
                    // lost the check-then-insert race, draw a new number
                    tracing::warn!(%constraint, "account number collided at insert, regenerating");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(LedgerError::IdentifierGenerationExhausted(WRITE_ATTEMPTS))
    }

    pub async fn accounts_by_owner(&self, owner: Uuid) -> Result<Vec<BankAccount>, LedgerError> {
        Ok(self.store.accounts_by_owner(owner).await?)
    }

    pub async fn wallet_by_user(&self, user: Uuid) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.store.wallet_by_user(user).await?)
    }

    /// Transaction history for a sender, newest first.
    pub async fn transactions_by_sender(
        &self,
        sender: Uuid,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions_by_sender(sender).await?)
    }

    /// Pure read; completed records are immutable and never recomputed.
    pub async fn transaction_by_receipt(
        &self,
        receipt: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.store.transaction_by_receipt(receipt).await?)
    }

    fn new_record(
        &self,
        intent: &TransactionIntent,
        recipient: Option<Uuid>,
        status: TransactionStatus,
    ) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            sender: intent.sender,
            recipient,
            recipient_address: intent.recipient_address.clone(),
            sender_bank_account: intent.sender_bank_account,
            transaction_type: intent.transaction_type,
            transaction_category: intent.transaction_category,
            transaction_status: status,
            amount: intent.amount,
            receipt: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Assigns a receipt and persists the record, regenerating the receipt
    /// when the insert loses the uniqueness race. With postings this is the
    /// atomic balance commit; without, a bare audit insert.
    async fn persist_with_receipt(
        &self,
        record: &mut Transaction,
        postings: &[Posting],
    ) -> Result<(), LedgerError> {
        for _ in 0..WRITE_ATTEMPTS {
            record.receipt = self.ident.next_receipt(&self.store).await?;
            record.updated_at = Utc::now();
            let written = if postings.is_empty() {
                self.store.insert_transaction(record).await
            } else {
                self.store.commit_transaction(postings, record).await
            };
            match written {
                Ok(()) => return Ok(()),
                Err(StoreError::UniqueViolation(constraint)) => {
                    tracing::warn!(%constraint, "receipt collided at insert, regenerating");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(LedgerError::IdentifierGenerationExhausted(WRITE_ATTEMPTS))
    }

    /// Best-effort audit row for a failed intent. Losing the row is logged,
    /// never surfaced over the original error.
    async fn record_failure(&self, intent: &TransactionIntent, recipient: Option<Uuid>) {
        let mut record = self.new_record(intent, recipient, TransactionStatus::Failed);
        if let Err(err) = self.persist_with_receipt(&mut record, &[]).await {
            tracing::error!(error = %err, "could not persist failed transaction record");
        }
    }
}
