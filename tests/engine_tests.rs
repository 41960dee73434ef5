use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use uuid::Uuid;

use banking_ledger::db::memory::InMemoryLedgerStore;
use banking_ledger::db::model::{
    AccountType, TransactionCategory, TransactionStatus, TransactionType, User,
};
use banking_ledger::db::LedgerStore;
use banking_ledger::engine::error::LedgerError;
use banking_ledger::engine::{LedgerEngine, TransactionIntent};

type Engine = LedgerEngine<InMemoryLedgerStore>;

fn engine() -> Arc<Engine> {
    Arc::new(LedgerEngine::new(InMemoryLedgerStore::default()))
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

async fn user(engine: &Engine, email: &str) -> User {
    engine
        .store()
        .create_user(email, "Test", "User")
        .await
        .unwrap()
}

fn wallet_intent(
    sender: Uuid,
    category: TransactionCategory,
    amount: &str,
    recipient: Option<&str>,
) -> TransactionIntent {
    TransactionIntent {
        sender,
        transaction_type: TransactionType::Wallet,
        transaction_category: category,
        amount: dec(amount),
        recipient_address: recipient.map(ToOwned::to_owned),
        sender_bank_account: None,
    }
}

fn bank_intent(
    sender: Uuid,
    category: TransactionCategory,
    amount: &str,
    recipient: Option<&str>,
    source: Option<Uuid>,
) -> TransactionIntent {
    TransactionIntent {
        sender,
        transaction_type: TransactionType::BankAccount,
        transaction_category: category,
        amount: dec(amount),
        recipient_address: recipient.map(ToOwned::to_owned),
        sender_bank_account: source,
    }
}

/// Funds a wallet through the engine so the fixture path is the same path
/// production money takes.
async fn fund_wallet(engine: &Engine, owner: Uuid, amount: &str) -> String {
    let record = engine
        .execute(&wallet_intent(
            owner,
            TransactionCategory::Deposit,
            amount,
            None,
        ))
        .await
        .unwrap();
    record.receipt
}

async fn fund_account(engine: &Engine, owner: Uuid, account: Uuid, amount: &str) {
    engine
        .execute(&bank_intent(
            owner,
            TransactionCategory::Deposit,
            amount,
            None,
            Some(account),
        ))
        .await
        .unwrap();
}

async fn wallet_balance(engine: &Engine, owner: Uuid) -> Decimal {
    engine.wallet_by_user(owner).await.unwrap().unwrap().balance
}

async fn account_balance(engine: &Engine, id: Uuid) -> Decimal {
    engine.store().account_by_id(id).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn wallet_transfer_moves_funds_between_wallets() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let bob = user(&engine, "bob@bank.test").await;
    let mut issued = HashSet::new();
    issued.insert(fund_wallet(&engine, alice.id, "100.00").await);
    issued.insert(fund_wallet(&engine, bob.id, "10.00").await);

    let record = engine
        .execute(&wallet_intent(
            alice.id,
            TransactionCategory::Transfer,
            "40.00",
            Some("bob@bank.test"),
        ))
        .await
        .unwrap();

    assert_eq!(wallet_balance(&engine, alice.id).await, dec("60.00"));
    assert_eq!(wallet_balance(&engine, bob.id).await, dec("50.00"));
    assert_eq!(record.transaction_status, TransactionStatus::Completed);
    assert_eq!(record.recipient, Some(bob.id));
    assert_eq!(record.receipt.len(), 5);
    assert!(record.receipt.chars().all(|c| c.is_ascii_digit()));
    // fresh code, not previously issued
    assert!(!issued.contains(&record.receipt));
}

#[tokio::test]
async fn transfer_exceeding_balance_changes_nothing() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let bob = user(&engine, "bob@bank.test").await;
    fund_wallet(&engine, alice.id, "25.00").await;
    fund_wallet(&engine, bob.id, "5.00").await;

    let err = engine
        .execute(&wallet_intent(
            alice.id,
            TransactionCategory::Transfer,
            "25.01",
            Some("bob@bank.test"),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds));
    assert_eq!(wallet_balance(&engine, alice.id).await, dec("25.00"));
    assert_eq!(wallet_balance(&engine, bob.id).await, dec("5.00"));

    // the failure is recorded, not silently dropped
    let history = engine.transactions_by_sender(alice.id).await.unwrap();
    let failed = history
        .iter()
        .find(|record| record.transaction_status == TransactionStatus::Failed)
        .unwrap();
    assert_eq!(failed.transaction_category, TransactionCategory::Transfer);
    assert_eq!(failed.amount, dec("25.01"));
    assert_eq!(failed.receipt.len(), 5);
}

#[tokio::test]
async fn non_positive_amounts_rejected_for_every_combination() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;

    for category in [
        TransactionCategory::Transfer,
        TransactionCategory::Deposit,
        TransactionCategory::Withdrawal,
    ] {
        for transaction_type in [TransactionType::Wallet, TransactionType::BankAccount] {
            for amount in ["0.00", "-1.00"] {
                let err = engine
                    .execute(&TransactionIntent {
                        sender: alice.id,
                        transaction_type,
                        transaction_category: category,
                        amount: dec(amount),
                        recipient_address: Some("bob@bank.test".to_string()),
                        sender_bank_account: None,
                    })
                    .await
                    .unwrap_err();
                assert!(matches!(err, LedgerError::InvalidAmount));
            }
        }
    }

    // rejected before any lookup, so nothing was recorded either
    assert!(engine
        .transactions_by_sender(alice.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn transfer_to_unknown_recipient_fails() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    fund_wallet(&engine, alice.id, "50.00").await;

    let err = engine
        .execute(&wallet_intent(
            alice.id,
            TransactionCategory::Transfer,
            "10.00",
            Some("nobody@bank.test"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::RecipientNotFound));
    assert_eq!(wallet_balance(&engine, alice.id).await, dec("50.00"));
}

#[tokio::test]
async fn bank_transfer_moves_funds_between_accounts() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let bob = user(&engine, "bob@bank.test").await;
    let source = engine
        .create_account(alice.id, AccountType::Current)
        .await
        .unwrap();
    let target = engine
        .create_account(bob.id, AccountType::Savings)
        .await
        .unwrap();
    fund_account(&engine, alice.id, source.id, "100.00").await;

    let record = engine
        .execute(&bank_intent(
            alice.id,
            TransactionCategory::Transfer,
            "35.00",
            Some(&target.account_number),
            Some(source.id),
        ))
        .await
        .unwrap();

    assert_eq!(record.transaction_status, TransactionStatus::Completed);
    // recipient user is resolved only for wallet transfers
    assert_eq!(record.recipient, None);
    assert_eq!(account_balance(&engine, source.id).await, dec("65.00"));
    assert_eq!(account_balance(&engine, target.id).await, dec("35.00"));
}

#[tokio::test]
async fn self_transfer_is_always_rejected() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let account = engine
        .create_account(alice.id, AccountType::Savings)
        .await
        .unwrap();
    fund_account(&engine, alice.id, account.id, "80.00").await;

    let err = engine
        .execute(&bank_intent(
            alice.id,
            TransactionCategory::Transfer,
            "10.00",
            Some(&account.account_number),
            Some(account.id),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::SelfTransferNotAllowed));
    assert_eq!(account_balance(&engine, account.id).await, dec("80.00"));
}

#[tokio::test]
async fn bank_operations_require_a_source_account() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let bob = user(&engine, "bob@bank.test").await;
    let target = engine
        .create_account(bob.id, AccountType::Savings)
        .await
        .unwrap();

    for category in [
        TransactionCategory::Deposit,
        TransactionCategory::Withdrawal,
    ] {
        let err = engine
            .execute(&bank_intent(alice.id, category, "10.00", None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingSourceAccount));
    }

    let err = engine
        .execute(&bank_intent(
            alice.id,
            TransactionCategory::Transfer,
            "10.00",
            Some(&target.account_number),
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MissingSourceAccount));
}

#[tokio::test]
async fn foreign_account_is_unauthorized() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let bob = user(&engine, "bob@bank.test").await;
    let bobs_account = engine
        .create_account(bob.id, AccountType::Current)
        .await
        .unwrap();
    fund_account(&engine, bob.id, bobs_account.id, "100.00").await;

    let err = engine
        .execute(&bank_intent(
            alice.id,
            TransactionCategory::Withdrawal,
            "10.00",
            None,
            Some(bobs_account.id),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::UnauthorizedAccount));
    assert_eq!(account_balance(&engine, bobs_account.id).await, dec("100.00"));
}

#[tokio::test]
async fn bank_withdrawal_exceeding_balance_leaves_account_untouched() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let account = engine
        .create_account(alice.id, AccountType::Savings)
        .await
        .unwrap();
    fund_account(&engine, alice.id, account.id, "50.00").await;

    let err = engine
        .execute(&bank_intent(
            alice.id,
            TransactionCategory::Withdrawal,
            "75.00",
            None,
            Some(account.id),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds));
    assert_eq!(account_balance(&engine, account.id).await, dec("50.00"));

    let history = engine.transactions_by_sender(alice.id).await.unwrap();
    assert!(history
        .iter()
        .any(|record| record.transaction_status == TransactionStatus::Failed
            && record.amount == dec("75.00")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_withdrawals_never_overdraw() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    // covers exactly 30 of the 50 attempts
    fund_wallet(&engine, alice.id, "300.00").await;

    let attempts = (0..50).map(|_| {
        let engine = engine.clone();
        let sender = alice.id;
        tokio::spawn(async move {
            engine
                .execute(&wallet_intent(
                    sender,
                    TransactionCategory::Withdrawal,
                    "10.00",
                    None,
                ))
                .await
        })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let completed = outcomes.iter().filter(|res| res.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|res| matches!(res, Err(LedgerError::InsufficientFunds)))
        .count();
    assert_eq!(completed, 30);
    assert_eq!(rejected, 20);
    assert_eq!(wallet_balance(&engine, alice.id).await, dec("0.00"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn receipts_stay_unique_under_concurrent_generation() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;

    // 10,000 receipts drawn from a 100,000-code space forces plenty of
    // collisions through the regeneration path
    let deposits = (0..10_000).map(|_| {
        let engine = engine.clone();
        let sender = alice.id;
        tokio::spawn(async move {
            engine
                .execute(&wallet_intent(
                    sender,
                    TransactionCategory::Deposit,
                    "1.00",
                    None,
                ))
                .await
                .unwrap()
        })
    });
    let records: Vec<_> = join_all(deposits)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let receipts: HashSet<&str> = records.iter().map(|record| record.receipt.as_str()).collect();
    assert_eq!(receipts.len(), 10_000);
    assert!(receipts
        .iter()
        .all(|receipt| receipt.len() == 5 && receipt.chars().all(|c| c.is_ascii_digit())));
    assert_eq!(wallet_balance(&engine, alice.id).await, dec("10000.00"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn account_numbers_stay_unique_under_concurrent_creation() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;

    let creations = (0..10_000).map(|_| {
        let engine = engine.clone();
        let owner = alice.id;
        tokio::spawn(async move {
            engine
                .create_account(owner, AccountType::Savings)
                .await
                .unwrap()
        })
    });
    let accounts: Vec<_> = join_all(creations)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let numbers: HashSet<&str> = accounts
        .iter()
        .map(|account| account.account_number.as_str())
        .collect();
    assert_eq!(numbers.len(), 10_000);
    assert!(numbers
        .iter()
        .all(|number| number.len() == 10 && number.chars().all(|c| c.is_ascii_digit())));
}

#[tokio::test]
async fn new_accounts_start_empty_and_active() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let account = engine
        .create_account(alice.id, AccountType::Business)
        .await
        .unwrap();

    assert_eq!(account.balance, Decimal::ZERO);
    assert!(account.is_active);
    assert_eq!(account.account_type, AccountType::Business);

    let listed = engine.accounts_by_owner(alice.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].account_number, account.account_number);
}

#[tokio::test]
async fn receipt_lookup_is_a_pure_read() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;
    let bob = user(&engine, "bob@bank.test").await;
    fund_wallet(&engine, alice.id, "100.00").await;
    fund_wallet(&engine, bob.id, "10.00").await;

    let record = engine
        .execute(&wallet_intent(
            alice.id,
            TransactionCategory::Transfer,
            "40.00",
            Some("bob@bank.test"),
        ))
        .await
        .unwrap();

    let first = engine
        .transaction_by_receipt(&record.receipt)
        .await
        .unwrap()
        .unwrap();
    let second = engine
        .transaction_by_receipt(&record.receipt)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first, record);

    // reads recompute nothing
    assert_eq!(wallet_balance(&engine, alice.id).await, dec("60.00"));
    assert_eq!(wallet_balance(&engine, bob.id).await, dec("50.00"));
}

#[tokio::test]
async fn history_is_ordered_newest_first() {
    let engine = engine();
    let alice = user(&engine, "alice@bank.test").await;

    for amount in ["1.00", "2.00", "3.00"] {
        fund_wallet(&engine, alice.id, amount).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let history = engine.transactions_by_sender(alice.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].amount, dec("3.00"));
    assert_eq!(history[1].amount, dec("2.00"));
    assert_eq!(history[2].amount, dec("1.00"));
}
