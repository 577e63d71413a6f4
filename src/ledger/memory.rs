//! In-Memory Ledger Store
//!
//! Mutex-guarded books implementing the same settlement contract as the
//! PostgreSQL store. Backs the mock deployment mode and the engine tests;
//! one lock around the whole books keeps every operation atomic.

use std::collections::HashMap;

use chrono::Utc;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{Currency, LedgerEntry, LedgerStatus, NewLedgerEntry, Reference, Wallet};
use super::store::{LedgerStore, SettleOutcome, SettleResult, StoreError};

#[derive(Default)]
struct Books {
    wallets: HashMap<Uuid, Wallet>,
    wallet_by_user: HashMap<Uuid, Uuid>,
    entries: HashMap<Reference, LedgerEntry>,
}

/// In-memory wallet/ledger books
#[derive(Default)]
pub struct MemoryLedgerStore {
    books: Mutex<Books>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_or_create_wallet(
        &self,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Wallet, StoreError> {
        let mut books = self.books.lock().await;
        if let Some(wallet_id) = books.wallet_by_user.get(&user_id) {
            let wallet_id = *wallet_id;
            return books
                .wallets
                .get(&wallet_id)
                .cloned()
                .ok_or(StoreError::WalletNotFound(wallet_id));
        }

        let now = Utc::now();
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            stable_balance: rust_decimal::Decimal::ZERO,
            local_currency: currency,
            created_at: now,
            updated_at: now,
        };
        books.wallet_by_user.insert(user_id, wallet.id);
        books.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let books = self.books.lock().await;
        Ok(books
            .wallet_by_user
            .get(&user_id)
            .and_then(|id| books.wallets.get(id))
            .cloned())
    }

    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let mut books = self.books.lock().await;
        if let Some(existing) = books.entries.get(&entry.reference) {
            return Ok(existing.clone());
        }
        if !books.wallets.contains_key(&entry.wallet_id) {
            return Err(StoreError::WalletNotFound(entry.wallet_id));
        }

        let now = Utc::now();
        let record = LedgerEntry {
            id: Uuid::new_v4(),
            wallet_id: entry.wallet_id,
            reference: entry.reference,
            entry_type: entry.entry_type,
            local_amount: entry.local_amount,
            local_currency: entry.local_currency,
            stable_amount: entry.stable_amount,
            exchange_rate: entry.exchange_rate,
            gateway: entry.gateway,
            status: LedgerStatus::Initiated,
            external_id: entry.external_id,
            contribution_id: entry.contribution_id,
            note: entry.note,
            created_at: now,
            updated_at: now,
        };
        books.entries.insert(record.reference, record.clone());
        Ok(record)
    }

    async fn entry_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let books = self.books.lock().await;
        Ok(books.entries.get(reference).cloned())
    }

    async fn mark_pending(&self, reference: &Reference) -> Result<bool, StoreError> {
        let mut books = self.books.lock().await;
        let entry = books
            .entries
            .get_mut(reference)
            .ok_or(StoreError::EntryNotFound(*reference))?;
        if entry.status != LedgerStatus::Initiated {
            return Ok(false);
        }
        entry.status = LedgerStatus::Pending;
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn settle(
        &self,
        reference: &Reference,
        outcome: SettleOutcome,
    ) -> Result<SettleResult, StoreError> {
        let mut books = self.books.lock().await;
        let entry = books
            .entries
            .get(reference)
            .cloned()
            .ok_or(StoreError::EntryNotFound(*reference))?;

        // Terminal re-check under the lock: replays are no-ops
        if entry.status.is_terminal() {
            let wallet = books
                .wallets
                .get(&entry.wallet_id)
                .cloned()
                .ok_or(StoreError::WalletNotFound(entry.wallet_id))?;
            return Ok(SettleResult {
                entry,
                wallet,
                already_final: true,
            });
        }

        let now = Utc::now();
        match outcome {
            SettleOutcome::Settled => {
                let delta = entry.wallet_delta();
                let wallet = books
                    .wallets
                    .get_mut(&entry.wallet_id)
                    .ok_or(StoreError::WalletNotFound(entry.wallet_id))?;

                if delta < rust_decimal::Decimal::ZERO && wallet.stable_balance < -delta {
                    // Debit guard: fail the entry, leave the wallet alone
                    let stored = books
                        .entries
                        .get_mut(reference)
                        .ok_or(StoreError::EntryNotFound(*reference))?;
                    stored.status = LedgerStatus::Failed;
                    stored.note = Some("insufficient balance at settlement".to_string());
                    stored.updated_at = now;
                    return Err(StoreError::InsufficientBalance);
                }

                wallet.stable_balance += delta;
                wallet.updated_at = now;
                let wallet = wallet.clone();

                let stored = books
                    .entries
                    .get_mut(reference)
                    .ok_or(StoreError::EntryNotFound(*reference))?;
                stored.status = LedgerStatus::Settled;
                stored.updated_at = now;
                let entry = stored.clone();

                Ok(SettleResult {
                    entry,
                    wallet,
                    already_final: false,
                })
            }
            SettleOutcome::Failed { reason } => {
                let stored = books
                    .entries
                    .get_mut(reference)
                    .ok_or(StoreError::EntryNotFound(*reference))?;
                stored.status = LedgerStatus::Failed;
                stored.note = Some(reason);
                stored.updated_at = now;
                let entry = stored.clone();

                let wallet = books
                    .wallets
                    .get(&entry.wallet_id)
                    .cloned()
                    .ok_or(StoreError::WalletNotFound(entry.wallet_id))?;
                Ok(SettleResult {
                    entry,
                    wallet,
                    already_final: false,
                })
            }
        }
    }

    async fn entries_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let books = self.books.lock().await;
        let mut entries: Vec<LedgerEntry> = books
            .entries
            .values()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::EntryType;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn credit(wallet_id: Uuid, stable: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            wallet_id,
            reference: Reference::new(),
            entry_type: EntryType::Deposit,
            local_amount: dec("15000"),
            local_currency: Currency::NGN,
            stable_amount: dec(stable),
            exchange_rate: Decimal::ONE / dec("1600"),
            gateway: crate::ledger::models::PaymentRail::Mock,
            external_id: None,
            contribution_id: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_wallet_create_is_idempotent() {
        let store = MemoryLedgerStore::new();
        let user = Uuid::new_v4();
        let w1 = store.get_or_create_wallet(user, Currency::NGN).await.unwrap();
        let w2 = store.get_or_create_wallet(user, Currency::NGN).await.unwrap();
        assert_eq!(w1.id, w2.id);
        assert_eq!(w1.stable_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_insert_idempotent_on_reference() {
        let store = MemoryLedgerStore::new();
        let wallet = store
            .get_or_create_wallet(Uuid::new_v4(), Currency::NGN)
            .await
            .unwrap();

        let new_entry = credit(wallet.id, "9.375");
        let first = store.insert_entry(new_entry.clone()).await.unwrap();
        let second = store.insert_entry(new_entry).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, LedgerStatus::Initiated);
    }

    #[tokio::test]
    async fn test_settle_credit_applies_once() {
        let store = MemoryLedgerStore::new();
        let wallet = store
            .get_or_create_wallet(Uuid::new_v4(), Currency::NGN)
            .await
            .unwrap();
        let entry = store.insert_entry(credit(wallet.id, "9.375")).await.unwrap();

        let first = store
            .settle(&entry.reference, SettleOutcome::Settled)
            .await
            .unwrap();
        assert!(!first.already_final);
        assert_eq!(first.wallet.stable_balance, dec("9.375"));
        assert_eq!(first.entry.status, LedgerStatus::Settled);

        // Replay: terminal short-circuit, no double credit
        let replay = store
            .settle(&entry.reference, SettleOutcome::Settled)
            .await
            .unwrap();
        assert!(replay.already_final);
        assert_eq!(replay.wallet.stable_balance, dec("9.375"));
    }

    #[tokio::test]
    async fn test_settled_entry_cannot_be_failed() {
        let store = MemoryLedgerStore::new();
        let wallet = store
            .get_or_create_wallet(Uuid::new_v4(), Currency::NGN)
            .await
            .unwrap();
        let entry = store.insert_entry(credit(wallet.id, "5")).await.unwrap();
        store
            .settle(&entry.reference, SettleOutcome::Settled)
            .await
            .unwrap();

        let late_fail = store
            .settle(
                &entry.reference,
                SettleOutcome::Failed {
                    reason: "late webhook".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(late_fail.already_final);
        assert_eq!(late_fail.entry.status, LedgerStatus::Settled);
        assert_eq!(late_fail.wallet.stable_balance, dec("5"));
    }

    #[tokio::test]
    async fn test_debit_guard_fails_entry() {
        let store = MemoryLedgerStore::new();
        let wallet = store
            .get_or_create_wallet(Uuid::new_v4(), Currency::NGN)
            .await
            .unwrap();

        let mut debit = credit(wallet.id, "100");
        debit.entry_type = EntryType::Withdrawal;
        let entry = store.insert_entry(debit).await.unwrap();

        let err = store
            .settle(&entry.reference, SettleOutcome::Settled)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientBalance));

        let stored = store
            .entry_by_reference(&entry.reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, LedgerStatus::Failed);

        let wallet = store.wallet_by_user(wallet.user_id).await.unwrap().unwrap();
        assert_eq!(wallet.stable_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_mark_pending_cas() {
        let store = MemoryLedgerStore::new();
        let wallet = store
            .get_or_create_wallet(Uuid::new_v4(), Currency::NGN)
            .await
            .unwrap();
        let entry = store.insert_entry(credit(wallet.id, "1")).await.unwrap();

        assert!(store.mark_pending(&entry.reference).await.unwrap());
        assert!(!store.mark_pending(&entry.reference).await.unwrap());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = MemoryLedgerStore::new();
        let wallet = store
            .get_or_create_wallet(Uuid::new_v4(), Currency::NGN)
            .await
            .unwrap();
        for _ in 0..3 {
            store.insert_entry(credit(wallet.id, "1")).await.unwrap();
        }
        let entries = store.entries_for_wallet(wallet.id, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].created_at >= entries[1].created_at);
    }
}
