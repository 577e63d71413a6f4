//! Ledger Store Contract
//!
//! The settlement engine talks to persistence exclusively through this
//! trait so the same state machine runs against PostgreSQL in production
//! and the in-memory books in tests/mock mode.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::{Currency, LedgerEntry, NewLedgerEntry, Reference, Wallet};

/// Store-level errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Ledger entry not found: {0}")]
    EntryNotFound(Reference),

    /// Debit guard tripped inside the settlement transaction. The entry
    /// has been transitioned to `failed`; the wallet is untouched.
    #[error("Insufficient stable balance")]
    InsufficientBalance,

    /// Serialization failure / deadlock. The settlement is retryable
    /// from scratch; nothing was committed.
    #[error("Concurrent settlement conflict, retry")]
    Conflict,

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Terminal outcome requested for a ledger entry
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// Apply the entry's wallet delta and mark it settled
    Settled,
    /// Mark the entry failed; the wallet is never touched
    Failed { reason: String },
}

/// Result of an atomic settlement attempt
#[derive(Debug, Clone)]
pub struct SettleResult {
    pub entry: LedgerEntry,
    /// Wallet row as of the end of the settlement transaction
    pub wallet: Wallet,
    /// True when the entry was already terminal and nothing was applied.
    /// Replays resolve here; they are successes, not errors.
    pub already_final: bool,
}

/// Persistence contract for wallets and the append-mostly ledger.
///
/// Implementations must guarantee:
/// - `insert_entry` is idempotent on `reference` (unique index backstop);
/// - `settle` is a single all-or-nothing unit: terminal re-check under
///   lock, status write and wallet mutation commit together or not at all;
/// - a settled entry is never re-applied, regardless of caller behavior.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch the user's wallet, creating it on first access
    async fn get_or_create_wallet(
        &self,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Wallet, StoreError>;

    /// Fetch the user's wallet without creating one
    async fn wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    /// Insert a new entry in `initiated`.
    ///
    /// If an entry with the same reference already exists, the existing
    /// entry is returned unchanged (idempotent create).
    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Look up an entry by its reference
    async fn entry_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// CAS transition `initiated` -> `pending`.
    ///
    /// Returns false when the entry was not in `initiated` (already
    /// pending, or terminal) - callers treat that as benign.
    async fn mark_pending(&self, reference: &Reference) -> Result<bool, StoreError>;

    /// The atomic settlement transaction.
    ///
    /// Locks the entry, re-checks terminality, writes the terminal
    /// status, and (for `Settled`) applies the wallet delta - all in one
    /// unit. Debits re-check the balance under the lock and surface
    /// `InsufficientBalance` after failing the entry.
    async fn settle(
        &self,
        reference: &Reference,
        outcome: SettleOutcome,
    ) -> Result<SettleResult, StoreError>;

    /// Newest-first ledger history for a wallet
    async fn entries_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}
