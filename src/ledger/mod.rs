//! Wallet & Ledger Persistence
//!
//! Core types, the `LedgerStore` contract, and its two backends.

pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

pub use memory::MemoryLedgerStore;
pub use models::{
    Currency, EntryType, LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentRail, Reference, Wallet,
    WalletSnapshot,
};
pub use pg::PgLedgerStore;
pub use store::{LedgerStore, SettleOutcome, SettleResult, StoreError};
