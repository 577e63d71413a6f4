//! # Coopwise Wallet
//!
//! Wallet & ledger settlement engine for the Coopwise savings
//! cooperative. Members hold stable-unit wallets; every deposit,
//! withdrawal, contribution and refund is an append-only ledger entry
//! driven through a settlement state machine, with payment rails plugged
//! in behind adapters.
//!
//! ## Architecture
//!
//! - [`ledger`]: wallets, ledger entries, and the `LedgerStore` contract
//!   (PostgreSQL in production, in-memory for dev and tests)
//! - [`settlement`]: the engine orchestrating initiation, verification
//!   and the atomic, exactly-once settlement transaction
//! - [`rails`]: payment rail adapters (card, cash-agent, on-chain, mock)
//! - [`rates`]: exchange-rate providers with TTL caching
//! - [`api`]: axum HTTP surface with OpenAPI docs

pub mod api;
pub mod cache;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod notify;
pub mod rails;
pub mod rates;
pub mod settlement;

pub use config::AppConfig;
pub use settlement::{SettlementEngine, SettlementError};
