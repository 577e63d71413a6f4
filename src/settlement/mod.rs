//! Settlement Orchestration
//!
//! The engine driving ledger entries through the settlement state
//! machine, plus the module's error surface.

pub mod engine;
pub mod error;

pub use engine::{DepositInitiation, SettlementEngine};
pub use error::SettlementError;
