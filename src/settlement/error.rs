//! Settlement Error Types
//!
//! One error surface for every settlement operation, with string codes
//! and HTTP status suggestions for the API layer.

use thiserror::Error;

use crate::ledger::store::StoreError;
use crate::money::MoneyError;
use crate::rails::{RailError, RailErrorKind};
use crate::rates::RateError;

#[derive(Error, Debug)]
pub enum SettlementError {
    // === Validation ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Unsupported gateway: {0}")]
    UnsupportedGateway(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unauthorized")]
    Unauthorized,

    // === Funds / state ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent settlement conflict")]
    Conflict,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // === Upstream ===
    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("Gateway declined: {0}")]
    GatewayDeclined(String),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    // === System ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SettlementError {
    /// Error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::InvalidAmount(_) => "INVALID_AMOUNT",
            SettlementError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            SettlementError::UnsupportedGateway(_) => "UNSUPPORTED_GATEWAY",
            SettlementError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            SettlementError::Unauthorized => "UNAUTHORIZED",
            SettlementError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            SettlementError::NotFound(_) => "NOT_FOUND",
            SettlementError::Conflict => "CONFLICT",
            SettlementError::InvalidState(_) => "INVALID_STATE",
            SettlementError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            SettlementError::GatewayDeclined(_) => "GATEWAY_DECLINED",
            SettlementError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            SettlementError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            SettlementError::InvalidAmount(_)
            | SettlementError::UnsupportedCurrency(_)
            | SettlementError::UnsupportedGateway(_)
            | SettlementError::MalformedPayload(_) => 400,
            SettlementError::Unauthorized => 401,
            SettlementError::NotFound(_) => 404,
            SettlementError::Conflict => 409,
            SettlementError::InsufficientBalance
            | SettlementError::GatewayDeclined(_)
            | SettlementError::InvalidState(_) => 422,
            SettlementError::GatewayUnavailable(_) | SettlementError::RateUnavailable(_) => 503,
            SettlementError::Storage(_) => 500,
        }
    }
}

impl From<MoneyError> for SettlementError {
    fn from(e: MoneyError) -> Self {
        SettlementError::InvalidAmount(e.to_string())
    }
}

impl From<StoreError> for SettlementError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::WalletNotFound(id) => SettlementError::NotFound(format!("wallet {id}")),
            StoreError::EntryNotFound(r) => SettlementError::NotFound(format!("entry {r}")),
            StoreError::InsufficientBalance => SettlementError::InsufficientBalance,
            StoreError::Conflict => SettlementError::Conflict,
            StoreError::Corrupt(msg) | StoreError::Database(msg) => SettlementError::Storage(msg),
        }
    }
}

impl From<RailError> for SettlementError {
    fn from(e: RailError) -> Self {
        match e.kind {
            RailErrorKind::Transport(msg) => {
                SettlementError::GatewayUnavailable(format!("{}: {msg}", e.rail))
            }
            RailErrorKind::Declined(msg) => {
                SettlementError::GatewayDeclined(format!("{}: {msg}", e.rail))
            }
            RailErrorKind::Unauthorized => SettlementError::Unauthorized,
            RailErrorKind::Malformed(msg) => {
                SettlementError::MalformedPayload(format!("{}: {msg}", e.rail))
            }
            RailErrorKind::Unsupported(op) => {
                SettlementError::UnsupportedGateway(format!("{} does not offer {op}", e.rail))
            }
        }
    }
}

impl From<RateError> for SettlementError {
    fn from(e: RateError) -> Self {
        SettlementError::RateUnavailable(e.to_string())
    }
}
