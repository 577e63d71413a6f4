//! API Response types and error codes
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `error_codes`: standard error code constants
//! - Request/response DTOs for the wallet endpoints

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::ledger::models::{
    Currency, EntryType, LedgerEntry, PaymentRail, Reference, WalletSnapshot,
};
use crate::settlement::{DepositInitiation, SettlementError};

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Validation errors (1xxx)
    pub const INVALID_AMOUNT: i32 = 1001;
    pub const UNSUPPORTED_CURRENCY: i32 = 1002;
    pub const UNSUPPORTED_GATEWAY: i32 = 1003;
    pub const MALFORMED_PAYLOAD: i32 = 1004;

    // Auth errors (2xxx)
    pub const UNAUTHORIZED: i32 = 2001;

    // Funds / state errors (3xxx)
    pub const INSUFFICIENT_BALANCE: i32 = 3001;
    pub const INVALID_STATE: i32 = 3002;
    pub const CONFLICT: i32 = 3003;
    pub const GATEWAY_DECLINED: i32 = 3004;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;

    // Server errors (5xxx)
    pub const STORAGE_ERROR: i32 = 5000;
    pub const RATE_UNAVAILABLE: i32 = 5001;
    pub const GATEWAY_UNAVAILABLE: i32 = 5002;
}

fn error_code(err: &SettlementError) -> i32 {
    match err {
        SettlementError::InvalidAmount(_) => error_codes::INVALID_AMOUNT,
        SettlementError::UnsupportedCurrency(_) => error_codes::UNSUPPORTED_CURRENCY,
        SettlementError::UnsupportedGateway(_) => error_codes::UNSUPPORTED_GATEWAY,
        SettlementError::MalformedPayload(_) => error_codes::MALFORMED_PAYLOAD,
        SettlementError::Unauthorized => error_codes::UNAUTHORIZED,
        SettlementError::InsufficientBalance => error_codes::INSUFFICIENT_BALANCE,
        SettlementError::InvalidState(_) => error_codes::INVALID_STATE,
        SettlementError::Conflict => error_codes::CONFLICT,
        SettlementError::GatewayDeclined(_) => error_codes::GATEWAY_DECLINED,
        SettlementError::NotFound(_) => error_codes::NOT_FOUND,
        SettlementError::Storage(_) => error_codes::STORAGE_ERROR,
        SettlementError::RateUnavailable(_) => error_codes::RATE_UNAVAILABLE,
        SettlementError::GatewayUnavailable(_) => error_codes::GATEWAY_UNAVAILABLE,
    }
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiResponse::<()>::error(error_code(&self), self.to_string());
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub user_id: Uuid,
    /// Local-currency amount, max 2 decimal places
    #[schema(value_type = String, example = "15000.00")]
    pub amount: Decimal,
    pub currency: Currency,
    pub gateway: PaymentRail,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinalizeRequest {
    #[schema(value_type = String)]
    pub reference: Reference,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    pub user_id: Uuid,
    #[schema(value_type = String, example = "8000.00")]
    pub amount: Decimal,
    pub currency: Currency,
    /// Payout rail; defaults to the cash-agent network
    pub gateway: Option<PaymentRail>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContributeRequest {
    pub user_id: Uuid,
    /// Stable-unit amount, max 8 decimal places
    #[schema(value_type = String, example = "4.00000000")]
    pub stable_amount: Decimal,
    pub contribution_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Reference of the settled debit to reverse
    #[schema(value_type = String)]
    pub reference: Reference,
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub currency: Option<Currency>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Ledger entry as returned by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct EntryData {
    #[schema(value_type = String)]
    pub reference: Reference,
    pub entry_type: EntryType,
    #[schema(value_type = String, example = "15000.00")]
    pub local_amount: Decimal,
    pub local_currency: Currency,
    #[schema(value_type = String, example = "9.37500000")]
    pub stable_amount: Decimal,
    #[schema(value_type = String, example = "0.000625")]
    pub exchange_rate: Decimal,
    pub gateway: PaymentRail,
    #[schema(value_type = String, example = "settled")]
    pub status: String,
    pub external_id: Option<String>,
    pub contribution_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LedgerEntry> for EntryData {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            reference: entry.reference,
            entry_type: entry.entry_type,
            local_amount: entry.local_amount,
            local_currency: entry.local_currency,
            stable_amount: entry.stable_amount,
            exchange_rate: entry.exchange_rate,
            gateway: entry.gateway,
            status: entry.status.as_str().to_string(),
            external_id: entry.external_id,
            contribution_id: entry.contribution_id,
            note: entry.note,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

/// Deposit initiation result
#[derive(Debug, Serialize, ToSchema)]
pub struct DepositData {
    pub entry: EntryData,
    /// Rail-specific payer instructions (checkout link, agent details,
    /// deposit address)
    #[schema(value_type = Object)]
    pub instructions: Option<Value>,
}

impl From<DepositInitiation> for DepositData {
    fn from(initiation: DepositInitiation) -> Self {
        Self {
            entry: initiation.entry.into(),
            instructions: initiation.instructions,
        }
    }
}

/// Wallet view
#[derive(Debug, Serialize, ToSchema)]
pub struct WalletData {
    pub user_id: Uuid,
    #[schema(value_type = String, example = "9.37500000")]
    pub balance: Decimal,
    pub currency: Currency,
    pub as_of: DateTime<Utc>,
}

impl From<WalletSnapshot> for WalletData {
    fn from(snapshot: WalletSnapshot) -> Self {
        Self {
            user_id: snapshot.user_id,
            balance: snapshot.balance,
            currency: snapshot.currency,
            as_of: snapshot.as_of,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "0.1.0")]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_wrapper_shape() {
        let response = ApiResponse::success(42);
        assert_eq!(response.code, error_codes::SUCCESS);
        assert_eq!(response.msg, "ok");
        assert_eq!(response.data, Some(42));
    }

    #[test]
    fn test_error_wrapper_omits_data() {
        let response = ApiResponse::<()>::error(error_codes::NOT_FOUND, "missing");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], 4001);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            error_code(&SettlementError::InsufficientBalance),
            error_codes::INSUFFICIENT_BALANCE
        );
        assert_eq!(
            error_code(&SettlementError::Unauthorized),
            error_codes::UNAUTHORIZED
        );
        assert_eq!(
            error_code(&SettlementError::Storage("io".into())),
            error_codes::STORAGE_ERROR
        );
    }
}
