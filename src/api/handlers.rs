//! Wallet endpoint handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::ledger::models::{Currency, PaymentRail};
use crate::rails::WebhookPayload;
use crate::settlement::{SettlementEngine, SettlementError};

use super::types::{
    ApiResponse, ContributeRequest, DepositData, DepositRequest, EntryData, FinalizeRequest,
    HealthResponse, HistoryQuery, RefundRequest, WalletData, WalletQuery, WithdrawRequest,
};

/// Default and maximum page sizes for ledger history
const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

/// Header names rails use for webhook signatures
const SIGNATURE_HEADERS: &[&str] = &["verif-hash", "x-webhook-signature"];

pub struct AppState {
    pub engine: SettlementEngine,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, SettlementError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Start a deposit
///
/// POST /api/v1/wallet/deposit/initiate
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposit/initiate",
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Deposit initiated", body = ApiResponse<DepositData>),
        (status = 400, description = "Invalid amount, currency or gateway"),
        (status = 503, description = "Rate service or gateway unavailable")
    ),
    tag = "Wallet"
)]
pub async fn initiate_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<DepositData> {
    let initiation = state
        .engine
        .initiate_deposit(req.user_id, req.amount, req.currency, req.gateway)
        .await?;
    ok(initiation.into())
}

/// Finalize a deposit by asking its rail
///
/// POST /api/v1/wallet/deposit/finalize
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposit/finalize",
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Current entry state after reconciliation", body = ApiResponse<EntryData>),
        (status = 404, description = "Unknown reference"),
        (status = 422, description = "Settlement could not be applied")
    ),
    tag = "Wallet"
)]
pub async fn finalize_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<EntryData> {
    let entry = state.engine.finalize(req.reference).await?;
    ok(entry.into())
}

/// Record payer proof-of-payment (cash-agent flow)
///
/// POST /api/v1/wallet/deposit/mark-paid
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposit/mark-paid",
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Proof forwarded to the rail", body = ApiResponse<EntryData>),
        (status = 404, description = "Unknown reference"),
        (status = 422, description = "Entry already terminal")
    ),
    tag = "Wallet"
)]
pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<EntryData> {
    let entry = state.engine.mark_paid(req.reference).await?;
    ok(entry.into())
}

/// Cancel an open deposit
///
/// POST /api/v1/wallet/deposit/cancel
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposit/cancel",
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Deposit cancelled", body = ApiResponse<EntryData>),
        (status = 404, description = "Unknown reference"),
        (status = 422, description = "Entry already terminal or not a deposit")
    ),
    tag = "Wallet"
)]
pub async fn cancel_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<EntryData> {
    let entry = state.engine.cancel_deposit(req.reference).await?;
    ok(entry.into())
}

/// Withdraw through a payout rail
///
/// POST /api/v1/wallet/withdraw
#[utoipa::path(
    post,
    path = "/api/v1/wallet/withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Withdrawal settled", body = ApiResponse<EntryData>),
        (status = 404, description = "No wallet for user"),
        (status = 422, description = "Insufficient balance or payout declined")
    ),
    tag = "Wallet"
)]
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<EntryData> {
    let entry = state
        .engine
        .withdraw(req.user_id, req.amount, req.currency, req.gateway)
        .await?;
    ok(entry.into())
}

/// Contribute stable funds towards a group pledge
///
/// POST /api/v1/wallet/contribute
#[utoipa::path(
    post,
    path = "/api/v1/wallet/contribute",
    request_body = ContributeRequest,
    responses(
        (status = 200, description = "Contribution settled", body = ApiResponse<EntryData>),
        (status = 404, description = "No wallet for user"),
        (status = 422, description = "Insufficient balance")
    ),
    tag = "Wallet"
)]
pub async fn contribute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContributeRequest>,
) -> ApiResult<EntryData> {
    let entry = state
        .engine
        .contribute(req.user_id, req.stable_amount, req.contribution_id)
        .await?;
    ok(entry.into())
}

/// Reverse a settled debit
///
/// POST /api/v1/wallet/refund
#[utoipa::path(
    post,
    path = "/api/v1/wallet/refund",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Compensating credit settled", body = ApiResponse<EntryData>),
        (status = 404, description = "Unknown reference"),
        (status = 422, description = "Entry is not a settled debit")
    ),
    tag = "Wallet"
)]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefundRequest>,
) -> ApiResult<EntryData> {
    let entry = state.engine.refund(req.reference).await?;
    ok(entry.into())
}

/// Get the user's wallet (created lazily on first access)
///
/// GET /api/v1/wallet/{user_id}?currency=NGN
#[utoipa::path(
    get,
    path = "/api/v1/wallet/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "Wallet owner"),
        ("currency" = Option<String>, Query, description = "Display currency for first-touch creation, default NGN")
    ),
    responses(
        (status = 200, description = "Wallet snapshot", body = ApiResponse<WalletData>)
    ),
    tag = "Wallet"
)]
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<WalletData> {
    let currency = query.currency.unwrap_or(Currency::NGN);
    let snapshot = state.engine.wallet_snapshot(user_id, currency).await?;
    ok(snapshot.into())
}

/// Get the user's ledger history, newest first
///
/// GET /api/v1/wallet/{user_id}/ledger?limit=50
#[utoipa::path(
    get,
    path = "/api/v1/wallet/{user_id}/ledger",
    params(
        ("user_id" = Uuid, Path, description = "Wallet owner"),
        ("limit" = Option<i64>, Query, description = "Page size, default 50, max 500")
    ),
    responses(
        (status = 200, description = "Ledger entries", body = ApiResponse<Vec<EntryData>>),
        (status = 404, description = "No wallet for user")
    ),
    tag = "Wallet"
)]
pub async fn get_ledger(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<EntryData>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let entries = state.engine.ledger_history(user_id, limit).await?;
    ok(entries.into_iter().map(EntryData::from).collect())
}

/// Gateway webhook intake
///
/// POST /api/v1/wallet/webhooks/{gateway}
///
/// The raw body is handed to the rail adapter untouched; the adapter
/// authenticates it before anything is read out of it.
#[utoipa::path(
    post,
    path = "/api/v1/wallet/webhooks/{gateway}",
    params(
        ("gateway" = String, Path, description = "Rail code: mock, card, cash_agent, on_chain")
    ),
    request_body(content = String, content_type = "application/json", description = "Raw rail payload, verified by the adapter"),
    responses(
        (status = 200, description = "Entry reconciled", body = ApiResponse<EntryData>),
        (status = 400, description = "Unknown gateway or malformed body"),
        (status = 401, description = "Signature or source check failed")
    ),
    tag = "Webhooks"
)]
pub async fn gateway_webhook(
    State(state): State<Arc<AppState>>,
    Path(gateway): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<EntryData> {
    let rail = PaymentRail::from_code(&gateway)
        .ok_or_else(|| SettlementError::UnsupportedGateway(gateway.clone()))?;

    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok());

    let entry = state
        .engine
        .webhook_reconcile(
            rail,
            &WebhookPayload {
                body: &body,
                signature,
                source_ip: Some(peer.ip()),
            },
        )
        .await?;
    ok(entry.into())
}

/// Health check
///
/// GET /api/v1/health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
