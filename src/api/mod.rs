//! HTTP API
//!
//! Axum router over the settlement engine, plus Swagger UI.

pub mod handlers;
pub mod openapi;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::settlement::SettlementEngine;

pub use handlers::AppState;
pub use types::{ApiResponse, error_codes};

/// Build the application router
pub fn router(engine: SettlementEngine) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .route(
            "/api/v1/wallet/deposit/initiate",
            post(handlers::initiate_deposit),
        )
        .route(
            "/api/v1/wallet/deposit/finalize",
            post(handlers::finalize_deposit),
        )
        .route("/api/v1/wallet/deposit/mark-paid", post(handlers::mark_paid))
        .route(
            "/api/v1/wallet/deposit/cancel",
            post(handlers::cancel_deposit),
        )
        .route("/api/v1/wallet/withdraw", post(handlers::withdraw))
        .route("/api/v1/wallet/contribute", post(handlers::contribute))
        .route("/api/v1/wallet/refund", post(handlers::refund))
        .route("/api/v1/wallet/{user_id}", get(handlers::get_wallet))
        .route("/api/v1/wallet/{user_id}/ledger", get(handlers::get_ledger))
        .route(
            "/api/v1/wallet/webhooks/{gateway}",
            post(handlers::gateway_webhook),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .with_state(state)
}

/// Bind and serve until shutdown
pub async fn serve(engine: SettlementEngine, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("wallet api listening on {addr}");
    // ConnectInfo feeds webhook source-ip checks
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
