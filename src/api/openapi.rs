//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use super::types::{
    ContributeRequest, DepositData, DepositRequest, EntryData, FinalizeRequest, HealthResponse,
    RefundRequest, WalletData, WithdrawRequest,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Coopwise Wallet API",
        version = "0.1.0",
        description = "Wallet & ledger settlement engine for the Coopwise savings cooperative.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::api::handlers::initiate_deposit,
        crate::api::handlers::finalize_deposit,
        crate::api::handlers::mark_paid,
        crate::api::handlers::cancel_deposit,
        crate::api::handlers::withdraw,
        crate::api::handlers::contribute,
        crate::api::handlers::refund,
        crate::api::handlers::get_wallet,
        crate::api::handlers::get_ledger,
        crate::api::handlers::gateway_webhook,
        crate::api::handlers::health_check,
    ),
    components(
        schemas(
            DepositRequest,
            FinalizeRequest,
            WithdrawRequest,
            ContributeRequest,
            RefundRequest,
            DepositData,
            EntryData,
            WalletData,
            HealthResponse,
        )
    ),
    tags(
        (name = "Wallet", description = "Deposits, withdrawals, contributions and refunds"),
        (name = "Webhooks", description = "Inbound gateway notifications"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
