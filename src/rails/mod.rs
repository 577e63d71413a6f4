//! Payment Rail Adapters
//!
//! Each external payment rail (card processor, cash-agent network,
//! on-chain, mock) plugs in behind the `RailAdapter` trait. Adapters
//! translate rail-native wire formats into a small normalized surface;
//! the settlement engine never sees rail-specific payloads.

pub mod agent;
pub mod card;
pub mod chain;
pub mod mock;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::models::{Currency, EntryType, PaymentRail, Reference};

pub use agent::CashAgentRail;
pub use card::CardRail;
pub use chain::OnChainRail;
pub use mock::MockRail;

/// Shared HTTP client for all rail adapters
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
});

/// Failure classes a rail operation can surface
#[derive(Debug, Error)]
pub enum RailErrorKind {
    /// Network/5xx failure: the rail may be fine, retry later
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The rail processed the request and said no
    #[error("Declined: {0}")]
    Declined(String),

    /// Signature or source check failed on an inbound webhook
    #[error("Unauthorized webhook")]
    Unauthorized,

    /// Response or webhook body did not parse
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Operation not offered by this rail
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Rail operation error, tagged with the rail it came from
#[derive(Debug, Error)]
#[error("[{rail}] {kind}")]
pub struct RailError {
    pub rail: PaymentRail,
    pub kind: RailErrorKind,
}

impl RailError {
    pub fn new(rail: PaymentRail, kind: RailErrorKind) -> Self {
        Self { rail, kind }
    }

    pub fn transport(rail: PaymentRail, msg: impl Into<String>) -> Self {
        Self::new(rail, RailErrorKind::Transport(msg.into()))
    }

    pub fn declined(rail: PaymentRail, msg: impl Into<String>) -> Self {
        Self::new(rail, RailErrorKind::Declined(msg.into()))
    }

    pub fn malformed(rail: PaymentRail, msg: impl Into<String>) -> Self {
        Self::new(rail, RailErrorKind::Malformed(msg.into()))
    }

    /// Only transport failures are safe to retry; a decline is an answer
    pub fn retryable(&self) -> bool {
        matches!(self.kind, RailErrorKind::Transport(_))
    }
}

/// Quote request handed to a rail before initiation
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub entry_type: EntryType,
    pub local_amount: Decimal,
    pub currency: Currency,
}

/// Rail-side quote. A rail that prices the conversion itself returns its
/// executable rate here, which takes precedence over the generic
/// provider rate on the ledger entry.
#[derive(Debug, Clone, Default)]
pub struct RailQuote {
    /// Rate local currency -> stable unit, if the rail prices it
    pub rate: Option<Decimal>,
    /// Rail-side quote handle to pass back at initiation
    pub quote_id: Option<String>,
}

/// Initiation request for an external transaction
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub reference: Reference,
    pub user_id: Uuid,
    pub entry_type: EntryType,
    pub local_amount: Decimal,
    pub currency: Currency,
    pub stable_amount: Decimal,
    pub quote_id: Option<String>,
}

/// How far the rail got at initiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiateStatus {
    /// Transaction accepted, completion will be signalled asynchronously
    Accepted,
    /// Accepted but the rail is waiting on its own upstream
    Pending,
    /// The payer must act before the rail will move money (e.g. the
    /// agent has to be paid in cash and the deposit marked as paid)
    RequiresProof,
}

/// Initiation acknowledgement
#[derive(Debug, Clone)]
pub struct InitiateAck {
    /// Rail-native transaction id, when the rail assigns one up front
    pub external_id: Option<String>,
    pub status: InitiateStatus,
    /// Rail-specific payer instructions passed through to the client
    pub instructions: Option<serde_json::Value>,
}

/// Lookup key for verifying an external transaction
#[derive(Debug, Clone)]
pub struct VerifyProbe {
    pub reference: Reference,
    pub external_id: Option<String>,
}

/// Normalized verification result
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// The rail confirms the money moved
    Success {
        /// Amount the rail reports it settled, in local currency, when
        /// it reports one
        settled_amount: Option<Decimal>,
    },
    /// Not finished yet; ask again later
    Pending,
    /// The rail gives a definitive no
    Failed { reason: String },
}

/// Raw inbound webhook, untrusted until the adapter authenticates it
#[derive(Debug, Clone)]
pub struct WebhookPayload<'a> {
    pub body: &'a [u8],
    /// Value of the rail's signature header, if present
    pub signature: Option<&'a str>,
    pub source_ip: Option<IpAddr>,
}

/// Authenticated, decoded webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Our reference, echoed back by the rail
    pub reference: Reference,
    pub external_id: Option<String>,
}

/// One payment rail integration.
///
/// Adapters are I/O translators only. They never touch the ledger; the
/// engine owns all state transitions and treats adapter answers as
/// claims to verify against the state machine.
#[async_trait]
pub trait RailAdapter: Send + Sync {
    /// Which rail this adapter drives
    fn rail(&self) -> PaymentRail;

    /// Ask the rail for a quote ahead of initiation.
    ///
    /// Default: no rail-side pricing.
    async fn quote(&self, _req: &QuoteRequest) -> Result<RailQuote, RailError> {
        Ok(RailQuote::default())
    }

    /// Start an external transaction for the given ledger entry
    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateAck, RailError>;

    /// Ask the rail whether the transaction completed
    async fn verify(&self, probe: &VerifyProbe) -> Result<VerifyOutcome, RailError>;

    /// Best-effort cancel of an in-flight transaction
    async fn cancel(&self, probe: &VerifyProbe) -> Result<(), RailError>;

    /// Record payer-side proof of payment (cash-agent flow).
    ///
    /// Default: not offered.
    async fn mark_paid(&self, _probe: &VerifyProbe) -> Result<(), RailError> {
        Err(RailError::new(
            self.rail(),
            RailErrorKind::Unsupported("mark_paid"),
        ))
    }

    /// Authenticate and decode an inbound webhook.
    ///
    /// Must reject the payload (Unauthorized) before reading anything
    /// out of it when the signature/source check fails.
    fn parse_webhook(&self, payload: &WebhookPayload<'_>) -> Result<WebhookEvent, RailError>;
}

/// Rail lookup table keyed by `PaymentRail`.
///
/// Replaces per-gateway dispatch branches: adding a rail is one
/// constructor call at wiring time, no engine changes.
#[derive(Default)]
pub struct RailRegistry {
    rails: HashMap<PaymentRail, Arc<dyn RailAdapter>>,
}

impl RailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn RailAdapter>) {
        self.rails.insert(adapter.rail(), adapter);
    }

    pub fn get(&self, rail: PaymentRail) -> Option<Arc<dyn RailAdapter>> {
        self.rails.get(&rail).cloned()
    }

    pub fn supported(&self) -> Vec<PaymentRail> {
        self.rails.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(RailError::transport(PaymentRail::Card, "timeout").retryable());
        assert!(!RailError::declined(PaymentRail::Card, "no funds").retryable());
        assert!(!RailError::new(PaymentRail::Card, RailErrorKind::Unauthorized).retryable());
        assert!(!RailError::malformed(PaymentRail::Card, "bad json").retryable());
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = RailRegistry::new();
        registry.register(Arc::new(MockRail::new("whsec".to_string())));

        assert!(registry.get(PaymentRail::Mock).is_some());
        assert!(registry.get(PaymentRail::Card).is_none());
        assert_eq!(registry.supported(), vec![PaymentRail::Mock]);
    }
}
