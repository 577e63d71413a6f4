//! Settlement Notifications
//!
//! Fire-and-forget events emitted when a deposit opens and after a
//! ledger entry reaches a terminal state. Delivery never gates
//! settlement: a sink failure is logged and dropped.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::ledger::models::{Currency, EntryType, LedgerStatus, PaymentRail, Reference};

/// Event describing one ledger entry transition. The status tells the
/// consumer whether this is an initiation or a terminal settlement.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementEvent {
    pub reference: Reference,
    pub user_id: Uuid,
    pub entry_type: EntryType,
    pub status: LedgerStatus,
    pub stable_amount: Decimal,
    pub local_amount: Decimal,
    pub local_currency: Currency,
    pub gateway: PaymentRail,
    pub note: Option<String>,
}

/// Downstream consumer of settlement events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: SettlementEvent);
}

/// Default sink: structured log line per event
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn publish(&self, event: SettlementEvent) {
        tracing::info!(
            reference = %event.reference,
            user_id = %event.user_id,
            entry_type = %event.entry_type,
            status = %event.status,
            stable_amount = %event.stable_amount,
            gateway = %event.gateway,
            "settlement event"
        );
    }
}

/// Sink pushing events onto an in-process channel; used by tests and by
/// deployments that wire their own consumer
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<SettlementEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<SettlementEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn publish(&self, event: SettlementEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("settlement event dropped: receiver gone");
        }
    }
}
