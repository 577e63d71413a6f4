//! Mock Rail
//!
//! Programmable in-process rail for development and tests. Initiation
//! always succeeds; verification answers with a scripted outcome when
//! one was staged for the reference, otherwise success.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::ledger::models::{PaymentRail, Reference};

use super::{
    InitiateAck, InitiateRequest, InitiateStatus, RailAdapter, RailError, RailErrorKind,
    VerifyOutcome, VerifyProbe, WebhookEvent, WebhookPayload,
};

pub struct MockRail {
    webhook_secret: String,
    scripted: Mutex<HashMap<Reference, VerifyOutcome>>,
}

impl MockRail {
    pub fn new(webhook_secret: String) -> Self {
        Self {
            webhook_secret,
            scripted: Mutex::new(HashMap::new()),
        }
    }

    /// Stage the outcome the next `verify` for this reference will return
    pub fn script_outcome(&self, reference: Reference, outcome: VerifyOutcome) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.insert(reference, outcome);
        }
    }
}

#[derive(Deserialize)]
struct MockWebhookBody {
    reference: Reference,
    external_id: Option<String>,
}

#[async_trait]
impl RailAdapter for MockRail {
    fn rail(&self) -> PaymentRail {
        PaymentRail::Mock
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateAck, RailError> {
        Ok(InitiateAck {
            external_id: Some(format!("mock_{}", req.reference)),
            status: InitiateStatus::Accepted,
            instructions: None,
        })
    }

    async fn verify(&self, probe: &VerifyProbe) -> Result<VerifyOutcome, RailError> {
        if let Ok(scripted) = self.scripted.lock() {
            if let Some(outcome) = scripted.get(&probe.reference) {
                return Ok(outcome.clone());
            }
        }
        Ok(VerifyOutcome::Success {
            settled_amount: None,
        })
    }

    async fn cancel(&self, _probe: &VerifyProbe) -> Result<(), RailError> {
        Ok(())
    }

    fn parse_webhook(&self, payload: &WebhookPayload<'_>) -> Result<WebhookEvent, RailError> {
        if payload.signature != Some(self.webhook_secret.as_str()) {
            return Err(RailError::new(self.rail(), RailErrorKind::Unauthorized));
        }
        let body: MockWebhookBody = serde_json::from_slice(payload.body)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;
        Ok(WebhookEvent {
            reference: body.reference,
            external_id: body.external_id,
        })
    }
}
