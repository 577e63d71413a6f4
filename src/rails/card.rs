//! Card Processor Rail
//!
//! REST card/bank rail: create a hosted charge, poll it by our
//! reference, accept status webhooks authenticated by a static
//! verification hash header.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::ledger::models::{PaymentRail, Reference};

use super::{
    HTTP_CLIENT, InitiateAck, InitiateRequest, InitiateStatus, RailAdapter, RailError,
    RailErrorKind, VerifyOutcome, VerifyProbe, WebhookEvent, WebhookPayload,
};

pub struct CardRail {
    base_url: String,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Deserialize)]
struct ProcessorEnvelope<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct ChargeData {
    id: serde_json::Value,
    link: Option<String>,
}

#[derive(Deserialize)]
struct TransactionData {
    id: serde_json::Value,
    status: String,
    amount: Option<Decimal>,
}

#[derive(Deserialize)]
struct CardWebhookBody {
    data: CardWebhookData,
}

#[derive(Deserialize)]
struct CardWebhookData {
    tx_ref: Reference,
    id: Option<serde_json::Value>,
}

impl CardRail {
    pub fn new(base_url: String, secret_key: String, webhook_secret: String) -> Self {
        Self {
            base_url,
            secret_key,
            webhook_secret,
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ProcessorEnvelope<T>, RailError> {
        let response = HTTP_CLIENT
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RailError::transport(self.rail(), e.to_string()))?;

        self.decode(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ProcessorEnvelope<T>, RailError> {
        let response = HTTP_CLIENT
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| RailError::transport(self.rail(), e.to_string()))?;

        self.decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<ProcessorEnvelope<T>, RailError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(RailError::transport(
                self.rail(),
                format!("processor returned {status}"),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RailError::transport(self.rail(), e.to_string()))?;

        if status.is_client_error() {
            let detail = String::from_utf8_lossy(&bytes).into_owned();
            return Err(RailError::declined(self.rail(), detail));
        }

        serde_json::from_slice(&bytes).map_err(|e| RailError::malformed(self.rail(), e.to_string()))
    }
}

fn id_to_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RailAdapter for CardRail {
    fn rail(&self) -> PaymentRail {
        PaymentRail::Card
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateAck, RailError> {
        let envelope: ProcessorEnvelope<ChargeData> = self
            .post(
                "/payments",
                json!({
                    "tx_ref": req.reference,
                    "amount": req.local_amount,
                    "currency": req.currency,
                    "customer": { "id": req.user_id },
                }),
            )
            .await?;

        if envelope.status != "success" {
            let reason = envelope
                .message
                .unwrap_or_else(|| "charge rejected".to_string());
            return Err(RailError::declined(self.rail(), reason));
        }
        let data = envelope
            .data
            .ok_or_else(|| RailError::malformed(self.rail(), "charge response without data"))?;

        // The payer still has to complete the hosted checkout; the
        // charge resolves through the webhook or a later verify.
        Ok(InitiateAck {
            external_id: Some(id_to_string(&data.id)),
            status: InitiateStatus::Pending,
            instructions: data.link.map(|link| json!({ "payment_link": link })),
        })
    }

    async fn verify(&self, probe: &VerifyProbe) -> Result<VerifyOutcome, RailError> {
        let envelope: ProcessorEnvelope<TransactionData> = self
            .get(&format!(
                "/transactions/verify_by_reference?tx_ref={}",
                probe.reference
            ))
            .await?;

        let data = match envelope.data {
            Some(data) if envelope.status == "success" => data,
            // The processor has no record yet; the charge may still land
            _ => return Ok(VerifyOutcome::Pending),
        };

        match data.status.as_str() {
            "successful" => Ok(VerifyOutcome::Success {
                settled_amount: data.amount,
            }),
            "failed" | "cancelled" => Ok(VerifyOutcome::Failed {
                reason: format!("processor status: {}", data.status),
            }),
            _ => Ok(VerifyOutcome::Pending),
        }
    }

    async fn cancel(&self, _probe: &VerifyProbe) -> Result<(), RailError> {
        // Submitted charges cannot be recalled; they expire processor-side
        Err(RailError::new(
            self.rail(),
            RailErrorKind::Unsupported("cancel"),
        ))
    }

    fn parse_webhook(&self, payload: &WebhookPayload<'_>) -> Result<WebhookEvent, RailError> {
        // Constant per-merchant hash in the verif-hash header
        if payload.signature != Some(self.webhook_secret.as_str()) {
            return Err(RailError::new(self.rail(), RailErrorKind::Unauthorized));
        }

        let body: CardWebhookBody = serde_json::from_slice(payload.body)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;

        Ok(WebhookEvent {
            reference: body.data.tx_ref,
            external_id: body.data.id.as_ref().map(id_to_string),
        })
    }
}
