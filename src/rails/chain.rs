//! On-Chain Rail
//!
//! JSON-RPC rail against a chain gateway node. Deposits hand the payer a
//! deposit address and resolve once the funding transaction carries
//! enough confirmations; withdrawals submit a transfer and track its
//! transaction hash the same way.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ledger::models::{EntryType, PaymentRail, Reference};

use super::{
    HTTP_CLIENT, InitiateAck, InitiateRequest, InitiateStatus, RailAdapter, RailError,
    RailErrorKind, VerifyOutcome, VerifyProbe, WebhookEvent, WebhookPayload,
};

pub struct OnChainRail {
    rpc_url: String,
    min_confirmations: u64,
    webhook_secret: String,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct TxStatus {
    confirmations: u64,
    #[serde(default)]
    dropped: bool,
}

#[derive(Deserialize)]
struct ChainWebhookBody {
    reference: Reference,
    tx_hash: Option<String>,
}

impl OnChainRail {
    pub fn new(rpc_url: String, min_confirmations: u64, webhook_secret: String) -> Self {
        Self {
            rpc_url,
            min_confirmations,
            webhook_secret,
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, RailError> {
        let response = HTTP_CLIENT
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| RailError::transport(self.rail(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RailError::transport(
                self.rail(),
                format!("node returned {status}"),
            ));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(RailError::declined(
                self.rail(),
                format!("rpc error {}: {}", err.code, err.message),
            ));
        }
        envelope
            .result
            .ok_or_else(|| RailError::malformed(self.rail(), "rpc response without result"))
    }
}

#[async_trait]
impl RailAdapter for OnChainRail {
    fn rail(&self) -> PaymentRail {
        PaymentRail::OnChain
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateAck, RailError> {
        match req.entry_type {
            EntryType::Deposit | EntryType::Refund => {
                let result = self
                    .rpc("wallet_depositAddress", json!({ "label": req.reference }))
                    .await?;
                let address = result
                    .get("address")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        RailError::malformed(self.rail(), "deposit address missing from result")
                    })?
                    .to_string();

                // No tx hash exists until the payer funds the address;
                // the watcher webhook supplies it later
                Ok(InitiateAck {
                    external_id: None,
                    status: InitiateStatus::RequiresProof,
                    instructions: Some(json!({ "deposit_address": address })),
                })
            }
            EntryType::Withdrawal | EntryType::Contribution => {
                let result = self
                    .rpc(
                        "wallet_sendTransfer",
                        json!({
                            "reference": req.reference,
                            "amount": req.stable_amount.to_string(),
                        }),
                    )
                    .await?;
                let tx_hash = result
                    .get("tx_hash")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        RailError::malformed(self.rail(), "tx hash missing from result")
                    })?
                    .to_string();

                Ok(InitiateAck {
                    external_id: Some(tx_hash),
                    status: InitiateStatus::Pending,
                    instructions: None,
                })
            }
        }
    }

    async fn verify(&self, probe: &VerifyProbe) -> Result<VerifyOutcome, RailError> {
        let tx_hash = match probe.external_id.as_deref() {
            Some(hash) => hash,
            // The funding transaction has not been observed yet
            None => return Ok(VerifyOutcome::Pending),
        };

        let result = self
            .rpc("chain_getTransaction", json!({ "tx_hash": tx_hash }))
            .await?;
        let tx: TxStatus = serde_json::from_value(result)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;

        if tx.dropped {
            return Ok(VerifyOutcome::Failed {
                reason: "transaction dropped from chain".to_string(),
            });
        }
        if tx.confirmations >= self.min_confirmations {
            Ok(VerifyOutcome::Success {
                settled_amount: None,
            })
        } else {
            Ok(VerifyOutcome::Pending)
        }
    }

    async fn cancel(&self, _probe: &VerifyProbe) -> Result<(), RailError> {
        // A broadcast transaction cannot be recalled
        Err(RailError::new(
            self.rail(),
            RailErrorKind::Unsupported("cancel"),
        ))
    }

    fn parse_webhook(&self, payload: &WebhookPayload<'_>) -> Result<WebhookEvent, RailError> {
        if payload.signature != Some(self.webhook_secret.as_str()) {
            return Err(RailError::new(self.rail(), RailErrorKind::Unauthorized));
        }
        let body: ChainWebhookBody = serde_json::from_slice(payload.body)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;
        Ok(WebhookEvent {
            reference: body.reference,
            external_id: body.tx_hash,
        })
    }
}
