//! Cash-Agent Network Rail
//!
//! GraphQL rail for the agent network: fetch a priced quote, open a
//! deposit against it, and wait for the payer to hand cash to the agent.
//! The payer (or the client app on their behalf) marks the deposit as
//! paid; the network confirms asynchronously. Webhooks are authenticated
//! by a source-IP allowlist plus an optional shared-secret header.

use std::net::IpAddr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ledger::models::{EntryType, PaymentRail, Reference};

use super::{
    HTTP_CLIENT, InitiateAck, InitiateRequest, InitiateStatus, QuoteRequest, RailAdapter,
    RailError, RailErrorKind, RailQuote, VerifyOutcome, VerifyProbe, WebhookEvent, WebhookPayload,
};

const QUOTE_QUERY: &str = r#"
query RampQuote($amount: Decimal!, $currency: P2PPaymentCurrency!, $paymentType: PaymentType!) {
  rampQuote(amount: $amount, currency: $currency, paymentType: $paymentType) {
    id
    exchangeRate
  }
}
"#;

const INITIATE_DEPOSIT_MUTATION: &str = r#"
mutation InitiateRampQuoteDeposit($rampQuoteId: ID!, $reference: String!) {
  initiateRampQuoteDeposit(rampQuoteId: $rampQuoteId, reference: $reference) {
    id
    paymentDetails
  }
}
"#;

const TRANSACTION_QUERY: &str = r#"
query RampTransaction($id: ID!) {
  rampTransaction(id: $id) {
    id
    status
  }
}
"#;

const MARK_PAID_MUTATION: &str = r#"
mutation MarkDepositAsPaid($paymentRequestId: ID!) {
  markDepositAsPaid(paymentRequestId: $paymentRequestId)
}
"#;

const CANCEL_MUTATION: &str = r#"
mutation CancelRampTransaction($id: ID!) {
  cancelTransaction(id: $id)
}
"#;

pub struct CashAgentRail {
    endpoint: String,
    secret_key: String,
    webhook_secret: Option<String>,
    allowed_sources: Vec<IpAddr>,
}

#[derive(Deserialize)]
struct GraphqlEnvelope {
    data: Option<Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct QuoteData {
    id: String,
    /// Units of local currency per stable unit
    #[serde(rename = "exchangeRate")]
    exchange_rate: Decimal,
}

#[derive(Deserialize)]
struct DepositData {
    id: String,
    #[serde(rename = "paymentDetails")]
    payment_details: Option<Value>,
}

#[derive(Deserialize)]
struct TransactionData {
    status: String,
}

#[derive(Deserialize)]
struct AgentWebhookBody {
    reference: Reference,
    transaction_id: Option<String>,
}

impl CashAgentRail {
    pub fn new(
        endpoint: String,
        secret_key: String,
        webhook_secret: Option<String>,
        allowed_sources: Vec<IpAddr>,
    ) -> Self {
        Self {
            endpoint,
            secret_key,
            webhook_secret,
            allowed_sources,
        }
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, RailError> {
        let response = HTTP_CLIENT
            .post(&self.endpoint)
            .bearer_auth(&self.secret_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| RailError::transport(self.rail(), e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RailError::transport(
                self.rail(),
                format!("agent network returned {status}"),
            ));
        }

        let envelope: GraphqlEnvelope = response
            .json()
            .await
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;

        if let Some(errors) = envelope.errors {
            let message = errors
                .into_iter()
                .next()
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown graphql error".to_string());
            return Err(RailError::declined(self.rail(), message));
        }

        envelope
            .data
            .ok_or_else(|| RailError::malformed(self.rail(), "graphql response without data"))
    }

    fn field<T: serde::de::DeserializeOwned>(&self, data: Value, name: &str) -> Result<T, RailError> {
        let node = data
            .get(name)
            .cloned()
            .ok_or_else(|| RailError::malformed(self.rail(), format!("missing field: {name}")))?;
        serde_json::from_value(node)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))
    }
}

#[async_trait]
impl RailAdapter for CashAgentRail {
    fn rail(&self) -> PaymentRail {
        PaymentRail::CashAgent
    }

    async fn quote(&self, req: &QuoteRequest) -> Result<RailQuote, RailError> {
        let payment_type = match req.entry_type {
            EntryType::Deposit | EntryType::Refund => "DEPOSIT",
            EntryType::Withdrawal | EntryType::Contribution => "WITHDRAWAL",
        };
        let data = self
            .graphql(
                QUOTE_QUERY,
                json!({
                    "amount": req.local_amount,
                    "currency": req.currency,
                    "paymentType": payment_type,
                }),
            )
            .await?;
        let quote: QuoteData = self.field(data, "rampQuote")?;

        if quote.exchange_rate <= Decimal::ZERO {
            return Err(RailError::malformed(
                self.rail(),
                format!("non-positive exchange rate: {}", quote.exchange_rate),
            ));
        }

        // The network quotes local units per stable unit; the ledger
        // carries local -> stable
        Ok(RailQuote {
            rate: Some(Decimal::ONE / quote.exchange_rate),
            quote_id: Some(quote.id),
        })
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateAck, RailError> {
        let quote_id = req.quote_id.as_deref().ok_or_else(|| {
            RailError::malformed(self.rail(), "initiation without a quote id")
        })?;

        let data = self
            .graphql(
                INITIATE_DEPOSIT_MUTATION,
                json!({
                    "rampQuoteId": quote_id,
                    "reference": req.reference,
                }),
            )
            .await?;
        let deposit: DepositData = self.field(data, "initiateRampQuoteDeposit")?;

        // Money moves only after cash changes hands at the agent
        Ok(InitiateAck {
            external_id: Some(deposit.id),
            status: InitiateStatus::RequiresProof,
            instructions: deposit.payment_details,
        })
    }

    async fn verify(&self, probe: &VerifyProbe) -> Result<VerifyOutcome, RailError> {
        let external_id = probe.external_id.as_deref().ok_or_else(|| {
            RailError::malformed(self.rail(), "verify without a transaction id")
        })?;

        let data = self
            .graphql(TRANSACTION_QUERY, json!({ "id": external_id }))
            .await?;
        let txn: TransactionData = self.field(data, "rampTransaction")?;

        match txn.status.as_str() {
            "completed" => Ok(VerifyOutcome::Success {
                settled_amount: None,
            }),
            "cancelled" | "expired" => Ok(VerifyOutcome::Failed {
                reason: format!("agent network status: {}", txn.status),
            }),
            _ => Ok(VerifyOutcome::Pending),
        }
    }

    async fn cancel(&self, probe: &VerifyProbe) -> Result<(), RailError> {
        let external_id = probe.external_id.as_deref().ok_or_else(|| {
            RailError::malformed(self.rail(), "cancel without a transaction id")
        })?;
        self.graphql(CANCEL_MUTATION, json!({ "id": external_id }))
            .await?;
        Ok(())
    }

    async fn mark_paid(&self, probe: &VerifyProbe) -> Result<(), RailError> {
        let external_id = probe.external_id.as_deref().ok_or_else(|| {
            RailError::malformed(self.rail(), "mark_paid without a transaction id")
        })?;
        self.graphql(
            MARK_PAID_MUTATION,
            json!({ "paymentRequestId": external_id }),
        )
        .await?;
        Ok(())
    }

    fn parse_webhook(&self, payload: &WebhookPayload<'_>) -> Result<WebhookEvent, RailError> {
        if !self.allowed_sources.is_empty() {
            let allowed = payload
                .source_ip
                .map(|ip| self.allowed_sources.contains(&ip))
                .unwrap_or(false);
            if !allowed {
                return Err(RailError::new(self.rail(), RailErrorKind::Unauthorized));
            }
        }
        if let Some(secret) = &self.webhook_secret {
            if payload.signature != Some(secret.as_str()) {
                return Err(RailError::new(self.rail(), RailErrorKind::Unauthorized));
            }
        }

        let body: AgentWebhookBody = serde_json::from_slice(payload.body)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;
        Ok(WebhookEvent {
            reference: body.reference,
            external_id: body.transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rail(allowed: Vec<IpAddr>, secret: Option<&str>) -> CashAgentRail {
        CashAgentRail::new(
            "https://agents.example/graphql".to_string(),
            "sk_agent".to_string(),
            secret.map(str::to_string),
            allowed,
        )
    }

    #[test]
    fn test_webhook_source_allowlist() {
        let trusted: IpAddr = "203.0.113.7".parse().unwrap();
        let rail = rail(vec![trusted], None);

        let reference = Reference::new();
        let body = serde_json::to_vec(
            &json!({ "reference": reference, "transaction_id": "txn_1" }),
        )
        .unwrap();

        let ok = rail.parse_webhook(&WebhookPayload {
            body: &body,
            signature: None,
            source_ip: Some(trusted),
        });
        assert_eq!(ok.unwrap().external_id.as_deref(), Some("txn_1"));

        let stranger = rail.parse_webhook(&WebhookPayload {
            body: &body,
            signature: None,
            source_ip: Some("198.51.100.1".parse().unwrap()),
        });
        assert!(matches!(
            stranger.unwrap_err().kind,
            RailErrorKind::Unauthorized
        ));

        // No source ip at all never passes an allowlist
        let unknown = rail.parse_webhook(&WebhookPayload {
            body: &body,
            signature: None,
            source_ip: None,
        });
        assert!(matches!(
            unknown.unwrap_err().kind,
            RailErrorKind::Unauthorized
        ));
    }

    #[test]
    fn test_webhook_secret_checked_after_allowlist() {
        let trusted: IpAddr = "203.0.113.7".parse().unwrap();
        let rail = rail(vec![trusted], Some("whsec_agent"));

        let body =
            serde_json::to_vec(&json!({ "reference": Reference::new() })).unwrap();

        let bad_secret = rail.parse_webhook(&WebhookPayload {
            body: &body,
            signature: Some("nope"),
            source_ip: Some(trusted),
        });
        assert!(matches!(
            bad_secret.unwrap_err().kind,
            RailErrorKind::Unauthorized
        ));
    }
}
