//! Settlement Engine
//!
//! Orchestrates every balance-affecting operation: deposits in from a
//! payment rail, withdrawals and contributions out, refunds, and webhook
//! reconciliation. The engine owns all ledger state transitions; rail
//! adapters only translate wire formats, and their answers are treated
//! as claims to check against the state machine.
//!
//! ## Exactly-once guarantee
//!
//! Initiation is idempotent through the unique entry reference, and the
//! store's settle transaction re-checks terminality under a row lock, so
//! a webhook replay, a concurrent poll, and a user retry all collapse
//! onto one wallet mutation.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::WalletCache;
use crate::ledger::models::{
    Currency, EntryType, LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentRail, Reference,
    WalletSnapshot,
};
use crate::ledger::store::{LedgerStore, SettleOutcome, SettleResult, StoreError};
use crate::money;
use crate::notify::{NotificationSink, SettlementEvent};
use crate::rails::{
    InitiateRequest, InitiateStatus, QuoteRequest, RailAdapter, RailRegistry, VerifyOutcome,
    VerifyProbe, WebhookPayload,
};
use crate::rates::RateProvider;

use super::error::SettlementError;

/// Attempts per settlement before giving up on store conflicts
const MAX_SETTLE_ATTEMPTS: u32 = 3;

/// Result of starting a deposit
#[derive(Debug, Clone)]
pub struct DepositInitiation {
    pub entry: LedgerEntry,
    /// Rail-specific payer instructions (checkout link, agent details,
    /// deposit address)
    pub instructions: Option<Value>,
}

pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    rails: RailRegistry,
    rates: Arc<dyn RateProvider>,
    cache: Arc<WalletCache>,
    sink: Arc<dyn NotificationSink>,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        rails: RailRegistry,
        rates: Arc<dyn RateProvider>,
        cache: Arc<WalletCache>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            rails,
            rates,
            cache,
            sink,
        }
    }

    pub fn supported_rails(&self) -> Vec<PaymentRail> {
        self.rails.supported()
    }

    fn adapter(&self, rail: PaymentRail) -> Result<Arc<dyn RailAdapter>, SettlementError> {
        self.rails
            .get(rail)
            .ok_or_else(|| SettlementError::UnsupportedGateway(rail.to_string()))
    }

    /// Start a deposit: price the conversion, open the external
    /// transaction, and write the entry with the snapshotted rate.
    pub async fn initiate_deposit(
        &self,
        user_id: Uuid,
        local_amount: Decimal,
        currency: Currency,
        rail: PaymentRail,
    ) -> Result<DepositInitiation, SettlementError> {
        if rail == PaymentRail::Internal {
            return Err(SettlementError::UnsupportedGateway(rail.to_string()));
        }
        money::validate_local_amount(local_amount)?;
        let adapter = self.adapter(rail)?;

        let provider_rate = self.rates.rate(currency).await?;
        let quote = adapter
            .quote(&QuoteRequest {
                entry_type: EntryType::Deposit,
                local_amount,
                currency,
            })
            .await?;
        // A rail that prices the conversion itself quotes the rate it
        // will execute at; that one goes on the entry
        let rate = quote.rate.unwrap_or(provider_rate);
        let stable_amount = money::to_stable(local_amount, rate)?;

        let wallet = self.store.get_or_create_wallet(user_id, currency).await?;
        let reference = Reference::new();

        let ack = adapter
            .initiate(&InitiateRequest {
                reference,
                user_id,
                entry_type: EntryType::Deposit,
                local_amount,
                currency,
                stable_amount,
                quote_id: quote.quote_id,
            })
            .await?;

        let entry = self
            .store
            .insert_entry(NewLedgerEntry {
                wallet_id: wallet.id,
                reference,
                entry_type: EntryType::Deposit,
                local_amount,
                local_currency: currency,
                stable_amount,
                exchange_rate: rate,
                gateway: rail,
                external_id: ack.external_id.clone(),
                contribution_id: None,
                note: None,
            })
            .await?;

        // Initiated = waiting on the payer; Pending = the external
        // transaction is in flight
        let entry = match ack.status {
            InitiateStatus::Accepted | InitiateStatus::Pending => {
                self.store.mark_pending(&reference).await?;
                self.store
                    .entry_by_reference(&reference)
                    .await?
                    .unwrap_or(entry)
            }
            InitiateStatus::RequiresProof => entry,
        };

        tracing::info!(
            reference = %reference,
            user_id = %user_id,
            amount = %local_amount,
            currency = %currency,
            rail = %rail,
            "deposit initiated"
        );
        self.sink
            .publish(SettlementEvent {
                reference,
                user_id,
                entry_type: entry.entry_type,
                status: entry.status,
                stable_amount: entry.stable_amount,
                local_amount: entry.local_amount,
                local_currency: entry.local_currency,
                gateway: entry.gateway,
                note: None,
            })
            .await;

        Ok(DepositInitiation {
            entry,
            instructions: ack.instructions,
        })
    }

    /// Drive an entry to a terminal state by asking its rail.
    ///
    /// Safe to call any number of times: terminal entries short-circuit,
    /// a pending verdict leaves the entry as-is, and the settle
    /// transaction de-duplicates racing callers.
    pub async fn finalize(&self, reference: Reference) -> Result<LedgerEntry, SettlementError> {
        self.finalize_with_hint(reference, None).await
    }

    async fn finalize_with_hint(
        &self,
        reference: Reference,
        external_hint: Option<String>,
    ) -> Result<LedgerEntry, SettlementError> {
        let entry = self
            .store
            .entry_by_reference(&reference)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("entry {reference}")))?;

        if entry.status.is_terminal() {
            return Ok(entry);
        }

        let adapter = self.adapter(entry.gateway)?;
        let probe = VerifyProbe {
            reference,
            external_id: external_hint.or_else(|| entry.external_id.clone()),
        };

        let outcome = match adapter.verify(&probe).await {
            Ok(outcome) => outcome,
            Err(e) if e.retryable() => {
                // The rail may still answer later; leave the entry alone
                tracing::warn!(reference = %reference, error = %e, "verify unavailable, will retry");
                return Ok(entry);
            }
            Err(e) => return Err(e.into()),
        };

        match outcome {
            VerifyOutcome::Success { settled_amount } => {
                if let Some(reported) = settled_amount {
                    if reported != entry.local_amount {
                        // The snapshotted amount stays authoritative so
                        // the ledger keeps summing to the balance
                        tracing::warn!(
                            reference = %reference,
                            recorded = %entry.local_amount,
                            reported = %reported,
                            "rail reported a different settled amount"
                        );
                    }
                }
                let result = self.settle_with_retry(reference, SettleOutcome::Settled).await?;
                self.after_settle(&result).await;
                Ok(result.entry)
            }
            VerifyOutcome::Pending => {
                self.store.mark_pending(&reference).await?;
                Ok(self
                    .store
                    .entry_by_reference(&reference)
                    .await?
                    .unwrap_or(entry))
            }
            VerifyOutcome::Failed { reason } => {
                let result = self
                    .settle_with_retry(reference, SettleOutcome::Failed { reason })
                    .await?;
                self.after_settle(&result).await;
                Ok(result.entry)
            }
        }
    }

    /// Withdraw local currency through a payout rail. The debit settles
    /// synchronously before the payout starts; a rail failure afterwards
    /// is compensated with a refund credit.
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        local_amount: Decimal,
        currency: Currency,
        rail: Option<PaymentRail>,
    ) -> Result<LedgerEntry, SettlementError> {
        money::validate_local_amount(local_amount)?;
        let rail = rail.unwrap_or(PaymentRail::CashAgent);
        if rail == PaymentRail::Internal {
            return Err(SettlementError::UnsupportedGateway(rail.to_string()));
        }
        let adapter = self.adapter(rail)?;

        let wallet = self
            .store
            .wallet_by_user(user_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("wallet for user {user_id}")))?;

        let provider_rate = self.rates.rate(currency).await?;
        let quote = adapter
            .quote(&QuoteRequest {
                entry_type: EntryType::Withdrawal,
                local_amount,
                currency,
            })
            .await?;
        let rate = quote.rate.unwrap_or(provider_rate);
        let stable_amount = money::to_stable(local_amount, rate)?;

        // Fast pre-check; the settle transaction re-checks under the lock
        if wallet.stable_balance < stable_amount {
            return Err(SettlementError::InsufficientBalance);
        }

        let reference = Reference::new();
        self.store
            .insert_entry(NewLedgerEntry {
                wallet_id: wallet.id,
                reference,
                entry_type: EntryType::Withdrawal,
                local_amount,
                local_currency: currency,
                stable_amount,
                exchange_rate: rate,
                gateway: rail,
                external_id: None,
                contribution_id: None,
                note: None,
            })
            .await?;

        // Debit first: the payout only reaches the rail once the funds
        // are locked out of the wallet. A racing drain trips the guard
        // inside the settle transaction and never touches the rail.
        let result = self.settle_with_retry(reference, SettleOutcome::Settled).await?;
        self.after_settle(&result).await;

        let ack = match adapter
            .initiate(&InitiateRequest {
                reference,
                user_id,
                entry_type: EntryType::Withdrawal,
                local_amount,
                currency,
                stable_amount,
                quote_id: quote.quote_id,
            })
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                // The payout never started; credit the debit back
                tracing::warn!(reference = %reference, error = %e, "payout initiation failed, compensating");
                if let Err(refund_err) = self.refund(reference).await {
                    tracing::error!(
                        reference = %reference,
                        error = %refund_err,
                        "compensating refund failed"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            reference = %reference,
            user_id = %user_id,
            amount = %local_amount,
            rail = %rail,
            external_id = ?ack.external_id,
            "withdrawal settled"
        );
        Ok(result.entry)
    }

    /// Debit a stable-denominated contribution towards a group pledge
    pub async fn contribute(
        &self,
        user_id: Uuid,
        stable_amount: Decimal,
        contribution_id: Uuid,
    ) -> Result<LedgerEntry, SettlementError> {
        money::validate_stable_amount(stable_amount)?;

        let wallet = self
            .store
            .wallet_by_user(user_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("wallet for user {user_id}")))?;

        let rate = self.rates.rate(wallet.local_currency).await?;
        let local_amount = money::to_local(stable_amount, rate)?;

        let reference = Reference::new();
        self.store
            .insert_entry(NewLedgerEntry {
                wallet_id: wallet.id,
                reference,
                entry_type: EntryType::Contribution,
                local_amount,
                local_currency: wallet.local_currency,
                stable_amount: money::quantize_stable(stable_amount),
                exchange_rate: rate,
                gateway: PaymentRail::Internal,
                external_id: None,
                contribution_id: Some(contribution_id),
                note: None,
            })
            .await?;

        let result = self.settle_with_retry(reference, SettleOutcome::Settled).await?;
        self.after_settle(&result).await;
        Ok(result.entry)
    }

    /// Compensating credit for a settled debit. Idempotent per original
    /// entry: a second refund request returns the existing refund.
    pub async fn refund(&self, reference: Reference) -> Result<LedgerEntry, SettlementError> {
        let original = self
            .store
            .entry_by_reference(&reference)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("entry {reference}")))?;

        if original.entry_type.is_credit() {
            return Err(SettlementError::InvalidState(
                "only debit entries can be refunded".to_string(),
            ));
        }
        if original.status != LedgerStatus::Settled {
            return Err(SettlementError::InvalidState(format!(
                "entry is {}, only settled entries can be refunded",
                original.status
            )));
        }

        // Refunds link back through the note; one refund per original
        let link = refund_note(&reference);
        let existing = self
            .store
            .entries_for_wallet(original.wallet_id, i64::MAX)
            .await?
            .into_iter()
            .find(|e| {
                e.entry_type == EntryType::Refund && e.note.as_deref() == Some(link.as_str())
            });
        if let Some(entry) = existing {
            return Ok(entry);
        }

        let refund_reference = Reference::new();
        self.store
            .insert_entry(NewLedgerEntry {
                wallet_id: original.wallet_id,
                reference: refund_reference,
                entry_type: EntryType::Refund,
                local_amount: original.local_amount,
                local_currency: original.local_currency,
                stable_amount: original.stable_amount,
                exchange_rate: original.exchange_rate,
                gateway: PaymentRail::Internal,
                external_id: None,
                contribution_id: original.contribution_id,
                note: Some(link),
            })
            .await?;

        let result = self
            .settle_with_retry(refund_reference, SettleOutcome::Settled)
            .await?;
        self.after_settle(&result).await;
        Ok(result.entry)
    }

    /// Cancel an open deposit: tell the rail, then close the entry out
    pub async fn cancel_deposit(
        &self,
        reference: Reference,
    ) -> Result<LedgerEntry, SettlementError> {
        let entry = self
            .store
            .entry_by_reference(&reference)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("entry {reference}")))?;
        if entry.entry_type != EntryType::Deposit {
            return Err(SettlementError::InvalidState(
                "only deposits can be cancelled".to_string(),
            ));
        }
        if entry.status.is_terminal() {
            return Err(SettlementError::InvalidState(format!(
                "entry is already {}",
                entry.status
            )));
        }

        let adapter = self.adapter(entry.gateway)?;
        adapter
            .cancel(&VerifyProbe {
                reference,
                external_id: entry.external_id.clone(),
            })
            .await?;

        let result = self
            .settle_with_retry(
                reference,
                SettleOutcome::Failed {
                    reason: "cancelled by payer".to_string(),
                },
            )
            .await?;
        self.after_settle(&result).await;
        Ok(result.entry)
    }

    /// Forward payer proof-of-payment to the rail (cash-agent flow)
    pub async fn mark_paid(&self, reference: Reference) -> Result<LedgerEntry, SettlementError> {
        let entry = self
            .store
            .entry_by_reference(&reference)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("entry {reference}")))?;
        if entry.status.is_terminal() {
            return Err(SettlementError::InvalidState(format!(
                "entry is already {}",
                entry.status
            )));
        }

        let adapter = self.adapter(entry.gateway)?;
        adapter
            .mark_paid(&VerifyProbe {
                reference,
                external_id: entry.external_id.clone(),
            })
            .await?;
        self.store.mark_pending(&reference).await?;

        Ok(self
            .store
            .entry_by_reference(&reference)
            .await?
            .unwrap_or(entry))
    }

    /// Authenticate an inbound webhook and reconcile the entry it names
    pub async fn webhook_reconcile(
        &self,
        rail: PaymentRail,
        payload: &WebhookPayload<'_>,
    ) -> Result<LedgerEntry, SettlementError> {
        let adapter = self.adapter(rail)?;
        let event = adapter.parse_webhook(payload)?;

        tracing::info!(reference = %event.reference, rail = %rail, "webhook received");
        self.finalize_with_hint(event.reference, event.external_id)
            .await
    }

    /// Point-in-time wallet view, read through the snapshot cache. The
    /// wallet is created lazily on first access.
    pub async fn wallet_snapshot(
        &self,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<WalletSnapshot, SettlementError> {
        if let Some(snapshot) = self.cache.get(user_id) {
            return Ok(snapshot);
        }
        let wallet = self.store.get_or_create_wallet(user_id, currency).await?;
        let snapshot = wallet.snapshot();
        self.cache.put(snapshot.clone());
        Ok(snapshot)
    }

    /// Newest-first ledger history for the user's wallet
    pub async fn ledger_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, SettlementError> {
        let wallet = self
            .store
            .wallet_by_user(user_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("wallet for user {user_id}")))?;
        Ok(self.store.entries_for_wallet(wallet.id, limit).await?)
    }

    async fn settle_with_retry(
        &self,
        reference: Reference,
        outcome: SettleOutcome,
    ) -> Result<SettleResult, SettlementError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.settle(&reference, outcome.clone()).await {
                Ok(result) => return Ok(result),
                Err(StoreError::Conflict) if attempt < MAX_SETTLE_ATTEMPTS => {
                    tracing::warn!(reference = %reference, attempt, "settle conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Post-commit side effects: drop the cached snapshot, emit the event
    async fn after_settle(&self, result: &SettleResult) {
        if result.already_final {
            return;
        }
        self.cache.invalidate(result.wallet.user_id);
        self.sink
            .publish(SettlementEvent {
                reference: result.entry.reference,
                user_id: result.wallet.user_id,
                entry_type: result.entry.entry_type,
                status: result.entry.status,
                stable_amount: result.entry.stable_amount,
                local_amount: result.entry.local_amount,
                local_currency: result.entry.local_currency,
                gateway: result.entry.gateway,
                note: result.entry.note.clone(),
            })
            .await;
    }
}

fn refund_note(reference: &Reference) -> String {
    format!("refund of {reference}")
}
