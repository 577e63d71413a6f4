//! End-to-end settlement scenarios on the in-memory store

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use coopwise_wallet::cache::WalletCache;
use coopwise_wallet::ledger::models::{Currency, LedgerStatus, PaymentRail, Reference};
use coopwise_wallet::ledger::MemoryLedgerStore;
use coopwise_wallet::notify::TracingSink;
use coopwise_wallet::rails::{
    InitiateAck, InitiateRequest, InitiateStatus, MockRail, RailAdapter, RailError, RailRegistry,
    VerifyOutcome, VerifyProbe, WebhookEvent, WebhookPayload,
};
use coopwise_wallet::rates::FixedRateProvider;
use coopwise_wallet::settlement::SettlementEngine;

const WEBHOOK_SECRET: &str = "whsec_test";

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn engine_with(rails: RailRegistry) -> SettlementEngine {
    SettlementEngine::new(
        Arc::new(MemoryLedgerStore::new()),
        rails,
        Arc::new(FixedRateProvider::single(
            Currency::NGN,
            Decimal::ONE / dec("1600"),
        )),
        Arc::new(WalletCache::default()),
        Arc::new(TracingSink),
    )
}

fn mock_engine() -> (SettlementEngine, Arc<MockRail>) {
    let mock = Arc::new(MockRail::new(WEBHOOK_SECRET.to_string()));
    let mut rails = RailRegistry::new();
    rails.register(mock.clone());
    (engine_with(rails), mock)
}

/// A member funds their wallet, contributes to the group pot, and later
/// withdraws what is left. The settled ledger always sums to the balance.
#[tokio::test]
async fn member_saves_toward_group_goal() {
    let (engine, _) = mock_engine();
    let member = Uuid::new_v4();

    let initiation = engine
        .initiate_deposit(member, dec("15000"), Currency::NGN, PaymentRail::Mock)
        .await
        .unwrap();
    let deposit = engine.finalize(initiation.entry.reference).await.unwrap();
    assert_eq!(deposit.status, LedgerStatus::Settled);
    assert_eq!(deposit.stable_amount, dec("9.375"));

    let pledge = Uuid::new_v4();
    engine.contribute(member, dec("6"), pledge).await.unwrap();

    let payout = engine
        .withdraw(member, dec("3200"), Currency::NGN, Some(PaymentRail::Mock))
        .await
        .unwrap();
    assert_eq!(payout.stable_amount, dec("2"));

    let snapshot = engine
        .wallet_snapshot(member, Currency::NGN)
        .await
        .unwrap();
    assert_eq!(snapshot.balance, dec("1.375"));

    let ledger_sum: Decimal = engine
        .ledger_history(member, 100)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.status == LedgerStatus::Settled)
        .map(|e| e.wallet_delta())
        .sum();
    assert_eq!(ledger_sum, snapshot.balance);
}

/// A webhook and a user-driven poll race on the same deposit; the wallet
/// is credited exactly once.
#[tokio::test]
async fn webhook_and_poll_race_settles_once() {
    let (engine, _) = mock_engine();
    let member = Uuid::new_v4();

    let initiation = engine
        .initiate_deposit(member, dec("15000"), Currency::NGN, PaymentRail::Mock)
        .await
        .unwrap();
    let reference = initiation.entry.reference;
    let body = serde_json::to_vec(&serde_json::json!({ "reference": reference })).unwrap();

    let engine = Arc::new(engine);
    let body = Arc::new(body);
    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let engine = engine.clone();
            let body = body.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    engine.finalize(reference).await.map(|e| e.status)
                } else {
                    engine
                        .webhook_reconcile(
                            PaymentRail::Mock,
                            &WebhookPayload {
                                body: body.as_slice(),
                                signature: Some(WEBHOOK_SECRET),
                                source_ip: None,
                            },
                        )
                        .await
                        .map(|e| e.status)
                }
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        assert_eq!(task.unwrap().unwrap(), LedgerStatus::Settled);
    }

    let snapshot = engine
        .wallet_snapshot(member, Currency::NGN)
        .await
        .unwrap();
    assert_eq!(snapshot.balance, dec("9.375"));
}

/// Wallets are isolated: settling one member's deposit never moves
/// another member's balance.
#[tokio::test]
async fn wallets_are_isolated() {
    let (engine, _) = mock_engine();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let initiation = engine
        .initiate_deposit(alice, dec("1600"), Currency::NGN, PaymentRail::Mock)
        .await
        .unwrap();
    engine.finalize(initiation.entry.reference).await.unwrap();

    let alice_snapshot = engine.wallet_snapshot(alice, Currency::NGN).await.unwrap();
    let bob_snapshot = engine.wallet_snapshot(bob, Currency::NGN).await.unwrap();
    assert_eq!(alice_snapshot.balance, dec("1"));
    assert_eq!(bob_snapshot.balance, Decimal::ZERO);
}

/// Rail that mimics the cash-agent flow: a quote-priced rate, a deposit
/// that waits for proof of payment, then completes.
struct ProofGatedRail {
    confirmed: std::sync::Mutex<std::collections::HashSet<Reference>>,
}

impl ProofGatedRail {
    fn new() -> Self {
        Self {
            confirmed: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }
}

#[async_trait]
impl RailAdapter for ProofGatedRail {
    fn rail(&self) -> PaymentRail {
        PaymentRail::CashAgent
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateAck, RailError> {
        Ok(InitiateAck {
            external_id: Some(format!("agent_{}", req.reference)),
            status: InitiateStatus::RequiresProof,
            instructions: Some(serde_json::json!({ "agent": "Mama Nkechi's shop" })),
        })
    }

    async fn verify(&self, probe: &VerifyProbe) -> Result<VerifyOutcome, RailError> {
        let confirmed = self.confirmed.lock().unwrap();
        if confirmed.contains(&probe.reference) {
            Ok(VerifyOutcome::Success {
                settled_amount: None,
            })
        } else {
            Ok(VerifyOutcome::Pending)
        }
    }

    async fn cancel(&self, _probe: &VerifyProbe) -> Result<(), RailError> {
        Ok(())
    }

    async fn mark_paid(&self, probe: &VerifyProbe) -> Result<(), RailError> {
        self.confirmed.lock().unwrap().insert(probe.reference);
        Ok(())
    }

    fn parse_webhook(&self, payload: &WebhookPayload<'_>) -> Result<WebhookEvent, RailError> {
        let value: serde_json::Value = serde_json::from_slice(payload.body)
            .map_err(|e| RailError::malformed(self.rail(), e.to_string()))?;
        let reference = value["reference"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RailError::malformed(self.rail(), "missing reference"))?;
        Ok(WebhookEvent {
            reference,
            external_id: None,
        })
    }
}

/// Cash deposit: initiated entry stays open until the member hands over
/// cash and the deposit is marked paid, then a poll settles it.
#[tokio::test]
async fn proof_gated_deposit_settles_after_mark_paid() {
    let mut rails = RailRegistry::new();
    rails.register(Arc::new(ProofGatedRail::new()));
    let engine = engine_with(rails);
    let member = Uuid::new_v4();

    let initiation = engine
        .initiate_deposit(member, dec("15000"), Currency::NGN, PaymentRail::CashAgent)
        .await
        .unwrap();
    // Waiting on the payer: not yet pending
    assert_eq!(initiation.entry.status, LedgerStatus::Initiated);
    assert!(initiation.instructions.is_some());

    // Polling before the cash handover resolves nothing
    let entry = engine.finalize(initiation.entry.reference).await.unwrap();
    assert_eq!(entry.status, LedgerStatus::Pending);

    engine.mark_paid(initiation.entry.reference).await.unwrap();
    let entry = engine.finalize(initiation.entry.reference).await.unwrap();
    assert_eq!(entry.status, LedgerStatus::Settled);

    let snapshot = engine
        .wallet_snapshot(member, Currency::NGN)
        .await
        .unwrap();
    assert_eq!(snapshot.balance, dec("9.375"));
}

/// A failed deposit is terminal: later webhooks cannot flip it to
/// settled or credit the wallet.
#[tokio::test]
async fn late_webhook_cannot_revive_failed_entry() {
    let (engine, mock) = mock_engine();
    let member = Uuid::new_v4();

    let initiation = engine
        .initiate_deposit(member, dec("15000"), Currency::NGN, PaymentRail::Mock)
        .await
        .unwrap();
    let reference = initiation.entry.reference;

    mock.script_outcome(
        reference,
        VerifyOutcome::Failed {
            reason: "expired".to_string(),
        },
    );
    let entry = engine.finalize(reference).await.unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);

    // The rail later claims success; the terminal state wins
    mock.script_outcome(
        reference,
        VerifyOutcome::Success {
            settled_amount: None,
        },
    );
    let body = serde_json::to_vec(&serde_json::json!({ "reference": reference })).unwrap();
    let entry = engine
        .webhook_reconcile(
            PaymentRail::Mock,
            &WebhookPayload {
                body: &body,
                signature: Some(WEBHOOK_SECRET),
                source_ip: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);

    let snapshot = engine
        .wallet_snapshot(member, Currency::NGN)
        .await
        .unwrap();
    assert_eq!(snapshot.balance, Decimal::ZERO);
}
