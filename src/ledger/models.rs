//! Ledger Core Types
//!
//! Wallet and ledger-entry definitions shared by every store backend.
//! The ledger is the system of record: wallet balances are derivable from
//! the set of settled entries at any point in time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Idempotency key correlating a ledger entry to one external transaction
/// attempt across retries and webhook replays.
///
/// Generated once at initiation and handed to the payment rail as the
/// transaction reference. UUIDv4 gives collision-free keys with no
/// coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(Uuid);

impl Reference {
    /// Generate a fresh unique reference
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Reference {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Reference {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for Reference {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Recognised local (display) currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Currency {
    NGN,
    GHS,
    KES,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::NGN => "NGN",
            Currency::GHS => "GHS",
            Currency::KES => "KES",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NGN" => Some(Currency::NGN),
            "GHS" => Some(Currency::GHS),
            "KES" => Some(Currency::KES),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::from_code(s).ok_or(())
    }
}

/// Payment rail used to move value in or out of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRail {
    /// Test/development rail, settles on demand
    Mock,
    /// Card/bank processor (REST charge + verify)
    Card,
    /// Cash-agent network (quote-gated, agent pays in on proof)
    CashAgent,
    /// On-chain rail (confirmation-gated)
    OnChain,
    /// No external rail: internal movements (contributions, refunds)
    Internal,
}

impl PaymentRail {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRail::Mock => "mock",
            PaymentRail::Card => "card",
            PaymentRail::CashAgent => "cash_agent",
            PaymentRail::OnChain => "on_chain",
            PaymentRail::Internal => "internal",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "mock" => Some(PaymentRail::Mock),
            "card" => Some(PaymentRail::Card),
            "cash_agent" => Some(PaymentRail::CashAgent),
            "on_chain" => Some(PaymentRail::OnChain),
            "internal" => Some(PaymentRail::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentRail {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentRail::from_code(s).ok_or(())
    }
}

/// Ledger entry type. The type decides the sign of the wallet mutation
/// applied at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Credit: external money in
    Deposit,
    /// Debit: internal balance out to a payout rail
    Withdrawal,
    /// Debit: funds a group pledge
    Contribution,
    /// Credit: compensating reversal of a settled debit
    Refund,
}

impl EntryType {
    /// Whether settlement credits (`true`) or debits (`false`) the wallet
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(self, EntryType::Deposit | EntryType::Refund)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
            EntryType::Contribution => "contribution",
            EntryType::Refund => "refund",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "deposit" => Some(EntryType::Deposit),
            "withdrawal" => Some(EntryType::Withdrawal),
            "contribution" => Some(EntryType::Contribution),
            "refund" => Some(EntryType::Refund),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger entry lifecycle.
///
/// Status IDs are stored as SMALLINT. Terminal states: SETTLED (40),
/// FAILED (-10). The wallet balance is touched exactly once, on the
/// transition into SETTLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Entry written, external transaction started
    Initiated = 0,

    /// Rail requires an extra confirmation round-trip
    Pending = 10,

    /// Terminal: wallet mutated exactly once
    Settled = 40,

    /// Terminal: wallet untouched
    Failed = -10,
}

impl LedgerStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, LedgerStatus::Settled | LedgerStatus::Failed)
    }

    /// Valid forward transitions of the settlement state machine
    pub fn can_transition_to(&self, next: LedgerStatus) -> bool {
        match self {
            LedgerStatus::Initiated => matches!(
                next,
                LedgerStatus::Pending | LedgerStatus::Settled | LedgerStatus::Failed
            ),
            LedgerStatus::Pending => {
                matches!(next, LedgerStatus::Settled | LedgerStatus::Failed)
            }
            LedgerStatus::Settled | LedgerStatus::Failed => false,
        }
    }

    /// Numeric status ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(LedgerStatus::Initiated),
            10 => Some(LedgerStatus::Pending),
            40 => Some(LedgerStatus::Settled),
            -10 => Some(LedgerStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Initiated => "initiated",
            LedgerStatus::Pending => "pending",
            LedgerStatus::Settled => "settled",
            LedgerStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for LedgerStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        LedgerStatus::from_id(value).ok_or(())
    }
}

/// One wallet per user. The stable-unit balance is mutated only by the
/// settlement transaction, only once per ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Balance denominated in the internal stable unit, scale 8
    pub stable_balance: Decimal,
    /// The user's display fiat currency
    pub local_currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            user_id: self.user_id,
            balance: self.stable_balance,
            currency: self.local_currency,
            as_of: Utc::now(),
        }
    }
}

/// Point-in-time wallet view handed to callers (and cached)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub currency: Currency,
    pub as_of: DateTime<Utc>,
}

/// Immutable record of one attempted balance-affecting transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub reference: Reference,
    pub entry_type: EntryType,
    /// Local fiat amount before conversion, scale 2
    pub local_amount: Decimal,
    pub local_currency: Currency,
    /// Amount in the stable unit, scale 8
    pub stable_amount: Decimal,
    /// Rate applied: local currency -> stable unit. Snapshotted at
    /// initiation; never re-read at settlement.
    pub exchange_rate: Decimal,
    pub gateway: PaymentRail,
    pub status: LedgerStatus,
    /// Rail-native transaction id returned by initiate
    pub external_id: Option<String>,
    /// Weak link to the group pledge this entry funds, if any
    pub contribution_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed wallet delta applied when this entry settles
    pub fn wallet_delta(&self) -> Decimal {
        if self.entry_type.is_credit() {
            self.stable_amount
        } else {
            -self.stable_amount
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry[{}] {} {} {} -> {} stable, rail={} status={}",
            self.reference,
            self.entry_type,
            self.local_amount,
            self.local_currency,
            self.stable_amount,
            self.gateway,
            self.status
        )
    }
}

/// Insert payload for a new ledger entry. Entries are always born in
/// `Initiated`.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub wallet_id: Uuid,
    pub reference: Reference,
    pub entry_type: EntryType,
    pub local_amount: Decimal,
    pub local_currency: Currency,
    pub stable_amount: Decimal,
    pub exchange_rate: Decimal,
    pub gateway: PaymentRail,
    pub external_id: Option<String>,
    pub contribution_id: Option<Uuid>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_id_roundtrip() {
        let statuses = [
            LedgerStatus::Initiated,
            LedgerStatus::Pending,
            LedgerStatus::Settled,
            LedgerStatus::Failed,
        ];
        for status in statuses {
            assert_eq!(LedgerStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(LedgerStatus::from_id(99), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(LedgerStatus::Settled.is_terminal());
        assert!(LedgerStatus::Failed.is_terminal());
        assert!(!LedgerStatus::Initiated.is_terminal());
        assert!(!LedgerStatus::Pending.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(LedgerStatus::Initiated.can_transition_to(LedgerStatus::Pending));
        assert!(LedgerStatus::Initiated.can_transition_to(LedgerStatus::Settled));
        assert!(LedgerStatus::Pending.can_transition_to(LedgerStatus::Failed));
        assert!(!LedgerStatus::Settled.can_transition_to(LedgerStatus::Failed));
        assert!(!LedgerStatus::Failed.can_transition_to(LedgerStatus::Settled));
        assert!(!LedgerStatus::Pending.can_transition_to(LedgerStatus::Initiated));
    }

    #[test]
    fn test_entry_type_sign() {
        assert!(EntryType::Deposit.is_credit());
        assert!(EntryType::Refund.is_credit());
        assert!(!EntryType::Withdrawal.is_credit());
        assert!(!EntryType::Contribution.is_credit());
    }

    #[test]
    fn test_reference_roundtrip() {
        let reference = Reference::new();
        let parsed: Reference = reference.to_string().parse().unwrap();
        assert_eq!(reference, parsed);

        assert_ne!(Reference::new(), Reference::new());
    }

    #[test]
    fn test_rail_codes() {
        for rail in [
            PaymentRail::Mock,
            PaymentRail::Card,
            PaymentRail::CashAgent,
            PaymentRail::OnChain,
            PaymentRail::Internal,
        ] {
            assert_eq!(PaymentRail::from_code(rail.as_str()), Some(rail));
        }
        assert_eq!(PaymentRail::from_code("paystack"), None);
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("NGN"), Some(Currency::NGN));
        assert_eq!(Currency::from_code("usd"), None);
    }
}
