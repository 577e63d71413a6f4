//! Money Arithmetic Module
//!
//! Unified decimal arithmetic for amounts and rates. All conversions
//! between local currency and the stable unit MUST go through this module.
//!
//! ## Design Principles
//! 1. `rust_decimal::Decimal` everywhere - binary floats never touch money
//! 2. Fixed scales: local amounts 2dp, stable amounts 8dp
//! 3. Explicit error handling: no silent truncation of caller input
//!
//! The conversion rate is snapshotted on the ledger entry at initiation
//! and settlement re-uses the recorded rate, so conversions here are
//! deterministic per entry.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Decimal places carried by stable-unit amounts
pub const STABLE_SCALE: u32 = 8;

/// Decimal places carried by local-currency amounts
pub const LOCAL_SCALE: u32 = 2;

/// Money arithmetic errors
#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Exchange rate must be greater than zero")]
    InvalidRate,
}

/// Validate a caller-provided local-currency amount
///
/// Rejects zero/negative amounts and amounts carrying more precision
/// than the local scale (e.g. "100.005" NGN).
pub fn validate_local_amount(amount: Decimal) -> Result<(), MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }
    if amount.normalize().scale() > LOCAL_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided: amount.normalize().scale(),
            max: LOCAL_SCALE,
        });
    }
    Ok(())
}

/// Validate a caller-provided stable-unit amount
pub fn validate_stable_amount(amount: Decimal) -> Result<(), MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }
    if amount.normalize().scale() > STABLE_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided: amount.normalize().scale(),
            max: STABLE_SCALE,
        });
    }
    Ok(())
}

/// Convert a local-currency amount to the stable unit at a given rate
///
/// Banker's rounding at the stable scale keeps repeated conversions from
/// drifting the conservation sum.
pub fn to_stable(local_amount: Decimal, rate: Decimal) -> Result<Decimal, MoneyError> {
    if rate <= Decimal::ZERO {
        return Err(MoneyError::InvalidRate);
    }
    Ok((local_amount * rate)
        .round_dp_with_strategy(STABLE_SCALE, RoundingStrategy::MidpointNearestEven))
}

/// Convert a stable-unit amount back to local currency at a given rate
pub fn to_local(stable_amount: Decimal, rate: Decimal) -> Result<Decimal, MoneyError> {
    if rate <= Decimal::ZERO {
        return Err(MoneyError::InvalidRate);
    }
    Ok((stable_amount / rate)
        .round_dp_with_strategy(LOCAL_SCALE, RoundingStrategy::MidpointNearestEven))
}

/// Normalize a stable amount to its canonical scale
pub fn quantize_stable(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(STABLE_SCALE, RoundingStrategy::MidpointNearestEven)
}
