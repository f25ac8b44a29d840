//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for records, JSON for events)
//! - Exact arithmetic (`U256` for amounts, matching the contract's `uint256`)
//! - Compiler-checked rail lifecycle (closed `RailState` enum)

use primitive_types::{H160, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use primitive_types::U256;

/// Account, operator, token or arbiter address (20 bytes)
pub type Address = H160;

/// Transaction hash (32 bytes)
pub type TxHash = H256;

/// Rail identifier as emitted by the settlement contract (`uint256`)
pub type RailId = U256;

/// Chain epoch (block number)
pub type Epoch = u64;

/// Upper bound of `commissionRateBps`; 10_000 bps = 100%
pub const COMMISSION_MAX_BPS: u64 = 10_000;

/// Seconds in a daily bucket
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds in a weekly bucket
pub const SECONDS_PER_WEEK: u64 = 604_800;

/// Rail lifecycle state
///
/// Transitions only move forward:
/// `ZeroRate -> Active -> Terminated -> Finalized`, with `ZeroRate -> Terminated`
/// allowed for rails that never got a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum RailState {
    /// Created, payment rate is zero
    ZeroRate = 1,
    /// Payment rate is positive
    Active = 2,
    /// Terminated by payer or operator (terminal for accrual)
    Terminated = 3,
    /// Fully settled and closed
    Finalized = 4,
}

impl RailState {
    /// Contract-side name
    pub fn as_str(&self) -> &'static str {
        match self {
            RailState::ZeroRate => "ZERORATE",
            RailState::Active => "ACTIVE",
            RailState::Terminated => "TERMINATED",
            RailState::Finalized => "FINALIZED",
        }
    }

    /// Whether `next` is a legal forward move from `self`
    pub fn can_transition_to(&self, next: RailState) -> bool {
        matches!(
            (self, next),
            (RailState::ZeroRate, RailState::Active)
                | (RailState::ZeroRate, RailState::Terminated)
                | (RailState::Active, RailState::Terminated)
                | (RailState::Terminated, RailState::Finalized)
        )
    }

    /// Check if rail no longer accrues payment
    pub fn is_terminal(&self) -> bool {
        matches!(self, RailState::Terminated | RailState::Finalized)
    }
}

impl fmt::Display for RailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subtract, clamping at zero. Returns the result and whether the clamp fired.
pub fn clamped_sub(value: U256, amount: U256) -> (U256, bool) {
    match value.checked_sub(amount) {
        Some(result) => (result, false),
        None => (U256::zero(), true),
    }
}

/// `value - old + new`, clamped at zero.
///
/// The addition happens first so an intermediate underflow never clamps a
/// result that ends up non-negative.
pub fn clamped_rebase(value: U256, old: U256, new: U256) -> (U256, bool) {
    clamped_sub(value.saturating_add(new), old)
}

/// `target += amount`, saturating
pub fn credit(target: &mut U256, amount: U256) {
    *target = target.saturating_add(amount);
}

/// `target -= amount`, clamped at zero. Returns true when the clamp fired.
pub fn debit(target: &mut U256, amount: U256) -> bool {
    let (result, clamped) = clamped_sub(*target, amount);
    *target = result;
    clamped
}

/// `amount * numerator / denominator`, zero when `denominator` is zero
pub fn mul_div(amount: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::zero();
    }
    amount.saturating_mul(numerator) / denominator
}
