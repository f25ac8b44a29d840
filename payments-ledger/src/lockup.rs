//! Lockup and rate-change accounting
//!
//! Lockup of a live rail is `fixed + rate × period`; once terminated only the
//! fixed part remains. Approval usages move by the difference between the old
//! and new lockup and never go below zero.
//!
//! The rate-change history of a rail is a list of `[from, until)` segments,
//! epoch ordered and non-overlapping, each carrying the rate that applied
//! over it. Settlement integrates `Σ rate × (until − from)` over the list.

use crate::{
    entities::{OperatorApproval, Rail, RateChangeEntry, UserToken},
    error::Result,
    ids,
    store::UnitOfWork,
    types::{clamped_rebase, clamped_sub, mul_div, Epoch, RailId, COMMISSION_MAX_BPS, U256},
};
use tracing::{debug, warn};

/// Lockup a rail holds against its payer
pub fn effective_lockup(fixed: U256, rate: U256, period: U256, terminated: bool) -> U256 {
    if terminated {
        fixed
    } else {
        fixed.saturating_add(rate.saturating_mul(period))
    }
}

/// `lockupUsage := max(0, lockupUsage − old + new)`. Returns true when the
/// result was clamped.
pub fn update_operator_lockup(approval: &mut OperatorApproval, old: U256, new: U256) -> bool {
    let (usage, clamped) = clamped_rebase(approval.lockup_usage, old, new);
    if clamped {
        warn!(
            client = ?approval.client,
            operator = ?approval.operator,
            usage = %approval.lockup_usage,
            old = %old,
            new = %new,
            "Lockup usage clamped at zero"
        );
    }
    approval.lockup_usage = usage;
    clamped
}

/// `rateUsage := max(0, rateUsage − old + new)`, skipped for terminated rails.
/// Returns true when the result was clamped.
pub fn update_rate_usage(
    approval: &mut OperatorApproval,
    old_rate: U256,
    new_rate: U256,
    terminated: bool,
) -> bool {
    if terminated {
        return false;
    }
    let (usage, clamped) = clamped_rebase(approval.rate_usage, old_rate, new_rate);
    if clamped {
        warn!(
            client = ?approval.client,
            operator = ?approval.operator,
            usage = %approval.rate_usage,
            old_rate = %old_rate,
            new_rate = %new_rate,
            "Rate usage clamped at zero"
        );
    }
    approval.rate_usage = usage;
    clamped
}

/// Epochs of lockup still ahead of a rail whose rate changes at `epoch`
///
/// Terminated rails lock until `endEpoch`. Live rails lock for their period
/// minus what the payer has already settled past; without a payer position
/// there is nothing to move.
pub fn remaining_lockup_period(rail: &Rail, epoch: Epoch, payer: Option<&UserToken>) -> U256 {
    if rail.state.is_terminal() {
        let end = rail.end_epoch.unwrap_or(epoch);
        return U256::from(end.saturating_sub(epoch));
    }

    match payer {
        Some(payer) => {
            let elapsed = epoch.saturating_sub(payer.lockup_last_settled_at);
            rail.lockup_period.saturating_sub(U256::from(elapsed))
        }
        None => U256::zero(),
    }
}

/// Gross amount taken from the payer for a one-time payment, recovered from
/// the operator's commission. Zero when the rail charges no commission.
pub fn one_time_payment_gross(operator_commission: U256, commission_rate_bps: U256) -> U256 {
    mul_div(
        operator_commission,
        U256::from(COMMISSION_MAX_BPS),
        commission_rate_bps,
    )
}

/// Release `amount` from both the allowance and the usage of an approval.
/// Returns the number of clamps.
pub fn release_one_time_payment(approval: &mut OperatorApproval, amount: U256) -> u32 {
    let (allowance, allowance_clamped) = clamped_sub(approval.lockup_allowance, amount);
    let (usage, usage_clamped) = clamped_sub(approval.lockup_usage, amount);
    approval.lockup_allowance = allowance;
    approval.lockup_usage = usage;
    if allowance_clamped || usage_clamped {
        warn!(
            client = ?approval.client,
            operator = ?approval.operator,
            amount = %amount,
            "One-time payment exceeded approval lockup, clamped at zero"
        );
    }
    allowance_clamped as u32 + usage_clamped as u32
}

/// What a rate modification did to the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateHistoryUpdate {
    /// Rail had nothing to settle; `settledUpto` moved to the epoch
    FastForwarded,
    /// New segment appended
    Appended(RateChangeEntry),
    /// Same epoch as the last segment's end; folded into it
    Coalesced,
    /// Rate did not change
    Unchanged,
}

/// Record a rate change of `rail` at `epoch` from `old_rate` to `new_rate`
pub fn record_rate_change(
    uow: &mut UnitOfWork<'_>,
    rail: &mut Rail,
    epoch: Epoch,
    old_rate: U256,
    new_rate: U256,
) -> Result<RateHistoryUpdate> {
    let last = match rail.last_rate_change_key() {
        Some(key) => Some(uow.require::<RateChangeEntry>(&key, rail.rail_id)?),
        None => None,
    };

    if last.is_none() && old_rate.is_zero() {
        rail.settled_upto = epoch;
        debug!(rail_id = %rail.rail_id, epoch, "Rail fast-forwarded, no rate history");
        return Ok(RateHistoryUpdate::FastForwarded);
    }

    if old_rate == new_rate {
        return Ok(RateHistoryUpdate::Unchanged);
    }

    let from_epoch = match &last {
        Some(last) if last.until_epoch == epoch => return Ok(RateHistoryUpdate::Coalesced),
        Some(last) => last.until_epoch,
        None => rail.settled_upto,
    };

    let entry = RateChangeEntry {
        rail_id: rail.rail_id,
        index: rail.rate_change_queue_len,
        from_epoch,
        until_epoch: epoch,
        rate: old_rate,
    };
    uow.save(&entry)?;
    rail.rate_change_queue_len += 1;

    debug!(
        rail_id = %rail.rail_id,
        index = entry.index,
        from = entry.from_epoch,
        until = entry.until_epoch,
        rate = %entry.rate,
        "Rate change recorded"
    );

    Ok(RateHistoryUpdate::Appended(entry))
}

/// Full rate-change history of a rail, oldest first
pub fn rate_history(uow: &UnitOfWork<'_>, rail_id: &RailId) -> Result<Vec<RateChangeEntry>> {
    uow.scan(&ids::rate_change_prefix(rail_id))
}

/// Amount owed across a history, `Σ rate × (until − from)`
pub fn history_amount(history: &[RateChangeEntry]) -> U256 {
    history
        .iter()
        .fold(U256::zero(), |total, entry| total.saturating_add(entry.amount()))
}
