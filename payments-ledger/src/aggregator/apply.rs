//! Applies metric deltas to their buckets

use super::{
    buckets,
    collectors::{Change, Counter, MetricDelta, MetricTarget},
};
use crate::{
    entities::{DailyMetric, OperatorMetric, PaymentsMetric, TokenMetric, WeeklyMetric},
    error::{Error, Result},
    store::{Entity, UnitOfWork},
    types::{credit, debit, U256},
};
use tracing::warn;

/// A rollup with addressable counters
trait Counters: Entity {
    fn counter_mut(&mut self, counter: Counter) -> Option<&mut U256>;
}

macro_rules! network_bucket_counters {
    ($ty:ty) => {
        impl Counters for $ty {
            fn counter_mut(&mut self, counter: Counter) -> Option<&mut U256> {
                Some(match counter {
                    Counter::FilBurned => &mut self.fil_burned,
                    Counter::RailsCreated => &mut self.rails_created,
                    Counter::TotalRailSettlements => &mut self.total_rail_settlements,
                    Counter::RailsTerminated => &mut self.rails_terminated,
                    Counter::RailsFinalized => &mut self.rails_finalized,
                    Counter::ActiveRailsCount => &mut self.active_rails_count,
                    Counter::UniquePayers => &mut self.unique_payers,
                    Counter::UniquePayees => &mut self.unique_payees,
                    Counter::UniqueOperators => &mut self.unique_operators,
                    Counter::NewAccounts => &mut self.new_accounts,
                    _ => return None,
                })
            }
        }
    };
}

network_bucket_counters!(DailyMetric);
network_bucket_counters!(WeeklyMetric);

impl Counters for TokenMetric {
    fn counter_mut(&mut self, counter: Counter) -> Option<&mut U256> {
        Some(match counter {
            Counter::Volume => &mut self.volume,
            Counter::Deposit => &mut self.deposit,
            Counter::Withdrawal => &mut self.withdrawal,
            Counter::SettledAmount => &mut self.settled_amount,
            Counter::CommissionPaid => &mut self.commission_paid,
            Counter::ActiveRailsCount => &mut self.active_rails_count,
            Counter::UniqueHolders => &mut self.unique_holders,
            _ => return None,
        })
    }
}

impl Counters for OperatorMetric {
    fn counter_mut(&mut self, counter: Counter) -> Option<&mut U256> {
        Some(match counter {
            Counter::Volume => &mut self.volume,
            Counter::SettledAmount => &mut self.settled_amount,
            Counter::CommissionEarned => &mut self.commission_earned,
            Counter::RailsCreated => &mut self.rails_created,
            Counter::SettlementsProcessed => &mut self.settlements_processed,
            Counter::UniqueClients => &mut self.unique_clients,
            Counter::TotalApprovals => &mut self.total_approvals,
            _ => return None,
        })
    }
}

impl Counters for PaymentsMetric {
    fn counter_mut(&mut self, counter: Counter) -> Option<&mut U256> {
        Some(match counter {
            Counter::TotalRails => &mut self.total_rails,
            Counter::TotalOperators => &mut self.total_operators,
            Counter::TotalTokens => &mut self.total_tokens,
            Counter::TotalAccounts => &mut self.total_accounts,
            Counter::TotalFilBurned => &mut self.total_fil_burned,
            Counter::TotalZeroRateRails => &mut self.total_zero_rate_rails,
            Counter::TotalActiveRails => &mut self.total_active_rails,
            Counter::TotalTerminatedRails => &mut self.total_terminated_rails,
            Counter::TotalFinalizedRails => &mut self.total_finalized_rails,
            Counter::UniquePayers => &mut self.unique_payers,
            Counter::UniquePayees => &mut self.unique_payees,
            _ => return None,
        })
    }
}

/// Returns true when a decrement clamped
fn apply_change<M: Counters>(metric: &mut M, delta: &MetricDelta) -> Result<bool> {
    let value = metric.counter_mut(delta.counter).ok_or_else(|| {
        Error::Other(format!(
            "{:?} has no counter {:?}",
            delta.target, delta.counter
        ))
    })?;

    Ok(match delta.change {
        Change::Add(amount) => {
            credit(value, amount);
            false
        }
        Change::Sub(amount) => {
            let clamped = debit(value, amount);
            if clamped {
                warn!(
                    target_metric = ?delta.target,
                    counter = ?delta.counter,
                    amount = %amount,
                    "Metric decrement clamped at zero"
                );
            }
            clamped
        }
    })
}

fn update<M: Counters>(uow: &mut UnitOfWork<'_>, mut metric: M, delta: &MetricDelta) -> Result<bool> {
    let clamped = apply_change(&mut metric, delta)?;
    uow.save(&metric)?;
    Ok(clamped)
}

/// Apply `deltas` to the buckets containing `timestamp`. Returns the number
/// of clamped decrements.
pub fn apply_deltas(uow: &mut UnitOfWork<'_>, timestamp: u64, deltas: &[MetricDelta]) -> Result<u32> {
    let mut clamps = 0;

    for delta in deltas {
        let clamped = match delta.target {
            MetricTarget::Daily => {
                let metric = buckets::load_or_create_daily_metric(uow, timestamp)?;
                update(uow, metric, delta)?
            }
            MetricTarget::Weekly => {
                let metric = buckets::load_or_create_weekly_metric(uow, timestamp)?;
                update(uow, metric, delta)?
            }
            MetricTarget::Token(token) => {
                let metric = buckets::load_or_create_token_metric(uow, &token, timestamp)?;
                update(uow, metric, delta)?
            }
            MetricTarget::Operator(operator) => {
                let metric = buckets::load_or_create_operator_metric(uow, &operator, timestamp)?;
                update(uow, metric, delta)?
            }
            MetricTarget::Network => {
                let metric = buckets::load_or_create_payments_metric(uow)?;
                update(uow, metric, delta)?
            }
        };
        clamps += clamped as u32;
    }

    Ok(clamps)
}
