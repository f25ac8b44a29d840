//! Ledger mutation to metric delta
//!
//! Pure functions; nothing here touches the store.

use crate::{
    ledger::LedgerMutation,
    types::{Address, RailState, U256},
};

/// Which rollup a delta lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricTarget {
    /// Network daily bucket
    Daily,
    /// Network weekly bucket
    Weekly,
    /// Daily bucket of a token
    Token(Address),
    /// Daily bucket of an operator
    Operator(Address),
    /// Network-wide totals
    Network,
}

/// Counter field of a rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    // Daily / weekly
    FilBurned,
    RailsCreated,
    TotalRailSettlements,
    RailsTerminated,
    RailsFinalized,
    ActiveRailsCount,
    UniquePayers,
    UniquePayees,
    UniqueOperators,
    NewAccounts,
    // Token / operator
    Volume,
    Deposit,
    Withdrawal,
    SettledAmount,
    CommissionPaid,
    UniqueHolders,
    CommissionEarned,
    SettlementsProcessed,
    UniqueClients,
    TotalApprovals,
    // Network
    TotalRails,
    TotalOperators,
    TotalTokens,
    TotalAccounts,
    TotalFilBurned,
    TotalZeroRateRails,
    TotalActiveRails,
    TotalTerminatedRails,
    TotalFinalizedRails,
}

/// Direction and size of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Add(U256),
    /// Clamped at zero when applied
    Sub(U256),
}

/// One counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDelta {
    pub target: MetricTarget,
    pub counter: Counter,
    pub change: Change,
}

impl MetricDelta {
    pub fn add(target: MetricTarget, counter: Counter, amount: U256) -> Self {
        Self {
            target,
            counter,
            change: Change::Add(amount),
        }
    }

    pub fn sub(target: MetricTarget, counter: Counter, amount: U256) -> Self {
        Self {
            target,
            counter,
            change: Change::Sub(amount),
        }
    }

    pub fn increment(target: MetricTarget, counter: Counter) -> Self {
        Self::add(target, counter, U256::one())
    }
}

fn count(flags: &[bool]) -> U256 {
    U256::from(flags.iter().filter(|flag| **flag).count())
}

/// Deltas produced by one ledger mutation
pub fn collect(mutation: &LedgerMutation) -> Vec<MetricDelta> {
    match mutation {
        LedgerMutation::RailCreated {
            rail,
            is_new_payer,
            is_new_payee,
            is_new_operator,
        } => rail_created(
            &rail.token,
            &rail.operator,
            *is_new_payer,
            *is_new_payee,
            *is_new_operator,
        ),
        LedgerMutation::StateChanged { from, to, .. } => state_changed(*from, *to),
        LedgerMutation::Settled {
            rail,
            total_settled_amount,
            total_net_payee_amount,
            operator_commission,
            network_fee,
        } => settled(
            &rail.token,
            &rail.operator,
            *total_settled_amount,
            *total_net_payee_amount,
            *operator_commission,
            *network_fee,
        ),
        LedgerMutation::TokenActivity {
            token,
            amount,
            is_deposit,
            is_new_account,
            is_new_token,
            ..
        } => token_activity(token, *amount, *is_deposit, *is_new_account, *is_new_token),
        LedgerMutation::OperatorApproval {
            operator,
            is_new_approval,
            is_new_operator,
            ..
        } => operator_approval(operator, *is_new_approval, *is_new_operator),
    }
}

/// Rail creation
pub fn rail_created(
    token: &Address,
    operator: &Address,
    is_new_payer: bool,
    is_new_payee: bool,
    is_new_operator: bool,
) -> Vec<MetricDelta> {
    use Counter::*;
    use MetricTarget::*;

    let new_accounts = count(&[is_new_payer, is_new_payee]);
    let mut deltas = Vec::with_capacity(20);

    for bucket in [Daily, Weekly] {
        deltas.push(MetricDelta::increment(bucket, RailsCreated));
        deltas.push(MetricDelta::add(bucket, NewAccounts, new_accounts));
        deltas.push(MetricDelta::add(bucket, UniquePayers, count(&[is_new_payer])));
        deltas.push(MetricDelta::add(bucket, UniquePayees, count(&[is_new_payee])));
        deltas.push(MetricDelta::add(bucket, UniqueOperators, count(&[is_new_operator])));
    }

    deltas.push(MetricDelta::increment(Token(*token), ActiveRailsCount));

    deltas.push(MetricDelta::increment(Operator(*operator), RailsCreated));
    deltas.push(MetricDelta::add(Operator(*operator), UniqueClients, new_accounts));

    deltas.push(MetricDelta::increment(Network, TotalRails));
    deltas.push(MetricDelta::increment(Network, TotalZeroRateRails));
    deltas.push(MetricDelta::add(Network, TotalAccounts, new_accounts));
    deltas.push(MetricDelta::add(Network, UniquePayers, count(&[is_new_payer])));
    deltas.push(MetricDelta::add(Network, UniquePayees, count(&[is_new_payee])));
    deltas.push(MetricDelta::add(Network, TotalOperators, count(&[is_new_operator])));

    deltas
}

/// Rail settlement
pub fn settled(
    token: &Address,
    operator: &Address,
    total_settled_amount: U256,
    total_net_payee_amount: U256,
    operator_commission: U256,
    network_fee: U256,
) -> Vec<MetricDelta> {
    use Counter::*;
    use MetricTarget::*;

    let mut deltas = Vec::with_capacity(12);

    for bucket in [Daily, Weekly] {
        deltas.push(MetricDelta::increment(bucket, TotalRailSettlements));
        deltas.push(MetricDelta::add(bucket, FilBurned, network_fee));
    }

    let operator = Operator(*operator);
    deltas.push(MetricDelta::add(operator, Volume, total_settled_amount));
    deltas.push(MetricDelta::add(operator, SettledAmount, total_net_payee_amount));
    deltas.push(MetricDelta::add(operator, CommissionEarned, operator_commission));
    deltas.push(MetricDelta::increment(operator, SettlementsProcessed));

    let token = Token(*token);
    deltas.push(MetricDelta::add(token, Volume, total_settled_amount));
    deltas.push(MetricDelta::add(token, SettledAmount, total_net_payee_amount));
    deltas.push(MetricDelta::add(token, CommissionPaid, operator_commission));

    deltas.push(MetricDelta::add(Network, TotalFilBurned, network_fee));

    deltas
}

/// Network total holding rails in `state`
pub fn network_state_counter(state: RailState) -> Counter {
    match state {
        RailState::ZeroRate => Counter::TotalZeroRateRails,
        RailState::Active => Counter::TotalActiveRails,
        RailState::Terminated => Counter::TotalTerminatedRails,
        RailState::Finalized => Counter::TotalFinalizedRails,
    }
}

/// Rail lifecycle transition. One rail leaves the previous state's network
/// total and enters the new one, so the totals always sum to `totalRails`.
pub fn state_changed(from: RailState, to: RailState) -> Vec<MetricDelta> {
    use MetricTarget::*;

    if from == to {
        return Vec::new();
    }

    let mut deltas = Vec::with_capacity(4);

    let bucket_counter = match to {
        RailState::Terminated => Some(Counter::RailsTerminated),
        RailState::Finalized => Some(Counter::RailsFinalized),
        RailState::Active => Some(Counter::ActiveRailsCount),
        RailState::ZeroRate => None,
    };
    if let Some(counter) = bucket_counter {
        deltas.push(MetricDelta::increment(Daily, counter));
        deltas.push(MetricDelta::increment(Weekly, counter));
    }

    deltas.push(MetricDelta::sub(Network, network_state_counter(from), U256::one()));
    deltas.push(MetricDelta::increment(Network, network_state_counter(to)));

    deltas
}

/// Deposit or withdrawal
pub fn token_activity(
    token: &Address,
    amount: U256,
    is_deposit: bool,
    is_new_account: bool,
    is_new_token: bool,
) -> Vec<MetricDelta> {
    use Counter::*;
    use MetricTarget::*;

    let token = Token(*token);
    let mut deltas = vec![MetricDelta::add(token, Volume, amount)];
    deltas.push(MetricDelta::add(
        token,
        if is_deposit { Deposit } else { Withdrawal },
        amount,
    ));

    if is_new_account {
        deltas.push(MetricDelta::increment(token, UniqueHolders));
        deltas.push(MetricDelta::increment(Network, TotalAccounts));
    }
    if is_new_token {
        deltas.push(MetricDelta::increment(Network, TotalTokens));
    }

    deltas
}

/// Operator approval set
pub fn operator_approval(
    operator: &Address,
    is_new_approval: bool,
    is_new_operator: bool,
) -> Vec<MetricDelta> {
    let mut deltas = Vec::new();
    if is_new_approval {
        deltas.push(MetricDelta::increment(
            MetricTarget::Operator(*operator),
            Counter::TotalApprovals,
        ));
    }
    if is_new_operator {
        deltas.push(MetricDelta::increment(
            MetricTarget::Network,
            Counter::TotalOperators,
        ));
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(deltas: &[MetricDelta], target: MetricTarget, counter: Counter) -> i64 {
        deltas
            .iter()
            .filter(|delta| delta.target == target && delta.counter == counter)
            .map(|delta| match delta.change {
                Change::Add(amount) => amount.as_u64() as i64,
                Change::Sub(amount) => -(amount.as_u64() as i64),
            })
            .sum()
    }

    #[test]
    fn test_rail_created_counts_new_parties() {
        let deltas = rail_created(
            &Address::repeat_byte(4),
            &Address::repeat_byte(3),
            true,
            false,
            true,
        );
        assert_eq!(total(&deltas, MetricTarget::Daily, Counter::NewAccounts), 1);
        assert_eq!(total(&deltas, MetricTarget::Weekly, Counter::UniquePayers), 1);
        assert_eq!(total(&deltas, MetricTarget::Weekly, Counter::UniquePayees), 0);
        assert_eq!(total(&deltas, MetricTarget::Network, Counter::TotalZeroRateRails), 1);
        assert_eq!(total(&deltas, MetricTarget::Network, Counter::TotalOperators), 1);
        assert_eq!(
            total(
                &deltas,
                MetricTarget::Operator(Address::repeat_byte(3)),
                Counter::UniqueClients
            ),
            1
        );
    }

    #[test]
    fn test_state_change_moves_one_rail() {
        for (from, to) in [
            (RailState::ZeroRate, RailState::Active),
            (RailState::ZeroRate, RailState::Terminated),
            (RailState::Active, RailState::Terminated),
            (RailState::Terminated, RailState::Finalized),
        ] {
            let deltas = state_changed(from, to);
            assert_eq!(total(&deltas, MetricTarget::Network, network_state_counter(from)), -1);
            assert_eq!(total(&deltas, MetricTarget::Network, network_state_counter(to)), 1);
        }
    }

    #[test]
    fn test_same_state_is_noop() {
        assert!(state_changed(RailState::Active, RailState::Active).is_empty());
    }

    #[test]
    fn test_settled_routes_amounts() {
        let deltas = settled(
            &Address::repeat_byte(4),
            &Address::repeat_byte(3),
            U256::from(500),
            U256::from(450),
            U256::from(50),
            U256::from(5),
        );
        assert_eq!(total(&deltas, MetricTarget::Daily, Counter::FilBurned), 5);
        assert_eq!(total(&deltas, MetricTarget::Network, Counter::TotalFilBurned), 5);
        assert_eq!(
            total(&deltas, MetricTarget::Token(Address::repeat_byte(4)), Counter::CommissionPaid),
            50
        );
        assert_eq!(
            total(&deltas, MetricTarget::Operator(Address::repeat_byte(3)), Counter::Volume),
            500
        );
    }

    #[test]
    fn test_existing_approval_touches_nothing() {
        assert!(operator_approval(&Address::repeat_byte(3), false, false).is_empty());
    }
}
