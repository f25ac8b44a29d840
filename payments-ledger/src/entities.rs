//! Persisted records
//!
//! Ids are immutable, every other field is mutable. Records are created
//! lazily on first reference and never deleted.

use crate::{
    aggregator::buckets::{date_string, week_number},
    ids::{self, EntityKey, EntityKind},
    store::Entity,
    types::{Address, Epoch, RailId, RailState, TxHash, U256},
};
use serde::{Deserialize, Serialize};

/// Payer or payee account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account address
    pub address: Address,
    /// Rails this account is payer or payee of
    pub total_rails: U256,
    /// Operator approvals granted by this account
    pub total_approvals: U256,
    /// Distinct tokens this account has deposited
    pub total_tokens: U256,
}

impl Account {
    /// Zeroed account
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_rails: U256::zero(),
            total_approvals: U256::zero(),
            total_tokens: U256::zero(),
        }
    }
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn key(&self) -> EntityKey {
        ids::account_key(&self.address)
    }
}

/// Rail operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Operator address
    pub address: Address,
    /// Rails created through this operator
    pub total_rails: U256,
    /// Approvals granted to this operator
    pub total_approvals: U256,
    /// Lifetime commission earned
    pub total_commission: U256,
}

impl Operator {
    /// Zeroed operator
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_rails: U256::zero(),
            total_approvals: U256::zero(),
            total_commission: U256::zero(),
        }
    }
}

impl Entity for Operator {
    const KIND: EntityKind = EntityKind::Operator;

    fn key(&self) -> EntityKey {
        ids::operator_key(&self.address)
    }
}

/// A payer's delegation of rate and lockup allowance to an operator
///
/// Usage fields are clamped at zero on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorApproval {
    /// Payer granting the allowance
    pub client: Address,
    /// Operator receiving it
    pub operator: Address,
    /// Token the allowance is denominated in
    pub token: Address,
    /// Approval flag
    pub is_approved: bool,
    /// Maximum aggregate payment rate
    pub rate_allowance: U256,
    /// Maximum aggregate lockup
    pub lockup_allowance: U256,
    /// Rate currently consumed by the operator's rails
    pub rate_usage: U256,
    /// Lockup currently consumed by the operator's rails
    pub lockup_usage: U256,
    /// Longest lockup period the operator may set
    pub max_lockup_period: U256,
}

impl OperatorApproval {
    /// New approval with zero usage
    pub fn new(client: Address, operator: Address, token: Address) -> Self {
        Self {
            client,
            operator,
            token,
            is_approved: false,
            rate_allowance: U256::zero(),
            lockup_allowance: U256::zero(),
            rate_usage: U256::zero(),
            lockup_usage: U256::zero(),
            max_lockup_period: U256::zero(),
        }
    }
}

impl Entity for OperatorApproval {
    const KIND: EntityKind = EntityKind::OperatorApproval;

    fn key(&self) -> EntityKey {
        ids::approval_key(&self.client, &self.operator, &self.token)
    }
}

/// Ledger-wide fund positions of one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token address
    pub address: Address,
    /// Funds held on behalf of users
    pub user_funds: U256,
    /// Lifetime deposits
    pub total_deposits: U256,
    /// Lifetime withdrawals
    pub total_withdrawals: U256,
    /// Lifetime settled amount
    pub total_settled_amount: U256,
    /// Lifetime operator commission
    pub operator_commission: U256,
}

impl Token {
    /// Zeroed token
    pub fn new(address: Address) -> Self {
        Self {
            address,
            user_funds: U256::zero(),
            total_deposits: U256::zero(),
            total_withdrawals: U256::zero(),
            total_settled_amount: U256::zero(),
            operator_commission: U256::zero(),
        }
    }
}

impl Entity for Token {
    const KIND: EntityKind = EntityKind::Token;

    fn key(&self) -> EntityKey {
        ids::token_key(&self.address)
    }
}

/// Per-account per-token balance and lockup position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    /// Owning account
    pub account: Address,
    /// Token
    pub token: Address,
    /// Available funds
    pub funds: U256,
    /// Lockup as of the last lockup settlement
    pub lockup_current: U256,
    /// Aggregate lockup accrual rate
    pub lockup_rate: U256,
    /// Epoch of the last lockup settlement
    pub lockup_last_settled_at: Epoch,
}

impl UserToken {
    /// Empty position
    pub fn new(account: Address, token: Address) -> Self {
        Self {
            account,
            token,
            funds: U256::zero(),
            lockup_current: U256::zero(),
            lockup_rate: U256::zero(),
            lockup_last_settled_at: 0,
        }
    }
}

impl Entity for UserToken {
    const KIND: EntityKind = EntityKind::UserToken;

    fn key(&self) -> EntityKey {
        ids::user_token_key(&self.account, &self.token)
    }
}

/// Payment rail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rail {
    /// Contract rail id
    pub rail_id: RailId,
    /// Paying account
    pub payer: Address,
    /// Receiving account
    pub payee: Address,
    /// Operator mediating the rail
    pub operator: Address,
    /// Payment token
    pub token: Address,
    /// Optional arbiter (validator); zero address when absent
    pub arbiter: Address,
    /// Recipient of the operator's commission
    pub service_fee_recipient: Address,
    /// Lifecycle state
    pub state: RailState,
    /// Payment per epoch
    pub payment_rate: U256,
    /// Fixed lockup component
    pub lockup_fixed: U256,
    /// Lockup period in epochs
    pub lockup_period: U256,
    /// Epoch settlement has reached
    pub settled_upto: Epoch,
    /// Final epoch once terminated
    pub end_epoch: Option<Epoch>,
    /// Operator commission, in basis points
    pub commission_rate_bps: U256,
    /// Lifetime gross settled
    pub total_settled_amount: U256,
    /// Lifetime paid to the payee
    pub total_net_payee_amount: U256,
    /// Lifetime operator commission
    pub total_commission: U256,
    /// Number of settlements
    pub total_settlements: U256,
    /// Number of rate modifications
    pub total_rate_changes: U256,
    /// Number of recorded rate-change segments
    pub rate_change_queue_len: u64,
    /// Creation block
    pub created_at: Epoch,
}

impl Rail {
    /// Key of this rail's most recent rate-change segment
    pub fn last_rate_change_key(&self) -> Option<EntityKey> {
        self.rate_change_queue_len
            .checked_sub(1)
            .map(|index| ids::rate_change_key(&self.rail_id, index))
    }

    /// Approval this rail draws its allowance from
    pub fn approval_key(&self) -> EntityKey {
        ids::approval_key(&self.payer, &self.operator, &self.token)
    }

    /// Payer's balance for the rail token
    pub fn payer_token_key(&self) -> EntityKey {
        ids::user_token_key(&self.payer, &self.token)
    }

    /// Payee's balance for the rail token
    pub fn payee_token_key(&self) -> EntityKey {
        ids::user_token_key(&self.payee, &self.token)
    }
}

impl Entity for Rail {
    const KIND: EntityKind = EntityKind::Rail;

    fn key(&self) -> EntityKey {
        ids::rail_key(&self.rail_id)
    }
}

/// One segment of a rail's payment-rate history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateChangeEntry {
    /// Rail
    pub rail_id: RailId,
    /// Position in the rail's history
    pub index: u64,
    /// First epoch covered
    pub from_epoch: Epoch,
    /// Epoch the rate stopped applying
    pub until_epoch: Epoch,
    /// Rate in force over `[from_epoch, until_epoch)`: the rate before the
    /// change at `until_epoch`, not the one it changed to
    pub rate: U256,
}

impl RateChangeEntry {
    /// Amount owed over the whole segment
    pub fn amount(&self) -> U256 {
        let span = self.until_epoch.saturating_sub(self.from_epoch);
        self.rate.saturating_mul(U256::from(span))
    }
}

impl Entity for RateChangeEntry {
    const KIND: EntityKind = EntityKind::RateChangeEntry;

    fn key(&self) -> EntityKey {
        ids::rate_change_key(&self.rail_id, self.index)
    }
}

/// Immutable record of one settlement event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Emitting transaction
    pub tx_hash: TxHash,
    /// Log index within the block
    pub log_index: u64,
    /// Settled rail
    pub rail_id: RailId,
    /// Gross amount taken from the payer
    pub total_settled_amount: U256,
    /// Amount paid to the payee
    pub total_net_payee_amount: U256,
    /// Operator commission
    pub operator_commission: U256,
    /// Network fee burned
    pub network_fee: U256,
    /// Epoch settlement reached
    pub settled_upto: Epoch,
    /// Block of the event
    pub block_number: Epoch,
}

impl Entity for Settlement {
    const KIND: EntityKind = EntityKind::Settlement;

    fn key(&self) -> EntityKey {
        ids::settlement_key(&self.tx_hash, self.log_index)
    }
}

/// Network rollup for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetric {
    /// Day start (unix seconds)
    pub timestamp: u64,
    /// `YYYY-MM-DD`
    pub date: String,
    pub fil_burned: U256,
    pub rails_created: U256,
    pub total_rail_settlements: U256,
    pub rails_terminated: U256,
    pub rails_finalized: U256,
    pub active_rails_count: U256,
    pub unique_payers: U256,
    pub unique_payees: U256,
    pub unique_operators: U256,
    pub new_accounts: U256,
}

impl DailyMetric {
    /// Zeroed bucket starting at `day_start`
    pub fn empty(day_start: u64) -> Self {
        Self {
            timestamp: day_start,
            date: date_string(day_start),
            fil_burned: U256::zero(),
            rails_created: U256::zero(),
            total_rail_settlements: U256::zero(),
            rails_terminated: U256::zero(),
            rails_finalized: U256::zero(),
            active_rails_count: U256::zero(),
            unique_payers: U256::zero(),
            unique_payees: U256::zero(),
            unique_operators: U256::zero(),
            new_accounts: U256::zero(),
        }
    }
}

impl Entity for DailyMetric {
    const KIND: EntityKind = EntityKind::DailyMetric;

    fn key(&self) -> EntityKey {
        ids::daily_metric_key(self.timestamp)
    }
}

/// Network rollup for one week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyMetric {
    /// Week start (unix seconds)
    pub timestamp: u64,
    /// Week number since the unix epoch, starting at 1
    pub week: u64,
    pub fil_burned: U256,
    pub rails_created: U256,
    pub total_rail_settlements: U256,
    pub rails_terminated: U256,
    pub rails_finalized: U256,
    pub active_rails_count: U256,
    pub unique_payers: U256,
    pub unique_payees: U256,
    pub unique_operators: U256,
    pub new_accounts: U256,
}

impl WeeklyMetric {
    /// Zeroed bucket starting at `week_start`
    pub fn empty(week_start: u64) -> Self {
        Self {
            timestamp: week_start,
            week: week_number(week_start),
            fil_burned: U256::zero(),
            rails_created: U256::zero(),
            total_rail_settlements: U256::zero(),
            rails_terminated: U256::zero(),
            rails_finalized: U256::zero(),
            active_rails_count: U256::zero(),
            unique_payers: U256::zero(),
            unique_payees: U256::zero(),
            unique_operators: U256::zero(),
            new_accounts: U256::zero(),
        }
    }
}

impl Entity for WeeklyMetric {
    const KIND: EntityKind = EntityKind::WeeklyMetric;

    fn key(&self) -> EntityKey {
        ids::weekly_metric_key(self.timestamp)
    }
}

/// Per-token rollup for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetric {
    pub token: Address,
    pub timestamp: u64,
    pub date: String,
    pub volume: U256,
    pub deposit: U256,
    pub withdrawal: U256,
    pub settled_amount: U256,
    pub commission_paid: U256,
    pub active_rails_count: U256,
    pub unique_holders: U256,
    /// Kept for schema compatibility; no event feeds it, so it stays zero
    pub total_locked: U256,
}

impl TokenMetric {
    /// Zeroed bucket
    pub fn empty(token: Address, day_start: u64) -> Self {
        Self {
            token,
            timestamp: day_start,
            date: date_string(day_start),
            volume: U256::zero(),
            deposit: U256::zero(),
            withdrawal: U256::zero(),
            settled_amount: U256::zero(),
            commission_paid: U256::zero(),
            active_rails_count: U256::zero(),
            unique_holders: U256::zero(),
            total_locked: U256::zero(),
        }
    }
}

impl Entity for TokenMetric {
    const KIND: EntityKind = EntityKind::TokenMetric;

    fn key(&self) -> EntityKey {
        ids::token_metric_key(&self.token, self.timestamp)
    }
}

/// Per-operator rollup for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMetric {
    pub operator: Address,
    pub timestamp: u64,
    pub date: String,
    pub volume: U256,
    pub settled_amount: U256,
    pub commission_earned: U256,
    pub rails_created: U256,
    pub settlements_processed: U256,
    pub unique_clients: U256,
    pub total_approvals: U256,
}

impl OperatorMetric {
    /// Zeroed bucket
    pub fn empty(operator: Address, day_start: u64) -> Self {
        Self {
            operator,
            timestamp: day_start,
            date: date_string(day_start),
            volume: U256::zero(),
            settled_amount: U256::zero(),
            commission_earned: U256::zero(),
            rails_created: U256::zero(),
            settlements_processed: U256::zero(),
            unique_clients: U256::zero(),
            total_approvals: U256::zero(),
        }
    }
}

impl Entity for OperatorMetric {
    const KIND: EntityKind = EntityKind::OperatorMetric;

    fn key(&self) -> EntityKey {
        ids::operator_metric_key(&self.operator, self.timestamp)
    }
}

/// Network-wide lifetime totals (singleton aggregate root)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentsMetric {
    pub total_rails: U256,
    pub total_operators: U256,
    pub total_tokens: U256,
    pub total_accounts: U256,
    pub total_fil_burned: U256,
    pub total_zero_rate_rails: U256,
    pub total_active_rails: U256,
    pub total_terminated_rails: U256,
    pub total_finalized_rails: U256,
    pub unique_payers: U256,
    pub unique_payees: U256,
}

impl PaymentsMetric {
    /// Rails accounted for across all lifecycle states
    pub fn rails_by_state(&self) -> U256 {
        self.total_zero_rate_rails
            .saturating_add(self.total_active_rails)
            .saturating_add(self.total_terminated_rails)
            .saturating_add(self.total_finalized_rails)
    }

    /// Every created rail sits in exactly one state bucket
    pub fn is_reconciled(&self) -> bool {
        self.rails_by_state() == self.total_rails
    }
}

impl Entity for PaymentsMetric {
    const KIND: EntityKind = EntityKind::PaymentsMetric;

    fn key(&self) -> EntityKey {
        ids::payments_metric_key()
    }
}

/// Position of the last applied event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    /// Block of the last applied event
    pub block_number: Epoch,
    /// Log index of the last applied event
    pub log_index: u64,
}

impl Entity for Cursor {
    const KIND: EntityKind = EntityKind::Cursor;

    fn key(&self) -> EntityKey {
        ids::cursor_key()
    }
}
