//! Rail ledger
//!
//! Authoritative state of rails, accounts, operators, approvals, tokens and
//! per-account balances. Each handler reads and writes only through the
//! event's [`UnitOfWork`] and reports what happened as [`LedgerMutation`]s,
//! which the metrics aggregator turns into rollup updates.
//!
//! A missing primary reference (the rail, or the balance a withdrawal draws
//! from) fails the handler with a skippable error. Missing secondary
//! references only drop their own sub-effect.

mod accounts;
mod rails;

use crate::{
    entities::Rail,
    error::Result,
    events::{EventMeta, PaymentsEvent},
    store::UnitOfWork,
    types::{Address, Epoch, RailState, U256},
};
use std::sync::Arc;

/// Reads the contract's per-settlement network fee
pub trait NetworkFeeSource: Send + Sync {
    /// Fee in effect at `block_number`; `None` when the read failed
    fn network_fee(&self, block_number: Epoch) -> Option<U256>;
}

/// Network fee that never changes
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedNetworkFee(pub U256);

impl NetworkFeeSource for FixedNetworkFee {
    fn network_fee(&self, _block_number: Epoch) -> Option<U256> {
        Some(self.0)
    }
}

/// What a handler changed, as seen by the metrics aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerMutation {
    /// A rail was created
    RailCreated {
        rail: Rail,
        is_new_payer: bool,
        is_new_payee: bool,
        is_new_operator: bool,
    },
    /// A rail moved between lifecycle states
    StateChanged {
        rail: Rail,
        from: RailState,
        to: RailState,
    },
    /// A rail was settled
    Settled {
        rail: Rail,
        total_settled_amount: U256,
        total_net_payee_amount: U256,
        operator_commission: U256,
        network_fee: U256,
    },
    /// Funds entered or left the contract
    TokenActivity {
        token: Address,
        account: Address,
        amount: U256,
        is_deposit: bool,
        is_new_account: bool,
        is_new_token: bool,
    },
    /// A payer's operator approval was set
    OperatorApproval {
        operator: Address,
        client: Address,
        is_new_approval: bool,
        is_new_operator: bool,
    },
}

/// Output of one handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerEffects {
    /// Mutations for the aggregator, in order
    pub mutations: Vec<LedgerMutation>,
    /// Number of values clamped at zero
    pub clamps: u32,
}

impl LedgerEffects {
    fn push(&mut self, mutation: LedgerMutation) {
        self.mutations.push(mutation);
    }

    fn clamp(&mut self, fired: bool) {
        self.clamps += fired as u32;
    }
}

/// Applies payments events to ledger entities
#[derive(Clone)]
pub struct RailLedger {
    fee_source: Arc<dyn NetworkFeeSource>,
}

impl RailLedger {
    /// Create a ledger reading network fees from `fee_source`
    pub fn new(fee_source: Arc<dyn NetworkFeeSource>) -> Self {
        Self { fee_source }
    }

    /// Ledger with a constant network fee
    pub fn with_fixed_fee(fee: U256) -> Self {
        Self::new(Arc::new(FixedNetworkFee(fee)))
    }

    /// Apply one event
    pub fn apply(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        event: &PaymentsEvent,
    ) -> Result<LedgerEffects> {
        let mut effects = LedgerEffects::default();

        match event {
            PaymentsEvent::RailCreated {
                rail_id,
                payer,
                payee,
                arbiter,
                token,
                operator,
                commission_rate_bps,
                service_fee_recipient,
            } => self.rail_created(
                uow,
                meta,
                rails::NewRail {
                    rail_id: *rail_id,
                    payer: *payer,
                    payee: *payee,
                    arbiter: *arbiter,
                    token: *token,
                    operator: *operator,
                    commission_rate_bps: *commission_rate_bps,
                    service_fee_recipient: *service_fee_recipient,
                },
                &mut effects,
            )?,
            PaymentsEvent::RailRateModified {
                rail_id,
                old_rate,
                new_rate,
            } => self.rail_rate_modified(uow, meta, rail_id, *old_rate, *new_rate, &mut effects)?,
            PaymentsEvent::RailLockupModified {
                rail_id,
                old_lockup_period,
                new_lockup_period,
                old_lockup_fixed,
                new_lockup_fixed,
            } => self.rail_lockup_modified(
                uow,
                rail_id,
                (*old_lockup_fixed, *old_lockup_period),
                (*new_lockup_fixed, *new_lockup_period),
                &mut effects,
            )?,
            PaymentsEvent::RailTerminated { rail_id, end_epoch } => {
                self.rail_terminated(uow, rail_id, *end_epoch, &mut effects)?
            }
            PaymentsEvent::RailSettled {
                rail_id,
                total_settled_amount,
                total_net_payee_amount,
                operator_commission,
                settled_up_to,
            } => self.rail_settled(
                uow,
                meta,
                rail_id,
                rails::SettledAmounts {
                    total_settled_amount: *total_settled_amount,
                    total_net_payee_amount: *total_net_payee_amount,
                    operator_commission: *operator_commission,
                    settled_up_to: *settled_up_to,
                },
                &mut effects,
            )?,
            PaymentsEvent::RailOneTimePaymentProcessed {
                rail_id,
                net_payee_amount,
                operator_commission,
            } => self.rail_one_time_payment(
                uow,
                rail_id,
                *net_payee_amount,
                *operator_commission,
                &mut effects,
            )?,
            PaymentsEvent::RailFinalized { rail_id } => {
                self.rail_finalized(uow, rail_id, &mut effects)?
            }
            PaymentsEvent::DepositRecorded {
                token,
                from,
                amount,
            } => self.deposit_recorded(uow, token, from, *amount, &mut effects)?,
            PaymentsEvent::WithdrawRecorded {
                token,
                from,
                amount,
            } => self.withdraw_recorded(uow, token, from, *amount, &mut effects)?,
            PaymentsEvent::AccountLockupSettled {
                owner,
                token,
                lockup_current,
                lockup_rate,
                lockup_last_settled_at,
            } => self.account_lockup_settled(
                uow,
                owner,
                token,
                *lockup_current,
                *lockup_rate,
                *lockup_last_settled_at,
            )?,
            PaymentsEvent::OperatorApprovalUpdated {
                client,
                operator,
                token,
                approved,
                rate_allowance,
                lockup_allowance,
                max_lockup_period,
            } => self.operator_approval_updated(
                uow,
                accounts::ApprovalUpdate {
                    client: *client,
                    operator: *operator,
                    token: *token,
                    approved: *approved,
                    rate_allowance: *rate_allowance,
                    lockup_allowance: *lockup_allowance,
                    max_lockup_period: *max_lockup_period,
                },
                &mut effects,
            )?,
        }

        Ok(effects)
    }
}

impl std::fmt::Debug for RailLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RailLedger").finish_non_exhaustive()
    }
}
