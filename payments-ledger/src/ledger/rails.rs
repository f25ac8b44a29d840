//! Rail lifecycle handlers

use super::{LedgerEffects, LedgerMutation, RailLedger};
use crate::{
    entities::{Account, Operator, OperatorApproval, Rail, Settlement, Token, UserToken},
    error::{Error, Result},
    events::EventMeta,
    ids,
    lockup::{self, RateHistoryUpdate},
    store::UnitOfWork,
    types::{credit, debit, Address, Epoch, RailId, RailState, U256},
};
use tracing::{debug, warn};

/// Fields of a `RailCreated` event
pub(super) struct NewRail {
    pub rail_id: RailId,
    pub payer: Address,
    pub payee: Address,
    pub arbiter: Address,
    pub token: Address,
    pub operator: Address,
    pub commission_rate_bps: U256,
    pub service_fee_recipient: Address,
}

/// Amounts of a `RailSettled` event
pub(super) struct SettledAmounts {
    pub total_settled_amount: U256,
    pub total_net_payee_amount: U256,
    pub operator_commission: U256,
    pub settled_up_to: Epoch,
}

fn load_rail(uow: &UnitOfWork<'_>, rail_id: &RailId) -> Result<Rail> {
    uow.require(&ids::rail_key(rail_id), rail_id)
}

fn load_approval(uow: &UnitOfWork<'_>, rail: &Rail) -> Result<Option<OperatorApproval>> {
    let approval = uow.load(&rail.approval_key())?;
    if approval.is_none() {
        warn!(
            rail_id = %rail.rail_id,
            payer = ?rail.payer,
            operator = ?rail.operator,
            "Operator approval not found for rail"
        );
    }
    Ok(approval)
}

fn transition(rail: &mut Rail, next: RailState) -> Result<RailState> {
    let previous = rail.state;
    if !previous.can_transition_to(next) {
        return Err(Error::InvalidTransition(format!(
            "rail {} cannot move from {} to {}",
            rail.rail_id, previous, next
        )));
    }
    rail.state = next;
    Ok(previous)
}

impl RailLedger {
    pub(super) fn rail_created(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        new: NewRail,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        if uow.exists(&ids::rail_key(&new.rail_id))? {
            return Err(Error::InvalidEvent(format!(
                "rail {} already exists",
                new.rail_id
            )));
        }

        // Payer and payee may be the same account; the second load sees the
        // first save.
        let (mut payer, is_new_payer) =
            uow.load_or_create(&ids::account_key(&new.payer), || Account::new(new.payer))?;
        credit(&mut payer.total_rails, U256::one());
        uow.save(&payer)?;

        let (mut payee, is_new_payee) =
            uow.load_or_create(&ids::account_key(&new.payee), || Account::new(new.payee))?;
        credit(&mut payee.total_rails, U256::one());
        uow.save(&payee)?;

        let (mut operator, is_new_operator) =
            uow.load_or_create(&ids::operator_key(&new.operator), || Operator::new(new.operator))?;
        credit(&mut operator.total_rails, U256::one());
        uow.save(&operator)?;

        let rail = Rail {
            rail_id: new.rail_id,
            payer: new.payer,
            payee: new.payee,
            operator: new.operator,
            token: new.token,
            arbiter: new.arbiter,
            service_fee_recipient: new.service_fee_recipient,
            state: RailState::ZeroRate,
            payment_rate: U256::zero(),
            lockup_fixed: U256::zero(),
            lockup_period: U256::zero(),
            settled_upto: meta.block_number,
            end_epoch: None,
            commission_rate_bps: new.commission_rate_bps,
            total_settled_amount: U256::zero(),
            total_net_payee_amount: U256::zero(),
            total_commission: U256::zero(),
            total_settlements: U256::zero(),
            total_rate_changes: U256::zero(),
            rate_change_queue_len: 0,
            created_at: meta.block_number,
        };
        uow.save(&rail)?;

        debug!(
            rail_id = %rail.rail_id,
            payer = ?rail.payer,
            payee = ?rail.payee,
            operator = ?rail.operator,
            block = meta.block_number,
            "Rail created"
        );

        effects.push(LedgerMutation::RailCreated {
            rail,
            is_new_payer,
            is_new_payee,
            is_new_operator,
        });
        Ok(())
    }

    pub(super) fn rail_rate_modified(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        rail_id: &RailId,
        old_rate: U256,
        new_rate: U256,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut rail = load_rail(uow, rail_id)?;
        let epoch = meta.block_number;

        rail.payment_rate = new_rate;
        credit(&mut rail.total_rate_changes, U256::one());

        if rail.state == RailState::ZeroRate && old_rate.is_zero() && !new_rate.is_zero() {
            let previous = transition(&mut rail, RailState::Active)?;
            effects.push(LedgerMutation::StateChanged {
                rail: rail.clone(),
                from: previous,
                to: RailState::Active,
            });
        }

        let history = lockup::record_rate_change(uow, &mut rail, epoch, old_rate, new_rate)?;
        if history == RateHistoryUpdate::Coalesced {
            debug!(rail_id = %rail_id, epoch, "Rate change coalesced into last segment");
        }
        uow.save(&rail)?;

        let Some(mut approval) = load_approval(uow, &rail)? else {
            return Ok(());
        };

        let terminated = rail.state.is_terminal();
        effects.clamp(lockup::update_rate_usage(
            &mut approval,
            old_rate,
            new_rate,
            terminated,
        ));

        if old_rate != new_rate {
            let payer: Option<UserToken> = uow.load(&rail.payer_token_key())?;
            let period = lockup::remaining_lockup_period(&rail, epoch, payer.as_ref());
            if !period.is_zero() {
                effects.clamp(lockup::update_operator_lockup(
                    &mut approval,
                    old_rate.saturating_mul(period),
                    new_rate.saturating_mul(period),
                ));
            }
        }

        uow.save(&approval)?;

        debug!(
            rail_id = %rail_id,
            old_rate = %old_rate,
            new_rate = %new_rate,
            state = %rail.state,
            "Rail rate modified"
        );
        Ok(())
    }

    pub(super) fn rail_lockup_modified(
        &self,
        uow: &mut UnitOfWork<'_>,
        rail_id: &RailId,
        (old_fixed, old_period): (U256, U256),
        (new_fixed, new_period): (U256, U256),
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut rail = load_rail(uow, rail_id)?;
        let terminated = rail.state.is_terminal();

        rail.lockup_fixed = new_fixed;
        if !terminated {
            rail.lockup_period = new_period;
        }
        uow.save(&rail)?;

        // Lockup of an unfunded payer is never forwarded to the approval
        if !uow.exists(&rail.payer_token_key())? {
            debug!(rail_id = %rail_id, "Payer has no balance, lockup not forwarded");
            return Ok(());
        }

        let Some(mut approval) = load_approval(uow, &rail)? else {
            return Ok(());
        };

        let old = lockup::effective_lockup(old_fixed, rail.payment_rate, old_period, terminated);
        let new = lockup::effective_lockup(new_fixed, rail.payment_rate, new_period, terminated);
        effects.clamp(lockup::update_operator_lockup(&mut approval, old, new));
        uow.save(&approval)?;

        debug!(rail_id = %rail_id, old = %old, new = %new, "Rail lockup modified");
        Ok(())
    }

    pub(super) fn rail_terminated(
        &self,
        uow: &mut UnitOfWork<'_>,
        rail_id: &RailId,
        end_epoch: Epoch,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut rail = load_rail(uow, rail_id)?;

        if rail.state == RailState::Terminated {
            rail.end_epoch = Some(end_epoch);
            uow.save(&rail)?;
            debug!(rail_id = %rail_id, end_epoch, "Terminated rail end epoch refreshed");
            return Ok(());
        }

        let previous = transition(&mut rail, RailState::Terminated)?;
        rail.end_epoch = Some(end_epoch);
        uow.save(&rail)?;

        let payer: Option<UserToken> = uow.load(&rail.payer_token_key())?;
        match payer {
            Some(mut payer) => {
                let clamped = debit(&mut payer.lockup_rate, rail.payment_rate);
                if clamped {
                    warn!(rail_id = %rail_id, payer = ?rail.payer, "Payer lockup rate clamped at zero");
                }
                effects.clamp(clamped);
                uow.save(&payer)?;
            }
            None => warn!(rail_id = %rail_id, payer = ?rail.payer, "Payer balance not found"),
        }

        debug!(rail_id = %rail_id, end_epoch, from = %previous, "Rail terminated");

        effects.push(LedgerMutation::StateChanged {
            rail,
            from: previous,
            to: RailState::Terminated,
        });
        Ok(())
    }

    pub(super) fn rail_settled(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        rail_id: &RailId,
        amounts: SettledAmounts,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut rail = load_rail(uow, rail_id)?;

        let network_fee = self
            .fee_source
            .network_fee(meta.block_number)
            .unwrap_or_else(|| {
                warn!(block = meta.block_number, "Network fee unavailable, using zero");
                U256::zero()
            });

        credit(&mut rail.total_settled_amount, amounts.total_settled_amount);
        credit(&mut rail.total_net_payee_amount, amounts.total_net_payee_amount);
        credit(&mut rail.total_commission, amounts.operator_commission);
        credit(&mut rail.total_settlements, U256::one());
        rail.settled_upto = amounts.settled_up_to;
        uow.save(&rail)?;

        uow.save(&Settlement {
            tx_hash: meta.transaction_hash,
            log_index: meta.log_index,
            rail_id: rail.rail_id,
            total_settled_amount: amounts.total_settled_amount,
            total_net_payee_amount: amounts.total_net_payee_amount,
            operator_commission: amounts.operator_commission,
            network_fee,
            settled_upto: amounts.settled_up_to,
            block_number: meta.block_number,
        })?;

        if let Some(mut token) = uow.load::<Token>(&ids::token_key(&rail.token))? {
            effects.clamp(debit(&mut token.user_funds, amounts.operator_commission));
            credit(&mut token.total_settled_amount, amounts.total_settled_amount);
            credit(&mut token.operator_commission, amounts.operator_commission);
            uow.save(&token)?;
        } else {
            warn!(rail_id = %rail_id, token = ?rail.token, "Token not found, totals not updated");
        }

        self.move_funds(
            uow,
            &rail,
            amounts.total_settled_amount,
            amounts.total_net_payee_amount,
            effects,
        )?;

        if let Some(mut operator) = uow.load::<Operator>(&ids::operator_key(&rail.operator))? {
            credit(&mut operator.total_commission, amounts.operator_commission);
            uow.save(&operator)?;
        } else {
            warn!(rail_id = %rail_id, operator = ?rail.operator, "Operator not found, commission not credited");
        }

        debug!(
            rail_id = %rail_id,
            settled = %amounts.total_settled_amount,
            net = %amounts.total_net_payee_amount,
            commission = %amounts.operator_commission,
            network_fee = %network_fee,
            settled_upto = amounts.settled_up_to,
            "Rail settled"
        );

        effects.push(LedgerMutation::Settled {
            rail,
            total_settled_amount: amounts.total_settled_amount,
            total_net_payee_amount: amounts.total_net_payee_amount,
            operator_commission: amounts.operator_commission,
            network_fee,
        });
        Ok(())
    }

    pub(super) fn rail_one_time_payment(
        &self,
        uow: &mut UnitOfWork<'_>,
        rail_id: &RailId,
        net_payee_amount: U256,
        operator_commission: U256,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut rail = load_rail(uow, rail_id)?;

        effects.clamp(debit(&mut rail.lockup_fixed, net_payee_amount));
        credit(&mut rail.total_net_payee_amount, net_payee_amount);
        credit(&mut rail.total_commission, operator_commission);
        uow.save(&rail)?;

        let gross = lockup::one_time_payment_gross(operator_commission, rail.commission_rate_bps);

        if let Some(mut token) = uow.load::<Token>(&ids::token_key(&rail.token))? {
            effects.clamp(debit(&mut token.user_funds, operator_commission));
            credit(&mut token.operator_commission, operator_commission);
            uow.save(&token)?;
        } else {
            warn!(rail_id = %rail_id, token = ?rail.token, "Token not found, totals not updated");
        }

        self.move_funds(uow, &rail, gross, net_payee_amount, effects)?;

        if let Some(mut operator) = uow.load::<Operator>(&ids::operator_key(&rail.operator))? {
            credit(&mut operator.total_commission, operator_commission);
            uow.save(&operator)?;
        } else {
            warn!(rail_id = %rail_id, operator = ?rail.operator, "Operator not found, commission not credited");
        }

        if let Some(mut approval) = load_approval(uow, &rail)? {
            effects.clamps += lockup::release_one_time_payment(&mut approval, gross);
            uow.save(&approval)?;
        }

        debug!(
            rail_id = %rail_id,
            net = %net_payee_amount,
            commission = %operator_commission,
            gross = %gross,
            "One-time payment processed"
        );
        Ok(())
    }

    pub(super) fn rail_finalized(
        &self,
        uow: &mut UnitOfWork<'_>,
        rail_id: &RailId,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut rail = load_rail(uow, rail_id)?;
        let previous = transition(&mut rail, RailState::Finalized)?;

        if let Some(mut approval) = load_approval(uow, &rail)? {
            let released = lockup::effective_lockup(
                rail.lockup_fixed,
                rail.payment_rate,
                rail.lockup_period,
                false,
            );
            effects.clamp(lockup::update_operator_lockup(
                &mut approval,
                released,
                U256::zero(),
            ));
            uow.save(&approval)?;
        }

        uow.save(&rail)?;

        debug!(rail_id = %rail_id, "Rail finalized");

        effects.push(LedgerMutation::StateChanged {
            rail,
            from: previous,
            to: RailState::Finalized,
        });
        Ok(())
    }

    /// Take `gross` from the payer's balance and give `net` to the payee's
    fn move_funds(
        &self,
        uow: &mut UnitOfWork<'_>,
        rail: &Rail,
        gross: U256,
        net: U256,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        match uow.load::<UserToken>(&rail.payer_token_key())? {
            Some(mut payer) => {
                let clamped = debit(&mut payer.funds, gross);
                if clamped {
                    warn!(
                        rail_id = %rail.rail_id,
                        payer = ?rail.payer,
                        amount = %gross,
                        "Payer funds saturated at zero"
                    );
                }
                effects.clamp(clamped);
                uow.save(&payer)?;
            }
            None => warn!(rail_id = %rail.rail_id, payer = ?rail.payer, "Payer balance not found"),
        }

        // Re-read after the payer save so a self-paying rail nets out
        match uow.load::<UserToken>(&rail.payee_token_key())? {
            Some(mut payee) => {
                credit(&mut payee.funds, net);
                uow.save(&payee)?;
            }
            None => warn!(rail_id = %rail.rail_id, payee = ?rail.payee, "Payee balance not found"),
        }

        Ok(())
    }
}
