//! Fund and approval handlers

use super::{LedgerEffects, LedgerMutation, RailLedger};
use crate::{
    entities::{Account, Operator, OperatorApproval, Token, UserToken},
    error::Result,
    ids,
    store::UnitOfWork,
    types::{credit, debit, Address, Epoch, U256},
};
use tracing::{debug, warn};

/// Fields of an `OperatorApprovalUpdated` event
pub(super) struct ApprovalUpdate {
    pub client: Address,
    pub operator: Address,
    pub token: Address,
    pub approved: bool,
    pub rate_allowance: U256,
    pub lockup_allowance: U256,
    pub max_lockup_period: U256,
}

impl RailLedger {
    pub(super) fn deposit_recorded(
        &self,
        uow: &mut UnitOfWork<'_>,
        token_address: &Address,
        account_address: &Address,
        amount: U256,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let (mut token, is_new_token) =
            uow.load_or_create(&ids::token_key(token_address), || Token::new(*token_address))?;
        let (mut account, is_new_account) = uow.load_or_create(
            &ids::account_key(account_address),
            || Account::new(*account_address),
        )?;
        let (mut user_token, is_new_user_token) = uow.load_or_create(
            &ids::user_token_key(account_address, token_address),
            || UserToken::new(*account_address, *token_address),
        )?;

        credit(&mut token.user_funds, amount);
        credit(&mut token.total_deposits, amount);
        uow.save(&token)?;

        if is_new_user_token {
            credit(&mut account.total_tokens, U256::one());
        }
        uow.save(&account)?;

        credit(&mut user_token.funds, amount);
        uow.save(&user_token)?;

        debug!(
            token = ?token_address,
            account = ?account_address,
            amount = %amount,
            "Deposit recorded"
        );

        effects.push(LedgerMutation::TokenActivity {
            token: *token_address,
            account: *account_address,
            amount,
            is_deposit: true,
            is_new_account,
            is_new_token,
        });
        Ok(())
    }

    pub(super) fn withdraw_recorded(
        &self,
        uow: &mut UnitOfWork<'_>,
        token_address: &Address,
        account_address: &Address,
        amount: U256,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let mut user_token: UserToken = uow.require(
            &ids::user_token_key(account_address, token_address),
            format!("{:?}/{:?}", account_address, token_address),
        )?;

        let clamped = debit(&mut user_token.funds, amount);
        if clamped {
            warn!(
                token = ?token_address,
                account = ?account_address,
                amount = %amount,
                "Withdrawal exceeds balance, funds saturated at zero"
            );
        }
        effects.clamp(clamped);
        uow.save(&user_token)?;

        match uow.load::<Token>(&ids::token_key(token_address))? {
            Some(mut token) => {
                effects.clamp(debit(&mut token.user_funds, amount));
                credit(&mut token.total_withdrawals, amount);
                uow.save(&token)?;
            }
            None => warn!(token = ?token_address, "Token not found for withdrawal"),
        }

        debug!(
            token = ?token_address,
            account = ?account_address,
            amount = %amount,
            "Withdrawal recorded"
        );

        effects.push(LedgerMutation::TokenActivity {
            token: *token_address,
            account: *account_address,
            amount,
            is_deposit: false,
            is_new_account: false,
            is_new_token: false,
        });
        Ok(())
    }

    pub(super) fn account_lockup_settled(
        &self,
        uow: &mut UnitOfWork<'_>,
        owner: &Address,
        token: &Address,
        lockup_current: U256,
        lockup_rate: U256,
        lockup_last_settled_at: Epoch,
    ) -> Result<()> {
        let (mut user_token, _) = uow.load_or_create(&ids::user_token_key(owner, token), || {
            UserToken::new(*owner, *token)
        })?;

        user_token.lockup_current = lockup_current;
        user_token.lockup_rate = lockup_rate;
        user_token.lockup_last_settled_at = lockup_last_settled_at;
        uow.save(&user_token)?;

        debug!(
            owner = ?owner,
            token = ?token,
            lockup_current = %lockup_current,
            lockup_rate = %lockup_rate,
            settled_at = lockup_last_settled_at,
            "Account lockup settled"
        );
        Ok(())
    }

    pub(super) fn operator_approval_updated(
        &self,
        uow: &mut UnitOfWork<'_>,
        update: ApprovalUpdate,
        effects: &mut LedgerEffects,
    ) -> Result<()> {
        let (mut operator, is_new_operator) = uow.load_or_create(
            &ids::operator_key(&update.operator),
            || Operator::new(update.operator),
        )?;
        let (mut approval, is_new_approval) = uow.load_or_create(
            &ids::approval_key(&update.client, &update.operator, &update.token),
            || OperatorApproval::new(update.client, update.operator, update.token),
        )?;

        if is_new_approval {
            credit(&mut operator.total_approvals, U256::one());

            // Only counted against accounts that already exist
            if let Some(mut client) = uow.load::<Account>(&ids::account_key(&update.client))? {
                credit(&mut client.total_approvals, U256::one());
                uow.save(&client)?;
            }
        }

        approval.is_approved = update.approved;
        approval.rate_allowance = update.rate_allowance;
        approval.lockup_allowance = update.lockup_allowance;
        approval.max_lockup_period = update.max_lockup_period;
        uow.save(&approval)?;
        uow.save(&operator)?;

        debug!(
            client = ?update.client,
            operator = ?update.operator,
            token = ?update.token,
            approved = update.approved,
            "Operator approval updated"
        );

        effects.push(LedgerMutation::OperatorApproval {
            operator: update.operator,
            client: update.client,
            is_new_approval,
            is_new_operator,
        });
        Ok(())
    }
}
