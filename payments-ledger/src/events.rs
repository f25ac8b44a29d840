//! Inbound settlement-contract events
//!
//! One [`RecordedEvent`] per line of newline-delimited JSON, internally
//! tagged by `"event"`. `U256` fields and addresses are `0x`-hex strings,
//! block numbers, timestamps and epochs are plain integers.

use crate::{
    error::Result,
    entities::Cursor,
    types::{Address, Epoch, RailId, TxHash, U256},
};
use serde::{Deserialize, Serialize};

/// Where an event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Block number (the contract's epoch)
    pub block_number: Epoch,
    /// Block timestamp, unix seconds
    pub block_timestamp: u64,
    /// Emitting transaction
    pub transaction_hash: TxHash,
    /// Log index within the block
    pub log_index: u64,
}

impl EventMeta {
    /// Stream position of this event
    pub fn position(&self) -> Cursor {
        Cursor {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Payments contract event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum PaymentsEvent {
    RailCreated {
        rail_id: RailId,
        payer: Address,
        payee: Address,
        /// Arbiter; the contract calls it validator
        #[serde(alias = "validator")]
        arbiter: Address,
        token: Address,
        operator: Address,
        commission_rate_bps: U256,
        service_fee_recipient: Address,
    },
    RailRateModified {
        rail_id: RailId,
        old_rate: U256,
        new_rate: U256,
    },
    RailLockupModified {
        rail_id: RailId,
        old_lockup_period: U256,
        new_lockup_period: U256,
        old_lockup_fixed: U256,
        new_lockup_fixed: U256,
    },
    RailTerminated {
        rail_id: RailId,
        end_epoch: Epoch,
    },
    RailSettled {
        rail_id: RailId,
        total_settled_amount: U256,
        total_net_payee_amount: U256,
        operator_commission: U256,
        settled_up_to: Epoch,
    },
    RailOneTimePaymentProcessed {
        rail_id: RailId,
        net_payee_amount: U256,
        operator_commission: U256,
    },
    RailFinalized {
        rail_id: RailId,
    },
    DepositRecorded {
        token: Address,
        from: Address,
        amount: U256,
    },
    WithdrawRecorded {
        token: Address,
        from: Address,
        amount: U256,
    },
    AccountLockupSettled {
        owner: Address,
        token: Address,
        lockup_current: U256,
        lockup_rate: U256,
        lockup_last_settled_at: Epoch,
    },
    OperatorApprovalUpdated {
        client: Address,
        operator: Address,
        token: Address,
        approved: bool,
        rate_allowance: U256,
        lockup_allowance: U256,
        max_lockup_period: U256,
    },
}

impl PaymentsEvent {
    /// Event name as emitted by the contract
    pub fn name(&self) -> &'static str {
        match self {
            PaymentsEvent::RailCreated { .. } => "RailCreated",
            PaymentsEvent::RailRateModified { .. } => "RailRateModified",
            PaymentsEvent::RailLockupModified { .. } => "RailLockupModified",
            PaymentsEvent::RailTerminated { .. } => "RailTerminated",
            PaymentsEvent::RailSettled { .. } => "RailSettled",
            PaymentsEvent::RailOneTimePaymentProcessed { .. } => "RailOneTimePaymentProcessed",
            PaymentsEvent::RailFinalized { .. } => "RailFinalized",
            PaymentsEvent::DepositRecorded { .. } => "DepositRecorded",
            PaymentsEvent::WithdrawRecorded { .. } => "WithdrawRecorded",
            PaymentsEvent::AccountLockupSettled { .. } => "AccountLockupSettled",
            PaymentsEvent::OperatorApprovalUpdated { .. } => "OperatorApprovalUpdated",
        }
    }

    /// Rail the event refers to, if any
    pub fn rail_id(&self) -> Option<RailId> {
        match self {
            PaymentsEvent::RailCreated { rail_id, .. }
            | PaymentsEvent::RailRateModified { rail_id, .. }
            | PaymentsEvent::RailLockupModified { rail_id, .. }
            | PaymentsEvent::RailTerminated { rail_id, .. }
            | PaymentsEvent::RailSettled { rail_id, .. }
            | PaymentsEvent::RailOneTimePaymentProcessed { rail_id, .. }
            | PaymentsEvent::RailFinalized { rail_id } => Some(*rail_id),
            _ => None,
        }
    }
}

/// An event together with its chain position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub event: PaymentsEvent,
}

impl RecordedEvent {
    /// Create new recorded event
    pub fn new(meta: EventMeta, event: PaymentsEvent) -> Self {
        Self { meta, event }
    }

    /// Parse one NDJSON line
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Serialize to one NDJSON line
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
