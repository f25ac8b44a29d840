//! Storage key derivation
//!
//! Every record lives in one flat key space. A key is the entity kind's
//! one-byte discriminant followed by the ordered concatenation of its id
//! parts:
//!
//! | Kind | Layout |
//! |---|---|
//! | Account, Operator, Token | `kind ‖ address(20)` |
//! | OperatorApproval | `kind ‖ payer(20) ‖ operator(20) ‖ token(20)` |
//! | UserToken | `kind ‖ account(20) ‖ token(20)` |
//! | Rail | `kind ‖ rail_id(32, BE)` |
//! | RateChangeEntry | `kind ‖ rail_id(32, BE) ‖ index(8, BE)` |
//! | Settlement | `kind ‖ tx_hash(32) ‖ log_index(8, BE)` |
//! | Daily/Weekly metric | `kind ‖ bucket_start(8, BE)` |
//! | Token/Operator daily metric | `kind ‖ address(20) ‖ bucket_start(8, BE)` |
//! | PaymentsMetric, Cursor | `kind ‖ name` |
//!
//! Big-endian integers keep prefix scans in ascending numeric order.

use crate::types::{Address, RailId, TxHash, U256};
use std::fmt;

/// Name of the singleton network metric
pub const PAYMENTS_NETWORK_STATS_ID: &str = "payments_network_stats";

/// Name of the delivery cursor record
pub const CURSOR_ID: &str = "cursor";

/// Type discriminant prefixed to every key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EntityKind {
    /// Payer / payee account
    Account = 0x01,
    /// Rail operator
    Operator = 0x02,
    /// Payer -> operator allowance for one token
    OperatorApproval = 0x03,
    /// Token-wide fund positions
    Token = 0x04,
    /// Per-account per-token balance
    UserToken = 0x05,
    /// Payment rail
    Rail = 0x06,
    /// Rate-change history segment
    RateChangeEntry = 0x07,
    /// Settlement record
    Settlement = 0x08,
    /// Daily network rollup
    DailyMetric = 0x10,
    /// Weekly network rollup
    WeeklyMetric = 0x11,
    /// Daily per-token rollup
    TokenMetric = 0x12,
    /// Daily per-operator rollup
    OperatorMetric = 0x13,
    /// Network-wide singleton
    PaymentsMetric = 0x14,
    /// Last applied `(block, log_index)`
    Cursor = 0x20,
}

impl EntityKind {
    /// Discriminant byte
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Human readable kind
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Operator => "operator",
            EntityKind::OperatorApproval => "operator approval",
            EntityKind::Token => "token",
            EntityKind::UserToken => "user token",
            EntityKind::Rail => "rail",
            EntityKind::RateChangeEntry => "rate change",
            EntityKind::Settlement => "settlement",
            EntityKind::DailyMetric => "daily metric",
            EntityKind::WeeklyMetric => "weekly metric",
            EntityKind::TokenMetric => "token metric",
            EntityKind::OperatorMetric => "operator metric",
            EntityKind::PaymentsMetric => "payments metric",
            EntityKind::Cursor => "cursor",
        }
    }
}

/// Storage key under construction / finished
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(Vec<u8>);

impl EntityKey {
    /// Start a key for `kind`
    pub fn new(kind: EntityKind) -> Self {
        let mut bytes = Vec::with_capacity(64);
        bytes.push(kind.tag());
        Self(bytes)
    }

    /// Append a 20-byte address
    pub fn address(mut self, address: &Address) -> Self {
        self.0.extend_from_slice(address.as_bytes());
        self
    }

    /// Append a 256-bit integer, big-endian
    pub fn u256(mut self, value: &U256) -> Self {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        self.0.extend_from_slice(&buf);
        self
    }

    /// Append a 64-bit integer, big-endian
    pub fn u64(mut self, value: u64) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append a 32-byte hash
    pub fn hash(mut self, hash: &TxHash) -> Self {
        self.0.extend_from_slice(hash.as_bytes());
        self
    }

    /// Append a UTF-8 name
    pub fn name(mut self, name: &str) -> Self {
        self.0.extend_from_slice(name.as_bytes());
        self
    }

    /// Discriminant byte of this key
    pub fn kind_tag(&self) -> u8 {
        self.0[0]
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for EntityKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey(0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// Key helpers

/// `Account` key
pub fn account_key(address: &Address) -> EntityKey {
    EntityKey::new(EntityKind::Account).address(address)
}

/// `Operator` key
pub fn operator_key(address: &Address) -> EntityKey {
    EntityKey::new(EntityKind::Operator).address(address)
}

/// `OperatorApproval` key: payer ‖ operator ‖ token
pub fn approval_key(payer: &Address, operator: &Address, token: &Address) -> EntityKey {
    EntityKey::new(EntityKind::OperatorApproval)
        .address(payer)
        .address(operator)
        .address(token)
}

/// `Token` key
pub fn token_key(token: &Address) -> EntityKey {
    EntityKey::new(EntityKind::Token).address(token)
}

/// `UserToken` key: account ‖ token
pub fn user_token_key(account: &Address, token: &Address) -> EntityKey {
    EntityKey::new(EntityKind::UserToken)
        .address(account)
        .address(token)
}

/// `Rail` key
pub fn rail_key(rail_id: &RailId) -> EntityKey {
    EntityKey::new(EntityKind::Rail).u256(rail_id)
}

/// Prefix of every rate-change segment of one rail
pub fn rate_change_prefix(rail_id: &RailId) -> EntityKey {
    EntityKey::new(EntityKind::RateChangeEntry).u256(rail_id)
}

/// `RateChangeEntry` key: rail ‖ index
pub fn rate_change_key(rail_id: &RailId, index: u64) -> EntityKey {
    rate_change_prefix(rail_id).u64(index)
}

/// `Settlement` key: tx_hash ‖ log_index
pub fn settlement_key(tx_hash: &TxHash, log_index: u64) -> EntityKey {
    EntityKey::new(EntityKind::Settlement)
        .hash(tx_hash)
        .u64(log_index)
}

/// `DailyMetric` key for a day start
pub fn daily_metric_key(day_start: u64) -> EntityKey {
    EntityKey::new(EntityKind::DailyMetric).u64(day_start)
}

/// `WeeklyMetric` key for a week start
pub fn weekly_metric_key(week_start: u64) -> EntityKey {
    EntityKey::new(EntityKind::WeeklyMetric).u64(week_start)
}

/// Prefix of every daily bucket of one token
pub fn token_metric_prefix(token: &Address) -> EntityKey {
    EntityKey::new(EntityKind::TokenMetric).address(token)
}

/// `TokenMetric` key: token ‖ day start
pub fn token_metric_key(token: &Address, day_start: u64) -> EntityKey {
    token_metric_prefix(token).u64(day_start)
}

/// Prefix of every daily bucket of one operator
pub fn operator_metric_prefix(operator: &Address) -> EntityKey {
    EntityKey::new(EntityKind::OperatorMetric).address(operator)
}

/// `OperatorMetric` key: operator ‖ day start
pub fn operator_metric_key(operator: &Address, day_start: u64) -> EntityKey {
    operator_metric_prefix(operator).u64(day_start)
}

/// The network metric singleton key
pub fn payments_metric_key() -> EntityKey {
    EntityKey::new(EntityKind::PaymentsMetric).name(PAYMENTS_NETWORK_STATS_ID)
}

/// The delivery cursor key
pub fn cursor_key() -> EntityKey {
    EntityKey::new(EntityKind::Cursor).name(CURSOR_ID)
}
