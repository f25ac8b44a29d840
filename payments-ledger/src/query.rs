//! Read surface over committed records
//!
//! Lists of buckets come back newest first. Id-filtered lists merge the
//! buckets of every requested id before applying the limit.

use crate::{
    entities::{
        Account, Cursor, DailyMetric, Operator, OperatorApproval, OperatorMetric, PaymentsMetric,
        Rail, RateChangeEntry, Settlement, Token, TokenMetric, UserToken, WeeklyMetric,
    },
    error::Result,
    ids::{self, EntityKey, EntityKind},
    store::{decode, Entity, EntityStore},
    types::{Address, RailId, TxHash, U256},
};
use serde::{Deserialize, Serialize};

/// Outcome of the rail-count reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Rails ever created
    pub total_rails: U256,
    /// Sum of the four lifecycle-state totals
    pub rails_by_state: U256,
}

impl Reconciliation {
    /// Every rail is in exactly one state bucket
    pub fn is_consistent(&self) -> bool {
        self.total_rails == self.rails_by_state
    }
}

/// Read-only view of a store
pub struct ReadSurface<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> ReadSurface<'a> {
    /// View over `store`
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    fn load<E: Entity>(&self, key: &EntityKey) -> Result<Option<E>> {
        self.store
            .get(key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn scan<E: Entity>(&self, prefix: &EntityKey) -> Result<Vec<E>> {
        self.store
            .scan_prefix(prefix.as_bytes())?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Network-wide totals, if any event has been applied
    pub fn network_metric(&self) -> Result<Option<PaymentsMetric>> {
        self.load(&ids::payments_metric_key())
    }

    /// Most recent daily buckets
    pub fn daily_metrics(&self, limit: usize) -> Result<Vec<DailyMetric>> {
        let mut metrics: Vec<DailyMetric> = self.scan(&EntityKey::new(EntityKind::DailyMetric))?;
        metrics.reverse();
        metrics.truncate(limit);
        Ok(metrics)
    }

    /// Most recent weekly buckets
    pub fn weekly_metrics(&self, limit: usize) -> Result<Vec<WeeklyMetric>> {
        let mut metrics: Vec<WeeklyMetric> = self.scan(&EntityKey::new(EntityKind::WeeklyMetric))?;
        metrics.reverse();
        metrics.truncate(limit);
        Ok(metrics)
    }

    /// Most recent daily buckets of the given tokens
    pub fn token_metrics(&self, tokens: &[Address], limit: usize) -> Result<Vec<TokenMetric>> {
        let mut metrics = Vec::new();
        for token in tokens {
            metrics.extend(self.scan::<TokenMetric>(&ids::token_metric_prefix(token))?);
        }
        metrics.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.token.cmp(&b.token)));
        metrics.dedup_by(|a, b| a.timestamp == b.timestamp && a.token == b.token);
        metrics.truncate(limit);
        Ok(metrics)
    }

    /// Most recent daily buckets of the given operators
    pub fn operator_metrics(
        &self,
        operators: &[Address],
        limit: usize,
    ) -> Result<Vec<OperatorMetric>> {
        let mut metrics = Vec::new();
        for operator in operators {
            metrics.extend(self.scan::<OperatorMetric>(&ids::operator_metric_prefix(operator))?);
        }
        metrics.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(a.operator.cmp(&b.operator))
        });
        metrics.dedup_by(|a, b| a.timestamp == b.timestamp && a.operator == b.operator);
        metrics.truncate(limit);
        Ok(metrics)
    }

    /// Rail by id
    pub fn rail(&self, rail_id: &RailId) -> Result<Option<Rail>> {
        self.load(&ids::rail_key(rail_id))
    }

    /// Rate-change history of a rail, oldest first
    pub fn rate_changes(&self, rail_id: &RailId) -> Result<Vec<RateChangeEntry>> {
        self.scan(&ids::rate_change_prefix(rail_id))
    }

    /// Approval of `operator` by `payer` for `token`
    pub fn approval(
        &self,
        payer: &Address,
        operator: &Address,
        token: &Address,
    ) -> Result<Option<OperatorApproval>> {
        self.load(&ids::approval_key(payer, operator, token))
    }

    /// Balance of `account` in `token`
    pub fn user_token(&self, account: &Address, token: &Address) -> Result<Option<UserToken>> {
        self.load(&ids::user_token_key(account, token))
    }

    /// Account by address
    pub fn account(&self, address: &Address) -> Result<Option<Account>> {
        self.load(&ids::account_key(address))
    }

    /// Operator by address
    pub fn operator(&self, address: &Address) -> Result<Option<Operator>> {
        self.load(&ids::operator_key(address))
    }

    /// Token by address
    pub fn token(&self, address: &Address) -> Result<Option<Token>> {
        self.load(&ids::token_key(address))
    }

    /// Settlement emitted at `(tx_hash, log_index)`
    pub fn settlement(&self, tx_hash: &TxHash, log_index: u64) -> Result<Option<Settlement>> {
        self.load(&ids::settlement_key(tx_hash, log_index))
    }

    /// Last applied stream position
    pub fn cursor(&self) -> Result<Option<Cursor>> {
        self.load(&ids::cursor_key())
    }

    /// Compare `totalRails` with the per-state totals
    pub fn reconciliation(&self) -> Result<Reconciliation> {
        let metric = self.network_metric()?.unwrap_or_default();
        Ok(Reconciliation {
            total_rails: metric.total_rails,
            rails_by_state: metric.rails_by_state(),
        })
    }
}
