//! Time buckets and their load-or-create accessors

use crate::{
    entities::{DailyMetric, OperatorMetric, PaymentsMetric, TokenMetric, WeeklyMetric},
    error::Result,
    ids,
    store::UnitOfWork,
    types::{Address, SECONDS_PER_DAY, SECONDS_PER_WEEK},
};
use chrono::{DateTime, Utc};

/// Start of the day containing `timestamp`
pub fn day_start(timestamp: u64) -> u64 {
    timestamp - timestamp % SECONDS_PER_DAY
}

/// Start of the week containing `timestamp`. Weeks are counted from the
/// unix epoch, so they begin on Thursdays.
pub fn week_start(timestamp: u64) -> u64 {
    timestamp - timestamp % SECONDS_PER_WEEK
}

/// Week number of a week start, counting the first week as 1
pub fn week_number(week_start: u64) -> u64 {
    week_start / SECONDS_PER_WEEK + 1
}

/// `YYYY-MM-DD` of a unix timestamp
pub fn date_string(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Daily bucket for `timestamp`
pub fn load_or_create_daily_metric(uow: &UnitOfWork<'_>, timestamp: u64) -> Result<DailyMetric> {
    let start = day_start(timestamp);
    let (metric, _) = uow.load_or_create(&ids::daily_metric_key(start), || DailyMetric::empty(start))?;
    Ok(metric)
}

/// Weekly bucket for `timestamp`
pub fn load_or_create_weekly_metric(uow: &UnitOfWork<'_>, timestamp: u64) -> Result<WeeklyMetric> {
    let start = week_start(timestamp);
    let (metric, _) =
        uow.load_or_create(&ids::weekly_metric_key(start), || WeeklyMetric::empty(start))?;
    Ok(metric)
}

/// Daily bucket of one token
pub fn load_or_create_token_metric(
    uow: &UnitOfWork<'_>,
    token: &Address,
    timestamp: u64,
) -> Result<TokenMetric> {
    let start = day_start(timestamp);
    let (metric, _) = uow.load_or_create(&ids::token_metric_key(token, start), || {
        TokenMetric::empty(*token, start)
    })?;
    Ok(metric)
}

/// Daily bucket of one operator
pub fn load_or_create_operator_metric(
    uow: &UnitOfWork<'_>,
    operator: &Address,
    timestamp: u64,
) -> Result<OperatorMetric> {
    let start = day_start(timestamp);
    let (metric, _) = uow.load_or_create(&ids::operator_metric_key(operator, start), || {
        OperatorMetric::empty(*operator, start)
    })?;
    Ok(metric)
}

/// The network-wide singleton
pub fn load_or_create_payments_metric(uow: &UnitOfWork<'_>) -> Result<PaymentsMetric> {
    let (metric, _) = uow.load_or_create(&ids::payments_metric_key(), PaymentsMetric::default)?;
    Ok(metric)
}
