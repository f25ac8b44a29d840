//! End-to-end rail lifecycle scenarios
//!
//! Each test feeds a short event stream through the indexer and checks the
//! derived ledger records and rollups.

use payments_ledger::{
    Address, ApplyOutcome, Config, EventMeta, Indexer, MemoryStore, PaymentsEvent, RailId,
    RailState, RecordedEvent, TxHash, U256,
};
use std::sync::Arc;

const PAYER: u8 = 0x11;
const PAYEE: u8 = 0x22;
const OPERATOR: u8 = 0x33;
const TOKEN: u8 = 0x44;

/// 2023-11-14T22:13:20Z
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn rail_id() -> RailId {
    RailId::from(1u64)
}

/// Builds events at increasing chain positions, 30 seconds per block
struct Stream {
    block: u64,
    log_index: u64,
}

impl Stream {
    fn new(block: u64) -> Self {
        Self { block, log_index: 0 }
    }

    /// Event at `block`; events sharing a block get increasing log indexes
    fn at(&mut self, block: u64, event: PaymentsEvent) -> RecordedEvent {
        self.log_index = if block == self.block { self.log_index + 1 } else { 0 };
        self.block = block;
        RecordedEvent::new(
            EventMeta {
                block_number: block,
                block_timestamp: GENESIS_TIMESTAMP + block * 30,
                transaction_hash: TxHash::from_low_u64_be(block),
                log_index: self.log_index,
            },
            event,
        )
    }

    fn next(&mut self, event: PaymentsEvent) -> RecordedEvent {
        let block = self.block + 1;
        self.at(block, event)
    }
}

fn approval() -> PaymentsEvent {
    PaymentsEvent::OperatorApprovalUpdated {
        client: addr(PAYER),
        operator: addr(OPERATOR),
        token: addr(TOKEN),
        approved: true,
        rate_allowance: U256::from(1_000_000),
        lockup_allowance: U256::from(1_000_000),
        max_lockup_period: U256::from(2880),
    }
}

fn deposit(from: u8, amount: u64) -> PaymentsEvent {
    PaymentsEvent::DepositRecorded {
        token: addr(TOKEN),
        from: addr(from),
        amount: U256::from(amount),
    }
}

fn rail_created() -> PaymentsEvent {
    PaymentsEvent::RailCreated {
        rail_id: rail_id(),
        payer: addr(PAYER),
        payee: addr(PAYEE),
        arbiter: Address::zero(),
        token: addr(TOKEN),
        operator: addr(OPERATOR),
        commission_rate_bps: U256::from(1000),
        service_fee_recipient: addr(OPERATOR),
    }
}

fn rate_modified(old_rate: u64, new_rate: u64) -> PaymentsEvent {
    PaymentsEvent::RailRateModified {
        rail_id: rail_id(),
        old_rate: U256::from(old_rate),
        new_rate: U256::from(new_rate),
    }
}

fn terminated(end_epoch: u64) -> PaymentsEvent {
    PaymentsEvent::RailTerminated {
        rail_id: rail_id(),
        end_epoch,
    }
}

fn lockup_settled(lockup_rate: u64, at: u64) -> PaymentsEvent {
    PaymentsEvent::AccountLockupSettled {
        owner: addr(PAYER),
        token: addr(TOKEN),
        lockup_current: U256::zero(),
        lockup_rate: U256::from(lockup_rate),
        lockup_last_settled_at: at,
    }
}

async fn indexer_with_fee(fee: u64) -> Indexer {
    let mut config = Config::default();
    config.ledger.network_fee = U256::from(fee);
    Indexer::with_store(config, Arc::new(MemoryStore::new()))
        .await
        .unwrap()
}

async fn apply_ok(indexer: &Indexer, event: RecordedEvent) {
    let outcome = indexer.apply(event).await.unwrap();
    assert!(outcome.is_applied(), "unexpected outcome {:?}", outcome);
}

#[tokio::test]
async fn test_zero_rate_rail_activates_on_first_rate() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.at(100, rail_created())).await;
    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.state, RailState::ZeroRate);

    apply_ok(&indexer, stream.at(100, rate_modified(0, 1000))).await;
    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.state, RailState::Active);
    assert_eq!(rail.payment_rate, U256::from(1000));
    assert_eq!(rail.settled_upto, 100);
    assert!(indexer.rate_changes(rail_id()).await.unwrap().is_empty());

    let network = indexer.network_metric().await.unwrap().unwrap();
    assert_eq!(network.total_zero_rate_rails, U256::zero());
    assert_eq!(network.total_active_rails, U256::one());
    assert!(indexer.reconciliation().await.unwrap().is_consistent());

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_settlement_moves_funds_and_burns_fee() {
    let indexer = indexer_with_fee(5).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(deposit(PAYER, 10_000))).await;
    apply_ok(&indexer, stream.next(deposit(PAYEE, 1))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(&indexer, stream.next(rate_modified(0, 10))).await;
    let token_before = indexer.token(addr(TOKEN)).await.unwrap().unwrap();

    apply_ok(
        &indexer,
        stream.next(PaymentsEvent::RailSettled {
            rail_id: rail_id(),
            total_settled_amount: U256::from(500),
            total_net_payee_amount: U256::from(450),
            operator_commission: U256::from(50),
            settled_up_to: 50,
        }),
    )
    .await;

    let payer = indexer.user_token(addr(PAYER), addr(TOKEN)).await.unwrap().unwrap();
    let payee = indexer.user_token(addr(PAYEE), addr(TOKEN)).await.unwrap().unwrap();
    assert_eq!(payer.funds, U256::from(9_500));
    assert_eq!(payee.funds, U256::from(451));

    let token = indexer.token(addr(TOKEN)).await.unwrap().unwrap();
    assert_eq!(token.user_funds, token_before.user_funds - U256::from(50));
    assert_eq!(token.total_settled_amount, U256::from(500));

    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.total_settlements, U256::one());
    assert_eq!(rail.settled_upto, 50);

    let daily = indexer.daily_metrics(1).await.unwrap();
    assert_eq!(daily[0].fil_burned, U256::from(5));
    assert_eq!(daily[0].total_rail_settlements, U256::one());

    let network = indexer.network_metric().await.unwrap().unwrap();
    assert_eq!(network.total_fil_burned, U256::from(5));

    let settlement = indexer
        .settlement(TxHash::from_low_u64_be(stream.block), 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settlement.network_fee, U256::from(5));

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_terminating_active_rail() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(deposit(PAYER, 1_000))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(&indexer, stream.next(rate_modified(0, 10))).await;
    apply_ok(&indexer, stream.next(lockup_settled(10, 3))).await;
    apply_ok(&indexer, stream.next(terminated(200))).await;

    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.state, RailState::Terminated);
    assert_eq!(rail.end_epoch, Some(200));

    let payer = indexer.user_token(addr(PAYER), addr(TOKEN)).await.unwrap().unwrap();
    assert_eq!(payer.lockup_rate, U256::zero());

    let network = indexer.network_metric().await.unwrap().unwrap();
    assert_eq!(network.total_active_rails, U256::zero());
    assert_eq!(network.total_terminated_rails, U256::one());
    assert!(network.is_reconciled());

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_finalizing_releases_lockup() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(approval())).await;
    apply_ok(&indexer, stream.next(deposit(PAYER, 1_000))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(
        &indexer,
        stream.next(PaymentsEvent::RailLockupModified {
            rail_id: rail_id(),
            old_lockup_period: U256::zero(),
            new_lockup_period: U256::from(3),
            old_lockup_fixed: U256::zero(),
            new_lockup_fixed: U256::from(20),
        }),
    )
    .await;
    // Payer settled up to the current block, so the full period is ahead
    apply_ok(&indexer, stream.at(5, lockup_settled(10, 5))).await;
    apply_ok(&indexer, stream.at(5, rate_modified(0, 10))).await;

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(50));
    assert_eq!(approval.rate_usage, U256::from(10));

    apply_ok(&indexer, stream.next(terminated(100))).await;
    apply_ok(&indexer, stream.next(PaymentsEvent::RailFinalized { rail_id: rail_id() })).await;

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::zero());

    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.state, RailState::Finalized);

    let network = indexer.network_metric().await.unwrap().unwrap();
    assert_eq!(network.total_terminated_rails, U256::zero());
    assert_eq!(network.total_finalized_rails, U256::one());
    assert!(network.is_reconciled());
    assert_eq!(indexer.metrics().clamps.get(), 0);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_finalizing_beyond_usage_clamps_at_zero() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(approval())).await;
    apply_ok(&indexer, stream.next(deposit(PAYER, 1_000))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(
        &indexer,
        stream.next(PaymentsEvent::RailLockupModified {
            rail_id: rail_id(),
            old_lockup_period: U256::zero(),
            new_lockup_period: U256::from(3),
            old_lockup_fixed: U256::zero(),
            new_lockup_fixed: U256::from(20),
        }),
    )
    .await;
    apply_ok(&indexer, stream.next(lockup_settled(10, 0))).await;
    // Lockup period already elapsed for the payer: only the fixed 20 is used
    apply_ok(&indexer, stream.next(rate_modified(0, 10))).await;

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(20));

    apply_ok(&indexer, stream.next(terminated(100))).await;
    let outcome = indexer
        .apply(stream.next(PaymentsEvent::RailFinalized { rail_id: rail_id() }))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome::Applied {
            mutations: 1,
            clamps: 1
        }
    );

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::zero());
    assert_eq!(indexer.metrics().clamps.get(), 1);
    assert!(indexer.reconciliation().await.unwrap().is_consistent());

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_rail_is_skipped_and_stream_continues() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    let outcome = indexer.apply(stream.next(terminated(10))).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Skipped { .. }));

    apply_ok(&indexer, stream.next(rail_created())).await;
    let cursor = indexer.cursor().await.unwrap().unwrap();
    assert_eq!(cursor.block_number, 2);

    let network = indexer.network_metric().await.unwrap().unwrap();
    assert_eq!(network.total_rails, U256::one());
    assert_eq!(indexer.metrics().events_skipped.get(), 1);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_backwards_transition_is_skipped() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(&indexer, stream.next(terminated(10))).await;
    apply_ok(&indexer, stream.next(PaymentsEvent::RailFinalized { rail_id: rail_id() })).await;

    let outcome = indexer.apply(stream.next(terminated(20))).await.unwrap();
    assert!(matches!(outcome, ApplyOutcome::Skipped { .. }));

    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.state, RailState::Finalized);
    assert_eq!(rail.end_epoch, Some(10));

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_redelivered_events_are_ignored() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    let first = stream.next(deposit(PAYER, 100));
    let second = stream.next(deposit(PAYER, 100));
    let summary = indexer
        .apply_all(vec![first.clone(), second.clone(), first, second])
        .await
        .unwrap();

    assert_eq!(summary.applied, 2);
    assert_eq!(summary.duplicates, 2);

    let payer = indexer.user_token(addr(PAYER), addr(TOKEN)).await.unwrap().unwrap();
    assert_eq!(payer.funds, U256::from(200));

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_token_metrics_track_deposits() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(deposit(PAYER, 300))).await;
    apply_ok(&indexer, stream.next(deposit(PAYEE, 200))).await;
    apply_ok(
        &indexer,
        stream.next(PaymentsEvent::WithdrawRecorded {
            token: addr(TOKEN),
            from: addr(PAYER),
            amount: U256::from(50),
        }),
    )
    .await;

    let metrics = indexer.token_metrics(vec![addr(TOKEN)], 10).await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].unique_holders, U256::from(2));
    assert_eq!(metrics[0].deposit, U256::from(500));
    assert_eq!(metrics[0].total_locked, U256::zero());

    let network = indexer.network_metric().await.unwrap().unwrap();
    assert_eq!(network.total_tokens, U256::one());
    assert_eq!(network.total_accounts, U256::from(2));

    indexer.shutdown().await.unwrap();
}

fn lockup_modified(old: (u64, u64), new: (u64, u64)) -> PaymentsEvent {
    PaymentsEvent::RailLockupModified {
        rail_id: rail_id(),
        old_lockup_fixed: U256::from(old.0),
        old_lockup_period: U256::from(old.1),
        new_lockup_fixed: U256::from(new.0),
        new_lockup_period: U256::from(new.1),
    }
}

#[tokio::test]
async fn test_one_time_payment_draws_on_fixed_lockup() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(approval())).await;
    apply_ok(&indexer, stream.next(deposit(PAYER, 10_000))).await;
    apply_ok(&indexer, stream.next(deposit(PAYEE, 1))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(&indexer, stream.next(lockup_modified((0, 0), (1_000, 0)))).await;

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(1_000));
    let token_before = indexer.token(addr(TOKEN)).await.unwrap().unwrap();

    // 10% commission: 5 of commission means 50 taken from the payer
    apply_ok(
        &indexer,
        stream.next(PaymentsEvent::RailOneTimePaymentProcessed {
            rail_id: rail_id(),
            net_payee_amount: U256::from(45),
            operator_commission: U256::from(5),
        }),
    )
    .await;

    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.lockup_fixed, U256::from(955));
    assert_eq!(rail.total_net_payee_amount, U256::from(45));
    assert_eq!(rail.total_commission, U256::from(5));

    let payer = indexer.user_token(addr(PAYER), addr(TOKEN)).await.unwrap().unwrap();
    let payee = indexer.user_token(addr(PAYEE), addr(TOKEN)).await.unwrap().unwrap();
    assert_eq!(payer.funds, U256::from(9_950));
    assert_eq!(payee.funds, U256::from(46));

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_allowance, U256::from(999_950));
    assert_eq!(approval.lockup_usage, U256::from(950));

    let token = indexer.token(addr(TOKEN)).await.unwrap().unwrap();
    assert_eq!(token.operator_commission, U256::from(5));
    assert_eq!(token.user_funds, token_before.user_funds - U256::from(5));

    let operator = indexer.operator(addr(OPERATOR)).await.unwrap().unwrap();
    assert_eq!(operator.total_commission, U256::from(5));
    assert_eq!(indexer.metrics().clamps.get(), 0);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rate_changes_move_lockup_over_remaining_period() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(approval())).await;
    apply_ok(&indexer, stream.next(deposit(PAYER, 1_000))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(&indexer, stream.next(lockup_modified((0, 0), (0, 10)))).await;
    apply_ok(&indexer, stream.at(5, lockup_settled(30, 5))).await;
    apply_ok(&indexer, stream.at(5, rate_modified(0, 10))).await;

    // Full period ahead: 10 × 10
    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(100));
    assert_eq!(approval.rate_usage, U256::from(10));

    // Three epochs past the payer's settlement: 100 − 10 × 7 + 30 × 7
    apply_ok(&indexer, stream.at(8, rate_modified(10, 30))).await;
    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(240));
    assert_eq!(approval.rate_usage, U256::from(30));

    let history = indexer.rate_changes(rail_id()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!((history[0].from_epoch, history[0].until_epoch), (5, 8));
    assert_eq!(history[0].rate, U256::from(10));

    // Terminated: lockup runs to the end epoch, rate usage no longer moves
    apply_ok(&indexer, stream.at(9, terminated(20))).await;
    apply_ok(&indexer, stream.at(12, rate_modified(30, 20))).await;
    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(160));
    assert_eq!(approval.rate_usage, U256::from(30));

    let history = indexer.rate_changes(rail_id()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!((history[1].from_epoch, history[1].until_epoch), (8, 12));
    assert_eq!(history[1].rate, U256::from(30));
    assert_eq!(indexer.metrics().clamps.get(), 0);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_lockup_change_on_terminated_rail_is_fixed_only() {
    let indexer = indexer_with_fee(0).await;
    let mut stream = Stream::new(0);

    apply_ok(&indexer, stream.next(approval())).await;
    apply_ok(&indexer, stream.next(deposit(PAYER, 1_000))).await;
    apply_ok(&indexer, stream.next(rail_created())).await;
    apply_ok(&indexer, stream.next(lockup_modified((0, 0), (20, 10)))).await;
    apply_ok(&indexer, stream.next(terminated(100))).await;

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(20));

    apply_ok(&indexer, stream.next(lockup_modified((20, 10), (50, 99)))).await;

    let rail = indexer.rail(rail_id()).await.unwrap().unwrap();
    assert_eq!(rail.lockup_fixed, U256::from(50));
    assert_eq!(rail.lockup_period, U256::from(10));

    let approval = indexer
        .approval(addr(PAYER), addr(OPERATOR), addr(TOKEN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approval.lockup_usage, U256::from(50));
    assert_eq!(indexer.metrics().clamps.get(), 0);

    indexer.shutdown().await.unwrap();
}
