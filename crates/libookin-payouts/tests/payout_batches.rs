mod support;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use libookin_core::{
    BatchStatus, FailureKind, JobStatus, Notification, PaymentGateway, PayoutError, PayoutRecord,
    PayoutRecordStore, RoyaltyStatus, TriggerSource,
};
use libookin_payouts::testing::{RecordingNotifier, StubGateway};
use libookin_payouts::{BatchRun, TriggerOutcome, mark_entries_failed, requeue_failed_entries};
use support::{Harness, at, eur};
use uuid::Uuid;

fn scheduled(outcome: TriggerOutcome) -> libookin_core::PayoutBatch {
    match outcome {
        TriggerOutcome::Scheduled(batch) => batch,
        other => panic!("expected a scheduled batch, got {other:?}"),
    }
}

fn completed(run: BatchRun) -> libookin_core::PayoutBatch {
    match run {
        BatchRun::Completed(batch) => batch,
        other => panic!("expected a completed batch, got {other:?}"),
    }
}

#[tokio::test]
async fn one_sale_is_paid_after_the_review_window() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;

    h.go_to_payout_day();
    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    assert_eq!(batch.status, BatchStatus::Scheduled);
    assert_eq!(batch.total_amount, eur(700));
    assert_eq!(batch.scheduled_at, at(2025, 4, 1, 15));
    assert_eq!(batch.snapshot.len(), 1);

    assert_eq!(
        h.workflow.run_batch(batch.id).await.unwrap(),
        BatchRun::NotDue(batch.scheduled_at)
    );
    assert!(h.gateway.payouts().await.is_empty());

    h.clock.advance(Duration::hours(6));
    let done = completed(h.workflow.run_batch(batch.id).await.unwrap());
    assert_eq!(done.status, BatchStatus::Completed);
    assert_eq!((done.processed_count, done.failed_count), (1, 0));
    assert_eq!(done.paid_amount(), eur(700));

    let payouts = h.gateway.payouts().await;
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].amount, eur(700));
    assert_eq!(payouts[0].remote_account_id, "acct_1");
    assert_eq!(payouts[0].metadata.batch_id, batch.id);

    let records = h.ctx.records.for_batch(batch.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].remote_payout_id, "po_stub_1");
    assert_eq!(records[0].currency, "EUR");

    let entries = h.ctx.ledger.entries_for_payee(1, 10).await.unwrap();
    assert_eq!(entries[0].status, RoyaltyStatus::Paid);
    assert_eq!(entries[0].payout_ref.as_deref(), Some("po_stub_1"));

    assert_eq!(
        h.notifier.kinds().await,
        vec!["batch_scheduled", "payout_confirmed", "batch_completed"]
    );
    assert!(h.workflow.current().await.unwrap().is_none());
}

#[tokio::test]
async fn a_failing_payee_does_not_stop_the_batch() {
    let h = Harness::new(
        StubGateway::new()
            .with_account("acct_1", true)
            .with_account("acct_2", true)
            .with_account("acct_3", true)
            .failing_payouts_for("acct_2"),
    );
    for payee in 1..=3 {
        h.link(payee, &format!("acct_{payee}")).await;
        h.sell(100 + payee, payee, 1000).await;
        h.clock.advance(Duration::hours(1));
    }

    h.go_to_payout_day();
    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(7));
    let done = completed(h.workflow.run_batch(batch.id).await.unwrap());

    assert_eq!((done.processed_count, done.failed_count), (2, 1));
    let failed = done.results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.payee_id, 2);
    assert_eq!(failed.failure.as_ref().unwrap().kind, FailureKind::Remote);

    let entries = h.ctx.ledger.entries_for_payee(2, 10).await.unwrap();
    assert_eq!(entries[0].status, RoyaltyStatus::Pending);
    assert_eq!(h.gateway.payouts().await.len(), 2);

    let preview = h.workflow.preview().await.unwrap();
    assert_eq!(preview.payees.len(), 1);
    assert_eq!(preview.payees[0].payee_id, 2);
}

#[tokio::test]
async fn only_one_batch_is_in_flight() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let first = scheduled(h.workflow.trigger(TriggerSource::Scheduled).await.unwrap());
    match h.workflow.trigger(TriggerSource::Manual).await.unwrap() {
        TriggerOutcome::AlreadyInFlight(current) => assert_eq!(current.id, first.id),
        other => panic!("expected in-flight batch, got {other:?}"),
    }
    assert_eq!(h.notifier.kinds().await, vec!["batch_scheduled"]);
}

#[tokio::test]
async fn trigger_without_eligible_payees_creates_nothing() {
    let h = Harness::new(StubGateway::new());
    h.go_to_payout_day();
    assert!(matches!(
        h.workflow.trigger(TriggerSource::Manual).await,
        Err(PayoutError::NoEligiblePayees)
    ));
    assert!(h.workflow.current().await.unwrap().is_none());
    assert!(h.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn cancelled_batch_never_pays() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    assert!(matches!(
        h.workflow.cancel(Some(Uuid::new_v4())).await,
        Err(PayoutError::Conflict(_))
    ));

    let cancelled = h.workflow.cancel(Some(batch.id)).await.unwrap();
    assert_eq!(cancelled.status, BatchStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let job = h
        .jobs
        .jobs()
        .await
        .into_iter()
        .find(|job| job.dedupe_key == format!("process-batch:{}", batch.id))
        .unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    // 2025-04-03 is not a payout day, so the tick only looks at due jobs.
    h.clock.advance(Duration::days(2));
    let report = h.scheduler().run_once().await.unwrap();
    assert_eq!(report.jobs_done, 0);
    assert_eq!(
        h.workflow.run_batch(batch.id).await.unwrap(),
        BatchRun::Skipped(BatchStatus::Cancelled)
    );
    assert_eq!(h.gateway.payout_attempts().await, 0);
    let entries = h.ctx.ledger.entries_for_payee(1, 10).await.unwrap();
    assert_eq!(entries[0].status, RoyaltyStatus::Pending);

    assert!(matches!(
        h.workflow.cancel(None).await,
        Err(PayoutError::Conflict(_))
    ));
    // a new batch may follow a cancelled one
    scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
}

#[tokio::test]
async fn processing_batch_cannot_be_cancelled() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));
    assert!(
        h.ctx
            .batches
            .begin_processing(batch.id, h.clock_now())
            .await
            .unwrap()
    );

    assert!(matches!(
        h.workflow.cancel(None).await,
        Err(PayoutError::Conflict(_))
    ));
    assert_eq!(
        h.workflow.batch(batch.id).await.unwrap().status,
        BatchStatus::Processing
    );
}

#[tokio::test]
async fn interrupted_batch_resumes_without_paying_twice() {
    let h = Harness::new(
        StubGateway::new()
            .with_account("acct_1", true)
            .with_account("acct_2", true),
    );
    h.link(1, "acct_1").await;
    h.link(2, "acct_2").await;
    h.sell(101, 1, 1000).await;
    h.sell(102, 2, 1000).await;

    h.go_to_payout_day();
    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));

    // The worker died right after moving the batch to processing.
    h.gateway.set_payouts_failing("acct_2", true).await;
    assert!(
        h.ctx
            .batches
            .begin_processing(batch.id, h.clock_now())
            .await
            .unwrap()
    );

    let resumed = h.workflow.recover().await.unwrap();
    let done = completed(resumed.unwrap());
    assert_eq!((done.processed_count, done.failed_count), (1, 1));

    // Running the same batch again is a no-op.
    h.gateway.set_payouts_failing("acct_2", false).await;
    assert_eq!(
        h.workflow.run_batch(batch.id).await.unwrap(),
        BatchRun::Skipped(BatchStatus::Completed)
    );
    assert_eq!(h.gateway.payouts().await.len(), 1);
    assert_eq!(h.gateway.payout_attempts().await, 2);
}

#[tokio::test]
async fn replayed_payout_calls_reuse_the_remote_payout() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));
    h.ctx
        .batches
        .begin_processing(batch.id, h.clock_now())
        .await
        .unwrap();

    // The process died right after the processor accepted the payout.
    let payee = &batch.snapshot[0];
    let metadata = libookin_core::PayoutMetadata {
        payee_id: payee.payee_id,
        batch_id: batch.id,
        period_start: support::date(2025, 2, 1),
        period_end: support::date(2025, 4, 1),
        entry_count: payee.entry_count,
    };
    h.ctx
        .gateway
        .create_payout(&payee.remote_account_id, payee.total_pending, &metadata)
        .await
        .unwrap();

    let done = completed(h.workflow.recover().await.unwrap().unwrap());
    assert_eq!(done.processed_count, 1);
    assert_eq!(h.gateway.payout_attempts().await, 2);
    assert_eq!(h.gateway.payouts().await.len(), 1);
    assert_eq!(
        done.results[0].remote_payout_id.as_deref(),
        Some("po_stub_1")
    );
}

struct BrokenRecords;

#[async_trait]
impl PayoutRecordStore for BrokenRecords {
    async fn insert(&self, _record: &PayoutRecord) -> anyhow::Result<bool> {
        anyhow::bail!("disk full")
    }

    async fn for_batch(&self, _batch_id: Uuid) -> anyhow::Result<Vec<PayoutRecord>> {
        Ok(Vec::new())
    }

    async fn for_payee(&self, _payee_id: i64, _limit: usize) -> anyhow::Result<Vec<PayoutRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn unrecorded_remote_payout_is_flagged_for_reconciliation() {
    let mut h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.ctx.records = Arc::new(BrokenRecords);
    h.rebuild();
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));
    let done = completed(h.workflow.run_batch(batch.id).await.unwrap());

    assert_eq!((done.processed_count, done.failed_count), (0, 1));
    let result = &done.results[0];
    assert!(result.needs_reconciliation());
    assert_eq!(result.remote_payout_id.as_deref(), Some("po_stub_1"));

    let entries = h.ctx.ledger.entries_for_payee(1, 10).await.unwrap();
    assert_eq!(entries[0].status, RoyaltyStatus::Pending);

    let sent = h.notifier.sent().await;
    let Some(Notification::BatchCompleted {
        needs_reconciliation,
        ..
    }) = sent.last()
    else {
        panic!("expected a completion notification, got {sent:?}");
    };
    assert_eq!(needs_reconciliation, &vec![1]);
    assert!(!h.notifier.kinds().await.contains(&"payout_confirmed"));
}

#[tokio::test]
async fn notification_failures_do_not_fail_the_batch() {
    let h = Harness::with_notifier(
        StubGateway::new().with_account("acct_1", true),
        RecordingNotifier::failing(),
    );
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));
    let done = completed(h.workflow.run_batch(batch.id).await.unwrap());
    assert_eq!(done.processed_count, 1);
    assert!(h.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn completed_batches_show_up_in_history() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));
    h.workflow.run_batch(batch.id).await.unwrap();

    let history = h.workflow.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, batch.id);
    assert!(matches!(
        h.workflow.batch(Uuid::new_v4()).await,
        Err(PayoutError::NotFound(_))
    ));
}

async fn entry_for_sale(h: &Harness, payee_id: i64, sale_id: i64) -> libookin_core::RoyaltyEntry {
    h.ctx
        .ledger
        .entries_for_payee(payee_id, 10)
        .await
        .unwrap()
        .into_iter()
        .find(|entry| entry.sale_id == sale_id)
        .unwrap()
}

#[tokio::test]
async fn entries_requeued_during_review_wait_for_the_next_batch() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.sell(101, 1, 1000).await;
    let late = entry_for_sale(&h, 1, 101).await;
    mark_entries_failed(&h.ctx, &[late.id], "disputed").await.unwrap();

    h.go_to_payout_day();
    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    assert_eq!(batch.total_amount, eur(700));
    assert_eq!(batch.snapshot[0].entry_ids.len(), 1);

    h.clock.advance(Duration::hours(3));
    assert_eq!(requeue_failed_entries(&h.ctx, &[late.id]).await.unwrap(), 1);
    h.clock.advance(Duration::hours(3));
    let done = completed(h.workflow.run_batch(batch.id).await.unwrap());

    assert_eq!((done.processed_count, done.failed_count), (1, 0));
    assert_eq!(done.results[0].settled_entries, 1);
    let payouts = h.gateway.payouts().await;
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].amount, eur(700));

    assert_eq!(entry_for_sale(&h, 1, 100).await.status, RoyaltyStatus::Paid);
    let requeued = entry_for_sale(&h, 1, 101).await;
    assert_eq!(requeued.status, RoyaltyStatus::Pending);
    assert!(requeued.payout_ref.is_none());

    let preview = h.workflow.preview().await.unwrap();
    assert_eq!(preview.total_amount, eur(700));
}

#[tokio::test]
async fn entry_failed_during_review_is_flagged_for_reconciliation() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.sell(101, 1, 1000).await;

    h.go_to_payout_day();
    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    assert_eq!(batch.total_amount, eur(1400));

    let disputed = entry_for_sale(&h, 1, 101).await;
    mark_entries_failed(&h.ctx, &[disputed.id], "chargeback").await.unwrap();
    h.clock.advance(Duration::hours(6));
    let done = completed(h.workflow.run_batch(batch.id).await.unwrap());

    assert_eq!((done.processed_count, done.failed_count), (0, 1));
    let result = &done.results[0];
    assert!(result.needs_reconciliation());
    assert_eq!(result.remote_payout_id.as_deref(), Some("po_stub_1"));
    assert_eq!(h.gateway.payouts().await[0].amount, eur(1400));

    assert_eq!(entry_for_sale(&h, 1, 100).await.status, RoyaltyStatus::Paid);
    assert_eq!(entry_for_sale(&h, 1, 101).await.status, RoyaltyStatus::Failed);
    assert!(!h.notifier.kinds().await.contains(&"payout_confirmed"));
}

#[tokio::test]
async fn resumed_payee_already_settled_by_the_same_payout_succeeds() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let batch = scheduled(h.workflow.trigger(TriggerSource::Manual).await.unwrap());
    h.clock.advance(Duration::hours(6));
    h.ctx
        .batches
        .begin_processing(batch.id, h.clock_now())
        .await
        .unwrap();

    // The worker died after settling the ledger but before storing the result.
    let payee = &batch.snapshot[0];
    let metadata = libookin_core::PayoutMetadata {
        payee_id: payee.payee_id,
        batch_id: batch.id,
        period_start: support::date(2025, 2, 1),
        period_end: support::date(2025, 4, 1),
        entry_count: payee.entry_count,
    };
    let remote = h
        .ctx
        .gateway
        .create_payout(&payee.remote_account_id, payee.total_pending, &metadata)
        .await
        .unwrap();
    h.ctx
        .ledger
        .mark_paid(1, &payee.entry_ids, &remote.remote_payout_id, h.clock_now())
        .await
        .unwrap();

    let done = completed(h.workflow.recover().await.unwrap().unwrap());
    assert_eq!((done.processed_count, done.failed_count), (1, 0));
    assert_eq!(done.results[0].settled_entries, 0);
    assert!(!done.results[0].needs_reconciliation());
}
