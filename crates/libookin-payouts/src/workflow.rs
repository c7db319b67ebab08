use chrono::{DateTime, NaiveDate, Utc};
use libookin_core::{
    BatchStatus, CreateBatch, FailureKind, GatewayError, JobKind, Notification, PayeeOutcome,
    PayeeSummary, PayoutBatch, PayoutError, PayoutFailure, PayoutMetadata, PayoutRecord, Result,
    RoyaltyStatus, ScheduledJob, TriggerSource,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::{next_payout_date, settlement_period};
use crate::context::PayoutContext;
use crate::eligibility::eligible_snapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Scheduled(PayoutBatch),
    AlreadyInFlight(PayoutBatch),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchRun {
    Completed(PayoutBatch),
    NotDue(DateTime<Utc>),
    Skipped(BatchStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutPreview {
    pub payees: Vec<PayeeSummary>,
    pub total_amount: Decimal,
    pub eligible_before: DateTime<Utc>,
    pub next_payout_date: NaiveDate,
}

enum Settlement {
    Settled(u64),
    Unsettled(Vec<Uuid>),
}

#[derive(Clone)]
pub struct PayoutWorkflow {
    ctx: PayoutContext,
}

fn process_job(batch_id: Uuid) -> JobKind {
    JobKind::ProcessPayoutBatch { batch_id }
}

impl PayoutWorkflow {
    pub fn new(ctx: PayoutContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PayoutContext {
        &self.ctx
    }

    pub async fn trigger(&self, source: TriggerSource) -> Result<TriggerOutcome> {
        let ctx = &self.ctx;
        if let Some(current) = ctx.batches.in_flight().await? {
            info!(batch_id = %current.id, trigger = source.as_str(), "payout batch already in flight");
            return Ok(TriggerOutcome::AlreadyInFlight(current));
        }

        let now = ctx.clock.now();
        let snapshot = eligible_snapshot(ctx, now).await?;
        if snapshot.payees.is_empty() {
            return Err(PayoutError::NoEligiblePayees);
        }

        let batch = PayoutBatch::scheduled(
            source,
            snapshot.payees,
            snapshot.eligible_before,
            now,
            now + ctx.policy.review_delay(),
        );

        let batch = match ctx.batches.create_if_idle(batch).await? {
            CreateBatch::Created(batch) => batch,
            CreateBatch::InFlight(current) => return Ok(TriggerOutcome::AlreadyInFlight(current)),
        };

        ctx.jobs
            .enqueue(ScheduledJob::new(
                process_job(batch.id),
                batch.scheduled_at,
                now,
            ))
            .await?;

        info!(
            batch_id = %batch.id,
            trigger = source.as_str(),
            payees = batch.snapshot.len(),
            total = %batch.total_amount,
            scheduled_at = %batch.scheduled_at,
            "payout batch scheduled"
        );

        self.notify(&Notification::BatchScheduled {
            batch_id: batch.id,
            payee_count: batch.snapshot.len(),
            total_amount: batch.total_amount,
            currency: ctx.policy.currency.clone(),
            scheduled_at: batch.scheduled_at,
            cancel_reference: ctx.policy.cancel_reference(batch.id),
        })
        .await;

        Ok(TriggerOutcome::Scheduled(batch))
    }

    pub async fn cancel(&self, batch_id: Option<Uuid>) -> Result<PayoutBatch> {
        let ctx = &self.ctx;
        let current = ctx
            .batches
            .in_flight()
            .await?
            .ok_or_else(|| PayoutError::Conflict("no payout batch is scheduled".to_string()))?;

        if let Some(requested) = batch_id.filter(|requested| *requested != current.id) {
            return Err(PayoutError::Conflict(format!(
                "batch {requested} is not the in-flight batch"
            )));
        }

        if current.status != BatchStatus::Scheduled {
            return Err(PayoutError::Conflict(format!(
                "batch {} is already {}",
                current.id,
                current.status.as_str()
            )));
        }

        let now = ctx.clock.now();
        if !ctx.batches.cancel(current.id, now).await? {
            return Err(PayoutError::Conflict(format!(
                "batch {} is no longer scheduled",
                current.id
            )));
        }

        if let Err(err) = ctx.jobs.cancel(&process_job(current.id).dedupe_key()).await {
            warn!(batch_id = %current.id, "failed to cancel processing job: {err:#}");
        }

        info!(batch_id = %current.id, "payout batch cancelled");

        ctx.batches
            .get(current.id)
            .await?
            .ok_or_else(|| PayoutError::NotFound(format!("batch {}", current.id)))
    }

    pub async fn preview(&self) -> Result<PayoutPreview> {
        let now = self.ctx.clock.now();
        let snapshot = eligible_snapshot(&self.ctx, now).await?;
        Ok(PayoutPreview {
            payees: snapshot.payees,
            total_amount: snapshot.total_amount,
            eligible_before: snapshot.eligible_before,
            next_payout_date: next_payout_date(now.date_naive()),
        })
    }

    pub async fn current(&self) -> Result<Option<PayoutBatch>> {
        Ok(self.ctx.batches.in_flight().await?)
    }

    pub async fn batch(&self, batch_id: Uuid) -> Result<PayoutBatch> {
        self.ctx
            .batches
            .get(batch_id)
            .await?
            .ok_or_else(|| PayoutError::NotFound(format!("batch {batch_id}")))
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<PayoutBatch>> {
        Ok(self.ctx.batches.history(limit).await?)
    }

    /// Moves a due batch to processing and pays its snapshot in order. Safe
    /// to call again on a processing batch: payees that already have a
    /// result are skipped.
    pub async fn run_batch(&self, batch_id: Uuid) -> Result<BatchRun> {
        let ctx = &self.ctx;
        let batch = self.batch(batch_id).await?;
        let now = ctx.clock.now();

        match batch.status {
            BatchStatus::Completed | BatchStatus::Cancelled => {
                return Ok(BatchRun::Skipped(batch.status));
            }
            BatchStatus::Scheduled if batch.scheduled_at > now => {
                return Ok(BatchRun::NotDue(batch.scheduled_at));
            }
            BatchStatus::Scheduled => {
                if ctx.batches.begin_processing(batch_id, now).await? {
                    info!(batch_id = %batch_id, payees = batch.snapshot.len(), "payout batch processing");
                } else {
                    let current = self.batch(batch_id).await?;
                    if current.status != BatchStatus::Processing {
                        return Ok(BatchRun::Skipped(current.status));
                    }
                }
            }
            BatchStatus::Processing => {
                info!(
                    batch_id = %batch_id,
                    done = batch.results.len(),
                    payees = batch.snapshot.len(),
                    "resuming payout batch"
                );
            }
        }

        let batch = self.batch(batch_id).await?;
        let pause = ctx.policy.inter_payout_pause();
        let mut attempted = false;

        for payee in &batch.snapshot {
            if batch.has_result_for(payee.payee_id) {
                continue;
            }
            if attempted && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            attempted = true;

            let outcome = self.pay(&batch, payee).await;
            ctx.batches.record_outcome(batch_id, &outcome).await?;
        }

        let Some(completed) = ctx.batches.complete(batch_id, ctx.clock.now()).await? else {
            let current = self.batch(batch_id).await?;
            return Ok(BatchRun::Skipped(current.status));
        };

        let needs_reconciliation: Vec<_> = completed
            .results
            .iter()
            .filter(|result| result.needs_reconciliation())
            .map(|result| result.payee_id)
            .collect();

        info!(
            batch_id = %batch_id,
            processed = completed.processed_count,
            failed = completed.failed_count,
            paid = %completed.paid_amount(),
            "payout batch completed"
        );

        self.notify(&Notification::BatchCompleted {
            batch_id,
            processed: completed.processed_count,
            failed: completed.failed_count,
            total_amount: completed.total_amount,
            paid_amount: completed.paid_amount(),
            currency: ctx.policy.currency.clone(),
            needs_reconciliation,
        })
        .await;

        Ok(BatchRun::Completed(completed))
    }

    async fn pay(&self, batch: &PayoutBatch, payee: &PayeeSummary) -> PayeeOutcome {
        let ctx = &self.ctx;
        let started = ctx.clock.now();
        let (period_start, period_end) =
            settlement_period(started.date_naive(), ctx.policy.settlement_months);

        let metadata = PayoutMetadata {
            payee_id: payee.payee_id,
            batch_id: batch.id,
            period_start,
            period_end,
            entry_count: payee.entry_count,
        };

        let failed = |kind: FailureKind, message: String, remote: Option<(String, String)>| {
            let (remote_payout_id, remote_status) = remote.unzip();
            PayeeOutcome {
                payee_id: payee.payee_id,
                amount: payee.total_pending,
                success: false,
                remote_payout_id,
                remote_status,
                settled_entries: 0,
                failure: Some(PayoutFailure { kind, message }),
                processed_at: ctx.clock.now(),
            }
        };

        let remote = match ctx
            .gateway
            .create_payout(&payee.remote_account_id, payee.total_pending, &metadata)
            .await
        {
            Ok(remote) => remote,
            Err(err) => {
                warn!(
                    batch_id = %batch.id,
                    payee_id = payee.payee_id,
                    amount = %payee.total_pending,
                    "payout failed: {err}"
                );
                let kind = match err {
                    GatewayError::BelowMinimum { .. } => FailureKind::BelowMinimum,
                    GatewayError::Remote(_) | GatewayError::NotConfigured => FailureKind::Remote,
                };
                return failed(kind, err.to_string(), None);
            }
        };

        let remote_ref = Some((remote.remote_payout_id.clone(), remote.status.clone()));
        let record = PayoutRecord {
            id: Uuid::new_v4(),
            batch_id: batch.id,
            payee_id: payee.payee_id,
            amount: payee.total_pending,
            currency: ctx.policy.currency.clone(),
            remote_payout_id: remote.remote_payout_id.clone(),
            remote_account_id: payee.remote_account_id.clone(),
            status: remote.status.clone(),
            failure_reason: None,
            period_start,
            period_end,
            arrival_estimate: remote.arrival_estimate,
            created_at: started,
            updated_at: started,
        };

        match ctx.records.insert(&record).await {
            Ok(true) => {}
            Ok(false) => {
                info!(batch_id = %batch.id, payee_id = payee.payee_id, "payout record already stored");
            }
            Err(err) => {
                error!(
                    batch_id = %batch.id,
                    payee_id = payee.payee_id,
                    remote_payout_id = %remote.remote_payout_id,
                    reconcile = true,
                    "remote payout created but not recorded: {err:#}"
                );
                return failed(
                    FailureKind::DataIntegrity,
                    format!("payout {} not recorded: {err}", remote.remote_payout_id),
                    remote_ref,
                );
            }
        }

        let settled_entries = match self.settle(payee, &remote.remote_payout_id).await {
            Ok(Settlement::Settled(count)) => count,
            Ok(Settlement::Unsettled(unsettled)) => {
                error!(
                    batch_id = %batch.id,
                    payee_id = payee.payee_id,
                    remote_payout_id = %remote.remote_payout_id,
                    unsettled = ?unsettled,
                    reconcile = true,
                    "payout sent but snapshot entries were no longer pending"
                );
                return failed(
                    FailureKind::DataIntegrity,
                    format!(
                        "{} of {} entries not settled by payout {}",
                        unsettled.len(),
                        payee.entry_ids.len(),
                        remote.remote_payout_id
                    ),
                    remote_ref,
                );
            }
            Err(err) => {
                error!(
                    batch_id = %batch.id,
                    payee_id = payee.payee_id,
                    remote_payout_id = %remote.remote_payout_id,
                    reconcile = true,
                    "payout recorded but ledger not settled: {err:#}"
                );
                return failed(
                    FailureKind::DataIntegrity,
                    format!("ledger not settled for payout {}: {err}", remote.remote_payout_id),
                    remote_ref,
                );
            }
        };

        self.notify(&Notification::PayoutConfirmed {
            payee_id: payee.payee_id,
            amount: payee.total_pending,
            currency: ctx.policy.currency.clone(),
            period_start,
            period_end,
            payout_reference: remote.remote_payout_id.clone(),
            arrival_estimate: remote.arrival_estimate,
        })
        .await;

        info!(
            batch_id = %batch.id,
            payee_id = payee.payee_id,
            amount = %payee.total_pending,
            remote_payout_id = %remote.remote_payout_id,
            "payout sent"
        );

        PayeeOutcome {
            payee_id: payee.payee_id,
            amount: payee.total_pending,
            success: true,
            remote_payout_id: Some(remote.remote_payout_id),
            remote_status: Some(remote.status),
            settled_entries,
            failure: None,
            processed_at: ctx.clock.now(),
        }
    }

    /// Marks exactly the snapshot entries paid. Entries already settled by
    /// the same payout count as settled, so a resumed batch is clean; any
    /// other entry that is no longer pending is returned as unsettled.
    async fn settle(
        &self,
        payee: &PayeeSummary,
        payout_ref: &str,
    ) -> anyhow::Result<Settlement> {
        let ledger = &self.ctx.ledger;
        let updated = ledger
            .mark_paid(payee.payee_id, &payee.entry_ids, payout_ref, self.ctx.clock.now())
            .await?;
        if updated == payee.entry_ids.len() as u64 {
            return Ok(Settlement::Settled(updated));
        }

        let mut unsettled = Vec::new();
        for entry_id in &payee.entry_ids {
            let settled_here = ledger.get(*entry_id).await?.is_some_and(|entry| {
                entry.status == RoyaltyStatus::Paid
                    && entry.payout_ref.as_deref() == Some(payout_ref)
            });
            if !settled_here {
                unsettled.push(*entry_id);
            }
        }

        if unsettled.is_empty() {
            Ok(Settlement::Settled(updated))
        } else {
            Ok(Settlement::Unsettled(unsettled))
        }
    }

    pub async fn ensure_processing_job(&self) -> Result<bool> {
        let ctx = &self.ctx;
        match ctx.batches.in_flight().await? {
            Some(batch) if batch.status == BatchStatus::Scheduled => Ok(ctx
                .jobs
                .enqueue(ScheduledJob::new(
                    process_job(batch.id),
                    batch.scheduled_at,
                    ctx.clock.now(),
                ))
                .await?),
            _ => Ok(false),
        }
    }

    pub async fn recover(&self) -> Result<Option<BatchRun>> {
        let Some(batch) = self.ctx.batches.in_flight().await? else {
            return Ok(None);
        };

        match batch.status {
            BatchStatus::Processing => {
                warn!(batch_id = %batch.id, "resuming interrupted payout batch");
                self.run_batch(batch.id).await.map(Some)
            }
            _ => {
                if self.ensure_processing_job().await? {
                    info!(batch_id = %batch.id, "re-armed processing job for scheduled batch");
                }
                Ok(None)
            }
        }
    }

    async fn notify(&self, notification: &Notification) {
        if let Err(err) = self.ctx.notifier.notify(notification).await {
            warn!(kind = notification.kind(), "failed to send notification: {err:#}");
        }
    }
}
