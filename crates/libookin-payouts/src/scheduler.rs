use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libookin_core::{JobKind, JobStatus, PayoutError, ScheduledJob, TriggerSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::calendar::is_payout_day;
use crate::workflow::{BatchRun, PayoutWorkflow, TriggerOutcome};

#[async_trait]
pub trait TickLoop {
    async fn tick(&self) -> Result<()>;
}

const DUE_JOBS_PER_TICK: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    pub payout_day_armed: bool,
    pub jobs_done: usize,
    pub jobs_retried: usize,
    pub jobs_parked: usize,
}

enum JobResult {
    Done,
    RunAt(DateTime<Utc>),
}

pub struct PayoutScheduler {
    workflow: PayoutWorkflow,
}

impl PayoutScheduler {
    pub fn new(workflow: PayoutWorkflow) -> Self {
        Self { workflow }
    }

    pub fn workflow(&self) -> &PayoutWorkflow {
        &self.workflow
    }

    pub async fn run_once(&self) -> Result<TickReport> {
        let ctx = self.workflow.context();
        let now = ctx.clock.now();
        let today = now.date_naive();
        let mut report = TickReport::default();

        if is_payout_day(today) {
            report.payout_day_armed = ctx
                .jobs
                .enqueue(ScheduledJob::new(JobKind::PayoutDayCheck { date: today }, now, now))
                .await?;
            if report.payout_day_armed {
                info!(%today, "payout day armed");
            }
        }

        self.workflow.ensure_processing_job().await?;

        for job in ctx.jobs.due(now, DUE_JOBS_PER_TICK).await? {
            match self.handle(&job).await {
                Ok(JobResult::Done) => {
                    ctx.jobs.complete(job.id).await?;
                    report.jobs_done += 1;
                }
                Ok(JobResult::RunAt(run_at)) => {
                    ctx.jobs
                        .retry(job.id, "not due yet", run_at, ctx.policy.job_max_attempts)
                        .await?;
                    report.jobs_retried += 1;
                }
                Err(err) => {
                    let retry_at = ctx.clock.now() + ctx.policy.job_retry_delay(job.attempts + 1);
                    let status = ctx
                        .jobs
                        .retry(job.id, &err.to_string(), retry_at, ctx.policy.job_max_attempts)
                        .await?;
                    if status == JobStatus::Failed {
                        error!(job = %job.dedupe_key, attempts = job.attempts + 1, "job parked: {err}");
                        report.jobs_parked += 1;
                    } else {
                        warn!(job = %job.dedupe_key, %retry_at, "job failed, will retry: {err}");
                        report.jobs_retried += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn handle(&self, job: &ScheduledJob) -> libookin_core::Result<JobResult> {
        match &job.kind {
            JobKind::PayoutDayCheck { date } => {
                match self.workflow.trigger(TriggerSource::Scheduled).await {
                    Ok(TriggerOutcome::Scheduled(batch)) => {
                        info!(%date, batch_id = %batch.id, "payout day batch scheduled");
                    }
                    Ok(TriggerOutcome::AlreadyInFlight(batch)) => {
                        info!(%date, batch_id = %batch.id, "payout day skipped, batch in flight");
                    }
                    Err(PayoutError::NoEligiblePayees) => {
                        info!(%date, "payout day skipped, no eligible payees");
                    }
                    Err(err) => return Err(err),
                }
                Ok(JobResult::Done)
            }
            JobKind::ProcessPayoutBatch { batch_id } => {
                match self.workflow.run_batch(*batch_id).await {
                    Ok(BatchRun::Completed(_)) => Ok(JobResult::Done),
                    Ok(BatchRun::NotDue(at)) => {
                        debug!(%batch_id, %at, "batch not due yet");
                        Ok(JobResult::RunAt(at))
                    }
                    Ok(BatchRun::Skipped(status)) => {
                        debug!(%batch_id, status = status.as_str(), "batch needs no processing");
                        Ok(JobResult::Done)
                    }
                    Err(PayoutError::NotFound(what)) => {
                        warn!(%batch_id, "dropping job for unknown {what}");
                        Ok(JobResult::Done)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

#[async_trait]
impl TickLoop for PayoutScheduler {
    async fn tick(&self) -> Result<()> {
        let report = self.run_once().await?;
        debug!(?report, "scheduler tick");
        Ok(())
    }
}
