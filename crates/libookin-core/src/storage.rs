use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AppendOutcome, LedgerWindow, NewRoyaltyEntry, PayeeAccount, PayeeId, PayeeLedgerTotals,
    PayeeOutcome, PayoutBatch, PayoutRecord, PendingTotal, RoyaltyEntry,
};

/// Durable per-sale royalty entries. All mutations are conditional on the
/// current status of the affected rows.
#[async_trait]
pub trait RoyaltyLedger: Send + Sync {
    /// Idempotent on `(sale_id, item_id)`: a replay returns the existing id.
    async fn append(
        &self,
        entry: NewRoyaltyEntry,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<AppendOutcome>;

    async fn get(&self, entry_id: Uuid) -> anyhow::Result<Option<RoyaltyEntry>>;

    async fn sum_pending(
        &self,
        payee_id: PayeeId,
        as_of: DateTime<Utc>,
        window: LedgerWindow,
    ) -> anyhow::Result<Decimal>;

    async fn pending_totals(
        &self,
        window: LedgerWindow,
        min_amount: Decimal,
    ) -> anyhow::Result<Vec<PendingTotal>>;

    /// Moves the listed entries of `payee_id` that are still `pending` to
    /// `paid`. Returns the number updated; a replay updates none.
    async fn mark_paid(
        &self,
        payee_id: PayeeId,
        entry_ids: &[Uuid],
        payout_ref: &str,
        settled_at: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    async fn mark_failed(&self, entry_ids: &[Uuid], reason: &str) -> anyhow::Result<u64>;

    async fn requeue_failed(&self, entry_ids: &[Uuid]) -> anyhow::Result<u64>;

    async fn entries_for_payee(
        &self,
        payee_id: PayeeId,
        limit: usize,
    ) -> anyhow::Result<Vec<RoyaltyEntry>>;

    async fn payee_totals(
        &self,
        payee_id: PayeeId,
        eligible_before: DateTime<Utc>,
        earned_since: DateTime<Utc>,
    ) -> anyhow::Result<PayeeLedgerTotals>;
}

#[async_trait]
pub trait PayoutRecordStore: Send + Sync {
    async fn insert(&self, record: &PayoutRecord) -> anyhow::Result<bool>;

    async fn for_batch(&self, batch_id: Uuid) -> anyhow::Result<Vec<PayoutRecord>>;

    async fn for_payee(&self, payee_id: PayeeId, limit: usize)
    -> anyhow::Result<Vec<PayoutRecord>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateBatch {
    Created(PayoutBatch),
    InFlight(PayoutBatch),
}

/// Batch records. At most one batch is `scheduled` or `processing` at a time.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Inserts `batch` unless another batch is in flight.
    async fn create_if_idle(&self, batch: PayoutBatch) -> anyhow::Result<CreateBatch>;

    async fn in_flight(&self) -> anyhow::Result<Option<PayoutBatch>>;

    async fn get(&self, batch_id: Uuid) -> anyhow::Result<Option<PayoutBatch>>;

    async fn begin_processing(&self, batch_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool>;

    async fn cancel(&self, batch_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool>;

    /// Appends a per-payee result to a processing batch. Ignores a second
    /// result for the same payee and returns `false`.
    async fn record_outcome(&self, batch_id: Uuid, outcome: &PayeeOutcome)
    -> anyhow::Result<bool>;

    async fn complete(
        &self,
        batch_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<PayoutBatch>>;

    async fn history(&self, limit: usize) -> anyhow::Result<Vec<PayoutBatch>>;
}

#[async_trait]
pub trait PayeeDirectory: Send + Sync {
    async fn account(&self, payee_id: PayeeId) -> anyhow::Result<Option<PayeeAccount>>;

    async fn upsert(&self, account: &PayeeAccount) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    PayoutDayCheck { date: NaiveDate },
    ProcessPayoutBatch { batch_id: Uuid },
}

impl JobKind {
    pub fn dedupe_key(&self) -> String {
        match self {
            Self::PayoutDayCheck { date } => format!("payout-day:{date}"),
            Self::ProcessPayoutBatch { batch_id } => format!("process-batch:{batch_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Done,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unknown job status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub dedupe_key: String,
    pub kind: JobKind,
    pub run_at: DateTime<Utc>,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(kind: JobKind, run_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dedupe_key: kind.dedupe_key(),
            kind,
            run_at,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at,
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns `false` if a job with the same dedupe key exists in any state.
    async fn enqueue(&self, job: ScheduledJob) -> anyhow::Result<bool>;

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<ScheduledJob>>;

    async fn complete(&self, job_id: Uuid) -> anyhow::Result<()>;

    /// Records a failed attempt. The job is parked as `failed` once
    /// `max_attempts` is reached, otherwise it runs again at `retry_at`.
    async fn retry(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> anyhow::Result<JobStatus>;

    async fn cancel(&self, dedupe_key: &str) -> anyhow::Result<bool>;
}
