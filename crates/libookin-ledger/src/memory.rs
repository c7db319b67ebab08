use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libookin_core::{
    AppendOutcome, BatchStatus, BatchStore, CreateBatch, JobQueue, JobStatus, LedgerWindow,
    NewRoyaltyEntry, PayeeAccount, PayeeDirectory, PayeeId, PayeeLedgerTotals, PayeeOutcome,
    PayoutBatch, PayoutRecord, PayoutRecordStore, PendingTotal, RoyaltyEntry, RoyaltyLedger,
    RoyaltyStatus, ScheduledJob,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryLedger {
    entries: RwLock<Vec<RoyaltyEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoyaltyLedger for InMemoryLedger {
    async fn append(
        &self,
        entry: NewRoyaltyEntry,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<AppendOutcome> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries
            .iter()
            .find(|row| row.sale_id == entry.sale_id && row.item_id == entry.item_id)
        {
            return Ok(AppendOutcome {
                entry_id: existing.id,
                created: false,
            });
        }

        let row = RoyaltyEntry::from_new(entry, created_at);
        let entry_id = row.id;
        entries.push(row);
        Ok(AppendOutcome {
            entry_id,
            created: true,
        })
    }

    async fn get(&self, entry_id: Uuid) -> anyhow::Result<Option<RoyaltyEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|row| row.id == entry_id).cloned())
    }

    async fn sum_pending(
        &self,
        payee_id: PayeeId,
        as_of: DateTime<Utc>,
        window: LedgerWindow,
    ) -> anyhow::Result<Decimal> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|row| {
                row.payee_id == payee_id
                    && row.status == RoyaltyStatus::Pending
                    && row.created_at <= as_of
                    && window.contains(row.created_at)
            })
            .map(|row| row.royalty_amount)
            .sum())
    }

    async fn pending_totals(
        &self,
        window: LedgerWindow,
        min_amount: Decimal,
    ) -> anyhow::Result<Vec<PendingTotal>> {
        let entries = self.entries.read().await;
        let mut by_payee: HashMap<PayeeId, PendingTotal> = HashMap::new();

        for row in entries
            .iter()
            .filter(|row| row.status == RoyaltyStatus::Pending && window.contains(row.created_at))
        {
            let total = by_payee.entry(row.payee_id).or_insert(PendingTotal {
                payee_id: row.payee_id,
                total_pending: Decimal::ZERO,
                entry_count: 0,
                entry_ids: Vec::new(),
                oldest_entry_at: row.created_at,
            });
            total.total_pending += row.royalty_amount;
            total.entry_count += 1;
            total.entry_ids.push(row.id);
            total.oldest_entry_at = total.oldest_entry_at.min(row.created_at);
        }

        let mut totals: Vec<PendingTotal> = by_payee
            .into_values()
            .filter(|total| total.total_pending >= min_amount)
            .collect();
        totals.sort_by(|a, b| {
            a.oldest_entry_at
                .cmp(&b.oldest_entry_at)
                .then(a.payee_id.cmp(&b.payee_id))
        });
        Ok(totals)
    }

    async fn mark_paid(
        &self,
        payee_id: PayeeId,
        entry_ids: &[Uuid],
        payout_ref: &str,
        settled_at: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut entries = self.entries.write().await;
        let mut updated = 0;
        for row in entries.iter_mut().filter(|row| {
            row.payee_id == payee_id
                && row.status == RoyaltyStatus::Pending
                && entry_ids.contains(&row.id)
        }) {
            row.status = RoyaltyStatus::Paid;
            row.payout_ref = Some(payout_ref.to_string());
            row.settled_at = Some(settled_at);
            updated += 1;
        }
        Ok(updated)
    }

    async fn mark_failed(&self, entry_ids: &[Uuid], reason: &str) -> anyhow::Result<u64> {
        let mut entries = self.entries.write().await;
        let mut updated = 0;
        for row in entries
            .iter_mut()
            .filter(|row| row.status == RoyaltyStatus::Pending && entry_ids.contains(&row.id))
        {
            row.status = RoyaltyStatus::Failed;
            row.failure_reason = Some(reason.to_string());
            updated += 1;
        }
        Ok(updated)
    }

    async fn requeue_failed(&self, entry_ids: &[Uuid]) -> anyhow::Result<u64> {
        let mut entries = self.entries.write().await;
        let mut updated = 0;
        for row in entries
            .iter_mut()
            .filter(|row| row.status == RoyaltyStatus::Failed && entry_ids.contains(&row.id))
        {
            row.status = RoyaltyStatus::Pending;
            row.failure_reason = None;
            updated += 1;
        }
        Ok(updated)
    }

    async fn entries_for_payee(
        &self,
        payee_id: PayeeId,
        limit: usize,
    ) -> anyhow::Result<Vec<RoyaltyEntry>> {
        let entries = self.entries.read().await;
        let mut rows: Vec<RoyaltyEntry> = entries
            .iter()
            .filter(|row| row.payee_id == payee_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn payee_totals(
        &self,
        payee_id: PayeeId,
        eligible_before: DateTime<Utc>,
        earned_since: DateTime<Utc>,
    ) -> anyhow::Result<PayeeLedgerTotals> {
        let entries = self.entries.read().await;
        let mut totals = PayeeLedgerTotals {
            payee_id,
            eligible_pending: Decimal::ZERO,
            maturing_pending: Decimal::ZERO,
            earned_since: Decimal::ZERO,
            items_sold_since: 0,
        };

        let mut items_sold = HashSet::new();
        for row in entries.iter().filter(|row| row.payee_id == payee_id) {
            if row.status == RoyaltyStatus::Pending {
                if row.created_at < eligible_before {
                    totals.eligible_pending += row.royalty_amount;
                } else {
                    totals.maturing_pending += row.royalty_amount;
                }
            }
            if row.created_at >= earned_since {
                totals.earned_since += row.royalty_amount;
                items_sold.insert(row.item_id);
            }
        }
        totals.items_sold_since = items_sold.len() as u64;
        Ok(totals)
    }
}

#[derive(Default)]
pub struct InMemoryPayoutRecords {
    records: RwLock<Vec<PayoutRecord>>,
}

impl InMemoryPayoutRecords {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutRecordStore for InMemoryPayoutRecords {
    async fn insert(&self, record: &PayoutRecord) -> anyhow::Result<bool> {
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|row| row.batch_id == record.batch_id && row.payee_id == record.payee_id)
        {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn for_batch(&self, batch_id: Uuid) -> anyhow::Result<Vec<PayoutRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|row| row.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn for_payee(
        &self,
        payee_id: PayeeId,
        limit: usize,
    ) -> anyhow::Result<Vec<PayoutRecord>> {
        let records = self.records.read().await;
        let mut rows: Vec<PayoutRecord> = records
            .iter()
            .filter(|row| row.payee_id == payee_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<Vec<PayoutBatch>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn create_if_idle(&self, batch: PayoutBatch) -> anyhow::Result<CreateBatch> {
        let mut batches = self.batches.write().await;
        if let Some(current) = batches.iter().find(|row| row.status.is_in_flight()) {
            return Ok(CreateBatch::InFlight(current.clone()));
        }
        batches.push(batch.clone());
        Ok(CreateBatch::Created(batch))
    }

    async fn in_flight(&self) -> anyhow::Result<Option<PayoutBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.iter().find(|row| row.status.is_in_flight()).cloned())
    }

    async fn get(&self, batch_id: Uuid) -> anyhow::Result<Option<PayoutBatch>> {
        let batches = self.batches.read().await;
        Ok(batches.iter().find(|row| row.id == batch_id).cloned())
    }

    async fn begin_processing(&self, batch_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut batches = self.batches.write().await;
        match batches
            .iter_mut()
            .find(|row| row.id == batch_id && row.status == BatchStatus::Scheduled)
        {
            Some(batch) => {
                batch.status = BatchStatus::Processing;
                batch.started_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cancel(&self, batch_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut batches = self.batches.write().await;
        match batches
            .iter_mut()
            .find(|row| row.id == batch_id && row.status == BatchStatus::Scheduled)
        {
            Some(batch) => {
                batch.status = BatchStatus::Cancelled;
                batch.cancelled_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_outcome(
        &self,
        batch_id: Uuid,
        outcome: &PayeeOutcome,
    ) -> anyhow::Result<bool> {
        let mut batches = self.batches.write().await;
        let Some(batch) = batches
            .iter_mut()
            .find(|row| row.id == batch_id && row.status == BatchStatus::Processing)
        else {
            return Ok(false);
        };
        if batch.has_result_for(outcome.payee_id) {
            return Ok(false);
        }

        batch.results.push(outcome.clone());
        (batch.processed_count, batch.failed_count) = batch.tally();
        Ok(true)
    }

    async fn complete(
        &self,
        batch_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<PayoutBatch>> {
        let mut batches = self.batches.write().await;
        let Some(batch) = batches
            .iter_mut()
            .find(|row| row.id == batch_id && row.status == BatchStatus::Processing)
        else {
            return Ok(None);
        };

        batch.status = BatchStatus::Completed;
        batch.completed_at = Some(at);
        (batch.processed_count, batch.failed_count) = batch.tally();
        Ok(Some(batch.clone()))
    }

    async fn history(&self, limit: usize) -> anyhow::Result<Vec<PayoutBatch>> {
        let batches = self.batches.read().await;
        let mut rows: Vec<PayoutBatch> = batches
            .iter()
            .filter(|row| !row.status.is_in_flight())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: RwLock<Vec<ScheduledJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.read().await.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ScheduledJob) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|row| row.dedupe_key == job.dedupe_key) {
            return Ok(false);
        }
        jobs.push(job);
        Ok(true)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<ScheduledJob>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<ScheduledJob> = jobs
            .iter()
            .filter(|row| row.status == JobStatus::Pending && row.run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn complete(&self, job_id: Uuid) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.iter_mut().find(|row| row.id == job_id) {
            job.status = JobStatus::Done;
        }
        Ok(())
    }

    async fn retry(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> anyhow::Result<JobStatus> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|row| row.id == job_id)
            .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;

        job.attempts += 1;
        job.last_error = Some(error.to_string());
        job.run_at = retry_at;
        job.status = if job.attempts >= max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        Ok(job.status)
    }

    async fn cancel(&self, dedupe_key: &str) -> anyhow::Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs
            .iter_mut()
            .find(|row| row.dedupe_key == dedupe_key && row.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPayeeDirectory {
    accounts: RwLock<HashMap<PayeeId, PayeeAccount>>,
}

impl InMemoryPayeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayeeDirectory for InMemoryPayeeDirectory {
    async fn account(&self, payee_id: PayeeId) -> anyhow::Result<Option<PayeeAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&payee_id).cloned())
    }

    async fn upsert(&self, account: &PayeeAccount) -> anyhow::Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.payee_id, account.clone());
        Ok(())
    }
}
