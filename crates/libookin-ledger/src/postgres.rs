use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libookin_core::{
    AccountStatus, AppendOutcome, BatchStatus, BatchStore, CreateBatch, JobKind, JobQueue,
    JobStatus, LedgerWindow, NewRoyaltyEntry, PayeeAccount, PayeeDirectory, PayeeId,
    PayeeLedgerTotals, PayeeOutcome, PayoutBatch, PayoutRecord, PayoutRecordStore, PendingTotal,
    RoyaltyEntry, RoyaltyLedger, RoyaltyStatus, ScheduledJob, TriggerSource,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../migrations/0001_payouts.sql");

const ENTRY_COLUMNS: &str = "id, sale_id, item_id, payee_id, net_price, royalty_percent, royalty_amount, promo_applied, status, payout_ref, failure_reason, settled_at, created_at";

const BATCH_COLUMNS: &str = "id, status, trigger_source, scheduled_at, eligible_before, snapshot, total_amount, results, processed_count, failed_count, created_at, started_at, completed_at, cancelled_at";

const RECORD_COLUMNS: &str = "id, batch_id, payee_id, amount, currency, remote_payout_id, remote_account_id, status, failure_reason, period_start, period_end, arrival_estimate, created_at, updated_at";

pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply payout schema")?;
    Ok(())
}

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgPayoutRecords {
    pool: PgPool,
}

impl PgPayoutRecords {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgPayeeDirectory {
    pool: PgPool,
}

impl PgPayeeDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &PgRow) -> Result<RoyaltyEntry> {
    let status: String = row.try_get("status")?;
    Ok(RoyaltyEntry {
        id: row.try_get("id")?,
        sale_id: row.try_get("sale_id")?,
        item_id: row.try_get("item_id")?,
        payee_id: row.try_get("payee_id")?,
        net_price: row.try_get("net_price")?,
        royalty_percent: row.try_get("royalty_percent")?,
        royalty_amount: row.try_get("royalty_amount")?,
        promo_applied: row.try_get("promo_applied")?,
        status: RoyaltyStatus::parse(&status)?,
        payout_ref: row.try_get("payout_ref")?,
        failure_reason: row.try_get("failure_reason")?,
        settled_at: row.try_get("settled_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn batch_from_row(row: &PgRow) -> Result<PayoutBatch> {
    let status: String = row.try_get("status")?;
    let trigger: String = row.try_get("trigger_source")?;
    let snapshot: serde_json::Value = row.try_get("snapshot")?;
    let results: serde_json::Value = row.try_get("results")?;
    let processed_count: i32 = row.try_get("processed_count")?;
    let failed_count: i32 = row.try_get("failed_count")?;

    Ok(PayoutBatch {
        id: row.try_get("id")?,
        status: BatchStatus::parse(&status)?,
        trigger: TriggerSource::parse(&trigger)?,
        scheduled_at: row.try_get("scheduled_at")?,
        eligible_before: row.try_get("eligible_before")?,
        snapshot: serde_json::from_value(snapshot).context("corrupt batch snapshot")?,
        total_amount: row.try_get("total_amount")?,
        results: serde_json::from_value(results).context("corrupt batch results")?,
        processed_count: u32::try_from(processed_count)?,
        failed_count: u32::try_from(failed_count)?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<PayoutRecord> {
    Ok(PayoutRecord {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        payee_id: row.try_get("payee_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        remote_payout_id: row.try_get("remote_payout_id")?,
        remote_account_id: row.try_get("remote_account_id")?,
        status: row.try_get("status")?,
        failure_reason: row.try_get("failure_reason")?,
        period_start: row.try_get("period_start")?,
        period_end: row.try_get("period_end")?,
        arrival_estimate: row.try_get("arrival_estimate")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<ScheduledJob> {
    let kind: serde_json::Value = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let attempts: i32 = row.try_get("attempts")?;
    Ok(ScheduledJob {
        id: row.try_get("id")?,
        dedupe_key: row.try_get("dedupe_key")?,
        kind: serde_json::from_value::<JobKind>(kind).context("corrupt job kind")?,
        run_at: row.try_get("run_at")?,
        status: JobStatus::parse(&status)?,
        attempts: u32::try_from(attempts)?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl RoyaltyLedger for PgLedger {
    async fn append(
        &self,
        entry: NewRoyaltyEntry,
        created_at: DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO royalty_entries (
                id, sale_id, item_id, payee_id, net_price, royalty_percent,
                royalty_amount, promo_applied, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
            ON CONFLICT (sale_id, item_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.sale_id)
        .bind(entry.item_id)
        .bind(entry.payee_id)
        .bind(entry.net_price)
        .bind(entry.royalty_percent)
        .bind(entry.royalty_amount())
        .bind(entry.promo_applied)
        .bind(created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(entry_id) = inserted {
            return Ok(AppendOutcome {
                entry_id,
                created: true,
            });
        }

        let entry_id: Uuid = sqlx::query_scalar(
            "SELECT id FROM royalty_entries WHERE sale_id = $1 AND item_id = $2",
        )
        .bind(entry.sale_id)
        .bind(entry.item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(AppendOutcome {
            entry_id,
            created: false,
        })
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<RoyaltyEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM royalty_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn sum_pending(
        &self,
        payee_id: PayeeId,
        as_of: DateTime<Utc>,
        window: LedgerWindow,
    ) -> Result<Decimal> {
        let total: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT SUM(royalty_amount)
            FROM royalty_entries
            WHERE payee_id = $1
              AND status = 'pending'
              AND created_at <= $2
              AND created_at < $3
              AND ($4::timestamptz IS NULL OR created_at >= $4)
            "#,
        )
        .bind(payee_id)
        .bind(as_of)
        .bind(window.end)
        .bind(window.start)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(Decimal::ZERO))
    }

    async fn pending_totals(
        &self,
        window: LedgerWindow,
        min_amount: Decimal,
    ) -> Result<Vec<PendingTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT payee_id,
                   SUM(royalty_amount) AS total_pending,
                   COUNT(*) AS entry_count,
                   ARRAY_AGG(id ORDER BY created_at, id) AS entry_ids,
                   MIN(created_at) AS oldest_entry_at
            FROM royalty_entries
            WHERE status = 'pending'
              AND created_at < $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            GROUP BY payee_id
            HAVING SUM(royalty_amount) >= $3
            ORDER BY oldest_entry_at ASC, payee_id ASC
            "#,
        )
        .bind(window.end)
        .bind(window.start)
        .bind(min_amount)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let entry_count: i64 = row.try_get("entry_count")?;
                Ok(PendingTotal {
                    payee_id: row.try_get("payee_id")?,
                    total_pending: row.try_get("total_pending")?,
                    entry_count: u64::try_from(entry_count)?,
                    entry_ids: row.try_get("entry_ids")?,
                    oldest_entry_at: row.try_get("oldest_entry_at")?,
                })
            })
            .collect()
    }

    async fn mark_paid(
        &self,
        payee_id: PayeeId,
        entry_ids: &[Uuid],
        payout_ref: &str,
        settled_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE royalty_entries
            SET status = 'paid', payout_ref = $2, settled_at = $3
            WHERE payee_id = $1
              AND id = ANY($4)
              AND status = 'pending'
            "#,
        )
        .bind(payee_id)
        .bind(payout_ref)
        .bind(settled_at)
        .bind(entry_ids.to_vec())
        .execute(&self.pool)
        .await?;

        debug!(
            payee_id,
            payout_ref,
            requested = entry_ids.len(),
            settled = result.rows_affected(),
            "royalty entries marked paid"
        );
        Ok(result.rows_affected())
    }

    async fn mark_failed(&self, entry_ids: &[Uuid], reason: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE royalty_entries SET status = 'failed', failure_reason = $2 WHERE id = ANY($1) AND status = 'pending'",
        )
        .bind(entry_ids.to_vec())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        debug!(
            requested = entry_ids.len(),
            updated = result.rows_affected(),
            "royalty entries marked failed"
        );
        Ok(result.rows_affected())
    }

    async fn requeue_failed(&self, entry_ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE royalty_entries SET status = 'pending', failure_reason = NULL WHERE id = ANY($1) AND status = 'failed'",
        )
        .bind(entry_ids.to_vec())
        .execute(&self.pool)
        .await?;

        debug!(
            requested = entry_ids.len(),
            updated = result.rows_affected(),
            "failed royalty entries requeued"
        );
        Ok(result.rows_affected())
    }

    async fn entries_for_payee(&self, payee_id: PayeeId, limit: usize) -> Result<Vec<RoyaltyEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM royalty_entries WHERE payee_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(payee_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn payee_totals(
        &self,
        payee_id: PayeeId,
        eligible_before: DateTime<Utc>,
        earned_since: DateTime<Utc>,
    ) -> Result<PayeeLedgerTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(royalty_amount) FILTER (WHERE status = 'pending' AND created_at < $2), 0) AS eligible_pending,
                COALESCE(SUM(royalty_amount) FILTER (WHERE status = 'pending' AND created_at >= $2), 0) AS maturing_pending,
                COALESCE(SUM(royalty_amount) FILTER (WHERE created_at >= $3), 0) AS earned_since,
                COUNT(DISTINCT item_id) FILTER (WHERE created_at >= $3) AS items_sold_since
            FROM royalty_entries
            WHERE payee_id = $1
            "#,
        )
        .bind(payee_id)
        .bind(eligible_before)
        .bind(earned_since)
        .fetch_one(&self.pool)
        .await?;

        let items_sold_since: i64 = row.try_get("items_sold_since")?;
        Ok(PayeeLedgerTotals {
            payee_id,
            eligible_pending: row.try_get("eligible_pending")?,
            maturing_pending: row.try_get("maturing_pending")?,
            earned_since: row.try_get("earned_since")?,
            items_sold_since: u64::try_from(items_sold_since)?,
        })
    }
}

#[async_trait]
impl PayoutRecordStore for PgPayoutRecords {
    async fn insert(&self, record: &PayoutRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payout_records (
                id, batch_id, payee_id, amount, currency, remote_payout_id,
                remote_account_id, status, failure_reason, period_start, period_end,
                arrival_estimate, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (batch_id, payee_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.batch_id)
        .bind(record.payee_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(&record.remote_payout_id)
        .bind(&record.remote_account_id)
        .bind(&record.status)
        .bind(&record.failure_reason)
        .bind(record.period_start)
        .bind(record.period_end)
        .bind(record.arrival_estimate)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn for_batch(&self, batch_id: Uuid) -> Result<Vec<PayoutRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM payout_records WHERE batch_id = $1 ORDER BY created_at ASC"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn for_payee(&self, payee_id: PayeeId, limit: usize) -> Result<Vec<PayoutRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM payout_records WHERE payee_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(payee_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl BatchStore for PgBatchStore {
    async fn create_if_idle(&self, batch: PayoutBatch) -> Result<CreateBatch> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO payout_batches (
                id, status, trigger_source, scheduled_at, eligible_before, snapshot,
                total_amount, results, processed_count, failed_count, flight_slot, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, '[]'::jsonb, 0, 0, 1, $8)
            ON CONFLICT (flight_slot) DO NOTHING
            "#,
        )
        .bind(batch.id)
        .bind(batch.status.as_str())
        .bind(batch.trigger.as_str())
        .bind(batch.scheduled_at)
        .bind(batch.eligible_before)
        .bind(serde_json::to_value(&batch.snapshot)?)
        .bind(batch.total_amount)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(CreateBatch::Created(batch));
        }

        let current = self
            .in_flight()
            .await?
            .context("flight slot taken but no batch in flight; retry")?;
        Ok(CreateBatch::InFlight(current))
    }

    async fn in_flight(&self) -> Result<Option<PayoutBatch>> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM payout_batches WHERE flight_slot = 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(batch_from_row).transpose()
    }

    async fn get(&self, batch_id: Uuid) -> Result<Option<PayoutBatch>> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM payout_batches WHERE id = $1"
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(batch_from_row).transpose()
    }

    async fn begin_processing(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payout_batches SET status = 'processing', started_at = $2 WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(batch_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payout_batches SET status = 'cancelled', cancelled_at = $2, flight_slot = NULL WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(batch_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_outcome(&self, batch_id: Uuid, outcome: &PayeeOutcome) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM payout_batches WHERE id = $1 FOR UPDATE"
        ))
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut batch) = row.as_ref().map(batch_from_row).transpose()? else {
            return Ok(false);
        };
        if batch.status != BatchStatus::Processing || batch.has_result_for(outcome.payee_id) {
            return Ok(false);
        }

        batch.results.push(outcome.clone());
        let (processed, failed) = batch.tally();

        sqlx::query(
            "UPDATE payout_batches SET results = $2, processed_count = $3, failed_count = $4 WHERE id = $1",
        )
        .bind(batch_id)
        .bind(serde_json::to_value(&batch.results)?)
        .bind(i32::try_from(processed)?)
        .bind(i32::try_from(failed)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn complete(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<Option<PayoutBatch>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM payout_batches WHERE id = $1 FOR UPDATE"
        ))
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut batch) = row.as_ref().map(batch_from_row).transpose()? else {
            return Ok(None);
        };
        if batch.status != BatchStatus::Processing {
            return Ok(None);
        }

        let (processed, failed) = batch.tally();
        sqlx::query(
            r#"
            UPDATE payout_batches
            SET status = 'completed', completed_at = $2, processed_count = $3,
                failed_count = $4, flight_slot = NULL
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(at)
        .bind(i32::try_from(processed)?)
        .bind(i32::try_from(failed)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        batch.status = BatchStatus::Completed;
        batch.completed_at = Some(at);
        batch.processed_count = processed;
        batch.failed_count = failed;
        Ok(Some(batch))
    }

    async fn history(&self, limit: usize) -> Result<Vec<PayoutBatch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM payout_batches WHERE status IN ('completed', 'cancelled') ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(batch_from_row).collect()
    }
}

#[async_trait]
impl PayeeDirectory for PgPayeeDirectory {
    async fn account(&self, payee_id: PayeeId) -> Result<Option<PayeeAccount>> {
        let row = sqlx::query(
            "SELECT payee_id, remote_account_id, account_status, payouts_enabled, updated_at FROM payee_accounts WHERE payee_id = $1",
        )
        .bind(payee_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let account_status: String = row.try_get("account_status")?;
        Ok(Some(PayeeAccount {
            payee_id: row.try_get("payee_id")?,
            remote_account_id: row.try_get("remote_account_id")?,
            account_status: AccountStatus::parse(&account_status)?,
            payouts_enabled: row.try_get("payouts_enabled")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn upsert(&self, account: &PayeeAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payee_accounts (
                payee_id, remote_account_id, account_status, payouts_enabled, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (payee_id) DO UPDATE
            SET remote_account_id = EXCLUDED.remote_account_id,
                account_status = EXCLUDED.account_status,
                payouts_enabled = EXCLUDED.payouts_enabled,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(account.payee_id)
        .bind(&account.remote_account_id)
        .bind(account.account_status.as_str())
        .bind(account.payouts_enabled)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: ScheduledJob) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (
                id, dedupe_key, kind, run_at, status, attempts, last_error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.dedupe_key)
        .bind(serde_json::to_value(&job.kind)?)
        .bind(job.run_at)
        .bind(job.status.as_str())
        .bind(i32::try_from(job.attempts)?)
        .bind(&job.last_error)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, dedupe_key, kind, run_at, status, attempts, last_error, created_at
            FROM scheduled_jobs
            WHERE status = 'pending' AND run_at <= $1
            ORDER BY run_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET status = 'done', updated_at = $2 WHERE id = $1")
            .bind(job_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn retry(
        &self,
        job_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<JobStatus> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE scheduled_jobs
            SET attempts = attempts + 1,
                last_error = $2,
                run_at = $3,
                status = CASE WHEN attempts + 1 >= $4 THEN 'failed' ELSE 'pending' END,
                updated_at = $5
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(retry_at)
        .bind(i32::try_from(max_attempts)?)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let status = status.with_context(|| format!("job {job_id} not found"))?;
        JobStatus::parse(&status)
    }

    async fn cancel(&self, dedupe_key: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET status = 'cancelled', updated_at = $2 WHERE dedupe_key = $1 AND status = 'pending'",
        )
        .bind(dedupe_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
