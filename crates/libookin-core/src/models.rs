use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::percent_of;

pub type PayeeId = i64;
pub type SaleId = i64;
pub type ItemId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoyaltyStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl RoyaltyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unknown royalty status: {other}"),
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Paid)
                | (Self::Processing, Self::Paid)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewRoyaltyEntry {
    pub sale_id: SaleId,
    pub item_id: ItemId,
    pub payee_id: PayeeId,
    pub net_price: Decimal,
    pub royalty_percent: Decimal,
    pub promo_applied: bool,
}

impl NewRoyaltyEntry {
    pub fn royalty_amount(&self) -> Decimal {
        percent_of(self.net_price, self.royalty_percent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoyaltyEntry {
    pub id: Uuid,
    pub sale_id: SaleId,
    pub item_id: ItemId,
    pub payee_id: PayeeId,
    pub net_price: Decimal,
    pub royalty_percent: Decimal,
    pub royalty_amount: Decimal,
    pub promo_applied: bool,
    pub status: RoyaltyStatus,
    pub payout_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RoyaltyEntry {
    pub fn from_new(entry: NewRoyaltyEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            royalty_amount: entry.royalty_amount(),
            sale_id: entry.sale_id,
            item_id: entry.item_id,
            payee_id: entry.payee_id,
            net_price: entry.net_price,
            royalty_percent: entry.royalty_percent,
            promo_applied: entry.promo_applied,
            status: RoyaltyStatus::Pending,
            payout_ref: None,
            failure_reason: None,
            settled_at: None,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppendOutcome {
    pub entry_id: Uuid,
    pub created: bool,
}

/// Half-open creation-time window `[start, end)`; `start = None` is unbounded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl LedgerWindow {
    pub fn before(end: DateTime<Utc>) -> Self {
        Self { start: None, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start) && at < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingTotal {
    pub payee_id: PayeeId,
    pub total_pending: Decimal,
    pub entry_count: u64,
    pub entry_ids: Vec<Uuid>,
    pub oldest_entry_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    None,
    Created,
    PendingVerification,
    RequiresInformation,
    Verified,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Created => "created",
            Self::PendingVerification => "pending_verification",
            Self::RequiresInformation => "requires_information",
            Self::Verified => "verified",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "created" => Ok(Self::Created),
            "pending_verification" => Ok(Self::PendingVerification),
            "requires_information" => Ok(Self::RequiresInformation),
            "verified" => Ok(Self::Verified),
            other => anyhow::bail!("unknown account status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayeeAccount {
    pub payee_id: PayeeId,
    pub remote_account_id: Option<String>,
    pub account_status: AccountStatus,
    pub payouts_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl PayeeAccount {
    pub fn remote_account(&self) -> Option<&str> {
        self.remote_account_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayeeSummary {
    pub payee_id: PayeeId,
    pub total_pending: Decimal,
    pub entry_count: u64,
    /// The entries the payout settles; nothing outside this list is touched.
    pub entry_ids: Vec<Uuid>,
    pub oldest_entry_at: DateTime<Utc>,
    pub remote_account_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Scheduled,
    Processing,
    Completed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => anyhow::bail!("unknown batch status: {other}"),
        }
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Scheduled | Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "manual" => Ok(Self::Manual),
            other => anyhow::bail!("unknown trigger source: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Remote,
    BelowMinimum,
    DataIntegrity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayeeOutcome {
    pub payee_id: PayeeId,
    pub amount: Decimal,
    pub success: bool,
    pub remote_payout_id: Option<String>,
    pub remote_status: Option<String>,
    pub settled_entries: u64,
    pub failure: Option<PayoutFailure>,
    pub processed_at: DateTime<Utc>,
}

impl PayeeOutcome {
    pub fn needs_reconciliation(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|failure| failure.kind == FailureKind::DataIntegrity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutBatch {
    pub id: Uuid,
    pub status: BatchStatus,
    pub trigger: TriggerSource,
    pub scheduled_at: DateTime<Utc>,
    pub eligible_before: DateTime<Utc>,
    pub snapshot: Vec<PayeeSummary>,
    pub total_amount: Decimal,
    pub results: Vec<PayeeOutcome>,
    pub processed_count: u32,
    pub failed_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl PayoutBatch {
    pub fn scheduled(
        trigger: TriggerSource,
        snapshot: Vec<PayeeSummary>,
        eligible_before: DateTime<Utc>,
        created_at: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let total_amount = snapshot.iter().map(|payee| payee.total_pending).sum();
        Self {
            id: Uuid::new_v4(),
            status: BatchStatus::Scheduled,
            trigger,
            scheduled_at,
            eligible_before,
            snapshot,
            total_amount,
            results: Vec::new(),
            processed_count: 0,
            failed_count: 0,
            created_at,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    pub fn has_result_for(&self, payee_id: PayeeId) -> bool {
        self.results.iter().any(|result| result.payee_id == payee_id)
    }

    pub fn paid_amount(&self) -> Decimal {
        self.results
            .iter()
            .filter(|result| result.success)
            .map(|result| result.amount)
            .sum()
    }

    pub fn tally(&self) -> (u32, u32) {
        let processed = self.results.iter().filter(|result| result.success).count();
        let failed = self.results.len() - processed;
        (processed as u32, failed as u32)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub payee_id: PayeeId,
    pub amount: Decimal,
    pub currency: String,
    pub remote_payout_id: String,
    pub remote_account_id: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub arrival_estimate: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayeeLedgerTotals {
    pub payee_id: PayeeId,
    pub eligible_pending: Decimal,
    pub maturing_pending: Decimal,
    pub earned_since: Decimal,
    pub items_sold_since: u64,
}
