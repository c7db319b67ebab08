use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PayeeId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    BatchScheduled {
        batch_id: Uuid,
        payee_count: usize,
        total_amount: Decimal,
        currency: String,
        scheduled_at: DateTime<Utc>,
        cancel_reference: String,
    },
    BatchCompleted {
        batch_id: Uuid,
        processed: u32,
        failed: u32,
        total_amount: Decimal,
        paid_amount: Decimal,
        currency: String,
        needs_reconciliation: Vec<PayeeId>,
    },
    PayoutConfirmed {
        payee_id: PayeeId,
        amount: Decimal,
        currency: String,
        period_start: NaiveDate,
        period_end: NaiveDate,
        payout_reference: String,
        arrival_estimate: Option<NaiveDate>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BatchScheduled { .. } => "batch_scheduled",
            Self::BatchCompleted { .. } => "batch_completed",
            Self::PayoutConfirmed { .. } => "payout_confirmed",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
