use std::time::Duration as StdDuration;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MAX_REVIEW_DELAY_HOURS: i64 = 720;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutPolicy {
    pub min_amount: Decimal,
    pub window_months_ago: u32,
    pub settlement_months: u32,
    pub review_delay_hours: i64,
    pub inter_payout_pause_ms: u64,
    pub currency: String,
    pub admin_base_url: String,
    pub job_max_attempts: u32,
    pub job_retry_secs: i64,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(1500, 2),
            window_months_ago: 3,
            settlement_months: 2,
            review_delay_hours: 6,
            inter_payout_pause_ms: 1000,
            currency: "EUR".to_string(),
            admin_base_url: "http://localhost:8090".to_string(),
            job_max_attempts: 5,
            job_retry_secs: 300,
        }
    }
}

impl PayoutPolicy {
    pub fn review_delay(&self) -> Duration {
        Duration::hours(self.review_delay_hours.clamp(0, MAX_REVIEW_DELAY_HOURS))
    }

    pub fn inter_payout_pause(&self) -> StdDuration {
        StdDuration::from_millis(self.inter_payout_pause_ms)
    }

    pub fn job_retry_delay(&self, attempt: u32) -> Duration {
        Duration::seconds(self.job_retry_secs * i64::from(attempt.max(1)))
    }

    pub fn cancel_reference(&self, batch_id: uuid::Uuid) -> String {
        format!(
            "{}/payouts/cancel?batch_id={}",
            self.admin_base_url.trim_end_matches('/'),
            batch_id
        )
    }
}
