use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountStatus, PayeeId};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GatewayError {
    #[error("payment processor error: {0}")]
    Remote(String),

    #[error("payout amount {amount} is below the processor minimum of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("payment processor is not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountStatusReport {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub requirements: Vec<String>,
}

impl AccountStatusReport {
    pub fn verification_status(&self) -> AccountStatus {
        if self.charges_enabled && self.payouts_enabled {
            AccountStatus::Verified
        } else if self.details_submitted {
            AccountStatus::PendingVerification
        } else if !self.requirements.is_empty() {
            AccountStatus::RequiresInformation
        } else {
            AccountStatus::Created
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBalance {
    pub available: Decimal,
    pub pending: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayoutMetadata {
    pub payee_id: PayeeId,
    pub batch_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub entry_count: u64,
}

impl PayoutMetadata {
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.batch_id, self.payee_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemotePayout {
    pub remote_payout_id: String,
    pub status: String,
    pub arrival_estimate: Option<NaiveDate>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn account_status(
        &self,
        remote_account_id: &str,
    ) -> Result<AccountStatusReport, GatewayError>;

    async fn balance(&self, remote_account_id: &str) -> Result<AccountBalance, GatewayError>;

    async fn create_payout(
        &self,
        remote_account_id: &str,
        amount: Decimal,
        metadata: &PayoutMetadata,
    ) -> Result<RemotePayout, GatewayError>;
}
