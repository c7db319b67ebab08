use libookin_core::{PayeeId, PayoutBatch, RoyaltyEntry};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchActionResponse {
    pub status: String,
    pub batch: PayoutBatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelBatchRequest {
    #[serde(default)]
    pub batch_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentBatchResponse {
    pub batch: Option<PayoutBatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkAccountRequest {
    #[serde(default)]
    pub remote_account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkEntriesFailedRequest {
    pub entry_ids: Vec<Uuid>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueEntriesRequest {
    pub entry_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryCorrectionResponse {
    pub requested: usize,
    pub updated: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayeeRoyaltiesResponse {
    pub payee_id: PayeeId,
    pub entries: Vec<RoyaltyEntry>,
}
