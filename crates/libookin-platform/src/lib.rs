pub mod config;
pub mod contracts;
pub mod db;
pub mod redis_bus;

pub use config::{ServiceConfig, payout_policy_from_lookup};
pub use contracts::{
    BatchActionResponse, CancelBatchRequest, CurrentBatchResponse, EntryCorrectionResponse,
    LinkAccountRequest, ListQuery, MarkEntriesFailedRequest, PayeeRoyaltiesResponse,
    RequeueEntriesRequest,
};
pub use db::connect_database;
pub use redis_bus::{PAYOUT_NOTIFICATIONS, RedisBus, RedisNotifier, SALES_COMPLETED};
