pub mod clock;
pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod money;
pub mod notify;
pub mod policy;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PayoutError, Result};
pub use events::{PayoutCommand, Promo, SaleCompleted, SaleLine};
pub use gateway::{
    AccountBalance, AccountStatusReport, GatewayError, PaymentGateway, PayoutMetadata,
    RemotePayout,
};
pub use models::{
    AccountStatus, AppendOutcome, BatchStatus, FailureKind, ItemId, LedgerWindow,
    NewRoyaltyEntry, PayeeAccount, PayeeId, PayeeLedgerTotals, PayeeOutcome, PayeeSummary,
    PayoutBatch, PayoutFailure, PayoutRecord, PendingTotal, RoyaltyEntry, RoyaltyStatus, SaleId,
    TriggerSource,
};
pub use notify::{Notification, Notifier};
pub use policy::{MAX_REVIEW_DELAY_HOURS, PayoutPolicy};
pub use storage::{
    BatchStore, CreateBatch, JobKind, JobQueue, JobStatus, PayeeDirectory, PayoutRecordStore,
    RoyaltyLedger, ScheduledJob,
};
