use std::sync::Arc;

use libookin_core::{
    BatchStore, Clock, JobQueue, Notifier, PayeeDirectory, PaymentGateway, PayoutPolicy,
    PayoutRecordStore, RoyaltyLedger,
};
use libookin_ledger::{
    InMemoryBatchStore, InMemoryJobQueue, InMemoryLedger, InMemoryPayeeDirectory,
    InMemoryPayoutRecords, PgBatchStore, PgJobQueue, PgLedger, PgPayeeDirectory,
    PgPayoutRecords,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct PayoutContext {
    pub ledger: Arc<dyn RoyaltyLedger>,
    pub records: Arc<dyn PayoutRecordStore>,
    pub batches: Arc<dyn BatchStore>,
    pub jobs: Arc<dyn JobQueue>,
    pub payees: Arc<dyn PayeeDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub policy: PayoutPolicy,
}

impl PayoutContext {
    pub fn postgres(
        pool: PgPool,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: PayoutPolicy,
    ) -> Self {
        Self {
            ledger: Arc::new(PgLedger::new(pool.clone())),
            records: Arc::new(PgPayoutRecords::new(pool.clone())),
            batches: Arc::new(PgBatchStore::new(pool.clone())),
            jobs: Arc::new(PgJobQueue::new(pool.clone())),
            payees: Arc::new(PgPayeeDirectory::new(pool)),
            gateway,
            notifier,
            clock,
            policy,
        }
    }

    pub fn in_memory(
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: PayoutPolicy,
    ) -> Self {
        Self {
            ledger: Arc::new(InMemoryLedger::new()),
            records: Arc::new(InMemoryPayoutRecords::new()),
            batches: Arc::new(InMemoryBatchStore::new()),
            jobs: Arc::new(InMemoryJobQueue::new()),
            payees: Arc::new(InMemoryPayeeDirectory::new()),
            gateway,
            notifier,
            clock,
            policy,
        }
    }
}
