mod memory;
mod postgres;

pub use memory::{
    InMemoryBatchStore, InMemoryJobQueue, InMemoryLedger, InMemoryPayeeDirectory,
    InMemoryPayoutRecords,
};
pub use postgres::{
    PgBatchStore, PgJobQueue, PgLedger, PgPayeeDirectory, PgPayoutRecords, apply_schema,
};
