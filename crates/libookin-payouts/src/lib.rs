pub mod calendar;
mod context;
mod eligibility;
mod payees;
mod royalties;
mod scheduler;
pub mod testing;
mod workflow;

pub use context::PayoutContext;
pub use eligibility::{EligibleSnapshot, compute_eligible_payees, eligible_snapshot};
pub use payees::{
    PAYOUT_HISTORY_LIMIT, PayeeBalance, link_account, payee_balance, payout_history,
    royalty_entries,
};
pub use royalties::{IngestReport, ingest_sale, mark_entries_failed, requeue_failed_entries};
pub use scheduler::{PayoutScheduler, TickLoop, TickReport};
pub use workflow::{BatchRun, PayoutPreview, PayoutWorkflow, TriggerOutcome};
