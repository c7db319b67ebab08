#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use libookin_core::{JobQueue, ManualClock, PayoutPolicy, SaleCompleted, SaleLine};
use libookin_ledger::InMemoryJobQueue;
use libookin_payouts::testing::{RecordingNotifier, StubGateway};
use libookin_payouts::{PayoutContext, PayoutScheduler, PayoutWorkflow, ingest_sale, link_account};
use rust_decimal::Decimal;

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn eur(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn test_policy() -> PayoutPolicy {
    PayoutPolicy {
        min_amount: eur(500),
        inter_payout_pause_ms: 0,
        ..PayoutPolicy::default()
    }
}

pub struct Harness {
    pub ctx: PayoutContext,
    pub workflow: PayoutWorkflow,
    pub gateway: Arc<StubGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub jobs: Arc<InMemoryJobQueue>,
}

impl Harness {
    /// Starts on 2025-01-10, when the test sales happen.
    pub fn new(gateway: StubGateway) -> Self {
        Self::with_notifier(gateway, RecordingNotifier::new())
    }

    pub fn with_notifier(gateway: StubGateway, notifier: RecordingNotifier) -> Self {
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(notifier);
        let clock = Arc::new(ManualClock::new(at(2025, 1, 10, 12)));
        let jobs = Arc::new(InMemoryJobQueue::new());

        let mut ctx = PayoutContext::in_memory(
            gateway.clone(),
            notifier.clone(),
            clock.clone(),
            test_policy(),
        );
        let queue: Arc<dyn JobQueue> = jobs.clone();
        ctx.jobs = queue;

        Self {
            workflow: PayoutWorkflow::new(ctx.clone()),
            ctx,
            gateway,
            notifier,
            clock,
            jobs,
        }
    }

    pub fn rebuild(&mut self) {
        self.workflow = PayoutWorkflow::new(self.ctx.clone());
    }

    pub fn scheduler(&self) -> PayoutScheduler {
        PayoutScheduler::new(self.workflow.clone())
    }

    pub async fn link(&self, payee_id: i64, remote_account_id: &str) {
        link_account(&self.ctx, payee_id, Some(remote_account_id.to_string()))
            .await
            .unwrap();
    }

    /// One single-line sale on the current clock day.
    pub async fn sell(&self, sale_id: i64, payee_id: i64, net_cents: i64) {
        let event = SaleCompleted {
            sale_id,
            sale_date: self.clock_now().date_naive(),
            items: vec![SaleLine {
                item_id: sale_id * 10,
                payee_id,
                net_price_before_tax: eur(net_cents),
                promo: None,
            }],
        };
        ingest_sale(&self.ctx, &event).await.unwrap();
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        use libookin_core::Clock;
        self.clock.now()
    }

    /// 2025-04-01 is a Tuesday and a payout day.
    pub fn go_to_payout_day(&self) {
        self.clock.set(at(2025, 4, 1, 9));
    }
}
