mod support;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use libookin_core::{
    AccountStatus, PayeeAccount, PayeeDirectory, PayeeId, PayoutError, Promo, RoyaltyStatus,
    SaleCompleted, SaleLine, TriggerSource,
};
use libookin_payouts::testing::StubGateway;
use libookin_payouts::{
    compute_eligible_payees, ingest_sale, link_account, mark_entries_failed, payee_balance,
    payout_history, requeue_failed_entries, royalty_entries,
};
use support::{Harness, at, date, eur};

fn line(item_id: i64, payee_id: i64, cents: i64) -> SaleLine {
    SaleLine {
        item_id,
        payee_id,
        net_price_before_tax: eur(cents),
        promo: None,
    }
}

#[tokio::test]
async fn redelivered_sale_only_replays() {
    let h = Harness::new(StubGateway::new());
    let event = SaleCompleted {
        sale_id: 7,
        sale_date: date(2025, 1, 10),
        items: vec![line(1, 3, 1000), line(2, 3, 250)],
    };

    let first = ingest_sale(&h.ctx, &event).await.unwrap();
    assert_eq!((first.created, first.replayed), (2, 0));

    let second = ingest_sale(&h.ctx, &event).await.unwrap();
    assert_eq!((second.created, second.replayed), (0, 2));
    assert_eq!(first.entry_ids, second.entry_ids);

    let entries = royalty_entries(&h.ctx, 3, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    let total: rust_decimal::Decimal = entries.iter().map(|entry| entry.royalty_amount).sum();
    // 10.00 at 70% plus 2.50 at 50%
    assert_eq!(total, eur(825));
}

#[tokio::test]
async fn invalid_line_rejects_the_whole_sale() {
    let h = Harness::new(StubGateway::new());
    let event = SaleCompleted {
        sale_id: 8,
        sale_date: date(2025, 1, 10),
        items: vec![line(1, 3, 1000), line(2, 3, -100)],
    };
    assert!(matches!(
        ingest_sale(&h.ctx, &event).await,
        Err(PayoutError::Validation(_))
    ));
    assert!(royalty_entries(&h.ctx, 3, 10).await.unwrap().is_empty());

    let empty = SaleCompleted {
        sale_id: 9,
        sale_date: date(2025, 1, 10),
        items: Vec::new(),
    };
    assert!(matches!(
        ingest_sale(&h.ctx, &empty).await,
        Err(PayoutError::Validation(_))
    ));
}

#[tokio::test]
async fn active_promo_changes_the_bracket() {
    let h = Harness::new(StubGateway::new());
    let mut promo_line = line(1, 4, 1000);
    promo_line.promo = Some(Promo {
        discount_percent: rust_decimal::Decimal::from(20),
        ends_on: date(2025, 1, 31),
    });
    let event = SaleCompleted {
        sale_id: 10,
        sale_date: date(2025, 1, 10),
        items: vec![promo_line],
    };
    ingest_sale(&h.ctx, &event).await.unwrap();

    let entry = royalty_entries(&h.ctx, 4, 1).await.unwrap().remove(0);
    assert!(entry.promo_applied);
    assert_eq!(entry.net_price, eur(800));
    assert_eq!(entry.royalty_amount, eur(640));
}

#[tokio::test]
async fn eligibility_requires_an_enabled_linked_account() {
    let h = Harness::new(
        StubGateway::new()
            .with_account("acct_1", true)
            .with_account("acct_3", false)
            .with_account("acct_4", true)
            .with_account("acct_5", true),
    );
    h.link(1, "acct_1").await;
    h.link(3, "acct_3").await;
    h.link(4, "acct_4").await;
    h.link(5, "acct_5").await;

    h.sell(105, 5, 1000).await;
    h.clock.advance(Duration::hours(1));
    for (sale, payee) in [(101, 1), (102, 2), (103, 3), (104, 4)] {
        h.sell(sale, payee, 1000).await;
    }
    // below the minimum
    h.link(6, "acct_1").await;
    h.sell(106, 6, 300).await;

    h.go_to_payout_day();
    // linked while reachable, then the processor stops answering for it
    let gateway = StubGateway::new()
        .with_account("acct_1", true)
        .with_account("acct_3", false)
        .with_account("acct_5", true)
        .failing_status_for("acct_4");
    let mut ctx = h.ctx.clone();
    ctx.gateway = Arc::new(gateway);

    let payees = compute_eligible_payees(&ctx, 3, eur(500)).await.unwrap();
    let ids: Vec<i64> = payees.iter().map(|payee| payee.payee_id).collect();
    assert_eq!(ids, vec![5, 1]);
    assert_eq!(payees[1].remote_account_id, "acct_1");

    // nothing was written
    let entries = royalty_entries(&h.ctx, 1, 10).await.unwrap();
    assert_eq!(entries[0].status, RoyaltyStatus::Pending);
}

#[tokio::test]
async fn recent_sales_are_not_yet_eligible() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    // the last moment before the cutoff counts, the cutoff itself does not
    h.clock.set(at(2025, 1, 31, 23));
    h.sell(100, 1, 1000).await;
    h.clock.set(at(2025, 2, 1, 0));
    h.sell(101, 1, 1000).await;

    h.go_to_payout_day();
    let payees = compute_eligible_payees(&h.ctx, 3, eur(500)).await.unwrap();
    assert_eq!(payees.len(), 1);
    assert_eq!(payees[0].total_pending, eur(700));
    assert_eq!(payees[0].entry_count, 1);
}

#[tokio::test]
async fn failed_entries_leave_rotation_until_requeued() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    let ids: Vec<_> = royalty_entries(&h.ctx, 1, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();

    assert!(matches!(
        mark_entries_failed(&h.ctx, &ids, "  ").await,
        Err(PayoutError::Validation(_))
    ));
    assert!(matches!(
        mark_entries_failed(&h.ctx, &[], "refund").await,
        Err(PayoutError::Validation(_))
    ));

    assert_eq!(mark_entries_failed(&h.ctx, &ids, "refund").await.unwrap(), 1);
    h.go_to_payout_day();
    assert!(h.workflow.preview().await.unwrap().payees.is_empty());

    let entry = royalty_entries(&h.ctx, 1, 1).await.unwrap().remove(0);
    assert_eq!(entry.status, RoyaltyStatus::Failed);
    assert_eq!(entry.failure_reason.as_deref(), Some("refund"));

    assert_eq!(requeue_failed_entries(&h.ctx, &ids).await.unwrap(), 1);
    assert_eq!(requeue_failed_entries(&h.ctx, &ids).await.unwrap(), 0);
    assert_eq!(h.workflow.preview().await.unwrap().payees.len(), 1);
}

#[tokio::test]
async fn balance_splits_eligible_and_maturing() {
    let h = Harness::new(
        StubGateway::new()
            .with_account("acct_1", true)
            .with_balance("acct_1", eur(1234)),
    );
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.clock.set(at(2025, 3, 15, 12));
    h.sell(101, 1, 500).await;
    h.go_to_payout_day();

    let balance = payee_balance(&h.ctx, 1).await.unwrap();
    assert_eq!(balance.eligible_pending, eur(700));
    assert_eq!(balance.maturing_pending, eur(400));
    assert_eq!(balance.earned_this_year, eur(1100));
    assert_eq!(balance.items_sold_this_year, 2);
    assert_eq!(balance.available_balance, Some(eur(1234)));
    assert_eq!(balance.account_status, AccountStatus::Verified);
    assert!(balance.payouts_enabled);
    assert_eq!(balance.next_payout_date, date(2025, 5, 1));
    assert_eq!(balance.currency, "EUR");
}

#[tokio::test]
async fn unlinked_payee_has_no_processor_balance() {
    let h = Harness::new(StubGateway::new());
    h.sell(100, 9, 1000).await;
    h.go_to_payout_day();

    let balance = payee_balance(&h.ctx, 9).await.unwrap();
    assert_eq!(balance.available_balance, None);
    assert_eq!(balance.account_status, AccountStatus::None);
    assert!(!balance.payouts_enabled);
    assert_eq!(balance.eligible_pending, eur(700));
}

#[tokio::test]
async fn linking_records_verification_state() {
    let h = Harness::new(
        StubGateway::new()
            .with_account("acct_ok", true)
            .failing_status_for("acct_down"),
    );

    let ok = link_account(&h.ctx, 1, Some(" acct_ok ".to_string()))
        .await
        .unwrap();
    assert_eq!(ok.remote_account_id.as_deref(), Some("acct_ok"));
    assert_eq!(ok.account_status, AccountStatus::Verified);

    let down = link_account(&h.ctx, 2, Some("acct_down".to_string()))
        .await
        .unwrap();
    assert_eq!(down.account_status, AccountStatus::Created);
    assert!(!down.payouts_enabled);

    let cleared = link_account(&h.ctx, 1, Some(String::new())).await.unwrap();
    assert_eq!(cleared.remote_account_id, None);
    assert_eq!(cleared.account_status, AccountStatus::None);
    assert_eq!(h.ctx.payees.account(1).await.unwrap(), Some(cleared));
}

#[tokio::test]
async fn payout_history_lists_paid_batches() {
    let h = Harness::new(StubGateway::new().with_account("acct_1", true));
    h.link(1, "acct_1").await;
    h.sell(100, 1, 1000).await;
    h.go_to_payout_day();

    let libookin_payouts::TriggerOutcome::Scheduled(batch) = h
        .workflow
        .trigger(TriggerSource::Manual)
        .await
        .unwrap()
    else {
        panic!("expected a scheduled batch");
    };
    h.clock.advance(Duration::hours(6));
    h.workflow.run_batch(batch.id).await.unwrap();

    let history = payout_history(&h.ctx, 1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, eur(700));
    assert_eq!(history[0].period_start, date(2025, 2, 1));
    assert_eq!(history[0].period_end, date(2025, 4, 1));
    assert_eq!(history[0].arrival_estimate, Some(date(2025, 4, 3)));
    assert!(payout_history(&h.ctx, 2).await.unwrap().is_empty());
}

struct UnreadablePayee {
    inner: Arc<dyn PayeeDirectory>,
    broken: PayeeId,
}

#[async_trait]
impl PayeeDirectory for UnreadablePayee {
    async fn account(&self, payee_id: PayeeId) -> anyhow::Result<Option<PayeeAccount>> {
        if payee_id == self.broken {
            anyhow::bail!("payee row unreadable");
        }
        self.inner.account(payee_id).await
    }

    async fn upsert(&self, account: &PayeeAccount) -> anyhow::Result<()> {
        self.inner.upsert(account).await
    }
}

#[tokio::test]
async fn unreadable_payee_is_excluded_not_fatal() {
    let mut h = Harness::new(
        StubGateway::new()
            .with_account("acct_1", true)
            .with_account("acct_2", true),
    );
    h.link(1, "acct_1").await;
    h.link(2, "acct_2").await;
    h.sell(100, 1, 1000).await;
    h.sell(101, 2, 1000).await;

    h.ctx.payees = Arc::new(UnreadablePayee {
        inner: h.ctx.payees.clone(),
        broken: 2,
    });
    h.rebuild();
    h.go_to_payout_day();

    let payees = compute_eligible_payees(&h.ctx, 3, eur(500)).await.unwrap();
    let ids: Vec<i64> = payees.iter().map(|payee| payee.payee_id).collect();
    assert_eq!(ids, vec![1]);

    let libookin_payouts::TriggerOutcome::Scheduled(batch) =
        h.workflow.trigger(TriggerSource::Manual).await.unwrap()
    else {
        panic!("expected a scheduled batch");
    };
    assert_eq!(batch.snapshot.len(), 1);
    assert_eq!(batch.total_amount, eur(700));
}
