use chrono::{DateTime, Utc};
use libookin_core::{LedgerWindow, PayeeSummary, PendingTotal, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calendar::eligibility_cutoff;
use crate::context::PayoutContext;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibleSnapshot {
    pub eligible_before: DateTime<Utc>,
    pub payees: Vec<PayeeSummary>,
    pub total_amount: Decimal,
}

pub async fn compute_eligible_payees(
    ctx: &PayoutContext,
    window_months_ago: u32,
    min_amount: Decimal,
) -> Result<Vec<PayeeSummary>> {
    let snapshot = snapshot_at(ctx, ctx.clock.now(), window_months_ago, min_amount).await?;
    Ok(snapshot.payees)
}

pub async fn eligible_snapshot(ctx: &PayoutContext, now: DateTime<Utc>) -> Result<EligibleSnapshot> {
    snapshot_at(
        ctx,
        now,
        ctx.policy.window_months_ago,
        ctx.policy.min_amount,
    )
    .await
}

async fn snapshot_at(
    ctx: &PayoutContext,
    now: DateTime<Utc>,
    window_months_ago: u32,
    min_amount: Decimal,
) -> Result<EligibleSnapshot> {
    let eligible_before = eligibility_cutoff(now, window_months_ago);
    let totals = ctx
        .ledger
        .pending_totals(LedgerWindow::before(eligible_before), min_amount)
        .await?;

    let mut payees = Vec::with_capacity(totals.len());
    for total in totals {
        if let Some(summary) = gate(ctx, total).await {
            payees.push(summary);
        }
    }

    let total_amount = payees.iter().map(|payee| payee.total_pending).sum();
    Ok(EligibleSnapshot {
        eligible_before,
        payees,
        total_amount,
    })
}

async fn gate(ctx: &PayoutContext, total: PendingTotal) -> Option<PayeeSummary> {
    let account = match ctx.payees.account(total.payee_id).await {
        Ok(account) => account,
        Err(err) => {
            warn!(
                payee_id = total.payee_id,
                "payee account lookup failed, payee excluded: {err:#}"
            );
            return None;
        }
    };
    let Some(remote_account_id) = account
        .as_ref()
        .and_then(|account| account.remote_account())
        .map(str::to_string)
    else {
        debug!(payee_id = total.payee_id, "skipping payee without remote account");
        return None;
    };

    match ctx.gateway.account_status(&remote_account_id).await {
        Ok(report) if report.payouts_enabled => Some(PayeeSummary {
            payee_id: total.payee_id,
            total_pending: total.total_pending,
            entry_count: total.entry_count,
            entry_ids: total.entry_ids,
            oldest_entry_at: total.oldest_entry_at,
            remote_account_id,
        }),
        Ok(_) => {
            debug!(payee_id = total.payee_id, "skipping payee with payouts disabled");
            None
        }
        Err(err) => {
            warn!(
                payee_id = total.payee_id,
                remote_account_id = %remote_account_id,
                "account status lookup failed, payee excluded: {err}"
            );
            None
        }
    }
}
