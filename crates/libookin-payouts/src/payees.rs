use chrono::NaiveDate;
use libookin_core::{
    AccountStatus, PayeeAccount, PayeeId, PayoutRecord, Result, RoyaltyEntry,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::{eligibility_cutoff, next_payout_date, start_of_year};
use crate::context::PayoutContext;

pub const PAYOUT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayeeBalance {
    pub payee_id: PayeeId,
    pub eligible_pending: Decimal,
    pub maturing_pending: Decimal,
    pub earned_this_year: Decimal,
    pub items_sold_this_year: u64,
    pub available_balance: Option<Decimal>,
    pub currency: String,
    pub account_status: AccountStatus,
    pub payouts_enabled: bool,
    pub next_payout_date: NaiveDate,
}

pub async fn payee_balance(ctx: &PayoutContext, payee_id: PayeeId) -> Result<PayeeBalance> {
    let now = ctx.clock.now();
    let today = now.date_naive();
    let totals = ctx
        .ledger
        .payee_totals(
            payee_id,
            eligibility_cutoff(now, ctx.policy.window_months_ago),
            start_of_year(today),
        )
        .await?;

    let account = ctx.payees.account(payee_id).await?;
    let available_balance = match account.as_ref().and_then(PayeeAccount::remote_account) {
        Some(remote_account_id) => match ctx.gateway.balance(remote_account_id).await {
            Ok(balance) => Some(balance.available),
            Err(err) => {
                warn!(payee_id, "balance lookup failed: {err}");
                None
            }
        },
        None => None,
    };

    Ok(PayeeBalance {
        payee_id,
        eligible_pending: totals.eligible_pending,
        maturing_pending: totals.maturing_pending,
        earned_this_year: totals.earned_since,
        items_sold_this_year: totals.items_sold_since,
        available_balance,
        currency: ctx.policy.currency.clone(),
        account_status: account
            .as_ref()
            .map(|account| account.account_status)
            .unwrap_or_default(),
        payouts_enabled: account.as_ref().is_some_and(|account| account.payouts_enabled),
        next_payout_date: next_payout_date(today),
    })
}

pub async fn payout_history(ctx: &PayoutContext, payee_id: PayeeId) -> Result<Vec<PayoutRecord>> {
    Ok(ctx
        .records
        .for_payee(payee_id, PAYOUT_HISTORY_LIMIT)
        .await?)
}

pub async fn royalty_entries(
    ctx: &PayoutContext,
    payee_id: PayeeId,
    limit: usize,
) -> Result<Vec<RoyaltyEntry>> {
    Ok(ctx.ledger.entries_for_payee(payee_id, limit).await?)
}

pub async fn link_account(
    ctx: &PayoutContext,
    payee_id: PayeeId,
    remote_account_id: Option<String>,
) -> Result<PayeeAccount> {
    let remote_account_id = remote_account_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let (account_status, payouts_enabled) = match remote_account_id.as_deref() {
        None => (AccountStatus::None, false),
        Some(remote) => match ctx.gateway.account_status(remote).await {
            Ok(report) => (report.verification_status(), report.payouts_enabled),
            Err(err) => {
                warn!(payee_id, remote_account_id = remote, "account status lookup failed: {err}");
                (AccountStatus::Created, false)
            }
        },
    };

    let account = PayeeAccount {
        payee_id,
        remote_account_id,
        account_status,
        payouts_enabled,
        updated_at: ctx.clock.now(),
    };
    ctx.payees.upsert(&account).await?;

    info!(
        payee_id,
        status = account.account_status.as_str(),
        payouts_enabled,
        "payee account updated"
    );
    Ok(account)
}
