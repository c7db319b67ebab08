use libookin_core::{PayoutError, Result, SaleCompleted};
use libookin_royalty::compute_royalty;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::PayoutContext;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    pub sale_id: i64,
    pub created: usize,
    pub replayed: usize,
    pub entry_ids: Vec<Uuid>,
}

pub async fn ingest_sale(ctx: &PayoutContext, event: &SaleCompleted) -> Result<IngestReport> {
    if event.items.is_empty() {
        return Err(PayoutError::Validation(format!(
            "sale {} has no items",
            event.sale_id
        )));
    }

    let entries = event
        .items
        .iter()
        .map(|line| {
            compute_royalty(line.net_price_before_tax, line.promo.as_ref(), event.sale_date)
                .map(|draft| draft.into_entry(event.sale_id, line.item_id, line.payee_id))
                .map_err(|err| {
                    PayoutError::Validation(format!(
                        "sale {} item {}: {err}",
                        event.sale_id, line.item_id
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let created_at = ctx.clock.now();
    let mut report = IngestReport {
        sale_id: event.sale_id,
        created: 0,
        replayed: 0,
        entry_ids: Vec::with_capacity(entries.len()),
    };

    for entry in entries {
        let item_id = entry.item_id;
        let outcome = ctx.ledger.append(entry, created_at).await?;
        if outcome.created {
            report.created += 1;
        } else {
            debug!(sale_id = event.sale_id, item_id, "royalty entry already recorded");
            report.replayed += 1;
        }
        report.entry_ids.push(outcome.entry_id);
    }

    info!(
        sale_id = event.sale_id,
        created = report.created,
        replayed = report.replayed,
        "sale royalties recorded"
    );
    Ok(report)
}

fn require_entries(entry_ids: &[Uuid]) -> Result<()> {
    if entry_ids.is_empty() {
        return Err(PayoutError::Validation("no entry ids given".to_string()));
    }
    Ok(())
}

pub async fn mark_entries_failed(
    ctx: &PayoutContext,
    entry_ids: &[Uuid],
    reason: &str,
) -> Result<u64> {
    require_entries(entry_ids)?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(PayoutError::Validation("a failure reason is required".to_string()));
    }

    let updated = ctx.ledger.mark_failed(entry_ids, reason).await?;
    info!(requested = entry_ids.len(), updated, "royalty entries marked failed");
    Ok(updated)
}

pub async fn requeue_failed_entries(ctx: &PayoutContext, entry_ids: &[Uuid]) -> Result<u64> {
    require_entries(entry_ids)?;
    let updated = ctx.ledger.requeue_failed(entry_ids).await?;
    info!(requested = entry_ids.len(), updated, "failed royalty entries requeued");
    Ok(updated)
}
