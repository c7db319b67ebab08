use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use libookin_core::{PayoutError, SaleCompleted, SystemClock};
use libookin_payouts::{PayoutContext, PayoutScheduler, PayoutWorkflow, TickLoop, ingest_sale};
use libookin_platform::{
    RedisBus, RedisNotifier, SALES_COMPLETED, ServiceConfig, connect_database,
};
use libookin_stripe::StripeGateway;
use redis::Msg;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "libookin_worker=info,libookin_payouts=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let gateway = StripeGateway::from_env().context("failed to build payment gateway")?;
    if !gateway.is_configured() {
        warn!("STRIPE_SECRET_KEY is not set; payouts will fail until it is");
    }

    let ctx = PayoutContext::postgres(
        pool,
        Arc::new(gateway),
        Arc::new(RedisNotifier::new(redis.clone())),
        Arc::new(SystemClock),
        config.policy.clone(),
    );
    let workflow = PayoutWorkflow::new(ctx.clone());

    if let Some(run) = workflow
        .recover()
        .await
        .context("failed to recover in-flight payout batch")?
    {
        info!(?run, "recovered in-flight payout batch");
    }

    tokio::spawn(run_scheduler(
        PayoutScheduler::new(workflow),
        config.tick_interval,
    ));

    let mut pubsub = redis.client().get_async_pubsub().await?;
    pubsub.subscribe(SALES_COMPLETED).await?;
    let mut messages = pubsub.on_message();

    info!("payout worker subscribed to {SALES_COMPLETED}");

    loop {
        let msg = messages
            .next()
            .await
            .context("sales.completed stream ended unexpectedly")?;
        if let Err(err) = handle_message(&ctx, msg).await {
            error!("failed to process sale event: {err:#}");
        }
    }
}

async fn run_scheduler(scheduler: PayoutScheduler, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if let Err(err) = scheduler.tick().await {
            error!("scheduler tick failed: {err:#}");
        }
    }
}

async fn handle_message(ctx: &PayoutContext, msg: Msg) -> Result<()> {
    let payload: String = msg.get_payload()?;
    let event: SaleCompleted =
        serde_json::from_str(&payload).context("malformed sale-completed event")?;

    match ingest_sale(ctx, &event).await {
        Ok(_) => Ok(()),
        Err(PayoutError::Validation(reason)) => {
            warn!(sale_id = event.sale_id, "sale event rejected: {reason}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
