use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use libookin_admin::{AppState, router};
use libookin_core::SystemClock;
use libookin_payouts::{PayoutContext, PayoutWorkflow};
use libookin_platform::{RedisBus, RedisNotifier, ServiceConfig, connect_database};
use libookin_stripe::StripeGateway;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "libookin_admin=info,libookin_payouts=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8090")?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let gateway = StripeGateway::from_env().context("failed to build payment gateway")?;

    let ctx = PayoutContext::postgres(
        pool,
        Arc::new(gateway),
        Arc::new(RedisNotifier::new(redis)),
        Arc::new(SystemClock),
        config.policy.clone(),
    );
    let app = router(AppState::new(PayoutWorkflow::new(ctx)));

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("payout admin listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
