use anyhow::Result;
use async_trait::async_trait;
use libookin_core::{Notification, Notifier};
use redis::{AsyncCommands, Client};
use serde::Serialize;

pub const SALES_COMPLETED: &str = "sales.completed";
pub const PAYOUT_NOTIFICATIONS: &str = "payouts.notifications";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisNotifier {
    bus: RedisBus,
}

impl RedisNotifier {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.bus
            .publish_json(PAYOUT_NOTIFICATIONS, notification)
            .await
    }
}
