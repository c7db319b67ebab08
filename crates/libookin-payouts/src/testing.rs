//! Test doubles for the remote processor and the notification transport.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Days;
use libookin_core::{
    AccountBalance, AccountStatusReport, GatewayError, Notification, Notifier, PaymentGateway,
    PayoutMetadata, RemotePayout,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct StubPayout {
    pub remote_account_id: String,
    pub amount: Decimal,
    pub metadata: PayoutMetadata,
    pub remote_payout_id: String,
}

#[derive(Default)]
struct StubState {
    accounts: HashMap<String, AccountStatusReport>,
    balances: HashMap<String, Decimal>,
    failing_status: HashSet<String>,
    failing_payouts: HashSet<String>,
    payouts: Vec<(String, StubPayout)>,
    payout_attempts: usize,
}

#[derive(Default)]
pub struct StubGateway {
    state: RwLock<StubState>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, remote_account_id: &str, payouts_enabled: bool) -> Self {
        self.state.get_mut().accounts.insert(
            remote_account_id.to_string(),
            AccountStatusReport {
                charges_enabled: payouts_enabled,
                payouts_enabled,
                details_submitted: true,
                requirements: Vec::new(),
            },
        );
        self
    }

    pub fn with_balance(mut self, remote_account_id: &str, available: Decimal) -> Self {
        self.state
            .get_mut()
            .balances
            .insert(remote_account_id.to_string(), available);
        self
    }

    pub fn failing_status_for(mut self, remote_account_id: &str) -> Self {
        self.state
            .get_mut()
            .failing_status
            .insert(remote_account_id.to_string());
        self
    }

    pub fn failing_payouts_for(mut self, remote_account_id: &str) -> Self {
        self.state
            .get_mut()
            .failing_payouts
            .insert(remote_account_id.to_string());
        self
    }

    pub async fn set_payouts_failing(&self, remote_account_id: &str, failing: bool) {
        let mut state = self.state.write().await;
        if failing {
            state.failing_payouts.insert(remote_account_id.to_string());
        } else {
            state.failing_payouts.remove(remote_account_id);
        }
    }

    pub async fn payouts(&self) -> Vec<StubPayout> {
        let state = self.state.read().await;
        state.payouts.iter().map(|(_, payout)| payout.clone()).collect()
    }

    pub async fn payout_attempts(&self) -> usize {
        self.state.read().await.payout_attempts
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn account_status(
        &self,
        remote_account_id: &str,
    ) -> Result<AccountStatusReport, GatewayError> {
        let state = self.state.read().await;
        if state.failing_status.contains(remote_account_id) {
            return Err(GatewayError::Remote(format!(
                "status lookup failed for {remote_account_id}"
            )));
        }
        Ok(state
            .accounts
            .get(remote_account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn balance(&self, remote_account_id: &str) -> Result<AccountBalance, GatewayError> {
        let state = self.state.read().await;
        Ok(AccountBalance {
            available: state
                .balances
                .get(remote_account_id)
                .copied()
                .unwrap_or(Decimal::ZERO),
            pending: Decimal::ZERO,
            currency: "EUR".to_string(),
        })
    }

    async fn create_payout(
        &self,
        remote_account_id: &str,
        amount: Decimal,
        metadata: &PayoutMetadata,
    ) -> Result<RemotePayout, GatewayError> {
        let mut state = self.state.write().await;
        state.payout_attempts += 1;

        if state.failing_payouts.contains(remote_account_id) {
            return Err(GatewayError::Remote(format!(
                "payout rejected for {remote_account_id}"
            )));
        }

        let key = metadata.idempotency_key();
        let replayed = state
            .payouts
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, payout)| payout.remote_payout_id.clone());
        let remote_payout_id = match replayed {
            Some(remote_payout_id) => remote_payout_id,
            None => {
                let remote_payout_id = format!("po_stub_{}", state.payouts.len() + 1);
                state.payouts.push((
                    key,
                    StubPayout {
                        remote_account_id: remote_account_id.to_string(),
                        amount,
                        metadata: metadata.clone(),
                        remote_payout_id: remote_payout_id.clone(),
                    },
                ));
                remote_payout_id
            }
        };

        Ok(RemotePayout {
            remote_payout_id,
            status: "pending".to_string(),
            arrival_estimate: metadata
                .period_end
                .checked_add_days(Days::new(2)),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<Notification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: RwLock::default(),
            failing: true,
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    pub async fn kinds(&self) -> Vec<&'static str> {
        self.sent
            .read()
            .await
            .iter()
            .map(Notification::kind)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.failing {
            anyhow::bail!("notification transport unavailable");
        }
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}
