use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use libookin_core::money::{from_minor_units, to_minor_units};
use libookin_core::{
    AccountBalance, AccountStatusReport, GatewayError, PaymentGateway, PayoutMetadata,
    RemotePayout,
};
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::StripeConfig;

#[derive(Debug, Deserialize)]
struct AccountObject {
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
    #[serde(default)]
    requirements: Option<Requirements>,
}

#[derive(Debug, Deserialize)]
struct Requirements {
    #[serde(default)]
    currently_due: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceObject {
    #[serde(default)]
    available: Vec<BalanceAmount>,
    #[serde(default)]
    pending: Vec<BalanceAmount>,
}

#[derive(Debug, Deserialize)]
struct BalanceAmount {
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PayoutObject {
    id: String,
    status: String,
    #[serde(default)]
    arrival_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Remote(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(StripeConfig::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.config.secret_key.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn secret_key(&self) -> Result<&str, GatewayError> {
        self.config
            .secret_key
            .as_deref()
            .ok_or(GatewayError::NotConfigured)
    }

    fn currency_code(&self) -> String {
        self.config.currency.to_ascii_lowercase()
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .bearer_auth(self.secret_key()?)
            .send()
            .await
            .map_err(|err| GatewayError::Remote(err.to_string()))?;

        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| GatewayError::Remote(err.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| match (envelope.error.code, envelope.error.message) {
                (Some(code), Some(message)) => Some(format!("{code}: {message}")),
                (None, Some(message)) => Some(message),
                (Some(code), None) => Some(code),
                (None, None) => None,
            })
            .unwrap_or_else(|| body.chars().take(200).collect());
        warn!(status = %status, message = %message, "stripe request failed");
        return Err(GatewayError::Remote(format!("HTTP {status}: {message}")));
    }

    serde_json::from_str(&body)
        .map_err(|err| GatewayError::Remote(format!("unexpected response body: {err}")))
}

fn amount_in(amounts: &[BalanceAmount], currency: &str) -> Decimal {
    amounts
        .iter()
        .find(|amount| amount.currency.eq_ignore_ascii_case(currency))
        .map(|amount| from_minor_units(amount.amount))
        .unwrap_or(Decimal::ZERO)
}

fn arrival_estimate(arrival_date: Option<i64>) -> Option<NaiveDate> {
    arrival_date
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| at.date_naive())
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn account_status(
        &self,
        remote_account_id: &str,
    ) -> Result<AccountStatusReport, GatewayError> {
        let account: AccountObject = self
            .send(self.client.get(self.url(&format!("/v1/accounts/{remote_account_id}"))))
            .await?;

        Ok(AccountStatusReport {
            charges_enabled: account.charges_enabled,
            payouts_enabled: account.payouts_enabled,
            details_submitted: account.details_submitted,
            requirements: account
                .requirements
                .map(|requirements| requirements.currently_due)
                .unwrap_or_default(),
        })
    }

    async fn balance(&self, remote_account_id: &str) -> Result<AccountBalance, GatewayError> {
        let balance: BalanceObject = self
            .send(
                self.client
                    .get(self.url("/v1/balance"))
                    .header("Stripe-Account", remote_account_id),
            )
            .await?;

        let currency = self.currency_code();
        Ok(AccountBalance {
            available: amount_in(&balance.available, &currency),
            pending: amount_in(&balance.pending, &currency),
            currency: self.config.currency.to_ascii_uppercase(),
        })
    }

    async fn create_payout(
        &self,
        remote_account_id: &str,
        amount: Decimal,
        metadata: &PayoutMetadata,
    ) -> Result<RemotePayout, GatewayError> {
        self.secret_key()?;

        if amount < self.config.minimum_payout {
            return Err(GatewayError::BelowMinimum {
                amount,
                minimum: self.config.minimum_payout,
            });
        }

        let cents = to_minor_units(amount)
            .ok_or_else(|| GatewayError::Remote(format!("amount {amount} out of range")))?;

        let form = vec![
            ("amount", cents.to_string()),
            ("currency", self.currency_code()),
            ("metadata[payee_id]", metadata.payee_id.to_string()),
            ("metadata[batch_id]", metadata.batch_id.to_string()),
            ("metadata[period_start]", metadata.period_start.to_string()),
            ("metadata[period_end]", metadata.period_end.to_string()),
            ("metadata[entry_count]", metadata.entry_count.to_string()),
        ];

        let payout: PayoutObject = self
            .send(
                self.client
                    .post(self.url("/v1/payouts"))
                    .header("Stripe-Account", remote_account_id)
                    .header("Idempotency-Key", metadata.idempotency_key())
                    .form(&form),
            )
            .await?;

        debug!(
            payout_id = %payout.id,
            payee_id = metadata.payee_id,
            amount = %amount,
            "stripe payout created"
        );

        Ok(RemotePayout {
            remote_payout_id: payout.id,
            status: payout.status,
            arrival_estimate: arrival_estimate(payout.arrival_date),
        })
    }
}
