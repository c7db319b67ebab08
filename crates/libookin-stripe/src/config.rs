use std::time::Duration;

use rust_decimal::Decimal;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
    pub currency: String,
    pub minimum_payout: Decimal,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            currency: "EUR".to_string(),
            minimum_payout: Decimal::new(1500, 2),
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let secret_key = lookup("STRIPE_SECRET_KEY")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let api_base = lookup("STRIPE_API_BASE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.api_base);

        let timeout = lookup("STRIPE_TIMEOUT_SECS")
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let currency = lookup("SETTLEMENT_CURRENCY")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.currency);

        Self {
            secret_key,
            api_base,
            timeout,
            currency,
            minimum_payout: defaults.minimum_payout,
        }
    }

    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn blank_secret_means_unconfigured() {
        let env: HashMap<&str, &str> =
            HashMap::from([("STRIPE_SECRET_KEY", "  "), ("STRIPE_TIMEOUT_SECS", "5")]);
        let config = StripeConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()));

        assert!(config.secret_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.minimum_payout, Decimal::new(1500, 2));
    }
}
