use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use libookin_core::{MAX_REVIEW_DELAY_HOURS, PayoutPolicy};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub tick_interval: Duration,
    pub policy: PayoutPolicy,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    pub fn worker_from_env() -> Result<Self> {
        Self::from_env("")
    }

    pub fn from_lookup(
        default_http_addr: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = lookup("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());
        let tick_interval =
            Duration::from_secs(parsed(&lookup, "SCHEDULER_TICK_SECS")?.unwrap_or(60).max(1));

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            tick_interval,
            policy: payout_policy_from_lookup(&lookup)?,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value: {value}")),
        None => Ok(None),
    }
}

pub fn payout_policy_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<PayoutPolicy> {
    let defaults = PayoutPolicy::default();

    let min_amount = parsed(lookup, "PAYOUT_MIN_AMOUNT")?.unwrap_or(defaults.min_amount);
    if min_amount.is_sign_negative() {
        anyhow::bail!("PAYOUT_MIN_AMOUNT must not be negative");
    }

    let review_delay_hours =
        parsed(lookup, "PAYOUT_REVIEW_DELAY_HOURS")?.unwrap_or(defaults.review_delay_hours);
    if !(0..=MAX_REVIEW_DELAY_HOURS).contains(&review_delay_hours) {
        anyhow::bail!("PAYOUT_REVIEW_DELAY_HOURS must be between 0 and {MAX_REVIEW_DELAY_HOURS}");
    }

    Ok(PayoutPolicy {
        min_amount,
        window_months_ago: parsed(lookup, "PAYOUT_WINDOW_MONTHS")?
            .unwrap_or(defaults.window_months_ago),
        settlement_months: parsed(lookup, "PAYOUT_SETTLEMENT_MONTHS")?
            .unwrap_or(defaults.settlement_months),
        review_delay_hours,
        inter_payout_pause_ms: parsed(lookup, "PAYOUT_PAUSE_MS")?
            .unwrap_or(defaults.inter_payout_pause_ms),
        currency: lookup("SETTLEMENT_CURRENCY")
            .map(|value| value.trim().to_ascii_uppercase())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.currency),
        admin_base_url: lookup("ADMIN_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.admin_base_url),
        job_max_attempts: parsed(lookup, "JOB_MAX_ATTEMPTS")?
            .unwrap_or(defaults.job_max_attempts)
            .max(1),
        job_retry_secs: defaults.job_retry_secs,
    })
}
