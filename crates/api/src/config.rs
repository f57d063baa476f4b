//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::Money;
use messaging::ChannelConfig;
use participants::DEFAULT_MIN_AMOUNT;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres saga log; in-memory when unset
/// - `CHANNEL_WORKERS`: consumers per subscription (default: `4`)
/// - `CHANNEL_MAX_DELIVERY_ATTEMPTS`: deliveries before dead-lettering (default: `3`)
/// - `CHANNEL_RETRY_BACKOFF_MS`: base redelivery backoff (default: `50`)
/// - `PAYMENT_MIN_AMOUNT_CENTS`: smallest accepted payment (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub channel_workers: usize,
    pub channel_max_delivery_attempts: u32,
    pub channel_retry_backoff_ms: u64,
    pub payment_min_amount_cents: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            channel_workers: parsed("CHANNEL_WORKERS")
                .filter(|w| *w > 0)
                .unwrap_or(defaults.channel_workers),
            channel_max_delivery_attempts: parsed("CHANNEL_MAX_DELIVERY_ATTEMPTS")
                .filter(|a| *a > 0)
                .unwrap_or(defaults.channel_max_delivery_attempts),
            channel_retry_backoff_ms: parsed("CHANNEL_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.channel_retry_backoff_ms),
            payment_min_amount_cents: parsed("PAYMENT_MIN_AMOUNT_CENTS")
                .unwrap_or(defaults.payment_min_amount_cents),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            workers: self.channel_workers,
            max_delivery_attempts: self.channel_max_delivery_attempts,
            retry_backoff: Duration::from_millis(self.channel_retry_backoff_ms),
            retained_per_topic: 0,
        }
    }

    pub fn payment_min_amount(&self) -> Money {
        Money::from_cents(self.payment_min_amount_cents)
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            channel_workers: channel.workers,
            channel_max_delivery_attempts: channel.max_delivery_attempts,
            channel_retry_backoff_ms: u64::try_from(channel.retry_backoff.as_millis())
                .unwrap_or(50),
            payment_min_amount_cents: DEFAULT_MIN_AMOUNT.cents(),
        }
    }
}
