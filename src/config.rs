use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::subjects;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub broker: Option<BrokerConfig>,
    pub dispatch: Option<DispatchConfig>,
    pub driver: Option<DriverConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BrokerConfig {
    pub nats_url: Option<String>,
    pub stream: Option<String>,
    pub subject: Option<String>,
    pub consumer: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DispatchConfig {
    /// Max envelopes concurrently in flight (accepted but unacknowledged).
    pub credit: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DriverConfig {
    pub retry_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub reply_timeout_ms: Option<u64>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // 1. Project config from config/config.{toml,json,ini}
            .add_source(File::with_name("config/config").required(false))
            // 2. Local overrides, not checked in
            .add_source(File::with_name("config/local").required(false))
            // 3. Environment overrides, e.g. DISPATCH_BROKER__NATS_URL
            .add_source(Environment::with_prefix("DISPATCH").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn nats_url(&self) -> String {
        self.broker
            .as_ref()
            .and_then(|b| b.nats_url.clone())
            .or_else(|| env::var("NATS_URL").ok())
            .unwrap_or_else(|| "nats://localhost:4222".to_string())
    }

    pub fn stream(&self) -> String {
        self.broker
            .as_ref()
            .and_then(|b| b.stream.clone())
            .unwrap_or_else(|| subjects::CMD_STREAM.to_string())
    }

    pub fn subject(&self) -> String {
        self.broker
            .as_ref()
            .and_then(|b| b.subject.clone())
            .unwrap_or_else(|| subjects::CMD_SUBJECT.to_string())
    }

    pub fn consumer(&self) -> String {
        self.broker
            .as_ref()
            .and_then(|b| b.consumer.clone())
            .unwrap_or_else(|| subjects::CMD_CONSUMER.to_string())
    }

    pub fn credit(&self) -> usize {
        self.dispatch
            .as_ref()
            .and_then(|d| d.credit)
            .unwrap_or(1)
            .max(1)
    }

    pub fn retry_attempts(&self) -> u32 {
        self.driver
            .as_ref()
            .and_then(|d| d.retry_attempts)
            .unwrap_or(3)
            .max(1)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(
            self.driver
                .as_ref()
                .and_then(|d| d.retry_backoff_ms)
                .unwrap_or(250),
        )
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(
            self.driver
                .as_ref()
                .and_then(|d| d.reply_timeout_ms)
                .unwrap_or(5_000),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_any_source() {
        let settings = Settings::default();
        assert_eq!(settings.stream(), subjects::CMD_STREAM);
        assert_eq!(settings.subject(), subjects::CMD_SUBJECT);
        assert_eq!(settings.consumer(), subjects::CMD_CONSUMER);
        assert_eq!(settings.credit(), 1);
        assert_eq!(settings.retry_attempts(), 3);
        assert_eq!(settings.reply_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn credit_is_clamped_to_at_least_one() {
        let settings = Settings {
            dispatch: Some(DispatchConfig { credit: Some(0) }),
            ..Default::default()
        };
        assert_eq!(settings.credit(), 1);
    }

    #[test]
    fn broker_overrides_win_over_defaults() {
        let settings = Settings {
            broker: Some(BrokerConfig {
                nats_url: Some("nats://broker:4222".into()),
                stream: Some("TEST_STREAM".into()),
                subject: Some("test.cmd".into()),
                consumer: Some("TEST_WORKER".into()),
            }),
            ..Default::default()
        };
        assert_eq!(settings.nats_url(), "nats://broker:4222");
        assert_eq!(settings.stream(), "TEST_STREAM");
        assert_eq!(settings.subject(), "test.cmd");
        assert_eq!(settings.consumer(), "TEST_WORKER");
    }
}
