use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;

use crate::accrual::AccrualClientConfig;
use crate::services::SchedulerConfig;

pub const DEFAULT_RUN_ADDRESS: &str = "0.0.0.0:8080";

/// Upper bound for every duration setting, one day.
pub const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_address: String,
    pub database_uri: Option<String>,
    pub accrual_system_address: String,
    pub poll_interval_secs: u64,
    pub queue_capacity: usize,
    pub rate_limit_cooldown_secs: u64,
    pub request_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_or = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer", key)),
                None => Ok(default),
            }
        };

        Ok(Config {
            run_address: lookup("RUN_ADDRESS").unwrap_or_else(|| DEFAULT_RUN_ADDRESS.to_string()),
            database_uri: lookup("DATABASE_URI").filter(|uri| !uri.trim().is_empty()),
            accrual_system_address: lookup("ACCRUAL_SYSTEM_ADDRESS").unwrap_or_default(),
            poll_interval_secs: parse_or("ACCRUAL_POLL_INTERVAL_SECS", 1)?,
            queue_capacity: parse_or("ACCRUAL_QUEUE_CAPACITY", 128)? as usize,
            rate_limit_cooldown_secs: parse_or("ACCRUAL_RATE_LIMIT_COOLDOWN_SECS", 60)?,
            request_timeout_secs: parse_or("ACCRUAL_REQUEST_TIMEOUT_SECS", 30)?,
            log_format: lookup("LOG_FORMAT")
                .map(|raw| raw.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.accrual_system_address.trim().is_empty() {
            anyhow::bail!("ACCRUAL_SYSTEM_ADDRESS is empty");
        }
        url::Url::parse(&self.accrual_system_address)
            .context("ACCRUAL_SYSTEM_ADDRESS is not a valid URL")?;

        let port = self
            .bind_address()
            .rsplit_once(':')
            .map(|(_, port)| port.parse::<u16>());
        if !matches!(port, Some(Ok(_))) {
            anyhow::bail!("RUN_ADDRESS must look like host:port, got '{}'", self.run_address);
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("ACCRUAL_POLL_INTERVAL_SECS must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("ACCRUAL_QUEUE_CAPACITY must be greater than 0");
        }

        for (key, secs) in [
            ("ACCRUAL_POLL_INTERVAL_SECS", self.poll_interval_secs),
            ("ACCRUAL_RATE_LIMIT_COOLDOWN_SECS", self.rate_limit_cooldown_secs),
            ("ACCRUAL_REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                anyhow::bail!("{} must be at most {} seconds, got {}", key, MAX_DURATION_SECS, secs);
            }
        }

        Ok(())
    }

    /// `RUN_ADDRESS` may omit the host (`:8080`), meaning all interfaces.
    pub fn bind_address(&self) -> String {
        if self.run_address.starts_with(':') {
            format!("0.0.0.0{}", self.run_address)
        } else {
            self.run_address.clone()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn accrual_client_config(&self) -> AccrualClientConfig {
        AccrualClientConfig {
            base_url: self.accrual_system_address.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
        }
    }
}
