use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;

use super::{AccrualAuthority, AccrualVerdict, AuthorityStatus, Resolution};
use crate::domain::{OrderNumber, Points};

pub const ORDERS_PATH: &str = "/api/orders";
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Rate limited by accrual system, pausing for {0:?}")]
    RateLimited(Duration),
    #[error("Unexpected status {status} for order {order}")]
    UnexpectedStatus { order: OrderNumber, status: u16 },
    #[error("Invalid response from accrual system: {0}")]
    InvalidResponse(String),
}

impl AccrualError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AccrualError::RateLimited(_))
    }
}

/// Response body of `GET /api/orders/{number}`. Accrual is in major units.
#[derive(Debug, Deserialize)]
struct AccrualResponse {
    order: String,
    status: String,
    #[serde(default)]
    accrual: Option<Points>,
}

#[derive(Debug, Clone)]
pub struct AccrualClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub rate_limit_cooldown: Duration,
}

impl AccrualClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }
}

/// Client-wide pause shared by every clone of an [`AccrualClient`].
#[derive(Debug, Default)]
pub struct Cooldown {
    until: Mutex<Option<Instant>>,
}

impl Cooldown {
    /// Blocks further requests for `duration` from now. Never shortens a running pause.
    pub fn trip(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut until = self.until.lock().unwrap_or_else(|e| e.into_inner());
        if until.map_or(true, |current| current < deadline) {
            *until = Some(deadline);
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        let until = *self.until.lock().unwrap_or_else(|e| e.into_inner());
        until
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }

    /// Resolves once no pause is active.
    pub async fn wait(&self) {
        while let Some(left) = self.remaining() {
            tracing::debug!("accrual client cooling down for {:?}", left);
            tokio::time::sleep(left).await;
        }
    }
}

/// HTTP client for the accrual authority.
#[derive(Clone)]
pub struct AccrualClient {
    client: Client,
    base_url: String,
    rate_limit_cooldown: Duration,
    cooldown: Arc<Cooldown>,
}

impl AccrualClient {
    pub fn new(config: AccrualClientConfig) -> Result<Self, AccrualError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(AccrualClient {
            client,
            base_url: config.base_url,
            rate_limit_cooldown: config.rate_limit_cooldown,
            cooldown: Arc::new(Cooldown::default()),
        })
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            ORDERS_PATH,
            number
        )
    }

    /// Asks the authority about one order, waiting out any active rate-limit pause first.
    pub async fn get_order(&self, number: &OrderNumber) -> Result<Resolution, AccrualError> {
        self.cooldown.wait().await;

        let response = self.client.get(self.order_url(number)).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<AccrualResponse>()
                    .await
                    .map_err(|e| AccrualError::InvalidResponse(e.to_string()))?;

                if body.order != number.as_str() {
                    return Err(AccrualError::InvalidResponse(format!(
                        "asked for order {} but got {}",
                        number, body.order
                    )));
                }

                Ok(Resolution::Verdict(AccrualVerdict {
                    order: number.clone(),
                    status: AuthorityStatus::parse(&body.status),
                    accrual: body.accrual,
                }))
            }
            StatusCode::NO_CONTENT => Ok(Resolution::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::info!(
                    order = %number,
                    "too many requests to accrual system, pausing for {:?}",
                    self.rate_limit_cooldown
                );
                self.cooldown.trip(self.rate_limit_cooldown);
                Err(AccrualError::RateLimited(self.rate_limit_cooldown))
            }
            status => Err(AccrualError::UnexpectedStatus {
                order: number.clone(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl AccrualAuthority for AccrualClient {
    async fn resolve(&self, number: &OrderNumber) -> Result<Resolution, AccrualError> {
        self.get_order(number).await
    }
}
