//! Accrual authority: the external service deciding each order's reward.

pub mod client;

use async_trait::async_trait;

use crate::domain::{OrderNumber, OrderStatus, Points};

pub use client::{AccrualClient, AccrualClientConfig, AccrualError, Cooldown};

/// Status reported by the authority for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
    Unrecognized(String),
}

impl AuthorityStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "REGISTERED" => AuthorityStatus::Registered,
            "PROCESSING" => AuthorityStatus::Processing,
            "INVALID" => AuthorityStatus::Invalid,
            "PROCESSED" => AuthorityStatus::Processed,
            other => AuthorityStatus::Unrecognized(other.to_string()),
        }
    }

    /// Unrecognized statuses fall back to `INVALID`.
    pub fn order_status(&self) -> OrderStatus {
        match self {
            AuthorityStatus::Registered => OrderStatus::New,
            AuthorityStatus::Processing => OrderStatus::Processing,
            AuthorityStatus::Invalid => OrderStatus::Invalid,
            AuthorityStatus::Processed => OrderStatus::Processed,
            AuthorityStatus::Unrecognized(_) => OrderStatus::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualVerdict {
    pub order: OrderNumber,
    pub status: AuthorityStatus,
    pub accrual: Option<Points>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Verdict(AccrualVerdict),
    /// The authority has no record of the order.
    NotRegistered,
}

#[async_trait]
pub trait AccrualAuthority: Send + Sync {
    async fn resolve(&self, number: &OrderNumber) -> Result<Resolution, AccrualError>;
}
