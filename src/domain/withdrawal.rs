use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrderNumber, Points};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Withdrawal {
    pub order: OrderNumber,
    #[serde(skip)]
    pub owner: String,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(order: OrderNumber, owner: impl Into<String>, sum: Points) -> Self {
        Self {
            order,
            owner: owner.into(),
            sum,
            processed_at: Utc::now(),
        }
    }
}

/// Derived per-owner balance. Never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub current: Points,
    pub withdrawn: Points,
}

impl Balance {
    /// `None` when the difference does not fit.
    pub fn from_totals(accrued: Points, withdrawn: Points) -> Option<Self> {
        Some(Self {
            current: accrued.checked_sub(withdrawn)?,
            withdrawn,
        })
    }
}
