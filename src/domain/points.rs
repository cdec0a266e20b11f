//! Loyalty points stored as integer minor units (1/100 of a point).
//!
//! Amounts cross the wire in major units as JSON decimals (`123.45`) and are
//! rounded to the nearest minor unit on the way in. Incoming amounts must lie in
//! `0..=MAX_MAJOR`, and arithmetic is checked so a ledger total can never wrap.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINOR_UNITS_PER_POINT: i64 = 100;

/// Largest amount accepted from the outside, in major units.
pub const MAX_MAJOR: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("amount {0} is outside the accepted range 0..={max}", max = MAX_MAJOR)]
pub struct AmountOutOfRange(pub f64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Points(i64);

impl Points {
    pub const ZERO: Points = Points(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Converts a major-unit amount, rounding half away from zero.
    pub fn from_major(major: f64) -> Result<Self, AmountOutOfRange> {
        if !(0.0..=MAX_MAJOR).contains(&major) {
            return Err(AmountOutOfRange(major));
        }
        Ok(Self((major * MINOR_UNITS_PER_POINT as f64).round() as i64))
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn major(self) -> f64 {
        self.0 as f64 / MINOR_UNITS_PER_POINT as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Points) -> Option<Points> {
        self.0.checked_add(rhs.0).map(Points)
    }

    pub fn checked_sub(self, rhs: Points) -> Option<Points> {
        self.0.checked_sub(rhs.0).map(Points)
    }

    /// `None` when the total does not fit.
    pub fn checked_sum<I>(amounts: I) -> Option<Points>
    where
        I: IntoIterator<Item = Points>,
    {
        amounts
            .into_iter()
            .try_fold(Points::ZERO, Points::checked_add)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_UNITS_PER_POINT as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.major())
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = f64::deserialize(deserializer)?;
        Points::from_major(major).map_err(serde::de::Error::custom)
    }
}
