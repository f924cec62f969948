//! Rollup rows: one per (subscription, usage type, day).

use std::fmt;
use std::ops::{Add, Neg, Sub};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UsageError};
use crate::ids::SubscriptionId;
use crate::money::Cents;
use crate::usage::UsageType;

/// Natural key of a rollup row.
///
/// Field order matches the storage key layout so that `Ord` agrees with
/// on-disk ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    /// Subscription the usage belongs to.
    pub subscription_id: SubscriptionId,
    /// Data or voice.
    pub usage_type: UsageType,
    /// UTC day.
    pub usage_date: NaiveDate,
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.subscription_id, self.usage_type, self.usage_date
        )
    }
}

/// A signed change to a rollup row's totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    /// Change in summed price.
    pub price: Cents,
    /// Change in summed quantity.
    pub used: i64,
}

impl UsageDelta {
    /// Whether applying this delta is a no-op.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.price == Cents::ZERO && self.used == 0
    }

    /// Delta that moves `from`'s totals to `to`'s.
    #[must_use]
    pub fn between(from: &AggregateRow, to: &AggregateRow) -> Self {
        Self {
            price: to.total_price - from.total_price,
            used: to.total_used - from.total_used,
        }
    }
}

impl Add for UsageDelta {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            price: self.price + rhs.price,
            used: self.used + rhs.used,
        }
    }
}

impl Sub for UsageDelta {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            price: self.price - rhs.price,
            used: self.used - rhs.used,
        }
    }
}

impl Neg for UsageDelta {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            price: -self.price,
            used: -self.used,
        }
    }
}

/// Summed price and usage for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// The row's natural key.
    pub key: AggregateKey,
    /// Sum of `price` over live raw records with this key.
    pub total_price: Cents,
    /// Sum of `quantity` over live raw records with this key.
    pub total_used: i64,
}

impl AggregateRow {
    /// A row whose totals are exactly `delta`.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Integrity` if either component is negative: a row
    /// can only be created by adding a contribution.
    pub fn create(key: AggregateKey, delta: UsageDelta) -> Result<Self> {
        let mut row = Self::zero(key);
        row.apply(delta)?;
        Ok(row)
    }

    /// A row with zero totals.
    #[must_use]
    pub const fn zero(key: AggregateKey) -> Self {
        Self {
            key,
            total_price: Cents::ZERO,
            total_used: 0,
        }
    }

    /// Add `delta` to the totals.
    ///
    /// The row is left untouched on error.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Integrity` if a total would go below zero or
    /// overflow.
    pub fn apply(&mut self, delta: UsageDelta) -> Result<()> {
        let total_price = self
            .total_price
            .checked_add(delta.price)
            .ok_or_else(|| UsageError::Integrity(format!("price overflow on {}", self.key)))?;
        let total_used = self
            .total_used
            .checked_add(delta.used)
            .ok_or_else(|| UsageError::Integrity(format!("usage overflow on {}", self.key)))?;

        if total_price.is_negative() || total_used < 0 {
            return Err(UsageError::Integrity(format!(
                "decrement below recorded contribution on {}: have ({}, {}), delta ({}, {})",
                self.key, self.total_price, self.total_used, delta.price, delta.used
            )));
        }

        self.total_price = total_price;
        self.total_used = total_used;
        Ok(())
    }

    /// Whether both totals are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.total_price == Cents::ZERO && self.total_used == 0
    }
}
