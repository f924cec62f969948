//! Raw usage records.
//!
//! A raw record is the source of truth for one data session or voice call.
//! Rollup rows are derived from these and never written independently.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateKey, UsageDelta};
use crate::error::{Result, UsageError};
use crate::ids::{RecordId, SubscriptionRef};
use crate::money::Cents;

/// Kind of usage; decides what the record's quantity measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Mobile data, measured in kilobytes.
    Data,
    /// Voice calls, measured in seconds.
    Voice,
}

impl UsageType {
    /// Get the usage type as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Voice => "voice",
        }
    }

    /// Name of the quantity field for this kind on the wire.
    #[must_use]
    pub const fn quantity_field(self) -> &'static str {
        match self {
            Self::Data => "kilobytes_used",
            Self::Voice => "seconds_used",
        }
    }

    /// Single-byte tag used in storage keys.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Data => 1,
            Self::Voice => 2,
        }
    }

    /// Inverse of [`UsageType::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Data),
            2 => Some(Self::Voice),
            _ => None,
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageType {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "data" => Ok(Self::Data),
            "voice" => Ok(Self::Voice),
            other => Err(UsageError::validation(
                "type_of_usage",
                format!("expected \"data\" or \"voice\", got {other:?}"),
            )),
        }
    }
}

/// A raw usage record for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Immutable identifier assigned at creation.
    pub id: RecordId,

    /// Subscription being charged.
    pub subscription: SubscriptionRef,

    /// Data or voice.
    pub usage_type: UsageType,

    /// When the usage occurred.
    pub usage_date: DateTime<Utc>,

    /// Pre-computed price of this usage.
    pub price: Cents,

    /// Kilobytes for data records, seconds for voice records.
    pub quantity: i64,
}

impl UsageRecord {
    /// Create a new record with a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Validation` if the price or quantity is negative.
    pub fn new(
        subscription: SubscriptionRef,
        usage_type: UsageType,
        usage_date: DateTime<Utc>,
        price: Cents,
        quantity: i64,
    ) -> Result<Self> {
        let record = Self {
            id: RecordId::generate(),
            subscription,
            usage_type,
            usage_date,
            price,
            quantity,
        };
        record.validate()?;
        Ok(record)
    }

    /// Create a data record.
    ///
    /// # Errors
    ///
    /// See [`UsageRecord::new`].
    pub fn data(
        subscription: impl Into<SubscriptionRef>,
        usage_date: DateTime<Utc>,
        price: Cents,
        kilobytes_used: i64,
    ) -> Result<Self> {
        Self::new(
            subscription.into(),
            UsageType::Data,
            usage_date,
            price,
            kilobytes_used,
        )
    }

    /// Create a voice record.
    ///
    /// # Errors
    ///
    /// See [`UsageRecord::new`].
    pub fn voice(
        subscription: impl Into<SubscriptionRef>,
        usage_date: DateTime<Utc>,
        price: Cents,
        seconds_used: i64,
    ) -> Result<Self> {
        Self::new(
            subscription.into(),
            UsageType::Voice,
            usage_date,
            price,
            seconds_used,
        )
    }

    /// Check the non-negativity constraints on price and quantity.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Validation` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.price.is_negative() {
            return Err(UsageError::validation("price", "must not be negative"));
        }
        if self.quantity < 0 {
            return Err(UsageError::validation(
                self.usage_type.quantity_field(),
                "must not be negative",
            ));
        }
        Ok(())
    }

    /// UTC calendar day of the usage.
    #[must_use]
    pub fn usage_day(&self) -> NaiveDate {
        self.usage_date.date_naive()
    }

    /// The rollup row this record contributes to.
    #[must_use]
    pub fn aggregate_key(&self) -> AggregateKey {
        AggregateKey {
            subscription_id: self.subscription.id,
            usage_type: self.usage_type,
            usage_date: self.usage_day(),
        }
    }

    /// What this record adds to its rollup row.
    #[must_use]
    pub fn contribution(&self) -> UsageDelta {
        UsageDelta {
            price: self.price,
            used: self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubscriptionId;
    use chrono::TimeZone;

    #[test]
    fn aggregate_key_uses_utc_day() {
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let record = UsageRecord::data(SubscriptionId(7), late, Cents(5000), 200).unwrap();

        let key = record.aggregate_key();
        assert_eq!(key.subscription_id, SubscriptionId(7));
        assert_eq!(key.usage_type, UsageType::Data);
        assert_eq!(key.usage_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn negative_values_are_rejected() {
        let now = Utc::now();
        let err = UsageRecord::voice(SubscriptionId(1), now, Cents(-1), 10).unwrap_err();
        assert!(matches!(err, UsageError::Validation { field: "price", .. }));

        let err = UsageRecord::voice(SubscriptionId(1), now, Cents(1), -10).unwrap_err();
        assert!(matches!(
            err,
            UsageError::Validation {
                field: "seconds_used",
                ..
            }
        ));
    }

    #[test]
    fn usage_type_parse() {
        assert_eq!("data".parse::<UsageType>().unwrap(), UsageType::Data);
        assert_eq!("voice".parse::<UsageType>().unwrap(), UsageType::Voice);
        assert!("sms".parse::<UsageType>().is_err());
        assert_eq!(UsageType::from_tag(UsageType::Voice.tag()), Some(UsageType::Voice));
    }
}
