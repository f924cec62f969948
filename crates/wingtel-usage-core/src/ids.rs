//! Identifier types for wingtel usage.
//!
//! Raw usage records are identified by a time-ordered [`RecordId`]; the
//! subscription a record is charged to is an opaque [`SubscriptionRef`]
//! resolved elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// A raw usage record identifier using ULID for time-ordering.
///
/// Record keys sort chronologically in storage, so a full scan visits
/// records in creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(Ulid);

impl RecordId {
    /// Generate a new `RecordId` with the current timestamp.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Return the bytes of the ULID (16 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    /// Create a `RecordId` from its 16-byte storage form.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Ulid::from_bytes(bytes))
    }
}

impl FromStr for RecordId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RecordId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0.to_string()
    }
}

/// Identifier of an external subscription entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Big-endian bytes, used as the leading component of aggregate keys.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl FromStr for SubscriptionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| IdError::InvalidSubscriptionId)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SubscriptionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Carrier a subscription is provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    /// AT&T.
    Att,
    /// Sprint.
    Sprint,
}

impl Carrier {
    /// Get the carrier name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Att => "att",
            Self::Sprint => "sprint",
        }
    }
}

impl FromStr for Carrier {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "att" => Ok(Self::Att),
            "sprint" => Ok(Self::Sprint),
            _ => Err(IdError::UnknownCarrier(s.to_string())),
        }
    }
}

/// Reference to the subscription a raw record is charged to.
///
/// The carrier tag is carried for display and filtering only; rollups are
/// partitioned by `id` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionRef {
    /// Stable subscription identifier.
    pub id: SubscriptionId,
    /// Optional carrier partition tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<Carrier>,
}

impl SubscriptionRef {
    /// Reference a subscription without a carrier tag.
    #[must_use]
    pub const fn new(id: SubscriptionId) -> Self {
        Self { id, carrier: None }
    }

    /// Attach a carrier tag.
    #[must_use]
    pub const fn with_carrier(mut self, carrier: Carrier) -> Self {
        self.carrier = Some(carrier);
        self
    }
}

impl From<SubscriptionId> for SubscriptionRef {
    fn from(id: SubscriptionId) -> Self {
        Self::new(id)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,

    /// The input is not a non-negative integer subscription id.
    #[error("invalid subscription id")]
    InvalidSubscriptionId,

    /// The carrier name is not recognised.
    #[error("unknown carrier: {0}")]
    UnknownCarrier(String),
}
