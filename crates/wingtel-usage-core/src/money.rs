//! Fixed-point monetary amounts.
//!
//! Prices carry exactly two fractional digits and are stored as `i64`
//! integer cents, so sums and differences are exact.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UsageError;

/// An amount of money in cents. May be negative when used as a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Build an amount from whole currency units.
    ///
    /// Returns `None` if the amount does not fit in `i64` cents.
    #[must_use]
    pub const fn from_units(units: i64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Raw cent value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses `"12"`, `"12.5"`, `"12.50"` and `"-0.25"`. More than two
/// fractional digits is rejected rather than rounded.
impl FromStr for Cents {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UsageError::validation("price", format!("not a decimal amount: {s:?}"));

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) || (digits.contains('.') && frac.is_empty())
        {
            return Err(invalid());
        }
        if frac.len() > 2 {
            return Err(UsageError::validation(
                "price",
                "at most two fractional digits are allowed",
            ));
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(invalid)?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("12".parse::<Cents>().unwrap(), Cents(1200));
        assert_eq!("12.5".parse::<Cents>().unwrap(), Cents(1250));
        assert_eq!("12.05".parse::<Cents>().unwrap(), Cents(1205));
        assert_eq!("0.99".parse::<Cents>().unwrap(), Cents(99));
        assert_eq!("-0.25".parse::<Cents>().unwrap(), Cents(-25));
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", ".", "1.", ".5", "1.234", "abc", "1,00", "--1", "1e3"] {
            assert!(bad.parse::<Cents>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn display_has_two_fraction_digits() {
        assert_eq!(Cents(1000).to_string(), "10.00");
        assert_eq!(Cents(5).to_string(), "0.05");
        assert_eq!(Cents(-150).to_string(), "-1.50");
        assert_eq!(Cents::ZERO.to_string(), "0.00");
    }

    #[test]
    fn arithmetic_is_exact() {
        let total: Cents = ["0.10", "0.20", "0.30"]
            .iter()
            .map(|s| s.parse::<Cents>().unwrap())
            .fold(Cents::ZERO, Add::add);
        assert_eq!(total, Cents(60));
        assert_eq!(total - Cents::from_units(1).unwrap(), Cents(-40));
    }

    #[test]
    fn from_units_rejects_overflow() {
        assert_eq!(Cents::from_units(40), Some(Cents(4_000)));
        assert_eq!(Cents::from_units(-2), Some(Cents(-200)));
        assert_eq!(Cents::from_units(i64::MAX / 100 + 1), None);
        assert_eq!(Cents::from_units(i64::MIN), None);
    }
}
