use std::{
    fmt,
    ops::{Add, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Energy quantity stored as **integer hundredths of a kWh**.
///
/// Balances, ledger amounts, ceilings and thresholds all use this type so no
/// floating-point value ever reaches storage.
///
/// ```rust
/// use engine::Kwh;
///
/// let amount = Kwh::new(25_50);
/// assert_eq!(amount.hundredths(), 2550);
/// assert_eq!(amount.to_string(), "25.50 kWh");
/// ```
///
/// Parsing from user input accepts `.` or `,` as decimal separator and
/// rejects more than two decimals:
///
/// ```rust
/// use engine::Kwh;
///
/// assert_eq!("10".parse::<Kwh>().unwrap().hundredths(), 1000);
/// assert_eq!("10,5".parse::<Kwh>().unwrap().hundredths(), 1050);
/// assert!("12.345".parse::<Kwh>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Kwh(i64);

impl Kwh {
    pub const ZERO: Kwh = Kwh(0);

    #[must_use]
    pub const fn new(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Whole kWh, e.g. `Kwh::whole(20)` is `20.00 kWh`.
    #[must_use]
    pub const fn whole(units: i64) -> Self {
        Self(units * 100)
    }

    #[must_use]
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub fn checked_add(self, rhs: Kwh) -> Option<Kwh> {
        self.0.checked_add(rhs.0).map(Kwh)
    }

    #[must_use]
    pub fn checked_sub(self, rhs: Kwh) -> Option<Kwh> {
        self.0.checked_sub(rhs.0).map(Kwh)
    }

    /// Plain decimal rendering without the unit, used in CSV exports.
    #[must_use]
    pub fn decimal(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl fmt::Display for Kwh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kWh", self.decimal())
    }
}

impl From<i64> for Kwh {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Kwh> for i64 {
    fn from(value: Kwh) -> Self {
        value.0
    }
}

impl Add for Kwh {
    type Output = Kwh;

    fn add(self, rhs: Kwh) -> Self::Output {
        Kwh(self.0 + rhs.0)
    }
}

impl Sub for Kwh {
    type Output = Kwh;

    fn sub(self, rhs: Kwh) -> Self::Output {
        Kwh(self.0 - rhs.0)
    }
}

impl FromStr for Kwh {
    type Err = EngineError;

    /// Parses an unsigned decimal string into hundredths.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`)
    /// - no sign, no exponent, no thousands separator
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidAmount("invalid amount".to_string());
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidAmount("empty amount".to_string()));
        }

        let normalized = trimmed.replace(',', ".");
        let (units_str, frac_str) = match normalized.split_once('.') {
            Some((units, frac)) => (units, Some(frac)),
            None => (normalized.as_str(), None),
        };

        if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let units: i64 = units_str.parse().map_err(|_| overflow())?;

        let frac: i64 = match frac_str {
            None | Some("") => 0,
            Some(frac) if !frac.chars().all(|c| c.is_ascii_digit()) => return Err(invalid()),
            Some(frac) if frac.len() == 1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            Some(frac) if frac.len() == 2 => frac.parse::<i64>().map_err(|_| invalid())?,
            Some(_) => {
                return Err(EngineError::InvalidAmount("too many decimals".to_string()));
            }
        };

        units
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .map(Kwh)
            .ok_or_else(overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_appends_unit() {
        assert_eq!(Kwh::new(0).to_string(), "0.00 kWh");
        assert_eq!(Kwh::new(5).to_string(), "0.05 kWh");
        assert_eq!(Kwh::new(7550).to_string(), "75.50 kWh");
        assert_eq!(Kwh::new(-1050).to_string(), "-10.50 kWh");
        assert_eq!(Kwh::whole(20).decimal(), "20.00");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("25.5".parse::<Kwh>().unwrap(), Kwh::new(2550));
        assert_eq!("25,50".parse::<Kwh>().unwrap(), Kwh::new(2550));
        assert_eq!(" 12 ".parse::<Kwh>().unwrap(), Kwh::new(1200));
        assert_eq!("3.".parse::<Kwh>().unwrap(), Kwh::new(300));
    }

    #[test]
    fn parse_rejects_garbage() {
        for input in ["", "  ", "abc", "-5", "+5", "1.2.3", "12.345", ".5", "1e3", "1 000"] {
            assert!(input.parse::<Kwh>().is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn ledger_types_are_serde() {
        fn assert_serde<T: Serialize + for<'de> Deserialize<'de>>() {}
        assert_serde::<Kwh>();
        assert_serde::<crate::LedgerEntry>();
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!("99999999999999999999".parse::<Kwh>().is_err());
    }
}
