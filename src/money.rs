//! Fixed-point currency amounts
//!
//! Prices are rounded to the minor unit on construction so that differences
//! are computed exactly and never drift the way float arithmetic does.

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::ops::Sub;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places in the currency minor unit (cents)
pub const MINOR_UNIT_DIGITS: u32 = 2;

/// A price could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{raw}' is not a valid amount")]
pub struct MoneyError {
    pub raw: String,
}

/// A currency amount rounded to the minor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap a decimal, rounding half away from zero to the minor unit
    pub fn new(amount: Decimal) -> Self {
        let rounded =
            amount.round_dp_with_strategy(MINOR_UNIT_DIGITS, RoundingStrategy::MidpointAwayFromZero);
        // keep "-0.00" out of reports
        if rounded.is_zero() {
            return Money::ZERO;
        }
        Money(rounded)
    }

    /// Parse an amount such as "19.99" or " 5 "
    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        let trimmed = raw.trim();
        Decimal::from_str(trimmed)
            .map(Money::new)
            .map_err(|_| MoneyError {
                raw: raw.to_string(),
            })
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money::new(self.0 - rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
