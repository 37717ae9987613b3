//! Fixed-point money amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of fractional digits stored for every amount (`NUMERIC(10, 2)`).
pub const MONEY_SCALE: u32 = 2;

/// A currency amount with exactly two fractional digits.
///
/// Backed by [`Decimal`] so arithmetic is exact; serializes as a string
/// such as `"35.00"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Creates an amount, rounding to two fractional digits.
    pub fn new(amount: Decimal) -> Self {
        let mut amount = amount.round_dp(MONEY_SCALE);
        amount.rescale(MONEY_SCALE);
        Self(amount)
    }

    /// Creates an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, MONEY_SCALE))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self::from_cents(0)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiplies a unit price by a quantity.
    pub fn times(&self, quantity: i64) -> Money {
        Money::new(self.0 * Decimal::from(quantity))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
