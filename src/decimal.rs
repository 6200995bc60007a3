use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// number of decimal places kept on every monetary value
pub const MONEY_DP: u32 = 2;

/// Money type with cent precision. every constructor and operator rounds
/// back to two decimal places so values never drift below the minimal
/// currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const CENT: Money = Money(Decimal::from_parts(1, 0, 0, false, 2));

    /// create from decimal, rounding half to even at cent precision
    pub fn from_decimal(d: Decimal) -> Self {
        Money(d.round_dp(MONEY_DP))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money::from_decimal(Decimal::from_str(s.trim())?))
    }

    /// create from whole currency units
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from cents
    pub fn from_minor(cents: i64) -> Self {
        Money(Decimal::new(cents, MONEY_DP))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// value in cents
    pub fn to_minor(&self) -> i64 {
        (self.0 * Decimal::from(100)).trunc().to_i64().unwrap_or(i64::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// clamp negative values to zero
    pub fn non_negative(self) -> Self {
        self.max(Money::ZERO)
    }

    /// calculate percentage (e.g., 10% of 1000)
    pub fn percentage(&self, rate: Rate) -> Self {
        Money::from_decimal(self.0 * rate.as_percentage() / Decimal::from(100))
    }

    /// divide into `parts` cent-exact shares. every share but the last is
    /// truncated to the cent, the last one absorbs the residue, so the shares
    /// always sum back to `self`.
    pub fn split_evenly(&self, parts: u32) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }

        let share = Money(
            (self.0 / Decimal::from(parts))
                .round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero),
        );
        let mut shares = vec![share; parts as usize];
        let allotted = share * Decimal::from(parts - 1);
        if let Some(last) = shares.last_mut() {
            *last = *self - allotted;
        }
        shares
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl From<u32> for Money {
    fn from(i: u32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money::from_decimal(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money::from_decimal(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money::from_decimal(self.0 * other)
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money::from_decimal(self.0 / other)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

/// interest rate stored as a percentage (10 means 10%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from percentage (e.g., 10 or dec!(12.5))
    pub fn from_percentage(p: impl Into<Decimal>) -> Self {
        Rate(p.into())
    }

    /// create from a fraction (e.g., 0.1 for 10%)
    pub fn from_fraction(d: Decimal) -> Self {
        Rate(d * Decimal::from(100))
    }

    /// create from basis points (e.g., 1000 for 10%)
    pub fn from_bps(bps: u32) -> Self {
        Rate(Decimal::from(bps) / Decimal::from(100))
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        self.0 / Decimal::from(100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

impl FromStr for Rate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('%');
        Ok(Rate(Decimal::from_str(trimmed)?))
    }
}
