//! # Quantity Module
//!
//! Fixed-point quantities for goods sold by unit or by weight.
//!
//! ```text
//! 1 unit      = 1000 milli-units
//! 0.1 kg      =  100 milli-units   ← smallest adjusted quantity
//! 2.5 kg      = 2500 milli-units
//! ```
//!
//! Stock levels use the same scale so stock checks are exact integer
//! comparisons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

use crate::money::Money;

/// Milli-units per whole unit.
pub const QUANTITY_SCALE: i64 = 1000;

/// A quantity in thousandths of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Smallest quantity a cart line can be adjusted down to (0.100).
    pub const MIN_ADJUSTED: Quantity = Quantity(100);

    /// One whole unit.
    pub const ONE: Quantity = Quantity(QUANTITY_SCALE);

    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * QUANTITY_SCALE)
    }

    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Exact extended price in `1/QUANTITY_SCALE` minor units.
    ///
    /// Kept unrounded so a cart can sum many lines and round once.
    #[inline]
    pub fn extend_price(&self, unit_price: Money) -> i128 {
        unit_price.cents() as i128 * self.0 as i128
    }

    /// Extended price rounded to cents (display of a single line).
    pub fn price(&self, unit_price: Money) -> Money {
        Money::from_scaled(self.extend_price(unit_price), QUANTITY_SCALE as i128)
    }
}

impl fmt::Display for Quantity {
    /// Whole quantities print without decimals; fractional ones trim
    /// trailing zeros (`2`, `0.1`, `1.25`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / QUANTITY_SCALE).abs();
        let frac = (self.0 % QUANTITY_SCALE).abs();
        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }
        let digits = format!("{:03}", frac);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}
