//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Floating point:  58.00 × 2 / 1.16 = 99.99999999999999  ❌             │
//! │                                                                         │
//! │  A split tender {CASH: 70.00, TRANSFER: 46.00} must equal the total    │
//! │  EXACTLY. A tolerance check lets a cent slip through per sale.         │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (centavos)                          │
//! │    11600 == 7000 + 4600   → exact comparison, no tolerance             │
//! │                                                                         │
//! │  Intermediate values (price × fractional quantity, tax extraction)    │
//! │  are carried in i128 at a finer scale and rounded ONCE, with          │
//! │  Bankers Rounding, when the value becomes a persisted/display amount. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use caja_core::money::Money;
//!
//! let price = Money::from_cents(5800); // $58.00
//! let total = price * 2;               // $116.00
//! assert_eq!(total.cents(), 11600);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numerator` by `denominator` rounding half to even.
///
/// ## Bankers Rounding
/// ```text
/// 0.5 → 0, 1.5 → 2, 2.5 → 2, 3.5 → 4, -0.5 → 0, -1.5 → -2
/// ```
/// Ties alternate direction, so rounding error does not accumulate in one
/// direction over many transactions.
///
/// `denominator` must be positive.
pub fn round_half_even(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0, "denominator must be positive");

    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);

    match (remainder * 2).cmp(&denominator) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => {
            if quotient % 2 == 0 {
                quotient
            } else {
                quotient + 1
            }
        }
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the currency's minor unit (centavos for MXN).
///
/// ## Design Decisions
/// - **i64 (signed)**: reversals and variances can be negative
/// - **Single field tuple struct**: zero-cost over i64, stored as INTEGER
///
/// ## Where Money Flows
/// ```text
/// Product.unit_price ──► CartLine ──► Cart::total() ──► Tender amounts
///                                          │
///                                          ▼
///                     Sale.total ──► Shift.expected_cash ──► BankMovement
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// let float = Money::from_cents(50000); // $500.00
    /// assert_eq!(float.cents(), 50000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(58, 0).cents(), 5800);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    ///
    /// For negative amounts only the major unit carries the sign.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Rounds a value expressed in `1/scale` minor units to Money.
    ///
    /// This is the single point where sub-cent intermediates become cents.
    ///
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// // 1234.5 cents (expressed in tenths) rounds to the even neighbour
    /// assert_eq!(Money::from_scaled(12345, 10).cents(), 1234);
    /// assert_eq!(Money::from_scaled(12355, 10).cents(), 1236);
    /// ```
    pub fn from_scaled(value: i128, scale: i128) -> Self {
        Money(round_half_even(value, scale) as i64)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Adds tax on top of a tax-exclusive amount (Bankers Rounding).
    ///
    /// Used when a catalog price is not tax-inclusive and must be converted
    /// before it enters a cart line.
    ///
    /// ```rust
    /// use caja_core::money::Money;
    /// use caja_core::types::TaxRate;
    ///
    /// let net = Money::from_cents(5000);
    /// assert_eq!(net.with_tax(TaxRate::from_bps(1600)).cents(), 5800);
    /// ```
    pub fn with_tax(&self, rate: TaxRate) -> Money {
        let gross = self.0 as i128 * (10_000 + rate.bps() as i128);
        Money::from_scaled(gross, 10_000)
    }

    /// Splits a tax-inclusive amount into its net and tax portions.
    ///
    /// ```text
    /// subtotal = total / (1 + rate)      (Bankers Rounding)
    /// tax      = total − subtotal        (exact, so the parts always add up)
    /// ```
    ///
    /// ```rust
    /// use caja_core::money::Money;
    /// use caja_core::types::TaxRate;
    ///
    /// let split = Money::from_cents(11600).extract_tax(TaxRate::from_bps(1600));
    /// assert_eq!(split.subtotal.cents(), 10000);
    /// assert_eq!(split.tax.cents(), 1600);
    /// ```
    pub fn extract_tax(&self, rate: TaxRate) -> TaxSplit {
        let subtotal = Money::from_scaled(
            self.0 as i128 * 10_000,
            10_000 + rate.bps() as i128,
        );
        TaxSplit {
            subtotal,
            tax: *self - subtotal,
        }
    }

    /// Multiplies money by an integer quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Net and tax portions of a tax-inclusive amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxSplit {
    pub subtotal: Money,
    pub tax: Money,
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display for logs and receipts; localisation belongs to the caller.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(11600)), "$116.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_round_half_even_ties() {
        assert_eq!(round_half_even(5, 10), 0);
        assert_eq!(round_half_even(15, 10), 2);
        assert_eq!(round_half_even(25, 10), 2);
        assert_eq!(round_half_even(35, 10), 4);
        assert_eq!(round_half_even(-5, 10), 0);
        assert_eq!(round_half_even(-15, 10), -2);
        assert_eq!(round_half_even(-25, 10), -2);
    }

    #[test]
    fn test_round_half_even_non_ties() {
        assert_eq!(round_half_even(14, 10), 1);
        assert_eq!(round_half_even(16, 10), 2);
        assert_eq!(round_half_even(-14, 10), -1);
        assert_eq!(round_half_even(-16, 10), -2);
        assert_eq!(round_half_even(20, 10), 2);
    }

    #[test]
    fn test_extract_tax_at_sixteen_percent() {
        let rate = TaxRate::from_bps(1600);

        let split = Money::from_cents(11600).extract_tax(rate);
        assert_eq!(split.subtotal, Money::from_cents(10000));
        assert_eq!(split.tax, Money::from_cents(1600));

        // $1.00 inclusive → 86.206… cents net → 86
        let split = Money::from_cents(100).extract_tax(rate);
        assert_eq!(split.subtotal.cents(), 86);
        assert_eq!(split.tax.cents(), 14);
    }

    #[test]
    fn test_extract_tax_parts_always_sum_to_total() {
        let rate = TaxRate::from_bps(1600);
        for cents in 0..5_000 {
            let total = Money::from_cents(cents);
            let split = total.extract_tax(rate);
            assert_eq!(split.subtotal + split.tax, total);
        }
    }

    #[test]
    fn test_with_tax() {
        let rate = TaxRate::from_bps(1600);
        assert_eq!(Money::from_cents(5000).with_tax(rate).cents(), 5800);
        assert_eq!(Money::from_cents(3125).with_tax(rate).cents(), 3625);
        // 0.33 × 1.16 = 0.3828 → 38
        assert_eq!(Money::from_cents(33).with_tax(rate).cents(), 38);
    }

    #[test]
    fn test_sum_and_neg() {
        let parts = [Money::from_cents(7000), Money::from_cents(4600)];
        let total: Money = parts.iter().sum();
        assert_eq!(total.cents(), 11600);
        assert_eq!((-total).cents(), -11600);
    }
}
