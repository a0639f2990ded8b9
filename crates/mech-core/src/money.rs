//! # Money Module
//!
//! Provides the `Money` and `UnitPrice` types for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  The old cart page summed prices parsed out of the DOM:                 │
//! │    parseFloat("0.10") + parseFloat("0.20") = 0.30000000000000004        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer units                                            │
//! │    Money      → cents             (2 decimal places)                    │
//! │    UnitPrice  → ten-thousandths   (4 decimal places)                    │
//! │                                                                         │
//! │  Line totals are summed exactly in ten-thousandths and rounded to       │
//! │  cents ONCE, with round-half-to-even.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mech_core::money::{Money, UnitPrice};
//!
//! let price: UnitPrice = "25.00".parse().unwrap();
//! let line = Money::from_scaled_half_even(price.line_total_exact(2), UnitPrice::SCALE_TO_CENTS);
//! assert_eq!(line, Money::from_cents(5000));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `value` by `divisor`, rounding half to even.
///
/// ```text
///   0.5 → 0    1.5 → 2    2.5 → 2    3.5 → 4    -2.5 → -2
/// ```
///
/// `divisor` must be positive.
pub fn div_round_half_even(value: i128, divisor: i128) -> i128 {
    debug_assert!(divisor > 0, "divisor must be positive");

    let quotient = value / divisor;
    let remainder = value % divisor;
    if remainder == 0 {
        return quotient;
    }

    let away = if value < 0 { quotient - 1 } else { quotient + 1 };
    let twice = remainder.abs() * 2;

    if twice > divisor {
        away
    } else if twice < divisor {
        quotient
    } else if quotient % 2 == 0 {
        quotient
    } else {
        away
    }
}

/// Parses a plain decimal string (`"12"`, `"-3.5"`, `"0.125"`) into an integer
/// scaled by `10^places`. Extra fractional digits are rounded half to even.
fn parse_scaled(input: &str, places: u32) -> Option<i128> {
    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let mut scaled: i128 = 0;
    let mut push = |digit: u32| -> Option<()> {
        scaled = scaled.checked_mul(10)?.checked_add(i128::from(digit))?;
        Some(())
    };

    let mut fraction_digits = fraction.chars().filter_map(|c| c.to_digit(10));
    for c in whole.chars() {
        push(c.to_digit(10)?)?;
    }
    for _ in 0..places {
        push(fraction_digits.next().unwrap_or(0))?;
    }

    // Round the dropped digits half to even against the last kept digit.
    if let Some(first) = fraction_digits.next() {
        let rest_nonzero = fraction_digits.any(|d| d != 0);
        let round_up = match first {
            0..=4 => false,
            5 if !rest_nonzero => scaled % 2 != 0,
            _ => true,
        };
        if round_up {
            scaled = scaled.checked_add(1)?;
        }
    }

    Some(if negative { -scaled } else { scaled })
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents (the smallest currency unit).
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  UnitPrice × quantity ──► Σ (exact) ──► subtotal: Money                 │
/// │                                              │                          │
/// │  AppliedDiscount.amount: Money ──► capped ───┤                          │
/// │                                              ▼                          │
/// │                                        total: Money ──► pay label       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use mech_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds `value / divisor` cents half to even.
    ///
    /// Line totals are kept in ten-thousandths of a currency unit, so the
    /// subtotal is `from_scaled_half_even(sum, UnitPrice::SCALE_TO_CENTS)`.
    ///
    /// ```rust
    /// use mech_core::money::Money;
    ///
    /// assert_eq!(Money::from_scaled_half_even(1250, 100).cents(), 12); // 12.5 → 12
    /// assert_eq!(Money::from_scaled_half_even(1350, 100).cents(), 14); // 13.5 → 14
    /// ```
    pub fn from_scaled_half_even(value: i128, divisor: i128) -> Self {
        let cents = div_round_half_even(value, divisor);
        Money(cents.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
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
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Subtracts without going below zero.
    ///
    /// ```rust
    /// use mech_core::money::Money;
    ///
    /// let total = Money::from_cents(500).saturating_sub_floor(Money::from_cents(800));
    /// assert!(total.is_zero());
    /// ```
    #[inline]
    pub fn saturating_sub_floor(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    /// Computes a percentage of this amount, rounding half to even.
    ///
    /// ## Arguments
    /// * `bps` - Percentage in basis points (1000 = 10%)
    ///
    /// ```rust
    /// use mech_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(6000);
    /// assert_eq!(subtotal.percentage(1000).cents(), 600);
    /// // $0.25 × 10% = 2.5 cents → 2 (even)
    /// assert_eq!(Money::from_cents(25).percentage(1000).cents(), 2);
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        Money::from_scaled_half_even(i128::from(self.0) * i128::from(bps), 10_000)
    }

    /// Formats the amount as a plain decimal string (`"54.00"`), no symbol.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

/// Display shows money as `$12.34` (debugging and button labels).
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

/// Parses `"54"`, `"54.5"`, `"54.505"`; digits beyond cents round half to even.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cents = parse_scaled(s, 2).ok_or_else(|| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("'{}' is not a decimal amount", s.trim()),
        })?;
        i64::try_from(cents)
            .map(Money)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: "amount is too large".to_string(),
            })
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

// =============================================================================
// Unit Price
// =============================================================================

/// A unit price in ten-thousandths of the currency unit.
///
/// ## Why not cents?
/// Service rates and bulk parts are sometimes priced below a cent
/// (`"3.3350"`). Keeping four places lets the subtotal be rounded once over
/// the whole cart instead of once per line, which is what keeps the rounding
/// unbiased across many line items.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct UnitPrice(i64);

impl UnitPrice {
    /// Number of decimal places kept.
    pub const PLACES: u32 = 4;

    /// Divisor from ten-thousandths down to cents.
    pub const SCALE_TO_CENTS: i128 = 100;

    #[inline]
    pub const fn from_ten_thousandths(value: i64) -> Self {
        UnitPrice(value)
    }

    /// Builds a unit price from whole cents.
    ///
    /// ```rust
    /// use mech_core::money::UnitPrice;
    ///
    /// assert_eq!(UnitPrice::from_cents(2500).ten_thousandths(), 250_000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        UnitPrice(cents * 100)
    }

    #[inline]
    pub const fn ten_thousandths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Exact line total (`price × quantity`) in ten-thousandths.
    #[inline]
    pub fn line_total_exact(&self, quantity: u32) -> i128 {
        i128::from(self.0) * i128::from(quantity)
    }
}

impl fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 100 == 0 {
            return write!(f, "{}", Money::from_cents(self.0 / 100));
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:04}", sign, abs / 10_000, abs % 10_000)
    }
}

impl FromStr for UnitPrice {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let scaled =
            parse_scaled(s, Self::PLACES).ok_or_else(|| ValidationError::InvalidFormat {
                field: "unit price".to_string(),
                reason: format!("'{}' is not a decimal price", s.trim()),
            })?;
        i64::try_from(scaled)
            .map(UnitPrice)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "unit price".to_string(),
                reason: "price is too large".to_string(),
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
