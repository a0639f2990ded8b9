//! # Pricing Calculator
//!
//! Derives subtotal, discount and total from the line items. Pure: it never
//! touches the store and gives the same answer for the same input.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pricing Calculation                                │
//! │                                                                         │
//! │  For each item:                                                         │
//! │    exact += unit_price × quantity        (i128, ten-thousandths)        │
//! │                                                                         │
//! │  subtotal = round_half_even(exact / 100) (cents, rounded ONCE)          │
//! │                                                                         │
//! │  discount = clamp(applied.amount, 0, subtotal)                          │
//! │                                                                         │
//! │  total    = max(0, subtotal − discount)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use ts_rs::TS;

use crate::money::{Money, UnitPrice};
use crate::types::{AppliedDiscount, LineItem};

/// Totals shown in the cart summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub total: Money,
    /// Number of distinct items.
    pub item_count: usize,
    /// Sum of quantities.
    pub total_quantity: u64,
}

/// Computes the price breakdown for a set of line items.
///
/// ```rust
/// use mech_core::money::{Money, UnitPrice};
/// use mech_core::pricing::price;
/// use mech_core::store::LineItemStore;
/// use mech_core::types::{AppliedDiscount, NewLineItem};
///
/// let mut store = LineItemStore::default();
/// store.add(NewLineItem::new("A", UnitPrice::from_cents(2500), 2, 5)).unwrap();
/// store.add(NewLineItem::new("B", UnitPrice::from_cents(1000), 1, 1)).unwrap();
///
/// let discount = AppliedDiscount::new("SAVE10", Money::from_cents(600));
/// let totals = price(store.as_slice(), Some(&discount));
/// assert_eq!(totals.subtotal, Money::from_cents(6000));
/// assert_eq!(totals.total, Money::from_cents(5400));
/// ```
pub fn price<'a, I>(items: I, applied_discount: Option<&AppliedDiscount>) -> PriceBreakdown
where
    I: IntoIterator<Item = &'a LineItem>,
{
    let mut exact: i128 = 0;
    let mut item_count = 0usize;
    let mut total_quantity = 0u64;

    for item in items {
        exact += item.line_total_exact();
        item_count += 1;
        total_quantity += u64::from(item.quantity());
    }

    let subtotal = Money::from_scaled_half_even(exact, UnitPrice::SCALE_TO_CENTS);
    let discount_amount = applied_discount
        .map(|d| cap_discount(d.amount, subtotal))
        .unwrap_or_default();

    PriceBreakdown {
        subtotal,
        discount_amount,
        total: subtotal.saturating_sub_floor(discount_amount),
        item_count,
        total_quantity,
    }
}

/// Clamps a discount amount into `0..=subtotal`.
pub fn cap_discount(amount: Money, subtotal: Money) -> Money {
    amount.max(Money::zero()).min(subtotal.max(Money::zero()))
}
