//! # Domain Types
//!
//! Core domain types of the cart.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    LineItem     │   │ AppliedDiscount │   │   CartNotice    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  item_id        │   │  code           │   │  StockExceeded  │       │
//! │  │  unit_price     │   │  amount         │   │  Superseded     │       │
//! │  │  quantity       │   └─────────────────┘   │  DiscountCleared│       │
//! │  │  stock_ceiling  │                         └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A line item freezes its unit price when it is added. Only the stock
//! ceiling is refreshed afterwards, and only through the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, UnitPrice};
use crate::validation;

// =============================================================================
// Item ID
// =============================================================================

/// Identifier of a purchasable part or service (server-assigned).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a validated item id (trimmed, non-empty, at most 64 chars).
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        validation::validate_item_id(trimmed)?;
        Ok(ItemId(trimmed.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId(value)
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// A request to put an item in the cart, as sent by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewLineItem {
    pub item_id: ItemId,
    /// Server-sourced unit price.
    pub unit_price: UnitPrice,
    /// Requested quantity; signed because it comes straight from an input box.
    pub quantity: i64,
    /// Maximum purchasable quantity at the time of adding.
    pub stock_ceiling: u32,
    /// Display label.
    #[serde(default)]
    pub name: Option<String>,
}

impl NewLineItem {
    pub fn new(
        item_id: impl Into<ItemId>,
        unit_price: UnitPrice,
        quantity: i64,
        stock_ceiling: u32,
    ) -> Self {
        NewLineItem {
            item_id: item_id.into(),
            unit_price,
            quantity,
            stock_ceiling,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One product or service entry in the cart.
///
/// ## Invariants
/// - `1 <= quantity <= stock_ceiling`
/// - `unit_price >= 0`, fixed at add time
///
/// Fields are private so only [`crate::store::LineItemStore`] can change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineItem {
    item_id: ItemId,
    name: Option<String>,
    unit_price: UnitPrice,
    quantity: u32,
    stock_ceiling: u32,
    #[ts(as = "String")]
    added_at: DateTime<Utc>,
}

impl LineItem {
    /// Validates a [`NewLineItem`] and freezes it into a line item.
    pub fn new(request: NewLineItem) -> CoreResult<Self> {
        validation::validate_item_id(request.item_id.as_str())?;
        validation::validate_unit_price(request.unit_price)?;

        if request.quantity < 1 || request.quantity > i64::from(request.stock_ceiling) {
            return Err(CoreError::InvalidQuantity {
                item_id: request.item_id,
                quantity: request.quantity,
                stock_ceiling: request.stock_ceiling,
            });
        }

        Ok(LineItem {
            item_id: request.item_id,
            name: request.name,
            unit_price: request.unit_price,
            quantity: request.quantity as u32,
            stock_ceiling: request.stock_ceiling,
            added_at: Utc::now(),
        })
    }

    #[inline]
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn unit_price(&self) -> UnitPrice {
        self.unit_price
    }

    #[inline]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    #[inline]
    pub fn stock_ceiling(&self) -> u32 {
        self.stock_ceiling
    }

    #[inline]
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Exact line total in ten-thousandths.
    #[inline]
    pub fn line_total_exact(&self) -> i128 {
        self.unit_price.line_total_exact(self.quantity)
    }

    /// Line total rounded to cents, for display next to the item.
    pub fn line_total(&self) -> Money {
        Money::from_scaled_half_even(self.line_total_exact(), UnitPrice::SCALE_TO_CENTS)
    }

    pub(crate) fn set_quantity_unchecked(&mut self, quantity: u32) {
        debug_assert!(quantity >= 1 && quantity <= self.stock_ceiling);
        self.quantity = quantity;
    }

    pub(crate) fn set_stock_ceiling_unchecked(&mut self, stock_ceiling: u32) {
        self.stock_ceiling = stock_ceiling;
    }
}

// =============================================================================
// Applied Discount
// =============================================================================

/// A validated discount code and the deduction it grants.
///
/// `amount` is whatever the discount service returned; the pricing calculator
/// caps it at the subtotal every time totals are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AppliedDiscount {
    pub code: String,
    pub amount: Money,
}

impl AppliedDiscount {
    pub fn new(code: impl Into<String>, amount: Money) -> Self {
        AppliedDiscount {
            code: code.into(),
            amount,
        }
    }
}

// =============================================================================
// Cart Notice
// =============================================================================

/// Non-fatal, informational signals produced by cart operations.
///
/// ## User Workflow
/// ```text
/// updateQuantity("42", 10)  with stock 5
///      │
///      ▼
/// quantity := 5, notice: StockExceeded { requested: 10, stock_ceiling: 5 }
///      │
///      ▼
/// UI shows: "Only 5 items available in stock" (warning, not error)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum CartNotice {
    /// Quantity was clamped to the stock ceiling.
    StockExceeded {
        item_id: ItemId,
        requested: i64,
        stock_ceiling: u32,
    },

    /// The response arrived after a newer mutation had already committed and
    /// was discarded.
    Superseded { request: u64 },

    /// The applied discount no longer validates against the cart and was removed.
    DiscountCleared { code: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_parse_trims() {
        let id = ItemId::parse("  oil-filter ").unwrap();
        assert_eq!(id.as_str(), "oil-filter");
        assert!(ItemId::parse("   ").is_err());
    }

    #[test]
    fn test_line_item_rejects_quantity_out_of_range() {
        let err = LineItem::new(NewLineItem::new("a", UnitPrice::from_cents(100), 0, 5))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity { quantity: 0, .. }));

        let err = LineItem::new(NewLineItem::new("a", UnitPrice::from_cents(100), 6, 5))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity { quantity: 6, .. }));
    }

    #[test]
    fn test_line_item_rejects_negative_price() {
        let err = LineItem::new(NewLineItem::new(
            "a",
            UnitPrice::from_ten_thousandths(-1),
            1,
            5,
        ))
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_line_total() {
        let item = LineItem::new(
            NewLineItem::new("a", UnitPrice::from_cents(2500), 2, 5).with_name("Brake pads"),
        )
        .unwrap();
        assert_eq!(item.line_total(), Money::from_cents(5000));
        assert_eq!(item.name(), Some("Brake pads"));
    }

    #[test]
    fn test_notice_serializes_with_kind_tag() {
        let notice = CartNotice::StockExceeded {
            item_id: ItemId::from("a"),
            requested: 10,
            stock_ceiling: 5,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "stock_exceeded");
        assert_eq!(json["stock_ceiling"], 5);
    }
}
