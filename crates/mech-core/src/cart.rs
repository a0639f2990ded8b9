//! # Cart Aggregate
//!
//! The session cart: line items, the applied discount and a version counter.
//!
//! ## Versioning
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cart Version                                    │
//! │                                                                         │
//! │   v0 ──add──► v1 ──set_quantity──► v2 ──apply_discount──► v3 ...        │
//! │                                                                         │
//! │   • Every successful mutation bumps `version` by exactly one            │
//! │   • Failed mutations leave both contents and version untouched          │
//! │   • Async callers compare versions to spot results that went stale      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart itself is synchronous and lock-free; the async service in
//! `mech-cart` owns it behind a mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::money::Money;
use crate::pricing::{self, PriceBreakdown};
use crate::store::LineItemStore;
use crate::types::{AppliedDiscount, CartNotice, ItemId, LineItem, NewLineItem};

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone)]
pub struct Cart {
    id: Uuid,
    store: LineItemStore,
    applied_discount: Option<AppliedDiscount>,
    version: u64,
    created_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart allowing at most `max_items` distinct items.
    pub fn new(max_items: usize) -> Self {
        Cart {
            id: Uuid::new_v4(),
            store: LineItemStore::new(max_items),
            applied_discount: None,
            version: 0,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn items(&self) -> &LineItemStore {
        &self.store
    }

    #[inline]
    pub fn applied_discount(&self) -> Option<&AppliedDiscount> {
        self.applied_discount.as_ref()
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Current quantity of an item, 0 when it is not in the cart.
    pub fn quantity_of(&self, item_id: &ItemId) -> u32 {
        self.store.get(item_id).map(LineItem::quantity).unwrap_or(0)
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    // -------------------------------------------------------------------------
    // Item mutations
    // -------------------------------------------------------------------------

    pub fn add_item(&mut self, request: NewLineItem) -> CoreResult<Option<CartNotice>> {
        let notice = self.store.add(request)?;
        self.bump();
        Ok(notice)
    }

    pub fn set_quantity(&mut self, item_id: &ItemId, quantity: i64) -> CoreResult<Option<CartNotice>> {
        let notice = self.store.set_quantity(item_id, quantity)?;
        self.bump();
        Ok(notice)
    }

    pub fn remove_item(&mut self, item_id: &ItemId) -> CoreResult<LineItem> {
        let removed = self.store.remove(item_id)?;
        self.bump();
        Ok(removed)
    }

    /// Empties the cart. The applied discount goes with the items.
    pub fn clear(&mut self) {
        self.store.clear();
        self.applied_discount = None;
        self.bump();
    }

    pub fn refresh_stock(&mut self, item_id: &ItemId, stock_ceiling: u32) -> CoreResult<Option<CartNotice>> {
        let notice = self.store.refresh_stock(item_id, stock_ceiling)?;
        self.bump();
        Ok(notice)
    }

    /// Writes the outcome of a mutation that was staged on an earlier copy of
    /// this cart.
    ///
    /// ## Behavior
    /// - `None`: the item is removed (no error if it is already gone)
    /// - `Some(line)` for an item still in the cart: the current stock ceiling
    ///   wins; a staged quantity above it is clamped with `StockExceeded`
    /// - `Some(line)` for an item no longer in the cart: re-inserted, subject
    ///   to the distinct-item limit
    pub fn commit_line(&mut self, item_id: &ItemId, staged: Option<LineItem>) -> CoreResult<Option<CartNotice>> {
        let Some(mut line) = staged else {
            self.store.take(item_id);
            self.bump();
            return Ok(None);
        };

        let mut notice = None;
        if let Some(current) = self.store.get(item_id) {
            let ceiling = current.stock_ceiling();
            let requested = line.quantity();
            line.set_stock_ceiling_unchecked(ceiling);
            if requested > ceiling {
                line.set_quantity_unchecked(ceiling);
                notice = Some(CartNotice::StockExceeded {
                    item_id: item_id.clone(),
                    requested: i64::from(requested),
                    stock_ceiling: ceiling,
                });
            }
        }

        self.store.put(line)?;
        self.bump();
        Ok(notice)
    }

    // -------------------------------------------------------------------------
    // Discount
    // -------------------------------------------------------------------------

    pub fn apply_discount(&mut self, discount: AppliedDiscount) {
        self.applied_discount = Some(discount);
        self.bump();
    }

    /// Removes the applied discount, returning it. Does not bump the version
    /// when there was nothing to remove.
    pub fn remove_discount(&mut self) -> Option<AppliedDiscount> {
        let removed = self.applied_discount.take();
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn pricing(&self) -> PriceBreakdown {
        pricing::price(&self.store, self.applied_discount.as_ref())
    }

    pub fn subtotal(&self) -> Money {
        self.pricing().subtotal
    }

    /// Read-only view handed to the UI layer.
    pub fn snapshot(&self) -> CartSnapshot {
        let totals = self.pricing();
        CartSnapshot {
            cart_id: self.id,
            version: self.version,
            items: self.store.as_slice().to_vec(),
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            total: totals.total,
            applied_discount: self.applied_discount.clone(),
            item_count: totals.item_count,
            total_quantity: totals.total_quantity,
        }
    }
}

impl Default for Cart {
    fn default() -> Self {
        Cart::new(crate::MAX_CART_ITEMS)
    }
}

// =============================================================================
// Cart Snapshot
// =============================================================================

/// Immutable view of the cart at one version, with derived totals.
///
/// This is what subscribers render. They never read totals from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartSnapshot {
    #[ts(as = "String")]
    pub cart_id: Uuid,
    pub version: u64,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub total: Money,
    pub applied_discount: Option<AppliedDiscount>,
    pub item_count: usize,
    pub total_quantity: u64,
}

impl CartSnapshot {
    pub fn item(&self, item_id: &ItemId) -> Option<&LineItem> {
        self.items.iter().find(|i| i.item_id() == item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
