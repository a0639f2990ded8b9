//! # Line Item Store
//!
//! Authoritative in-memory record of the cart contents for the session.
//!
//! ## Store Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Line Item Store Operations                           │
//! │                                                                         │
//! │  Operation               Effect                       Failure           │
//! │  ─────────               ──────                       ───────           │
//! │  add(item)          ──►  push, or += qty (clamped)    InvalidQuantity   │
//! │                                                       CartFull          │
//! │  set_quantity(id, n)──►  n <= 0: remove               ItemNotFound      │
//! │                          n > stock: clamp + notice                      │
//! │  remove(id)         ──►  delete entry                 ItemNotFound      │
//! │  refresh_stock(id,s)──►  new ceiling, clamp or drop   ItemNotFound      │
//! │  clear()            ──►  delete everything            -                 │
//! │                                                                         │
//! │  NOTE: a failed operation leaves the store exactly as it was.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are kept in a `Vec` so display order is insertion order; lookups
//! are linear, which is fine for a cart capped at [`crate::MAX_CART_ITEMS`].

use crate::error::{CoreError, CoreResult};
use crate::types::{CartNotice, ItemId, LineItem, NewLineItem};
use crate::validation;

/// Insertion-ordered collection of line items, unique by item id.
///
/// ## Invariants
/// - Items are unique by `item_id` (adding the same item increases quantity)
/// - `1 <= quantity <= stock_ceiling` for every entry
/// - At most `max_items` distinct entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemStore {
    items: Vec<LineItem>,
    max_items: usize,
}

impl LineItemStore {
    /// Creates an empty store holding at most `max_items` distinct items.
    pub fn new(max_items: usize) -> Self {
        LineItemStore {
            items: Vec::new(),
            max_items,
        }
    }

    /// Adds an item, or increases the quantity of an item already present.
    ///
    /// ## Behavior
    /// - `quantity < 1` or `quantity > stock_ceiling`: `InvalidQuantity`
    /// - Already present: quantity is incremented and clamped to the ceiling
    ///   carried by the request (the freshest stock figure); the frozen unit
    ///   price is kept
    /// - Not present: appended, subject to the distinct-item limit
    ///
    /// ## Returns
    /// `Some(StockExceeded)` when the increment had to be clamped.
    pub fn add(&mut self, request: NewLineItem) -> CoreResult<Option<CartNotice>> {
        if request.quantity < 1 || request.quantity > i64::from(request.stock_ceiling) {
            return Err(CoreError::InvalidQuantity {
                item_id: request.item_id,
                quantity: request.quantity,
                stock_ceiling: request.stock_ceiling,
            });
        }

        if let Some(item) = self.get_mut(&request.item_id) {
            let ceiling = request.stock_ceiling;
            let requested = i64::from(item.quantity()) + request.quantity;

            item.set_stock_ceiling_unchecked(ceiling);
            if requested > i64::from(ceiling) {
                item.set_quantity_unchecked(ceiling);
                return Ok(Some(CartNotice::StockExceeded {
                    item_id: request.item_id,
                    requested,
                    stock_ceiling: ceiling,
                }));
            }

            item.set_quantity_unchecked(requested as u32);
            return Ok(None);
        }

        validation::validate_cart_size(self.items.len(), self.max_items)?;
        self.items.push(LineItem::new(request)?);
        Ok(None)
    }

    /// Sets the quantity of an item.
    ///
    /// ## Behavior
    /// - Item absent: `ItemNotFound`
    /// - `quantity <= 0`: same as [`remove`](Self::remove)
    /// - `quantity > stock_ceiling`: clamped, `Some(StockExceeded)` returned
    pub fn set_quantity(&mut self, item_id: &ItemId, quantity: i64) -> CoreResult<Option<CartNotice>> {
        let Some(item) = self.get_mut(item_id) else {
            return Err(CoreError::ItemNotFound(item_id.clone()));
        };

        if quantity <= 0 {
            self.remove(item_id)?;
            return Ok(None);
        }

        let ceiling = item.stock_ceiling();
        if quantity > i64::from(ceiling) {
            item.set_quantity_unchecked(ceiling);
            return Ok(Some(CartNotice::StockExceeded {
                item_id: item_id.clone(),
                requested: quantity,
                stock_ceiling: ceiling,
            }));
        }

        item.set_quantity_unchecked(quantity as u32);
        Ok(None)
    }

    /// Removes an item, returning it.
    pub fn remove(&mut self, item_id: &ItemId) -> CoreResult<LineItem> {
        self.take(item_id)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.clone()))
    }

    /// Applies a fresh stock figure to an item already in the cart.
    ///
    /// A ceiling of zero removes the item; a ceiling below the current
    /// quantity clamps it. Both report `StockExceeded`.
    pub fn refresh_stock(&mut self, item_id: &ItemId, stock_ceiling: u32) -> CoreResult<Option<CartNotice>> {
        let Some(item) = self.get_mut(item_id) else {
            return Err(CoreError::ItemNotFound(item_id.clone()));
        };

        let quantity = item.quantity();
        if stock_ceiling == 0 {
            self.remove(item_id)?;
        } else {
            item.set_stock_ceiling_unchecked(stock_ceiling);
            if quantity <= stock_ceiling {
                return Ok(None);
            }
            item.set_quantity_unchecked(stock_ceiling);
        }

        Ok(Some(CartNotice::StockExceeded {
            item_id: item_id.clone(),
            requested: i64::from(quantity),
            stock_ceiling,
        }))
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Writes a whole line item back, replacing an entry with the same id in
    /// place or appending it.
    pub fn put(&mut self, item: LineItem) -> CoreResult<()> {
        if let Some(slot) = self.get_mut(item.item_id()) {
            *slot = item;
            return Ok(());
        }

        validation::validate_cart_size(self.items.len(), self.max_items)?;
        self.items.push(item);
        Ok(())
    }

    /// Removes an item if present.
    pub fn take(&mut self, item_id: &ItemId) -> Option<LineItem> {
        let index = self.items.iter().position(|i| i.item_id() == item_id)?;
        Some(self.items.remove(index))
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&LineItem> {
        self.items.iter().find(|i| i.item_id() == item_id)
    }

    fn get_mut(&mut self, item_id: &ItemId) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|i| i.item_id() == item_id)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, LineItem> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[LineItem] {
        &self.items
    }

    /// Number of distinct items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Sum of all quantities.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity())).sum()
    }
}

impl Default for LineItemStore {
    fn default() -> Self {
        LineItemStore::new(crate::MAX_CART_ITEMS)
    }
}

impl<'a> IntoIterator for &'a LineItemStore {
    type Item = &'a LineItem;
    type IntoIter = std::slice::Iter<'a, LineItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
