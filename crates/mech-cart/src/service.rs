//! # Cart Service
//!
//! The one sanctioned way to change the cart. Every operation validates
//! locally, talks to the backend, and commits only if its answer is still
//! the newest one.
//!
//! ## Mutation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   update_quantity("A", 4)                               │
//! │                                                                         │
//! │  1. lock ─► token = 7 ─► stage on a copy ─► unlock                      │
//! │        │                                                                │
//! │        └── InvalidQuantity / ItemNotFound / CartFull: return, no I/O   │
//! │                                                                         │
//! │  2. persist_quantity("A", 4).await       (no lock held)                 │
//! │        │                                                                │
//! │        └── NetworkFailure: return, cart untouched                      │
//! │                                                                         │
//! │  3. lock ─► committed["A"] > 7 or last clear > 7 ?                      │
//! │        │        yes ──► Superseded notice, current snapshot             │
//! │        │        no  ──► commit, version += 1, publish snapshot          │
//! │        └─► unlock                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Last Write Wins
//! Tokens are drawn in call order. A response is applied only if no call
//! with a larger token has already committed for the same item (or cleared
//! the cart). Discount verdicts are checked against the cart version
//! instead, since they depend on the whole subtotal.
//!
//! Adds are increments, not absolute quantities, so two adds of the same
//! item never race: the second waits for the first and stages on its result.

use mech_core::checkout::{check_payment, check_ready};
use mech_core::{
    CardDetails, Cart, CartNotice, CartSnapshot, CoreResult, ItemId, LineItem, NewLineItem,
    PaymentForm, PaymentMethod,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::config::{CartConfig, CartSettings};
use crate::discount::DiscountValidator;
use crate::error::{CartError, CartResult};
use crate::http::HttpCartBackend;
use crate::services::{CartSync, DiscountRules, StockSource};

/// Re-validation attempts at checkout before giving up on a busy cart.
const CHECKOUT_REVALIDATION_ATTEMPTS: u32 = 2;

// =============================================================================
// Results
// =============================================================================

/// Outcome of a cart operation: the cart as it now stands plus any
/// informational notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartUpdate {
    pub snapshot: CartSnapshot,
    pub notices: Vec<CartNotice>,
}

impl CartUpdate {
    fn new(snapshot: CartSnapshot) -> Self {
        CartUpdate {
            snapshot,
            notices: Vec::new(),
        }
    }

    fn superseded(snapshot: CartSnapshot, request: u64) -> Self {
        CartUpdate {
            snapshot,
            notices: vec![CartNotice::Superseded { request }],
        }
    }

    /// True when the operation's result was discarded in favour of a newer one.
    pub fn was_superseded(&self) -> bool {
        self.notices
            .iter()
            .any(|n| matches!(n, CartNotice::Superseded { .. }))
    }
}

/// Everything the payment page needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSummary {
    pub snapshot: CartSnapshot,
    pub method: PaymentMethod,
    pub form: PaymentForm,
    pub pay_label: String,
    pub notices: Vec<CartNotice>,
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MutationKey {
    Item(ItemId),
    Discount,
}

#[derive(Debug)]
struct ServiceState {
    cart: Cart,
    next_token: u64,
    /// Tokens of calls that have started and not yet finished.
    in_flight: BTreeSet<u64>,
    /// Token of the newest committed call per key. Only entries newer than
    /// the oldest in-flight call are kept; older ones can no longer make
    /// any call stale.
    committed: HashMap<MutationKey, u64>,
    /// Token of the newest committed `clear_cart`.
    last_clear: u64,
}

impl ServiceState {
    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.in_flight.insert(self.next_token);
        self.next_token
    }

    fn finish(&mut self, token: u64) {
        self.in_flight.remove(&token);
        let oldest = self.in_flight.first().copied();
        self.committed
            .retain(|_, committed| oldest.is_some_and(|t| *committed > t));
    }

    fn is_stale(&self, key: &MutationKey, token: u64) -> bool {
        self.last_clear > token || self.committed_after(key, token)
    }

    fn committed_after(&self, key: &MutationKey, token: u64) -> bool {
        self.committed.get(key).is_some_and(|&t| t > token)
    }
}

/// A drawn request token. Leaves the in-flight set when retired, or when
/// the call's future is dropped before finishing.
struct Ticket<'a> {
    state: &'a Mutex<ServiceState>,
    token: u64,
    retired: bool,
}

impl Ticket<'_> {
    /// Retires the token. Call after the staleness check, with the lock held.
    fn retire(mut self, state: &mut ServiceState) {
        state.finish(self.token);
        self.retired = true;
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.retired {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finish(self.token);
        }
    }
}

/// A stock ceiling that differs from the cart's.
#[derive(Debug)]
struct StockChange {
    item_id: ItemId,
    ceiling: u32,
    /// Quantity to persist when the new ceiling clamps or removes the line.
    persist: Option<u32>,
}

// =============================================================================
// Cart Service
// =============================================================================

pub struct CartService {
    state: Mutex<ServiceState>,
    /// Adds of the same item run one at a time, so each increment is staged
    /// on the line the previous add committed.
    add_turns: Mutex<HashMap<ItemId, Arc<AsyncMutex<()>>>>,
    sync: Arc<dyn CartSync>,
    discounts: DiscountValidator,
    stock: Arc<dyn StockSource>,
    settings: CartSettings,
    snapshots: watch::Sender<CartSnapshot>,
}

impl CartService {
    pub fn new(
        settings: CartSettings,
        sync: Arc<dyn CartSync>,
        rules: Arc<dyn DiscountRules>,
        stock: Arc<dyn StockSource>,
    ) -> Self {
        let cart = Cart::new(settings.max_items);
        let (snapshots, _) = watch::channel(cart.snapshot());
        info!(cart_id = %cart.id(), max_items = settings.max_items, "Cart service started");

        CartService {
            state: Mutex::new(ServiceState {
                cart,
                next_token: 0,
                in_flight: BTreeSet::new(),
                committed: HashMap::new(),
                last_clear: 0,
            }),
            add_turns: Mutex::new(HashMap::new()),
            sync,
            discounts: DiscountValidator::new(rules),
            stock,
            settings,
            snapshots,
        }
    }

    /// Builds a service wired to the shop backend described by `config`.
    pub fn with_http_backend(config: &CartConfig) -> CartResult<Self> {
        let backend = Arc::new(HttpCartBackend::from_config(config)?);
        Ok(Self::new(
            config.cart.clone(),
            backend.clone(),
            backend.clone(),
            backend,
        ))
    }

    /// Locks the state. Never held across an `.await`.
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticket(&self, state: &mut ServiceState) -> Ticket<'_> {
        Ticket {
            state: &self.state,
            token: state.issue_token(),
            retired: false,
        }
    }

    /// Hands a new snapshot to subscribers. Called with the lock held so
    /// subscribers see versions in order.
    fn publish(&self, snapshot: &CartSnapshot) {
        self.snapshots.send_replace(snapshot.clone());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn snapshot(&self) -> CartSnapshot {
        self.lock().cart.snapshot()
    }

    /// Receiver that always holds the latest committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.snapshots.subscribe()
    }

    // =========================================================================
    // Item Mutations
    // =========================================================================

    pub async fn add_item(&self, request: NewLineItem) -> CartResult<CartUpdate> {
        let item_id = request.item_id.clone();
        debug!(item_id = %item_id, quantity = request.quantity, "add_item");

        let turn = self.add_turn(&item_id);
        let result = {
            let _turn = turn.lock().await;
            self.mutate_item(item_id.clone(), "add_item", move |cart| cart.add_item(request))
                .await
        };
        self.release_add_turn(&item_id, turn);
        result
    }

    fn add_turn(&self, item_id: &ItemId) -> Arc<AsyncMutex<()>> {
        self.add_turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(item_id.clone())
            .or_default()
            .clone()
    }

    fn release_add_turn(&self, item_id: &ItemId, turn: Arc<AsyncMutex<()>>) {
        let mut turns = self.add_turns.lock().unwrap_or_else(PoisonError::into_inner);
        // Held by the map and this call only: no add is waiting.
        if Arc::strong_count(&turn) == 2 {
            turns.remove(item_id);
        }
    }

    /// Sets an item's quantity; `quantity <= 0` removes it.
    pub async fn update_quantity(&self, item_id: &ItemId, quantity: i64) -> CartResult<CartUpdate> {
        debug!(item_id = %item_id, quantity, "update_quantity");
        let id = item_id.clone();
        self.mutate_item(item_id.clone(), "update_quantity", move |cart| {
            cart.set_quantity(&id, quantity)
        })
        .await
    }

    pub async fn remove_item(&self, item_id: &ItemId) -> CartResult<CartUpdate> {
        debug!(item_id = %item_id, "remove_item");
        let id = item_id.clone();
        self.mutate_item(item_id.clone(), "remove_item", move |cart| {
            cart.remove_item(&id).map(|_| None)
        })
        .await
    }

    async fn mutate_item<F>(&self, item_id: ItemId, op: &'static str, stage: F) -> CartResult<CartUpdate>
    where
        F: FnOnce(&mut Cart) -> CoreResult<Option<CartNotice>> + Send,
    {
        let (ticket, staged, notices) = {
            let mut state = self.lock();
            let mut copy = state.cart.clone();
            let notice = stage(&mut copy)?;
            let staged = copy.items().get(&item_id).cloned();
            (self.ticket(&mut state), staged, notice.into_iter().collect::<Vec<_>>())
        };

        let quantity = staged.as_ref().map_or(0, LineItem::quantity);
        if let Err(err) = self.sync.persist_quantity(&item_id, quantity).await {
            warn!(op, item_id = %item_id, error = %err, "Cart sync failed; cart unchanged");
            return Err(err);
        }

        let update = {
            let mut state = self.lock();
            let token = ticket.token;
            let outcome = self.commit_item(&mut state, op, &item_id, token, staged, notices);
            ticket.retire(&mut state);
            outcome?
        };

        self.after_item_commit(update).await
    }

    fn commit_item(
        &self,
        state: &mut ServiceState,
        op: &'static str,
        item_id: &ItemId,
        token: u64,
        staged: Option<LineItem>,
        mut notices: Vec<CartNotice>,
    ) -> CartResult<CartUpdate> {
        let key = MutationKey::Item(item_id.clone());
        if state.is_stale(&key, token) {
            warn!(op, item_id = %item_id, token, "Discarding stale cart response");
            return Ok(CartUpdate::superseded(state.cart.snapshot(), token));
        }

        if let Some(notice) = state.cart.commit_line(item_id, staged)? {
            notices.push(notice);
        }
        state.committed.insert(key, token);

        let snapshot = state.cart.snapshot();
        self.publish(&snapshot);
        info!(
            op,
            item_id = %item_id,
            quantity = state.cart.quantity_of(item_id),
            version = snapshot.version,
            "Cart updated"
        );
        Ok(CartUpdate { snapshot, notices })
    }

    /// Eager discount re-validation, when configured.
    async fn after_item_commit(&self, mut update: CartUpdate) -> CartResult<CartUpdate> {
        if !self.settings.eager_discount_revalidation || update.snapshot.applied_discount.is_none() {
            return Ok(update);
        }

        match self.revalidate_discount().await {
            Ok(reval) if !reval.was_superseded() => {
                update.snapshot = reval.snapshot;
                update.notices.extend(reval.notices);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "Discount re-validation failed; keeping applied discount");
            }
        }
        Ok(update)
    }

    /// Empties the cart on the server, then locally. The discount goes too.
    pub async fn clear_cart(&self) -> CartResult<CartUpdate> {
        let ticket = {
            let mut state = self.lock();
            self.ticket(&mut state)
        };
        debug!(token = ticket.token, "clear_cart");

        if let Err(err) = self.sync.clear().await {
            warn!(error = %err, "Cart clear failed; cart unchanged");
            return Err(err);
        }

        let mut state = self.lock();
        let outcome = self.commit_clear(&mut state, ticket.token);
        ticket.retire(&mut state);
        outcome
    }

    fn commit_clear(&self, state: &mut ServiceState, token: u64) -> CartResult<CartUpdate> {
        if state.last_clear > token {
            warn!(token, "Discarding stale clear response");
            return Ok(CartUpdate::superseded(state.cart.snapshot(), token));
        }

        // Item changes issued after this clear already committed: keep them.
        let survivors: Vec<LineItem> = state
            .cart
            .items()
            .iter()
            .filter(|item| state.committed_after(&MutationKey::Item(item.item_id().clone()), token))
            .cloned()
            .collect();
        let discount = state
            .committed_after(&MutationKey::Discount, token)
            .then(|| state.cart.applied_discount().cloned())
            .flatten();

        state.cart.clear();
        for line in survivors {
            let id = line.item_id().clone();
            state.cart.commit_line(&id, Some(line))?;
        }
        if let Some(discount) = discount {
            state.cart.apply_discount(discount);
        }
        state.last_clear = token;

        let snapshot = state.cart.snapshot();
        self.publish(&snapshot);
        info!(version = snapshot.version, "Cart cleared");
        Ok(CartUpdate::new(snapshot))
    }

    /// Pulls current stock ceilings and applies them. An empty `item_ids`
    /// refreshes every item in the cart.
    ///
    /// Lines the new ceilings clamp or remove are persisted like any other
    /// quantity change; if that fails the cart is left as it was.
    pub async fn refresh_stock(&self, item_ids: &[ItemId]) -> CartResult<CartUpdate> {
        let ids: Vec<ItemId> = if item_ids.is_empty() {
            self.lock()
                .cart
                .items()
                .iter()
                .map(|i| i.item_id().clone())
                .collect()
        } else {
            item_ids.to_vec()
        };
        debug!(count = ids.len(), "refresh_stock");

        let ceilings = self.stock.stock_ceilings(&ids).await?;

        let (ticket, changes) = {
            let mut state = self.lock();
            let changes: Vec<StockChange> = ceilings
                .into_iter()
                .filter_map(|(item_id, ceiling)| {
                    let item = state.cart.items().get(&item_id)?;
                    if item.stock_ceiling() == ceiling {
                        return None;
                    }
                    let kept = item.quantity().min(ceiling);
                    Some(StockChange {
                        persist: (kept != item.quantity()).then_some(kept),
                        item_id,
                        ceiling,
                    })
                })
                .collect();
            if changes.is_empty() {
                return Ok(CartUpdate::new(state.cart.snapshot()));
            }
            (self.ticket(&mut state), changes)
        };

        for change in &changes {
            let Some(quantity) = change.persist else {
                continue;
            };
            if let Err(err) = self.sync.persist_quantity(&change.item_id, quantity).await {
                warn!(item_id = %change.item_id, error = %err, "Stock clamp sync failed; cart unchanged");
                return Err(err);
            }
        }

        let mut state = self.lock();
        let outcome = Self::commit_stock(&mut state, ticket.token, &changes);
        ticket.retire(&mut state);
        let notices = outcome?;

        let snapshot = state.cart.snapshot();
        if !notices.is_empty() {
            info!(clamped = notices.len(), "Stock refresh changed cart quantities");
        }
        self.publish(&snapshot);
        Ok(CartUpdate { snapshot, notices })
    }

    fn commit_stock(
        state: &mut ServiceState,
        token: u64,
        changes: &[StockChange],
    ) -> CoreResult<Vec<CartNotice>> {
        let mut notices = Vec::new();
        for change in changes {
            let key = MutationKey::Item(change.item_id.clone());
            if state.is_stale(&key, token) || state.cart.items().get(&change.item_id).is_none() {
                debug!(item_id = %change.item_id, token, "Stock change superseded by a newer mutation");
                continue;
            }
            if let Some(notice) = state.cart.refresh_stock(&change.item_id, change.ceiling)? {
                notices.push(notice);
            }
            if change.persist.is_some() {
                state.committed.insert(key, token);
            }
        }
        Ok(notices)
    }

    // =========================================================================
    // Discounts
    // =========================================================================

    /// Validates `code` against the current subtotal and applies it.
    ///
    /// Rejection and unavailability both leave the cart as it was.
    pub async fn apply_discount(&self, code: &str) -> CartResult<CartUpdate> {
        let code = DiscountValidator::normalize(code)?;
        let (ticket, version, subtotal) = {
            let mut state = self.lock();
            (self.ticket(&mut state), state.cart.version(), state.cart.subtotal())
        };
        debug!(%code, subtotal = subtotal.cents(), "apply_discount");

        let applied = match self.discounts.validate(&code, subtotal).await {
            Ok(applied) => applied,
            Err(err) => {
                warn!(%code, error = %err, "Discount not applied");
                return Err(err);
            }
        };

        let mut state = self.lock();
        let token = ticket.token;
        ticket.retire(&mut state);
        if state.cart.version() != version {
            warn!(%code, token, "Cart changed during discount validation; verdict discarded");
            return Ok(CartUpdate::superseded(state.cart.snapshot(), token));
        }

        state.cart.apply_discount(applied);
        state.committed.insert(MutationKey::Discount, token);

        let snapshot = state.cart.snapshot();
        self.publish(&snapshot);
        info!(%code, discount = snapshot.discount_amount.cents(), "Discount applied");
        Ok(CartUpdate::new(snapshot))
    }

    pub fn remove_discount(&self) -> CartUpdate {
        let mut state = self.lock();
        let ticket = self.ticket(&mut state);
        if let Some(removed) = state.cart.remove_discount() {
            state.committed.insert(MutationKey::Discount, ticket.token);
            info!(code = %removed.code, "Discount removed");
        }
        ticket.retire(&mut state);

        let snapshot = state.cart.snapshot();
        self.publish(&snapshot);
        CartUpdate::new(snapshot)
    }

    /// Checks the applied discount against the current subtotal.
    ///
    /// ## Outcomes
    /// - still valid: amount refreshed
    /// - rejected: discount removed, `DiscountCleared` notice
    /// - unavailable: error returned, discount kept
    pub async fn revalidate_discount(&self) -> CartResult<CartUpdate> {
        let (ticket, version, applied, subtotal) = {
            let mut state = self.lock();
            let Some(applied) = state.cart.applied_discount().cloned() else {
                return Ok(CartUpdate::new(state.cart.snapshot()));
            };
            (
                self.ticket(&mut state),
                state.cart.version(),
                applied,
                state.cart.subtotal(),
            )
        };
        debug!(code = %applied.code, subtotal = subtotal.cents(), "revalidate_discount");

        let outcome = self.discounts.validate(&applied.code, subtotal).await;

        let mut state = self.lock();
        let token = ticket.token;
        ticket.retire(&mut state);
        if state.cart.version() != version {
            debug!(token, "Cart changed during re-validation; verdict discarded");
            return Ok(CartUpdate::superseded(state.cart.snapshot(), token));
        }

        let mut notices = Vec::new();
        match outcome {
            Ok(fresh) => {
                if state.cart.applied_discount() != Some(&fresh) {
                    state.cart.apply_discount(fresh);
                }
            }
            Err(CartError::DiscountRejected { code, reason }) => {
                warn!(%code, %reason, "Applied discount no longer valid; removed");
                state.cart.remove_discount();
                notices.push(CartNotice::DiscountCleared { code, reason });
            }
            Err(err) => {
                warn!(code = %applied.code, error = %err, "Discount re-validation unavailable");
                return Err(err);
            }
        }
        state.committed.insert(MutationKey::Discount, token);

        let snapshot = state.cart.snapshot();
        self.publish(&snapshot);
        Ok(CartUpdate { snapshot, notices })
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Checks the cart and the payment details, re-validates any applied
    /// discount, and returns what the payment page shows.
    ///
    /// `card` is required for [`PaymentMethod::Card`] and ignored otherwise.
    /// If the cart keeps changing while the discount is being re-validated,
    /// the call fails with `ValidationUnavailable` and can be retried.
    pub async fn prepare_checkout(
        &self,
        method: PaymentMethod,
        card: Option<&CardDetails>,
    ) -> CartResult<CheckoutSummary> {
        debug!(%method, "prepare_checkout");
        let has_discount = {
            let state = self.lock();
            check_ready(&state.cart)?;
            state.cart.applied_discount().is_some()
        };
        check_payment(method, card)?;

        let mut notices = Vec::new();
        if has_discount {
            let mut settled = false;
            for attempt in 1..=CHECKOUT_REVALIDATION_ATTEMPTS {
                let update = self.revalidate_discount().await?;
                if !update.was_superseded() {
                    notices = update.notices;
                    settled = true;
                    break;
                }
                debug!(attempt, "Cart changed during checkout re-validation; retrying");
            }
            if !settled {
                warn!("Checkout discount re-validation kept being superseded");
                return Err(CartError::ValidationUnavailable(
                    "cart changed while the discount was being re-validated".to_string(),
                ));
            }
        }

        let snapshot = {
            let state = self.lock();
            check_ready(&state.cart)?;
            state.cart.snapshot()
        };

        info!(%method, total = snapshot.total.cents(), "Checkout ready");
        Ok(CheckoutSummary {
            pay_label: method.pay_label(snapshot.total),
            form: method.form(),
            method,
            snapshot,
            notices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{DiscountKind, DiscountRule, InMemoryDiscountRules};
    use crate::services::DiscountVerdict;
    use async_trait::async_trait;
    use mech_core::{CheckoutError, CoreError, Money, UnitPrice, ValidationError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    /// Records calls; the first call after `arm` waits for the gate.
    #[derive(Default)]
    struct FakeSync {
        persisted: Mutex<Vec<(ItemId, u32)>>,
        clears: AtomicUsize,
        failing: AtomicBool,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FakeSync {
        fn arm(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock().unwrap() = Some(rx);
            tx
        }

        fn persisted(&self) -> Vec<(ItemId, u32)> {
            self.persisted.lock().unwrap().clone()
        }

        async fn pass_gate(&self) -> CartResult<()> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(CartError::NetworkFailure("connection reset".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CartSync for FakeSync {
        async fn persist_quantity(&self, item_id: &ItemId, quantity: u32) -> CartResult<()> {
            self.pass_gate().await?;
            self.persisted.lock().unwrap().push((item_id.clone(), quantity));
            Ok(())
        }

        async fn clear(&self) -> CartResult<()> {
            self.pass_gate().await?;
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Discount rules that can be switched off; the first check after `arm`
    /// waits for the gate.
    struct FlakyRules {
        inner: InMemoryDiscountRules,
        available: AtomicBool,
        calls: AtomicUsize,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FlakyRules {
        fn arm(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock().unwrap() = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl DiscountRules for FlakyRules {
        async fn check(&self, code: &str, subtotal: Money) -> CartResult<DiscountVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            if !self.available.load(Ordering::SeqCst) {
                return Err(CartError::ValidationUnavailable("connection refused".into()));
            }
            self.inner.check(code, subtotal).await
        }
    }

    #[derive(Default)]
    struct FakeStock {
        ceilings: Mutex<HashMap<ItemId, u32>>,
    }

    #[async_trait]
    impl StockSource for FakeStock {
        async fn stock_ceilings(&self, item_ids: &[ItemId]) -> CartResult<Vec<(ItemId, u32)>> {
            let ceilings = self.ceilings.lock().unwrap();
            Ok(item_ids
                .iter()
                .filter_map(|id| ceilings.get(id).map(|&c| (id.clone(), c)))
                .collect())
        }
    }

    struct Harness {
        service: CartService,
        sync: Arc<FakeSync>,
        rules: Arc<FlakyRules>,
        stock: Arc<FakeStock>,
    }

    fn harness_with(settings: CartSettings) -> Harness {
        let sync = Arc::new(FakeSync::default());
        let rules = Arc::new(FlakyRules {
            inner: InMemoryDiscountRules::new([
                DiscountRule::new("SAVE10", DiscountKind::Percentage(1000)),
                DiscountRule::new("BIGSPEND", DiscountKind::Fixed(Money::from_cents(1500)))
                    .min_order(Money::from_cents(10_000)),
            ]),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        });
        let stock = Arc::new(FakeStock::default());
        let service = CartService::new(settings, sync.clone(), rules.clone(), stock.clone());
        Harness {
            service,
            sync,
            rules,
            stock,
        }
    }

    fn harness() -> Harness {
        harness_with(CartSettings::default())
    }

    fn item(id: &str, cents: i64, quantity: i64, stock: u32) -> NewLineItem {
        NewLineItem::new(id, UnitPrice::from_cents(cents), quantity, stock)
    }

    fn id(raw: &str) -> ItemId {
        ItemId::from(raw)
    }

    fn card() -> CardDetails {
        CardDetails {
            number: "4242 4242 4242 4242".to_string(),
            expiry: "12/27".to_string(),
            cvv: "123".to_string(),
            holder_name: "Ada Lovelace".to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Item mutations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_scenario_subtotal_discount_total() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        let update = h.service.add_item(item("B", 1000, 1, 1)).await.unwrap();
        assert_eq!(update.snapshot.subtotal, Money::from_cents(6000));

        let update = h.service.apply_discount("save10").await.unwrap();
        assert_eq!(update.snapshot.discount_amount, Money::from_cents(600));
        assert_eq!(update.snapshot.total, Money::from_cents(5400));
        assert_eq!(
            update.snapshot.applied_discount.as_ref().map(|d| d.code.as_str()),
            Some("SAVE10")
        );
    }

    #[tokio::test]
    async fn test_update_above_stock_clamps_with_notice() {
        let h = harness();
        h.service.add_item(item("A", 2500, 1, 5)).await.unwrap();

        let update = h.service.update_quantity(&id("A"), 10).await.unwrap();
        assert_eq!(update.snapshot.item(&id("A")).unwrap().quantity(), 5);
        assert_eq!(
            update.notices,
            vec![CartNotice::StockExceeded {
                item_id: id("A"),
                requested: 10,
                stock_ceiling: 5,
            }]
        );
        assert_eq!(h.sync.persisted().last(), Some(&(id("A"), 5)));
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_and_persists_zero() {
        let h = harness();
        h.service.add_item(item("A", 2500, 1, 5)).await.unwrap();

        let update = h.service.update_quantity(&id("A"), 0).await.unwrap();
        assert!(update.snapshot.is_empty());
        assert_eq!(h.sync.persisted().last(), Some(&(id("A"), 0)));
    }

    #[tokio::test]
    async fn test_remove_missing_item_makes_no_request() {
        let h = harness();
        h.service.add_item(item("A", 2500, 1, 5)).await.unwrap();
        let before = h.service.snapshot();
        let calls = h.sync.persisted().len();

        let err = h.service.remove_item(&id("missing")).await.unwrap_err();
        assert!(matches!(err, CartError::Core(CoreError::ItemNotFound(_))));
        assert_eq!(h.service.snapshot(), before);
        assert_eq!(h.sync.persisted().len(), calls);
    }

    #[tokio::test]
    async fn test_invalid_add_rejected_locally() {
        let h = harness();
        let err = h.service.add_item(item("A", 2500, 6, 5)).await.unwrap_err();
        assert!(err.is_local());
        assert!(h.sync.persisted().is_empty());
    }

    #[tokio::test]
    async fn test_cart_full() {
        let h = harness_with(CartSettings {
            max_items: 1,
            ..CartSettings::default()
        });
        h.service.add_item(item("A", 100, 1, 5)).await.unwrap();
        let err = h.service.add_item(item("B", 100, 1, 5)).await.unwrap_err();
        assert!(matches!(err, CartError::Core(CoreError::CartFull { max: 1 })));
    }

    #[tokio::test]
    async fn test_network_failure_leaves_cart_unchanged() {
        let h = harness();
        h.service.add_item(item("A", 2500, 1, 5)).await.unwrap();
        let before = h.service.snapshot();

        h.sync.failing.store(true, Ordering::SeqCst);
        let err = h.service.update_quantity(&id("A"), 3).await.unwrap_err();
        assert!(matches!(err, CartError::NetworkFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(h.service.snapshot(), before);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let h = harness();
        h.service.add_item(item("A", 2500, 1, 9)).await.unwrap();
        let a = id("A");

        let release = h.sync.arm();
        let first = h.service.update_quantity(&a, 2);
        let second = h.service.update_quantity(&a, 4);
        let releaser = async {
            while h.service.snapshot().item(&a).map(LineItem::quantity) != Some(4) {
                tokio::task::yield_now().await;
            }
            let _ = release.send(());
        };

        let (first, second, ()) = tokio::join!(first, second, releaser);
        let first = first.unwrap();
        let second = second.unwrap();

        assert!(!second.was_superseded());
        assert!(first.was_superseded());
        assert_eq!(first.snapshot.item(&a).unwrap().quantity(), 4);
        assert_eq!(h.service.snapshot().item(&a).unwrap().quantity(), 4);
    }

    #[tokio::test]
    async fn test_other_items_do_not_supersede() {
        let h = harness();
        h.service.add_item(item("A", 100, 1, 9)).await.unwrap();
        h.service.add_item(item("B", 100, 1, 9)).await.unwrap();
        let (a, b) = (id("A"), id("B"));

        let release = h.sync.arm();
        let slow = h.service.update_quantity(&a, 3);
        let fast = h.service.update_quantity(&b, 5);
        let releaser = async {
            while h.service.snapshot().item(&b).map(LineItem::quantity) != Some(5) {
                tokio::task::yield_now().await;
            }
            let _ = release.send(());
        };

        let (slow, fast, ()) = tokio::join!(slow, fast, releaser);
        assert!(!slow.unwrap().was_superseded());
        assert!(!fast.unwrap().was_superseded());

        let snapshot = h.service.snapshot();
        assert_eq!(snapshot.item(&a).unwrap().quantity(), 3);
        assert_eq!(snapshot.item(&b).unwrap().quantity(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_adds_of_same_item_both_count() {
        let h = harness();
        h.service.add_item(item("A", 100, 1, 9)).await.unwrap();
        let a = id("A");

        let release = h.sync.arm();
        let first = h.service.add_item(item("A", 100, 1, 9));
        let second = h.service.add_item(item("A", 100, 1, 9));
        let releaser = async {
            tokio::task::yield_now().await;
            let _ = release.send(());
        };

        let (first, second, ()) = tokio::join!(first, second, releaser);
        assert!(!first.unwrap().was_superseded());
        assert!(!second.unwrap().was_superseded());

        assert_eq!(h.service.snapshot().item(&a).unwrap().quantity(), 3);
        assert_eq!(
            h.sync.persisted(),
            vec![(a.clone(), 1), (a.clone(), 2), (a.clone(), 3)]
        );
        assert!(h.service.add_turns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finished_calls_leave_no_token_bookkeeping() {
        let h = harness();
        let a = id("A");
        h.service.add_item(item("A", 2500, 2, 9)).await.unwrap();
        h.service.update_quantity(&a, 3).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();
        h.service.remove_discount();

        h.sync.failing.store(true, Ordering::SeqCst);
        assert!(h.service.update_quantity(&a, 1).await.is_err());
        h.sync.failing.store(false, Ordering::SeqCst);

        // A call dropped while waiting on the network retires its token too.
        let _release = h.sync.arm();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), h.service.update_quantity(&a, 5)).await;
        assert!(abandoned.is_err());

        let state = h.service.lock();
        assert!(state.in_flight.is_empty());
        assert!(state.committed.is_empty());
        assert_eq!(state.cart.quantity_of(&a), 3);
    }

    #[tokio::test]
    async fn test_clear_supersedes_older_item_update() {
        let h = harness();
        h.service.add_item(item("A", 100, 1, 9)).await.unwrap();

        let a = id("A");

        let release = h.sync.arm();
        let update = h.service.update_quantity(&a, 3);
        let clear = h.service.clear_cart();
        let releaser = async {
            while !h.service.snapshot().is_empty() {
                tokio::task::yield_now().await;
            }
            let _ = release.send(());
        };

        let (update, clear, ()) = tokio::join!(update, clear, releaser);
        assert!(update.unwrap().was_superseded());
        assert!(clear.unwrap().snapshot.is_empty());
        assert!(h.service.snapshot().is_empty());
        assert_eq!(h.sync.clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_discount() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();

        let update = h.service.clear_cart().await.unwrap();
        assert!(update.snapshot.is_empty());
        assert!(update.snapshot.applied_discount.is_none());
        assert!(update.snapshot.total.is_zero());
    }

    #[tokio::test]
    async fn test_refresh_stock_clamps_and_removes() {
        let h = harness();
        h.service.add_item(item("A", 100, 3, 5)).await.unwrap();
        h.service.add_item(item("B", 100, 1, 5)).await.unwrap();
        h.service.add_item(item("C", 100, 1, 5)).await.unwrap();
        {
            let mut ceilings = h.stock.ceilings.lock().unwrap();
            ceilings.insert(id("A"), 2);
            ceilings.insert(id("B"), 0);
            ceilings.insert(id("C"), 5);
        }

        let calls = h.sync.persisted().len();

        let update = h.service.refresh_stock(&[]).await.unwrap();
        assert_eq!(update.notices.len(), 2);
        assert_eq!(update.snapshot.item(&id("A")).unwrap().quantity(), 2);
        assert!(update.snapshot.item(&id("B")).is_none());
        assert_eq!(update.snapshot.item(&id("C")).unwrap().quantity(), 1);

        // Clamped and removed lines reach the server; untouched ones don't.
        assert_eq!(
            h.sync.persisted()[calls..].to_vec(),
            vec![(id("A"), 2), (id("B"), 0)]
        );
    }

    #[tokio::test]
    async fn test_refresh_stock_sync_failure_leaves_cart_unchanged() {
        let h = harness();
        h.service.add_item(item("A", 100, 3, 5)).await.unwrap();
        h.stock.ceilings.lock().unwrap().insert(id("A"), 1);
        let before = h.service.snapshot();

        h.sync.failing.store(true, Ordering::SeqCst);
        let err = h.service.refresh_stock(&[id("A")]).await.unwrap_err();
        assert!(matches!(err, CartError::NetworkFailure(_)));
        assert_eq!(h.service.snapshot(), before);
    }

    #[tokio::test]
    async fn test_refresh_stock_ceiling_only_change_makes_no_request() {
        let h = harness();
        h.service.add_item(item("A", 100, 1, 5)).await.unwrap();
        h.stock.ceilings.lock().unwrap().insert(id("A"), 8);
        let calls = h.sync.persisted().len();

        let update = h.service.refresh_stock(&[]).await.unwrap();
        assert!(update.notices.is_empty());
        assert_eq!(update.snapshot.item(&id("A")).unwrap().stock_ceiling(), 8);
        assert_eq!(h.sync.persisted().len(), calls);
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_snapshots() {
        let h = harness();
        let mut rx = h.service.subscribe();
        assert_eq!(rx.borrow().version, 0);

        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.version, 1);
        assert_eq!(seen.subtotal, Money::from_cents(5000));
    }

    // -------------------------------------------------------------------------
    // Discounts
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unavailable_validator_keeps_discount() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();
        let before = h.service.snapshot();

        h.rules.available.store(false, Ordering::SeqCst);
        let err = h.service.apply_discount("BIGSPEND").await.unwrap_err();
        assert!(matches!(err, CartError::ValidationUnavailable(_)));
        assert_eq!(h.service.snapshot(), before);

        let err = h.service.revalidate_discount().await.unwrap_err();
        assert!(matches!(err, CartError::ValidationUnavailable(_)));
        assert_eq!(
            h.service.snapshot().applied_discount.map(|d| d.code),
            Some("SAVE10".to_string())
        );
    }

    #[tokio::test]
    async fn test_rejected_code_leaves_cart_unchanged() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        let before = h.service.snapshot();

        let err = h.service.apply_discount("BIGSPEND").await.unwrap_err();
        assert!(matches!(err, CartError::DiscountRejected { .. }));
        assert_eq!(h.service.snapshot(), before);
    }

    #[tokio::test]
    async fn test_empty_code_is_local_error() {
        let h = harness();
        let err = h.service.apply_discount("  ").await.unwrap_err();
        assert!(matches!(
            err,
            CartError::Core(CoreError::InvalidDiscountCode { .. })
        ));
    }

    #[tokio::test]
    async fn test_eager_revalidation_clears_discount() {
        let h = harness_with(CartSettings {
            eager_discount_revalidation: true,
            ..CartSettings::default()
        });
        h.service.add_item(item("A", 6000, 2, 5)).await.unwrap();
        h.service.apply_discount("BIGSPEND").await.unwrap();

        let update = h.service.update_quantity(&id("A"), 1).await.unwrap();
        assert!(update.snapshot.applied_discount.is_none());
        assert!(update
            .notices
            .iter()
            .any(|n| matches!(n, CartNotice::DiscountCleared { code, .. } if code == "BIGSPEND")));
    }

    #[tokio::test]
    async fn test_lazy_revalidation_keeps_discount_until_checkout() {
        let h = harness();
        h.service.add_item(item("A", 6000, 2, 5)).await.unwrap();
        h.service.apply_discount("BIGSPEND").await.unwrap();

        let update = h.service.update_quantity(&id("A"), 1).await.unwrap();
        assert!(update.snapshot.applied_discount.is_some());

        let summary = h
            .service
            .prepare_checkout(PaymentMethod::Card, Some(&card()))
            .await
            .unwrap();
        assert!(summary.snapshot.applied_discount.is_none());
        assert_eq!(summary.pay_label, "Pay $60.00");
        assert!(matches!(
            summary.notices.as_slice(),
            [CartNotice::DiscountCleared { .. }]
        ));
    }

    #[tokio::test]
    async fn test_remove_discount() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();

        let update = h.service.remove_discount();
        assert!(update.snapshot.applied_discount.is_none());
        assert_eq!(update.snapshot.total, Money::from_cents(5000));
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let h = harness();
        let err = h
            .service
            .prepare_checkout(PaymentMethod::Card, Some(&card()))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::Checkout(CheckoutError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_checkout_requires_valid_card_details() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();
        let checks = h.rules.calls.load(Ordering::SeqCst);

        let err = h
            .service
            .prepare_checkout(PaymentMethod::Card, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartError::Checkout(CheckoutError::PaymentDetails(ValidationError::Required { .. }))
        ));

        let expired_format = CardDetails {
            expiry: "1227".to_string(),
            ..card()
        };
        let err = h
            .service
            .prepare_checkout(PaymentMethod::Card, Some(&expired_format))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::Checkout(CheckoutError::PaymentDetails(_))));
        assert!(err.is_local());

        // Rejected before any discount request.
        assert_eq!(h.rules.calls.load(Ordering::SeqCst), checks);
    }

    #[tokio::test]
    async fn test_checkout_revalidates_again_when_cart_changes() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 9)).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();
        let checks = h.rules.calls.load(Ordering::SeqCst);
        let a = id("A");
        let card = card();

        let release = h.rules.arm();
        let checkout = h.service.prepare_checkout(PaymentMethod::Card, Some(&card));
        let change = async {
            h.service.update_quantity(&a, 4).await.unwrap();
            let _ = release.send(());
        };

        let (summary, ()) = tokio::join!(checkout, change);
        let summary = summary.unwrap();
        assert_eq!(summary.snapshot.subtotal, Money::from_cents(10_000));
        assert_eq!(summary.snapshot.discount_amount, Money::from_cents(1000));
        assert_eq!(summary.pay_label, "Pay $90.00");
        assert!(summary.notices.is_empty());
        assert_eq!(h.rules.calls.load(Ordering::SeqCst) - checks, 2);
    }

    #[tokio::test]
    async fn test_checkout_summary() {
        let h = harness();
        h.service.add_item(item("A", 2500, 2, 5)).await.unwrap();
        h.service.add_item(item("B", 1000, 1, 1)).await.unwrap();
        h.service.apply_discount("SAVE10").await.unwrap();

        let summary = h
            .service
            .prepare_checkout(PaymentMethod::Upi, None)
            .await
            .unwrap();
        assert_eq!(summary.snapshot.total, Money::from_cents(5400));
        assert_eq!(summary.form, PaymentForm::Upi);
        assert_eq!(summary.pay_label, "Pay with UPI");
        assert!(summary.notices.is_empty());
    }
}
