//! The central limit order book: two price-indexed sides, an order index,
//! and a cached best price per side.
//!
//! Cancels are O(1): the record is only marked inactive, and the dead FIFO
//! slot is reaped lazily when it reaches the head of its level during
//! matching or best-price repair. Best-price lookup is amortised O(1) in the
//! steady state; the repair pass bounds its work by the number of cancels it
//! absorbs.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

use log::debug;
use rustc_hash::FxHashMap;

use crate::clock::now_nanos;
use crate::event::{Event, Order, OrderId, Price, Qty, Side, Trade};

/// FIFO of resting order ids at one price.
type Level = VecDeque<OrderId>;

/// Price-time-priority limit order book.
pub struct Book {
    /// Ask levels, best = lowest key.
    sells: BTreeMap<Price, Level>,
    /// Bid levels, best = highest key.
    buys: BTreeMap<Price, Level>,
    /// Order id -> live record. Holds cancelled records until they are
    /// reaped at the head of their level.
    orders: FxHashMap<OrderId, Order>,
    /// Cached best sell price; `None` means the side is empty.
    best_sell: Option<Price>,
    /// Cached best buy price; `None` means the side is empty.
    best_buy: Option<Price>,
}

impl Book {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self {
            sells: BTreeMap::new(),
            buys: BTreeMap::new(),
            orders: FxHashMap::default(),
            best_sell: None,
            best_buy: None,
        }
    }

    /// Creates an empty book with the order index pre-sized for `orders`
    /// resting orders.
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            orders: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
            ..Self::new()
        }
    }

    // ========================================================================
    // Event handlers
    // ========================================================================

    /// Handles a new order: match against the opposite side, then rest any
    /// residual quantity.
    ///
    /// Returns `false` (no state change) for a non-positive price or
    /// quantity, or for an id that is still present in the index.
    pub fn on_new(&mut self, event: &Event, trades_out: &mut Vec<Trade>) -> bool {
        if event.price == 0 || event.qty <= 0 {
            return false;
        }
        if self.orders.contains_key(&event.order_id) {
            return false;
        }

        let mut open = event.qty;
        loop {
            // Repair runs before the remaining-quantity check so the level
            // drained by the last fill is reaped before we return.
            let best = match event.side {
                Side::Buy => self.fix_best_sell(),
                Side::Sell => self.fix_best_buy(),
            };
            let Some(best) = best else { break };
            if open == 0 || !crosses(event.side, event.price, best) {
                break;
            }
            open = self.fill_head(event, best, open, trades_out);
        }

        if open > 0 {
            self.rest(event, open);
        }
        true
    }

    /// Cancels a resting order. O(1): marks the record inactive; the FIFO
    /// slot is reaped lazily. Returns `false` if the id is unknown.
    pub fn on_cancel(&mut self, order_id: OrderId) -> bool {
        match self.orders.get_mut(&order_id) {
            Some(order) => {
                order.active = false;
                true
            }
            None => false,
        }
    }

    /// Cancel-then-new under the same id. The re-insert goes to the tail of
    /// its level, so a replace always loses time priority.
    ///
    /// Returns `false` without touching the book when the id is unknown. The
    /// old record and its queue slot are dropped eagerly so the id can
    /// re-enter; the new terms then flow through [`Book::on_new`].
    pub fn on_replace(&mut self, event: &Event, trades_out: &mut Vec<Trade>) -> bool {
        let Some(old) = self.orders.remove(&event.order_id) else {
            return false;
        };

        let mut emptied = false;
        if let Some(queue) = self.level_mut(old.side, old.price) {
            if let Some(pos) = queue.iter().position(|&id| id == old.order_id) {
                queue.remove(pos);
            }
            emptied = queue.is_empty();
        }
        if emptied {
            // Keep the cached best pointing at a live level.
            match old.side {
                Side::Buy => self.fix_best_buy(),
                Side::Sell => self.fix_best_sell(),
            };
        }

        self.on_new(event, trades_out)
    }

    // ========================================================================
    // Best-price repair
    // ========================================================================

    /// Returns the lowest sell price with a live head order, reaping dead
    /// heads and empty levels from the cached best upward. Clears the cache
    /// and returns `None` when the side runs out.
    pub fn fix_best_sell(&mut self) -> Option<Price> {
        let mut price = self.best_sell?;
        loop {
            if let Some(queue) = self.sells.get_mut(&price) {
                loop {
                    let Some(&id) = queue.front() else { break };
                    match self.orders.get(&id) {
                        Some(o) if o.active && o.qty_open > 0 => {
                            self.best_sell = Some(price);
                            return Some(price);
                        }
                        _ => {
                            queue.pop_front();
                            self.orders.remove(&id);
                        }
                    }
                }
            }
            // Level drained: erase it and advance to the next higher price.
            self.sells.remove(&price);
            match self
                .sells
                .range((Bound::Excluded(price), Bound::Unbounded))
                .next()
            {
                Some((&next, _)) => price = next,
                None => {
                    self.best_sell = None;
                    return None;
                }
            }
        }
    }

    /// Buy-side twin of [`Book::fix_best_sell`]: walks downward from the
    /// cached best, erasing drained levels.
    pub fn fix_best_buy(&mut self) -> Option<Price> {
        let mut price = self.best_buy?;
        loop {
            if let Some(queue) = self.buys.get_mut(&price) {
                loop {
                    let Some(&id) = queue.front() else { break };
                    match self.orders.get(&id) {
                        Some(o) if o.active && o.qty_open > 0 => {
                            self.best_buy = Some(price);
                            return Some(price);
                        }
                        _ => {
                            queue.pop_front();
                            self.orders.remove(&id);
                        }
                    }
                }
            }
            self.buys.remove(&price);
            match self.buys.range(..price).next_back() {
                Some((&next, _)) => price = next,
                None => {
                    self.best_buy = None;
                    return None;
                }
            }
        }
    }

    // ========================================================================
    // Matching internals
    // ========================================================================

    /// Fills the incoming order against the live head of the level at
    /// `price` on the opposite side. Returns the incoming quantity still
    /// open after the fill.
    fn fill_head(
        &mut self,
        incoming: &Event,
        price: Price,
        mut open: Qty,
        trades_out: &mut Vec<Trade>,
    ) -> Qty {
        let maker_side = incoming.side.opposite();
        let Some(&maker_id) = self.level(maker_side, price).and_then(Level::front) else {
            return open;
        };
        let Some(maker) = self.orders.get_mut(&maker_id) else {
            return open;
        };

        let fill = open.min(maker.qty_open);
        maker.qty_open -= fill;
        open -= fill;
        let maker_done = maker.qty_open == 0;

        let (seller_id, buyer_id) = match incoming.side {
            Side::Buy => (maker_id, incoming.order_id),
            Side::Sell => (incoming.order_id, maker_id),
        };
        trades_out.push(Trade {
            seller_id,
            buyer_id,
            price,
            qty: fill,
            ts_exec: now_nanos(),
        });

        if maker_done {
            self.orders.remove(&maker_id);
            if let Some(queue) = self.level_mut(maker_side, price) {
                queue.pop_front();
            }
            // A drained level is erased by the next fix_best pass.
        }
        open
    }

    /// Rests the residual quantity at the tail of its level and repoints the
    /// best cache when the new price improves on it.
    fn rest(&mut self, event: &Event, open: Qty) {
        self.orders.insert(
            event.order_id,
            Order {
                order_id: event.order_id,
                side: event.side,
                price: event.price,
                qty_open: open,
                seq_new: event.seq,
                active: true,
            },
        );
        match event.side {
            Side::Buy => {
                self.buys.entry(event.price).or_default().push_back(event.order_id);
                if self.best_buy.map_or(true, |best| event.price > best) {
                    self.best_buy = Some(event.price);
                }
            }
            Side::Sell => {
                self.sells.entry(event.price).or_default().push_back(event.order_id);
                if self.best_sell.map_or(true, |best| event.price < best) {
                    self.best_sell = Some(event.price);
                }
            }
        }
    }

    // ========================================================================
    // Level access
    // ========================================================================

    #[inline]
    fn level(&self, side: Side, price: Price) -> Option<&Level> {
        match side {
            Side::Buy => self.buys.get(&price),
            Side::Sell => self.sells.get(&price),
        }
    }

    #[inline]
    fn level_mut(&mut self, side: Side, price: Price) -> Option<&mut Level> {
        match side {
            Side::Buy => self.buys.get_mut(&price),
            Side::Sell => self.sells.get_mut(&price),
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Number of indexed records, including cancelled ones awaiting reaping.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of live (active, open) orders.
    pub fn active_order_count(&self) -> usize {
        self.orders
            .values()
            .filter(|o| o.active && o.qty_open > 0)
            .count()
    }

    /// True when no records remain at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Raw best cache for a side. Unlike `fix_best_*`, does not repair.
    #[inline]
    pub fn cached_best(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_buy,
            Side::Sell => self.best_sell,
        }
    }

    /// Queue length at a level, counting stale slots. Zero if absent.
    pub fn level_len(&self, side: Side, price: Price) -> usize {
        self.level(side, price).map_or(0, Level::len)
    }

    /// Total live quantity resting at a level.
    pub fn resting_qty(&self, side: Side, price: Price) -> i64 {
        self.level(side, price).map_or(0, |queue| {
            queue
                .iter()
                .filter_map(|id| self.orders.get(id))
                .filter(|o| o.active)
                .map(|o| i64::from(o.qty_open))
                .sum()
        })
    }

    /// Record for `order_id`, live or awaiting reaping.
    #[inline]
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Drops every order and level.
    pub fn clear(&mut self) {
        self.sells.clear();
        self.buys.clear();
        self.orders.clear();
        self.best_sell = None;
        self.best_buy = None;
    }

    /// Order-independent digest of the book state, for replay comparisons.
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.best_buy.hash(&mut hasher);
        self.best_sell.hash(&mut hasher);
        for (tag, side) in [(0u8, &self.sells), (1u8, &self.buys)] {
            tag.hash(&mut hasher);
            for (price, queue) in side {
                price.hash(&mut hasher);
                for id in queue {
                    id.hash(&mut hasher);
                    if let Some(o) = self.orders.get(id) {
                        o.qty_open.hash(&mut hasher);
                        o.active.hash(&mut hasher);
                    }
                }
            }
        }
        hasher.finish()
    }

    /// Dumps both sides through the `log` facade at debug level. Diagnostic
    /// only; not part of the behavioural contract.
    pub fn log_books(&self) {
        debug!(
            "books: {} sell levels / {} buy levels / {} indexed orders",
            self.sells.len(),
            self.buys.len(),
            self.orders.len()
        );
        for (label, side) in [("sell", &self.sells), ("buy", &self.buys)] {
            for (price, queue) in side.iter().rev() {
                let entries: Vec<String> = queue
                    .iter()
                    .map(|id| match self.orders.get(id) {
                        Some(o) if o.active => format!("{}({})", o.qty_open, id),
                        Some(o) => format!("{}({}/cancelled)", o.qty_open, id),
                        None => format!("?({})", id),
                    })
                    .collect();
                debug!("{} {} | {}", label, price, entries.join(", "));
            }
        }
    }
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("best_buy", &self.best_buy)
            .field("best_sell", &self.best_sell)
            .field("buy_levels", &self.buys.len())
            .field("sell_levels", &self.sells.len())
            .field("order_count", &self.orders.len())
            .finish()
    }
}

/// Strict price-time stop rule: an incoming buy crosses only when the best
/// sell is at or below its limit; symmetric for sells.
#[inline]
const fn crosses(incoming: Side, limit: Price, best_opposite: Price) -> bool {
    match incoming {
        Side::Buy => best_opposite <= limit,
        Side::Sell => best_opposite >= limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn new_order(seq: u64, id: OrderId, side: Side, price: Price, qty: Qty) -> Event {
        Event::new(seq, id, side, price, qty, now_nanos())
    }

    fn replace(seq: u64, id: OrderId, side: Side, price: Price, qty: Qty) -> Event {
        Event::replace(seq, id, side, price, qty, now_nanos())
    }

    #[test]
    fn empty_book() {
        let mut book = Book::new();
        assert!(book.is_empty());
        assert_eq!(book.fix_best_buy(), None);
        assert_eq!(book.fix_best_sell(), None);
    }

    #[test]
    fn rejects_bad_price_and_qty() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        assert!(!book.on_new(&new_order(1, 1, Side::Buy, 0, 10), &mut trades));
        assert!(!book.on_new(&new_order(2, 1, Side::Buy, 100, 0), &mut trades));
        assert!(!book.on_new(&new_order(3, 1, Side::Buy, 100, -5), &mut trades));
        assert!(book.is_empty());
        assert!(trades.is_empty());
    }

    #[test]
    fn rejects_duplicate_live_id() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        assert!(book.on_new(&new_order(1, 1, Side::Buy, 100, 10), &mut trades));
        assert!(!book.on_new(&new_order(2, 1, Side::Sell, 200, 10), &mut trades));
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn simple_cross() {
        // Buy 100x10 rests, sell 100x4 crosses for 4.
        let mut book = Book::new();
        let mut trades = Vec::new();
        assert!(book.on_new(&new_order(1, 1, Side::Buy, 100, 10), &mut trades));
        assert!(book.on_new(&new_order(2, 2, Side::Sell, 100, 4), &mut trades));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].buyer_id, 1);
        assert_eq!(trades[0].seller_id, 2);
        assert_eq!(trades[0].price, 100);
        assert_eq!(trades[0].qty, 4);

        assert_eq!(book.fix_best_buy(), Some(100));
        assert_eq!(book.fix_best_sell(), None);
        assert_eq!(book.order(1).map(|o| o.qty_open), Some(6));
        assert_eq!(book.order(1).map(|o| o.seq_new), Some(1));
    }

    #[test]
    fn no_cross_both_rest() {
        // Bid 99 under ask 101: nothing trades.
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 99, 5), &mut trades);
        book.on_new(&new_order(2, 2, Side::Sell, 101, 5), &mut trades);

        assert!(trades.is_empty());
        assert_eq!(book.fix_best_buy(), Some(99));
        assert_eq!(book.fix_best_sell(), Some(101));
    }

    #[test]
    fn walk_the_book() {
        // Buy 101x6 sweeps 100x3 then part of 101x5.
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Sell, 100, 3), &mut trades);
        book.on_new(&new_order(2, 2, Side::Sell, 101, 5), &mut trades);
        book.on_new(&new_order(3, 3, Side::Buy, 101, 6), &mut trades);

        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].seller_id, trades[0].price, trades[0].qty), (1, 100, 3));
        assert_eq!((trades[1].seller_id, trades[1].price, trades[1].qty), (2, 101, 3));
        assert_eq!(trades[0].buyer_id, 3);

        assert_eq!(book.fix_best_buy(), None);
        assert_eq!(book.fix_best_sell(), Some(101));
        assert_eq!(book.order(2).map(|o| o.qty_open), Some(2));
    }

    #[test]
    fn time_priority_within_level() {
        // Two bids at 100, incoming sell takes the older one first.
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 100, 4), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 100, 4), &mut trades);
        book.on_new(&new_order(3, 3, Side::Sell, 100, 6), &mut trades);

        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].buyer_id, trades[0].qty), (1, 4));
        assert_eq!((trades[1].buyer_id, trades[1].qty), (2, 2));
        assert_eq!(trades.iter().map(|t| t.seller_id).collect::<Vec<_>>(), [3, 3]);
        assert_eq!(book.order(2).map(|o| o.qty_open), Some(2));
    }

    #[test]
    fn cancel_at_head_blocks_match() {
        // A cancelled head must not trade; the incoming order rests instead.
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 100, 5), &mut trades);
        assert!(book.on_cancel(1));
        book.on_new(&new_order(2, 2, Side::Sell, 100, 5), &mut trades);

        assert!(trades.is_empty());
        assert_eq!(book.fix_best_buy(), None);
        assert_eq!(book.fix_best_sell(), Some(100));
    }

    #[test]
    fn cancel_unknown_id() {
        let mut book = Book::new();
        assert!(!book.on_cancel(404));
    }

    #[test]
    fn double_cancel_is_idempotent() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 100, 5), &mut trades);
        assert!(book.on_cancel(1));
        assert!(book.on_cancel(1));
        assert_eq!(book.fix_best_buy(), None);
    }

    #[test]
    fn replace_loses_priority() {
        // Replacing id 1 sends it behind id 2 at the same price.
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 100, 3), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 100, 3), &mut trades);
        assert!(book.on_replace(&replace(3, 1, Side::Buy, 100, 3), &mut trades));
        book.on_new(&new_order(4, 3, Side::Sell, 100, 3), &mut trades);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].buyer_id, 2);
        assert_eq!(trades[0].seller_id, 3);
        assert_eq!(book.order(1).map(|o| o.qty_open), Some(3));
        // The re-insert carries the replace event's sequence number.
        assert_eq!(book.order(1).map(|o| o.seq_new), Some(3));
        assert_eq!(book.fix_best_buy(), Some(100));
    }

    #[test]
    fn replace_unknown_id_is_rejected() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        assert!(!book.on_replace(&replace(1, 9, Side::Buy, 100, 3), &mut trades));
        assert!(book.is_empty());
    }

    #[test]
    fn replace_can_move_price_and_match() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Sell, 105, 4), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 100, 4), &mut trades);
        assert!(trades.is_empty());

        // Re-price the ask down through the bid.
        assert!(book.on_replace(&replace(3, 1, Side::Sell, 100, 4), &mut trades));
        assert_eq!(trades.len(), 1);
        assert_eq!((trades[0].seller_id, trades[0].buyer_id), (1, 2));
        assert_eq!(trades[0].price, 100);
        assert!(book.is_empty());
        assert_eq!(book.cached_best(Side::Buy), None);
    }

    #[test]
    fn replace_of_sole_order_repairs_best_cache() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 100, 5), &mut trades);
        // Moving the only bid down must not leave the cache on an empty level.
        assert!(book.on_replace(&replace(2, 1, Side::Buy, 99, 5), &mut trades));
        assert_eq!(book.cached_best(Side::Buy), Some(99));
        assert_eq!(book.level_len(Side::Buy, 100), 0);
    }

    #[test]
    fn self_trade_is_not_prevented() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Sell, 100, 5), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 100, 5), &mut trades);
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn stale_levels_are_reaped_while_walking() {
        // Cancelled asks between the aggressor and the survivor are swept
        // out by fix_best_sell on the way up.
        let mut book = Book::new();
        let mut trades = Vec::new();
        for i in 0..10u64 {
            book.on_new(
                &new_order(i, i, Side::Sell, 100 + i as Price, 1),
                &mut trades,
            );
        }
        for i in 0..9u64 {
            assert!(book.on_cancel(i));
        }
        book.on_new(&new_order(20, 20, Side::Buy, 200, 1), &mut trades);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].seller_id, 9);
        assert_eq!(trades[0].price, 109);
        assert!(book.is_empty());
        for i in 0..10u64 {
            assert_eq!(book.level_len(Side::Sell, 100 + i as Price), 0);
        }
    }

    #[test]
    fn aggressor_does_not_trade_through_its_limit() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Sell, 102, 5), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 101, 5), &mut trades);
        assert!(trades.is_empty());
        assert_eq!(book.fix_best_buy(), Some(101));
        assert_eq!(book.fix_best_sell(), Some(102));
    }

    #[test]
    fn cached_best_level_is_never_left_empty() {
        // Fully consuming the best level must reap it before on_new
        // returns.
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Sell, 100, 5), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 100, 5), &mut trades);
        assert_eq!(book.cached_best(Side::Sell), None);
        assert_eq!(book.level_len(Side::Sell, 100), 0);
    }

    #[test]
    fn state_hash_is_stable_and_discriminating() {
        let run = |qty: Qty| {
            let mut book = Book::new();
            let mut trades = Vec::new();
            book.on_new(&new_order(1, 1, Side::Buy, 100, qty), &mut trades);
            book.on_new(&new_order(2, 2, Side::Sell, 105, 3), &mut trades);
            book.state_hash()
        };
        assert_eq!(run(10), run(10));
        assert_ne!(run(10), run(11));
    }

    #[test]
    fn resting_qty_ignores_cancelled_entries() {
        let mut book = Book::new();
        let mut trades = Vec::new();
        book.on_new(&new_order(1, 1, Side::Buy, 100, 5), &mut trades);
        book.on_new(&new_order(2, 2, Side::Buy, 100, 7), &mut trades);
        book.on_cancel(1);
        assert_eq!(book.resting_qty(Side::Buy, 100), 7);
        assert_eq!(book.level_len(Side::Buy, 100), 2);
    }

    #[test]
    fn event_kind_is_copyable_into_dispatch() {
        // Guards the closed-enum dispatch used by the pipeline.
        let e = Event::cancel(1, 1, 0);
        match e.kind {
            EventKind::Cancel => {}
            _ => panic!("expected cancel"),
        }
    }
}
