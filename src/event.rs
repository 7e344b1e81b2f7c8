//! Event, order, and trade records shared across the pipeline.
//!
//! Events are inputs from the ingress thread; trades are the engine's only
//! output record. All records are plain `Copy` data.

use crate::clock::Nanos;

/// External order identifier (exchange-assigned).
pub type OrderId = u64;

/// Price in integer ticks.
pub type Price = u32;

/// Order quantity. Signed so that fill arithmetic can never wrap silently;
/// valid inputs are strictly positive.
pub type Qty = i32;

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids).
    Buy = 0,
    /// Sell side (asks).
    Sell = 1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// What the exchange asked us to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EventKind {
    /// Place a new order.
    New = 0,
    /// Cancel a resting order.
    Cancel = 1,
    /// Cancel-then-new with the same id (loses time priority).
    Replace = 2,
}

/// One exchange event as it travels through the ring.
///
/// Immutable after construction. A `Cancel` carries only `seq`, `order_id`
/// and `ts_ingress`; its remaining fields are zeroed and ignored.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    /// Strictly increasing stream sequence number (assigned by the producer).
    pub seq: u64,
    pub kind: EventKind,
    pub order_id: OrderId,
    pub side: Side,
    /// Limit price in ticks; must be > 0 for New/Replace.
    pub price: Price,
    /// Quantity; must be > 0 for New/Replace.
    pub qty: Qty,
    /// Monotonic ingress timestamp, sampled by the producer.
    pub ts_ingress: Nanos,
}

impl Event {
    /// A new-order event.
    #[inline]
    pub const fn new(
        seq: u64,
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
        ts_ingress: Nanos,
    ) -> Self {
        Self {
            seq,
            kind: EventKind::New,
            order_id,
            side,
            price,
            qty,
            ts_ingress,
        }
    }

    /// A cancel event. Side, price, and quantity are not meaningful.
    #[inline]
    pub const fn cancel(seq: u64, order_id: OrderId, ts_ingress: Nanos) -> Self {
        Self {
            seq,
            kind: EventKind::Cancel,
            order_id,
            side: Side::Buy,
            price: 0,
            qty: 0,
            ts_ingress,
        }
    }

    /// A replace event: cancel `order_id`, then place the new terms under
    /// the same id.
    #[inline]
    pub const fn replace(
        seq: u64,
        order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
        ts_ingress: Nanos,
    ) -> Self {
        Self {
            seq,
            kind: EventKind::Replace,
            order_id,
            side,
            price,
            qty,
            ts_ingress,
        }
    }
}

/// A resting order as the book tracks it.
///
/// Mutated in place: `qty_open` shrinks on fills, `active` flips on cancel.
#[derive(Clone, Copy, Debug)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Remaining open quantity; > 0 while the order is live.
    pub qty_open: Qty,
    /// Sequence number of the event that created this record.
    pub seq_new: u64,
    /// Cleared by cancel; the record is reaped lazily.
    pub active: bool,
}

/// A fill between two orders. Trade price is always the maker's price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    pub seller_id: OrderId,
    pub buyer_id: OrderId,
    pub price: Price,
    pub qty: Qty,
    /// Monotonic timestamp sampled when the fill was emitted.
    pub ts_exec: Nanos,
}
