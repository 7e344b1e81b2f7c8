//! Seeded synthetic exchange-event stream used by the benchmark harness and
//! the randomized tests.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::clock::now_nanos;
use crate::event::{Event, OrderId, Price, Qty, Side};

/// Shape of the generated stream.
#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    /// Cumulative probability of a New event.
    pub new_bar: f64,
    /// Cumulative probability of New-or-Cancel; the remainder is Replace.
    pub cancel_bar: f64,
    /// Inclusive lower price bound in ticks.
    pub price_lo: Price,
    /// Exclusive upper price bound in ticks.
    pub price_hi: Price,
    /// Quantities are drawn from `1..=qty_max`.
    pub qty_max: Qty,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            new_bar: 0.80,
            cancel_bar: 0.95,
            price_lo: 80,
            price_hi: 120,
            qty_max: 100,
        }
    }
}

/// Deterministic event generator: same seed, same stream.
///
/// Sequence numbers increase by one per event and the first event is always
/// a New so cancels and replaces have something to aim at. Targets for
/// cancel/replace are drawn uniformly from all previously issued ids; the
/// book rejects ids that are already gone, which is part of the workload.
pub struct EventFeed {
    rng: ChaCha8Rng,
    cfg: FeedConfig,
    next_id: OrderId,
    seq: u64,
}

impl EventFeed {
    pub fn new(seed: u64, cfg: FeedConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            cfg,
            next_id: 0,
            seq: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(seed, FeedConfig::default())
    }

    fn random_side(&mut self) -> Side {
        if self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    fn random_price(&mut self) -> Price {
        self.rng.gen_range(self.cfg.price_lo..self.cfg.price_hi)
    }

    fn random_qty(&mut self) -> Qty {
        self.rng.gen_range(1..=self.cfg.qty_max)
    }

    /// Draws the next event. Never runs dry.
    pub fn next_event(&mut self) -> Event {
        let seq = self.seq;
        self.seq += 1;
        let ts = now_nanos();

        let roll: f64 = if seq == 0 { 0.0 } else { self.rng.gen() };
        if roll <= self.cfg.new_bar {
            let id = self.next_id;
            self.next_id += 1;
            let side = self.random_side();
            let price = self.random_price();
            let qty = self.random_qty();
            Event::new(seq, id, side, price, qty, ts)
        } else if roll <= self.cfg.cancel_bar {
            let target = self.rng.gen_range(0..self.next_id);
            Event::cancel(seq, target, ts)
        } else {
            let target = self.rng.gen_range(0..self.next_id);
            let side = self.random_side();
            let price = self.random_price();
            let qty = self.random_qty();
            Event::replace(seq, target, side, price, qty, ts)
        }
    }
}
