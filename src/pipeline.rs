//! Matching dispatcher: drains the ring on a dedicated thread and routes
//! each event to the book, plus the two-thread harness that wires a
//! synthetic producer to it.

use std::thread;

use log::info;

use crate::book::Book;
use crate::clock::now_nanos;
use crate::event::{Event, EventKind, Trade};
use crate::feed::{EventFeed, FeedConfig};
use crate::ring::Ring;
use crate::stats::{EventCounts, LatencyRecorder, PipelineStats};

use std::sync::atomic::{AtomicBool, Ordering};

/// End-of-stream signal: raised once by the producer after its last push.
///
/// The Release store pairs with the consumer's Acquire load, so a consumer
/// that observes the flag also observes every preceding push.
#[derive(Default)]
pub struct StreamEnd(AtomicBool);

impl StreamEnd {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drains `ring` into `book` until `done` is raised and the ring is observed
/// empty. Returns dispatch counters and the ingress-to-dispatch latency
/// histogram.
///
/// The lost-wakeup rule: on an empty pop the flag is checked first and the
/// ring re-checked after, so a push racing with shutdown is never stranded.
pub fn run_consumer(
    ring: &Ring<Event>,
    book: &mut Book,
    trades_out: &mut Vec<Trade>,
    done: &StreamEnd,
) -> (EventCounts, LatencyRecorder) {
    let mut counts = EventCounts::default();
    let mut latency = LatencyRecorder::new();

    loop {
        match ring.try_pop() {
            Some(event) => {
                let ts_out = now_nanos();
                latency.record(ts_out.saturating_sub(event.ts_ingress));
                match event.kind {
                    EventKind::New => {
                        book.on_new(&event, trades_out);
                    }
                    EventKind::Cancel => {
                        book.on_cancel(event.order_id);
                    }
                    EventKind::Replace => {
                        book.on_replace(&event, trades_out);
                    }
                }
                counts.bump(event.kind);
            }
            None => {
                if done.is_raised() && ring.empty() {
                    break;
                }
                thread::yield_now();
            }
        }
    }

    (counts, latency)
}

/// Pushes `events` feed events into the ring, spinning while it is full,
/// then raises `done`. Ingress timestamps are stamped at generation time.
pub fn run_producer(
    ring: &Ring<Event>,
    feed: &mut EventFeed,
    events: usize,
    done: &StreamEnd,
) -> EventCounts {
    let mut counts = EventCounts::default();
    for _ in 0..events {
        let mut event = feed.next_event();
        loop {
            match ring.try_push(event) {
                Ok(()) => break,
                Err(back) => event = back,
            }
        }
        counts.bump(event.kind);
    }
    done.raise();
    counts
}

/// One pipeline run: thread pair, ring size, stream length, feed shape.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Requested ring capacity (rounded up to a power of two).
    pub ring_capacity: usize,
    /// Number of events the producer emits.
    pub events: usize,
    /// Feed RNG seed.
    pub seed: u64,
    pub feed: FeedConfig,
    /// Pin the consumer to the last core, as the matching thread would be
    /// in production.
    pub pin_consumer: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1024,
            events: 1 << 16,
            seed: 0,
            feed: FeedConfig::default(),
            pin_consumer: false,
        }
    }
}

/// Everything a finished run leaves behind.
pub struct PipelineOutcome {
    pub book: Book,
    pub trades: Vec<Trade>,
    pub stats: PipelineStats,
}

/// Runs producer → ring → consumer across two threads and joins both.
pub fn run_pipeline(cfg: PipelineConfig) -> PipelineOutcome {
    let ring = Ring::new(cfg.ring_capacity);
    let done = StreamEnd::new();
    let mut feed = EventFeed::new(cfg.seed, cfg.feed);
    let mut book = Book::with_capacity(cfg.events.min(1 << 20));
    let mut trades = Vec::with_capacity(1024);

    info!(
        "pipeline: {} events, ring capacity {}, seed {}",
        cfg.events,
        ring.capacity(),
        cfg.seed
    );

    let mut produced = EventCounts::default();
    let mut consumed = EventCounts::default();
    let mut latency = LatencyRecorder::new();

    thread::scope(|scope| {
        let consumer = scope.spawn(|| {
            if cfg.pin_consumer {
                pin_to_last_core();
            }
            run_consumer(&ring, &mut book, &mut trades, &done)
        });
        let producer = scope.spawn(|| run_producer(&ring, &mut feed, cfg.events, &done));

        produced = producer.join().expect("producer thread panicked");
        let (counts, lat) = consumer.join().expect("consumer thread panicked");
        consumed = counts;
        latency = lat;
    });

    PipelineOutcome {
        book,
        trades,
        stats: PipelineStats {
            produced,
            consumed,
            latency,
        },
    }
}

/// Pins the current thread to the last available core, which is the one
/// most commonly isolated from OS interrupts.
pub fn pin_to_last_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last) = core_ids.last() {
            core_affinity::set_for_current(*last);
        }
    }
}
