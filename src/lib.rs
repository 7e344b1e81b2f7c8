//! # tickmatch
//!
//! A low-latency limit-order matching engine: exchange events flow from an
//! ingress thread through a bounded SPSC ring into a single matching thread
//! that owns a price-time-priority book and emits a trade tape.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: the matching thread owns the book exclusively (no locks)
//! - **Wait-Free Handoff**: the SPSC ring is the only concurrent structure
//! - **Lazy Reaping**: cancel is O(1); dead records are swept at the head of
//!   their level by the best-price repair pass
//! - **Amortised O(1) Best Price**: a cached best per side, advanced only by
//!   `fix_best_*`
//!
//! ## Architecture
//!
//! ```text
//! [Ingress Thread] --> [SPSC Ring<Event>] --> [Matching Thread]
//!                                                   |
//!                                             [Vec<Trade>]
//! ```

pub mod book;
pub mod clock;
pub mod event;
pub mod feed;
pub mod pipeline;
pub mod ring;
pub mod stats;

// Re-exports for convenience
pub use book::Book;
pub use clock::{now_nanos, Nanos};
pub use event::{Event, EventKind, Order, OrderId, Price, Qty, Side, Trade};
pub use feed::{EventFeed, FeedConfig};
pub use pipeline::{run_pipeline, PipelineConfig, PipelineOutcome, StreamEnd};
pub use ring::Ring;
pub use stats::{EventCounts, LatencyRecorder, LatencySummary, PipelineStats};
