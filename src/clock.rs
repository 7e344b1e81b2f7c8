//! Monotonic nanosecond clock used for all pipeline timestamps.

use once_cell::sync::Lazy;
use std::time::Instant;

/// Nanoseconds on the process-local monotonic clock.
pub type Nanos = u64;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds since the first call site touched the clock. Monotonic and
/// cheap; only differences between readings are meaningful.
#[inline]
pub fn now_nanos() -> Nanos {
    EPOCH.elapsed().as_nanos() as Nanos
}
