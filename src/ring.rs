//! Bounded lock-free single-producer/single-consumer ring.
//!
//! One thread pushes, one distinct thread pops; both calls are wait-free.
//! Capacity is rounded up to a power of two and one slot is reserved as a
//! sentinel so full and empty are distinguishable without a counter:
//! `empty ⇔ head == tail`, `full ⇔ (head + 1) & mask == tail`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pads a cursor out to its own cache line so producer and consumer never
/// write the same line.
#[repr(align(64))]
struct CacheLine<T>(T);

/// Wait-free bounded SPSC queue.
///
/// # Contract
///
/// Exactly one thread may call [`try_push`](Ring::try_push) and exactly one
/// other thread may call [`try_pop`](Ring::try_pop). The type is
/// `Send + Sync` so it can be shared by reference across the two threads;
/// concurrent pushes (or concurrent pops) from multiple threads are
/// undefined behaviour.
pub struct Ring<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Write cursor; stored pre-masked. Only the producer advances it.
    head: CacheLine<AtomicUsize>,
    /// Read cursor; stored pre-masked. Only the consumer advances it.
    tail: CacheLine<AtomicUsize>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates a ring holding up to `capacity - 1` elements after rounding
    /// `capacity` up to the next power of two (minimum 2).
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.next_power_of_two().max(2);
        let slots = (0..cap)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: cap - 1,
            head: CacheLine(AtomicUsize::new(0)),
            tail: CacheLine(AtomicUsize::new(0)),
        }
    }

    /// Usable capacity (one slot is the sentinel).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Enqueues `value`, or returns it back as `Err` when the ring is full.
    ///
    /// Producer thread only.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let head = self.head.0.load(Ordering::Relaxed);
        let next = (head + 1) & self.mask;
        if next == self.tail.0.load(Ordering::Acquire) {
            return Err(value);
        }
        unsafe { (*self.slots[head].get()).write(value) };
        self.head.0.store(next, Ordering::Release);
        Ok(())
    }

    /// Dequeues the oldest element, or `None` when the ring is empty.
    ///
    /// Consumer thread only.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.tail.0.load(Ordering::Relaxed);
        if tail == self.head.0.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { (*self.slots[tail].get()).assume_init_read() };
        self.tail.0.store((tail + 1) & self.mask, Ordering::Release);
        Some(value)
    }

    /// Snapshot emptiness test. May be stale by the time the caller acts on
    /// it, but is safe to call from either side.
    #[inline]
    pub fn empty(&self) -> bool {
        self.head.0.load(Ordering::Acquire) == self.tail.0.load(Ordering::Acquire)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Exclusive access here; destroy whatever is still in flight.
        let head = *self.head.0.get_mut();
        let mut tail = *self.tail.0.get_mut();
        while tail != head {
            unsafe { (*self.slots[tail].get()).assume_init_drop() };
            tail = (tail + 1) & self.mask;
        }
    }
}
