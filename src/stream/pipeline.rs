//! Lock-Free SPSC Ring Buffer for Tick Handoff
//!
//! This module implements the bounded Single-Producer Single-Consumer queue
//! that moves ticks from the producer thread to the aggregation thread.
//!
//! ## Architecture
//!
//! ```text
//! Producer Thread                    Consumer Thread
//!        │                                 │
//!        ├─ push() ──────────────────────▶ pop()
//!        │   writes slot[head]             │   reads slot[tail]
//!        │   publishes head (Release)      │   publishes tail (Release)
//!        │   reads tail (Acquire)          │   reads head (Acquire)
//!        │                                 │
//!        └─ false when full                └─ None when empty
//! ```
//!
//! ## Index Protocol
//!
//! - `head` is written only by the producer, `tail` only by the consumer.
//! - One slot is always left empty so `head == tail` means empty and
//!   `head + 1 == tail` (mod capacity) means full. A ring of `C` slots holds
//!   at most `C - 1` ticks.
//! - A slot is written before `head` is published and read before `tail` is
//!   published, so neither side ever sees a torn `Tick`.
//!
//! ## Handles
//!
//! [`RingBuffer::split`] consumes the ring and hands out exactly one
//! [`Producer`] and one [`Consumer`]. Neither is `Clone` and both operations
//! take `&mut self`, so a second writer or reader cannot exist.

use crate::error::PipelineError;
use crate::utils::CacheAligned;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Default slot count: 2,048 ticks.
///
/// At the default 100µs pacing this is ~200ms of buffering before the
/// producer starts seeing backpressure.
pub const DEFAULT_CAPACITY: usize = 2048;

/// State shared by the two handles.
///
/// Indices and counters each sit on their own cache line so the producer's
/// stores never invalidate the line the consumer is polling, and vice versa.
struct Shared<T> {
    /// Next slot the producer will write
    head: CacheAligned<AtomicUsize>,

    /// Next slot the consumer will read
    tail: CacheAligned<AtomicUsize>,

    /// Metrics: successful pushes
    pushed: CacheAligned<AtomicU64>,

    /// Metrics: pushes rejected because the ring was full
    rejected: CacheAligned<AtomicU64>,

    /// Metrics: successful pops
    popped: CacheAligned<AtomicU64>,

    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: each slot is accessed by at most one thread at a time. The producer
// only touches slot[head] while it is outside [tail, head), the consumer only
// touches slot[tail] while it is inside, and ownership of a slot changes hands
// through the Release/Acquire pair on the corresponding index.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    fn next(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.capacity() {
            0
        } else {
            next
        }
    }

    #[inline(always)]
    fn occupied(&self, head: usize, tail: usize) -> usize {
        if head >= tail {
            head - tail
        } else {
            head + self.capacity() - tail
        }
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        self.occupied(head, tail)
    }

    fn metrics(&self) -> RingMetrics {
        RingMetrics {
            pushed: self.pushed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            depth: self.len(),
            capacity: self.capacity(),
        }
    }
}

/// Fixed-capacity SPSC ring buffer, before it is split into its two ends.
///
/// # Example
///
/// ```rust
/// use tickflow::stream::pipeline::RingBuffer;
///
/// let ring = RingBuffer::<u64>::with_capacity(4).unwrap();
/// let monitor = ring.monitor();
/// let (mut producer, mut consumer) = ring.split();
///
/// assert!(producer.push(1));
/// assert_eq!(monitor.len(), 1);
/// assert_eq!(consumer.pop(), Some(1));
/// assert_eq!(consumer.pop(), None);
/// ```
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy + Send> RingBuffer<T> {
    /// Allocate a ring with the default capacity.
    pub fn new() -> Self {
        Self::allocate(DEFAULT_CAPACITY)
    }

    /// Allocate a ring with `capacity` slots (`capacity - 1` usable).
    ///
    /// The allocation happens once here; the ring never grows.
    pub fn with_capacity(capacity: usize) -> Result<Self, PipelineError> {
        if capacity < 2 {
            return Err(PipelineError::InvalidCapacity(capacity));
        }
        Ok(Self::allocate(capacity))
    }

    fn allocate(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shared: Arc::new(Shared {
                head: CacheAligned(AtomicUsize::new(0)),
                tail: CacheAligned(AtomicUsize::new(0)),
                pushed: CacheAligned(AtomicU64::new(0)),
                rejected: CacheAligned(AtomicU64::new(0)),
                popped: CacheAligned(AtomicU64::new(0)),
                slots,
            }),
        }
    }

    /// Total slot count, including the sacrificed slot.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Read-only handle for metrics, usable from any thread.
    pub fn monitor(&self) -> RingMonitor<T> {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Split into the single producer and single consumer ends.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let producer = Producer {
            shared: Arc::clone(&self.shared),
            head: 0,
            cached_tail: 0,
        };
        let consumer = Consumer {
            shared: self.shared,
            tail: 0,
            cached_head: 0,
        };
        (producer, consumer)
    }
}

impl<T: Copy + Send> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write end of the ring. Owned by exactly one thread.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,

    /// Local copy of `head`; only this handle ever stores to it
    head: usize,

    /// Last observed `tail`. Stale values only under-report free space,
    /// so the atomic is reloaded only when the ring looks full.
    cached_tail: usize,
}

impl<T: Copy + Send> Producer<T> {
    /// Push an item without blocking.
    ///
    /// Returns `false` and leaves the ring untouched when it already holds
    /// `capacity - 1` items. The caller decides whether to spin, back off or
    /// drop.
    ///
    /// # Performance
    ///
    /// - One Acquire load of `tail` only when the cached value says full
    /// - One Release store of `head`
    /// - No allocations, never blocks
    #[inline(always)]
    pub fn push(&mut self, item: T) -> bool {
        let next = self.shared.next(self.head);

        if next == self.cached_tail {
            self.cached_tail = self.shared.tail.load(Ordering::Acquire);
            if next == self.cached_tail {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        // Safety: slot[head] is outside [tail, head), so the consumer is not
        // reading it, and the Acquire load of `tail` that made it free
        // happens-after the consumer finished its copy.
        unsafe {
            (*self.shared.slots[self.head].get()).write(item);
        }

        self.head = next;
        self.shared.head.store(next, Ordering::Release);
        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Items currently held. Exact from this side except for pops racing
    /// with the call.
    pub fn len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Acquire);
        self.shared.occupied(self.head, tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.shared.capacity() - 1
    }

    pub fn monitor(&self) -> RingMonitor<T> {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read end of the ring. Owned by exactly one thread.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,

    /// Local copy of `tail`; only this handle ever stores to it
    tail: usize,

    /// Last observed `head`, reloaded only when the ring looks empty
    cached_head: usize,
}

impl<T: Copy + Send> Consumer<T> {
    /// Pop the oldest item without blocking.
    ///
    /// Returns `None` when the ring is empty.
    ///
    /// # Performance
    ///
    /// - One Acquire load of `head` only when the cached value says empty
    /// - One Release store of `tail`
    /// - No allocations, never blocks
    #[inline(always)]
    pub fn pop(&mut self) -> Option<T> {
        if self.tail == self.cached_head {
            self.cached_head = self.shared.head.load(Ordering::Acquire);
            if self.tail == self.cached_head {
                return None;
            }
        }

        // Safety: slot[tail] is inside [tail, head). The producer wrote it
        // before its Release store of `head`, which the Acquire load above
        // synchronized with, and will not touch it again until `tail` moves.
        let item = unsafe { (*self.shared.slots[self.tail].get()).assume_init_read() };

        self.tail = self.shared.next(self.tail);
        self.shared.tail.store(self.tail, Ordering::Release);
        self.shared.popped.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Items currently held. Exact from this side except for pushes racing
    /// with the call.
    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Acquire);
        self.shared.occupied(head, self.tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn monitor(&self) -> RingMonitor<T> {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read-only view of ring depth and counters.
///
/// Cloneable and shareable; it never touches the slots.
pub struct RingMonitor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RingMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> RingMonitor<T> {
    /// Approximate depth (both indices may move during the read).
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Items the ring can hold at once: `capacity - 1`.
    pub fn usable_capacity(&self) -> usize {
        self.shared.capacity() - 1
    }

    pub fn metrics(&self) -> RingMetrics {
        self.shared.metrics()
    }
}

/// Ring metrics snapshot for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingMetrics {
    /// Successful pushes
    pub pushed: u64,

    /// Pushes refused because the ring was full
    pub rejected: u64,

    /// Successful pops
    pub popped: u64,

    /// Items held when the snapshot was taken
    pub depth: usize,

    /// Slot count (usable capacity is one less)
    pub capacity: usize,
}

impl RingMetrics {
    /// Percentage of push attempts that found the ring full.
    pub fn reject_rate(&self) -> f64 {
        let attempts = self.pushed + self.rejected;
        if attempts == 0 {
            0.0
        } else {
            (self.rejected as f64 / attempts as f64) * 100.0
        }
    }

    /// Percentage of usable capacity currently held.
    pub fn utilization(&self) -> f64 {
        let usable = self.capacity.saturating_sub(1);
        if usable == 0 {
            0.0
        } else {
            (self.depth as f64 / usable as f64) * 100.0
        }
    }

    /// True when the ring is >80% full or >1% of pushes were refused.
    pub fn is_backpressure(&self) -> bool {
        self.utilization() > 80.0 || self.reject_rate() > 1.0
    }
}
