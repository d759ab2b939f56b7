//! Bounded lock-free SPSC queue for handoff between receiver threads.
//!
//! Carries buffer-creation requests from the RX thread to the conductor,
//! attach events back, and control commands from the [`Receiver`] handle.
//! Both ends are `Send` but not `Sync`: exactly one thread pushes and exactly
//! one thread pops, which is what makes the single atomic store per side
//! sufficient.
//!
//! ```
//! use termline::sync::spsc;
//!
//! let (tx, rx) = spsc::channel::<u32, 8>();
//! tx.push(7).unwrap();
//! assert_eq!(rx.pop(), Some(7));
//! ```
//!
//! [`Receiver`]: crate::receiver::Receiver

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use minstant::Instant;

/// Empty polls spent spinning before `pop_timeout` starts sleeping.
const SPIN_LIMIT: u32 = 128;

/// Longest single sleep inside `pop_timeout`.
const SLEEP_STEP: Duration = Duration::from_millis(1);

/// Cache-line aligned index so producer and consumer never share a line.
#[repr(align(64))]
struct PaddedIndex(AtomicUsize);

struct Ring<T, const N: usize> {
    /// Next slot to write. Written by the producer only.
    head: PaddedIndex,
    /// Next slot to read. Written by the consumer only.
    tail: PaddedIndex,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: a slot is touched by the producer only while `head - tail < N` says it
// is free, and by the consumer only after the producer's release store on `head`
// published it. Values move between threads, so `T: Send` is required.
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}
unsafe impl<T: Send, const N: usize> Send for Ring<T, N> {}

impl<T, const N: usize> Ring<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "SPSC capacity must be greater than 0");

    fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            head: PaddedIndex(AtomicUsize::new(0)),
            tail: PaddedIndex(AtomicUsize::new(0)),
            slots: (0..N).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect(),
        }
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        let head = *self.head.0.get_mut();
        let mut tail = *self.tail.0.get_mut();
        while tail != head {
            // SAFETY: slots in [tail, head) were written and never read.
            unsafe { self.slots[tail % N].get_mut().assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Opts out of `Sync` while staying `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of an SPSC queue.
pub struct Producer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    /// Last observed consumer index, refreshed only when the ring looks full.
    cached_tail: Cell<usize>,
    _unsync: PhantomUnsync,
}

/// Read end of an SPSC queue.
pub struct Consumer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    /// Last observed producer index, refreshed only when the ring looks empty.
    cached_head: Cell<usize>,
    _unsync: PhantomUnsync,
}

/// Creates a queue holding at most `N` items.
#[must_use]
pub fn channel<T: Send, const N: usize>() -> (Producer<T, N>, Consumer<T, N>) {
    let ring = Arc::new(Ring::new());
    (
        Producer {
            ring: Arc::clone(&ring),
            cached_tail: Cell::new(0),
            _unsync: PhantomData,
        },
        Consumer {
            ring,
            cached_head: Cell::new(0),
            _unsync: PhantomData,
        },
    )
}

impl<T: Send, const N: usize> Producer<T, N> {
    /// Pushes without waiting.
    ///
    /// # Errors
    ///
    /// Hands `item` back when the queue is full.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        let head = self.ring.head.0.load(Ordering::Relaxed);
        if head.wrapping_sub(self.cached_tail.get()) >= N {
            self.cached_tail.set(self.ring.tail.0.load(Ordering::Acquire));
            if head.wrapping_sub(self.cached_tail.get()) >= N {
                return Err(item);
            }
        }
        // SAFETY: the slot is free (checked above) and only this producer writes.
        unsafe { (*self.ring.slots[head % N].get()).write(item) };
        self.ring.head.0.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of queued items as seen by the producer.
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.ring.head.0.load(Ordering::Relaxed);
        head.wrapping_sub(self.ring.tail.0.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send, const N: usize> Consumer<T, N> {
    /// Pops without waiting.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        let tail = self.ring.tail.0.load(Ordering::Relaxed);
        if tail == self.cached_head.get() {
            self.cached_head.set(self.ring.head.0.load(Ordering::Acquire));
            if tail == self.cached_head.get() {
                return None;
            }
        }
        // SAFETY: the acquire load of `head` published this slot and only this
        // consumer reads it; advancing `tail` afterwards hands it back.
        let item = unsafe { (*self.ring.slots[tail % N].get()).assume_init_read() };
        self.ring.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Waits until an item arrives or `timeout` elapses.
    ///
    /// Spins for the first [`SPIN_LIMIT`] empty polls, then sleeps in steps
    /// of at most [`SLEEP_STEP`] so an idle consumer gives up its core.
    #[must_use]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut spins = 0;
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::sleep(remaining.min(SLEEP_STEP));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let (tx, rx) = channel::<u64, 8>();
        for i in 0..5 {
            tx.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.pop(), Some(i));
        }
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn full_queue_returns_item() {
        let (tx, rx) = channel::<u64, 2>();
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        assert_eq!(tx.push(3), Err(3));
        assert_eq!(tx.len(), 2);

        assert_eq!(rx.pop(), Some(1));
        tx.push(3).unwrap();
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert!(tx.is_empty());
    }

    #[test]
    fn wraps_many_times() {
        let (tx, rx) = channel::<usize, 3>();
        for round in 0..100 {
            tx.push(round).unwrap();
            tx.push(round + 1).unwrap();
            assert_eq!(rx.pop(), Some(round));
            assert_eq!(rx.pop(), Some(round + 1));
        }
    }

    #[test]
    fn pop_timeout_expires_on_empty_queue() {
        let (_tx, rx) = channel::<u8, 4>();
        assert_eq!(rx.pop_timeout(Duration::from_millis(2)), None);
    }

    #[test]
    fn pop_timeout_sleeps_while_empty() {
        let (_tx, rx) = channel::<u8, 4>();
        let cpu = crate::sync::thread_cpu_time();
        assert_eq!(rx.pop_timeout(Duration::from_millis(100)), None);
        let used = crate::sync::thread_cpu_time() - cpu;
        assert!(used < Duration::from_millis(30), "waited on CPU for {used:?}");
    }

    #[test]
    fn pop_timeout_returns_item_pushed_while_waiting() {
        let (tx, rx) = channel::<u8, 4>();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.push(9).unwrap();
            tx
        });
        assert_eq!(rx.pop_timeout(Duration::from_secs(5)), Some(9));
        drop(producer.join().unwrap());
    }

    #[test]
    fn unread_items_are_dropped_with_the_ring() {
        let marker = Arc::new(());
        let (tx, rx) = channel::<Arc<()>, 4>();
        tx.push(Arc::clone(&marker)).unwrap();
        tx.push(Arc::clone(&marker)).unwrap();
        assert_eq!(Arc::strong_count(&marker), 3);
        drop(tx);
        drop(rx);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn cross_thread_handoff_preserves_order() {
        let (tx, rx) = channel::<u64, 16>();
        let count = 10_000u64;

        let producer = std::thread::spawn(move || {
            for i in 0..count {
                while tx.push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0;
        while expected < count {
            if let Some(v) = rx.pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        producer.join().unwrap();
    }
}
