use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ring storage guarded by the channel mutex.
///
/// Invariant: `len` equals puts minus gets and stays within `[0, capacity]`;
/// `put_at`/`take_at` chase each other around the slot array.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    put_at: usize,
    take_at: usize,
    len: usize,
}

struct Shared<T> {
    ring: Mutex<Ring<T>>,
    /// Signaled when a get frees a slot
    not_full: Condvar,
    /// Signaled when a put adds an item
    not_empty: Condvar,
    capacity: usize,
    blocked_puts: AtomicU64,
}

/// A fixed-capacity blocking FIFO channel for hand-off between stages.
///
/// `put` blocks while the channel is full, `get` blocks while it is empty;
/// both are safe for any number of concurrent producers and consumers, and
/// each item is delivered to exactly one caller. Cloning yields another
/// handle to the same ring.
pub struct BoundedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero; a zero-slot channel could never accept
    /// an item.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be nonzero");
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>();
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring {
                    slots: slots.into_boxed_slice(),
                    put_at: 0,
                    take_at: 0,
                    len: 0,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
                blocked_puts: AtomicU64::new(0),
            }),
        }
    }

    /// Insert an item at the tail, blocking until a slot is free.
    pub fn put(&self, item: T) {
        let mut ring = self.shared.ring.lock();
        if ring.len == self.shared.capacity {
            self.shared.blocked_puts.fetch_add(1, Ordering::Relaxed);
            while ring.len == self.shared.capacity {
                self.shared.not_full.wait(&mut ring);
            }
        }
        let at = ring.put_at;
        ring.slots[at] = Some(item);
        ring.put_at = (at + 1) % self.shared.capacity;
        ring.len += 1;
        drop(ring);
        self.shared.not_empty.notify_one();
    }

    /// Remove the item at the head, blocking until one exists.
    pub fn get(&self) -> T {
        let mut ring = self.shared.ring.lock();
        while ring.len == 0 {
            self.shared.not_empty.wait(&mut ring);
        }
        let item = self.take_head(&mut ring);
        drop(ring);
        self.shared.not_full.notify_one();
        item
    }

    /// Remove the head item without blocking.
    pub fn try_get(&self) -> Option<T> {
        let mut ring = self.shared.ring.lock();
        if ring.len == 0 {
            return None;
        }
        let item = self.take_head(&mut ring);
        drop(ring);
        self.shared.not_full.notify_one();
        Some(item)
    }

    fn take_head(&self, ring: &mut Ring<T>) -> T {
        let at = ring.take_at;
        let item = ring.slots[at].take().expect("occupied slot at read cursor");
        ring.take_at = (at + 1) % self.shared.capacity;
        ring.len -= 1;
        item
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.shared.ring.lock().len
    }

    /// Whether the channel currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items the channel can hold.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Current fill level as a percentage (0-100).
    pub fn utilization(&self) -> u32 {
        ((self.len() * 100) / self.shared.capacity).min(100) as u32
    }

    /// How many puts found the channel full and had to wait.
    pub fn blocked_puts(&self) -> u64 {
        self.shared.blocked_puts.load(Ordering::Relaxed)
    }
}
