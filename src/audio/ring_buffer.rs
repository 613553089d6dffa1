//! Thread-safe fixed-capacity ring buffer
//!
//! The jitter buffer between network decode and device playback. Inserting
//! into a full buffer overwrites the oldest element; the RX pipeline checks
//! headroom itself and never relies on that.

use parking_lot::RwLock;

struct Inner<T> {
    data: Vec<T>,
    head: usize, // Write position (next slot)
    tail: usize, // Read position (oldest element)
    size: usize,
}

/// Fixed-capacity FIFO guarded by a reader/writer lock
pub struct RingBuffer<T> {
    inner: RwLock<Inner<T>>,
    capacity: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create an empty buffer holding up to `capacity` elements (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Inner {
                data: vec![T::default(); capacity],
                head: 0,
                tail: 0,
                size: 0,
            }),
            capacity,
        }
    }

    /// Append an element, overwriting the oldest when full
    pub fn insert(&self, elem: T) {
        let mut inner = self.inner.write();
        let head = inner.head;
        inner.data[head] = elem;
        inner.head = (head + 1) % self.capacity;
        if inner.size == self.capacity {
            inner.tail = (inner.tail + 1) % self.capacity;
        } else {
            inner.size += 1;
        }
    }

    /// Remove and return the oldest element
    pub fn pop_front(&self) -> Option<T> {
        let mut inner = self.inner.write();
        if inner.size == 0 {
            return None;
        }
        let tail = inner.tail;
        let elem = inner.data[tail];
        inner.tail = (tail + 1) % self.capacity;
        inner.size -= 1;
        Some(elem)
    }

    /// Pop up to `out.len()` elements in one lock acquisition
    pub fn pop_into(&self, out: &mut [T]) -> usize {
        let mut inner = self.inner.write();
        let n = out.len().min(inner.size);
        for slot in out.iter_mut().take(n) {
            let tail = inner.tail;
            *slot = inner.data[tail];
            inner.tail = (tail + 1) % self.capacity;
        }
        inner.size -= n;
        n
    }

    /// Oldest element without removing it
    pub fn front(&self) -> Option<T> {
        let inner = self.inner.read();
        (inner.size > 0).then(|| inner.data[inner.tail])
    }

    /// Newest element without removing it
    pub fn back(&self) -> Option<T> {
        let inner = self.inner.read();
        (inner.size > 0).then(|| inner.data[(inner.head + self.capacity - 1) % self.capacity])
    }

    /// Visit elements oldest to newest
    pub fn for_each<F: FnMut(&T)>(&self, mut f: F) {
        let inner = self.inner.read();
        for i in 0..inner.size {
            f(&inner.data[(inner.tail + i) % self.capacity]);
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all elements and zero the storage
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.data.fill(T::default());
        inner.head = 0;
        inner.tail = 0;
        inner.size = 0;
    }
}
