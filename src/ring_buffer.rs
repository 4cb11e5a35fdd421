//! Fixed-capacity ring buffers.
//!
//! Three flavours live here:
//!
//! - [`RingBuffer`]: element queue with a runtime capacity bounded by the
//!   compile-time slot count `N`.
//! - [`SharedRing`]: a `RingBuffer` behind an `embassy-sync` blocking mutex so a
//!   network callback and the polling task can share it.
//! - [`ByteRing`]: the chunked variant used for streamed downloads, where
//!   writes and reads move as many bytes as fit.
//!
//! Every queue rejects new writes once full. Nothing is ever overwritten, so a
//! producer must check [`RingBuffer::has_space`] or handle the returned element.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::error::QueueError;

/// A FIFO queue over `N` inline slots.
///
/// `head` and `tail` advance modulo the active capacity; `write_count` and
/// `read_count` are free-running so `available = write_count - read_count`
/// holds across wrap-around.
pub struct RingBuffer<T, const N: usize> {
    slots: [Option<T>; N],
    capacity: usize,
    head: usize,
    tail: usize,
    write_count: u32,
    read_count: u32,
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Creates a queue using all `N` slots.
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
            capacity: N,
            head: 0,
            tail: 0,
            write_count: 0,
            read_count: 0,
        }
    }

    /// Creates a queue limited to `capacity` slots.
    ///
    /// Fails if `capacity` is zero or larger than `N`; callers treat that as a
    /// misconfiguration.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        let mut rb = Self::new();
        rb.set_capacity(capacity)?;
        Ok(rb)
    }

    /// Changes the active capacity of an empty queue.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), QueueError> {
        if capacity == 0 || capacity > N {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        if !self.is_empty() {
            return Err(QueueError::NotEmpty);
        }
        self.capacity = capacity;
        self.head = 0;
        self.tail = 0;
        Ok(())
    }

    /// Appends an element, handing it back if the queue is full.
    pub fn write(&mut self, item: T) -> Result<(), T> {
        if self.has_space() == 0 {
            return Err(item);
        }
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.capacity;
        self.write_count = self.write_count.wrapping_add(1);
        Ok(())
    }

    /// Removes and returns the oldest element.
    pub fn read(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.tail].take();
        self.tail = (self.tail + 1) % self.capacity;
        self.read_count = self.read_count.wrapping_add(1);
        item
    }

    /// Returns the oldest element without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.tail].as_ref()
    }

    /// Number of unread elements.
    pub fn available(&self) -> usize {
        self.write_count.wrapping_sub(self.read_count) as usize
    }

    /// Number of elements that can still be written.
    pub fn has_space(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Active capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every unread element and resets the cursors. Storage is kept.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.write_count = 0;
        self.read_count = 0;
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`RingBuffer`] shared between execution contexts.
///
/// Each operation takes the mutex for the duration of a single copy in or out,
/// never across an await point. With `CriticalSectionRawMutex` this is safe to
/// call from an interrupt or from another executor's task.
pub struct SharedRing<M: RawMutex, T, const N: usize> {
    inner: Mutex<M, RefCell<RingBuffer<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> SharedRing<M, T, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(RingBuffer::new())),
        }
    }

    /// See [`RingBuffer::set_capacity`].
    pub fn set_capacity(&self, capacity: usize) -> Result<(), QueueError> {
        self.inner.lock(|rb| rb.borrow_mut().set_capacity(capacity))
    }

    /// See [`RingBuffer::write`].
    pub fn write(&self, item: T) -> Result<(), T> {
        self.inner.lock(|rb| rb.borrow_mut().write(item))
    }

    /// See [`RingBuffer::read`].
    pub fn read(&self) -> Option<T> {
        self.inner.lock(|rb| rb.borrow_mut().read())
    }

    pub fn available(&self) -> usize {
        self.inner.lock(|rb| rb.borrow().available())
    }

    pub fn has_space(&self) -> usize {
        self.inner.lock(|rb| rb.borrow().has_space())
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock(|rb| rb.borrow().capacity())
    }

    pub fn clear(&self) {
        self.inner.lock(|rb| rb.borrow_mut().clear())
    }
}

impl<M: RawMutex, T, const N: usize> Default for SharedRing<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunked byte ring used to stream data of arbitrary length.
///
/// Unlike [`RingBuffer`], a write may be partial: it stores as many bytes as
/// fit and reports how many were taken.
pub struct ByteRing<const N: usize> {
    buf: [u8; N],
    head: usize,
    tail: usize,
    len: usize,
}

impl<const N: usize> ByteRing<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Copies up to `data.len()` bytes in and returns the number written.
    pub fn write_chunk(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.has_space());
        for &byte in &data[..count] {
            self.buf[self.head] = byte;
            self.head = (self.head + 1) % N;
        }
        self.len += count;
        count
    }

    /// Copies up to `out.len()` bytes out and returns the number read.
    pub fn read_chunk(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        for slot in &mut out[..count] {
            *slot = self.buf[self.tail];
            self.tail = (self.tail + 1) % N;
        }
        self.len -= count;
        count
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        self.len
    }

    /// Number of bytes that can still be written.
    pub fn has_space(&self) -> usize {
        N - self.len
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
