//! Reusable outbound buffers
//!
//! The writer copies each request into a pooled fixed-size buffer before it
//! is queued. Buffers go back to the free list after the physical write,
//! whatever its outcome. Returned buffers are truncated, not zeroed.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::protocol::ProtocolError;

/// Capacity of every pooled buffer
pub const WRITE_BUFFER_SIZE: usize = 128;

/// Pooled outbound payload
pub struct WriteBuffer {
    data: Box<[u8; WRITE_BUFFER_SIZE]>,
    len: usize,
}

impl WriteBuffer {
    fn new() -> Self {
        Self {
            data: Box::new([0u8; WRITE_BUFFER_SIZE]),
            len: 0,
        }
    }

    /// Replace the contents with `payload`
    pub fn fill(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.len() > WRITE_BUFFER_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload.len(),
                capacity: WRITE_BUFFER_SIZE,
            });
        }
        self.data[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        Ok(())
    }

    /// Filled bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Number of filled bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is filled
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed buffer size
    pub fn capacity(&self) -> usize {
        WRITE_BUFFER_SIZE
    }
}

/// Free list of [`WriteBuffer`]s
pub struct WritePool {
    free: ArrayQueue<WriteBuffer>,
    in_use: AtomicUsize,
}

impl WritePool {
    /// Pool keeping at most `max_free` idle buffers
    pub fn new(max_free: usize) -> Self {
        Self {
            free: ArrayQueue::new(max_free.max(1)),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Take an idle buffer, allocating when none is free
    pub fn acquire(&self) -> WriteBuffer {
        self.in_use.fetch_add(1, Ordering::AcqRel);
        self.free.pop().unwrap_or_else(WriteBuffer::new)
    }

    /// Return a buffer; surplus beyond the free-list capacity is dropped
    pub fn release(&self, mut buffer: WriteBuffer) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        buffer.len = 0;
        let _ = self.free.push(buffer);
    }

    /// Buffers handed out and not yet released
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Idle buffers ready for reuse
    pub fn available(&self) -> usize {
        self.free.len()
    }
}
