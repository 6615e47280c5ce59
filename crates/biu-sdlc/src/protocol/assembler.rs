//! Frame assembler for accumulating partial reads.
//!
//! Serial reads arrive in arbitrary chunks. The assembler keeps them in a
//! fixed-capacity buffer and carves out one delimited frame per [`pop`]
//! call:
//! - bytes before the first start marker are garbage and dropped
//! - a byte directly after an unescaped escape marker is never a delimiter
//! - an unescaped start marker before the end marker restarts the frame
//!
//! Popped frames are still escaped; decode them with
//! [`FrameCodec`](super::FrameCodec).
//!
//! [`pop`]: FrameAssembler::pop

use super::{AssemblerError, END_MARKER, ESCAPE_MARKER, START_MARKER};

/// Default accumulation capacity
pub const DEFAULT_ASSEMBLER_CAPACITY: usize = 2048;

/// Accumulates incoming bytes and extracts complete frames.
pub struct FrameAssembler {
    buffer: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl FrameAssembler {
    /// Create an assembler with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ASSEMBLER_CAPACITY)
    }

    /// Create an assembler holding at most `capacity` pending bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Append raw bytes from the transport.
    ///
    /// Fails with [`AssemblerError::Overflow`] when the bytes do not fit even
    /// after compacting; pending data is left untouched in that case.
    pub fn push(&mut self, data: &[u8]) -> Result<(), AssemblerError> {
        let mut data = data;

        if self.is_empty() {
            match data.iter().position(|&b| b == START_MARKER) {
                Some(start) => data = &data[start..],
                None => {
                    self.reset();
                    return Ok(());
                }
            }
        }

        if self.tail_avail() < data.len() && self.total_avail() >= data.len() {
            self.compact();
        }

        if self.tail_avail() < data.len() {
            return Err(AssemblerError::Overflow {
                incoming: data.len(),
                available: self.total_avail(),
            });
        }

        self.buffer[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
        Ok(())
    }

    /// Remove and return the next complete raw frame, if any.
    pub fn pop(&mut self) -> Option<&[u8]> {
        let mut start: Option<usize> = None;
        let mut escaped = false;

        for n in self.read_pos..self.write_pos {
            let byte = self.buffer[n];

            if escaped {
                escaped = false;
                continue;
            }

            match byte {
                START_MARKER => {
                    start = Some(n);
                    self.read_pos = n;
                }
                END_MARKER if start.is_some() => {
                    let begin = self.read_pos;
                    self.read_pos = n + 1;
                    if self.read_pos >= self.write_pos {
                        self.reset();
                    }
                    return Some(&self.buffer[begin..=n]);
                }
                ESCAPE_MARKER if start.is_some() => escaped = true,
                _ => {
                    if start.is_none() {
                        // Garbage between frames
                        self.read_pos = n + 1;
                    }
                }
            }
        }

        if start.is_none() {
            self.reset();
        }
        None
    }

    /// Discard all pending bytes
    pub fn clear(&mut self) {
        self.reset();
    }

    /// Number of pending bytes
    pub fn len(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// True when no bytes are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total accumulation capacity
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn tail_avail(&self) -> usize {
        self.buffer.len() - self.write_pos
    }

    fn total_avail(&self) -> usize {
        self.tail_avail() + self.read_pos
    }

    fn compact(&mut self) {
        self.buffer.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
