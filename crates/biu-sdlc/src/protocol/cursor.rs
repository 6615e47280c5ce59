//! Bounds-checked cursor over a fixed byte slice
//!
//! Every read or write names its byte order explicitly. The first failure is
//! latched: later operations become no-ops (reads yield zero) and the error is
//! surfaced once through [`Cursor::finish`], so decoders can read a whole
//! record and check a single result at the end.

use byteorder::ByteOrder;

use super::CursorError;

/// Read/write cursor over a borrowed or owned byte buffer
#[derive(Debug)]
pub struct Cursor<B> {
    buf: B,
    read_pos: usize,
    write_pos: usize,
    limit: usize,
    err: Option<CursorError>,
}

impl<B: AsRef<[u8]>> Cursor<B> {
    /// Cursor reading the whole buffer from offset 0
    pub fn new(buf: B) -> Self {
        let limit = buf.as_ref().len();
        Self::reader(buf, 0, limit)
    }

    /// Cursor reading `buf[start..limit]`
    ///
    /// `limit` is clamped to the buffer length.
    pub fn reader(buf: B, start: usize, limit: usize) -> Self {
        let limit = limit.min(buf.as_ref().len());
        Self {
            buf,
            read_pos: start,
            write_pos: 0,
            limit,
            err: None,
        }
    }

    /// Current read offset
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Bytes left before the read limit
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.read_pos)
    }

    /// First latched error, if any
    pub fn error(&self) -> Option<CursorError> {
        self.err
    }

    /// Surface the latched error
    pub fn finish(&self) -> Result<(), CursorError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn latch(&mut self, err: CursorError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn take(&mut self, needed: usize) -> Option<&[u8]> {
        if self.err.is_some() {
            return None;
        }
        let end = self.read_pos + needed;
        if end > self.limit {
            self.latch(CursorError::Exhausted {
                needed,
                offset: self.read_pos,
                limit: self.limit,
            });
            return None;
        }
        let start = self.read_pos;
        self.read_pos = end;
        Some(&self.buf.as_ref()[start..end])
    }

    /// Next byte, or 0 once exhausted
    pub fn read_u8(&mut self) -> u8 {
        self.take(1).map(|s| s[0]).unwrap_or(0)
    }

    /// Next two bytes in order `E`
    pub fn read_u16<E: ByteOrder>(&mut self) -> u16 {
        self.take(2).map(E::read_u16).unwrap_or(0)
    }

    /// Next four bytes in order `E`
    pub fn read_u32<E: ByteOrder>(&mut self) -> u32 {
        self.take(4).map(E::read_u32).unwrap_or(0)
    }

    /// Next eight bytes in order `E`
    pub fn read_u64<E: ByteOrder>(&mut self) -> u64 {
        self.take(8).map(E::read_u64).unwrap_or(0)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Cursor<B> {
    /// Cursor writing into `buf` from offset 0
    pub fn writer(buf: B) -> Self {
        Self::reader(buf, 0, 0)
    }

    /// Current write offset (number of bytes written)
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Underlying buffer, including the unwritten tail
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    fn reserve(&mut self, needed: usize) -> Option<&mut [u8]> {
        if self.err.is_some() {
            return None;
        }
        let capacity = self.buf.as_ref().len();
        let end = self.write_pos + needed;
        if end > capacity {
            self.latch(CursorError::Overflow {
                needed,
                offset: self.write_pos,
                capacity,
            });
            return None;
        }
        let start = self.write_pos;
        self.write_pos = end;
        self.limit = self.limit.max(end);
        Some(&mut self.buf.as_mut()[start..end])
    }

    /// Append one byte
    pub fn write_u8(&mut self, value: u8) {
        if let Some(s) = self.reserve(1) {
            s[0] = value;
        }
    }

    /// Append two bytes in order `E`
    pub fn write_u16<E: ByteOrder>(&mut self, value: u16) {
        if let Some(s) = self.reserve(2) {
            E::write_u16(s, value);
        }
    }

    /// Append four bytes in order `E`
    pub fn write_u32<E: ByteOrder>(&mut self, value: u32) {
        if let Some(s) = self.reserve(4) {
            E::write_u32(s, value);
        }
    }

    /// Append eight bytes in order `E`
    pub fn write_u64<E: ByteOrder>(&mut self, value: u64) {
        if let Some(s) = self.reserve(8) {
            E::write_u64(s, value);
        }
    }

    /// Append a slice verbatim
    pub fn write_bytes(&mut self, data: &[u8]) {
        if let Some(s) = self.reserve(data.len()) {
            s.copy_from_slice(data);
        }
    }
}
