//! Protocol errors

use thiserror::Error;

/// Errors raised while framing or unframing SDLC data.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Target buffer or escape area too small
    #[error("SDLC transform target overflow")]
    Overflow,

    /// First byte is not the start marker
    #[error("SDLC invalid start marker")]
    InvalidStartMarker,

    /// Last byte is not the end marker
    #[error("SDLC invalid end marker")]
    InvalidEndMarker,

    /// Too short to hold a frame
    #[error("SDLC invalid buffer")]
    InvalidBuffer,

    /// Transmitted CRC differs from the computed one
    #[error("SDLC CRC check failed: expected {expected:#06x}, got {actual:#06x}")]
    CrcCheck { expected: u16, actual: u16 },
}

/// Errors latched by a [`Cursor`](super::cursor::Cursor).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    /// Read past the limit
    #[error("buffer exhausted: needed {needed} bytes at offset {offset}, limit {limit}")]
    Exhausted {
        needed: usize,
        offset: usize,
        limit: usize,
    },

    /// Write past the end of the slice
    #[error("buffer overflow: needed {needed} bytes at offset {offset}, capacity {capacity}")]
    Overflow {
        needed: usize,
        offset: usize,
        capacity: usize,
    },
}

/// Errors raised by the [`FrameAssembler`](super::assembler::FrameAssembler).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerError {
    /// Incoming bytes do not fit the pending buffer
    #[error("frame assembler overflow: {incoming} incoming bytes, {available} available")]
    Overflow { incoming: usize, available: usize },
}

/// Errors that can occur during communication with the field device
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Write attempted without an open port
    #[error("Not connected to device")]
    NotConnected,

    /// Service not started, or already stopped
    #[error("SDLC service is not running")]
    ServiceNotRunning,

    /// Framing or integrity failure
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Payload shorter than the requested field
    #[error("Decode error: {0}")]
    Cursor(#[from] CursorError),

    /// Frame assembler overflow
    #[error("Assembler error: {0}")]
    Assembler(#[from] AssemblerError),

    /// Date/time broadcast with out-of-range fields
    #[error("Invalid date/time {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")]
    InvalidDateTime {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    },

    /// Hex string with odd length or non-hex digits
    #[error("Invalid hex input: {0}")]
    InvalidHex(String),

    /// Payload larger than a pooled write buffer
    #[error("Payload of {len} bytes exceeds write buffer capacity {capacity}")]
    PayloadTooLarge { len: usize, capacity: usize },

    /// Transport failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(err: serialport::Error) -> Self {
        ProtocolError::SerialError(err.to_string())
    }
}
