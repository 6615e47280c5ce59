//! SDLC Serial Protocol
//!
//! Byte-stuffed, CRC16-protected framing used between the host and the
//! BIU/SIU and CMU field devices.
//!
//! ```text
//! [0x02] [identifier] [payload ...] [crc hi] [crc lo] [0x03]
//! ```
//!
//! Any `0x02`, `0x03` or `0x7D` between the markers is sent as
//! `0x7D, byte ^ 0x20`.

mod assembler;
pub mod biu;
pub mod codec;
mod connection;
pub mod cursor;
mod error;
pub mod identifier;
pub mod request;
pub mod response;
mod retry;
pub mod serial;
mod stream;

pub use assembler::{FrameAssembler, DEFAULT_ASSEMBLER_CAPACITY};
pub use biu::{BiuFlags, BiuMask, StaticStatusMode};
pub use codec::{from_hex, to_hex, FrameCodec};
pub(crate) use connection::lock;
pub use connection::{ConnectionEvents, ConnectionState, NoopConnectionEvents, SerialConnection};
pub use cursor::Cursor;
pub use error::{AssemblerError, CodecError, CursorError, ProtocolError};
pub use identifier::Identifier;
pub use request::RequestEncoder;
pub use response::{
    calc_count, BiuDiagnostics, CmuFrame, DynamicStatus, ResponseDecoder, SdlcDiagnostics,
    SiuDiagnostics, StaticStatus,
};
pub use retry::{RetryGuard, DEFAULT_RETRY_EVERY};
pub use serial::{configure_port, open_port};
pub use stream::{PortOpener, SerialPortStream, SerialStream, SystemPortOpener};

/// Frame start delimiter
pub const START_MARKER: u8 = 0x02;

/// Frame end delimiter
pub const END_MARKER: u8 = 0x03;

/// Precedes an escaped byte
pub const ESCAPE_MARKER: u8 = 0x7D;

/// XORed into an escaped byte
pub const ESCAPE_MASK: u8 = 0x20;

/// Default baud rate for the device link
pub const DEFAULT_BAUD_RATE: u32 = 115200;
