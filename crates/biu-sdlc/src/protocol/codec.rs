//! Frame encoding/decoding
//!
//! Implements the byte-stuffed SDLC frame with a CRC16 trailer.
//!
//! Frame format (before escaping):
//! - 1 byte: start marker (0x02)
//! - 1 byte: identifier
//! - N bytes: payload
//! - 2 bytes: CRC16 CCITT-FALSE of identifier + payload (big-endian)
//! - 1 byte: end marker (0x03)
//!
//! Every start, end or escape byte between the markers is sent as
//! `0x7D, byte ^ 0x20`. The codec works on caller-provided buffers and never
//! allocates: decoding only shrinks, encoding needs spare capacity for the CRC,
//! the escapes and the end marker.

use byteorder::{BigEndian, ByteOrder};
use crc::{Crc, CRC_16_IBM_3740};

use super::{CodecError, END_MARKER, ESCAPE_MARKER, ESCAPE_MASK, START_MARKER};

/// CRC16 CCITT-FALSE (poly 0x1021, init 0xFFFF)
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Size of the escape working area
const ESCAPE_AREA: usize = 256;

/// Start marker + identifier + CRC + end marker
const FRAME_OVERHEAD: usize = 5;

/// Stateless SDLC frame codec
pub struct FrameCodec;

impl FrameCodec {
    /// Frame the payload held in `buffer[1..len]`.
    ///
    /// `buffer[0]` is reserved for the start marker. Returns the escaped frame
    /// as a prefix of `buffer`.
    pub fn encode(buffer: &mut [u8], len: usize) -> Result<&[u8], CodecError> {
        if len == 0 {
            return Err(CodecError::InvalidBuffer);
        }

        // CRC must fit with room to spare for the end marker
        if len + 2 >= buffer.len() {
            return Err(CodecError::Overflow);
        }

        let crc = CRC16.checksum(&buffer[1..len]);
        BigEndian::write_u16(&mut buffer[len..len + 2], crc);

        let mut area = [0u8; ESCAPE_AREA];
        let escaped = Self::escape(&buffer[1..len + 2], &mut area)?;

        if escaped + 2 > buffer.len() {
            return Err(CodecError::Overflow);
        }

        buffer[1..1 + escaped].copy_from_slice(&area[..escaped]);
        buffer[0] = START_MARKER;
        buffer[1 + escaped] = END_MARKER;
        Ok(&buffer[..escaped + 2])
    }

    /// Decode a frame in place.
    ///
    /// The decoded frame `[start, id, payload.., crc_hi, crc_lo, end]` is a
    /// prefix of `buffer`; unescaping never grows the data.
    pub fn decode(buffer: &mut [u8]) -> Result<&[u8], CodecError> {
        Self::check_markers(buffer)?;

        let last = buffer.len() - 1;
        let mut target = 1;
        let mut escaped = false;

        for source in 1..last {
            let byte = buffer[source];
            if escaped {
                buffer[target] = byte ^ ESCAPE_MASK;
                target += 1;
                escaped = false;
            } else if byte == ESCAPE_MARKER {
                escaped = true;
            } else {
                buffer[target] = byte;
                target += 1;
            }
        }

        buffer[target] = END_MARKER;
        let decoded = &buffer[..target + 1];
        Self::check_crc(decoded)?;
        Ok(decoded)
    }

    /// Decode `source` into `target`, leaving `source` untouched.
    pub fn decode_into<'a>(source: &[u8], target: &'a mut [u8]) -> Result<&'a [u8], CodecError> {
        Self::check_markers(source)?;

        let mut len = 0;
        let mut escaped = false;

        for &byte in source {
            if len >= target.len() {
                return Err(CodecError::Overflow);
            }

            if escaped {
                target[len] = byte ^ ESCAPE_MASK;
                len += 1;
                escaped = false;
            } else if byte == ESCAPE_MARKER {
                escaped = true;
            } else {
                target[len] = byte;
                len += 1;
            }
        }

        let decoded = &target[..len];
        Self::check_crc(decoded)?;
        Ok(decoded)
    }

    /// Payload length of a decoded frame
    pub fn data_len(decoded: &[u8]) -> usize {
        decoded.len().saturating_sub(FRAME_OVERHEAD)
    }

    /// CRC computed over identifier + payload of a decoded frame
    pub fn calc_crc(decoded: &[u8]) -> u16 {
        CRC16.checksum(&decoded[1..decoded.len() - 3])
    }

    /// CRC carried in the trailer of a decoded frame
    pub fn frame_crc(decoded: &[u8]) -> u16 {
        let off = decoded.len() - 3;
        BigEndian::read_u16(&decoded[off..off + 2])
    }

    /// Verify the CRC trailer of a decoded frame
    pub fn check_crc(decoded: &[u8]) -> Result<(), CodecError> {
        // A trailing escape can swallow the end marker and shrink the frame
        if decoded.len() < 4 {
            return Err(CodecError::InvalidBuffer);
        }

        let expected = Self::calc_crc(decoded);
        let actual = Self::frame_crc(decoded);
        if expected != actual {
            return Err(CodecError::CrcCheck { expected, actual });
        }
        Ok(())
    }

    /// True for bytes that must be escaped on the wire
    pub fn is_delimiter(byte: u8) -> bool {
        byte == START_MARKER || byte == END_MARKER || byte == ESCAPE_MARKER
    }

    fn check_markers(buffer: &[u8]) -> Result<(), CodecError> {
        if buffer.len() <= FRAME_OVERHEAD {
            return Err(CodecError::InvalidBuffer);
        }
        if buffer[0] != START_MARKER {
            return Err(CodecError::InvalidStartMarker);
        }
        if buffer[buffer.len() - 1] != END_MARKER {
            return Err(CodecError::InvalidEndMarker);
        }
        Ok(())
    }

    fn escape(source: &[u8], target: &mut [u8; ESCAPE_AREA]) -> Result<usize, CodecError> {
        let mut len = 0;

        for &byte in source {
            if Self::is_delimiter(byte) {
                if len + 2 > ESCAPE_AREA {
                    return Err(CodecError::Overflow);
                }
                target[len] = ESCAPE_MARKER;
                target[len + 1] = byte ^ ESCAPE_MASK;
                len += 2;
            } else {
                if len + 1 > ESCAPE_AREA {
                    return Err(CodecError::Overflow);
                }
                target[len] = byte;
                len += 1;
            }
        }

        Ok(len)
    }
}

/// Lowercase hex rendering used for logs and audit records
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse a hex string (optional `0x` prefix, any case)
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }

    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
