//! Request Encoder
//!
//! Builds outbound command frames over a reusable scratch buffer.
//!
//! | Request            | Identifier | Payload                          |
//! |--------------------|------------|----------------------------------|
//! | static status      | 0x10       | none                             |
//! | TS2 detect         | 0x11       | u64 little-endian, 2 bytes/BIU   |
//! | config BIU         | 0x12       | length byte `0x01`, flags byte   |
//! | BIU diagnostics    | 0x13       | reset byte                       |
//! | SDLC diagnostics   | 0x14       | reset byte                       |
//! | dynamic status     | 0x15       | none                             |
//! | SIU diagnostics    | 0x16       | reset byte                       |

use byteorder::LittleEndian;

use super::{Cursor, FrameCodec, Identifier, ProtocolError, START_MARKER};

/// Scratch size; the largest request escapes to well under this
const SCRATCH_SIZE: usize = 64;

/// Build request frames
pub struct RequestEncoder {
    buffer: [u8; SCRATCH_SIZE],
}

impl RequestEncoder {
    /// Encoder with a zeroed scratch buffer
    pub fn new() -> Self {
        Self {
            buffer: [0u8; SCRATCH_SIZE],
        }
    }

    /// Identifier of the last encoded request
    pub fn identifier(&self) -> Identifier {
        Identifier::from_byte(self.buffer[1])
    }

    /// Request the BIU static status
    pub fn static_status(&mut self) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::StaticStatusRequest, |_| {})
    }

    /// Send detector calls to the BIUs.
    ///
    /// Bytes 0..=1 carry BIU 1, 2..=3 BIU 2, 4..=5 BIU 3, 6..=7 BIU 4.
    pub fn ts2_detect(&mut self, detects: u64) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::SendDetectData, |cur| {
            cur.write_u64::<LittleEndian>(detects)
        })
    }

    /// Enable the BIUs set in `flags`
    pub fn config_biu(&mut self, flags: u8) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::ConfigBiuRequest, |cur| {
            cur.write_u8(0x01);
            cur.write_u8(flags);
        })
    }

    /// Request BIU counters; a non-zero `reset` clears them
    pub fn biu_diagnostics(&mut self, reset: u8) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::BiuDiagnosticRequest, |cur| cur.write_u8(reset))
    }

    /// Request SDLC link counters; a non-zero `reset` clears them
    pub fn sdlc_diagnostics(&mut self, reset: u8) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::SdlcDiagnosticRequest, |cur| cur.write_u8(reset))
    }

    /// Request uptime and link health
    pub fn dynamic_status(&mut self) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::DynamicStatusRequest, |_| {})
    }

    /// Request SIU counters; a non-zero `reset` clears them
    pub fn siu_diagnostics(&mut self, reset: u8) -> Result<&[u8], ProtocolError> {
        self.build(Identifier::SiuDiagnosticRequest, |cur| cur.write_u8(reset))
    }

    fn build<F>(&mut self, id: Identifier, payload: F) -> Result<&[u8], ProtocolError>
    where
        F: FnOnce(&mut Cursor<&mut [u8]>),
    {
        let mut cur = Cursor::writer(&mut self.buffer[..]);
        cur.write_u8(START_MARKER);
        cur.write_u8(id.as_byte());
        payload(&mut cur);
        cur.finish()?;

        let len = cur.write_pos();
        Ok(FrameCodec::encode(&mut self.buffer, len)?)
    }
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::to_hex;

    #[test]
    fn test_ts2_detect() {
        let mut encoder = RequestEncoder::new();

        let cases = [
            (7u64, "0211070000000000000067b703"),
            (127000, "021118f0010000000000e9f903"),
            (u64::MAX, "0211ffffffffffffffff064e03"),
            (0, "02110000000000000000a0af03"),
            (3, "02117d230000000000000068da03"),
        ];

        for (detects, expected) in cases {
            let frame = encoder.ts2_detect(detects).expect("Should encode");
            assert_eq!(to_hex(frame), expected);
        }
        assert_eq!(encoder.identifier(), Identifier::SendDetectData);
    }

    #[test]
    fn test_catalog() {
        let mut encoder = RequestEncoder::new();

        assert_eq!(to_hex(encoder.static_status().unwrap()), "0210f3c103");
        assert_eq!(encoder.identifier(), Identifier::StaticStatusRequest);

        assert_eq!(to_hex(encoder.dynamic_status().unwrap()), "0215a36403");
        assert_eq!(to_hex(encoder.config_biu(0x05).unwrap()), "02120105820b03");
        assert_eq!(encoder.identifier(), Identifier::ConfigBiuRequest);

        assert_eq!(to_hex(encoder.biu_diagnostics(0).unwrap()), "0213004b2f03");
        assert_eq!(to_hex(encoder.sdlc_diagnostics(0).unwrap()), "021400d2b803");
        assert_eq!(to_hex(encoder.siu_diagnostics(0).unwrap()), "021600b4da03");
    }

    #[test]
    fn test_encoded_requests_decode() {
        let mut encoder = RequestEncoder::new();
        let mut wire = encoder.config_biu(0x0F).unwrap().to_vec();

        let decoded = FrameCodec::decode(&mut wire).unwrap();
        assert_eq!(decoded[1], 0x12);
        assert_eq!(&decoded[2..4], &[0x01, 0x0F]);
        assert_eq!(FrameCodec::data_len(decoded), 2);
    }
}
