//! Response Decoder
//!
//! Decodes inbound frames into typed messages. A decoder owns one fixed
//! buffer that every [`ResponseDecoder::init`] reuses; getters read fields
//! sequentially from offset 2 (after start marker and identifier) and stop at
//! the CRC trailer, so a short payload surfaces as a cursor error instead of
//! reading checksum bytes as data.

use std::fmt;

use byteorder::{BigEndian, LittleEndian};
use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::codec::from_hex;
use super::{BiuFlags, Cursor, FrameCodec, Identifier, ProtocolError, StaticStatusMode};

/// Size of the decode buffer
pub const DECODE_BUFFER_SIZE: usize = 256;

/// Offset of the first payload byte in a decoded frame
const PAYLOAD_OFFSET: usize = 2;

/// Static status payload length when the mode byte is mapped
const MODE_MAPPED_LEN: usize = 14;

/// BIU firmware and mode report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticStatus {
    /// Installed BIUs
    pub biu: BiuFlags,
    /// Firmware major version
    pub major_version: u8,
    /// Firmware minor version
    pub minor_version: u8,
    /// Device serial number
    pub serial: u64,
    /// SDLC protocol revision
    pub protocol_version: u8,
    /// Controller mode family and operating state
    pub mode: StaticStatusMode,
    /// Set when the report carries the mapped-mode byte
    pub is_mode_mapped: bool,
}

impl Serialize for StaticStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("StaticStatus", 7)?;
        s.serialize_field("BIU", &self.biu.0)?;
        s.serialize_field("BIUMaskHO", &self.biu.to_string())?;
        s.serialize_field("MajorVersion", &self.major_version)?;
        s.serialize_field("MinorVersion", &self.minor_version)?;
        s.serialize_field("Serial", &format!("{:016x}", self.serial))?;
        s.serialize_field("ProtocolVersion", &self.protocol_version)?;
        s.serialize_field("Mode", &self.mode.to_string())?;
        s.end()
    }
}

/// BIU uptime and link health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DynamicStatus {
    /// Seconds since the last SDLC exchange
    pub since_last_comms: u32,
    /// Requests seen since the last report
    pub requested_count: u8,
    /// Whole days of uptime
    pub uptime_days: u8,
    /// Minutes of uptime within the current day
    pub uptime_in_6_min: u32,
    /// Fail-safe counter, present on 5 and 6 byte reports
    pub sdlc_fail_count: Option<u8>,
    /// UART failure counter, present on 6 byte reports
    pub uart_fail_count: Option<u8>,
    /// Set on 5 byte reports
    pub is_fail_safe_mapped: bool,
}

/// SDLC link error counters, already expanded with [`calc_count`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct SdlcDiagnostics {
    /// Frames shorter than the minimum
    pub short_frame_error: u32,
    /// Bad control field
    pub control_error: u32,
    /// Frame check failures
    pub crc_error: u32,
    /// Idle line errors
    pub idle_error: u32,
    /// UART framing errors
    pub framing_error: u32,
    /// Frames over the maximum length
    pub long_frame_error: u32,
}

/// BIU message counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct BiuDiagnostics {
    /// MMU load switch frames
    pub mmu_load_switch_counter: u8,
    /// Date/time broadcasts
    pub date_time_broadcast_counter: u8,
    /// One counter per BIU
    pub call_data_request_counter: [u8; 4],
    /// One counter per BIU
    pub reset_diagnostic_counter: [u8; 4],
    /// Service requests
    pub service_request_counter: u8,
    /// Reserved frame type
    pub reserved_counter: u8,
}

/// SIU message counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct SiuDiagnostics {
    /// Status requests
    pub status_counter: u8,
    /// Millisecond timer requests
    pub millisecond_counter: u8,
    /// Input configuration requests
    pub input_config_counter: u8,
    /// Raw input polls
    pub poll_raw_counter: u8,
    /// Filtered input polls
    pub poll_filtered_counter: u8,
    /// Transition buffer reads
    pub transition_buffer_counter: u8,
    /// Module identification requests
    pub module_id_counter: u8,
    /// Time and date requests
    pub time_date_counter: u8,
    /// Module description requests
    pub module_description_counter: u8,
}

/// Conflict monitor signal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmuFrame {
    /// Width selector for the three fields
    pub mode: StaticStatusMode,
    /// Green channel bits
    pub green: u32,
    /// Yellow channel bits
    pub yellow: u32,
    /// Red channel bits
    pub red: u32,
    /// 16 for TS2, 32 for ATC
    pub bit_width: u8,
}

impl fmt::Display for CmuFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode.is_ts2() {
            write!(
                f,
                "Mode: {}, Green: {:04x}, Yellow: {:04x}, Red: {:04x}",
                self.mode, self.green, self.yellow, self.red
            )
        } else {
            write!(
                f,
                "Mode: {}, Green: {:08x}, Yellow: {:08x}, Red: {:08x}",
                self.mode, self.green, self.yellow, self.red
            )
        }
    }
}

/// Expand a one-byte diagnostic counter.
///
/// Values up to 128 are exact; above that the counter is coarse,
/// `(raw - 127) * 128`.
pub fn calc_count(raw: u8) -> u32 {
    if raw < 129 {
        raw as u32
    } else {
        (raw as u32 - 127) * 128
    }
}

/// Decode responses into typed messages
pub struct ResponseDecoder {
    raw: [u8; DECODE_BUFFER_SIZE],
    len: usize,
}

impl ResponseDecoder {
    /// Empty decoder; call [`init`](Self::init) before any getter
    pub fn new() -> Self {
        Self {
            raw: [0u8; DECODE_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Unframe a raw (escaped) frame into the owned buffer
    pub fn init(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.len = 0;
        let decoded = FrameCodec::decode_into(frame, &mut self.raw)?;
        self.len = decoded.len();
        Ok(())
    }

    /// Unframe a frame given as a hex string
    pub fn init_from_hex(&mut self, hex: &str) -> Result<(), ProtocolError> {
        let frame = from_hex(hex).ok_or_else(|| ProtocolError::InvalidHex(hex.to_string()))?;
        self.init(&frame)
    }

    /// Decoded frame including markers and CRC
    pub fn frame(&self) -> &[u8] {
        &self.raw[..self.len]
    }

    /// Payload length of the decoded frame
    pub fn data_len(&self) -> usize {
        FrameCodec::data_len(self.frame())
    }

    /// Identifier of the current frame
    pub fn identifier(&self) -> Identifier {
        Identifier::from_byte(self.frame().get(1).copied().unwrap_or(0))
    }

    fn payload(&self) -> Cursor<&[u8]> {
        let limit = PAYLOAD_OFFSET + self.data_len();
        Cursor::reader(self.frame(), PAYLOAD_OFFSET, limit)
    }

    /// Decode a StaticStatus response
    pub fn static_status(&self) -> Result<StaticStatus, ProtocolError> {
        let mut cur = self.payload();
        let status = StaticStatus {
            biu: BiuFlags(cur.read_u8()),
            major_version: cur.read_u8(),
            minor_version: cur.read_u8(),
            serial: cur.read_u64::<LittleEndian>(),
            protocol_version: cur.read_u8(),
            mode: StaticStatusMode(cur.read_u8()),
            is_mode_mapped: self.data_len() == MODE_MAPPED_LEN,
        };
        cur.finish()?;
        Ok(status)
    }

    /// Trailing counters are keyed on payload length as the device firmware reports them:
    /// 5 bytes carry the fail-safe counter, 6 bytes add the UART counter.
    pub fn dynamic_status(&self) -> Result<DynamicStatus, ProtocolError> {
        let mut cur = self.payload();
        let mut status = DynamicStatus {
            since_last_comms: cur.read_u8() as u32 * 10,
            requested_count: cur.read_u8(),
            uptime_days: cur.read_u8(),
            uptime_in_6_min: cur.read_u8() as u32 * 6,
            ..Default::default()
        };

        match self.data_len() {
            5 => {
                status.sdlc_fail_count = Some(cur.read_u8());
                status.is_fail_safe_mapped = true;
            }
            6 => {
                status.sdlc_fail_count = Some(cur.read_u8());
                status.uart_fail_count = Some(cur.read_u8());
            }
            _ => {}
        }

        cur.finish()?;
        Ok(status)
    }

    /// Decode an SDLC diagnostics response
    pub fn sdlc_diagnostics(&self) -> Result<SdlcDiagnostics, ProtocolError> {
        let mut cur = self.payload();
        let diag = SdlcDiagnostics {
            short_frame_error: calc_count(cur.read_u8()),
            control_error: calc_count(cur.read_u8()),
            crc_error: calc_count(cur.read_u8()),
            idle_error: calc_count(cur.read_u8()),
            framing_error: calc_count(cur.read_u8()),
            long_frame_error: calc_count(cur.read_u8()),
        };
        cur.finish()?;
        Ok(diag)
    }

    /// Decode a BIU diagnostics response
    pub fn biu_diagnostics(&self) -> Result<BiuDiagnostics, ProtocolError> {
        let mut cur = self.payload();
        let mut diag = BiuDiagnostics {
            mmu_load_switch_counter: cur.read_u8(),
            date_time_broadcast_counter: cur.read_u8(),
            ..Default::default()
        };
        for counter in diag.call_data_request_counter.iter_mut() {
            *counter = cur.read_u8();
        }
        for counter in diag.reset_diagnostic_counter.iter_mut() {
            *counter = cur.read_u8();
        }
        diag.service_request_counter = cur.read_u8();
        diag.reserved_counter = cur.read_u8();

        cur.finish()?;
        Ok(diag)
    }

    /// Decode an SIU diagnostics response
    pub fn siu_diagnostics(&self) -> Result<SiuDiagnostics, ProtocolError> {
        let mut cur = self.payload();
        let diag = SiuDiagnostics {
            status_counter: cur.read_u8(),
            millisecond_counter: cur.read_u8(),
            input_config_counter: cur.read_u8(),
            poll_raw_counter: cur.read_u8(),
            poll_filtered_counter: cur.read_u8(),
            transition_buffer_counter: cur.read_u8(),
            module_id_counter: cur.read_u8(),
            time_date_counter: cur.read_u8(),
            module_description_counter: cur.read_u8(),
        };
        cur.finish()?;
        Ok(diag)
    }

    /// TS2 frames carry 16-bit signal fields, ATC frames 32-bit ones
    pub fn cmu_frame(&self) -> Result<CmuFrame, ProtocolError> {
        let mut cur = self.payload();
        let mode = StaticStatusMode(cur.read_u8());

        let frame = if mode.is_ts2() {
            CmuFrame {
                mode,
                green: cur.read_u16::<BigEndian>() as u32,
                yellow: cur.read_u16::<BigEndian>() as u32,
                red: cur.read_u16::<BigEndian>() as u32,
                bit_width: 16,
            }
        } else {
            CmuFrame {
                mode,
                green: cur.read_u32::<BigEndian>(),
                yellow: cur.read_u32::<BigEndian>(),
                red: cur.read_u32::<BigEndian>(),
                bit_width: 32,
            }
        };

        cur.finish()?;
        Ok(frame)
    }

    /// Decode a date/time broadcast.
    ///
    /// Fails with `InvalidDateTime` when the fields do not form a calendar date.
    pub fn date_time(&self) -> Result<NaiveDateTime, ProtocolError> {
        let mut cur = self.payload();
        let year = 2000 + cur.read_u8() as i32;
        let month = cur.read_u8() as u32;
        let day = cur.read_u8() as u32;
        let hour = cur.read_u8() as u32;
        let minute = cur.read_u8() as u32;
        let second = cur.read_u8() as u32;
        cur.finish()?;

        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or(ProtocolError::InvalidDateTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
            })
    }

    /// Status byte of an acknowledge
    pub fn acknowledge(&self) -> Result<u8, ProtocolError> {
        let mut cur = self.payload();
        let ack = cur.read_u8();
        cur.finish()?;
        Ok(ack)
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}
