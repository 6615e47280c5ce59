//! SDLC message identifiers
//!
//! The identifier is the second byte of every decoded frame. Requests use
//! `0x10..=0x16`, responses `0x40..=0x46` and `0x4F`.

use std::fmt;

/// One-byte message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// 0x10
    StaticStatusRequest,
    /// 0x11, detector calls
    SendDetectData,
    /// 0x12
    ConfigBiuRequest,
    /// 0x13
    BiuDiagnosticRequest,
    /// 0x14
    SdlcDiagnosticRequest,
    /// 0x15
    DynamicStatusRequest,
    /// 0x16
    SiuDiagnosticRequest,
    /// 0x40
    StaticStatusResponse,
    /// 0x41, conflict monitor signal state
    CmuFrameStream,
    /// 0x42, controller clock broadcast
    DateTimeStream,
    /// 0x43
    BiuDiagnosticResponse,
    /// 0x44
    SdlcDiagnosticResponse,
    /// 0x45
    SiuDiagnosticResponse,
    /// 0x46
    DynamicStatusResponse,
    /// 0x4F
    Acknowledge,
    /// Byte outside the documented catalog
    Unknown(u8),
}

impl Identifier {
    /// Map a wire byte to an identifier
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x10 => Identifier::StaticStatusRequest,
            0x11 => Identifier::SendDetectData,
            0x12 => Identifier::ConfigBiuRequest,
            0x13 => Identifier::BiuDiagnosticRequest,
            0x14 => Identifier::SdlcDiagnosticRequest,
            0x15 => Identifier::DynamicStatusRequest,
            0x16 => Identifier::SiuDiagnosticRequest,
            0x40 => Identifier::StaticStatusResponse,
            0x41 => Identifier::CmuFrameStream,
            0x42 => Identifier::DateTimeStream,
            0x43 => Identifier::BiuDiagnosticResponse,
            0x44 => Identifier::SdlcDiagnosticResponse,
            0x45 => Identifier::SiuDiagnosticResponse,
            0x46 => Identifier::DynamicStatusResponse,
            0x4F => Identifier::Acknowledge,
            other => Identifier::Unknown(other),
        }
    }

    /// Wire byte of this identifier
    pub fn as_byte(self) -> u8 {
        match self {
            Identifier::StaticStatusRequest => 0x10,
            Identifier::SendDetectData => 0x11,
            Identifier::ConfigBiuRequest => 0x12,
            Identifier::BiuDiagnosticRequest => 0x13,
            Identifier::SdlcDiagnosticRequest => 0x14,
            Identifier::DynamicStatusRequest => 0x15,
            Identifier::SiuDiagnosticRequest => 0x16,
            Identifier::StaticStatusResponse => 0x40,
            Identifier::CmuFrameStream => 0x41,
            Identifier::DateTimeStream => 0x42,
            Identifier::BiuDiagnosticResponse => 0x43,
            Identifier::SdlcDiagnosticResponse => 0x44,
            Identifier::SiuDiagnosticResponse => 0x45,
            Identifier::DynamicStatusResponse => 0x46,
            Identifier::Acknowledge => 0x4F,
            Identifier::Unknown(byte) => byte,
        }
    }

    /// True for identifiers the host sends
    pub fn is_request(self) -> bool {
        matches!(self.as_byte(), 0x10..=0x16) && !self.is_unknown()
    }

    /// True for identifiers the device sends
    pub fn is_response(self) -> bool {
        !self.is_unknown() && !self.is_request()
    }

    /// Byte outside the catalog
    pub fn is_unknown(self) -> bool {
        matches!(self, Identifier::Unknown(_))
    }
}

impl From<u8> for Identifier {
    fn from(byte: u8) -> Self {
        Identifier::from_byte(byte)
    }
}

impl From<Identifier> for u8 {
    fn from(id: Identifier) -> Self {
        id.as_byte()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Identifier::StaticStatusRequest => "StaticStatusRequest",
            Identifier::SendDetectData => "SendDetectData",
            Identifier::ConfigBiuRequest => "ConfigBIURequest",
            Identifier::BiuDiagnosticRequest => "BIUDiagnosticRequest",
            Identifier::SdlcDiagnosticRequest => "SDLCDiagnosticRequest",
            Identifier::DynamicStatusRequest => "DynamicStatusRequest",
            Identifier::SiuDiagnosticRequest => "SIUDiagnosticRequest",
            Identifier::StaticStatusResponse => "StaticStatusResponse",
            Identifier::CmuFrameStream => "CMUFrameStream",
            Identifier::DateTimeStream => "DateTimeStream",
            Identifier::BiuDiagnosticResponse => "BIUDiagnosticResponse",
            Identifier::SdlcDiagnosticResponse => "SDLCDiagnosticResponse",
            Identifier::SiuDiagnosticResponse => "SIUDiagnosticResponse",
            Identifier::DynamicStatusResponse => "DynamicStatusResponse",
            Identifier::Acknowledge => "Acknowledge",
            Identifier::Unknown(byte) => return write!(f, "Unknown({:#04x})", byte),
        };
        f.write_str(name)
    }
}
