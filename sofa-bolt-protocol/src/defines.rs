//! Protocol enumerations and wire-level constants.
//!
//! All values here are part of the Bolt wire contract and must stay
//! bit-exact with the upstream SOFAStack definitions.

use std::fmt;

/// Bolt protocol versions. The version is the first byte of every frame.
///
/// V1 frames carry no `ver1` or `options` bytes; V2 frames carry both and
/// may end with a CRC32 trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolVersion {
    V1 = 1,
    V2 = 2,
}

impl ProtocolVersion {
    /// Maps a wire byte back to a version, `None` for anything unknown.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ProtocolVersion::V1),
            2 => Some(ProtocolVersion::V2),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The `type` byte of a frame header.
///
/// `Oneway` is defined by the protocol but this codec never emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderType {
    Response = 0,
    Request = 1,
    Oneway = 2,
}

/// The remoting command code.
///
/// `Heartbeat` is defined by the protocol but this codec never emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandCode {
    Heartbeat = 0,
    Request = 1,
    Response = 2,
}

/// Serialization tag carried in the `codec` byte. Only `Protobuf` is
/// supported here; `Hessian2` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecKind {
    Hessian2 = 1,
    Protobuf = 11,
}

/// The V2 `options` bitfield. V1 frames have no options byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolOptions(u8);

impl ProtocolOptions {
    /// A 4-byte CRC32 trailer follows the content.
    pub const CRC_CHECK: u8 = 0x01;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn with_crc_check(mut self) -> Self {
        self.0 |= Self::CRC_CHECK;
        self
    }

    pub fn has_crc_check(&self) -> bool {
        self.0 & Self::CRC_CHECK != 0
    }
}

/// Bolt response status codes.
///
/// The numbering jumps from 0x09 straight to 0x10; upstream defines the
/// values this way and servers send them verbatim, so the gap is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseStatus {
    Success = 0x00,
    Error = 0x01,
    ServerException = 0x02,
    Unknown = 0x03,
    ServerThreadpoolBusy = 0x04,
    ErrorComm = 0x05,
    NoProcessor = 0x06,
    Timeout = 0x07,
    ClientSendError = 0x08,
    CodecException = 0x09,
    ConnectionClosed = 0x10,
    ServerSerialException = 0x11,
    ServerDeserialException = 0x12,
}

impl ResponseStatus {
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            0x00 => Some(ResponseStatus::Success),
            0x01 => Some(ResponseStatus::Error),
            0x02 => Some(ResponseStatus::ServerException),
            0x03 => Some(ResponseStatus::Unknown),
            0x04 => Some(ResponseStatus::ServerThreadpoolBusy),
            0x05 => Some(ResponseStatus::ErrorComm),
            0x06 => Some(ResponseStatus::NoProcessor),
            0x07 => Some(ResponseStatus::Timeout),
            0x08 => Some(ResponseStatus::ClientSendError),
            0x09 => Some(ResponseStatus::CodecException),
            0x10 => Some(ResponseStatus::ConnectionClosed),
            0x11 => Some(ResponseStatus::ServerSerialException),
            0x12 => Some(ResponseStatus::ServerDeserialException),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Human-readable text used in failure messages.
    pub fn message(self) -> &'static str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Error => "error",
            ResponseStatus::ServerException => "server exception",
            ResponseStatus::Unknown => "unknown",
            ResponseStatus::ServerThreadpoolBusy => "server threadpool busy",
            ResponseStatus::ErrorComm => "communication error",
            ResponseStatus::NoProcessor => "no processor find",
            ResponseStatus::Timeout => "timeout",
            ResponseStatus::ClientSendError => "client send error",
            ResponseStatus::CodecException => "exception in encode or decode",
            ResponseStatus::ConnectionClosed => "connection closed",
            ResponseStatus::ServerSerialException => "server serialize exception",
            ResponseStatus::ServerDeserialException => "server deserialize exception",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_from_wire() {
        assert_eq!(ProtocolVersion::from_wire(1), Some(ProtocolVersion::V1));
        assert_eq!(ProtocolVersion::from_wire(2), Some(ProtocolVersion::V2));
        assert_eq!(ProtocolVersion::from_wire(0), None);
        assert_eq!(ProtocolVersion::from_wire(3), None);
    }

    #[test]
    fn test_status_values_are_bit_exact() {
        assert_eq!(ResponseStatus::Success.as_u16(), 0x00);
        assert_eq!(ResponseStatus::ClientSendError.as_u16(), 0x08);
        assert_eq!(ResponseStatus::CodecException.as_u16(), 0x09);
        // The numbering skips 0x0A..=0x0F.
        assert_eq!(ResponseStatus::ConnectionClosed.as_u16(), 0x10);
        assert_eq!(ResponseStatus::ServerSerialException.as_u16(), 0x11);
        assert_eq!(ResponseStatus::ServerDeserialException.as_u16(), 0x12);
    }

    #[test]
    fn test_status_gap_is_unassigned() {
        for value in 0x0Au16..=0x0F {
            assert_eq!(ResponseStatus::from_wire(value), None);
        }
        assert_eq!(
            ResponseStatus::from_wire(0x04),
            Some(ResponseStatus::ServerThreadpoolBusy)
        );
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(
            ResponseStatus::ServerThreadpoolBusy.message(),
            "server threadpool busy"
        );
        assert_eq!(ResponseStatus::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_protocol_options() {
        let options = ProtocolOptions::new();
        assert!(!options.has_crc_check());

        let options = options.with_crc_check();
        assert!(options.has_crc_check());
        assert_eq!(options.bits(), 0x01);

        assert!(ProtocolOptions::from_bits(0x01).has_crc_check());
        assert!(!ProtocolOptions::from_bits(0x02).has_crc_check());
    }

    #[test]
    fn test_wire_constants() {
        assert_eq!(HeaderType::Response as u8, 0);
        assert_eq!(HeaderType::Request as u8, 1);
        assert_eq!(HeaderType::Oneway as u8, 2);
        assert_eq!(CommandCode::Heartbeat as u16, 0);
        assert_eq!(CommandCode::Request as u16, 1);
        assert_eq!(CommandCode::Response as u16, 2);
        assert_eq!(CodecKind::Hessian2 as u8, 1);
        assert_eq!(CodecKind::Protobuf as u8, 11);
    }
}
