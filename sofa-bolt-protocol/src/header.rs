//! Frame header records and the version-dispatched accessor layer.
//!
//! Wire layout is never read by reinterpreting raw bytes as a struct:
//! every field is copied explicitly at its wire offset, big-endian, so
//! the records stay correct regardless of how the compiler lays them
//! out in memory. Extraction doubles as the network-to-host conversion
//! and happens exactly once per header.

use bytes::{BufMut, BytesMut};

use crate::defines::{
    CodecKind, CommandCode, HeaderType, ProtocolOptions, ProtocolVersion, ResponseStatus,
};

/// Exact wire size of a packed V1 response header.
pub const RESPONSE_HEADER_V1_SIZE: usize = 20;
/// Exact wire size of a packed V2 response header.
pub const RESPONSE_HEADER_V2_SIZE: usize = 22;
/// Exact wire size of a packed V1 request header.
pub const REQUEST_HEADER_V1_SIZE: usize = 22;
/// Exact wire size of a packed V2 request header.
pub const REQUEST_HEADER_V2_SIZE: usize = 24;

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Type-level description of a header record.
pub trait HeaderSpec {
    const VERSION: ProtocolVersion;
    const KIND: HeaderType;
    /// Number of bytes the packed record occupies on the wire.
    const PACKED_SIZE: usize;
}

/// Write side: builds a request header field-by-field, then packs it in
/// wire order. Setters for fields a version does not carry are no-ops,
/// so the packing pipeline stays version-agnostic above this layer.
pub trait RequestHeader: HeaderSpec + Default {
    fn set_proto(&mut self, version: ProtocolVersion);
    /// V2 only; ignored on V1.
    fn set_ver1(&mut self, _version: ProtocolVersion) {}
    fn set_header_type(&mut self, header_type: HeaderType);
    fn set_cmd_code(&mut self, cmd_code: CommandCode);
    fn set_request_id(&mut self, request_id: u32);
    fn set_codec(&mut self, codec: CodecKind);
    /// V2 only; ignored on V1.
    fn enable_crc_check(&mut self) {}
    fn crc_check_enabled(&self) -> bool {
        false
    }
    fn set_timeout(&mut self, timeout_ms: u32);
    fn set_class_len(&mut self, len: u16);
    fn set_header_len(&mut self, len: u16);
    fn set_content_len(&mut self, len: u32);

    /// Appends the packed record to `out` in wire order, all multi-byte
    /// fields in network byte order.
    fn pack_into(&self, out: &mut BytesMut);
}

/// Read side: a response header extracted from the wire, plus the
/// validation predicates the processor runs against it.
pub trait ResponseHeader: HeaderSpec + Sized {
    /// Offset of the `options` byte inside the packed record, `None`
    /// for versions without one.
    const OPTIONS_OFFSET: Option<usize>;
    const CLASS_LEN_OFFSET: usize;
    const HEADER_LEN_OFFSET: usize;
    const CONTENT_LEN_OFFSET: usize;

    /// Reads the record from the first `PACKED_SIZE` bytes of `meta`.
    /// The caller must have verified `meta` is long enough.
    fn extract(meta: &[u8]) -> Self;

    fn proto(&self) -> u8;
    /// 0 on V1.
    fn ver1(&self) -> u8 {
        0
    }
    fn header_type(&self) -> u8;
    fn cmd_code(&self) -> u16;
    fn ver2(&self) -> u8;
    fn request_id(&self) -> u32;
    fn codec(&self) -> u8;
    /// 0 on V1.
    fn options(&self) -> u8 {
        0
    }
    fn resp_status(&self) -> u16;
    fn class_len(&self) -> u16;
    fn header_len(&self) -> u16;
    fn content_len(&self) -> u32;

    /// V1: trivially true. V2: `proto` must equal `ver1`; newer protocol
    /// revisions keep `proto` and bump `ver1`.
    fn check_ver1(&self) -> bool {
        true
    }

    /// `ver2` is unused by the protocol and must be 0.
    fn check_ver2(&self) -> bool {
        self.ver2() == 0
    }

    fn check_header_type(&self, header_type: HeaderType) -> bool {
        self.header_type() == header_type as u8
    }

    fn check_cmd_code(&self, cmd_code: CommandCode) -> bool {
        self.cmd_code() == cmd_code as u16
    }

    fn check_codec(&self, codec: CodecKind) -> bool {
        self.codec() == codec as u8
    }

    fn check_response_status(&self, status: ResponseStatus) -> bool {
        self.resp_status() == status.as_u16()
    }

    /// Always false on V1; V2 checks the CRC bit of the options byte.
    fn has_crc_check_option(&self) -> bool {
        ProtocolOptions::from_bits(self.options()).has_crc_check()
    }
}

// ---------------------------------------------------------------------------
// Request headers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeaderV1 {
    pub proto: u8,
    pub header_type: u8,
    pub cmd_code: u16,
    pub ver2: u8,
    pub request_id: u32,
    pub codec: u8,
    pub timeout: u32,
    pub class_len: u16,
    pub header_len: u16,
    pub content_len: u32,
}

impl HeaderSpec for RequestHeaderV1 {
    const VERSION: ProtocolVersion = ProtocolVersion::V1;
    const KIND: HeaderType = HeaderType::Request;
    const PACKED_SIZE: usize = REQUEST_HEADER_V1_SIZE;
}

impl RequestHeader for RequestHeaderV1 {
    fn set_proto(&mut self, version: ProtocolVersion) {
        self.proto = version.as_u8();
    }

    fn set_header_type(&mut self, header_type: HeaderType) {
        self.header_type = header_type as u8;
    }

    fn set_cmd_code(&mut self, cmd_code: CommandCode) {
        self.cmd_code = cmd_code as u16;
    }

    fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id;
    }

    fn set_codec(&mut self, codec: CodecKind) {
        self.codec = codec as u8;
    }

    fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout = timeout_ms;
    }

    fn set_class_len(&mut self, len: u16) {
        self.class_len = len;
    }

    fn set_header_len(&mut self, len: u16) {
        self.header_len = len;
    }

    fn set_content_len(&mut self, len: u32) {
        self.content_len = len;
    }

    fn pack_into(&self, out: &mut BytesMut) {
        out.put_u8(self.proto);
        out.put_u8(self.header_type);
        out.put_u16(self.cmd_code);
        out.put_u8(self.ver2);
        out.put_u32(self.request_id);
        out.put_u8(self.codec);
        out.put_u32(self.timeout);
        out.put_u16(self.class_len);
        out.put_u16(self.header_len);
        out.put_u32(self.content_len);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeaderV2 {
    pub proto: u8,
    pub ver1: u8,
    pub header_type: u8,
    pub cmd_code: u16,
    pub ver2: u8,
    pub request_id: u32,
    pub codec: u8,
    pub options: u8,
    pub timeout: u32,
    pub class_len: u16,
    pub header_len: u16,
    pub content_len: u32,
}

impl HeaderSpec for RequestHeaderV2 {
    const VERSION: ProtocolVersion = ProtocolVersion::V2;
    const KIND: HeaderType = HeaderType::Request;
    const PACKED_SIZE: usize = REQUEST_HEADER_V2_SIZE;
}

impl RequestHeader for RequestHeaderV2 {
    fn set_proto(&mut self, version: ProtocolVersion) {
        self.proto = version.as_u8();
    }

    fn set_ver1(&mut self, version: ProtocolVersion) {
        self.ver1 = version.as_u8();
    }

    fn set_header_type(&mut self, header_type: HeaderType) {
        self.header_type = header_type as u8;
    }

    fn set_cmd_code(&mut self, cmd_code: CommandCode) {
        self.cmd_code = cmd_code as u16;
    }

    fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id;
    }

    fn set_codec(&mut self, codec: CodecKind) {
        self.codec = codec as u8;
    }

    fn enable_crc_check(&mut self) {
        self.options |= ProtocolOptions::CRC_CHECK;
    }

    fn crc_check_enabled(&self) -> bool {
        ProtocolOptions::from_bits(self.options).has_crc_check()
    }

    fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout = timeout_ms;
    }

    fn set_class_len(&mut self, len: u16) {
        self.class_len = len;
    }

    fn set_header_len(&mut self, len: u16) {
        self.header_len = len;
    }

    fn set_content_len(&mut self, len: u32) {
        self.content_len = len;
    }

    fn pack_into(&self, out: &mut BytesMut) {
        out.put_u8(self.proto);
        out.put_u8(self.ver1);
        out.put_u8(self.header_type);
        out.put_u16(self.cmd_code);
        out.put_u8(self.ver2);
        out.put_u32(self.request_id);
        out.put_u8(self.codec);
        out.put_u8(self.options);
        out.put_u32(self.timeout);
        out.put_u16(self.class_len);
        out.put_u16(self.header_len);
        out.put_u32(self.content_len);
    }
}

// ---------------------------------------------------------------------------
// Response headers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHeaderV1 {
    pub proto: u8,
    pub header_type: u8,
    pub cmd_code: u16,
    pub ver2: u8,
    pub request_id: u32,
    pub codec: u8,
    pub resp_status: u16,
    pub class_len: u16,
    pub header_len: u16,
    pub content_len: u32,
}

impl HeaderSpec for ResponseHeaderV1 {
    const VERSION: ProtocolVersion = ProtocolVersion::V1;
    const KIND: HeaderType = HeaderType::Response;
    const PACKED_SIZE: usize = RESPONSE_HEADER_V1_SIZE;
}

impl ResponseHeader for ResponseHeaderV1 {
    const OPTIONS_OFFSET: Option<usize> = None;
    const CLASS_LEN_OFFSET: usize = 12;
    const HEADER_LEN_OFFSET: usize = 14;
    const CONTENT_LEN_OFFSET: usize = 16;

    fn extract(meta: &[u8]) -> Self {
        Self {
            proto: meta[0],
            header_type: meta[1],
            cmd_code: read_u16(meta, 2),
            ver2: meta[4],
            request_id: read_u32(meta, 5),
            codec: meta[9],
            resp_status: read_u16(meta, 10),
            class_len: read_u16(meta, Self::CLASS_LEN_OFFSET),
            header_len: read_u16(meta, Self::HEADER_LEN_OFFSET),
            content_len: read_u32(meta, Self::CONTENT_LEN_OFFSET),
        }
    }

    fn proto(&self) -> u8 {
        self.proto
    }

    fn header_type(&self) -> u8 {
        self.header_type
    }

    fn cmd_code(&self) -> u16 {
        self.cmd_code
    }

    fn ver2(&self) -> u8 {
        self.ver2
    }

    fn request_id(&self) -> u32 {
        self.request_id
    }

    fn codec(&self) -> u8 {
        self.codec
    }

    fn resp_status(&self) -> u16 {
        self.resp_status
    }

    fn class_len(&self) -> u16 {
        self.class_len
    }

    fn header_len(&self) -> u16 {
        self.header_len
    }

    fn content_len(&self) -> u32 {
        self.content_len
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHeaderV2 {
    pub proto: u8,
    pub ver1: u8,
    pub header_type: u8,
    pub cmd_code: u16,
    pub ver2: u8,
    pub request_id: u32,
    pub codec: u8,
    pub options: u8,
    pub resp_status: u16,
    pub class_len: u16,
    pub header_len: u16,
    pub content_len: u32,
}

impl HeaderSpec for ResponseHeaderV2 {
    const VERSION: ProtocolVersion = ProtocolVersion::V2;
    const KIND: HeaderType = HeaderType::Response;
    const PACKED_SIZE: usize = RESPONSE_HEADER_V2_SIZE;
}

impl ResponseHeader for ResponseHeaderV2 {
    const OPTIONS_OFFSET: Option<usize> = Some(11);
    const CLASS_LEN_OFFSET: usize = 14;
    const HEADER_LEN_OFFSET: usize = 16;
    const CONTENT_LEN_OFFSET: usize = 18;

    fn extract(meta: &[u8]) -> Self {
        Self {
            proto: meta[0],
            ver1: meta[1],
            header_type: meta[2],
            cmd_code: read_u16(meta, 3),
            ver2: meta[5],
            request_id: read_u32(meta, 6),
            codec: meta[10],
            options: meta[11],
            resp_status: read_u16(meta, 12),
            class_len: read_u16(meta, Self::CLASS_LEN_OFFSET),
            header_len: read_u16(meta, Self::HEADER_LEN_OFFSET),
            content_len: read_u32(meta, Self::CONTENT_LEN_OFFSET),
        }
    }

    fn proto(&self) -> u8 {
        self.proto
    }

    fn ver1(&self) -> u8 {
        self.ver1
    }

    fn header_type(&self) -> u8 {
        self.header_type
    }

    fn cmd_code(&self) -> u16 {
        self.cmd_code
    }

    fn ver2(&self) -> u8 {
        self.ver2
    }

    fn request_id(&self) -> u32 {
        self.request_id
    }

    fn codec(&self) -> u8 {
        self.codec
    }

    fn options(&self) -> u8 {
        self.options
    }

    fn resp_status(&self) -> u16 {
        self.resp_status
    }

    fn class_len(&self) -> u16 {
        self.class_len
    }

    fn header_len(&self) -> u16 {
        self.header_len
    }

    fn content_len(&self) -> u32 {
        self.content_len
    }

    fn check_ver1(&self) -> bool {
        self.proto == self.ver1
    }
}
