//! Incremental framer for the socket-read path.
//!
//! Inspects a streaming byte buffer and, once a complete frame is
//! present, splits it into the packed header (`meta`) and everything
//! after it (`payload`). Short buffers are left untouched so the next
//! read can resume where this one stopped.

use bytes::BytesMut;

use crate::defines::{ProtocolOptions, ProtocolVersion};
use crate::header::{read_u16, read_u32, ResponseHeader, ResponseHeaderV1, ResponseHeaderV2};

/// One framed response, cut off the stream buffer.
#[derive(Debug)]
pub struct FramedMessage {
    /// The packed fixed-size header.
    pub meta: BytesMut,
    /// Class name + header region + content + optional CRC trailer.
    pub payload: BytesMut,
}

/// Outcome of one framing attempt.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete frame was cut off the buffer.
    Message(FramedMessage),
    /// The buffer does not hold a complete frame yet; nothing was
    /// consumed. Retry after more bytes arrive.
    NotEnoughData,
    /// The stream does not start with a known protocol byte. The
    /// connection cannot be resynchronized and should be dropped.
    AbsolutelyWrong,
}

/// Attempts to cut one frame off `source`.
///
/// Dispatches on the first byte: 1 selects V1 framing, 2 selects V2,
/// anything else is unrecoverable.
pub fn parse_message(source: &mut BytesMut) -> ParseOutcome {
    let Some(&proto) = source.first() else {
        return ParseOutcome::NotEnoughData;
    };
    match ProtocolVersion::from_wire(proto) {
        Some(ProtocolVersion::V1) => parse_message_impl::<ResponseHeaderV1>(source),
        Some(ProtocolVersion::V2) => parse_message_impl::<ResponseHeaderV2>(source),
        None => ParseOutcome::AbsolutelyWrong,
    }
}

fn parse_message_impl<H: ResponseHeader>(source: &mut BytesMut) -> ParseOutcome {
    if source.len() < H::PACKED_SIZE {
        return ParseOutcome::NotEnoughData;
    }

    // Peek the length fields (and the V2 options byte) at their wire
    // offsets without consuming anything.
    let options = match H::OPTIONS_OFFSET {
        Some(offset) => source[offset],
        None => 0,
    };
    let class_len = read_u16(source, H::CLASS_LEN_OFFSET) as usize;
    let header_len = read_u16(source, H::HEADER_LEN_OFFSET) as usize;
    let content_len = read_u32(source, H::CONTENT_LEN_OFFSET) as usize;

    let mut total_len = H::PACKED_SIZE + class_len + header_len + content_len;
    if ProtocolOptions::from_bits(options).has_crc_check() {
        total_len += 4;
    }

    if source.len() < total_len {
        return ParseOutcome::NotEnoughData;
    }

    let meta = source.split_to(H::PACKED_SIZE);
    let payload = source.split_to(total_len - H::PACKED_SIZE);
    ParseOutcome::Message(FramedMessage { meta, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn v1_response_frame(class_len: u16, header_len: u16, content: &[u8]) -> BytesMut {
        let mut frame = BytesMut::new();
        frame.put_u8(1); // proto
        frame.put_u8(0); // type
        frame.put_u16(2); // cmd_code
        frame.put_u8(0); // ver2
        frame.put_u32(42); // request_id
        frame.put_u8(11); // codec
        frame.put_u16(0); // resp_status
        frame.put_u16(class_len);
        frame.put_u16(header_len);
        frame.put_u32(content.len() as u32);
        frame.put_bytes(b'c', class_len as usize);
        frame.put_bytes(b'h', header_len as usize);
        frame.put_slice(content);
        frame
    }

    fn v2_response_frame(options: u8, content: &[u8], crc: u32) -> BytesMut {
        let mut frame = BytesMut::new();
        frame.put_u8(2); // proto
        frame.put_u8(2); // ver1
        frame.put_u8(0); // type
        frame.put_u16(2); // cmd_code
        frame.put_u8(0); // ver2
        frame.put_u32(42); // request_id
        frame.put_u8(11); // codec
        frame.put_u8(options);
        frame.put_u16(0); // resp_status
        frame.put_u16(0); // class_len
        frame.put_u16(0); // header_len
        frame.put_u32(content.len() as u32);
        frame.put_slice(content);
        if options & ProtocolOptions::CRC_CHECK != 0 {
            frame.put_u32(crc);
        }
        frame
    }

    #[test]
    fn test_empty_buffer() {
        let mut buf = BytesMut::new();
        assert!(matches!(parse_message(&mut buf), ParseOutcome::NotEnoughData));
    }

    #[test]
    fn test_unknown_proto_byte() {
        let mut buf = BytesMut::from(&b"\x07garbage"[..]);
        assert!(matches!(parse_message(&mut buf), ParseOutcome::AbsolutelyWrong));
    }

    #[test]
    fn test_short_buffer_is_left_untouched() {
        let frame = v1_response_frame(4, 0, b"body");
        let mut buf = BytesMut::from(&frame[..10]);

        // Repeated attempts on the same prefix must not consume bytes.
        for _ in 0..3 {
            assert!(matches!(parse_message(&mut buf), ParseOutcome::NotEnoughData));
            assert_eq!(buf.len(), 10);
        }

        buf.extend_from_slice(&frame[10..]);
        match parse_message(&mut buf) {
            ParseOutcome::Message(msg) => {
                assert_eq!(msg.meta.len(), 20);
                assert_eq!(msg.payload.len(), 8);
                assert!(buf.is_empty());
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn test_v1_meta_payload_split() {
        let mut buf = v1_response_frame(3, 17, b"xy");
        match parse_message(&mut buf) {
            ParseOutcome::Message(msg) => {
                assert_eq!(msg.meta.len(), 20);
                assert_eq!(msg.payload.len(), 3 + 17 + 2);
                assert_eq!(msg.meta[0], 1);
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn test_v2_crc_trailer_extends_total_length() {
        let with_crc = v2_response_frame(ProtocolOptions::CRC_CHECK, b"abc", 0x11223344);
        let without_crc = v2_response_frame(0, b"abc", 0);
        assert_eq!(with_crc.len(), without_crc.len() + 4);

        // Everything but the trailer present: still not enough data.
        let mut buf = BytesMut::from(&with_crc[..with_crc.len() - 4]);
        assert!(matches!(parse_message(&mut buf), ParseOutcome::NotEnoughData));

        let mut buf = with_crc.clone();
        match parse_message(&mut buf) {
            ParseOutcome::Message(msg) => {
                assert_eq!(msg.meta.len(), 22);
                // Payload keeps the trailer; the processor pops it.
                assert_eq!(msg.payload.len(), 3 + 4);
                assert_eq!(&msg.payload[3..], &0x11223344u32.to_be_bytes());
            }
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut buf = v1_response_frame(0, 0, b"first");
        buf.extend_from_slice(&v2_response_frame(0, b"second", 0));

        match parse_message(&mut buf) {
            ParseOutcome::Message(msg) => assert_eq!(&msg.payload[..], b"first"),
            other => panic!("expected a message, got {other:?}"),
        }
        match parse_message(&mut buf) {
            ParseOutcome::Message(msg) => assert_eq!(&msg.payload[..], b"second"),
            other => panic!("expected a message, got {other:?}"),
        }
        assert!(buf.is_empty());
    }
}
