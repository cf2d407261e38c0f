//! The send and receive pipelines.
//!
//! Send: validate the per-call settings, serialize the protobuf body,
//! build the version-specific header, append the class name, the
//! ordered key-value header region and the content, then the optional
//! CRC trailer. Receive: extract and validate the header, verify the
//! trailer, and parse class name, header map and body into the context
//! and the caller's response placeholder.
//!
//! All failures are recorded on the [`Controller`]; nothing here
//! panics or returns errors across the transport boundary.

use bytes::{Buf, BufMut, BytesMut};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::context::{BoltContext, DEFAULT_CLASS_NAME, DEFAULT_SERVICE_VERSION};
use crate::controller::{CallFailure, Controller};
use crate::crc::JavaCrc32;
use crate::defines::{CodecKind, CommandCode, HeaderType, ProtocolVersion, ResponseStatus};
use crate::frame::FramedMessage;
use crate::header::{
    read_u32, RequestHeader, RequestHeaderV1, RequestHeaderV2, ResponseHeader, ResponseHeaderV1,
    ResponseHeaderV2,
};
use crate::method::MethodDescriptor;

const SERVICE_KEY: &str = "service";
const TARGET_SERVICE_KEY: &str = "sofa_head_target_service";
const METHOD_NAME_KEY: &str = "sofa_head_method_name";
const TRACE_ID_KEY: &str = "rpc_trace_context.sofaTraceId";
const TRACE_ID_LEN: usize = 20;

/// Validates the per-call settings before serialization.
///
/// The protocol version is typed and therefore always one of V1/V2; the
/// remaining checks are for settings Bolt cannot express. A CRC request
/// under V1 is ignored with a warning rather than failing the call.
pub fn check_context(cntl: &mut Controller) -> bool {
    if cntl.compression_requested() {
        cntl.set_failed(CallFailure::Request(
            "bolt does not support data compression".to_owned(),
        ));
        return false;
    }
    if let Some(context) = cntl.context() {
        if context.request_protocol_version() == ProtocolVersion::V1
            && context.request_crc32_check_enabled()
        {
            tracing::warn!("bolt v1 does not support crc check, option ignored");
        }
    }
    true
}

/// Serializes `request` into `buf`, recording any failure on the
/// controller.
pub fn serialize_request<M: prost::Message>(
    buf: &mut BytesMut,
    cntl: &mut Controller,
    request: &M,
) {
    if !check_context(cntl) {
        return;
    }
    if let Err(err) = request.encode(buf) {
        cntl.set_failed(CallFailure::Request(format!(
            "fail to serialize request: {err}"
        )));
    }
}

/// Appends one framed request to `out`.
///
/// `request_body` is the already serialized protobuf content. The
/// transport records its correlation id on the socket before calling
/// this; the Bolt header has no field for it.
pub fn pack_request(
    out: &mut BytesMut,
    method: &MethodDescriptor,
    cntl: &mut Controller,
    request_body: &[u8],
) {
    if cntl.failed() {
        return;
    }
    let version = cntl
        .context()
        .map(BoltContext::request_protocol_version)
        .unwrap_or(ProtocolVersion::V1);
    match version {
        ProtocolVersion::V1 => {
            pack_request_impl::<RequestHeaderV1>(out, method, cntl, request_body)
        }
        ProtocolVersion::V2 => {
            pack_request_impl::<RequestHeaderV2>(out, method, cntl, request_body)
        }
    }
}

fn pack_request_impl<H: RequestHeader>(
    out: &mut BytesMut,
    method: &MethodDescriptor,
    cntl: &mut Controller,
    request_body: &[u8],
) {
    let context = cntl.context();
    let crc_requested = context
        .map(BoltContext::request_crc32_check_enabled)
        .unwrap_or(false);
    let class_name = context
        .map(|c| c.request_class_name().to_owned())
        .unwrap_or_else(|| DEFAULT_CLASS_NAME.to_owned());
    let service_id = service_identifier(context, method);

    let mut header = H::default();
    header.set_proto(H::VERSION);
    header.set_ver1(H::VERSION);
    header.set_header_type(HeaderType::Request);
    header.set_cmd_code(CommandCode::Request);
    // The wire request_id is 32-bit; reuse the low half of the log id
    // when the caller set one, otherwise pick a random id.
    let request_id = match cntl.log_id() {
        Some(log_id) => log_id as u32,
        None => rand::random(),
    };
    header.set_request_id(request_id);
    header.set_codec(CodecKind::Protobuf);
    if crc_requested {
        // No-op under V1; the option is ignored there.
        header.enable_crc_check();
    }
    header.set_timeout(clamp_timeout(cntl.timeout_ms()));

    let mut payload =
        BytesMut::with_capacity(class_name.len() + request_body.len() + 4 * TRACE_ID_LEN);
    header.set_class_len(class_name.len() as u16);
    payload.put_slice(class_name.as_bytes());

    let mut header_len = 0usize;
    header_len += append_kv(&mut payload, SERVICE_KEY, &service_id);
    header_len += append_kv(&mut payload, TARGET_SERVICE_KEY, &service_id);
    header_len += append_kv(&mut payload, METHOD_NAME_KEY, method.name());
    if cntl.request_id().is_empty() {
        let trace_id = random_printable(TRACE_ID_LEN);
        header_len += append_kv(&mut payload, TRACE_ID_KEY, &trace_id);
        // Written back so user code can log the generated trace id.
        cntl.set_request_id(trace_id);
    } else {
        header_len += append_kv(&mut payload, TRACE_ID_KEY, cntl.request_id());
    }
    header.set_header_len(header_len as u16);

    header.set_content_len(request_body.len() as u32);
    payload.put_slice(request_body);

    let mut head = BytesMut::with_capacity(H::PACKED_SIZE);
    header.pack_into(&mut head);

    if header.crc_check_enabled() {
        let mut crc = JavaCrc32::new();
        crc.update(&head);
        crc.update(&payload);
        payload.put_u32(crc.finish());
    }

    out.put_slice(&head);
    out.put_slice(&payload);
}

/// Builds the service identifier sent under the `service` and
/// `sofa_head_target_service` keys.
///
/// A non-empty service name on the context takes precedence and also
/// suppresses the method's `custom_service_id`; the custom id, when it
/// applies, is sent verbatim with no version suffix.
fn service_identifier(context: Option<&BoltContext>, method: &MethodDescriptor) -> String {
    let context_service_name = context
        .map(BoltContext::request_service_name)
        .unwrap_or("");
    if context_service_name.is_empty() {
        if let Some(custom_id) = method.custom_service_id().filter(|id| !id.is_empty()) {
            return custom_id.to_owned();
        }
    }

    let mut identifier = if context_service_name.is_empty() {
        method.service_full_name().to_owned()
    } else {
        context_service_name.to_owned()
    };
    identifier.push(':');
    let service_version = context
        .map(BoltContext::request_service_version)
        .filter(|version| !version.is_empty())
        .unwrap_or(DEFAULT_SERVICE_VERSION);
    identifier.push_str(service_version);
    if let Some(unique_id) = context
        .map(BoltContext::request_service_unique_id)
        .filter(|unique_id| !unique_id.is_empty())
    {
        identifier.push(':');
        identifier.push_str(unique_id);
    }
    identifier
}

fn append_kv(payload: &mut BytesMut, key: &str, value: &str) -> usize {
    payload.put_u32(key.len() as u32);
    payload.put_slice(key.as_bytes());
    payload.put_u32(value.len() as u32);
    payload.put_slice(value.as_bytes());
    4 + key.len() + 4 + value.len()
}

// Negative, zero and out-of-range timeouts are sent as the protocol
// maximum.
fn clamp_timeout(timeout_ms: i64) -> u32 {
    if timeout_ms > 0 && timeout_ms < i64::from(u32::MAX) {
        timeout_ms as u32
    } else {
        u32::MAX
    }
}

fn random_printable(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Consumes one framed response and completes the controller.
pub fn process_response(mut msg: FramedMessage, cntl: &mut Controller) {
    // The framer only ever emits proto bytes 1 and 2; treat anything
    // that is not V1 as V2, like the version dispatch on the send path.
    match msg.meta.first() {
        Some(&1) => process_response_impl::<ResponseHeaderV1>(&mut msg, cntl),
        _ => process_response_impl::<ResponseHeaderV2>(&mut msg, cntl),
    }
}

fn process_response_impl<H: ResponseHeader>(msg: &mut FramedMessage, cntl: &mut Controller) {
    let header = H::extract(&msg.meta);

    // Record the raw status before validating so user code can read it
    // even when the call fails.
    cntl.context_mut_or_default()
        .set_response_status(header.resp_status());

    if !check_response_header(&header, cntl) {
        return;
    }

    if header.has_crc_check_option() {
        let payload_len = header.class_len() as usize
            + header.header_len() as usize
            + header.content_len() as usize;
        if msg.payload.len() < payload_len + 4 {
            cntl.set_failed(CallFailure::Response(
                "fail to read frame checksum, not enough response bytes".to_owned(),
            ));
            return;
        }
        let expected = read_u32(&msg.payload, payload_len);
        msg.payload.truncate(payload_len);
        let mut crc = JavaCrc32::new();
        crc.update(&msg.meta);
        crc.update(&msg.payload);
        let computed = crc.finish();
        if expected != computed {
            cntl.set_failed(CallFailure::Response(format!(
                "checksum exam failed, expected {expected:#010x}, {computed:#010x} calculated"
            )));
            return;
        }
    }

    let class_len = header.class_len() as usize;
    if class_len > 0 {
        if msg.payload.len() < class_len {
            cntl.set_failed(CallFailure::Response(
                "fail to read response class name, not enough response bytes".to_owned(),
            ));
            return;
        }
        let class_name = msg.payload.split_to(class_len);
        cntl.context_mut_or_default()
            .set_response_class_name(String::from_utf8_lossy(&class_name).into_owned());
    }

    let mut header_remaining = i64::from(header.header_len());
    while header_remaining > 0 {
        let Some((key, value, consumed)) = cut_header_entry(&mut msg.payload) else {
            cntl.set_failed(CallFailure::Response(
                "fail to parse response header map, not enough response bytes".to_owned(),
            ));
            return;
        };
        cntl.context_mut_or_default().add_response_header(key, value);
        header_remaining -= consumed as i64;
    }

    if header.content_len() == 0 {
        return;
    }
    let body = msg.payload.split_to(msg.payload.len()).freeze();
    let body_len = body.len();
    let Some(placeholder) = cntl.response_mut() else {
        return;
    };
    if let Err(err) = placeholder.merge_from(body) {
        cntl.set_failed(CallFailure::Response(format!(
            "fail to parse response message, response_size = {body_len}: {err}"
        )));
    }
}

fn check_response_header<H: ResponseHeader>(header: &H, cntl: &mut Controller) -> bool {
    if !header.check_ver1() {
        cntl.set_failed(CallFailure::Response(format!(
            "response header proto {} not match ver1 {}",
            header.proto(),
            header.ver1()
        )));
        return false;
    }
    if !header.check_header_type(HeaderType::Response) {
        cntl.set_failed(CallFailure::Response(format!(
            "response header type {} not supported",
            header.header_type()
        )));
        return false;
    }
    if !header.check_cmd_code(CommandCode::Response) {
        cntl.set_failed(CallFailure::Response(format!(
            "response header cmd code {} not supported",
            header.cmd_code()
        )));
        return false;
    }
    if !header.check_response_status(ResponseStatus::Success) {
        let status = header.resp_status();
        let message = ResponseStatus::from_wire(status)
            .map(ResponseStatus::message)
            .unwrap_or("unknown status");
        cntl.set_failed(CallFailure::Status {
            status,
            message: message.to_owned(),
        });
        return false;
    }
    // ver2 is not validated, matching upstream behavior.
    if !header.check_codec(CodecKind::Protobuf) {
        cntl.set_failed(CallFailure::Response(format!(
            "response codec {} not supported",
            header.codec()
        )));
        return false;
    }
    true
}

fn cut_header_entry(payload: &mut BytesMut) -> Option<(String, String, usize)> {
    let key = cut_length_prefixed(payload)?;
    let value = cut_length_prefixed(payload)?;
    let consumed = 4 + key.len() + 4 + value.len();
    Some((
        String::from_utf8_lossy(&key).into_owned(),
        String::from_utf8_lossy(&value).into_owned(),
        consumed,
    ))
}

fn cut_length_prefixed(payload: &mut BytesMut) -> Option<BytesMut> {
    if payload.len() < 4 {
        return None;
    }
    let len = read_u32(payload, 0) as usize;
    if payload.len() < 4 + len {
        return None;
    }
    payload.advance(4);
    Some(payload.split_to(len))
}
