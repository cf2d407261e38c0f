//! Per-call protocol context.
//!
//! The request side is set by user code before the call; the response
//! side is filled in by the codec while processing the reply. Response
//! setters are crate-private so user code can read response metadata
//! but never construct or mutate it.

use std::collections::HashMap;

use crate::defines::{ProtocolOptions, ProtocolVersion};

/// Class name sent when the context does not override it. Java servers
/// use it to pick a request deserializer.
pub const DEFAULT_CLASS_NAME: &str = "com.alipay.sofa.rpc.core.request.SofaRequest";

/// Service version appended to the service identifier when the context
/// does not carry one.
pub const DEFAULT_SERVICE_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct BoltContext {
    request_protocol_version: ProtocolVersion,
    // Only the CRC bit is meaningful so far; ignored entirely under V1.
    request_options: ProtocolOptions,
    // Remote service name. May differ from the protobuf service name;
    // user code sets it explicitly when it does.
    request_service_name: String,
    request_service_version: String,
    request_service_unique_id: String,
    request_class_name: String,
    // Not every server responds with a header region, hence the Option.
    response_header_map: Option<HashMap<String, String>>,
    response_class_name: String,
    response_status: Option<u16>,
}

impl Default for BoltContext {
    fn default() -> Self {
        Self {
            request_protocol_version: ProtocolVersion::V1,
            request_options: ProtocolOptions::new(),
            request_service_name: String::new(),
            request_service_version: String::new(),
            request_service_unique_id: String::new(),
            request_class_name: DEFAULT_CLASS_NAME.to_owned(),
            response_header_map: None,
            response_class_name: String::new(),
            response_status: None,
        }
    }
}

impl BoltContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_protocol_version(&self) -> ProtocolVersion {
        self.request_protocol_version
    }

    pub fn set_request_protocol_version(&mut self, version: ProtocolVersion) {
        self.request_protocol_version = version;
    }

    pub fn request_crc32_check_enabled(&self) -> bool {
        self.request_options.has_crc_check()
    }

    pub fn request_enable_crc32_check(&mut self) {
        self.request_options = self.request_options.with_crc_check();
    }

    pub fn request_service_name(&self) -> &str {
        &self.request_service_name
    }

    pub fn set_request_service_name(&mut self, service_name: impl Into<String>) {
        self.request_service_name = service_name.into();
    }

    pub fn request_service_version(&self) -> &str {
        &self.request_service_version
    }

    pub fn set_request_service_version(&mut self, service_version: impl Into<String>) {
        self.request_service_version = service_version.into();
    }

    pub fn request_service_unique_id(&self) -> &str {
        &self.request_service_unique_id
    }

    pub fn set_request_service_unique_id(&mut self, unique_id: impl Into<String>) {
        self.request_service_unique_id = unique_id.into();
    }

    pub fn request_class_name(&self) -> &str {
        &self.request_class_name
    }

    pub fn set_request_class_name(&mut self, class_name: impl Into<String>) {
        self.request_class_name = class_name.into();
    }

    pub fn has_response_header_map(&self) -> bool {
        self.response_header_map.is_some()
    }

    pub fn response_header_map(&self) -> Option<&HashMap<String, String>> {
        self.response_header_map.as_ref()
    }

    pub fn response_class_name(&self) -> &str {
        &self.response_class_name
    }

    /// Raw status code of the last response, present even when the call
    /// failed validation.
    pub fn response_status(&self) -> Option<u16> {
        self.response_status
    }

    pub(crate) fn add_response_header(&mut self, key: String, value: String) {
        self.response_header_map
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
    }

    pub(crate) fn set_response_class_name(&mut self, class_name: String) {
        self.response_class_name = class_name;
    }

    pub(crate) fn set_response_status(&mut self, status: u16) {
        self.response_status = Some(status);
    }
}
