//! Per-call controller state the codec reads and completes.
//!
//! The controller owns everything with call lifetime: timing, ids, the
//! attached [`BoltContext`] and the response placeholder. The transport
//! layer creates one per call, hands it to the codec on both paths, and
//! returns it to the caller once the call completes.

use std::any::Any;

use bytes::Bytes;
use thiserror::Error;

use crate::context::BoltContext;

/// A recorded per-call failure. The variant encodes which side of the
/// call went wrong, mirroring how the transport reports errors.
#[derive(Debug, Clone, Error)]
pub enum CallFailure {
    /// The request could not be validated or serialized.
    #[error("request error: {0}")]
    Request(String),
    /// The response was malformed or failed a header check.
    #[error("response error: {0}")]
    Response(String),
    /// The server answered with a non-success Bolt status.
    #[error("server status {status:#04x}: {message}")]
    Status { status: u16, message: String },
}

/// A decodable response placeholder. Blanket-implemented for every
/// prost message, plus the downcast hooks the typed client API needs to
/// recover the concrete message after completion.
pub trait ResponseBody: Send {
    fn merge_from(&mut self, body: Bytes) -> Result<(), prost::DecodeError>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<M> ResponseBody for M
where
    M: prost::Message + Default + 'static,
{
    fn merge_from(&mut self, body: Bytes) -> Result<(), prost::DecodeError> {
        self.merge(body)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[derive(Default)]
pub struct Controller {
    timeout_ms: i64,
    // User-visible request id string, also used as the outgoing trace
    // id. Distinct from the 32-bit wire request_id.
    request_id: String,
    // When set, the lower 32 bits become the wire request_id.
    log_id: Option<u64>,
    compression_requested: bool,
    context: Option<BoltContext>,
    response: Option<Box<dyn ResponseBody>>,
    failure: Option<CallFailure>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: i64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn set_request_id(&mut self, request_id: impl Into<String>) {
        self.request_id = request_id.into();
    }

    pub fn log_id(&self) -> Option<u64> {
        self.log_id
    }

    pub fn set_log_id(&mut self, log_id: u64) {
        self.log_id = Some(log_id);
    }

    pub fn compression_requested(&self) -> bool {
        self.compression_requested
    }

    pub fn request_compression(&mut self) {
        self.compression_requested = true;
    }

    pub fn context(&self) -> Option<&BoltContext> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: BoltContext) {
        self.context = Some(context);
    }

    /// Returns the attached context, creating a default one first if the
    /// call was issued without any.
    pub(crate) fn context_mut_or_default(&mut self) -> &mut BoltContext {
        self.context.get_or_insert_with(BoltContext::default)
    }

    pub fn set_response(&mut self, response: Box<dyn ResponseBody>) {
        self.response = Some(response);
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub(crate) fn response_mut(&mut self) -> Option<&mut (dyn ResponseBody + '_)> {
        match self.response.as_deref_mut() {
            Some(body) => Some(body),
            None => None,
        }
    }

    /// Takes the completed response back out, recovering its concrete
    /// type. `None` if no placeholder was set or the type differs.
    pub fn take_response<M: ResponseBody + 'static>(&mut self) -> Option<M> {
        let body = self.response.take()?;
        body.into_any().downcast::<M>().ok().map(|boxed| *boxed)
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        self.failure.as_ref()
    }

    /// Records a failure. The first recorded failure wins: a late decode
    /// error never overwrites an earlier status-level failure.
    pub fn set_failed(&mut self, failure: CallFailure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("timeout_ms", &self.timeout_ms)
            .field("request_id", &self.request_id)
            .field("log_id", &self.log_id)
            .field("compression_requested", &self.compression_requested)
            .field("context", &self.context)
            .field("has_response", &self.response.is_some())
            .field("failure", &self.failure)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Probe {
        #[prost(uint32, tag = "1")]
        value: u32,
    }

    #[test]
    fn test_first_failure_wins() {
        let mut cntl = Controller::new();
        cntl.set_failed(CallFailure::Status {
            status: 0x04,
            message: "server threadpool busy".to_owned(),
        });
        cntl.set_failed(CallFailure::Response("late decode error".to_owned()));

        assert!(cntl.failed());
        let text = cntl.failure().map(CallFailure::to_string);
        assert!(text.as_deref().is_some_and(|t| t.contains("threadpool")));
    }

    #[test]
    fn test_response_roundtrip_through_placeholder() {
        let mut cntl = Controller::new();
        cntl.set_response(Box::new(Probe::default()));

        let mut body = bytes::BytesMut::new();
        prost::Message::encode(&Probe { value: 7 }, &mut body).unwrap();
        cntl.response_mut()
            .unwrap()
            .merge_from(body.freeze())
            .unwrap();

        let probe: Probe = cntl.take_response().unwrap();
        assert_eq!(probe.value, 7);
        assert!(!cntl.has_response());
    }

    #[test]
    fn test_context_created_on_demand() {
        let mut cntl = Controller::new();
        assert!(cntl.context().is_none());
        cntl.context_mut_or_default().set_response_status(0);
        assert_eq!(cntl.context().unwrap().response_status(), Some(0));
    }
}
