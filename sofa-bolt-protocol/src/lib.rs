//! # sofa-bolt-protocol
//!
//! Client-side codec for the SOFA Bolt RPC wire protocol, versions v1
//! and v2.
//!
//! This crate provides:
//! - The frame header records and a version-dispatched accessor layer
//! - An incremental framer for the socket-read path
//! - The request packer and response processor pipelines
//! - A `java.util.zip.CRC32`-compatible frame checksum
//! - The per-call context carrying protocol options and response
//!   metadata
//!
//! The codec is synchronous and holds no mutable process-wide state;
//! everything with call lifetime lives on the [`Controller`] and
//! [`BoltContext`]. Transports drive it through [`parse_message`],
//! [`serialize_request`], [`pack_request`] and [`process_response`].

pub mod codec;
pub mod context;
pub mod controller;
pub mod crc;
pub mod defines;
pub mod frame;
pub mod header;
pub mod method;

pub use codec::{check_context, pack_request, process_response, serialize_request};
pub use context::{BoltContext, DEFAULT_CLASS_NAME, DEFAULT_SERVICE_VERSION};
pub use controller::{CallFailure, Controller, ResponseBody};
pub use crc::JavaCrc32;
pub use defines::{
    CodecKind, CommandCode, HeaderType, ProtocolOptions, ProtocolVersion, ResponseStatus,
};
pub use frame::{parse_message, FramedMessage, ParseOutcome};
pub use method::MethodDescriptor;

/// Default port Bolt servers listen on.
pub const DEFAULT_PORT: u16 = 12200;
