//! # sofa-bolt-client
//!
//! Tokio transport for the SOFA Bolt client codec: a TCP connection
//! that frames responses off the socket, correlates them to in-flight
//! calls and completes their controllers, plus a thin typed call API.

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
