//! Connection management.
//!
//! One TCP connection carrying one in-flight Bolt call at a time. The
//! wire protocol has no correlation field, so a response can only be
//! matched to the request most recently written; the call lock holds
//! that invariant by serializing the whole send-and-await sequence,
//! and the correlation id recorded at send time is read back by the
//! response path, the same way the codec expects a socket collaborator
//! to behave.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use sofa_bolt_protocol::frame::{parse_message, ParseOutcome};
use sofa_bolt_protocol::{codec, Controller, MethodDescriptor};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::error::ClientError;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout used when the controller carries none.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

struct PendingCall {
    correlation_id: u64,
    cntl: Controller,
    tx: oneshot::Sender<Controller>,
}

/// A connection to a Bolt server.
pub struct Connection {
    config: ConnectionConfig,
    /// Serializes calls. Bolt frames cannot correlate concurrent
    /// requests on one connection, so exactly one call may be between
    /// send and response at any time.
    call_lock: Mutex<()>,
    /// Write half of the stream (for sending requests).
    writer: Mutex<Option<WriteHalf<TcpStream>>>,
    /// Read half of the stream (for receiving responses).
    reader: Mutex<Option<ReadHalf<TcpStream>>>,
    /// Stream buffer the framer pulls frames off.
    recv_buffer: Mutex<BytesMut>,
    /// The call waiting for its response, if any.
    pending: Mutex<Option<PendingCall>>,
    /// Correlation id of the request last written to the socket.
    correlation_id: AtomicU64,
    /// Next correlation id to hand out.
    next_correlation_id: AtomicU64,
    /// Is the connection established?
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            call_lock: Mutex::new(()),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            recv_buffer: Mutex::new(BytesMut::with_capacity(DEFAULT_READ_BUFFER_SIZE)),
            pending: Mutex::new(None),
            correlation_id: AtomicU64::new(0),
            next_correlation_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        let (read_half, write_half) = tokio::io::split(tcp_stream);
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.recv_buffer.lock().await.clear();
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("connected to {}", self.config.addr);
        Ok(())
    }

    /// The correlation id recorded by the most recent send.
    pub fn correlation_id(&self) -> u64 {
        self.correlation_id.load(Ordering::SeqCst)
    }

    fn set_correlation_id(&self, id: u64) {
        self.correlation_id.store(id, Ordering::SeqCst);
    }

    /// Sends one request and waits for the completed controller.
    ///
    /// Concurrent callers queue on the call lock; each call holds it
    /// until its response arrives, times out or fails, so responses
    /// always belong to the request last written.
    ///
    /// Codec-level failures do not error; they come back recorded on
    /// the returned controller.
    pub async fn call<M: prost::Message>(
        &self,
        method: &MethodDescriptor,
        mut cntl: Controller,
        request: &M,
    ) -> Result<Controller, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let mut body = BytesMut::new();
        codec::serialize_request(&mut body, &mut cntl, request);
        if cntl.failed() {
            return Ok(cntl);
        }

        let _in_flight = self.call_lock.lock().await;
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let correlation_id = self.next_correlation_id.fetch_add(1, Ordering::SeqCst);
        self.set_correlation_id(correlation_id);

        let mut framed = BytesMut::new();
        codec::pack_request(&mut framed, method, &mut cntl, &body);
        if cntl.failed() {
            return Ok(cntl);
        }

        let timeout = if cntl.timeout_ms() > 0 {
            Duration::from_millis(cntl.timeout_ms() as u64)
        } else {
            self.config.request_timeout
        };

        let (tx, rx) = oneshot::channel();
        *self.pending.lock().await = Some(PendingCall {
            correlation_id,
            cntl,
            tx,
        });

        let write_result = {
            let mut writer_guard = self.writer.lock().await;
            match writer_guard.as_mut() {
                Some(writer) => writer.write_all(&framed).await.map_err(ClientError::Io),
                None => Err(ClientError::NotConnected),
            }
        };
        if let Err(err) = write_result {
            self.pending.lock().await.take();
            return Err(err);
        }
        tracing::debug!(
            correlation_id,
            bytes = framed.len(),
            "request written, waiting for response"
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(cntl)) => Ok(cntl),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                // A response arriving after this point finds no pending
                // call and is dropped by the read loop.
                self.pending.lock().await.take();
                Err(ClientError::Timeout)
            }
        }
    }

    /// Reads and dispatches responses (call this in a background task).
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            let n = {
                let mut reader_guard = self.reader.lock().await;
                let reader = reader_guard.as_mut().ok_or(ClientError::NotConnected)?;
                reader.read(&mut buf).await.map_err(ClientError::Io)?
            };

            if n == 0 {
                tracing::debug!("connection closed by peer");
                self.connected.store(false, Ordering::SeqCst);
                self.fail_pending().await;
                return Err(ClientError::ConnectionClosed);
            }

            let mut recv = self.recv_buffer.lock().await;
            recv.extend_from_slice(&buf[..n]);

            loop {
                match parse_message(&mut recv) {
                    ParseOutcome::Message(msg) => {
                        // Recover the correlation id saved by the send
                        // path; the frame itself has no such field.
                        let correlation_id = self.correlation_id();
                        let call = {
                            let mut pending = self.pending.lock().await;
                            match pending.take() {
                                Some(call) if call.correlation_id == correlation_id => Some(call),
                                // A frame for an older request; the
                                // waiting call keeps waiting.
                                Some(call) => {
                                    *pending = Some(call);
                                    None
                                }
                                None => None,
                            }
                        };
                        let Some(PendingCall { mut cntl, tx, .. }) = call else {
                            tracing::warn!(
                                correlation_id,
                                "no pending call for response, dropping frame"
                            );
                            continue;
                        };
                        codec::process_response(msg, &mut cntl);
                        let _ = tx.send(cntl);
                    }
                    ParseOutcome::NotEnoughData => break,
                    ParseOutcome::AbsolutelyWrong => {
                        tracing::error!("unrecognized protocol byte on stream, dropping connection");
                        self.connected.store(false, Ordering::SeqCst);
                        drop(recv);
                        self.fail_pending().await;
                        return Err(ClientError::CorruptStream);
                    }
                }
            }
        }
    }

    async fn fail_pending(&self) {
        // Dropping the sender wakes the waiter with ConnectionClosed.
        if self.pending.lock().await.take().is_some() {
            tracing::debug!("clearing pending call");
        }
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();
        self.fail_pending().await;

        tracing::debug!("connection closed");
        Ok(())
    }

    /// Returns the number of pending requests (0 or 1).
    pub fn pending_count(&self) -> usize {
        self.pending
            .try_lock()
            .map(|p| usize::from(p.is_some()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("127.0.0.1:12200".parse().unwrap());
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config =
            ConnectionConfig::new("127.0.0.1:12200".parse().unwrap()).with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::new("127.0.0.1:12200".parse().unwrap())
            .with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }
}
