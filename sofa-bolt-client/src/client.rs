//! High-level typed call API.

use std::sync::Arc;

use sofa_bolt_protocol::{Controller, MethodDescriptor};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;

/// A typed Bolt client over one connection.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection (for the background read loop).
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Calls `method` with `request`, decoding the response into `Resp`.
    ///
    /// Transport errors come back as `Err`; protocol-level failures are
    /// recorded on the returned controller, which also carries the
    /// response context (class name, header map, status).
    pub async fn call<Req, Resp>(
        &self,
        method: &MethodDescriptor,
        mut cntl: Controller,
        request: &Req,
    ) -> Result<(Resp, Controller), ClientError>
    where
        Req: prost::Message,
        Resp: prost::Message + Default + 'static,
    {
        cntl.set_response(Box::new(Resp::default()));
        let mut cntl = self.conn.call(method, cntl, request).await?;
        let response = cntl.take_response::<Resp>().unwrap_or_default();
        Ok((response, cntl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use sofa_bolt_protocol::{
        BoltContext, CodecKind, CommandCode, HeaderType, JavaCrc32, ProtocolVersion,
        ResponseStatus,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Clone, PartialEq, prost::Message)]
    struct EchoRequest {
        #[prost(string, tag = "1")]
        name: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct EchoResponse {
        #[prost(int32, tag = "1")]
        code: i32,
        #[prost(string, tag = "2")]
        message: String,
    }

    /// Builds the response frame a Bolt server would send back.
    fn canned_response(version: ProtocolVersion, message: &str, with_crc: bool) -> BytesMut {
        let mut content = BytesMut::new();
        prost::Message::encode(
            &EchoResponse {
                code: 0,
                message: message.to_owned(),
            },
            &mut content,
        )
        .unwrap();

        let class_name = b"com.alipay.sofa.rpc.core.response.SofaResponse";
        let mut meta = BytesMut::new();
        meta.put_u8(version.as_u8());
        if version == ProtocolVersion::V2 {
            meta.put_u8(version.as_u8());
        }
        meta.put_u8(HeaderType::Response as u8);
        meta.put_u16(CommandCode::Response as u16);
        meta.put_u8(0);
        meta.put_u32(1);
        meta.put_u8(CodecKind::Protobuf as u8);
        if version == ProtocolVersion::V2 {
            meta.put_u8(if with_crc { 0x01 } else { 0 });
        }
        meta.put_u16(ResponseStatus::Success.as_u16());
        meta.put_u16(class_name.len() as u16);
        meta.put_u16(0);
        meta.put_u32(content.len() as u32);

        let mut payload = BytesMut::new();
        payload.put_slice(class_name);
        payload.put_slice(&content);
        if with_crc {
            let mut crc = JavaCrc32::new();
            crc.update(&meta);
            crc.update(&payload);
            payload.put_u32(crc.finish());
        }

        meta.extend_from_slice(&payload);
        meta
    }

    async fn scripted_server(response: BytesMut) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            // A Bolt request frame, protobuf codec.
            assert!(n > 22);
            assert_eq!(buf[0], 1);
            stream.write_all(&response).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_echo_call_over_loopback() {
        let addr = scripted_server(canned_response(ProtocolVersion::V1, "hello xyz", false)).await;

        let client = Client::new(ConnectionConfig::new(addr));
        client.connect().await.unwrap();
        let conn = client.connection();
        tokio::spawn(async move { conn.read_loop().await });

        let method = MethodDescriptor::new("com.example.Echo", "echoObj");
        let mut cntl = Controller::new();
        cntl.set_timeout_ms(2000);
        cntl.set_context(BoltContext::new());
        let request = EchoRequest {
            name: "xyz".to_owned(),
        };

        let (response, cntl): (EchoResponse, Controller) =
            client.call(&method, cntl, &request).await.unwrap();

        assert!(!cntl.failed(), "{:?}", cntl.failure());
        assert_eq!(response.message, "hello xyz");
        let context = cntl.context().unwrap();
        assert_eq!(
            context.response_class_name(),
            "com.alipay.sofa.rpc.core.response.SofaResponse"
        );
        assert_eq!(context.response_status(), Some(0));
    }

    #[tokio::test]
    async fn test_split_response_delivery() {
        // The server dribbles the response out in two writes; the read
        // loop must reassemble across reads.
        let response = canned_response(ProtocolVersion::V1, "split", false);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            stream.read(&mut buf).await.unwrap();
            stream.write_all(&response[..10]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            stream.write_all(&response[10..]).await.unwrap();
        });

        let client = Client::new(ConnectionConfig::new(addr));
        client.connect().await.unwrap();
        let conn = client.connection();
        tokio::spawn(async move { conn.read_loop().await });

        let method = MethodDescriptor::new("com.example.Echo", "echoObj");
        let mut cntl = Controller::new();
        cntl.set_timeout_ms(2000);
        let request = EchoRequest {
            name: "xyz".to_owned(),
        };
        let (response, cntl): (EchoResponse, Controller) =
            client.call(&method, cntl, &request).await.unwrap();

        assert!(!cntl.failed(), "{:?}", cntl.failure());
        assert_eq!(response.message, "split");
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_connection() {
        // Two tasks call concurrently. Bolt frames carry no correlation
        // field, so the connection must serialize the calls; each task
        // still gets a complete, uncorrupted response.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            for message in ["one", "two"] {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0);
                let response = canned_response(ProtocolVersion::V1, message, false);
                stream.write_all(&response).await.unwrap();
            }
        });

        let client = Arc::new(Client::new(ConnectionConfig::new(addr)));
        client.connect().await.unwrap();
        let conn = client.connection();
        tokio::spawn(async move { conn.read_loop().await });

        let call = |client: Arc<Client>| async move {
            let method = MethodDescriptor::new("com.example.Echo", "echoObj");
            let mut cntl = Controller::new();
            cntl.set_timeout_ms(2000);
            let request = EchoRequest {
                name: "xyz".to_owned(),
            };
            let (response, cntl): (EchoResponse, Controller) =
                client.call(&method, cntl, &request).await.unwrap();
            assert!(!cntl.failed(), "{:?}", cntl.failure());
            response.message
        };

        let (first, second) = tokio::join!(call(client.clone()), call(client.clone()));
        let mut messages = [first, second];
        messages.sort();
        assert_eq!(messages, ["one".to_owned(), "two".to_owned()]);
    }

    #[tokio::test]
    async fn test_call_without_connect() {
        let client = Client::new(ConnectionConfig::new("127.0.0.1:12200".parse().unwrap()));
        let method = MethodDescriptor::new("com.example.Echo", "echoObj");
        let result: Result<(EchoResponse, Controller), _> = client
            .call(
                &method,
                Controller::new(),
                &EchoRequest {
                    name: "x".to_owned(),
                },
            )
            .await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }
}
