//! sofa-bolt-cli - example echo client.
//!
//! Sends an echo request to a Bolt server every `--interval-ms`
//! milliseconds and logs the response metadata the codec surfaces.

mod echo;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::Parser;
use sofa_bolt_client::{Client, ClientError, ConnectionConfig};
use sofa_bolt_protocol::{BoltContext, Controller, MethodDescriptor, ProtocolVersion};
use tracing_subscriber::EnvFilter;

use echo::{EchoRequest, EchoResponse, Group};

#[derive(Parser)]
#[command(name = "sofa-bolt-cli")]
#[command(about = "Example echo client for the SOFA Bolt protocol")]
#[command(version)]
struct Cli {
    /// Bolt protocol version, 1 (v1) or 2 (v2)
    #[arg(long, default_value_t = 1)]
    sofa_bolt_version: u8,

    /// Enable crc check. Only valid for v2
    #[arg(long)]
    enable_crc_check: bool,

    /// Bolt service name
    #[arg(long, default_value = "")]
    service_name: String,

    /// Bolt service version
    #[arg(long, default_value = "1.0")]
    service_version: String,

    /// Address of the server
    #[arg(long, default_value = "127.0.0.1:12200")]
    server: SocketAddr,

    /// Connection type. Available values: single, pooled, short
    #[arg(long, default_value = "single")]
    connection_type: String,

    /// RPC timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: i64,

    /// Milliseconds between consecutive requests
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    /// The algorithm for load balancing
    #[arg(long, default_value = "")]
    load_balancer: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(version) = ProtocolVersion::from_wire(cli.sofa_bolt_version) else {
        tracing::error!(
            "unsupported bolt protocol version {}",
            cli.sofa_bolt_version
        );
        std::process::exit(1);
    };
    if cli.connection_type != "single" && !cli.connection_type.is_empty() {
        tracing::warn!(
            "connection type {:?} not implemented, using a single connection",
            cli.connection_type
        );
    }
    if !cli.load_balancer.is_empty() {
        tracing::warn!(
            "load balancer {:?} not implemented, talking to {} directly",
            cli.load_balancer,
            cli.server
        );
    }

    let client = Client::new(ConnectionConfig::new(cli.server));
    if let Err(err) = client.connect().await {
        tracing::error!("fail to initialize channel to {}: {}", cli.server, err);
        std::process::exit(1);
    }
    let conn = client.connection();
    tokio::spawn(async move {
        if let Err(err) = conn.read_loop().await {
            tracing::debug!("read loop stopped: {}", err);
        }
    });

    let method = MethodDescriptor::new("com.alipay.sofa.rpc.protobuf.ProtoService", "echoObj");
    let mut log_id: u64 = 0;

    loop {
        let request = EchoRequest {
            name: format!("xyz:{log_id}"),
            group: Group::A as i32,
        };

        let mut context = BoltContext::new();
        context.set_request_protocol_version(version);
        if cli.enable_crc_check {
            context.request_enable_crc32_check();
        }
        if !cli.service_name.is_empty() {
            context.set_request_service_name(cli.service_name.clone());
        }
        if !cli.service_version.is_empty() {
            context.set_request_service_version(cli.service_version.clone());
        }

        let mut cntl = Controller::new();
        cntl.set_timeout_ms(cli.timeout_ms);
        cntl.set_log_id(log_id);
        cntl.set_context(context);

        let started = Instant::now();
        match client
            .call::<EchoRequest, EchoResponse>(&method, cntl, &request)
            .await
        {
            Ok((response, cntl)) => {
                if let Some(failure) = cntl.failure() {
                    tracing::warn!("{failure}");
                } else {
                    if let Some(headers) =
                        cntl.context().and_then(BoltContext::response_header_map)
                    {
                        for (key, value) in headers {
                            tracing::info!("header {key}: {value}");
                        }
                    }
                    let class_name = cntl
                        .context()
                        .map(|c| c.response_class_name().to_owned())
                        .unwrap_or_default();
                    tracing::info!(
                        "received response from {}, class_name={}, code={}, message={}, latency={}us",
                        cli.server,
                        class_name,
                        response.code,
                        response.message,
                        started.elapsed().as_micros()
                    );
                }
            }
            Err(ClientError::Timeout) => {
                tracing::warn!("request timed out");
            }
            Err(err) => {
                tracing::error!("call failed: {err}");
                std::process::exit(1);
            }
        }

        log_id += 1;
        tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
    }
}
