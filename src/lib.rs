pub mod config;
pub mod error;
pub mod rpc;
pub mod session;
pub mod spin;
pub mod statistics;
pub mod transport;

pub use error::Error;
pub use rpc::{Rpc, RpcBuilder};
pub use session::Session;
pub use statistics::Statistics;

pub use nprpc_codec as codec;
pub use nprpc_service as service;

use std::sync::Arc;

use config::Config;

/// Builds the `Rpc` singleton from a loaded [`Config`] and starts every
/// listener it names. Left open for an embedder to call `rpc.create_poa(...)`
/// and activate servants before listeners start accepting — this function
/// only wires the transport layer up, it never owns application POAs.
///
/// In order to let an integration test directly use this crate and drive a
/// server loop, this is a function rather than inline `main` logic.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<Arc<Rpc>> {
    let mut builder = RpcBuilder::new().hostname(config.rpc.hostname.clone());

    if let Some(port) = config.rpc.tcp_port {
        builder = builder.with_tcp(port);
    }
    if let Some(port) = config.rpc.http_port {
        builder = builder.with_http(port);
    }
    if let Some(port) = config.rpc.quic_port {
        builder = builder.with_quic(port);
    }
    if let Some(port) = config.rpc.udp_port {
        builder = builder.with_udp(port);
    }
    if let Some(ssl) = &config.rpc.ssl {
        builder = builder.ssl(ssl.certificate_chain.clone(), ssl.private_key.clone());
    }
    if config.rpc.enable_http3 {
        builder = builder.enable_http3();
    }
    if let Some(root_dir) = &config.rpc.root_dir {
        builder = builder.root_dir(root_dir.clone());
    }

    let rpc = builder.set_log_level(config.log.level).build()?;

    {
        let rpc = rpc.clone();
        tokio::spawn(async move {
            if let Err(err) = rpc.serve().await {
                log::error!("listener loop ended: {err}");
            }
        });
    }

    Ok(rpc)
}
