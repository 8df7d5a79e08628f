//! Framed TCP transport (§4.7): Nagle disabled, the Header's `size` field
//! doubles as the frame length.

use std::sync::Arc;

use nprpc_codec::endpoint::{Endpoint, Transport};
use tokio::net::{TcpListener, TcpStream};

use crate::error::Error;
use crate::session::Session;
use crate::statistics::Statistics;
use nprpc_service::Poa;

use super::{DEFAULT_MAX_MESSAGE_SIZE, spawn_framed_session};

/// Binds a listener and spawns one session per accepted connection. Runs
/// until the listener errors; the caller typically `tokio::spawn`s this.
pub async fn serve(
    listen: std::net::SocketAddr,
    poas: Arc<Vec<Arc<Poa>>>,
    statistics: Statistics,
) -> Result<(), Error> {
    let listener = TcpListener::bind(listen).await?;
    log::info!("tcp listener bound on {listen}");

    loop {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;

        let remote_endpoint = Endpoint::new(Transport::Tcp, addr.ip().to_string(), addr.port());
        let poas = poas.clone();
        let reporter = statistics.register(remote_endpoint.to_url());

        spawn_framed_session(stream, remote_endpoint, poas, reporter, DEFAULT_MAX_MESSAGE_SIZE);
    }
}

/// Opens an outbound session, for the client connection cache (§4.9).
pub async fn connect(
    endpoint: Endpoint,
    poas: Arc<Vec<Arc<Poa>>>,
    statistics: Statistics,
) -> Result<Arc<Session>, Error> {
    let stream = TcpStream::connect((endpoint.hostname.as_str(), endpoint.port)).await?;
    stream.set_nodelay(true)?;

    let reporter = statistics.register(endpoint.to_url());
    Ok(spawn_framed_session(stream, endpoint, poas, reporter, DEFAULT_MAX_MESSAGE_SIZE))
}
