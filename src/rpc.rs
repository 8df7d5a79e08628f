//! The `Rpc` singleton (§4.9, §6 / C8): owns every POA, every listener, and
//! the outbound connection cache stubs draw from when resolving an
//! `ObjectId` to a live [`Session`].

use std::sync::Arc;

use ahash::HashMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use nprpc_codec::endpoint::{Endpoint, Transport};
use nprpc_service::{Poa, PoaBuilder, PoaError};

use crate::config::LogLevel;
use crate::error::Error;
use crate::session::{Session, SessionState};
use crate::statistics::Statistics;
use crate::transport::{self, DEFAULT_MAX_MESSAGE_SIZE};

pub struct SslMaterial {
    pub certificate_chain: std::path::PathBuf,
    pub private_key: std::path::PathBuf,
}

pub struct RpcBuilder {
    hostname: String,
    tcp_port: Option<u16>,
    http_port: Option<u16>,
    quic_port: Option<u16>,
    udp_port: Option<u16>,
    ssl: Option<SslMaterial>,
    enable_http3: bool,
    root_dir: Option<std::path::PathBuf>,
    log_level: LogLevel,
    max_message_size: usize,
}

impl Default for RpcBuilder {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            tcp_port: None,
            http_port: None,
            quic_port: None,
            udp_port: None,
            ssl: None,
            enable_http3: false,
            root_dir: None,
            log_level: LogLevel::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl RpcBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_tcp(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    pub fn with_http(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    pub fn with_quic(mut self, port: u16) -> Self {
        self.quic_port = Some(port);
        self
    }

    pub fn with_udp(mut self, port: u16) -> Self {
        self.udp_port = Some(port);
        self
    }

    pub fn ssl(mut self, certificate_chain: impl Into<std::path::PathBuf>, private_key: impl Into<std::path::PathBuf>) -> Self {
        self.ssl = Some(SslMaterial {
            certificate_chain: certificate_chain.into(),
            private_key: private_key.into(),
        });
        self
    }

    pub fn enable_http3(mut self) -> Self {
        self.enable_http3 = true;
        self
    }

    pub fn root_dir(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    pub fn set_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Validates configuration before constructing the singleton (§4.12):
    /// HTTP/3 and QUIC both need TLS material, and the max message size
    /// must be able to hold at least a bare Header.
    pub fn build(self) -> Result<Arc<Rpc>, Error> {
        if (self.quic_port.is_some() || self.enable_http3) && self.ssl.is_none() {
            return Err(Error::Config(
                "HTTP/3 and QUIC listeners require ssl() certificate material".to_string(),
            ));
        }

        if self.max_message_size < nprpc_codec::header::HEADER_SIZE {
            return Err(Error::Config("max_message_size too small to hold a Header".to_string()));
        }

        Ok(Arc::new(Rpc {
            origin: Uuid::new_v4(),
            hostname: self.hostname,
            tcp_port: self.tcp_port,
            http_port: self.http_port,
            quic_port: self.quic_port,
            udp_port: self.udp_port,
            ssl: self.ssl,
            enable_http3: self.enable_http3,
            root_dir: self.root_dir,
            log_level: self.log_level,
            max_message_size: self.max_message_size,
            poas: RwLock::new(Vec::new()),
            connections: Mutex::new(HashMap::default()),
            statistics: Statistics::default(),
        }))
    }
}

pub struct Rpc {
    origin: Uuid,
    hostname: String,
    tcp_port: Option<u16>,
    http_port: Option<u16>,
    #[allow(dead_code)]
    quic_port: Option<u16>,
    #[allow(dead_code)]
    udp_port: Option<u16>,
    #[allow(dead_code)]
    ssl: Option<SslMaterial>,
    #[allow(dead_code)]
    enable_http3: bool,
    #[allow(dead_code)]
    root_dir: Option<std::path::PathBuf>,
    log_level: LogLevel,
    max_message_size: usize,
    poas: RwLock<Vec<Arc<Poa>>>,
    connections: Mutex<HashMap<(Uuid, String), Arc<Session>>>,
    statistics: Statistics,
}

impl Rpc {
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Registers a new POA, assigning it the next `poa_idx` (§4.8).
    pub fn create_poa(&self, builder: PoaBuilder) -> Result<Arc<Poa>, PoaError> {
        let mut poas = self.poas.write();
        let poa_idx = poas.len() as u16;
        let poa = Arc::new(builder.build(poa_idx)?);
        poas.push(poa.clone());
        Ok(poa)
    }

    /// A point-in-time snapshot of the POA table, the form [`Session`]
    /// needs to resolve `poa_idx` during dispatch.
    pub fn poas(&self) -> Arc<Vec<Arc<Poa>>> {
        Arc::new(self.poas.read().clone())
    }

    /// Starts every listener this builder configured. Runs until the first
    /// listener errors.
    pub async fn serve(self: &Arc<Self>) -> Result<(), Error> {
        let mut tasks = Vec::new();

        #[cfg(feature = "tcp")]
        if let Some(port) = self.tcp_port {
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
            let poas = self.poas();
            let statistics = self.statistics.clone();
            tasks.push(tokio::spawn(async move { transport::tcp::serve(addr, poas, statistics).await }));
        }

        // HTTP POST (`/rpc`) and WebSocket upgrade (`/ws`) share one
        // listener on `http_port` — they're both axum routers, merged
        // rather than bound twice on the same address.
        #[cfg(any(feature = "websocket", feature = "http"))]
        if let Some(port) = self.http_port {
            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

            #[allow(unused_mut)]
            let mut app = axum::Router::new();

            #[cfg(feature = "http")]
            {
                let state = transport::http::HttpState {
                    poas: self.poas(),
                    statistics: self.statistics.clone(),
                };
                app = app.merge(transport::http::router(state));
            }

            #[cfg(feature = "websocket")]
            {
                let state = transport::websocket::WebSocketState {
                    poas: self.poas(),
                    statistics: self.statistics.clone(),
                };
                app = app.merge(transport::websocket::router(state));
            }

            tasks.push(tokio::spawn(async move {
                let app = app.into_make_service_with_connect_info::<std::net::SocketAddr>();
                let listener = tokio::net::TcpListener::bind(addr).await?;
                axum::serve(listener, app).await?;
                Ok(())
            }));
        }

        for task in tasks {
            task.await.map_err(|join_err| {
                Error::Config(format!("listener task panicked: {join_err}"))
            })??;
        }

        Ok(())
    }

    /// Resolves an outbound session for `(origin, endpoint)`, reusing a
    /// cached one unless it's `Closing`/`Closed` (§4.9 connection cache
    /// policy). Keyed on `origin` as well as the endpoint URL because two
    /// distinct peers can advertise the same host:port (e.g. behind a NAT
    /// or after a process restart reused the port) and must not share a
    /// cached session.
    pub async fn connect(self: &Arc<Self>, origin: Uuid, endpoint: &Endpoint) -> Result<Arc<Session>, Error> {
        let key = (origin, endpoint.to_url());

        if let Some(session) = self.connections.lock().get(&key).cloned() {
            if session.state() == SessionState::Active {
                return Ok(session);
            }
        }

        let session = match endpoint.transport {
            Transport::Tcp | Transport::TcpTethered => {
                transport::tcp::connect(endpoint.clone(), self.poas(), self.statistics.clone()).await?
            }
            other => {
                return Err(Error::Config(format!(
                    "no outbound connector implemented for transport {other:?}"
                )));
            }
        };

        self.connections.lock().insert(key, session.clone());
        Ok(session)
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quic_without_ssl_material_is_rejected() {
        let result = RpcBuilder::new().with_quic(4433).build();
        assert!(result.is_err());
    }

    #[test]
    fn create_poa_assigns_sequential_indices() {
        let rpc = RpcBuilder::new().build().unwrap();
        let first = rpc.create_poa(PoaBuilder::new()).unwrap();
        let second = rpc.create_poa(PoaBuilder::new()).unwrap();
        assert_eq!(first.poa_idx(), 0);
        assert_eq!(second.poa_idx(), 1);
    }
}
