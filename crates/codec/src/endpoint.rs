//! Network/shm addresses and their URI form (§4.2).

use crate::Error;

/// Transport kind tagging an [`Endpoint`]. `TcpTethered` marks a
/// child-process session sharing the parent's OS handle rather than a
/// distinct wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    TcpTethered,
    WebSocket,
    SecureWebSocket,
    SharedMemory,
    /// Not a standing connection — each HTTP POST is its own throwaway
    /// session — but still a distinct activation-flag discriminator
    /// (`ALLOW_HTTP`) and a distinct `Endpoint` scheme.
    Http,
}

impl Transport {
    fn scheme(self) -> &'static str {
        match self {
            Transport::Tcp | Transport::TcpTethered => "tcp",
            Transport::WebSocket => "ws",
            Transport::SecureWebSocket => "wss",
            Transport::SharedMemory => "shm",
            Transport::Http => "http",
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(Transport::Tcp),
            "ws" => Some(Transport::WebSocket),
            "wss" => Some(Transport::SecureWebSocket),
            "shm" => Some(Transport::SharedMemory),
            "http" | "https" => Some(Transport::Http),
            _ => None,
        }
    }
}

/// `<scheme>://<host>:<port>[/<path>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub transport: Transport,
    pub hostname: String,
    pub port: u16,
    pub path: Option<String>,
}

impl Endpoint {
    pub fn new(transport: Transport, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            hostname: hostname.into(),
            port,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// # Test
    ///
    /// ```
    /// use nprpc_codec::endpoint::{Endpoint, Transport};
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:6502").unwrap();
    /// assert_eq!(endpoint.transport, Transport::Tcp);
    /// assert_eq!(endpoint.hostname, "127.0.0.1");
    /// assert_eq!(endpoint.port, 6502);
    /// assert_eq!(endpoint.path, None);
    ///
    /// let with_path = Endpoint::parse("ws://example.com:8080/rpc").unwrap();
    /// assert_eq!(with_path.path.as_deref(), Some("/rpc"));
    /// ```
    pub fn parse(url: &str) -> Result<Self, Error> {
        let (scheme, rest) = url.split_once("://").ok_or(Error::InvalidHeader)?;
        let transport = Transport::from_scheme(scheme).ok_or(Error::InvalidHeader)?;

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(format!("/{path}"))),
            None => (rest, None),
        };

        let (hostname, port) = authority.rsplit_once(':').ok_or(Error::InvalidHeader)?;
        let port: u16 = port.parse().map_err(|_| Error::InvalidHeader)?;

        Ok(Self {
            transport,
            hostname: hostname.to_string(),
            port,
            path,
        })
    }

    pub fn to_url(&self) -> String {
        match &self.path {
            Some(path) => format!(
                "{}://{}:{}{}",
                self.transport.scheme(),
                self.hostname,
                self.port,
                path
            ),
            None => format!("{}://{}:{}", self.transport.scheme(), self.hostname, self.port),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_to_url() {
        for url in [
            "tcp://127.0.0.1:6502",
            "ws://example.com:8080/rpc",
            "wss://example.com:443/rpc",
            "shm://local:0",
        ] {
            assert_eq!(Endpoint::parse(url).unwrap().to_url(), url);
        }
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(Endpoint::parse("ftp://host:21").is_err());
    }
}
