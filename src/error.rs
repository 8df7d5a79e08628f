//! Crate-wide error type (§7 / C11): either a protocol-level exception
//! surfaced to a stub caller, or a transport failure folded into
//! `CommFailure`.

use nprpc_codec::header::ExceptionKind;

#[derive(Debug)]
pub enum Error {
    Exception(ExceptionKind),
    Io(std::io::Error),
    Codec(nprpc_codec::Error),
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Exception(kind) => write!(f, "{kind}"),
            Error::Io(err) => write!(f, "transport error: {err}"),
            Error::Codec(err) => write!(f, "codec error: {err:?}"),
            Error::Config(message) => write!(f, "configuration error: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Exception(kind) => Some(kind),
            Error::Io(err) => Some(err),
            Error::Codec(err) => Some(err),
            Error::Config(_) => None,
        }
    }
}

impl From<ExceptionKind> for Error {
    fn from(kind: ExceptionKind) -> Self {
        Error::Exception(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nprpc_codec::Error> for Error {
    fn from(err: nprpc_codec::Error) -> Self {
        Error::Codec(err)
    }
}

impl Error {
    /// Fold a transport-layer failure into the wire exception taxonomy, the
    /// way a stub surfaces `send_and_wait` failures to its caller (§4.9).
    pub fn as_exception(&self) -> ExceptionKind {
        match self {
            Error::Exception(kind) => kind.clone(),
            Error::Io(err) => ExceptionKind::CommFailure { what: err.to_string() },
            Error::Codec(_) => ExceptionKind::BadInput,
            Error::Config(message) => ExceptionKind::CommFailure {
                what: message.clone(),
            },
        }
    }
}
