//! Wire protocol for the nprpc object RPC runtime: the flat buffer
//! encoding, the message/call headers, object identifiers and network
//! endpoints. This crate is pure encode/decode logic with no I/O —
//! transports read frames off the wire and hand the bytes here.

pub mod endpoint;
pub mod error;
pub mod flatbuf;
pub mod header;
pub mod object_id;

pub use error::Error;
pub use header::{CallHeader, ExceptionKind, Header, MessageId, MessageType, ObjectIdLocal};
