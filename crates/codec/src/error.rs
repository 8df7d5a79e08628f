use std::{array::TryFromSliceError, str::Utf8Error};

/// Errors raised while encoding or decoding wire data.
///
/// This is distinct from [`crate::header::ExceptionKind`]: `Error` is a
/// local decode/encode failure (malformed bytes, an offset out of range),
/// while `ExceptionKind` is the protocol-level value carried back to a
/// remote caller in an `Answer`.
#[derive(Debug)]
pub enum Error {
    /// A relative offset or count would read past the end of the buffer.
    OutOfBounds,
    /// A `msg_id` field did not match the canonical 0..=12 set.
    UnknownMessageId(u32),
    /// The leading 4 bytes did not contain a plausible header.
    InvalidHeader,
    Utf8(Utf8Error),
    TryFromSlice(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSlice(value)
    }
}
