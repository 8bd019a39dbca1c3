//! Error handling for qrumio.
//!
//! Provides a unified error type based on gRPC status codes, with mapping
//! from the underlying transport and runtime errors to appropriate
//! categories.
//!
//! The categories that matter to callers here:
//! * [`ErrorKind::Unavailable`] - host unreachable or connection refused;
//!   worth retrying with backoff
//! * [`ErrorKind::DeadlineExceeded`] - handshake or probe timed out
//! * [`ErrorKind::Aborted`] - channel closed mid-operation
//! * [`ErrorKind::FailedPrecondition`] - command dispatched while not
//!   connected; the command is dropped
//! * [`ErrorKind::InvalidArgument`] - malformed scanned token

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for qrumio operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// Operation was cancelled by the caller.
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// Unknown or uncategorized error.
    #[error("unknown error")]
    Unknown = 2,

    /// Invalid argument, such as a malformed scanned token.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// A bounded operation exceeded its deadline.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// Requested resource does not exist.
    #[error("not found")]
    NotFound = 5,

    /// System not in the required state, such as emitting on a channel
    /// that is not connected.
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// Operation was interrupted mid-flight, such as the channel closing
    /// under an in-progress command.
    #[error("operation aborted")]
    Aborted = 10,

    /// Value outside its allowed bounds.
    #[error("out of range")]
    OutOfRange = 11,

    /// Invariant violation inside this crate.
    #[error("internal error")]
    Internal = 13,

    /// Remote host unreachable or refusing connections.
    #[error("service unavailable")]
    Unavailable = 14,

    /// Unrecoverable data corruption, such as undecodable wire frames.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

macro_rules! constructor {
    ($name:ident, $kind:ident) => {
        #[doc = concat!("Creates a new [`ErrorKind::", stringify!($kind), "`] error.")]
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    constructor!(aborted, Aborted);
    constructor!(cancelled, Cancelled);
    constructor!(data_loss, DataLoss);
    constructor!(deadline_exceeded, DeadlineExceeded);
    constructor!(failed_precondition, FailedPrecondition);
    constructor!(internal, Internal);
    constructor!(invalid_argument, InvalidArgument);
    constructor!(not_found, NotFound);
    constructor!(out_of_range, OutOfRange);
    constructor!(unavailable, Unavailable);
    constructor!(unknown, Unknown);
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts WebSocket errors into appropriate error kinds.
///
/// Maps WebSocket errors based on their type:
/// * `ConnectionClosed`/`AlreadyClosed` -> `Aborted`
/// * `Io` -> through the IO error mapping
/// * `Capacity`/`WriteBufferFull` -> `OutOfRange`
/// * etc.
impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error::*;
        match err {
            ConnectionClosed | AlreadyClosed => Self::aborted(err),
            Io(err) => err.into(),
            Tls(err) => Self::unavailable(err),
            Capacity(err) => Self::out_of_range(err),
            Protocol(err) => Self::data_loss(err),
            WriteBufferFull(_) => Self::out_of_range("write buffer full"),
            Utf8 => Self::invalid_argument(err),
            AttackAttempt => Self::data_loss(err),
            Url(err) => Self::invalid_argument(err),
            Http(_) => Self::unavailable("handshake rejected by server"),
            HttpFormat(err) => Self::internal(err),
        }
    }
}

/// Converts JSON errors to `DataLoss`.
///
/// JSON only crosses this crate's boundary as wire frames, so a parse
/// failure means the frame is corrupt.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::data_loss(err)
    }
}

/// Converts timeout errors to `DeadlineExceeded`.
impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(err)
    }
}

/// Converts integer parsing errors to `InvalidArgument`.
impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::invalid_argument(err)
    }
}
