//! Error management.

use thiserror::Error;

/// The error taxonomy shared by every layer of the client: transport, dispatcher, context and
/// stream. Mirrors the error codes a server reply can carry, plus the purely local failure modes
/// (forked process detection, protocol violations detected before a reply even arrives).
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PulseError {
    /// Access failure (e.g. insufficient permission on a local socket or cookie file).
    #[error("access denied")]
    Access,
    /// No authentication key, or an invalid one, was presented.
    #[error("authentication failed")]
    AuthKey,
    /// The peer actively refused the connection.
    #[error("connection refused")]
    ConnectionRefused,
    /// A previously established connection was terminated.
    #[error("connection terminated")]
    ConnectionTerminated,
    /// The caller forked without calling `execve()` and then tried to reuse the context.
    #[error("process forked, context no longer usable")]
    Forked,
    /// An internal consistency error was detected; never expected in correct operation.
    #[error("internal error")]
    Internal,
    /// An argument, reply field, or combination of state was invalid.
    #[error("invalid argument")]
    Invalid,
    /// The server address supplied (explicitly or via environment) was malformed.
    #[error("invalid server")]
    InvalidServer,
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(IoErrorKind),
    /// The connection, or an object on it, was killed by the server.
    #[error("killed")]
    Killed,
    /// The requested data is not available (e.g. timing info before the first successful
    /// timing update).
    #[error("no data")]
    NoData,
    /// The requested feature is not supported by the server or the negotiated protocol version.
    #[error("not supported")]
    NotSupported,
    /// A framing or tag-struct decoding rule was violated; fatal to the owning context.
    #[error("protocol error")]
    Protocol,
    /// A request timed out waiting for a reply.
    #[error("timed out")]
    Timeout,
    /// The negotiated protocol version is too old for the requested operation.
    #[error("incompatible protocol version")]
    Version,
    /// The call was made while the object was in a state that does not permit it.
    #[error("bad state")]
    BadState,
    /// No entity by that name/index exists.
    #[error("not found")]
    NotFound,
    /// The error code returned by the server was not one this client understands.
    #[error("unknown error")]
    Unknown,
}

/// A cloneable stand-in for [`std::io::ErrorKind`], since [`std::io::Error`] itself is not `Clone`
/// and [`PulseError`] is copied into the "last error" slot of contexts and streams.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    NotConnected,
    AddrInUse,
    AddrNotAvailable,
    BrokenPipe,
    WouldBlock,
    InvalidInput,
    TimedOut,
    WriteZero,
    Interrupted,
    UnexpectedEof,
    Other,
}

impl std::fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<std::io::ErrorKind> for IoErrorKind {
    fn from(k: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind as K;
        match k {
            K::NotFound => IoErrorKind::NotFound,
            K::PermissionDenied => IoErrorKind::PermissionDenied,
            K::ConnectionRefused => IoErrorKind::ConnectionRefused,
            K::ConnectionReset => IoErrorKind::ConnectionReset,
            K::ConnectionAborted => IoErrorKind::ConnectionAborted,
            K::NotConnected => IoErrorKind::NotConnected,
            K::AddrInUse => IoErrorKind::AddrInUse,
            K::AddrNotAvailable => IoErrorKind::AddrNotAvailable,
            K::BrokenPipe => IoErrorKind::BrokenPipe,
            K::WouldBlock => IoErrorKind::WouldBlock,
            K::InvalidInput => IoErrorKind::InvalidInput,
            K::TimedOut => IoErrorKind::TimedOut,
            K::WriteZero => IoErrorKind::WriteZero,
            K::Interrupted => IoErrorKind::Interrupted,
            K::UnexpectedEof => IoErrorKind::UnexpectedEof,
            _ => IoErrorKind::Other,
        }
    }
}

impl From<std::io::Error> for PulseError {
    fn from(e: std::io::Error) -> Self {
        PulseError::Io(e.kind().into())
    }
}

/// Convenience alias used throughout the crate and its sibling crates.
pub type Result<T> = std::result::Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_round_trips_kind() {
        let e = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        let pe: PulseError = e.into();
        assert_eq!(pe, PulseError::Io(IoErrorKind::WouldBlock));
    }

    #[test]
    fn display_is_non_empty() {
        for e in [PulseError::Access, PulseError::Timeout, PulseError::Forked] {
            assert!(!e.to_string().is_empty());
        }
    }
}
