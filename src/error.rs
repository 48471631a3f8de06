use std::io;

use thiserror::Error;

/// Rich, source-carrying error type for the scanning core and its CLI driver.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("failed to resolve host {host}: {source}")]
    Resolution { host: String, #[source] source: io::Error },

    #[error("failed to open raw socket: {0}")]
    SocketOpen(#[source] io::Error),

    #[error("failed to bind socket to interface {interface}: {source}")]
    BindInterface {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to set socket non-blocking: {0}")]
    SetNonblocking(#[source] io::Error),

    #[error("failed to send probe: {0}")]
    Send(#[source] io::Error),

    /// Retained for taxonomy parity; this crate's shutdown path goes through
    /// `ShutdownFlag` rather than an EINTR-style poll classification, so
    /// this variant is unreachable in practice (see `ChecksumAlloc`).
    #[error("poll interrupted by signal")]
    PollInterrupted,

    #[error("checksum scratch allocation failed")]
    ChecksumAlloc,
}

impl ScanError {
    /// Lightweight, `Copy` classification of this error, for callers (like
    /// `ProbeOutcome::Fatal`) that need to carry an error tag without also
    /// carrying the underlying `io::Error`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Argument(_) => ErrorKind::Argument,
            ScanError::Resolution { .. } => ErrorKind::Resolution,
            ScanError::SocketOpen(_) => ErrorKind::SocketOpen,
            ScanError::BindInterface { .. } => ErrorKind::BindInterface,
            ScanError::SetNonblocking(_) => ErrorKind::SetNonblocking,
            ScanError::Send(_) => ErrorKind::Send,
            ScanError::PollInterrupted => ErrorKind::PollInterrupted,
            ScanError::ChecksumAlloc => ErrorKind::ChecksumAlloc,
        }
    }
}

/// Tag-only counterpart of [`ScanError`], used where an error needs to flow
/// through a `Copy` enum (e.g. `ProbeOutcome::Fatal`) without dragging an
/// `io::Error` along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    Resolution,
    SocketOpen,
    BindInterface,
    SetNonblocking,
    Send,
    PollInterrupted,
    ChecksumAlloc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ScanError::PollInterrupted.kind(), ErrorKind::PollInterrupted);
        assert_eq!(ScanError::ChecksumAlloc.kind(), ErrorKind::ChecksumAlloc);
    }
}
