//! Error taxonomy for the measurement core.
//!
//! Three kinds matter to callers: configuration errors abort a test or
//! connection before any async work starts, network errors are captured into
//! the measurement record and never unwind past the test boundary, and value
//! errors surface only to whichever code path performed a typed settings
//! extraction.

use std::io;

use thiserror::Error;

/// Typed extraction from a settings entry failed.
///
/// Either the string did not parse as the requested type, or the parse did
/// not consume the whole string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot interpret {input:?} as {wanted}")]
pub struct ValueError {
    /// The canonical string that failed to convert.
    pub input: String,
    /// Name of the requested type.
    pub wanted: &'static str,
}

/// A test or connection cannot start because its configuration is unusable.
///
/// Surfaced synchronously to the caller, before any reactor interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing required setting {0:?}")]
    Missing(String),

    /// A setting is present but does not parse as the expected type.
    #[error("invalid value for setting {key:?}")]
    Invalid {
        key: String,
        #[source]
        source: ValueError,
    },
}

/// A network-level failure during a measurement.
///
/// These are data, not control flow: the test machinery records them into
/// the result document and completes normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    /// Connection establishment did not finish within the configured bound.
    #[error("connection timed out")]
    Timeout,

    /// The remote endpoint actively refused the connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// Hostname resolution yielded no usable address.
    #[error("dns lookup failed for {0:?}")]
    DnsLookup(String),

    /// Any other socket-level error, flattened to its message.
    #[error("network error: {0}")]
    Io(String),
}

impl NetError {
    /// The stable failure string written into measurement records.
    ///
    /// Vocabulary follows the OONI data format so records from this engine
    /// aggregate cleanly with records from other probes.
    pub fn failure_string(&self) -> &str {
        match self {
            NetError::Timeout => "generic_timeout_error",
            NetError::ConnectionRefused => "connection_refused",
            NetError::DnsLookup(_) => "dns_lookup_error",
            NetError::Io(_) => "unknown_failure",
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::TimedOut => NetError::Timeout,
            _ => NetError::Io(err.to_string()),
        }
    }
}
