//! Error types for Stampede

use thiserror::Error;

/// Boxed driver error carried verbatim as the source of a classified error
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using Stampede's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Stampede
///
/// The first five variants are the session taxonomy surfaced to scripts.
/// Driver failures are classified by the phase they occurred in and kept
/// as the `source()` of the variant, never translated.
#[derive(Error, Debug)]
pub enum Error {
    // URI invalid or transport-level dial failure
    #[error("Connection error: {0}")]
    Connection(#[source] BoxError),

    // Reachability probe failed after a successful dial
    #[error("Reachability error: {0}")]
    Reachability(#[source] BoxError),

    // Operation issued on a session that never connected
    #[error("Not connected: {0} requires a successful connect")]
    NotConnected(&'static str),

    // Pipeline issuance failed
    #[error("Query error: {0}")]
    Query(#[source] BoxError),

    // Cursor failed while being drained
    #[error("Materialization error: {0}")]
    Materialization(#[source] BoxError),

    // Execution context cancelled
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // Execution context deadline exceeded
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // Module registry errors
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module already registered: {0}")]
    AlreadyRegistered(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn connection(err: impl Into<BoxError>) -> Self {
        Error::Connection(err.into())
    }

    pub fn reachability(err: impl Into<BoxError>) -> Self {
        Error::Reachability(err.into())
    }

    pub fn query(err: impl Into<BoxError>) -> Self {
        Error::Query(err.into())
    }

    pub fn materialization(err: impl Into<BoxError>) -> Self {
        Error::Materialization(err.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Stable error name exposed to scripts.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "ConnectionError",
            Error::Reachability(_) => "ReachabilityError",
            Error::NotConnected(_) => "NotConnectedError",
            Error::Query(_) => "QueryError",
            Error::Materialization(_) => "MaterializationError",
            Error::Cancelled(_) => "ContextCancelled",
            Error::Timeout(_) => "DeadlineExceeded",
            Error::ModuleNotFound(_) => "ModuleNotFound",
            Error::AlreadyRegistered(_) => "AlreadyRegistered",
            Error::Config(_) => "ConfigError",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::Serialization(_) => "SerializationError",
            Error::Io(_) => "IoError",
        }
    }

    /// True when the error came from the caller's execution context rather
    /// than from the database.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Error::Cancelled(_) | Error::Timeout(_))
    }

    /// True for failures raised by `connect`.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Reachability(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected("aggregate");
        assert_eq!(
            err.to_string(),
            "Not connected: aggregate requires a successful connect"
        );

        let err = Error::connection("invalid scheme");
        assert_eq!(err.to_string(), "Connection error: invalid scheme");
    }

    #[test]
    fn test_driver_error_kept_as_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::reachability(io_err);

        let source = err.source().expect("source should be preserved");
        let io = source
            .downcast_ref::<std::io::Error>()
            .expect("source should be the original io error");
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_codes() {
        assert_eq!(Error::connection("x").code(), "ConnectionError");
        assert_eq!(Error::reachability("x").code(), "ReachabilityError");
        assert_eq!(Error::NotConnected("aggregate").code(), "NotConnectedError");
        assert_eq!(Error::query("x").code(), "QueryError");
        assert_eq!(Error::materialization("x").code(), "MaterializationError");
        assert_eq!(Error::Cancelled("aggregate".into()).code(), "ContextCancelled");
        assert_eq!(Error::Timeout("aggregate".into()).code(), "DeadlineExceeded");
    }

    #[test]
    fn test_classification() {
        assert!(Error::Cancelled("connect".into()).is_context_error());
        assert!(Error::Timeout("connect".into()).is_context_error());
        assert!(!Error::query("x").is_context_error());

        assert!(Error::connection("x").is_connect_failure());
        assert!(Error::reachability("x").is_connect_failure());
        assert!(!Error::NotConnected("aggregate").is_connect_failure());
    }
}
