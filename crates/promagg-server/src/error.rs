//! Error types for the aggregator server.

use std::path::PathBuf;

use promagg_core::AggregateError;
use thiserror::Error;

/// Errors that can occur while configuring or running the aggregator.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind a listener.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(String, std::io::Error),

    /// A listener or scrape URI could not be parsed.
    #[error("invalid address {uri}: {reason}")]
    InvalidAddress {
        /// The rejected URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The URI scheme is not a supported transport for its role.
    #[error("unsupported scheme '{scheme}' for {role}")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
        /// Where the URI was used (`writes` or `scrapes`).
        role: &'static str,
    },

    /// Configuration values that are individually valid but conflict.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The declaration file could not be read.
    #[error("failed to read declaration file {path}: {source}")]
    DeclfileRead {
        /// Path of the declaration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The declaration file is not a JSON array of declarations.
    #[error("failed to parse declaration file {path}: {source}")]
    DeclfileParse {
        /// Path of the declaration file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// An initial declaration was rejected by the registry.
    #[error("invalid initial declaration: {0}")]
    Declaration(#[from] AggregateError),

    /// The HTTP server failed.
    #[error("http server error: {0}")]
    Http(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_failed_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = ServerError::BindFailed("tcp://127.0.0.1:8192".to_string(), io_err);

        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:8192"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn test_unsupported_scheme_display() {
        let err = ServerError::UnsupportedScheme {
            scheme: "udp".to_string(),
            role: "scrapes",
        };
        assert_eq!(err.to_string(), "unsupported scheme 'udp' for scrapes");
    }

    #[test]
    fn test_declaration_error_from() {
        let err: ServerError = AggregateError::MissingName.into();
        assert!(matches!(err, ServerError::Declaration(_)));
        assert!(err.to_string().contains("requires a name"));
    }

    #[test]
    fn test_declfile_read_display() {
        let err = ServerError::DeclfileRead {
            path: PathBuf::from("/nope.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/nope.json"));
    }
}
