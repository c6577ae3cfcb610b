//! Error handling for the Stratum simulator
//!
//! Errors are split by how far they reach: configuration errors stop the
//! process before it listens, transport errors end a single session, and
//! nothing internal is ever reported to the remote peer.

use std::io::ErrorKind;
use thiserror::Error;

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Stratum simulator
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors, including every transport failure on a session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Listener errors (bind/accept)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Work template errors
    #[error("Invalid work template: {message}")]
    Template { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a work template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Check if the error means the peer went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Config { .. } => "config",
            Error::Network { .. } => "network",
            Error::Template { .. } => "template",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("difficulty must be in (0, 1]");
        assert_eq!(
            err.to_string(),
            "Configuration error: difficulty must be in (0, 1]"
        );

        let err = Error::template("prevhash is not hex");
        assert_eq!(err.to_string(), "Invalid work template: prevhash is not hex");
    }

    #[test]
    fn test_error_conversions() {
        let io_err = std::io::Error::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.category(), "io");

        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_disconnect_classification() {
        for kind in [
            ErrorKind::BrokenPipe,
            ErrorKind::ConnectionReset,
            ErrorKind::ConnectionAborted,
            ErrorKind::UnexpectedEof,
        ] {
            let err: Error = std::io::Error::new(kind, "gone").into();
            assert!(err.is_disconnect(), "{:?} should be a disconnect", kind);
        }

        let err: Error = std::io::Error::new(ErrorKind::PermissionDenied, "nope").into();
        assert!(!err.is_disconnect());
        assert!(!Error::network("bind").is_disconnect());
    }
}
