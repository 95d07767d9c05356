//! Error types for configuration, management operations and delivery

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the audit subsystem
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Named resource (formatter, handler, reference) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource conflict (duplicate name, still referenced, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid attribute value
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// TLS material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is an administrative rejection of a management
    /// operation (as opposed to an I/O or internal failure)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::NotFound(_)
                | Error::Conflict(_)
                | Error::ValidationError(_)
                | Error::Tls(_)
        )
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Delivery failure reported by a transport
///
/// Never surfaced to the caller of [`AuditLogManager::log`](crate::audit::AuditLogManager::log);
/// it only drives the owning handler's failure accounting.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O failure while opening or writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer did not accept a connection in time
    #[error("connection to {address} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Destination address
        address: String,
        /// Configured connect timeout
        timeout: Duration,
    },

    /// The peer stopped accepting data
    #[error("write to {address} timed out after {timeout:?}")]
    WriteTimeout {
        /// Destination address
        address: String,
        /// Configured write timeout
        timeout: Duration,
    },

    /// A reconnect is not allowed yet
    #[error("reconnect to {address} suppressed for another {remaining:?}")]
    ReconnectPending {
        /// Destination address
        address: String,
        /// Time left until the next attempt is allowed
        remaining: Duration,
    },

    /// TLS handshake or name resolution failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// The destination host name did not resolve
    #[error("could not resolve {0}")]
    Resolve(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_classification() {
        assert!(Error::NotFound("handler x".into()).is_configuration_error());
        assert!(Error::Conflict("dup".into()).is_configuration_error());
        assert!(Error::ValidationError("port".into()).is_configuration_error());
        assert!(!Error::Internal("boom".into()).is_configuration_error());
        assert!(!Error::Io(std::io::Error::other("disk")).is_configuration_error());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::ReconnectPending {
            address: "127.0.0.1:514".into(),
            remaining: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("127.0.0.1:514"));
        assert!(err.to_string().contains("suppressed"));
    }
}
