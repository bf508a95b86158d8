//! Error types for the session core
//!
//! One error enum covers the whole library surface: argument validation,
//! state-machine violations, resource failures and security failures.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Operation is not supported: {0}")]
    Unsupported(&'static str),

    #[error("No such property: {0}")]
    NoSuchProperty(String),

    #[error("Property \"{0}\" is read-only")]
    NotAllowed(String),

    #[error("No such action: {0}")]
    NotFound(String),

    #[error("No content to operate on")]
    NoData,

    #[error("Timed out waiting for session to become ready")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Security(#[from] SslErrorMessage),
}

/// Structured security failure, suitable for direct display by the host.
///
/// Mirrors what the TLS layer hands to popup sinks: a short title, a one
/// line summary and an optional longer description.
#[derive(Error, Debug, Clone)]
#[error("{title}: {text}")]
pub struct SslErrorMessage {
    /// Underlying library error code, 0 when not applicable
    pub code: u64,
    /// Short title ("Security error")
    pub title: &'static str,
    /// One-line summary
    pub text: String,
    /// Longer description, when available
    pub description: Option<String>,
}

impl SslErrorMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            code: 0,
            title: "Security error",
            text: text.into(),
            description: None,
        }
    }

    pub fn with_description(text: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: 0,
            title: "Security error",
            text: text.into(),
            description: Some(description.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_error_display() {
        let err = SslErrorMessage::with_description("Can't open CRL File", "No such file");
        assert_eq!(err.to_string(), "Security error: Can't open CRL File");
        assert_eq!(err.description.as_deref(), Some("No such file"));
    }
}
