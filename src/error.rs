use crate::client::response::ResponseBody;
use crate::error_code::ErrorClass;
use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.url", "request.path")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected format, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "credential_resolver", "dispatcher")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the transport layer.
///
/// Every failure a caller can observe is one of these classified kinds, carrying
/// enough context (status, body, transport message) to diagnose without
/// inspecting internals. Nothing here is retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Token acquisition failed{}: {message}", format_status(.status))]
    TokenAcquisition {
        message: String,
        status: Option<u16>,
    },

    #[error("API error: HTTP {status} ({class}): {message}")]
    Api {
        status: u16,
        message: String,
        body: ResponseBody,
        class: ErrorClass,
        transaction_id: Option<String>,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("WebSocket handshake failed{}: {message}", format_status(.status))]
    Handshake {
        message: String,
        status: Option<u16>,
    },

    #[error("Stream protocol error: {message}")]
    StreamProtocol { message: String },

    #[error("Streaming session is closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" (HTTP {})", s),
        None => String::new(),
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn token_acquisition(msg: impl Into<String>, status: Option<u16>) -> Self {
        Error::TokenAcquisition {
            message: msg.into(),
            status,
        }
    }

    pub fn handshake(msg: impl Into<String>, status: Option<u16>) -> Self {
        Error::Handshake {
            message: msg.into(),
            status,
        }
    }

    pub fn stream_protocol(msg: impl Into<String>) -> Self {
        Error::StreamProtocol {
            message: msg.into(),
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::TokenAcquisition { status, .. } | Error::Handshake { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a caller-side retry with backoff is likely to succeed.
    ///
    /// This is a hint only; the library never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api { class, .. } => class.retryable(),
            Error::Transport(t) => t.is_transient(),
            Error::TokenAcquisition { status, .. } => match status {
                None => true,
                Some(s) => ErrorClass::from_http_status(*s).retryable(),
            },
            _ => false,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_display_includes_context() {
        let err = Error::configuration_with_context(
            "service URL is required",
            ErrorContext::new()
                .with_field_path("config.url")
                .with_source("client_builder"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: service URL is required (field: config.url, source: client_builder)"
        );
    }

    #[test]
    fn retry_hint_follows_status_class() {
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
            body: ResponseBody::Empty,
            class: ErrorClass::from_http_status(503),
            transaction_id: None,
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), Some(503));

        let err = Error::Api {
            status: 404,
            message: "not found".into(),
            body: ResponseBody::Empty,
            class: ErrorClass::from_http_status(404),
            transaction_id: None,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn unreachable_identity_endpoint_is_retryable() {
        assert!(Error::token_acquisition("connection refused", None).is_retryable());
        assert!(!Error::token_acquisition("bad key", Some(400)).is_retryable());
    }
}
