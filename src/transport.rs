//! Network transport: the pooled HTTP client, WebSocket TLS settings and
//! connection-level error kinds.

pub mod http;
pub mod tls;

pub use http::{HttpTransport, TransportConfig};

/// Connection-level failures (DNS, TLS, refused connections, timeouts).
///
/// These never carry a service response; anything the server answered with
/// surfaces as [`crate::Error::Api`] instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure is likely transient from the caller's point of view.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Connect(_) => true,
            TransportError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            TransportError::WebSocket(_) => true,
            TransportError::Other(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Http(e)
        }
    }
}
