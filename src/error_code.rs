//! HTTP status classification for service errors.
//!
//! Endpoint wrappers and callers branch on [`ErrorClass`] rather than raw
//! status numbers when deciding whether to retry, re-authenticate, or give up.
//!
//! ## Example
//!
//! ```rust
//! use watson_lib_rust::error_code::ErrorClass;
//!
//! let class = ErrorClass::from_http_status(429);
//! assert_eq!(class.name(), "rate_limited");
//! assert!(class.retryable());
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 400: malformed request or invalid parameters
    InvalidRequest,
    /// 401: invalid, expired, or missing credentials
    Authentication,
    /// 403: valid credentials without sufficient permissions
    PermissionDenied,
    /// 404: resource (workspace, classifier, session, ...) does not exist
    NotFound,
    /// 406 / 415: unsupported Accept or Content-Type
    UnsupportedMedia,
    /// 409: state conflict
    Conflict,
    /// 413: payload too large
    RequestTooLarge,
    /// 429: rate limited
    RateLimited,
    /// 500 and other 5xx
    ServerError,
    /// 502 / 503: service temporarily unavailable
    Unavailable,
    /// 408 / 504
    Timeout,
    Unknown,
}

impl ErrorClass {
    /// Returns the snake_case name (e.g., `"not_found"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::UnsupportedMedia => "unsupported_media",
            Self::Conflict => "conflict",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Returns whether a caller-side retry is reasonable for this class.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Unavailable | Self::Timeout
        )
    }

    /// Maps an HTTP status code to its class.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            406 | 415 => Self::UnsupportedMedia,
            408 | 504 => Self::Timeout,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            502 | 503 => Self::Unavailable,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
