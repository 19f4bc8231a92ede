//! # watson-lib-rust
//!
//! Authenticated transport layer for remote AI services: credential
//! resolution, bearer-token lifecycle, request dispatch with normalised
//! responses and classified errors, and duplex streaming speech recognition.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use watson_lib_rust::{Request, ServiceClient, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> watson_lib_rust::Result<()> {
//!     let client = ServiceClient::builder("assistant")
//!         .config(ServiceConfig::from_env("assistant"))
//!         .registry_from_env(true)
//!         .build()?;
//!
//!     let request = Request::post("/v2/assistants/abc/sessions")
//!         .query("version", "2021-11-27")
//!         .build();
//!     let response = client.send(&request).await?;
//!     println!("{:?}", response.body());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Credential resolution, service registry, token manager, authenticators |
//! | [`client`] | Request values, dispatch, response envelope |
//! | [`streaming`] | WebSocket recognition sessions |
//! | [`transport`] | Pooled HTTP client and connection-level errors |
//! | [`config`] | Service configuration bag |

pub mod auth;
pub mod client;
pub mod config;
pub mod error_code;
pub mod streaming;
pub mod transport;

pub use auth::{
    Authenticator, AuthMode, CredentialResolver, Credentials, ServiceRegistry, Token, TokenManager,
};
pub use client::{
    Body, FormBody, HeaderList, Request, ResponseBody, ResponseEnvelope, ServiceClient,
    ServiceClientBuilder,
};
pub use config::{AuthType, ServiceConfig};
pub use error_code::ErrorClass;
pub use streaming::{
    AudioFeeder, AudioSource, RecognizeOptions, SessionConfig, SessionEvent, SessionEvents,
    SessionStatus, StreamingSession,
};
pub use transport::{TransportConfig, TransportError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
