//! Authentication: credential resolution, token lifecycle, and the
//! `Authorization` header every call carries.

pub mod registry;
pub mod resolver;
pub mod token;

pub use registry::{ServiceCredentials, ServiceRegistry};
pub use resolver::{AuthMode, CredentialResolver, Credentials};
pub use token::{Token, TokenManager, DEFAULT_IDENTITY_URL, DEFAULT_REFRESH_SKEW};

use crate::transport::HttpTransport;
use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;

/// Produces the `Authorization` header value for outgoing calls.
///
/// Shared by the HTTP dispatcher and the streaming handshake.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Header value, or `None` for anonymous access.
    async fn authorization(&self) -> Result<Option<String>>;

    /// Short name of the scheme for logs (`"bearer"`, `"basic"`, `"none"`).
    fn scheme(&self) -> &'static str;

    /// The service rejected the credentials (HTTP 401).
    async fn on_unauthorized(&self) {}
}

/// `Authorization: Bearer <token>` backed by a [`TokenManager`].
pub struct BearerTokenAuthenticator {
    tokens: Arc<TokenManager>,
}

impl BearerTokenAuthenticator {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authorization(&self) -> Result<Option<String>> {
        let token = self.tokens.get_valid_token().await?;
        Ok(Some(format!("Bearer {}", token.value())))
    }

    fn scheme(&self) -> &'static str {
        "bearer"
    }

    async fn on_unauthorized(&self) {
        self.tokens.invalidate().await;
    }
}

/// `Authorization: Basic <base64(user:pass)>`.
pub struct BasicAuthenticator {
    header: String,
}

impl BasicAuthenticator {
    pub fn new(username: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
        Self {
            header: format!("Basic {}", encoded),
        }
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authorization(&self) -> Result<Option<String>> {
        Ok(Some(self.header.clone()))
    }

    fn scheme(&self) -> &'static str {
        "basic"
    }
}

/// Sends no `Authorization` header.
pub struct NoAuthenticator;

#[async_trait]
impl Authenticator for NoAuthenticator {
    async fn authorization(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn scheme(&self) -> &'static str {
        "none"
    }
}

/// Build the authenticator matching resolved credentials.
///
/// API-key credentials get a fresh self-refreshing [`TokenManager`] sharing `transport`'s pool.
pub fn authenticator_for(credentials: &Credentials, transport: &HttpTransport) -> Arc<dyn Authenticator> {
    match &credentials.auth {
        AuthMode::AccessToken(token) => Arc::new(BearerTokenAuthenticator::new(Arc::new(
            TokenManager::with_access_token(token.clone()),
        ))),
        AuthMode::ApiKey(key) => {
            let mut manager = TokenManager::with_api_key(key.clone(), transport.clone());
            if let Some(url) = &credentials.identity_url {
                manager = manager.identity_url(url.clone());
            }
            if let (Some(id), Some(secret)) = (&credentials.iam_client_id, &credentials.iam_client_secret) {
                manager = manager.client_credentials(id.clone(), secret.clone());
            }
            Arc::new(BearerTokenAuthenticator::new(Arc::new(manager)))
        }
        AuthMode::Basic { username, password } => Arc::new(BasicAuthenticator::new(username, password)),
        AuthMode::Anonymous => Arc::new(NoAuthenticator),
    }
}
