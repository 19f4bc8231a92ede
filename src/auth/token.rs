//! Bearer token lifecycle.
//!
//! [`TokenManager`] owns at most one cached token. API-key-derived tokens are
//! exchanged at the identity endpoint and renewed once they come within the
//! refresh skew of expiry; caller-managed tokens are passed through untouched.
//!
//! Renewal is single-flight: concurrent callers that observe an expiring token
//! wait on the one in-flight exchange and share its result.

use crate::transport::HttpTransport;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Production identity endpoint.
pub const DEFAULT_IDENTITY_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// Safety margin subtracted from a token's expiry before it is renewed.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

const API_KEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// A bearer token and, for exchanged tokens, its expiry.
#[derive(Clone)]
pub struct Token {
    value: Arc<str>,
    expires_at: Option<Instant>,
}

impl Token {
    pub(crate) fn new(value: impl Into<Arc<str>>, expires_at: Option<Instant>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// `None` for caller-managed tokens.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// True while `now < expires_at - skew`. Tokens without expiry are always usable.
    pub fn is_usable_at(&self, now: Instant, skew: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => match expires_at.checked_sub(skew) {
                Some(deadline) => now < deadline,
                None => false,
            },
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    access_token: String,
    /// Token lifetime in seconds.
    expires_in: u64,
}

enum TokenSource {
    ApiKey {
        api_key: String,
        identity_url: String,
        client_credentials: Option<(String, String)>,
        transport: HttpTransport,
    },
    Caller(ArcSwap<String>),
}

/// Acquires and renews bearer tokens; safe to share across tasks behind an `Arc`.
pub struct TokenManager {
    source: TokenSource,
    refresh_skew: Duration,
    cached: RwLock<Option<Token>>,
    /// Held for the duration of an identity exchange.
    refresh: Mutex<()>,
    /// Bumped each time an exchanged token is stored.
    generation: AtomicU64,
    exchanges: AtomicU64,
}

impl TokenManager {
    /// Token manager that exchanges `api_key` at the identity endpoint.
    pub fn with_api_key(api_key: impl Into<String>, transport: HttpTransport) -> Self {
        Self {
            source: TokenSource::ApiKey {
                api_key: api_key.into(),
                identity_url: DEFAULT_IDENTITY_URL.to_string(),
                client_credentials: None,
                transport,
            },
            refresh_skew: DEFAULT_REFRESH_SKEW,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            generation: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Token manager for a caller-managed token; it never refreshes on its own.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Caller(ArcSwap::from_pointee(token.into())),
            refresh_skew: DEFAULT_REFRESH_SKEW,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            generation: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Override the identity endpoint (ignored for caller-managed tokens).
    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        if let TokenSource::ApiKey { identity_url, .. } = &mut self.source {
            *identity_url = url.into();
        }
        self
    }

    /// Authenticate the exchange itself with client id/secret (basic auth).
    pub fn client_credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        if let TokenSource::ApiKey {
            client_credentials, ..
        } = &mut self.source
        {
            *client_credentials = Some((client_id.into(), client_secret.into()));
        }
        self
    }

    pub fn refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Whether this manager exchanges tokens itself (as opposed to passing one through).
    pub fn is_self_refreshing(&self) -> bool {
        matches!(self.source, TokenSource::ApiKey { .. })
    }

    /// Number of identity exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Acquire)
    }

    /// Replace a caller-managed token. Has no effect on key-derived managers.
    pub fn set_access_token(&self, token: impl Into<String>) {
        match &self.source {
            TokenSource::Caller(current) => current.store(Arc::new(token.into())),
            TokenSource::ApiKey { .. } => {
                warn!("set_access_token ignored: token is derived from an API key")
            }
        }
    }

    /// Drop the cached key-derived token so the next call exchanges again.
    pub async fn invalidate(&self) {
        if self.is_self_refreshing() {
            *self.cached.write().await = None;
        }
    }

    /// Return a token that is usable now, exchanging for a fresh one when needed.
    pub async fn get_valid_token(&self) -> Result<Token> {
        let (api_key, identity_url, client_credentials, transport) = match &self.source {
            TokenSource::Caller(current) => {
                return Ok(Token::new(current.load().as_str(), None));
            }
            TokenSource::ApiKey {
                api_key,
                identity_url,
                client_credentials,
                transport,
            } => (api_key, identity_url, client_credentials, transport),
        };

        let observed = self.generation.load(Ordering::Acquire);
        if let Some(token) = self.usable_cached().await {
            return Ok(token);
        }

        let _flight = self.refresh.lock().await;

        // An exchange that completed while we waited is shared as-is, even
        // when its lifetime is shorter than the skew.
        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(token) = self.cached.read().await.clone() {
                return Ok(token);
            }
        }
        if let Some(token) = self.usable_cached().await {
            return Ok(token);
        }

        let token = self
            .exchange(api_key, identity_url, client_credentials.as_ref(), transport)
            .await?;
        *self.cached.write().await = Some(token.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(token)
    }

    async fn usable_cached(&self) -> Option<Token> {
        let guard = self.cached.read().await;
        guard
            .as_ref()
            .filter(|t| t.is_usable_at(Instant::now(), self.refresh_skew))
            .cloned()
    }

    async fn exchange(
        &self,
        api_key: &str,
        identity_url: &str,
        client_credentials: Option<&(String, String)>,
        transport: &HttpTransport,
    ) -> Result<Token> {
        debug!(identity_url = %identity_url, "requesting bearer token");
        self.exchanges.fetch_add(1, Ordering::AcqRel);

        let mut request = transport
            .request(reqwest::Method::POST, identity_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", API_KEY_GRANT_TYPE),
                ("apikey", api_key),
                ("response_type", "cloud_iam"),
            ]);
        if let Some((id, secret)) = client_credentials {
            request = request.basic_auth(id, Some(secret));
        }

        let issued_at = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| Error::token_acquisition(format!("identity endpoint unreachable: {}", e), None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(http_status = status.as_u16(), "identity endpoint rejected the API key");
            return Err(Error::token_acquisition(
                format!("identity endpoint returned {}: {}", status, body.trim()),
                Some(status.as_u16()),
            ));
        }

        let parsed: IdentityResponse = response.json().await.map_err(|e| {
            Error::token_acquisition(
                format!("invalid identity response: {}", e),
                Some(status.as_u16()),
            )
        })?;

        let expires_at = expiry(issued_at, parsed.expires_in).ok_or_else(|| {
            Error::token_acquisition(
                format!("identity response expires_in out of range: {}", parsed.expires_in),
                Some(status.as_u16()),
            )
        })?;

        info!(expires_in = parsed.expires_in, "bearer token acquired");
        Ok(Token::new(parsed.access_token, Some(expires_at)))
    }
}

fn expiry(issued_at: Instant, expires_in: u64) -> Option<Instant> {
    issued_at.checked_add(Duration::from_secs(expires_in))
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("self_refreshing", &self.is_self_refreshing())
            .field("refresh_skew", &self.refresh_skew)
            .field("exchanges", &self.exchange_count())
            .finish()
    }
}
