use crate::transport::TransportError;
use crate::Result;
use reqwest::{Method, Proxy};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Default `User-Agent` sent with every HTTP call.
pub const USER_AGENT: &str = concat!("watson-lib-rust/", env!("CARGO_PKG_VERSION"));

/// Knobs for the shared HTTP client.
///
/// Defaults are production-friendly and env-overridable:
/// - `WATSON_HTTP_TIMEOUT_SECS` (default 60)
/// - `WATSON_HTTP_CONNECT_TIMEOUT_SECS` (default 10)
/// - `WATSON_HTTP_POOL_MAX_IDLE_PER_HOST` (default 32)
/// - `WATSON_HTTP_POOL_IDLE_TIMEOUT_SECS` (default 90)
/// - `WATSON_PROXY_URL`
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
    /// Accept self-signed certificates (private deployments only).
    pub disable_ssl_verification: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: None,
            disable_ssl_verification: false,
        }
    }
}

impl TransportConfig {
    /// Defaults overridden by `WATSON_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: env_secs("WATSON_HTTP_TIMEOUT_SECS").unwrap_or(defaults.timeout),
            connect_timeout: env_secs("WATSON_HTTP_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout),
            pool_max_idle_per_host: env::var("WATSON_HTTP_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: env_secs("WATSON_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .unwrap_or(defaults.pool_idle_timeout),
            proxy_url: env::var("WATSON_PROXY_URL").ok().filter(|s| !s.is_empty()),
            disable_ssl_verification: false,
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Pooled HTTP client shared by the dispatcher and the token manager.
///
/// Cloning is cheap; clones share the same connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout));

        if let Some(proxy_url) = &config.proxy_url {
            match Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(error = %e, "ignoring invalid proxy URL"),
            }
        }

        if config.disable_ssl_verification {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Start a request against an absolute URL.
    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    /// Issue a prepared request, mapping connection-level failures to [`TransportError`].
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::from(e)))
    }
}
