//! Caller-supplied service configuration.
//!
//! A [`ServiceConfig`] is the "configuration bag" the credential resolver works
//! from. It can be built in code, deserialized with serde from whatever format
//! the application already uses, or read from `<SERVICE>_*` environment
//! variables with [`ServiceConfig::from_env`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;

/// Explicit authentication selection.
///
/// When absent, the resolver picks the mode by credential precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// API key exchanged for bearer tokens at the identity endpoint.
    Iam,
    /// Caller-managed bearer token.
    #[serde(alias = "bearertoken")]
    Bearer,
    Basic,
    /// Anonymous access; no `Authorization` header is ever sent.
    #[serde(alias = "noauth")]
    None,
}

impl AuthType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "iam" => Some(Self::Iam),
            "bearer" | "bearertoken" => Some(Self::Bearer),
            "basic" => Some(Self::Basic),
            "none" | "noauth" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Key used to look the service up in a [`crate::auth::ServiceRegistry`].
    pub service_name: String,
    pub url: Option<String>,
    #[serde(alias = "apikey")]
    pub api_key: Option<String>,
    #[serde(alias = "bearer_token")]
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "iam_url", alias = "auth_url")]
    pub identity_url: Option<String>,
    pub iam_client_id: Option<String>,
    pub iam_client_secret: Option<String>,
    pub auth_type: Option<AuthType>,
    pub disable_ssl_verification: bool,
    /// Headers sent with every call made by the client.
    pub default_headers: BTreeMap<String, String>,
}

impl ServiceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = Some(url.into());
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = Some(auth_type);
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Read `<NAME>_URL`, `<NAME>_APIKEY`, `<NAME>_BEARER_TOKEN`, `<NAME>_USERNAME`,
    /// `<NAME>_PASSWORD`, `<NAME>_AUTH_URL`, `<NAME>_AUTH_TYPE`,
    /// `<NAME>_CLIENT_ID`, `<NAME>_CLIENT_SECRET` and `<NAME>_DISABLE_SSL`.
    ///
    /// `NAME` is the service name upper-cased with `-` replaced by `_`.
    pub fn from_env(service_name: &str) -> Self {
        let prefix = env_prefix(service_name);
        let var = |suffix: &str| {
            env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };

        Self {
            service_name: service_name.to_string(),
            url: var("URL"),
            api_key: var("APIKEY"),
            access_token: var("BEARER_TOKEN"),
            username: var("USERNAME"),
            password: var("PASSWORD"),
            identity_url: var("AUTH_URL"),
            iam_client_id: var("CLIENT_ID"),
            iam_client_secret: var("CLIENT_SECRET"),
            auth_type: var("AUTH_TYPE").and_then(|v| AuthType::parse(&v)),
            disable_ssl_verification: var("DISABLE_SSL")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            default_headers: BTreeMap::new(),
        }
    }
}

fn env_prefix(service_name: &str) -> String {
    service_name.to_ascii_uppercase().replace('-', "_")
}

// Secrets never reach logs through Debug.
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ServiceConfig")
            .field("service_name", &self.service_name)
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("access_token", &redact(&self.access_token))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("identity_url", &self.identity_url)
            .field("iam_client_id", &self.iam_client_id)
            .field("iam_client_secret", &redact(&self.iam_client_secret))
            .field("auth_type", &self.auth_type)
            .field("disable_ssl_verification", &self.disable_ssl_verification)
            .field("default_headers", &self.default_headers)
            .finish()
    }
}
