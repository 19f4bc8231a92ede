//! Externally-injected service registry.
//!
//! Platforms that bind services to an application publish their credentials as
//! a JSON document (commonly in `VCAP_SERVICES`) of the shape:
//!
//! ```json
//! {
//!   "speech_to_text": [
//!     { "name": "my-stt", "credentials": { "url": "...", "apikey": "..." } }
//!   ]
//! }
//! ```
//!
//! Entries are addressable by the service type key and by each instance `name`.

use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Environment variable holding the registry document.
pub const REGISTRY_ENV_VAR: &str = "VCAP_SERVICES";

/// Credentials bound to one service in the registry.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceCredentials {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "apiKey", alias = "iam_apikey")]
    pub apikey: Option<String>,
    #[serde(alias = "accessToken")]
    pub access_token: Option<String>,
    #[serde(alias = "iam_apikey_url")]
    pub iam_url: Option<String>,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ServiceCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("apikey", &redact(&self.apikey))
            .field("access_token", &redact(&self.access_token))
            .field("iam_url", &self.iam_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct BoundService {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    credentials: Option<ServiceCredentials>,
}

/// Mapping from service name to bound credentials, consulted once at client construction.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: HashMap<String, ServiceCredentials>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service_name: impl Into<String>, credentials: ServiceCredentials) {
        self.entries.insert(service_name.into(), credentials);
    }

    pub fn with_service(mut self, service_name: impl Into<String>, credentials: ServiceCredentials) -> Self {
        self.insert(service_name, credentials);
        self
    }

    pub fn get(&self, service_name: &str) -> Option<&ServiceCredentials> {
        self.entries.get(service_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a registry document.
    ///
    /// The first bound instance of each service type is registered under the type key;
    /// every instance is also registered under its own `name`.
    pub fn from_json(document: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<BoundService>> = serde_json::from_str(document).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid service registry document: {}", e),
                ErrorContext::new().with_source("service_registry"),
            )
        })?;

        let mut registry = Self::new();
        for (service_type, instances) in raw {
            for (idx, instance) in instances.into_iter().enumerate() {
                let Some(credentials) = instance.credentials else {
                    continue;
                };
                if let Some(name) = instance.name {
                    registry.entries.entry(name).or_insert_with(|| credentials.clone());
                }
                if idx == 0 {
                    registry.entries.insert(service_type.clone(), credentials);
                }
            }
        }

        debug!(services = registry.len(), "loaded service registry");
        Ok(registry)
    }

    /// Load the registry from `VCAP_SERVICES`; `Ok(None)` when the variable is unset or blank.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(REGISTRY_ENV_VAR) {
            Ok(doc) if !doc.trim().is_empty() => Self::from_json(&doc).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "speech_to_text": [
            {"name": "stt-primary", "credentials": {"url": "https://stt.example.com", "apikey": "k1"}},
            {"name": "stt-backup", "credentials": {"url": "https://stt2.example.com", "apikey": "k2"}}
        ],
        "assistant": [
            {"name": "asst", "credentials": {"url": "https://asst.example.com", "username": "u", "password": "p"}}
        ],
        "empty": [ {"name": "nothing"} ]
    }"#;

    #[test]
    fn registers_by_type_and_instance_name() {
        let reg = ServiceRegistry::from_json(DOC).unwrap();
        assert_eq!(reg.get("speech_to_text").unwrap().apikey.as_deref(), Some("k1"));
        assert_eq!(reg.get("stt-backup").unwrap().apikey.as_deref(), Some("k2"));
        assert_eq!(reg.get("asst").unwrap().username.as_deref(), Some("u"));
        assert!(reg.get("nothing").is_none());
        assert!(reg.get("empty").is_none());
    }

    #[test]
    fn accepts_alternate_key_spellings() {
        let reg = ServiceRegistry::from_json(
            r#"{"nlc": [{"credentials": {"apiKey": "a", "accessToken": "t", "iam_apikey_url": "https://iam"}}]}"#,
        )
        .unwrap();
        let creds = reg.get("nlc").unwrap();
        assert_eq!(creds.apikey.as_deref(), Some("a"));
        assert_eq!(creds.access_token.as_deref(), Some("t"));
        assert_eq!(creds.iam_url.as_deref(), Some("https://iam"));
    }

    #[test]
    fn rejects_malformed_document() {
        let err = ServiceRegistry::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
