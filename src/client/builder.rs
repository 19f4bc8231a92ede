use super::core::ServiceClient;
use super::headers::HeaderList;
use crate::auth::{
    authenticator_for, Authenticator, BearerTokenAuthenticator, CredentialResolver, ServiceRegistry,
    TokenManager,
};
use crate::config::ServiceConfig;
use crate::streaming::SessionConfig;
use crate::transport::{HttpTransport, TransportConfig};
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Builder for [`ServiceClient`].
///
/// Credentials come from the [`ServiceConfig`], overridden field by field by a
/// registry entry for the same service name when one is supplied.
pub struct ServiceClientBuilder {
    config: ServiceConfig,
    registry: Option<ServiceRegistry>,
    registry_from_env: bool,
    default_url: Option<String>,
    token_manager: Option<Arc<TokenManager>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    transport_config: Option<TransportConfig>,
    session_config: SessionConfig,
    extra_headers: HeaderList,
}

impl ServiceClientBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::from_config(ServiceConfig::new(service_name))
    }

    pub fn from_config(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: None,
            registry_from_env: false,
            default_url: None,
            token_manager: None,
            authenticator: None,
            transport_config: None,
            session_config: SessionConfig::default(),
            extra_headers: HeaderList::new(),
        }
    }

    /// Replace the configuration bag (the service name travels with it).
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Consult `VCAP_SERVICES` at build time when no registry was given.
    pub fn registry_from_env(mut self, enable: bool) -> Self {
        self.registry_from_env = enable;
        self
    }

    /// URL used when neither configuration nor registry provides one.
    pub fn default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = Some(url.into());
        self
    }

    /// Share an existing token manager (and its cached token) with this client.
    pub fn token_manager(mut self, manager: Arc<TokenManager>) -> Self {
        self.token_manager = Some(manager);
        self
    }

    /// Custom authenticator; takes precedence over resolved credentials.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Defaults to [`TransportConfig::from_env`].
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.set(name, Some(value.into()));
        self
    }

    pub fn build(self) -> Result<ServiceClient> {
        let registry = match self.registry {
            Some(r) => Some(r),
            None if self.registry_from_env => ServiceRegistry::from_env()?,
            None => None,
        };

        let credentials = CredentialResolver::resolve(&self.config, registry.as_ref());

        let service_url = credentials
            .service_url
            .clone()
            .or(self.default_url)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    "service URL is required",
                    ErrorContext::new()
                        .with_field_path("config.url")
                        .with_source("client_builder"),
                )
            })?;
        url::Url::parse(&service_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid service URL: {}", e),
                ErrorContext::new()
                    .with_field_path("config.url")
                    .with_details(service_url.clone())
                    .with_source("client_builder"),
            )
        })?;

        let mut transport_config = self.transport_config.unwrap_or_else(TransportConfig::from_env);
        transport_config.disable_ssl_verification |= self.config.disable_ssl_verification;
        let transport = HttpTransport::new(&transport_config)?;
        let mut session_config = self.session_config;
        session_config.disable_ssl_verification |= transport_config.disable_ssl_verification;

        let authenticator: Arc<dyn Authenticator> = match (self.authenticator, self.token_manager) {
            (Some(custom), _) => custom,
            (None, Some(manager)) => Arc::new(BearerTokenAuthenticator::new(manager)),
            (None, None) => authenticator_for(&credentials, &transport),
        };

        let configured: HeaderList = self
            .config
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let default_headers = configured.merged_with(&self.extra_headers);

        info!(
            service = %self.config.service_name,
            url = %service_url,
            auth = authenticator.scheme(),
            "service client ready"
        );

        Ok(ServiceClient {
            service_name: self.config.service_name,
            service_url: ArcSwap::from_pointee(service_url.trim_end_matches('/').to_string()),
            default_headers: ArcSwap::from_pointee(default_headers),
            authenticator,
            transport,
            session_config,
        })
    }
}
