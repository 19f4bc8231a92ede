//! Credential resolution: configuration + optional registry → [`Credentials`].

use super::registry::ServiceRegistry;
use crate::config::{AuthType, ServiceConfig};
use tracing::debug;

/// Username that marks the password field as an API key (legacy encoding).
pub const APIKEY_USERNAME: &str = "apikey";

/// The single active authentication mode.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Caller-managed bearer token, passed through unchanged.
    AccessToken(String),
    /// API key exchanged for short-lived bearer tokens.
    ApiKey(String),
    Basic { username: String, password: String },
    Anonymous,
}

impl AuthMode {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMode::AccessToken(_) => "access_token",
            AuthMode::ApiKey(_) => "api_key",
            AuthMode::Basic { .. } => "basic",
            AuthMode::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Resolved credentials plus the addresses they apply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth: AuthMode,
    /// Identity endpoint override for API-key exchange.
    pub identity_url: Option<String>,
    pub service_url: Option<String>,
    pub iam_client_id: Option<String>,
    pub iam_client_secret: Option<String>,
}

/// Pure transformation from caller configuration (and an optional registry) to credentials.
///
/// Never fails: missing credentials resolve to [`AuthMode::Anonymous`] and the
/// server decides whether that is acceptable.
pub struct CredentialResolver;

impl CredentialResolver {
    /// Resolve credentials for `config.service_name`.
    ///
    /// A registry entry's addresses override the configuration field by field.
    /// Its credentials override as a group: once the entry carries any of
    /// username, password, API key or access token, the configuration's
    /// credential fields are ignored.
    pub fn resolve(config: &ServiceConfig, registry: Option<&ServiceRegistry>) -> Credentials {
        let entry = registry.and_then(|r| r.get(&config.service_name));
        if entry.is_some() {
            debug!(service = %config.service_name, "registry entry overrides configuration");
        }

        let pick = |from_registry: Option<&String>, from_config: &Option<String>| {
            sanitize(from_registry).or_else(|| sanitize(from_config.as_ref()))
        };

        let url = pick(entry.and_then(|e| e.url.as_ref()), &config.url);
        let identity_url = pick(entry.and_then(|e| e.iam_url.as_ref()), &config.identity_url);

        let registry_secrets = entry
            .map(|e| {
                (
                    sanitize(e.username.as_ref()),
                    sanitize(e.password.as_ref()),
                    sanitize(e.apikey.as_ref()),
                    sanitize(e.access_token.as_ref()),
                )
            })
            .filter(|(u, p, k, t)| u.is_some() || p.is_some() || k.is_some() || t.is_some());
        let (username, password, api_key, access_token) = match registry_secrets {
            Some(secrets) => {
                debug!(service = %config.service_name, "using registry credentials");
                secrets
            }
            None => (
                sanitize(config.username.as_ref()),
                sanitize(config.password.as_ref()),
                sanitize(config.api_key.as_ref()),
                sanitize(config.access_token.as_ref()),
            ),
        };

        let auth = select_mode(config.auth_type, access_token, api_key, username, password);

        Credentials {
            auth,
            identity_url,
            service_url: url.map(|u| u.trim_end_matches('/').to_string()),
            iam_client_id: sanitize(config.iam_client_id.as_ref()),
            iam_client_secret: sanitize(config.iam_client_secret.as_ref()),
        }
    }
}

fn select_mode(
    explicit: Option<AuthType>,
    access_token: Option<String>,
    api_key: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> AuthMode {
    // A legacy "apikey" username turns the password into an API key before anything else.
    let (api_key, basic) = match (username, password) {
        (Some(u), Some(p)) if u == APIKEY_USERNAME => (api_key.or(Some(p)), None),
        (Some(u), Some(p)) => (api_key, Some((u, p))),
        _ => (api_key, None),
    };

    let token_mode = access_token.clone().map(AuthMode::AccessToken);
    let key_mode = api_key.clone().map(AuthMode::ApiKey);
    let basic_mode = basic
        .clone()
        .map(|(username, password)| AuthMode::Basic { username, password });

    let by_type = match explicit {
        Some(AuthType::None) => return AuthMode::Anonymous,
        Some(AuthType::Bearer) => token_mode.clone(),
        Some(AuthType::Iam) => key_mode.clone(),
        Some(AuthType::Basic) => basic_mode.clone(),
        None => None,
    };

    by_type
        .or(token_mode)
        .or(key_mode)
        .or(basic_mode)
        .unwrap_or(AuthMode::Anonymous)
}

/// Trim whitespace and stray `{}` / `"` wrapping; empty values count as absent.
fn sanitize(value: Option<&String>) -> Option<String> {
    let v = value?.trim();
    let v = v
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(v);
    let v = v
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v)
        .trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::registry::ServiceCredentials;

    #[test]
    fn precedence_is_token_then_key_then_basic() {
        let cfg = ServiceConfig::new("svc")
            .with_access_token("tok")
            .with_api_key("key")
            .with_basic_auth("user", "pass");
        assert_eq!(
            CredentialResolver::resolve(&cfg, None).auth,
            AuthMode::AccessToken("tok".into())
        );

        let cfg = ServiceConfig::new("svc")
            .with_api_key("key")
            .with_basic_auth("user", "pass");
        assert_eq!(CredentialResolver::resolve(&cfg, None).auth, AuthMode::ApiKey("key".into()));

        let cfg = ServiceConfig::new("svc").with_basic_auth("user", "pass");
        assert_eq!(
            CredentialResolver::resolve(&cfg, None).auth,
            AuthMode::Basic {
                username: "user".into(),
                password: "pass".into()
            }
        );
    }

    #[test]
    fn no_credentials_means_anonymous() {
        let creds = CredentialResolver::resolve(&ServiceConfig::new("svc"), None);
        assert_eq!(creds.auth, AuthMode::Anonymous);
        assert!(creds.service_url.is_none());
    }

    #[test]
    fn apikey_username_is_normalised_to_api_key() {
        let legacy = ServiceConfig::new("svc").with_basic_auth("apikey", "XYZ");
        let explicit = ServiceConfig::new("svc").with_api_key("XYZ");
        assert_eq!(
            CredentialResolver::resolve(&legacy, None),
            CredentialResolver::resolve(&explicit, None)
        );
    }

    #[test]
    fn registry_values_win_over_configuration() {
        let cfg = ServiceConfig::new("assistant")
            .with_url("https://config.example.com/")
            .with_api_key("config-key");
        let registry = ServiceRegistry::new().with_service(
            "assistant",
            ServiceCredentials {
                url: Some("https://registry.example.com".into()),
                apikey: Some("registry-key".into()),
                ..Default::default()
            },
        );

        let creds = CredentialResolver::resolve(&cfg, Some(&registry));
        assert_eq!(creds.auth, AuthMode::ApiKey("registry-key".into()));
        assert_eq!(creds.service_url.as_deref(), Some("https://registry.example.com"));
    }

    #[test]
    fn registry_credentials_replace_configured_ones_as_a_group() {
        let cfg = ServiceConfig::new("assistant")
            .with_url("https://config.example.com")
            .with_access_token("config-token");
        let registry = ServiceRegistry::new().with_service(
            "assistant",
            ServiceCredentials {
                apikey: Some("registry-key".into()),
                ..Default::default()
            },
        );

        let creds = CredentialResolver::resolve(&cfg, Some(&registry));
        assert_eq!(creds.auth, AuthMode::ApiKey("registry-key".into()));
        assert_eq!(creds.service_url.as_deref(), Some("https://config.example.com"));
    }

    #[test]
    fn registry_fills_only_what_it_has() {
        let cfg = ServiceConfig::new("assistant")
            .with_url("https://config.example.com/")
            .with_api_key("config-key");
        let registry = ServiceRegistry::new().with_service(
            "assistant",
            ServiceCredentials {
                iam_url: Some("https://iam.test/token".into()),
                ..Default::default()
            },
        );
        let creds = CredentialResolver::resolve(&cfg, Some(&registry));
        assert_eq!(creds.auth, AuthMode::ApiKey("config-key".into()));
        assert_eq!(creds.service_url.as_deref(), Some("https://config.example.com"));
        assert_eq!(creds.identity_url.as_deref(), Some("https://iam.test/token"));
    }

    #[test]
    fn explicit_auth_type_selects_mode() {
        let cfg = ServiceConfig::new("svc")
            .with_api_key("key")
            .with_basic_auth("user", "pass")
            .with_auth_type(AuthType::Basic);
        assert!(matches!(
            CredentialResolver::resolve(&cfg, None).auth,
            AuthMode::Basic { .. }
        ));

        let cfg = ServiceConfig::new("svc").with_api_key("key").with_auth_type(AuthType::None);
        assert_eq!(CredentialResolver::resolve(&cfg, None).auth, AuthMode::Anonymous);
    }

    #[test]
    fn sanitizes_copy_paste_artifacts() {
        let cfg = ServiceConfig::new("svc").with_api_key("  {\"abc\"}  ");
        assert_eq!(CredentialResolver::resolve(&cfg, None).auth, AuthMode::ApiKey("abc".into()));

        let cfg = ServiceConfig::new("svc").with_api_key("   ");
        assert_eq!(CredentialResolver::resolve(&cfg, None).auth, AuthMode::Anonymous);
    }
}
