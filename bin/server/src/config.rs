//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from an optional `gatehouse` file plus
//! environment variables. Key material and backend/store selection are
//! fixed here at startup; nothing reads ambient process state after
//! construction.

use serde::Deserialize;

/// Server configuration composed from section configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the server listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Externally visible base URL, used to build the IdP redirect URI.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Session store configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Flow/token cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Authentication/authorization configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Credential table for the local backend.
    #[serde(default)]
    pub users: Vec<LocalUser>,

    /// External identity provider configuration; required when
    /// `auth.backend` is "entra".
    pub entra: Option<EntraConfig>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_public_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Which session store to use: "cookie", "memory", or "redis".
    #[serde(default = "default_session_store")]
    pub store: String,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP
    /// development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Base64-encoded key material for the cookie store (at least 64
    /// bytes once decoded). Required when `store` is "cookie"; shared by
    /// every session created under this process.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_session_store() -> String {
    "cookie".to_string()
}

fn default_cookie_name() -> String {
    "gatehouse_session".to_string()
}

fn default_session_duration_minutes() -> i64 {
    30
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: default_session_store(),
            cookie_name: default_cookie_name(),
            duration_minutes: default_session_duration_minutes(),
            secure_cookies: default_secure_cookies(),
            key: None,
        }
    }
}

/// Flow/token cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Cache backend for flow state and cached tokens: "memory" or
    /// "redis". Use "redis" whenever the redirect and the callback may
    /// land on different processes.
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Per-operation timeout in milliseconds.
    #[serde(default = "default_cache_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_cache_op_timeout_ms() -> u64 {
    2_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis_url: default_redis_url(),
            op_timeout_ms: default_cache_op_timeout_ms(),
        }
    }
}

/// Authentication/authorization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Which authentication backend to use: "local" or "entra".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Where successful logins land.
    #[serde(default = "default_home_redirect")]
    pub home_redirect: String,

    /// Where failed external flows land.
    #[serde(default = "default_failure_redirect")]
    pub failure_redirect: String,

    /// Authorization checks to run, in order. Empty means "defer to the
    /// authentication result only".
    #[serde(default)]
    pub authorization: Vec<String>,

    /// Host allowlist for the "hosts" check.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Path prefixes for the "public_paths" check.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_home_redirect() -> String {
    "/".to_string()
}

fn default_failure_redirect() -> String {
    "/login".to_string()
}

fn default_public_paths() -> Vec<String> {
    vec!["/healthz".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            home_redirect: default_home_redirect(),
            failure_redirect: default_failure_redirect(),
            authorization: Vec::new(),
            allowed_hosts: Vec::new(),
            public_paths: default_public_paths(),
        }
    }
}

/// One entry in the local credential table.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalUser {
    /// Login name; also the stable user id in the resulting identity.
    pub username: String,
    /// Argon2 PHC-string hash of the password.
    pub password_hash: String,
    /// Email attribute for the identity.
    #[serde(default)]
    pub email: Option<String>,
    /// Given name attribute.
    #[serde(default)]
    pub given_name: Option<String>,
    /// Family name attribute.
    #[serde(default)]
    pub family_name: Option<String>,
    /// Display name attribute.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Microsoft Entra ID provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EntraConfig {
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// OAuth2 scopes to request as a comma-separated string.
    #[serde(default = "default_entra_scopes")]
    pub scopes: String,
    /// Optional domain hint forwarded to the authorize endpoint.
    #[serde(default)]
    pub domain_hint: Option<String>,
    /// Authority base URL.
    #[serde(default = "default_entra_authority")]
    pub authority: String,
    /// User-attributes endpoint.
    #[serde(default = "default_entra_userinfo_url")]
    pub userinfo_url: String,
    /// Timeout for provider calls in milliseconds. A timed-out call fails
    /// the step it belongs to, same as a provider error.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

fn default_entra_scopes() -> String {
    "https://graph.microsoft.com/.default".to_string()
}

fn default_entra_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_entra_userinfo_url() -> String {
    "https://graph.microsoft.com/v1.0/me".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    5_000
}

impl EntraConfig {
    /// The tenant-qualified authorize endpoint.
    #[must_use]
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// The tenant-qualified token endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Returns the scopes to request, parsed from the comma-separated
    /// string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes.split(',').map(str::trim).collect()
    }
}

impl ServerConfig {
    /// Loads configuration from an optional `gatehouse` file plus
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("gatehouse").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.store, "cookie");
        assert_eq!(config.cookie_name, "gatehouse_session");
        assert_eq!(config.duration_minutes, 30);
        assert!(config.secure_cookies);
        assert!(config.key.is_none());
    }

    #[test]
    fn cache_config_has_correct_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, "memory");
        assert_eq!(config.op_timeout_ms, 2_000);
    }

    #[test]
    fn auth_config_has_correct_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.backend, "local");
        assert_eq!(config.home_redirect, "/");
        assert_eq!(config.failure_redirect, "/login");
        assert!(config.authorization.is_empty());
        assert_eq!(config.public_paths, vec!["/healthz".to_string()]);
    }

    #[test]
    fn entra_urls_are_tenant_qualified() {
        let config: EntraConfig = serde_json::from_str(
            r#"{
                "tenant_id": "contoso",
                "client_id": "client",
                "client_secret": "secret"
            }"#,
        )
        .expect("deserialize");

        assert_eq!(
            config.authorize_url(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize"
        );
        assert_eq!(
            config.token_url(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
        assert_eq!(config.scopes(), vec!["https://graph.microsoft.com/.default"]);
    }

    #[test]
    fn entra_scopes_parse_comma_separated() {
        let config: EntraConfig = serde_json::from_str(
            r#"{
                "tenant_id": "contoso",
                "client_id": "client",
                "client_secret": "secret",
                "scopes": "openid, User.ReadBasic.All"
            }"#,
        )
        .expect("deserialize");

        assert_eq!(config.scopes(), vec!["openid", "User.ReadBasic.All"]);
    }
}
