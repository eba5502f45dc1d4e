//! Static registries mapping configuration identifiers to constructors.
//!
//! Backend, session-store, and authorization-check selection all resolve
//! here at startup. An identifier nobody registered is a `SetupError`:
//! a configuration defect that aborts the process, never a runtime
//! condition.

use std::sync::Arc;
use std::time::Duration;

use gatehouse_access::{AllowedHosts, AuthzChain, PublicPaths, SetupError};
use gatehouse_cache::{KvCache, MemoryCache, RedisCache};

use super::backend::{AuthBackend, LocalBackend};
use super::entra::EntraBackend;
use super::session_store::{CacheSessionStore, CookieSessionStore, SessionStore};
use crate::config::{AuthConfig, CacheConfig, ServerConfig, SessionConfig};

/// Builds the flow/token cache from configuration.
pub async fn build_kv_cache(config: &CacheConfig) -> Result<Arc<dyn KvCache>, SetupError> {
    let op_timeout = Duration::from_millis(config.op_timeout_ms);
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCache::new())),
        "redis" => {
            let cache = RedisCache::connect(&config.redis_url, op_timeout)
                .await
                .map_err(|e| SetupError::InvalidConfig {
                    field: "cache.redis_url".to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(cache))
        }
        other => Err(SetupError::InvalidConfig {
            field: "cache.backend".to_string(),
            reason: format!("unknown cache backend '{other}'"),
        }),
    }
}

/// Builds the configured session store.
pub async fn build_session_store(
    session: &SessionConfig,
    cache: &CacheConfig,
) -> Result<Arc<dyn SessionStore>, SetupError> {
    match session.store.as_str() {
        "cookie" => {
            let key = session.key.as_deref().ok_or_else(|| SetupError::InvalidConfig {
                field: "session.key".to_string(),
                reason: "required when session.store is 'cookie'".to_string(),
            })?;
            Ok(Arc::new(CookieSessionStore::new(key, session)?))
        }
        "memory" => Ok(Arc::new(CacheSessionStore::new(
            Arc::new(MemoryCache::new()),
            session,
        ))),
        "redis" => {
            let backing = RedisCache::connect(
                &cache.redis_url,
                Duration::from_millis(cache.op_timeout_ms),
            )
            .await
            .map_err(|e| SetupError::InvalidConfig {
                field: "cache.redis_url".to_string(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(CacheSessionStore::new(Arc::new(backing), session)))
        }
        other => Err(SetupError::UnknownSessionStore {
            name: other.to_string(),
        }),
    }
}

/// Builds the configured authentication backend.
///
/// The external backend gets the shared flow/token cache; the local
/// backend needs none.
pub async fn build_backend(config: &ServerConfig) -> Result<Arc<dyn AuthBackend>, SetupError> {
    match config.auth.backend.as_str() {
        "local" => Ok(Arc::new(LocalBackend::new(config.users.clone()))),
        "entra" => {
            let entra = config.entra.clone().ok_or_else(|| SetupError::InvalidConfig {
                field: "entra".to_string(),
                reason: "required when auth.backend is 'entra'".to_string(),
            })?;
            let cache = build_kv_cache(&config.cache).await?;
            Ok(Arc::new(EntraBackend::new(
                entra,
                cache,
                &config.public_url,
            )?))
        }
        other => Err(SetupError::UnknownBackend {
            name: other.to_string(),
        }),
    }
}

/// Builds the authorization chain from the tagged configuration list.
///
/// Chain order is configuration order. An empty list builds an empty
/// chain, which defers to authentication rather than denying.
pub fn build_authz_chain(config: &AuthConfig) -> Result<AuthzChain, SetupError> {
    let mut chain = AuthzChain::new();
    for name in &config.authorization {
        match name.as_str() {
            "hosts" => {
                chain = chain.with_check(Box::new(AllowedHosts::new(
                    config.allowed_hosts.iter().cloned(),
                )));
            }
            "public_paths" => {
                chain = chain.with_check(Box::new(PublicPaths::new(
                    config.public_paths.iter().cloned(),
                )));
            }
            other => {
                return Err(SetupError::UnknownAuthzCheck {
                    name: other.to_string(),
                });
            }
        }
    }
    Ok(chain)
}
