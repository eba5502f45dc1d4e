//! Pluggable session stores.
//!
//! Every variant implements the same contract: allocate and persist a
//! session for an identity, decode a client-held handle back into a
//! session (failing softly on anything routine), and forget a session
//! idempotently. Variants differ only in where the payload lives:
//! - `CookieSessionStore`: sealed into the handle itself (no server state)
//! - `CacheSessionStore`: in a key-value cache, memory or redis
//!
//! Key material is fixed at construction and shared by every session
//! created under the store instance.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Duration;
use gatehouse_access::{AuthError, Identity, Session, SetupError};
use gatehouse_cache::KvCache;
use gatehouse_core::SessionId;
use std::sync::Arc;

use crate::config::SessionConfig;

/// What the framework layer needs to manage the handle lifecycle.
#[derive(Debug, Clone)]
pub struct SessionCookieConfig {
    /// Cookie name carrying the handle.
    pub name: String,
    /// Cookie max-age.
    pub max_age: time::Duration,
    /// Whether to set the Secure flag.
    pub secure: bool,
}

impl SessionCookieConfig {
    fn from_config(config: &SessionConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            max_age: time::Duration::minutes(config.duration_minutes),
            secure: config.secure_cookies,
        }
    }
}

/// The session-store contract shared by every variant.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Allocates a session for the identity and persists it.
    ///
    /// Returns the session and the opaque handle the client will carry.
    /// One write to the backing store; a failed write is a
    /// `SessionCreation` error.
    async fn create(&self, identity: &Identity) -> Result<(Session, String), AuthError>;

    /// Looks up and validates a session by handle.
    ///
    /// Fails softly: a missing, expired, or malformed handle yields
    /// `None`, never an error.
    async fn decode(&self, handle: &str) -> Option<Session>;

    /// Deletes the session behind the handle.
    ///
    /// Idempotent: forgetting twice, or forgetting a handle that never
    /// named a session, is not an error.
    async fn forget(&self, handle: &str);

    /// Returns the cookie configuration for the handle lifecycle.
    fn cookie(&self) -> &SessionCookieConfig;
}

/// Client-side session store: the payload travels sealed inside the
/// cookie value, authenticated and encrypted under the configured key.
pub struct CookieSessionStore {
    key: cookie::Key,
    cookie: SessionCookieConfig,
    duration: Duration,
}

impl std::fmt::Debug for CookieSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSessionStore")
            .field("key", &"<redacted>")
            .field("cookie", &self.cookie)
            .field("duration", &self.duration)
            .finish()
    }
}

impl CookieSessionStore {
    /// Creates the store from base64 key material.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::InvalidConfig` when the key is not valid
    /// base64 or is too short for authenticated encryption.
    pub fn new(key_base64: &str, config: &SessionConfig) -> Result<Self, SetupError> {
        let bytes = BASE64
            .decode(key_base64)
            .map_err(|e| SetupError::InvalidConfig {
                field: "session.key".to_string(),
                reason: format!("not valid base64: {e}"),
            })?;

        let key = cookie::Key::try_from(bytes.as_slice()).map_err(|e| {
            SetupError::InvalidConfig {
                field: "session.key".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            key,
            cookie: SessionCookieConfig::from_config(config),
            duration: Duration::minutes(config.duration_minutes),
        })
    }
}

#[async_trait]
impl SessionStore for CookieSessionStore {
    async fn create(&self, identity: &Identity) -> Result<(Session, String), AuthError> {
        let session = Session::new(identity.clone(), self.duration);
        let payload =
            serde_json::to_string(&session).map_err(|e| AuthError::SessionCreation {
                reason: format!("failed to serialize session: {e}"),
            })?;

        let mut jar = cookie::CookieJar::new();
        jar.private_mut(&self.key)
            .add(cookie::Cookie::new(self.cookie.name.clone(), payload));
        let sealed = jar
            .get(&self.cookie.name)
            .ok_or_else(|| AuthError::SessionCreation {
                reason: "failed to seal session cookie".to_string(),
            })?
            .value()
            .to_string();

        Ok((session, sealed))
    }

    async fn decode(&self, handle: &str) -> Option<Session> {
        let mut jar = cookie::CookieJar::new();
        jar.add_original(cookie::Cookie::new(
            self.cookie.name.clone(),
            handle.to_string(),
        ));
        // get() on the private view authenticates and decrypts; a
        // tampered or foreign-key value simply comes back as None.
        let opened = jar.private(&self.key).get(&self.cookie.name)?;
        let session: Session = serde_json::from_str(opened.value()).ok()?;
        session.is_valid().then_some(session)
    }

    async fn forget(&self, _handle: &str) {
        // The payload lives client-side; clearing the cookie is the whole
        // deletion. Nothing to do server-side, and nothing to fail.
    }

    fn cookie(&self) -> &SessionCookieConfig {
        &self.cookie
    }
}

/// Cache-backed session store: the handle is a session id, the payload
/// lives in the shared key-value cache with the session TTL.
#[derive(Debug)]
pub struct CacheSessionStore {
    cache: Arc<dyn KvCache>,
    cookie: SessionCookieConfig,
    duration: Duration,
}

impl CacheSessionStore {
    /// Creates the store over a cache backend.
    #[must_use]
    pub fn new(cache: Arc<dyn KvCache>, config: &SessionConfig) -> Self {
        Self {
            cache,
            cookie: SessionCookieConfig::from_config(config),
            duration: Duration::minutes(config.duration_minutes),
        }
    }

    fn cache_key(id: SessionId) -> String {
        format!("session:{id}")
    }

    fn ttl(&self) -> std::time::Duration {
        self.duration.to_std().unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for CacheSessionStore {
    async fn create(&self, identity: &Identity) -> Result<(Session, String), AuthError> {
        let session = Session::new(identity.clone(), self.duration);
        let payload =
            serde_json::to_string(&session).map_err(|e| AuthError::SessionCreation {
                reason: format!("failed to serialize session: {e}"),
            })?;

        // Writing under the same id overwrites any prior session: exactly
        // one session is active per identifier.
        self.cache
            .set_ex(&Self::cache_key(session.id()), &payload, self.ttl())
            .await
            .map_err(|e| AuthError::SessionCreation {
                reason: e.to_string(),
            })?;

        Ok((session.clone(), session.id().to_string()))
    }

    async fn decode(&self, handle: &str) -> Option<Session> {
        let id: SessionId = handle.parse().ok()?;
        let payload = self.cache.get(&Self::cache_key(id)).await.ok()??;
        let session: Session = serde_json::from_str(&payload).ok()?;
        session.is_valid().then_some(session)
    }

    async fn forget(&self, handle: &str) {
        let Ok(id) = handle.parse::<SessionId>() else {
            return;
        };
        if let Err(e) = self.cache.delete(&Self::cache_key(id)).await {
            tracing::warn!(session_id = %id, error = %e, "failed to delete session from cache");
        }
    }

    fn cookie(&self) -> &SessionCookieConfig {
        &self.cookie
    }
}
