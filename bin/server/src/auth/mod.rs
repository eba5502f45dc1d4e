//! Authentication module for the gatehouse server.
//!
//! This module provides:
//! - Pluggable session stores (cookie, memory, redis)
//! - Interchangeable authentication backends (local credentials,
//!   Microsoft Entra ID)
//! - The authorization-chain middleware and identity extractors
//! - The external-IdP flow engine and its callback endpoint
//!
//! # Shape
//!
//! The `AuthGateway` owns exactly one backend and one session store for
//! its lifetime, both chosen at startup from static registries: backend
//! and store identifiers in configuration map to constructors, never to
//! runtime class lookup. The gateway registers the fixed endpoint set and
//! installs a per-request middleware whose only job is to attach identity
//! context when a session decodes; it never blocks page-style requests
//! from reaching their handler.

pub mod backend;
pub mod entra;
pub mod gateway;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod session_store;

use std::sync::Arc;

use gatehouse_access::AuthzChain;

use crate::config::AuthConfig;

pub use backend::{AuthBackend, AuthOutcome, CallbackParams, Credentials, LocalBackend};
pub use entra::EntraBackend;
pub use gateway::AuthGateway;
pub use middleware::{CurrentUser, RequireUser};
pub use session_store::{
    CacheSessionStore, CookieSessionStore, SessionCookieConfig, SessionStore,
};

/// Shared state for the auth endpoint set and middleware.
#[derive(Clone)]
pub struct AuthState {
    /// The authentication backend.
    pub backend: Arc<dyn AuthBackend>,
    /// The session store.
    pub sessions: Arc<dyn SessionStore>,
    /// The authorization chain.
    pub authz: Arc<AuthzChain>,
    /// Where successful logins land.
    pub home_redirect: String,
    /// Where failed external flows land.
    pub failure_redirect: String,
}

impl AuthState {
    /// Creates the shared auth state.
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        sessions: Arc<dyn SessionStore>,
        authz: Arc<AuthzChain>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            backend,
            sessions,
            authz,
            home_redirect: config.home_redirect.clone(),
            failure_redirect: config.failure_redirect.clone(),
        }
    }
}
