//! Authentication backends.
//!
//! A backend owns the handshake with its identity source and produces a
//! normalized `Identity`. The local variant verifies a login/password pair
//! against the configured credential table; external variants drive a
//! redirect flow and resolve identity on callback. No session logic lives
//! here, only identity verification.

use async_trait::async_trait;
use gatehouse_access::{AuthError, Identity};
use serde::Deserialize;
use std::collections::HashMap;

use argon2::{Argon2, PasswordHash, PasswordVerifier};

use crate::config::LocalUser;

/// A login/password pair extracted from a request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Login name.
    #[serde(alias = "login")]
    pub username: String,
    /// Password.
    pub password: String,
}

/// Query parameters the provider sends to the callback endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    /// Authorization code, on success.
    pub code: Option<String>,
    /// CSRF state token.
    pub state: Option<String>,
    /// Error code, when the provider rejected the attempt.
    pub error: Option<String>,
    /// Human-readable error description.
    pub error_description: Option<String>,
}

/// What an authentication attempt produced.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Identity verified; the caller establishes the session.
    Authenticated(Identity),
    /// The client must visit the identity provider first.
    Redirect(String),
}

/// An interchangeable authentication backend.
#[async_trait]
pub trait AuthBackend: Send + Sync + std::fmt::Debug {
    /// Backend identifier for logging.
    fn name(&self) -> &'static str;

    /// Entry point for a login attempt.
    ///
    /// Branches on the presence of credentials: a local backend requires
    /// them, an external backend falls back to the redirect flow without
    /// them and attempts a direct credential exchange with them.
    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<AuthOutcome, AuthError>;

    /// Resumes an external flow when the provider calls back.
    ///
    /// Backends without a callback reject it as a flow-state error.
    async fn auth_callback(&self, _params: CallbackParams) -> Result<Identity, AuthError> {
        Err(AuthError::FlowState {
            reason: format!("backend '{}' has no callback flow", self.name()),
        })
    }

    /// The callback route to append at configuration time, if any.
    fn callback_path(&self) -> Option<String> {
        None
    }
}

/// Extracts credentials from a request body.
///
/// Supports form-encoded and JSON payloads. Anything absent or malformed
/// yields `None`: a recoverable, user-visible condition, never a crash.
#[must_use]
pub fn extract_credentials(content_type: Option<&str>, body: &[u8]) -> Option<Credentials> {
    let media_type = content_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim();

    match media_type {
        "application/json" => serde_json::from_slice(body).ok(),
        "application/x-www-form-urlencoded" => serde_urlencoded::from_bytes(body).ok(),
        _ => None,
    }
}

/// Local-credential backend over the configured user table.
#[derive(Debug)]
pub struct LocalBackend {
    users: HashMap<String, LocalUser>,
}

impl LocalBackend {
    /// Creates the backend from the configured credential table.
    #[must_use]
    pub fn new(users: Vec<LocalUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }

    /// Verifies a login/password pair against the credential table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAuth` for unknown users, wrong passwords, and
    /// unusable stored hashes alike; the caller cannot tell them apart.
    pub fn check_credentials(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let user = self
            .users
            .get(&credentials.username)
            .ok_or_else(|| AuthError::InvalidAuth {
                reason: "unknown user".to_string(),
            })?;

        let parsed = PasswordHash::new(&user.password_hash).map_err(|e| {
            tracing::error!(username = %user.username, error = %e, "stored password hash is unusable");
            AuthError::InvalidAuth {
                reason: "credentials rejected".to_string(),
            }
        })?;

        Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidAuth {
                reason: "credentials rejected".to_string(),
            })?;

        Ok(Identity::new(user.username.clone())
            .with_email(user.email.clone())
            .with_given_name(user.given_name.clone())
            .with_family_name(user.family_name.clone())
            .with_display_name(user.display_name.clone()))
    }
}

#[async_trait]
impl AuthBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<AuthOutcome, AuthError> {
        let credentials = credentials.ok_or_else(|| AuthError::InvalidAuth {
            reason: "missing credentials".to_string(),
        })?;

        let identity = self.check_credentials(&credentials)?;
        Ok(AuthOutcome::Authenticated(identity))
    }
}
