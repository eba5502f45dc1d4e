//! Ephemeral state for the external authorization-code flow.
//!
//! Two physically separate requests, the initial login attempt and the
//! provider's asynchronous callback, must agree on context. The
//! `FlowState` persisted when the redirect is issued is the only channel
//! carrying that context forward. Its TTL bounds how long the user may take
//! to complete the external login and limits the CSRF attack window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long a flow-state or token-cache entry lives.
pub const FLOW_STATE_TTL: std::time::Duration = std::time::Duration::from_secs(120);

/// Per-attempt state correlating an external login redirect with its
/// eventual callback.
///
/// Single-use: consumed on the first matching callback, after which a
/// second callback with the same state observes absence and fails. The
/// state value is the randomly generated CSRF token issued alongside the
/// authorize URL and must match byte-for-byte on callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    /// The CSRF state token, unique per flow attempt.
    state: String,
    /// Scopes requested from the provider.
    scopes: Vec<String>,
    /// The redirect URI registered for the callback.
    redirect_uri: String,
    /// PKCE code verifier for the token exchange.
    pkce_verifier: String,
    /// Nonce issued with the authorize request.
    nonce: String,
    /// When the flow was initiated.
    created_at: DateTime<Utc>,
}

impl FlowState {
    /// Creates the state record for a newly initiated flow.
    #[must_use]
    pub fn new(
        state: String,
        scopes: Vec<String>,
        redirect_uri: String,
        pkce_verifier: String,
        nonce: String,
    ) -> Self {
        Self {
            state,
            scopes,
            redirect_uri,
            pkce_verifier,
            nonce,
            created_at: Utc::now(),
        }
    }

    /// Returns the CSRF state token.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns the requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the callback redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the PKCE code verifier.
    #[must_use]
    pub fn pkce_verifier(&self) -> &str {
        &self.pkce_verifier
    }

    /// Returns the nonce.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Returns when the flow was initiated.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Cache key for this flow, qualified by provider.
    #[must_use]
    pub fn cache_key(provider: &str, state: &str) -> String {
        format!("{provider}:flow:{state}")
    }
}

/// Acquired provider tokens cached for silent reuse.
///
/// Keyed per external account; rewritten whenever the set changes, with the
/// same TTL discipline as `FlowState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The bearer access token.
    access_token: String,
    /// Token type reported by the provider (normally "Bearer").
    token_type: String,
    /// Refresh token, when the provider issued one.
    refresh_token: Option<String>,
    /// Absolute expiry of the access token, when reported.
    expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Creates a token set from a provider token response.
    #[must_use]
    pub fn new(
        access_token: String,
        token_type: String,
        refresh_token: Option<String>,
        expires_in_seconds: Option<u64>,
    ) -> Self {
        let expires_at = expires_in_seconds
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64));
        Self {
            access_token,
            token_type,
            refresh_token,
            expires_at,
        }
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the token type.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Returns the refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns true if the access token is past its reported expiry.
    ///
    /// A token with no reported expiry is treated as still usable; the
    /// cache entry's own TTL bounds its lifetime regardless.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() >= at,
            None => false,
        }
    }

    /// Cache key for an account's tokens, qualified by provider.
    #[must_use]
    pub fn cache_key(provider: &str, account: &str) -> String {
        format!("{provider}:token:{account}")
    }
}
