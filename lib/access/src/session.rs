//! Session records for authenticated users.
//!
//! A session binds an opaque client-held handle to a normalized identity.
//! Sessions are created by a session store after successful authentication
//! and are destroyed on explicit logout or expiry.

use chrono::{DateTime, Duration, Utc};
use gatehouse_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// An active authenticated session.
///
/// The payload is always a normalized `Identity`, never raw provider
/// claims. Exactly one session is active per identifier; re-creating under
/// the same identifier overwrites the prior record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    id: SessionId,
    /// The authenticated identity.
    identity: Identity,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the session expires.
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session for the given identity.
    ///
    /// The session identifier is generated; the session is valid for the
    /// specified duration.
    #[must_use]
    pub fn new(identity: Identity, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            identity,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the authenticated identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the session is still valid (not expired).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }
}
