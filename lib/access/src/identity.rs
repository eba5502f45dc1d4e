//! Normalized identity handling.
//!
//! An `Identity` is the provider-agnostic set of user attributes every
//! authentication backend must produce. A `ClaimMapping` declares which
//! provider claim feeds each normalized attribute, so adding a provider
//! means writing a mapping, not a new identity shape.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Normalized, provider-agnostic user attributes.
///
/// Produced by an authentication backend from provider-specific claims.
/// This is the contract every backend variant honors: the session store and
/// the downstream application only ever see this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique identifier from the identity source.
    user_id: String,
    /// Email address, if the provider exposes one.
    email: Option<String>,
    /// Given (first) name.
    given_name: Option<String>,
    /// Family (last) name.
    family_name: Option<String>,
    /// Display name.
    display_name: Option<String>,
}

impl Identity {
    /// Creates a new identity with only the stable user id set.
    #[must_use]
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            email: None,
            given_name: None,
            family_name: None,
            display_name: None,
        }
    }

    /// Sets the email attribute.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the given name.
    #[must_use]
    pub fn with_given_name(mut self, given_name: Option<String>) -> Self {
        self.given_name = given_name;
        self
    }

    /// Sets the family name.
    #[must_use]
    pub fn with_family_name(mut self, family_name: Option<String>) -> Self {
        self.family_name = family_name;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    /// Returns the stable user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the email address, if present.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the given name, if present.
    #[must_use]
    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    /// Returns the family name, if present.
    #[must_use]
    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    /// Returns the display name, if present.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Declares which provider claim feeds each normalized attribute.
///
/// The user-id claim is mandatory: a claims payload without it cannot be
/// normalized. All other attributes are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMapping {
    /// Claim holding the stable unique user id.
    pub user_id: String,
    /// Claim holding the email address.
    pub email: String,
    /// Claim holding the given name.
    pub given_name: String,
    /// Claim holding the family name.
    pub family_name: String,
    /// Claim holding the display name.
    pub display_name: String,
}

impl ClaimMapping {
    /// Mapping for standard OIDC-style claim names.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            user_id: "sub".to_string(),
            email: "email".to_string(),
            given_name: "given_name".to_string(),
            family_name: "family_name".to_string(),
            display_name: "name".to_string(),
        }
    }

    /// Mapping for Microsoft Entra ID / Graph user objects.
    #[must_use]
    pub fn entra() -> Self {
        Self {
            user_id: "userPrincipalName".to_string(),
            email: "userPrincipalName".to_string(),
            given_name: "givenName".to_string(),
            family_name: "surname".to_string(),
            display_name: "displayName".to_string(),
        }
    }

    /// Normalizes a provider claims payload into an `Identity`.
    ///
    /// Returns `None` when the user-id claim is missing or not a string;
    /// callers treat that as a provider failure, not a panic.
    #[must_use]
    pub fn normalize(&self, claims: &JsonValue) -> Option<Identity> {
        let user_id = claims.get(&self.user_id)?.as_str()?.to_string();

        let get = |claim: &str| {
            claims
                .get(claim)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        Some(
            Identity::new(user_id)
                .with_email(get(&self.email))
                .with_given_name(get(&self.given_name))
                .with_family_name(get(&self.family_name))
                .with_display_name(get(&self.display_name)),
        )
    }
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self::standard()
    }
}
