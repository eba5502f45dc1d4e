//! Error types for the access crate.
//!
//! Two layers:
//! - `AuthError`: request-scoped failures, caught at the component boundary
//!   that produced them and converted into a response
//! - `SetupError`: construction-time misconfiguration, fatal at startup

use std::fmt;

/// Request-scoped authentication/flow failures.
///
/// None of these crash the serving process; each is converted into a
/// redirect or an error body where it is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credentials rejected or missing; maps to an unauthorized response.
    InvalidAuth { reason: String },
    /// Flow state missing, expired, or mismatched on callback.
    FlowState { reason: String },
    /// The external provider returned an error code/description.
    Provider {
        provider: String,
        error: String,
        description: Option<String>,
    },
    /// The provider requires user consent before the flow can proceed.
    ConsentRequired { consent_url: String },
    /// Writing the session to the backing store failed.
    SessionCreation { reason: String },
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAuth { reason } => {
                write!(f, "invalid credentials: {reason}")
            }
            Self::FlowState { reason } => {
                write!(f, "flow state error: {reason}")
            }
            Self::Provider {
                provider,
                error,
                description,
            } => match description {
                Some(desc) => write!(f, "provider '{provider}' error {error}: {desc}"),
                None => write!(f, "provider '{provider}' error {error}"),
            },
            Self::ConsentRequired { consent_url } => {
                write!(f, "provider requires consent, visit {consent_url}")
            }
            Self::SessionCreation { reason } => {
                write!(f, "failed to create session: {reason}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

/// Construction-time misconfiguration.
///
/// These abort startup; they are configuration defects, not runtime
/// conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// No backend registered under the configured identifier.
    UnknownBackend { name: String },
    /// No session store registered under the configured identifier.
    UnknownSessionStore { name: String },
    /// No authorization check registered under the configured identifier.
    UnknownAuthzCheck { name: String },
    /// A configuration value is present but unusable.
    InvalidConfig { field: String, reason: String },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBackend { name } => {
                write!(f, "unknown auth backend '{name}'")
            }
            Self::UnknownSessionStore { name } => {
                write!(f, "unknown session store '{name}'")
            }
            Self::UnknownAuthzCheck { name } => {
                write!(f, "unknown authorization check '{name}'")
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for SetupError {}
