//! Authentication and authorization domain types for gatehouse.
//!
//! This crate provides:
//! - Normalized identity handling (`Identity`, `ClaimMapping`)
//! - Session records (`Session`, backed by `gatehouse_core::SessionId`)
//! - External-flow state (`FlowState`, `TokenSet`)
//! - The authorization chain (`AuthzCheck`, `AuthzChain`)
//! - The auth error taxonomy (`AuthError`, `SetupError`)
//!
//! # Identity Model
//!
//! Every authentication backend, whatever its provider, produces the same
//! normalized `Identity` record: a stable external user id plus optional
//! email and name attributes. Session payloads always hold normalized
//! identities, never raw provider claims, so the downstream application never
//! sees a provider-specific shape.
//!
//! # Example
//!
//! ```
//! use gatehouse_access::{ClaimMapping, Session};
//! use chrono::Duration;
//!
//! let claims = serde_json::json!({
//!     "userPrincipalName": "alice@example.com",
//!     "givenName": "Alice",
//!     "surname": "Example",
//!     "displayName": "Alice Example",
//! });
//!
//! let identity = ClaimMapping::entra()
//!     .normalize(&claims)
//!     .expect("user id claim present");
//!
//! let session = Session::new(identity, Duration::minutes(30));
//! assert!(session.is_valid());
//! assert_eq!(session.identity().user_id(), "alice@example.com");
//! ```

pub mod authz;
pub mod error;
pub mod flow;
pub mod identity;
pub mod session;

// Re-export main types at crate root
pub use authz::{AllowedHosts, AuthzChain, AuthzCheck, ChainOutcome, PublicPaths, RequestFacts};
pub use error::{AuthError, SetupError};
pub use flow::{FLOW_STATE_TTL, FlowState, TokenSet};
pub use identity::{ClaimMapping, Identity};
pub use session::Session;
