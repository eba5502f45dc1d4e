//! CRM action boundary for gatehouse.
//!
//! A thin typed client over a HubSpot-style CRM REST API: create, read,
//! update, delete, search, and batch operations per object type. The
//! boundary is intentionally narrow: every provider response collapses
//! into one of two error kinds (`CrmError::Unauthorized` for
//! authentication failures, `CrmError::Operation` for everything else) so
//! the action layer above never handles provider-specific error shapes.

pub mod client;
pub mod error;

pub use client::{CrmClient, CrmConfig, ObjectKind};
pub use error::CrmError;
