//! Core domain types and utilities for the gatehouse platform.
//!
//! This crate provides the foundational ID types and the error-handling
//! plumbing shared by the gatehouse authentication/authorization layer.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId};
