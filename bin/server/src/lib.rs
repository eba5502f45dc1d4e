//! gatehouse authentication/authorization server.
//!
//! This crate wires the gatehouse domain libraries into a serving binary:
//! pluggable session stores, interchangeable authentication backends, the
//! authorization chain, and the external-IdP flow engine, all behind a
//! small fixed endpoint set.

pub mod auth;
pub mod config;
pub mod error;
