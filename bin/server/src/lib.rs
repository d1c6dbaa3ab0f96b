//! campus-gate verification server.
//!
//! This crate serves the web half of member verification: the landing
//! route of a verification link, the institutional OIDC callback, and
//! the PostgreSQL repositories behind the verification engine's storage
//! traits.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
