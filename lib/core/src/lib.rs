//! Core domain types and utilities for campus-gate.
//!
//! This crate provides the identifier types and the error handling
//! foundation shared by the verification engine, the identity crate,
//! and the OAuth server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    BanRecordId, CommunityId, ExternalId, OverrideId, ParseIdError, PlatformUserId, RoleId,
};
