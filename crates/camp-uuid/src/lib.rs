//! UUID and sharded-path utilities.
//!
//! Every stored record (clinic, user, patient, appointment, ...) is addressed by a UUID in a
//! *canonical* representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`ShardableUuid`], a wrapper that guarantees the canonical format once constructed.
//! - Shared sharding logic to derive record directory locations from an identifier.
//! - [`Sha256Hash`], the canonical form of content hashes used for uploaded files.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, records are stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `clinic_data/clinics/55/0e/550e8400e29b41d4a716446655440000/`
//!
//! This keeps the fan-out of any single directory small as tenants and patients grow.

mod service;

pub use service::{Sha256Hash, ShardableUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
