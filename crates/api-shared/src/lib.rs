//! # API Shared
//!
//! Shared definitions for the camp clinic APIs.
//!
//! Contains:
//! - The controlled vocabulary (`vocab`) used by records and requests
//! - Request/response DTOs (`dto`) with OpenAPI schemas
//! - Shared services like `HealthService`
//! - Authentication header helpers
//!
//! Used by `camp-core` (as its view types) and `api-rest`.

pub mod auth;
pub mod dto;
pub mod health;
pub mod vocab;

pub use dto::*;
pub use health::{HealthRes, HealthService};
pub use vocab::*;
