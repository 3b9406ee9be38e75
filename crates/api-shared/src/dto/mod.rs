//! Request and response bodies for the REST API.
//!
//! Identifiers travel as canonical 32-character lowercase hex strings. Dates are ISO-8601
//! (`YYYY-MM-DD`), timestamps RFC 3339 in UTC.

mod analytics;
mod appointments;
mod auth;
mod camps;
mod clinical;
mod clinics;
mod notifications;
mod patients;
mod queue;
mod staff;

pub use analytics::*;
pub use appointments::*;
pub use auth::*;
pub use camps::*;
pub use clinical::*;
pub use clinics::*;
pub use notifications::*;
pub use patients::*;
pub use queue::*;
pub use staff::*;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Stable machine-readable code, for example `not_found` or `conflict`.
    pub error: String,
    pub message: String,
}
