//! Tenant-scoped services, one per area of the clinic.
//!
//! Read operations take the clinic id; write operations take the acting [`Principal`] so that
//! the tenant and the author are always those of the authenticated user.
//!
//! [`Principal`]: crate::auth::Principal

pub mod appointments;
pub mod camps;
pub mod clinical;
pub mod clinics;
pub(crate) mod helpers;
pub mod patients;
pub mod queues;
pub mod staff;
pub mod uploads;
