//! # Camp Core
//!
//! Core business logic for the camp clinic record system.
//!
//! This crate contains the data operations behind the API:
//! - Clinic onboarding, staff, roles and session tokens
//! - Patients, camps, appointments and queues in a file-backed record store
//! - Clinical records in per-patient Git repositories, plus content-addressed uploads
//! - Notifications and analytics
//!
//! **No API concerns**: HTTP routing, request extraction and status codes belong in `api-rest`.
//! Services take the acting [`Principal`] and return view types from `api-shared`.

pub mod analytics;
pub mod auth;
pub mod author;
pub mod config;
pub mod constants;
pub mod error;
pub mod notifications;
pub mod repositories;
pub mod store;
mod versioned_files;

pub use analytics::AnalyticsService;
pub use auth::{AuthService, Principal, TokenClaims, TokenSigner};
pub use author::Author;
pub use config::{CoreConfig, EmailSettings, NotificationSettings, WhatsAppSettings};
pub use constants::DEFAULT_DATA_DIR;
pub use error::{CoreError, CoreResult};
pub use notifications::Notifier;
pub use repositories::appointments::AppointmentService;
pub use repositories::camps::CampService;
pub use repositories::clinical::ClinicalService;
pub use repositories::clinics::{ClinicService, Onboarded};
pub use repositories::patients::PatientService;
pub use repositories::queues::QueueService;
pub use repositories::staff::StaffService;
pub use repositories::uploads::UploadService;
pub use store::Storage;
