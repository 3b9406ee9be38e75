//! Constants used throughout the camp core crate.
//!
//! Path and filename constants live here so the storage layout is defined in one place.

/// Default directory for clinic data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "clinic_data";

/// Directory under the data dir holding one sharded directory per clinic.
pub const CLINICS_DIR_NAME: &str = "clinics";

/// Clinic profile file at the root of each clinic directory.
pub const CLINIC_FILE_NAME: &str = "clinic.yaml";

/// Filename for every collection record (`<collection>/<s1>/<s2>/<id>/record.yaml`).
pub const RECORD_FILE_NAME: &str = "record.yaml";

/// Directory holding per-patient clinical Git repositories.
pub const CLINICAL_DIR_NAME: &str = "clinical";

/// Uploads are content-addressed and never versioned.
pub const DEFAULT_GITIGNORE: &str = "files/\n";

pub const DIAGNOSES_DIR_NAME: &str = "diagnoses";
pub const TREATMENTS_DIR_NAME: &str = "treatments";
pub const MAMMOGRAPHY_DIR_NAME: &str = "mammography";
pub const GP_RECORDS_DIR_NAME: &str = "gp";

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 12;
pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_WHATSAPP_API_URL: &str = "https://graph.facebook.com/v19.0";

/// HMAC keys shorter than this are rejected at startup.
pub const MIN_TOKEN_SECRET_BYTES: usize = 32;

pub const MIN_PASSWORD_LEN: usize = 8;

pub const DEFAULT_APPOINTMENT_MINUTES: u32 = 15;
pub const MIN_APPOINTMENT_MINUTES: u32 = 5;
pub const MAX_APPOINTMENT_MINUTES: u32 = 240;

/// Built-in role names seeded for every clinic.
pub const ADMIN_ROLE_NAME: &str = "admin";
pub const DOCTOR_ROLE_NAME: &str = "doctor";
pub const RADIOGRAPHER_ROLE_NAME: &str = "radiographer";
pub const RECEPTIONIST_ROLE_NAME: &str = "receptionist";
