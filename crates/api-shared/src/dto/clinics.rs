use crate::dto::StaffView;
use crate::vocab::ClinicStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OnboardClinicReq {
    pub name: String,
    /// Platform-unique handle used at login: `[a-z0-9-]`, 3 to 48 characters.
    pub slug: String,
    pub address: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_phone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OnboardClinicRes {
    pub clinic: ClinicView,
    pub admin: StaffView,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClinicView {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub status: ClinicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateClinicReq {
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}
