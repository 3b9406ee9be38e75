use crate::vocab::Sex;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterPatientReq {
    pub first_name: String,
    pub last_name: String,
    pub sex: Sex,
    /// Either `date_of_birth` or `age_years` must be given.
    pub date_of_birth: Option<NaiveDate>,
    pub age_years: Option<u8>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub camp_id: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePatientReq {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: Option<Sex>,
    pub date_of_birth: Option<NaiveDate>,
    pub age_years: Option<u8>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub camp_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatientView {
    pub id: String,
    /// Clinic-local sequential number, `P000001` onwards.
    pub registration_number: String,
    pub first_name: String,
    pub last_name: String,
    pub sex: Sex,
    pub date_of_birth: Option<NaiveDate>,
    pub age_years: Option<u8>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub camp_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PatientListQuery {
    /// Case-insensitive match on name, phone or registration number.
    pub q: Option<String>,
    pub camp_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientSummary {
    pub patient: PatientView,
    pub diagnoses: u64,
    pub active_diagnoses: u64,
    pub treatments: u64,
    pub mammography: u64,
    pub gp_records: u64,
    pub files: u64,
    pub appointments: u64,
    pub last_visit_at: Option<DateTime<Utc>>,
}
