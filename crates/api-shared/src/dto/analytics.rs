use crate::vocab::CampStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// A labelled count, used for every grouped breakdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CountRow {
    pub key: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CampAnalytics {
    pub camp_id: String,
    pub camp_name: String,
    pub patients_registered: u64,
    pub by_sex: Vec<CountRow>,
    /// Bands `0-17`, `18-39`, `40-59`, `60+` and `unknown`.
    pub by_age_band: Vec<CountRow>,
    pub appointments_total: u64,
    pub appointments_by_status: Vec<CountRow>,
    pub appointments_by_service: Vec<CountRow>,
    /// Completed over non-cancelled appointments, 0.0 when there are none.
    pub completion_rate: f64,
    pub top_diagnoses: Vec<CountRow>,
    pub birads_distribution: Vec<CountRow>,
    /// Mammography studies with BI-RADS 4 or higher.
    pub suspicious_findings: u64,
    pub treatments_recorded: u64,
    pub medications_prescribed: u64,
    pub queue_served: u64,
    pub queue_skipped: u64,
    /// Mean minutes between joining the queue and being called.
    pub average_wait_minutes: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    /// Inclusive lower bound (UTC date).
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound (UTC date).
    pub to: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CampSummaryRow {
    pub camp_id: String,
    pub name: String,
    pub status: CampStatus,
    pub patients: u64,
    pub appointments: u64,
    pub completed: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DoctorWorkload {
    pub doctor_id: String,
    pub doctor_name: String,
    pub appointments: u64,
    pub completed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClinicDashboard {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub total_patients: u64,
    pub total_appointments: u64,
    pub total_camps: u64,
    pub registrations_per_day: Vec<DayCount>,
    pub camps: Vec<CampSummaryRow>,
    pub appointments_per_doctor: Vec<DoctorWorkload>,
}
