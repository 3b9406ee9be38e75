use crate::dto::QueueEntryView;
use crate::vocab::{AppointmentService, AppointmentStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppointmentView {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub camp_id: Option<String>,
    pub service: AppointmentService,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BookAppointmentReq {
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub camp_id: Option<String>,
    pub service: AppointmentService,
    pub scheduled_at: DateTime<Utc>,
    /// 5 to 240 minutes; defaults to 15.
    pub duration_minutes: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RescheduleAppointmentReq {
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppointmentStatusReq {
    pub status: AppointmentStatus,
    /// Recorded as the cancel reason when cancelling.
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppointmentStatusRes {
    pub appointment: AppointmentView,
    /// Present when checking in placed the patient in the queue.
    pub queue_entry: Option<QueueEntryView>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AppointmentListQuery {
    /// Only appointments scheduled on this UTC date.
    pub date: Option<NaiveDate>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub camp_id: Option<String>,
    pub status: Option<AppointmentStatus>,
}
