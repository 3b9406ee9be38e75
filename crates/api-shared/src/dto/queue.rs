use crate::vocab::QueueStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueueEntryView {
    pub id: String,
    pub patient_id: String,
    pub appointment_id: Option<String>,
    pub camp_id: Option<String>,
    pub queue_date: NaiveDate,
    /// 1-based token, unique within clinic + date + camp.
    pub token_number: u32,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub served_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EnqueueReq {
    pub patient_id: String,
    pub appointment_id: Option<String>,
    pub camp_id: Option<String>,
}

/// Selects one queue: a date (default today, UTC) and an optional camp.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QueueSelector {
    pub date: Option<NaiveDate>,
    pub camp_id: Option<String>,
}
