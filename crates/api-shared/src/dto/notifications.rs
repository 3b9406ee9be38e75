use crate::vocab::{NotificationChannel, NotificationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationView {
    pub id: String,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub patient_id: Option<String>,
    pub appointment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NotifyPatientReq {
    /// Send on one channel only; all channels the patient can be reached on when omitted.
    pub channel: Option<NotificationChannel>,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationListQuery {
    pub patient_id: Option<String>,
    /// Most recent first; defaults to 100.
    pub limit: Option<usize>,
}
