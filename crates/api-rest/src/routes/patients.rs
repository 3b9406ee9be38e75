use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{
    ErrorRes, NotificationView, NotifyPatientReq, PatientListQuery, PatientSummary, PatientView,
    RegisterPatientReq, UpdatePatientReq,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use camp_core::PatientService;

#[utoipa::path(
    get,
    path = "/patients",
    tag = "patients",
    params(PatientListQuery),
    responses((status = 200, description = "Patients by registration number", body = [PatientView])),
    security(("bearer_auth" = []))
)]
/// List patients
///
/// `q` matches name, phone digits or registration number; `camp_id` restricts to one camp.
pub async fn list_patients(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<PatientListQuery>,
) -> ApiResult<Json<Vec<PatientView>>> {
    Ok(Json(
        PatientService::new(state.storage.clone()).list(&principal, query)?,
    ))
}

#[utoipa::path(
    post,
    path = "/patients",
    tag = "patients",
    request_body = RegisterPatientReq,
    responses(
        (status = 201, description = "Patient registered", body = PatientView),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 409, description = "Camp is closed", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn register_patient(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<RegisterPatientReq>,
) -> ApiResult<(StatusCode, Json<PatientView>)> {
    let patient = PatientService::new(state.storage.clone()).register(&principal, req)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    tag = "patients",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient", body = PatientView),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_patient(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientView>> {
    Ok(Json(
        PatientService::new(state.storage.clone()).get(&principal, &id)?,
    ))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    tag = "patients",
    params(("id" = String, Path, description = "Patient id")),
    request_body = UpdatePatientReq,
    responses((status = 200, description = "Patient updated", body = PatientView)),
    security(("bearer_auth" = []))
)]
pub async fn update_patient(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdatePatientReq>,
) -> ApiResult<Json<PatientView>> {
    Ok(Json(
        PatientService::new(state.storage.clone()).update(&principal, &id, req)?,
    ))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/summary",
    tag = "patients",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Patient with record counts", body = PatientSummary)),
    security(("bearer_auth" = []))
)]
pub async fn patient_summary(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientSummary>> {
    Ok(Json(
        PatientService::new(state.storage.clone()).summary(&principal, &id)?,
    ))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/notify",
    tag = "notifications",
    params(("id" = String, Path, description = "Patient id")),
    request_body = NotifyPatientReq,
    responses(
        (status = 200, description = "One log entry per channel attempted", body = [NotificationView]),
        (status = 400, description = "Patient cannot be reached on the channel", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
/// Send a message to a patient
///
/// Delivery failures are reported in the returned log entries, not as an error status.
pub async fn notify_patient(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<NotifyPatientReq>,
) -> ApiResult<Json<Vec<NotificationView>>> {
    Ok(Json(
        state.notifier.notify_patient(&principal, &id, req).await?,
    ))
}
