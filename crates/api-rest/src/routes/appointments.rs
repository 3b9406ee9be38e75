use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{
    AppointmentListQuery, AppointmentStatusReq, AppointmentStatusRes, AppointmentView,
    BookAppointmentReq, ErrorRes, RescheduleAppointmentReq,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use camp_core::AppointmentService;

#[utoipa::path(
    get,
    path = "/appointments",
    tag = "appointments",
    params(AppointmentListQuery),
    responses((status = 200, description = "Appointments ordered by start time", body = [AppointmentView])),
    security(("bearer_auth" = []))
)]
pub async fn list_appointments(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<AppointmentListQuery>,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    Ok(Json(
        AppointmentService::new(state.storage.clone()).list(&principal, query)?,
    ))
}

#[utoipa::path(
    post,
    path = "/appointments",
    tag = "appointments",
    request_body = BookAppointmentReq,
    responses(
        (status = 201, description = "Appointment booked", body = AppointmentView),
        (status = 409, description = "The doctor already has an overlapping booking", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
/// Book an appointment
///
/// A confirmation goes out to the patient's email and WhatsApp number in the background.
pub async fn book_appointment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<BookAppointmentReq>,
) -> ApiResult<(StatusCode, Json<AppointmentView>)> {
    let appointment = AppointmentService::new(state.storage.clone()).book(&principal, req)?;

    let notifier = state.notifier.clone();
    let booked = appointment.clone();
    tokio::spawn(async move {
        notifier.appointment_confirmation(&principal, &booked).await;
    });

    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    get,
    path = "/appointments/{id}",
    tag = "appointments",
    params(("id" = String, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Appointment", body = AppointmentView),
        (status = 404, description = "Unknown appointment", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_appointment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<AppointmentView>> {
    Ok(Json(
        AppointmentService::new(state.storage.clone()).get(&principal, &id)?,
    ))
}

#[utoipa::path(
    post,
    path = "/appointments/{id}/reschedule",
    tag = "appointments",
    params(("id" = String, Path, description = "Appointment id")),
    request_body = RescheduleAppointmentReq,
    responses(
        (status = 200, description = "Appointment moved", body = AppointmentView),
        (status = 409, description = "Appointment is no longer scheduled, or the new slot overlaps", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RescheduleAppointmentReq>,
) -> ApiResult<Json<AppointmentView>> {
    Ok(Json(
        AppointmentService::new(state.storage.clone()).reschedule(&principal, &id, req)?,
    ))
}

#[utoipa::path(
    post,
    path = "/appointments/{id}/status",
    tag = "appointments",
    params(("id" = String, Path, description = "Appointment id")),
    request_body = AppointmentStatusReq,
    responses(
        (status = 200, description = "Status changed; checking in also places the patient in the queue", body = AppointmentStatusRes),
        (status = 409, description = "Transition not allowed from the current status", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_appointment_status(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<AppointmentStatusReq>,
) -> ApiResult<Json<AppointmentStatusRes>> {
    Ok(Json(
        AppointmentService::new(state.storage.clone()).update_status(&principal, &id, req)?,
    ))
}
