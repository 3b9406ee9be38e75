use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{ClinicView, ErrorRes, OnboardClinicReq, OnboardClinicRes, UpdateClinicReq};
use axum::{extract::State, http::StatusCode, response::Json};
use camp_core::ClinicService;

#[utoipa::path(
    post,
    path = "/clinics/onboard",
    tag = "clinics",
    request_body = OnboardClinicReq,
    responses(
        (status = 201, description = "Clinic, built-in roles and admin created", body = OnboardClinicRes),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 409, description = "Slug already taken", body = ErrorRes)
    )
)]
/// Onboard a new clinic
///
/// Creates the clinic, its four built-in roles and the first admin user in one transaction,
/// then sends the admin a welcome email in the background.
pub async fn onboard(
    State(state): State<AppState>,
    Json(req): Json<OnboardClinicReq>,
) -> ApiResult<(StatusCode, Json<OnboardClinicRes>)> {
    let onboarded = ClinicService::new(state.storage.clone()).onboard(req)?;
    let res = onboarded.to_response();

    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        notifier
            .welcome_staff(
                &onboarded.clinic,
                onboarded.admin.name.as_str(),
                onboarded.admin.email.as_str(),
            )
            .await;
    });

    Ok((StatusCode::CREATED, Json(res)))
}

#[utoipa::path(
    get,
    path = "/clinic",
    tag = "clinics",
    responses(
        (status = 200, description = "The caller's clinic", body = ClinicView)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_clinic(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<ClinicView>> {
    Ok(Json(ClinicService::new(state.storage.clone()).get(&principal)?))
}

#[utoipa::path(
    put,
    path = "/clinic",
    tag = "clinics",
    request_body = UpdateClinicReq,
    responses(
        (status = 200, description = "Clinic updated", body = ClinicView),
        (status = 403, description = "Missing manage_clinic", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_clinic(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<UpdateClinicReq>,
) -> ApiResult<Json<ClinicView>> {
    Ok(Json(
        ClinicService::new(state.storage.clone()).update(&principal, req)?,
    ))
}
