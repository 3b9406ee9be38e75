use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{
    CreateRoleReq, CreateStaffReq, ErrorRes, ResetPasswordReq, RoleView, StaffView,
    UpdateRoleReq, UpdateStaffReq, UserStatus,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use camp_core::StaffService;

fn service(state: &AppState) -> StaffService {
    StaffService::new(state.storage.clone())
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "staff",
    responses((status = 200, description = "Roles of the clinic", body = [RoleView])),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<Vec<RoleView>>> {
    Ok(Json(service(&state).list_roles(&principal)?))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "staff",
    request_body = CreateRoleReq,
    responses(
        (status = 201, description = "Role created", body = RoleView),
        (status = 409, description = "Role name already used", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<CreateRoleReq>,
) -> ApiResult<(StatusCode, Json<RoleView>)> {
    let role = service(&state).create_role(&principal, req)?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    tag = "staff",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = RoleView),
        (status = 404, description = "Unknown role", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<RoleView>> {
    Ok(Json(service(&state).get_role(&principal, &id)?))
}

#[utoipa::path(
    put,
    path = "/roles/{id}",
    tag = "staff",
    params(("id" = String, Path, description = "Role id")),
    request_body = UpdateRoleReq,
    responses(
        (status = 200, description = "Role updated", body = RoleView),
        (status = 409, description = "The built-in admin role cannot change", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleReq>,
) -> ApiResult<Json<RoleView>> {
    Ok(Json(service(&state).update_role(&principal, &id, req)?))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "staff",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 409, description = "Role is the admin role or still assigned", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service(&state).delete_role(&principal, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/staff",
    tag = "staff",
    responses((status = 200, description = "Staff of the clinic", body = [StaffView])),
    security(("bearer_auth" = []))
)]
pub async fn list_staff(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<Vec<StaffView>>> {
    Ok(Json(service(&state).list_staff(&principal)?))
}

#[utoipa::path(
    post,
    path = "/staff",
    tag = "staff",
    request_body = CreateStaffReq,
    responses(
        (status = 201, description = "Staff member created", body = StaffView),
        (status = 409, description = "Email already used in this clinic", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
/// Create a staff account
///
/// The new member receives a welcome email in the background.
pub async fn create_staff(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<CreateStaffReq>,
) -> ApiResult<(StatusCode, Json<StaffView>)> {
    let staff = service(&state).create_staff(&principal, req)?;

    let notifier = state.notifier.clone();
    let (name, email) = (staff.name.clone(), staff.email.clone());
    tokio::spawn(async move {
        notifier.welcome_staff(&principal.clinic, &name, &email).await;
    });

    Ok((StatusCode::CREATED, Json(staff)))
}

#[utoipa::path(
    get,
    path = "/staff/{id}",
    tag = "staff",
    params(("id" = String, Path, description = "Staff user id")),
    responses(
        (status = 200, description = "Staff member", body = StaffView),
        (status = 404, description = "Unknown staff member", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_staff(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<StaffView>> {
    Ok(Json(service(&state).get_staff(&principal, &id)?))
}

#[utoipa::path(
    put,
    path = "/staff/{id}",
    tag = "staff",
    params(("id" = String, Path, description = "Staff user id")),
    request_body = UpdateStaffReq,
    responses((status = 200, description = "Staff member updated", body = StaffView)),
    security(("bearer_auth" = []))
)]
pub async fn update_staff(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStaffReq>,
) -> ApiResult<Json<StaffView>> {
    Ok(Json(service(&state).update_staff(&principal, &id, req)?))
}

#[utoipa::path(
    post,
    path = "/staff/{id}/disable",
    tag = "staff",
    params(("id" = String, Path, description = "Staff user id")),
    responses(
        (status = 200, description = "Staff member disabled", body = StaffView),
        (status = 409, description = "Users cannot disable themselves", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn disable_staff(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<StaffView>> {
    Ok(Json(service(&state).set_staff_status(
        &principal,
        &id,
        UserStatus::Disabled,
    )?))
}

#[utoipa::path(
    post,
    path = "/staff/{id}/enable",
    tag = "staff",
    params(("id" = String, Path, description = "Staff user id")),
    responses((status = 200, description = "Staff member enabled", body = StaffView)),
    security(("bearer_auth" = []))
)]
pub async fn enable_staff(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<StaffView>> {
    Ok(Json(service(&state).set_staff_status(
        &principal,
        &id,
        UserStatus::Active,
    )?))
}

#[utoipa::path(
    post,
    path = "/staff/{id}/password",
    tag = "staff",
    params(("id" = String, Path, description = "Staff user id")),
    request_body = ResetPasswordReq,
    responses((status = 204, description = "Password reset")),
    security(("bearer_auth" = []))
)]
pub async fn reset_password(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ResetPasswordReq>,
) -> ApiResult<StatusCode> {
    service(&state).reset_password(&principal, &id, req)?;
    Ok(StatusCode::NO_CONTENT)
}
