use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{ChangePasswordReq, ErrorRes, LoginReq, LoginRes, MeRes};
use axum::{extract::State, http::StatusCode, response::Json};

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Signed in", body = LoginRes),
        (status = 401, description = "Invalid credentials", body = ErrorRes),
        (status = 403, description = "Account disabled or clinic suspended", body = ErrorRes)
    )
)]
/// Sign in with clinic slug, email and password
///
/// Returns a bearer token for the `Authorization` header.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> ApiResult<Json<LoginRes>> {
    Ok(Json(state.auth.login(req)?))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "The signed-in staff member", body = MeRes),
        (status = 401, description = "Missing or invalid token", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(CurrentUser(principal): CurrentUser) -> Json<MeRes> {
    Json(principal.me())
}

#[utoipa::path(
    post,
    path = "/auth/password",
    tag = "auth",
    request_body = ChangePasswordReq,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password too short", body = ErrorRes),
        (status = 401, description = "Current password is wrong", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<ChangePasswordReq>,
) -> ApiResult<StatusCode> {
    state.auth.change_password(&principal, req)?;
    Ok(StatusCode::NO_CONTENT)
}
