use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{CampAnalytics, CampView, CreateCampReq, ErrorRes, UpdateCampReq};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use camp_core::{AnalyticsService, CampService};

#[utoipa::path(
    get,
    path = "/camps",
    tag = "camps",
    responses((status = 200, description = "Camps, most recent first", body = [CampView])),
    security(("bearer_auth" = []))
)]
pub async fn list_camps(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> ApiResult<Json<Vec<CampView>>> {
    Ok(Json(CampService::new(state.storage.clone()).list(&principal)?))
}

#[utoipa::path(
    post,
    path = "/camps",
    tag = "camps",
    request_body = CreateCampReq,
    responses(
        (status = 201, description = "Camp created", body = CampView),
        (status = 400, description = "End date before start date", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_camp(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<CreateCampReq>,
) -> ApiResult<(StatusCode, Json<CampView>)> {
    let camp = CampService::new(state.storage.clone()).create(&principal, req)?;
    Ok((StatusCode::CREATED, Json(camp)))
}

#[utoipa::path(
    get,
    path = "/camps/{id}",
    tag = "camps",
    params(("id" = String, Path, description = "Camp id")),
    responses(
        (status = 200, description = "Camp", body = CampView),
        (status = 404, description = "Unknown camp", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_camp(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<CampView>> {
    Ok(Json(CampService::new(state.storage.clone()).get(&principal, &id)?))
}

#[utoipa::path(
    put,
    path = "/camps/{id}",
    tag = "camps",
    params(("id" = String, Path, description = "Camp id")),
    request_body = UpdateCampReq,
    responses((status = 200, description = "Camp updated", body = CampView)),
    security(("bearer_auth" = []))
)]
pub async fn update_camp(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateCampReq>,
) -> ApiResult<Json<CampView>> {
    Ok(Json(
        CampService::new(state.storage.clone()).update(&principal, &id, req)?,
    ))
}

#[utoipa::path(
    get,
    path = "/camps/{id}/analytics",
    tag = "analytics",
    params(("id" = String, Path, description = "Camp id")),
    responses(
        (status = 200, description = "Aggregates over the camp's records", body = CampAnalytics),
        (status = 403, description = "Missing view_analytics", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn camp_analytics(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<CampAnalytics>> {
    Ok(Json(
        AnalyticsService::new(state.storage.clone()).camp(&principal, &id)?,
    ))
}
