use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{ClinicDashboard, DashboardQuery, ErrorRes};
use axum::{
    extract::{Query, State},
    response::Json,
};
use camp_core::AnalyticsService;

#[utoipa::path(
    get,
    path = "/analytics/dashboard",
    tag = "analytics",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Clinic-wide counts over the date range", body = ClinicDashboard),
        (status = 400, description = "`from` is after `to`", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<ClinicDashboard>> {
    Ok(Json(
        AnalyticsService::new(state.storage.clone()).dashboard(&principal, query)?,
    ))
}
