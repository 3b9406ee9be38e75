use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{NotificationListQuery, NotificationView};
use axum::{
    extract::{Query, State},
    response::Json,
};

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    params(NotificationListQuery),
    responses((status = 200, description = "Notification log, newest first", body = [NotificationView])),
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Json<Vec<NotificationView>>> {
    Ok(Json(state.notifier.list(&principal, query)?))
}
