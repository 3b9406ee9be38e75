use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{EnqueueReq, ErrorRes, QueueEntryView, QueueSelector};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use camp_core::QueueService;

#[utoipa::path(
    get,
    path = "/queue",
    tag = "queue",
    params(QueueSelector),
    responses((status = 200, description = "Entries of one day's queue in token order", body = [QueueEntryView])),
    security(("bearer_auth" = []))
)]
pub async fn list_queue(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(selector): Query<QueueSelector>,
) -> ApiResult<Json<Vec<QueueEntryView>>> {
    Ok(Json(
        QueueService::new(state.storage.clone()).list(&principal, selector)?,
    ))
}

#[utoipa::path(
    post,
    path = "/queue",
    tag = "queue",
    request_body = EnqueueReq,
    responses(
        (status = 201, description = "Walk-in placed in today's queue", body = QueueEntryView),
        (status = 409, description = "Patient is already waiting", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn enqueue(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<EnqueueReq>,
) -> ApiResult<(StatusCode, Json<QueueEntryView>)> {
    let entry = QueueService::new(state.storage.clone()).enqueue(&principal, req)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    post,
    path = "/queue/call-next",
    tag = "queue",
    params(QueueSelector),
    responses(
        (status = 200, description = "The lowest waiting token, now called", body = QueueEntryView),
        (status = 404, description = "Nobody is waiting", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
/// Call the next waiting patient
///
/// The patient is told by WhatsApp in the background when a number is on file.
pub async fn call_next(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(selector): Query<QueueSelector>,
) -> ApiResult<Json<QueueEntryView>> {
    let entry = QueueService::new(state.storage.clone()).call_next(&principal, selector)?;

    let notifier = state.notifier.clone();
    let called = entry.clone();
    tokio::spawn(async move {
        notifier.queue_called(&principal, &called).await;
    });

    Ok(Json(entry))
}

#[utoipa::path(
    post,
    path = "/queue/{id}/serve",
    tag = "queue",
    params(("id" = String, Path, description = "Queue entry id")),
    responses(
        (status = 200, description = "Entry marked served", body = QueueEntryView),
        (status = 409, description = "Entry has not been called", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn serve(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<QueueEntryView>> {
    Ok(Json(
        QueueService::new(state.storage.clone()).serve(&principal, &id)?,
    ))
}

#[utoipa::path(
    post,
    path = "/queue/{id}/skip",
    tag = "queue",
    params(("id" = String, Path, description = "Queue entry id")),
    responses(
        (status = 200, description = "Entry skipped", body = QueueEntryView),
        (status = 409, description = "Entry is already finished", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn skip(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<QueueEntryView>> {
    Ok(Json(
        QueueService::new(state.storage.clone()).skip(&principal, &id)?,
    ))
}
