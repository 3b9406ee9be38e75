use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, CurrentUser};
use api_shared::{ErrorRes, FileView};
use axum::{
    extract::{Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use camp_core::UploadService;

const FILE_FIELD: &str = "file";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[utoipa::path(
    get,
    path = "/patients/{id}/files",
    tag = "uploads",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Files uploaded for the patient, newest first", body = [FileView])),
    security(("bearer_auth" = []))
)]
pub async fn list_files(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<FileView>>> {
    Ok(Json(
        UploadService::new(state.storage.clone()).list(&principal, &id)?,
    ))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/files",
    tag = "uploads",
    params(("id" = String, Path, description = "Patient id")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "A single `file` field"),
    responses(
        (status = 201, description = "File stored under its content hash", body = FileView),
        (status = 400, description = "No file field in the body", body = ErrorRes),
        (status = 409, description = "The same content is already stored for this patient", body = ErrorRes),
        (status = 413, description = "File exceeds the upload limit", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
/// Upload a report or image for a patient
///
/// Only the first multipart field named `file` is read.
pub async fn upload_file(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<FileView>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;

        let view = UploadService::new(state.storage.clone()).upload(
            &principal,
            &id,
            &filename,
            &bytes,
        )?;
        return Ok((StatusCode::CREATED, Json(view)));
    }
    Err(ApiError::MissingFile)
}

#[utoipa::path(
    get,
    path = "/patients/{id}/files/{hash}",
    tag = "uploads",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("hash" = String, Path, description = "SHA-256 of the file content")
    ),
    responses(
        (status = 200, description = "Raw file content", content_type = "application/octet-stream"),
        (status = 404, description = "No such file for this patient", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_file(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path((id, hash)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (view, bytes) = UploadService::new(state.storage.clone()).download(&principal, &id, &hash)?;

    let media_type = view
        .media_type
        .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        view.original_filename.replace('"', "")
    );

    Ok((
        [(CONTENT_TYPE, media_type), (CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}
