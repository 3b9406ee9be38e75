//! Per-patient clinical record endpoints.
//!
//! Each write is one commit in the patient's versioned clinical repository; `/history` reads
//! that commit log back.

use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};
use api_shared::{
    DiagnosisView, ErrorRes, GpRecordView, HistoryEntry, MammographyView, RecordDiagnosisReq,
    RecordGpReq, RecordMammographyReq, RecordTreatmentReq, SupersedeDiagnosisRes, TreatmentView,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use camp_core::ClinicalService;
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum number of entries, newest first.
    pub limit: Option<usize>,
}

fn service(state: &AppState) -> ClinicalService {
    ClinicalService::new(state.storage.clone())
}

#[utoipa::path(
    get,
    path = "/patients/{id}/diagnoses",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Diagnoses, newest first", body = [DiagnosisView])),
    security(("bearer_auth" = []))
)]
pub async fn list_diagnoses(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DiagnosisView>>> {
    Ok(Json(service(&state).list_diagnoses(&principal, &id)?))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/diagnoses",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    request_body = RecordDiagnosisReq,
    responses(
        (status = 201, description = "Diagnosis recorded", body = DiagnosisView),
        (status = 403, description = "Missing record_diagnosis", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn record_diagnosis(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RecordDiagnosisReq>,
) -> ApiResult<(StatusCode, Json<DiagnosisView>)> {
    let diagnosis = service(&state).record_diagnosis(&principal, &id, req)?;
    Ok((StatusCode::CREATED, Json(diagnosis)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/diagnoses/{diagnosis_id}",
    tag = "clinical",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("diagnosis_id" = String, Path, description = "Diagnosis id")
    ),
    responses(
        (status = 200, description = "Diagnosis", body = DiagnosisView),
        (status = 404, description = "Unknown diagnosis", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_diagnosis(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path((id, diagnosis_id)): Path<(String, String)>,
) -> ApiResult<Json<DiagnosisView>> {
    Ok(Json(
        service(&state).get_diagnosis(&principal, &id, &diagnosis_id)?,
    ))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/diagnoses/{diagnosis_id}/supersede",
    tag = "clinical",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("diagnosis_id" = String, Path, description = "Diagnosis being replaced")
    ),
    request_body = RecordDiagnosisReq,
    responses(
        (status = 201, description = "Replacement recorded and the old diagnosis marked superseded", body = SupersedeDiagnosisRes),
        (status = 409, description = "Diagnosis was already superseded", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn supersede_diagnosis(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path((id, diagnosis_id)): Path<(String, String)>,
    Json(req): Json<RecordDiagnosisReq>,
) -> ApiResult<(StatusCode, Json<SupersedeDiagnosisRes>)> {
    let res = service(&state).supersede_diagnosis(&principal, &id, &diagnosis_id, req)?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/treatments",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Treatments, newest first", body = [TreatmentView])),
    security(("bearer_auth" = []))
)]
pub async fn list_treatments(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TreatmentView>>> {
    Ok(Json(service(&state).list_treatments(&principal, &id)?))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/treatments",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    request_body = RecordTreatmentReq,
    responses(
        (status = 201, description = "Treatment recorded", body = TreatmentView),
        (status = 400, description = "Unknown diagnosis or invalid medication", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn record_treatment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RecordTreatmentReq>,
) -> ApiResult<(StatusCode, Json<TreatmentView>)> {
    let treatment = service(&state).record_treatment(&principal, &id, req)?;
    Ok((StatusCode::CREATED, Json(treatment)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/mammography",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "Mammography reports, newest first", body = [MammographyView])),
    security(("bearer_auth" = []))
)]
pub async fn list_mammography(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MammographyView>>> {
    Ok(Json(service(&state).list_mammography(&principal, &id)?))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/mammography",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    request_body = RecordMammographyReq,
    responses(
        (status = 201, description = "Report recorded", body = MammographyView),
        (status = 400, description = "BI-RADS out of range or image not uploaded for this patient", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn record_mammography(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RecordMammographyReq>,
) -> ApiResult<(StatusCode, Json<MammographyView>)> {
    let report = service(&state).record_mammography(&principal, &id, req)?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/gp-records",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    responses((status = 200, description = "General physician records, newest first", body = [GpRecordView])),
    security(("bearer_auth" = []))
)]
pub async fn list_gp_records(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<GpRecordView>>> {
    Ok(Json(service(&state).list_gp(&principal, &id)?))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/gp-records",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id")),
    request_body = RecordGpReq,
    responses(
        (status = 201, description = "Consultation recorded", body = GpRecordView),
        (status = 400, description = "Vitals out of range", body = ErrorRes)
    ),
    security(("bearer_auth" = []))
)]
pub async fn record_gp_record(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RecordGpReq>,
) -> ApiResult<(StatusCode, Json<GpRecordView>)> {
    let record = service(&state).record_gp(&principal, &id, req)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/history",
    tag = "clinical",
    params(("id" = String, Path, description = "Patient id"), HistoryQuery),
    responses((status = 200, description = "Commit log of the patient's clinical record", body = [HistoryEntry])),
    security(("bearer_auth" = []))
)]
pub async fn history(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(service(&state).history(&principal, &id, query.limit)?))
}
