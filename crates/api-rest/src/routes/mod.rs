//! HTTP handlers, one module per area, and the router that mounts them.

pub mod analytics;
pub mod appointments;
pub mod auth;
pub mod camps;
pub mod clinical;
pub mod clinics;
pub mod health;
pub mod notifications;
pub mod patients;
pub mod queue;
pub mod staff;
pub mod uploads;

use crate::docs::ApiDoc;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the full application: every route, Swagger UI and a permissive CORS layer.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health))
        .route("/clinics/onboard", post(clinics::onboard))
        .route(
            "/clinic",
            get(clinics::get_clinic).put(clinics::update_clinic),
        )
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", post(auth::change_password))
        .route("/roles", get(staff::list_roles).post(staff::create_role))
        .route(
            "/roles/:id",
            get(staff::get_role)
                .put(staff::update_role)
                .delete(staff::delete_role),
        )
        .route("/staff", get(staff::list_staff).post(staff::create_staff))
        .route(
            "/staff/:id",
            get(staff::get_staff).put(staff::update_staff),
        )
        .route("/staff/:id/disable", post(staff::disable_staff))
        .route("/staff/:id/enable", post(staff::enable_staff))
        .route("/staff/:id/password", post(staff::reset_password))
        .route("/camps", get(camps::list_camps).post(camps::create_camp))
        .route("/camps/:id", get(camps::get_camp).put(camps::update_camp))
        .route("/camps/:id/analytics", get(camps::camp_analytics))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::register_patient),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient).put(patients::update_patient),
        )
        .route("/patients/:id/summary", get(patients::patient_summary))
        .route("/patients/:id/notify", post(patients::notify_patient))
        .route(
            "/patients/:id/diagnoses",
            get(clinical::list_diagnoses).post(clinical::record_diagnosis),
        )
        .route(
            "/patients/:id/diagnoses/:diagnosis_id",
            get(clinical::get_diagnosis),
        )
        .route(
            "/patients/:id/diagnoses/:diagnosis_id/supersede",
            post(clinical::supersede_diagnosis),
        )
        .route(
            "/patients/:id/treatments",
            get(clinical::list_treatments).post(clinical::record_treatment),
        )
        .route(
            "/patients/:id/mammography",
            get(clinical::list_mammography).post(clinical::record_mammography),
        )
        .route(
            "/patients/:id/gp-records",
            get(clinical::list_gp_records).post(clinical::record_gp_record),
        )
        .route("/patients/:id/history", get(clinical::history))
        .route(
            "/patients/:id/files",
            get(uploads::list_files)
                .post(uploads::upload_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/patients/:id/files/:hash", get(uploads::download_file))
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::book_appointment),
        )
        .route("/appointments/:id", get(appointments::get_appointment))
        .route(
            "/appointments/:id/reschedule",
            post(appointments::reschedule_appointment),
        )
        .route(
            "/appointments/:id/status",
            post(appointments::update_appointment_status),
        )
        .route("/queue", get(queue::list_queue).post(queue::enqueue))
        .route("/queue/call-next", post(queue::call_next))
        .route("/queue/:id/serve", post(queue::serve))
        .route("/queue/:id/skip", post(queue::skip))
        .route(
            "/notifications",
            get(notifications::list_notifications),
        )
        .route("/analytics/dashboard", get(analytics::dashboard))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
