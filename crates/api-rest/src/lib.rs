//! # API REST
//!
//! HTTP surface of the clinic records service.
//!
//! Handles:
//! - HTTP endpoints with axum, one handler module per area under [`routes`]
//! - bearer-token authentication through the [`state::CurrentUser`] extractor
//! - mapping core errors to status codes and JSON bodies ([`error`])
//! - OpenAPI/Swagger documentation ([`docs`])
//!
//! Business rules live in `camp-core`; handlers only extract, delegate and serialise.

#![warn(rust_2018_idioms)]

pub mod docs;
pub mod error;
pub mod routes;
pub mod state;

pub use docs::ApiDoc;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::{ErrorRes, FileView, LoginRes, MeRes, OnboardClinicRes, PatientView};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use camp_core::{CoreConfig, NotificationSettings};
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "camp-test-boundary";

    fn app(temp: &TempDir, max_upload_bytes: usize) -> Router {
        let cfg = CoreConfig::new(
            temp.path().to_path_buf(),
            "rest-test-secret-rest-test-secret-00",
            12,
            4,
            max_upload_bytes,
            NotificationSettings::default(),
        )
        .expect("valid test config");
        router(AppState::new(Arc::new(cfg)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.expect("infallible");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, body)
    }

    fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).expect("json body")
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    }

    fn multipart_request(uri: &str, token: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    /// Onboards a clinic and returns the admin's bearer token.
    async fn onboard_and_login(app: &Router) -> String {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/clinics/onboard",
                None,
                json!({
                    "name": "Riverside Health Camp",
                    "slug": "riverside",
                    "contact_email": "hello@riverside.example",
                    "admin_name": "Asha Rao",
                    "admin_email": "asha@riverside.example",
                    "admin_password": "correct horse battery",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let onboarded: OnboardClinicRes = parse(&body);
        assert_eq!(onboarded.clinic.slug, "riverside");

        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/auth/login",
                None,
                json!({
                    "clinic_slug": "riverside",
                    "email": "asha@riverside.example",
                    "password": "correct horse battery",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        parse::<LoginRes>(&body).token
    }

    async fn register_patient(app: &Router, token: &str) -> PatientView {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/patients",
                Some(token),
                json!({
                    "first_name": "Meera",
                    "last_name": "Das",
                    "sex": "female",
                    "age_years": 52,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        parse(&body)
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        let value: Value = parse(&body);
        assert_eq!(value["ok"], json!(true));
    }

    #[tokio::test]
    async fn onboard_login_and_me() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);
        let token = onboard_and_login(&app).await;

        let (status, body) = send(&app, get_request("/auth/me", &token)).await;
        assert_eq!(status, StatusCode::OK);
        let me: MeRes = parse(&body);
        assert_eq!(me.clinic.slug, "riverside");
        assert_eq!(me.user.email, "asha@riverside.example");
        assert!(me.role_names.iter().any(|r| r == "admin"));
    }

    #[tokio::test]
    async fn requests_without_a_valid_token_are_unauthorised() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);

        let missing = Request::builder()
            .uri("/patients")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(parse::<ErrorRes>(&body).error, "unauthorised");

        let (status, _) = send(&app, get_request("/patients", "not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_slug_is_a_conflict() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);
        onboard_and_login(&app).await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/clinics/onboard",
                None,
                json!({
                    "name": "Another Riverside",
                    "slug": "riverside",
                    "contact_email": "other@riverside.example",
                    "admin_name": "Ravi Kumar",
                    "admin_email": "ravi@riverside.example",
                    "admin_password": "another long password",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(parse::<ErrorRes>(&body).error, "conflict");
    }

    #[tokio::test]
    async fn unknown_patient_is_not_found() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);
        let token = onboard_and_login(&app).await;

        let uri = format!("/patients/{}", camp_uuid::ShardableUuid::new());
        let (status, _) = send(&app, get_request(&uri, &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_list_and_download_a_file() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);
        let token = onboard_and_login(&app).await;
        let patient = register_patient(&app, &token).await;

        let files_uri = format!("/patients/{}/files", patient.id);
        let (status, body) = send(
            &app,
            multipart_request(&files_uri, &token, "report.txt", b"normal study"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uploaded: FileView = parse(&body);
        assert_eq!(uploaded.original_filename, "report.txt");
        assert_eq!(uploaded.size_bytes, 12);

        let (status, body) = send(&app, get_request(&files_uri, &token)).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<FileView> = parse(&body);
        assert_eq!(listed.len(), 1);

        let download_uri = format!("{}/{}", files_uri, uploaded.hash);
        let response = app
            .clone()
            .oneshot(get_request(&download_uri, &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(disposition.contains("report.txt"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"normal study");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);
        let token = onboard_and_login(&app).await;
        let patient = register_patient(&app, &token).await;

        let files_uri = format!("/patients/{}/files", patient.id);
        let (status, body) = send(
            &app,
            multipart_request(&files_uri, &token, "scan.bin", &[7u8; 2048]),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(parse::<ErrorRes>(&body).error, "payload_too_large");
    }

    #[tokio::test]
    async fn multipart_without_a_file_field_is_a_bad_request() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024);
        let token = onboard_and_login(&app).await;
        let patient = register_patient(&app, &token).await;

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri(format!("/patients/{}/files", patient.id))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
