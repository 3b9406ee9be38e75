//! Shared handler state and the authenticated-user extractor.

use crate::error::ApiError;
use api_shared::auth::bearer_token;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use camp_core::{AuthService, CoreConfig, Notifier, Principal, Storage};
use std::sync::Arc;

/// Application state for the REST API server
///
/// Holds the storage handle every service is built from, plus the long-lived token verifier and
/// HTTP notification client.
#[derive(Clone, Debug)]
pub struct AppState {
    pub storage: Storage,
    pub auth: AuthService,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        let storage = Storage::new(cfg);
        Self {
            auth: AuthService::new(storage.clone()),
            notifier: Notifier::new(storage.clone()),
            storage,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.storage.cfg().max_upload_bytes()
    }
}

/// The staff member making the request, resolved from `Authorization: Bearer <token>`.
///
/// The user and their roles are re-read on every request, so disabling a user or editing a
/// role takes effect immediately.
pub struct CurrentUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiError::MissingToken)?;

        let principal = state.auth.authenticate(token)?;
        Ok(CurrentUser(principal))
    }
}
