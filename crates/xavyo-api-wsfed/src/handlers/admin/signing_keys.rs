//! Signing key admin handlers

use crate::models::SigningKeyListResponse;
use crate::router::WsFedAdminState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use xavyo_db::models::{SigningKeyInfo, UploadSigningKeyRequest};

/// List token signing keys
#[utoipa::path(
    get,
    path = "/admin/wsfed/signing-keys",
    responses(
        (status = 200, description = "List of signing keys", body = SigningKeyListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn list_signing_keys(State(state): State<WsFedAdminState>) -> impl IntoResponse {
    match state.signing_keys.list().await {
        Ok(keys) => (
            StatusCode::OK,
            Json(SigningKeyListResponse {
                items: keys.into_iter().map(SigningKeyInfo::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Upload a token signing key
#[utoipa::path(
    post,
    path = "/admin/wsfed/signing-keys",
    request_body = UploadSigningKeyRequest,
    responses(
        (status = 201, description = "Signing key uploaded", body = SigningKeyInfo),
        (status = 400, description = "Invalid certificate or key"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn upload_signing_key(
    State(state): State<WsFedAdminState>,
    Json(req): Json<UploadSigningKeyRequest>,
) -> impl IntoResponse {
    match state.signing_keys.upload(req).await {
        Ok(key) => (StatusCode::CREATED, Json(SigningKeyInfo::from(key))).into_response(),
        Err(e) => e.into_response(),
    }
}
