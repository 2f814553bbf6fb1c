//! Request authentication seams for the deployable host.
//!
//! The WS-Federation router expects an `Extension<Option<Principal>>` on every
//! request. Here the principal comes from a header set by an authenticating
//! reverse proxy in front of this service; when no header is configured every
//! request is anonymous.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use xavyo_api_wsfed::Principal;
use xavyo_core::SharedClock;

/// Upper bound on a trusted subject header value.
const MAX_SUBJECT_LENGTH: usize = 256;

#[derive(Clone)]
pub struct PrincipalLayerState {
    pub header: Option<Arc<str>>,
    pub clock: SharedClock,
}

/// Insert the principal carried by the trusted header, if any.
pub async fn inject_principal(
    State(state): State<PrincipalLayerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = state
        .header
        .as_deref()
        .and_then(|name| principal_from_headers(request.headers(), name, &state));
    request.extensions_mut().insert(principal);
    next.run(request).await
}

fn principal_from_headers(
    headers: &HeaderMap,
    name: &str,
    state: &PrincipalLayerState,
) -> Option<Principal> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_SUBJECT_LENGTH {
        tracing::warn!(header = %name, "Ignoring malformed trusted principal header");
        return None;
    }
    Some(Principal::new(value, state.clock.now()))
}

/// Bearer token required on admin routes.
#[derive(Clone)]
pub struct AdminToken(pub Arc<str>);

pub async fn require_admin_token(
    State(token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = presented.is_some_and(|p| {
        p.len() == token.0.len() && openssl::memcmp::eq(p.as_bytes(), token.0.as_bytes())
    });
    if !authorized {
        tracing::warn!(
            target: "security",
            path = %request.uri().path(),
            "Rejected admin request without valid token"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "Admin token required",
            })),
        )
            .into_response();
    }
    next.run(request).await
}
