//! Federation metadata handler

use crate::router::WsFedState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Return federation metadata XML
#[utoipa::path(
    get,
    path = "/FederationMetadata/2007-06/FederationMetadata.xml",
    responses(
        (status = 200, description = "Federation metadata XML"),
        (status = 502, description = "Key material unavailable"),
        (status = 500, description = "Failed to generate metadata"),
    ),
    tag = "WS-Federation"
)]
pub async fn get_metadata(State(state): State<WsFedState>) -> Response {
    match state.metadata.publish().await {
        Ok(document) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            document.xml.clone(),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
