//! `OpenAPI` document for the WS-Federation endpoints.

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use xavyo_api_wsfed::handlers;

/// Path the JSON document is served at.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Security scheme modifier for the admin bearer token.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "xavyo WS-Federation IdP",
        version = "0.1.0",
        description = "WS-Federation passive requestor sign-in and relying party administration",
        contact(name = "xavyo Team"),
    ),
    paths(
        handlers::passive::passive_get,
        handlers::passive::passive_post,
        handlers::metadata::get_metadata,
        handlers::admin::relying_parties::list_relying_parties,
        handlers::admin::relying_parties::create_relying_party,
        handlers::admin::relying_parties::get_relying_party,
        handlers::admin::relying_parties::update_relying_party,
        handlers::admin::relying_parties::delete_relying_party,
        handlers::admin::signing_keys::list_signing_keys,
        handlers::admin::signing_keys::upload_signing_key,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "WS-Federation", description = "Passive requestor endpoint and federation metadata"),
        (name = "WS-Federation Admin", description = "Relying party and signing key management"),
    )
)]
pub struct ApiDoc;

/// Route serving the generated document.
pub fn openapi_routes() -> Router {
    Router::new().route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
}
