//! Relying party admin handlers

use crate::error::WsFedResult;
use crate::models::{PaginationQuery, RelyingPartyListResponse, RelyingPartyResponse};
use crate::router::WsFedAdminState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use xavyo_core::RelyingPartyId;
use xavyo_db::models::{CreateRelyingPartyRequest, UpdateRelyingPartyRequest};

/// List relying parties
#[utoipa::path(
    get,
    path = "/admin/wsfed/relying-parties",
    params(PaginationQuery),
    responses(
        (status = 200, description = "List of relying parties", body = RelyingPartyListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn list_relying_parties(
    State(state): State<WsFedAdminState>,
    Query(query): Query<PaginationQuery>,
) -> impl IntoResponse {
    match list_relying_parties_inner(&state, query).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_relying_parties_inner(
    state: &WsFedAdminState,
    query: PaginationQuery,
) -> WsFedResult<RelyingPartyListResponse> {
    let (parties, total) = state
        .relying_parties
        .list(query.limit, query.offset, query.enabled)
        .await?;

    Ok(RelyingPartyListResponse {
        items: parties.into_iter().map(RelyingPartyResponse::from).collect(),
        total,
        limit: query.limit,
        offset: query.offset,
    })
}

/// Register a relying party
#[utoipa::path(
    post,
    path = "/admin/wsfed/relying-parties",
    request_body = CreateRelyingPartyRequest,
    responses(
        (status = 201, description = "Relying party created", body = RelyingPartyResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Realm already registered"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn create_relying_party(
    State(state): State<WsFedAdminState>,
    Json(req): Json<CreateRelyingPartyRequest>,
) -> impl IntoResponse {
    match state.relying_parties.create(req).await {
        Ok(rp) => (StatusCode::CREATED, Json(RelyingPartyResponse::from(rp))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a relying party
#[utoipa::path(
    get,
    path = "/admin/wsfed/relying-parties/{id}",
    params(
        ("id" = uuid::Uuid, Path, description = "Relying party ID"),
    ),
    responses(
        (status = 200, description = "Relying party details", body = RelyingPartyResponse),
        (status = 404, description = "Relying party not found"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn get_relying_party(
    State(state): State<WsFedAdminState>,
    Path(id): Path<RelyingPartyId>,
) -> impl IntoResponse {
    match state.relying_parties.get(id).await {
        Ok(rp) => (StatusCode::OK, Json(RelyingPartyResponse::from(rp))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Update a relying party
#[utoipa::path(
    put,
    path = "/admin/wsfed/relying-parties/{id}",
    params(
        ("id" = uuid::Uuid, Path, description = "Relying party ID"),
    ),
    request_body = UpdateRelyingPartyRequest,
    responses(
        (status = 200, description = "Relying party updated", body = RelyingPartyResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Relying party not found"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn update_relying_party(
    State(state): State<WsFedAdminState>,
    Path(id): Path<RelyingPartyId>,
    Json(req): Json<UpdateRelyingPartyRequest>,
) -> impl IntoResponse {
    match state.relying_parties.update(id, req).await {
        Ok(rp) => (StatusCode::OK, Json(RelyingPartyResponse::from(rp))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete a relying party
#[utoipa::path(
    delete,
    path = "/admin/wsfed/relying-parties/{id}",
    params(
        ("id" = uuid::Uuid, Path, description = "Relying party ID"),
    ),
    responses(
        (status = 204, description = "Relying party deleted"),
        (status = 404, description = "Relying party not found"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "WS-Federation Admin"
)]
pub async fn delete_relying_party(
    State(state): State<WsFedAdminState>,
    Path(id): Path<RelyingPartyId>,
) -> impl IntoResponse {
    match state.relying_parties.delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
