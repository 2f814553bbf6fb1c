//! Passive requestor endpoint (`/wsfed`), GET and POST bindings

use crate::error::{WsFedError, WsFedResult};
use crate::models::{signed_out_page, Principal, SignInResponse, WsFedParams};
use crate::router::{ResponseMode, WsFedState};
use crate::services::SignOutOutcome;
use crate::wsfed::WsFedAction;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension, Form,
};
use url::Url;

/// WS-Federation passive request via query string
#[utoipa::path(
    get,
    path = "/wsfed",
    params(WsFedParams),
    responses(
        (status = 200, description = "Auto-submitting sign-in response form, or signed-out page"),
        (status = 302, description = "Redirect to reply URL or login page"),
        (status = 400, description = "Invalid sign-in request"),
        (status = 401, description = "Not authenticated"),
        (status = 503, description = "No signing key available"),
    ),
    tag = "WS-Federation"
)]
pub async fn passive_get(
    State(state): State<WsFedState>,
    Extension(principal): Extension<Option<Principal>>,
    Query(params): Query<WsFedParams>,
) -> Response {
    match handle_passive(&state, principal, params).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// WS-Federation passive request via form POST
#[utoipa::path(
    post,
    path = "/wsfed",
    request_body(content = WsFedParams, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Auto-submitting sign-in response form, or signed-out page"),
        (status = 302, description = "Redirect to reply URL or login page"),
        (status = 400, description = "Invalid sign-in request"),
        (status = 401, description = "Not authenticated"),
        (status = 503, description = "No signing key available"),
    ),
    tag = "WS-Federation"
)]
pub async fn passive_post(
    State(state): State<WsFedState>,
    Extension(principal): Extension<Option<Principal>>,
    Form(params): Form<WsFedParams>,
) -> Response {
    match handle_passive(&state, principal, params).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn handle_passive(
    state: &WsFedState,
    principal: Option<Principal>,
    params: WsFedParams,
) -> WsFedResult<Response> {
    match params.action()? {
        WsFedAction::SignIn => handle_signin(state, principal, params).await,
        WsFedAction::SignOut | WsFedAction::SignOutCleanup => {
            let request = params.into_signout_request()?;
            match state.signout.sign_out(&request).await? {
                SignOutOutcome::Redirect(url) => Ok(found(&url)),
                SignOutOutcome::SignedOutPage => Ok(no_store(Html(signed_out_page()))),
            }
        }
    }
}

async fn handle_signin(
    state: &WsFedState,
    principal: Option<Principal>,
    params: WsFedParams,
) -> WsFedResult<Response> {
    let Some(principal) = principal else {
        return login_redirect(state, &params);
    };

    let request = params.into_signin_request(state.clock.now())?;
    let response = state.generator.generate(&request, &principal).await?;
    deliver(state.config.response_mode, &response)
}

/// Send an unauthenticated browser to the login page, returning here after.
fn login_redirect(state: &WsFedState, params: &WsFedParams) -> WsFedResult<Response> {
    // Reject malformed requests before bouncing through login.
    params.clone().into_signin_request(state.clock.now())?;

    let Some(login_url) = state.config.login_url.as_deref() else {
        return Err(WsFedError::NotAuthenticated);
    };

    let return_url = format!(
        "{}?{}",
        state.config.passive_endpoint(),
        params.to_query_string()?
    );
    let mut url = Url::parse(login_url)
        .map_err(|e| WsFedError::Internal(format!("Invalid login URL: {e}")))?;
    url.query_pairs_mut().append_pair("returnUrl", &return_url);

    tracing::debug!(realm = ?params.wtrealm, "Redirecting unauthenticated sign-in to login");
    Ok(found(url.as_str()))
}

fn deliver(mode: ResponseMode, response: &SignInResponse) -> WsFedResult<Response> {
    if mode == ResponseMode::RedirectWhenPossible {
        if let Some(url) = response.to_redirect_url()? {
            return Ok(found(&url));
        }
    }
    Ok(no_store(Html(response.to_form_post())))
}

fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}

fn no_store(body: impl IntoResponse) -> Response {
    ([(header::CACHE_CONTROL, "no-store")], body).into_response()
}
