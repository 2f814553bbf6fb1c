//! HTTP-level tests for the public WS-Federation router
//!
//! Run with: cargo test -p xavyo-api-wsfed --test http_endpoints

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use tower::ServiceExt;
use xavyo_api_wsfed::{ResponseMode, WsFedConfig, METADATA_PATH};

const SIGNIN_QUERY: &str =
    "/wsfed?wa=wsignin1.0&wtrealm=urn%3Aacme%3Aapp&wreply=https%3A%2F%2Facme.example%2Fcb&wctx=abc123";

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_get_signin_returns_form_post() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let response = harness.app(Some(alice())).oneshot(get(SIGNIN_QUERY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let html = body_string(response).await;
    assert!(html.contains(r#"action="https://acme.example/cb""#));
    assert_eq!(form_field(&html, "wa").as_deref(), Some("wsignin1.0"));
    assert_eq!(form_field(&html, "wctx").as_deref(), Some("abc123"));

    let wresult = form_field(&html, "wresult").unwrap();
    assert_eq!(element_texts(&wresult, "Audience"), vec![REALM]);
    assert_eq!(element_texts(&wresult, "AttributeValue"), vec!["alice"]);
}

#[tokio::test]
async fn test_post_signin_returns_form_post() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let request = Request::builder()
        .method("POST")
        .uri("/wsfed")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "wa=wsignin1.0&wtrealm=urn%3Aacme%3Aapp&wctx=from-post",
        ))
        .unwrap();
    let response = harness.app(Some(alice())).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert_eq!(form_field(&html, "wctx").as_deref(), Some("from-post"));
    assert!(form_field(&html, "wresult").is_some());
}

#[tokio::test]
async fn test_unauthenticated_signin_is_rejected() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let response = harness.app(None).oneshot(get(SIGNIN_QUERY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.claims.calls(), 0);
}

#[tokio::test]
async fn test_unauthenticated_signin_redirects_to_login() {
    let mut config = WsFedConfig::new(ISSUER, ISSUER);
    config.login_url = Some("https://idp.example/login".to_string());
    let harness = Harness::with_config(vec![acme_party(serde_json::json!({}))], config).await;

    let response = harness.app(None).oneshot(get(SIGNIN_QUERY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let location = url::Url::parse(location).unwrap();
    assert_eq!(location.path(), "/login");
    let (_, return_url) = location
        .query_pairs()
        .find(|(k, _)| k == "returnUrl")
        .unwrap();
    assert!(return_url.starts_with("https://idp.example/wsfed?"));
    assert!(return_url.contains("wctx=abc123"));
    assert!(return_url.contains("wtrealm=urn%3Aacme%3Aapp"));
}

#[tokio::test]
async fn test_malformed_request_not_sent_to_login() {
    let mut config = WsFedConfig::new(ISSUER, ISSUER);
    config.login_url = Some("https://idp.example/login".to_string());
    let harness = Harness::with_config(vec![acme_party(serde_json::json!({}))], config).await;

    let response = harness
        .app(None)
        .oneshot(get("/wsfed?wa=wsignin1.0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_realm_and_evil_reply_look_identical() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let unknown = harness
        .app(Some(alice()))
        .oneshot(get("/wsfed?wa=wsignin1.0&wtrealm=urn%3Aother%3Aapp"))
        .await
        .unwrap();
    let evil = harness
        .app(Some(alice()))
        .oneshot(get(
            "/wsfed?wa=wsignin1.0&wtrealm=urn%3Aacme%3Aapp&wreply=https%3A%2F%2Fevil.example%2Fcb",
        ))
        .await
        .unwrap();

    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    assert_eq!(evil.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(unknown).await, body_string(evil).await);
    assert_eq!(harness.keys.signing_calls(), 0);
}

#[tokio::test]
async fn test_bad_action_and_oversized_context() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let response = harness
        .app(Some(alice()))
        .oneshot(get("/wsfed?wa=wattr1.0&wtrealm=urn%3Aacme%3Aapp"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let uri = format!(
        "/wsfed?wa=wsignin1.0&wtrealm=urn%3Aacme%3Aapp&wctx={}",
        "x".repeat(4097)
    );
    let response = harness.app(Some(alice())).oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_no_signing_key_is_service_unavailable() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;
    harness.keys.clear_signing_keys().await;

    let response = harness.app(Some(alice())).oneshot(get(SIGNIN_QUERY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"], "signing_unavailable");
}

#[tokio::test]
async fn test_clock_drives_token_window() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;
    harness.clock.advance(chrono::Duration::hours(1));

    let response = harness.app(Some(alice())).oneshot(get(SIGNIN_QUERY)).await.unwrap();
    let html = body_string(response).await;
    let wresult = form_field(&html, "wresult").unwrap();

    assert_eq!(element_texts(&wresult, "Created"), vec!["2024-06-01T13:00:00Z"]);
    assert_eq!(element_texts(&wresult, "Expires"), vec!["2024-06-01T13:05:00Z"]);
}

#[tokio::test]
async fn test_redirect_mode_falls_back_to_form_for_large_tokens() {
    let mut config = WsFedConfig::new(ISSUER, ISSUER);
    config.response_mode = ResponseMode::RedirectWhenPossible;
    let harness = Harness::with_config(vec![acme_party(serde_json::json!({}))], config).await;

    let response = harness.app(Some(alice())).oneshot(get(SIGNIN_QUERY)).await.unwrap();

    // A signed assertion never fits the reply URL length limit.
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(form_field(&html, "wresult").is_some());
}

#[tokio::test]
async fn test_signout_redirects_to_registered_reply() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let response = harness
        .app(Some(alice()))
        .oneshot(get(
            "/wsfed?wa=wsignout1.0&wtrealm=urn%3Aacme%3Aapp&wreply=https%3A%2F%2Facme.example%2Fcb",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], REPLY);
}

#[tokio::test]
async fn test_signout_without_reply_shows_page() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    for uri in ["/wsfed?wa=wsignout1.0", "/wsfed?wa=wsignoutcleanup1.0&wtrealm=urn%3Aacme%3Aapp"] {
        let response = harness.app(None).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert!(body_string(response).await.contains("signed out"));
    }
}

#[tokio::test]
async fn test_signout_refuses_open_redirect() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let response = harness
        .app(Some(alice()))
        .oneshot(get("/wsfed?wa=wsignout1.0&wreply=https%3A%2F%2Fevil.example%2F"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metadata_document() {
    let harness = Harness::new(vec![acme_party(serde_json::json!({}))]).await;

    let response = harness.app(None).oneshot(get(METADATA_PATH)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml; charset=utf-8"
    );
    let xml = body_string(response).await;
    assert_eq!(attribute_values(&xml, "EntityDescriptor", "entityID"), vec![ISSUER]);
    assert_eq!(
        attribute_values(&xml, "KeyDescriptor", "use"),
        vec!["signing"]
    );
    assert_eq!(element_texts(&xml, "Address"), vec!["https://idp.example/wsfed"]);
    assert_eq!(element_texts(&xml, "X509Certificate").len(), 2);
}
