//! Common test utilities for xavyo-api-wsfed integration tests.
//!
//! Throwaway RSA keys and self-signed certificates are generated with
//! `openssl`; nothing here touches a database.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Response;
use axum::{Extension, Router};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::{Arc, Once};
use xavyo_api_wsfed::wsfed::claims::CLAIM_TYPE_NAME;
use xavyo_api_wsfed::wsfed::{Claim, SigningCredentials};
use xavyo_api_wsfed::{
    wsfed_public_router, InMemoryClaimsResolver, InMemoryKeyMaterialProvider,
    InMemoryRelyingPartyRegistry, Principal, SigningKey, WsFedConfig, WsFedState,
};
use xavyo_core::FixedClock;
use xavyo_db::models::{CreateRelyingPartyRequest, RelyingParty};

static INIT: Once = Once::new();

pub const ISSUER: &str = "https://idp.example";
pub const REALM: &str = "urn:acme:app";
pub const REPLY: &str = "https://acme.example/cb";

/// Route `tracing` output through the test harness writer.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("xavyo_api_wsfed=debug")
            .with_test_writer()
            .try_init();
    });
}

/// 2024-06-01T12:00:00Z, the instant every harness clock starts at.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Self-signed certificate and PKCS#8 key PEMs valid from `from` (unix
/// seconds) for `days`.
pub fn generate_pem(cn: &str, from: i64, days: u32) -> (String, String) {
    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(from).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(from + i64::from(days) * 86_400).unwrap())
        .unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();

    (
        String::from_utf8(builder.build().to_pem().unwrap()).unwrap(),
        String::from_utf8(pkey.private_key_to_pem_pkcs8().unwrap()).unwrap(),
    )
}

/// Signing key valid from 2024-01-01 for `days`.
pub fn signing_key(cn: &str, days: u32) -> SigningKey {
    signing_key_from(cn, 1_704_067_200, days)
}

pub fn signing_key_from(cn: &str, from: i64, days: u32) -> SigningKey {
    let (cert, key) = generate_pem(cn, from, days);
    SigningKey::from_credentials(SigningCredentials::from_pem(&cert, &key).unwrap()).unwrap()
}

/// The `urn:acme:app` party with `overrides` merged into its JSON form.
pub fn acme_party(overrides: serde_json::Value) -> RelyingParty {
    party(REALM, overrides)
}

pub fn party(realm: &str, overrides: serde_json::Value) -> RelyingParty {
    let mut body = serde_json::json!({
        "realm": realm,
        "name": "Acme",
        "reply_urls": [REPLY],
        "token_lifetime_seconds": 300,
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    let req: CreateRelyingPartyRequest = serde_json::from_value(body).unwrap();
    RelyingParty::from_draft(req.into_draft(), now())
}

pub fn alice() -> Principal {
    Principal::new("alice", now() - chrono::Duration::minutes(2)).with_email("alice@acme.example")
}

/// In-memory collaborators plus the state wired from them.
pub struct Harness {
    pub state: WsFedState,
    pub registry: Arc<InMemoryRelyingPartyRegistry>,
    pub claims: Arc<InMemoryClaimsResolver>,
    pub keys: Arc<InMemoryKeyMaterialProvider>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub async fn new(parties: Vec<RelyingParty>) -> Self {
        Self::with_config(parties, WsFedConfig::new(ISSUER, ISSUER)).await
    }

    pub async fn with_config(parties: Vec<RelyingParty>, config: WsFedConfig) -> Self {
        init_test_logging();
        let registry = Arc::new(
            InMemoryRelyingPartyRegistry::with_parties(parties, config.default_reply_url.clone())
                .unwrap(),
        );
        let claims = Arc::new(InMemoryClaimsResolver::new());
        claims
            .set_claims("alice", vec![Claim::new(CLAIM_TYPE_NAME, "alice")])
            .await;
        let keys = Arc::new(InMemoryKeyMaterialProvider::with_keys(vec![signing_key(
            "idp", 365,
        )]));
        let clock = Arc::new(FixedClock::new(now()));

        let state = WsFedState::new(
            config,
            clock.clone(),
            registry.clone(),
            claims.clone(),
            keys.clone(),
        );
        Self {
            state,
            registry,
            claims,
            keys,
            clock,
        }
    }

    /// Public router with `principal` injected the way a host would.
    pub fn app(&self, principal: Option<Principal>) -> Router {
        wsfed_public_router(self.state.clone()).layer(Extension(principal))
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Text content of every element with local name `local`.
pub fn element_texts(xml: &str, local: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = 0usize;
    let mut texts = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) if e.local_name().as_ref() == local.as_bytes() => {
                inside += 1;
                texts.push(String::new());
            }
            Event::End(e) if e.local_name().as_ref() == local.as_bytes() => {
                inside = inside.saturating_sub(1);
            }
            Event::Text(t) if inside > 0 => {
                if let Some(last) = texts.last_mut() {
                    last.push_str(&t.unescape().unwrap());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    texts
}

/// Values of attribute `attr` on every element with local name `local`.
pub fn attribute_values(xml: &str, local: &str, attr: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut values = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == local.as_bytes() => {
                for a in e.attributes() {
                    let a = a.unwrap();
                    if a.key.local_name().as_ref() == attr.as_bytes() {
                        values.push(a.unescape_value().unwrap().into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    values
}

/// Extract the value of a hidden form input from an auto-submit page.
pub fn form_field(html: &str, name: &str) -> Option<String> {
    let marker = format!(r#"name="{name}" value=""#);
    let start = html.find(&marker)? + marker.len();
    let end = html[start..].find('"')? + start;
    Some(
        html[start..end]
            .replace("&quot;", "\"")
            .replace("&#x27;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}
