//! Sign-in response pipeline.
//!
//! Walks a validated [`SignInRequest`] through the stages
//! `ReceivedRequest -> RealmValidated -> ReplyValidated -> ClaimsResolved ->
//! KeyResolved -> TokenBuilt -> ResponseAssembled`. Every failure is terminal
//! and nothing is retried. Reply validation happens before any claims or key
//! collaborator is called.

use crate::error::{WsFedError, WsFedResult};
use crate::models::{Principal, SecurityToken, SignInRequest, SignInResponse};
use crate::services::claims_resolver::ClaimsResolver;
use crate::services::key_provider::{KeyMaterialError, KeyMaterialProvider};
use crate::services::registry::RelyingPartyRegistry;
use crate::services::reply_url::resolve_reply;
use crate::services::token_builder::{TokenBuilder, TokenRequest};
use crate::wsfed::encryption::EncryptingCertificate;
use crate::wsfed::protocol::{
    ENCODING_BASE64, KEY_TYPE_BEARER, NS_WSSE, NS_WSU, NS_WS_ADDRESSING, NS_WS_POLICY,
    NS_WS_TRUST, REQUEST_TYPE_ISSUE, TOKEN_TYPE_JWT,
};
use crate::wsfed::xml::{format_instant, xml_escape};
use crate::wsfed::{
    apply_claim_mapping, name_identifier, token_type_uri, DigestAlgorithm, SignatureAlgorithm,
    WsFedAction,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use xavyo_db::models::{ClaimMapping, ClaimPolicy, RelyingParty, TokenType};

/// Default allowance subtracted from `notBefore`.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 120;

/// Pipeline stage, used in logs and to tag collaborator failures.
///
/// A failed collaborator call is tagged with the state it was meant to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignInState {
    ReceivedRequest,
    RealmValidated,
    ReplyValidated,
    ClaimsResolved,
    KeyResolved,
    TokenBuilt,
    ResponseAssembled,
}

impl SignInState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceivedRequest => "received_request",
            Self::RealmValidated => "realm_validated",
            Self::ReplyValidated => "reply_validated",
            Self::ClaimsResolved => "claims_resolved",
            Self::KeyResolved => "key_resolved",
            Self::TokenBuilt => "token_built",
            Self::ResponseAssembled => "response_assembled",
        }
    }
}

impl fmt::Display for SignInState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuance settings of one relying party, parsed from its stored record.
struct IssuanceProfile {
    token_type: TokenType,
    signature_algorithm: SignatureAlgorithm,
    digest_algorithm: DigestAlgorithm,
    lifetime: Duration,
    mapping: ClaimMapping,
    policy: ClaimPolicy,
}

impl IssuanceProfile {
    fn from_party(rp: &RelyingParty) -> WsFedResult<Self> {
        let token_type = rp
            .token_type()
            .ok_or_else(|| WsFedError::UnsupportedTokenType(rp.token_type.clone()))?;
        let signature_algorithm = SignatureAlgorithm::parse(&rp.signature_algorithm)?;
        let digest_algorithm = DigestAlgorithm::parse(&rp.digest_algorithm)?;
        if rp.token_lifetime_seconds <= 0 {
            return Err(WsFedError::InvalidConfiguration(format!(
                "Token lifetime for {} must be positive",
                rp.realm
            )));
        }
        let mapping = rp.claim_mapping().map_err(|e| {
            WsFedError::InvalidConfiguration(format!("Claim mapping for {}: {e}", rp.realm))
        })?;
        let policy = rp.claim_policy().ok_or_else(|| {
            WsFedError::InvalidConfiguration(format!(
                "Unknown claim policy for {}: {}",
                rp.realm, rp.claim_policy
            ))
        })?;

        Ok(Self {
            token_type,
            signature_algorithm,
            digest_algorithm,
            lifetime: rp.token_lifetime(),
            mapping,
            policy,
        })
    }
}

/// Orchestrates registry, claims, key material and token construction.
pub struct SignInResponseGenerator {
    issuer: String,
    clock_skew: Duration,
    registry: Arc<dyn RelyingPartyRegistry>,
    claims_resolver: Arc<dyn ClaimsResolver>,
    key_provider: Arc<dyn KeyMaterialProvider>,
    token_builder: TokenBuilder,
}

impl SignInResponseGenerator {
    pub fn new(
        issuer: impl Into<String>,
        clock_skew: Duration,
        registry: Arc<dyn RelyingPartyRegistry>,
        claims_resolver: Arc<dyn ClaimsResolver>,
        key_provider: Arc<dyn KeyMaterialProvider>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            clock_skew,
            registry,
            claims_resolver,
            key_provider,
            token_builder: TokenBuilder::new(),
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn RelyingPartyRegistry> {
        &self.registry
    }

    /// Produce the sign-in response for an authenticated principal.
    pub async fn generate(
        &self,
        request: &SignInRequest,
        principal: &Principal,
    ) -> WsFedResult<SignInResponse> {
        let now = request.current_time;
        let realm = request.realm.trim();
        transition(SignInState::ReceivedRequest, realm);

        let rp = self.registry.find_by_realm(realm).await?;
        transition(SignInState::RealmValidated, realm);

        let reply_url = resolve_reply(
            &rp,
            request.reply.as_deref(),
            self.registry.default_reply_url(),
        )?;
        transition(SignInState::ReplyValidated, realm);

        let profile = IssuanceProfile::from_party(&rp)?;

        let resolved = self
            .claims_resolver
            .resolve(principal, &rp.realm)
            .await
            .map_err(WsFedError::ClaimsResolutionFailed)?;
        let claims = apply_claim_mapping(&resolved, &profile.mapping, profile.policy);
        transition(SignInState::ClaimsResolved, realm);

        let signing_key = self
            .key_provider
            .current_signing_key(now)
            .await
            .map_err(|e| WsFedError::collaborator(SignInState::KeyResolved, e))?
            .ok_or(WsFedError::SigningKeyUnavailable { at: now })?;
        let encrypting_key = self.resolve_encrypting_key(&rp, now).await?;
        transition(SignInState::KeyResolved, realm);

        let subject = name_identifier(&claims, &principal.subject);
        let token = self.token_builder.build(
            &TokenRequest {
                issuer: &self.issuer,
                audience: &rp.realm,
                subject,
                claims: &claims,
                authentication_method: &principal.authentication_method,
                authenticated_at: principal.authenticated_at,
                issued_at: now,
                not_before: now - self.clock_skew,
                not_on_or_after: now + profile.lifetime,
                token_type: profile.token_type,
                signature_algorithm: profile.signature_algorithm,
                digest_algorithm: profile.digest_algorithm,
            },
            &signing_key,
            encrypting_key.as_ref(),
        )?;
        transition(SignInState::TokenBuilt, realm);

        let result = request_security_token_response(&token, now);

        tracing::info!(
            state = %SignInState::ResponseAssembled,
            realm = %rp.realm,
            subject = %token.subject,
            token_id = %token.token_id,
            token_type = %profile.token_type.as_str(),
            key_id = %token.signing_key_id,
            encrypted = token.encrypted,
            "WS-Federation sign-in response assembled"
        );

        Ok(SignInResponse {
            action: WsFedAction::SignIn,
            result,
            context: request.context.clone(),
            reply_url,
            token,
        })
    }

    /// The party's encrypting certificate, if it requires encryption.
    ///
    /// A party with a configured certificate that cannot be resolved, or
    /// whose certificate is outside its validity window, gets no token.
    async fn resolve_encrypting_key(
        &self,
        rp: &RelyingParty,
        now: DateTime<Utc>,
    ) -> WsFedResult<Option<EncryptingCertificate>> {
        let configured = rp
            .encrypting_certificate
            .as_deref()
            .is_some_and(|pem| !pem.trim().is_empty());

        let certificate = match self.key_provider.encrypting_key_for(rp).await {
            Ok(cert) => cert,
            Err(KeyMaterialError::InvalidKey(reason)) => {
                tracing::error!(realm = %rp.realm, reason = %reason, "Encrypting certificate unusable");
                return Err(WsFedError::EncryptingKeyUnavailable(rp.realm.clone()));
            }
            Err(e) => return Err(WsFedError::collaborator(SignInState::KeyResolved, e)),
        };

        match certificate {
            Some(cert) if cert.is_valid_at(now)? => Ok(Some(cert)),
            Some(_) => {
                tracing::error!(realm = %rp.realm, at = %now, "Encrypting certificate outside its validity window");
                Err(WsFedError::EncryptingKeyUnavailable(rp.realm.clone()))
            }
            None if configured => Err(WsFedError::EncryptingKeyUnavailable(rp.realm.clone())),
            None => Ok(None),
        }
    }
}

fn transition(state: SignInState, realm: &str) {
    tracing::debug!(state = %state, realm = %realm, "Sign-in state transition");
}

/// Serialize the WS-Trust `RequestSecurityTokenResponse` carried in `wresult`.
fn request_security_token_response(token: &SecurityToken, created: DateTime<Utc>) -> String {
    let requested_token = match token.token_type {
        TokenType::Jwt => format!(
            r#"<wsse:BinarySecurityToken xmlns:wsse="{NS_WSSE}" ValueType="{TOKEN_TYPE_JWT}" EncodingType="{ENCODING_BASE64}">{}</wsse:BinarySecurityToken>"#,
            STANDARD.encode(token.serialized.as_bytes())
        ),
        TokenType::Saml11 | TokenType::Saml20 => token.serialized.clone(),
    };

    let mut xml = String::new();
    xml.push_str(&format!(
        r#"<t:RequestSecurityTokenResponse xmlns:t="{NS_WS_TRUST}">"#
    ));
    xml.push_str(&format!(
        r#"<t:Lifetime><wsu:Created xmlns:wsu="{NS_WSU}">{}</wsu:Created><wsu:Expires xmlns:wsu="{NS_WSU}">{}</wsu:Expires></t:Lifetime>"#,
        format_instant(created),
        format_instant(token.not_on_or_after)
    ));
    xml.push_str(&format!(
        r#"<wsp:AppliesTo xmlns:wsp="{NS_WS_POLICY}"><wsa:EndpointReference xmlns:wsa="{NS_WS_ADDRESSING}"><wsa:Address>{}</wsa:Address></wsa:EndpointReference></wsp:AppliesTo>"#,
        xml_escape(&token.audience)
    ));
    xml.push_str("<t:RequestedSecurityToken>");
    xml.push_str(&requested_token);
    xml.push_str("</t:RequestedSecurityToken>");
    xml.push_str(&format!(
        "<t:TokenType>{}</t:TokenType>",
        token_type_uri(token.token_type)
    ));
    xml.push_str(&format!("<t:RequestType>{REQUEST_TYPE_ISSUE}</t:RequestType>"));
    xml.push_str(&format!("<t:KeyType>{KEY_TYPE_BEARER}</t:KeyType>"));
    xml.push_str("</t:RequestSecurityTokenResponse>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WsFedErrorKind;
    use crate::services::claims_resolver::{ClaimsResolutionError, InMemoryClaimsResolver};
    use crate::services::key_provider::{InMemoryKeyMaterialProvider, SigningKey};
    use crate::services::registry::InMemoryRelyingPartyRegistry;
    use crate::wsfed::claims::CLAIM_TYPE_NAME;
    use crate::wsfed::signing::test_support::{credentials, generate_pem};
    use crate::wsfed::Claim;
    use chrono::TimeZone;
    use xavyo_db::models::CreateRelyingPartyRequest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn party(overrides: serde_json::Value) -> RelyingParty {
        let mut body = serde_json::json!({
            "realm": "urn:acme:app",
            "name": "Acme",
            "reply_urls": ["https://acme.example/cb"],
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

    struct Fixture {
        generator: SignInResponseGenerator,
        claims: Arc<InMemoryClaimsResolver>,
        keys: Arc<InMemoryKeyMaterialProvider>,
    }

    async fn fixture(rp: RelyingParty) -> Fixture {
        let registry = Arc::new(InMemoryRelyingPartyRegistry::with_parties(vec![rp], None).unwrap());
        let claims = Arc::new(InMemoryClaimsResolver::new());
        let keys = Arc::new(InMemoryKeyMaterialProvider::with_keys(vec![
            SigningKey::from_credentials(credentials("idp")).unwrap(),
        ]));
        claims
            .set_claims("alice", vec![Claim::new(CLAIM_TYPE_NAME, "alice")])
            .await;
        let generator = SignInResponseGenerator::new(
            "https://idp.example",
            Duration::seconds(DEFAULT_CLOCK_SKEW_SECONDS),
            registry,
            claims.clone(),
            keys.clone(),
        );
        Fixture {
            generator,
            claims,
            keys,
        }
    }

    fn alice() -> Principal {
        Principal::new("alice", now() - Duration::minutes(1))
    }

    #[tokio::test]
    async fn test_generates_bound_response() {
        let fx = fixture(party(serde_json::json!({}))).await;

        let request = SignInRequest::new("urn:acme:app", now())
            .with_reply("https://acme.example/cb")
            .with_context("abc123");
        let response = fx.generator.generate(&request, &alice()).await.unwrap();

        assert_eq!(response.action, WsFedAction::SignIn);
        assert_eq!(response.context.as_deref(), Some("abc123"));
        assert_eq!(response.reply_url, "https://acme.example/cb");
        assert_eq!(response.token.audience, "urn:acme:app");
        assert_eq!(response.token.issuer, "https://idp.example");
        assert!(response
            .token
            .claims
            .contains(&Claim::new(CLAIM_TYPE_NAME, "alice")));
        assert_eq!(response.token.not_before, now() - Duration::seconds(120));
        assert_eq!(response.token.not_on_or_after, now() + Duration::seconds(300));

        assert!(response.result.starts_with("<t:RequestSecurityTokenResponse"));
        assert!(response
            .result
            .contains("<wsa:Address>urn:acme:app</wsa:Address>"));
        assert!(response.result.contains("<wsu:Expires xmlns:wsu=\""));
        assert!(response.result.contains("2024-06-01T12:05:00Z</wsu:Expires>"));
    }

    #[tokio::test]
    async fn test_evil_reply_fails_before_collaborators() {
        let fx = fixture(party(serde_json::json!({}))).await;
        let request =
            SignInRequest::new("urn:acme:app", now()).with_reply("https://evil.example/cb");

        let err = fx.generator.generate(&request, &alice()).await.unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::InvalidReplyUrl);
        assert_eq!(fx.claims.calls(), 0);
        assert_eq!(fx.keys.signing_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_realm() {
        let fx = fixture(party(serde_json::json!({}))).await;
        let request = SignInRequest::new("urn:unknown:app", now());
        let err = fx.generator.generate(&request, &alice()).await.unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::UnknownRelyingParty);
    }

    #[tokio::test]
    async fn test_missing_reply_uses_default() {
        let fx = fixture(party(serde_json::json!({}))).await;
        let request = SignInRequest::new("urn:acme:app", now());
        let response = fx.generator.generate(&request, &alice()).await.unwrap();
        assert_eq!(response.reply_url, "https://acme.example/cb");
        assert!(response.context.is_none());
    }

    #[tokio::test]
    async fn test_no_valid_signing_key() {
        let fx = fixture(party(serde_json::json!({}))).await;
        fx.keys.clear_signing_keys().await;
        let request = SignInRequest::new("urn:acme:app", now());
        let err = fx.generator.generate(&request, &alice()).await.unwrap_err();
        match err {
            WsFedError::SigningKeyUnavailable { at } => assert_eq!(at, now()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct KeyStoreDown;

    #[async_trait::async_trait]
    impl KeyMaterialProvider for KeyStoreDown {
        async fn current_signing_key(
            &self,
            _at: DateTime<Utc>,
        ) -> Result<Option<SigningKey>, KeyMaterialError> {
            Err(KeyMaterialError::Storage(xavyo_db::DbError::NotFound(
                "idp_signing_keys".to_string(),
            )))
        }

        async fn encrypting_key_for(
            &self,
            _relying_party: &RelyingParty,
        ) -> Result<Option<EncryptingCertificate>, KeyMaterialError> {
            Ok(None)
        }

        async fn published_signing_keys(
            &self,
            _at: DateTime<Utc>,
        ) -> Result<Vec<crate::services::key_provider::PublishedKey>, KeyMaterialError> {
            Ok(Vec::new())
        }

        async fn material_version(&self) -> Result<u64, KeyMaterialError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_key_store_failure_tagged_with_key_stage() {
        let rp = party(serde_json::json!({}));
        let registry = Arc::new(InMemoryRelyingPartyRegistry::with_parties(vec![rp], None).unwrap());
        let claims = Arc::new(InMemoryClaimsResolver::new());
        claims
            .set_claims("alice", vec![Claim::new(CLAIM_TYPE_NAME, "alice")])
            .await;
        let generator = SignInResponseGenerator::new(
            "https://idp.example",
            Duration::seconds(DEFAULT_CLOCK_SKEW_SECONDS),
            registry,
            claims,
            Arc::new(KeyStoreDown),
        );

        let request = SignInRequest::new("urn:acme:app", now());
        let err = generator.generate(&request, &alice()).await.unwrap_err();
        match err {
            WsFedError::CollaboratorFailed { stage, message } => {
                assert_eq!(stage, SignInState::KeyResolved);
                assert!(message.contains("idp_signing_keys"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claims_failure_is_reported() {
        let fx = fixture(party(serde_json::json!({}))).await;
        fx.claims
            .fail_with(ClaimsResolutionError::Unavailable("directory down".into()))
            .await;
        let request = SignInRequest::new("urn:acme:app", now());
        let err = fx.generator.generate(&request, &alice()).await.unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::ClaimsResolutionFailed);
        assert_eq!(fx.keys.signing_calls(), 0);
    }

    #[tokio::test]
    async fn test_claim_mapping_applied() {
        let fx = fixture(party(serde_json::json!({
            "claim_mapping": { CLAIM_TYPE_NAME: "upn", "department": null },
        })))
        .await;
        fx.claims
            .set_claims(
                "alice",
                vec![
                    Claim::new(CLAIM_TYPE_NAME, "alice"),
                    Claim::new("department", "R&D"),
                ],
            )
            .await;
        let request = SignInRequest::new("urn:acme:app", now());
        let response = fx.generator.generate(&request, &alice()).await.unwrap();
        assert_eq!(response.token.claims, vec![Claim::new("upn", "alice")]);
    }

    #[tokio::test]
    async fn test_expired_encrypting_certificate() {
        let (expired, _) = generate_pem("rp", 1_600_000_000, 1);
        let fx = fixture(party(serde_json::json!({
            "encrypting_certificate": expired,
        })))
        .await;
        let request = SignInRequest::new("urn:acme:app", now());
        let err = fx.generator.generate(&request, &alice()).await.unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::EncryptingKeyUnavailable);
    }

    #[tokio::test]
    async fn test_jwt_carried_as_binary_security_token() {
        let fx = fixture(party(serde_json::json!({ "token_type": "jwt" }))).await;
        let request = SignInRequest::new("urn:acme:app", now());
        let response = fx.generator.generate(&request, &alice()).await.unwrap();
        assert!(response.result.contains("<wsse:BinarySecurityToken"));
        assert!(response
            .result
            .contains(&STANDARD.encode(response.token.serialized.as_bytes())));
        assert!(response
            .result
            .contains("<t:TokenType>urn:ietf:params:oauth:token-type:jwt</t:TokenType>"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SignInState::ReceivedRequest.to_string(), "received_request");
        assert_eq!(
            SignInState::ResponseAssembled.to_string(),
            "response_assembled"
        );
    }
}
