//! Relying party administration: validation and CRUD.

use crate::error::{WsFedError, WsFedResult};
use crate::services::reply_url::is_valid_wildcard_prefix;
use crate::wsfed::encryption::EncryptingCertificate;
use crate::wsfed::protocol::MAX_REALM_LENGTH;
use crate::wsfed::signing::{DigestAlgorithm, SignatureAlgorithm};
use sqlx::PgPool;
use xavyo_core::RelyingPartyId;
use xavyo_db::models::{
    ClaimMapping, ClaimPolicy, CreateRelyingPartyRequest, RelyingParty, RelyingPartyDraft,
    TokenType, UpdateRelyingPartyRequest, REPLY_URL_WILDCARD,
};
use xavyo_db::{
    ClientConfigurationStore, DbError, PgConfigurationStore, RelyingPartyConfigurationStore,
};

pub const MAX_REPLY_URLS: usize = 20;
pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_TOKEN_LIFETIME_SECONDS: i32 = 86_400;

/// Check every relying-party invariant on a draft.
///
/// `registry_default` is the deployment-wide reply fallback; with one
/// configured a party may omit reply URLs.
pub fn validate_draft(draft: &RelyingPartyDraft, registry_default: Option<&str>) -> WsFedResult<()> {
    let invalid = |msg: String| Err(WsFedError::ValidationFailed(msg));

    if draft.realm.is_empty() {
        return invalid("realm must not be empty".to_string());
    }
    if draft.realm.trim() != draft.realm {
        return invalid("realm must not have surrounding whitespace".to_string());
    }
    if draft.realm.len() > MAX_REALM_LENGTH {
        return invalid(format!("realm too long (max {MAX_REALM_LENGTH} bytes)"));
    }
    if draft.name.trim().is_empty() {
        return invalid("name must not be empty".to_string());
    }
    if draft.name.len() > MAX_NAME_LENGTH {
        return invalid(format!("name too long (max {MAX_NAME_LENGTH} bytes)"));
    }

    if draft.reply_urls.len() > MAX_REPLY_URLS {
        return invalid(format!("Too many reply URLs (max {MAX_REPLY_URLS})"));
    }
    if draft.reply_urls.is_empty() && registry_default.is_none() {
        return invalid("At least one reply URL is required".to_string());
    }
    for entry in &draft.reply_urls {
        validate_reply_entry(entry)?;
    }
    if let Some(default) = draft.default_reply_url.as_deref().filter(|d| !d.is_empty()) {
        if default.ends_with(REPLY_URL_WILDCARD) {
            return invalid("default_reply_url cannot be a wildcard".to_string());
        }
        validate_reply_entry(default)?;
    }

    let token_type = TokenType::parse(&draft.token_type)
        .ok_or_else(|| WsFedError::ValidationFailed(format!("Unknown token type: {}", draft.token_type)))?;
    let signature_algorithm = SignatureAlgorithm::parse(&draft.signature_algorithm)
        .map_err(|e| WsFedError::ValidationFailed(e.to_string()))?;
    DigestAlgorithm::parse(&draft.digest_algorithm)
        .map_err(|e| WsFedError::ValidationFailed(e.to_string()))?;
    if token_type == TokenType::Jwt {
        signature_algorithm
            .jwt_algorithm()
            .map_err(|e| WsFedError::ValidationFailed(e.to_string()))?;
    }

    if !(1..=MAX_TOKEN_LIFETIME_SECONDS).contains(&draft.token_lifetime_seconds) {
        return invalid(format!(
            "token_lifetime_seconds must be between 1 and {MAX_TOKEN_LIFETIME_SECONDS}"
        ));
    }

    ClaimMapping::from_value(&draft.claim_mapping)
        .map_err(|e| WsFedError::ValidationFailed(format!("Invalid claim mapping: {e}")))?;
    ClaimPolicy::parse(&draft.claim_policy).ok_or_else(|| {
        WsFedError::ValidationFailed(format!("Unknown claim policy: {}", draft.claim_policy))
    })?;

    if let Some(pem) = draft.encrypting_certificate.as_deref().filter(|p| !p.trim().is_empty()) {
        EncryptingCertificate::from_pem(pem)
            .map_err(|e| WsFedError::ValidationFailed(e.to_string()))?;
    }

    Ok(())
}

fn validate_reply_entry(entry: &str) -> WsFedResult<()> {
    let target = match entry.strip_suffix(REPLY_URL_WILDCARD) {
        Some(prefix) => {
            if !is_valid_wildcard_prefix(prefix) {
                return Err(WsFedError::ValidationFailed(format!(
                    "Wildcard reply URL must be an absolute URL with a path before '*': {entry}"
                )));
            }
            prefix
        }
        None => entry,
    };

    let parsed = url::Url::parse(target)
        .map_err(|_| WsFedError::ValidationFailed(format!("Invalid reply URL: {entry}")))?;
    let is_localhost = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match parsed.scheme() {
        "https" => {}
        "http" if is_localhost => {}
        _ => {
            return Err(WsFedError::ValidationFailed(format!(
                "Reply URL must use HTTPS: {entry}"
            )))
        }
    }
    if parsed.host_str().is_none() || !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(WsFedError::ValidationFailed(format!(
            "Reply URL must have a host and no credentials: {entry}"
        )));
    }
    if parsed.fragment().is_some() {
        return Err(WsFedError::ValidationFailed(format!(
            "Reply URL must not contain a fragment: {entry}"
        )));
    }
    Ok(())
}

/// Service for relying party CRUD operations
pub struct RelyingPartyService {
    pool: PgPool,
    store: PgConfigurationStore,
    registry_default_reply: Option<String>,
}

impl RelyingPartyService {
    #[must_use]
    pub fn new(pool: PgPool, registry_default_reply: Option<String>) -> Self {
        Self {
            store: PgConfigurationStore::new(pool.clone()),
            pool,
            registry_default_reply,
        }
    }

    pub async fn get(&self, id: RelyingPartyId) -> WsFedResult<RelyingParty> {
        RelyingParty::find_by_id(&self.pool, *id.as_uuid())
            .await
            .map_err(DbError::from_query)?
            .ok_or_else(|| WsFedError::RelyingPartyNotFound(id.to_string()))
    }

    pub async fn list(
        &self,
        limit: i32,
        offset: i32,
        enabled: Option<bool>,
    ) -> WsFedResult<(Vec<RelyingParty>, i64)> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);
        let items = RelyingParty::list(&self.pool, i64::from(limit), i64::from(offset), enabled)
            .await
            .map_err(DbError::from_query)?;
        let total = RelyingParty::count(&self.pool, enabled)
            .await
            .map_err(DbError::from_query)?;
        Ok((items, total))
    }

    pub async fn create(&self, req: CreateRelyingPartyRequest) -> WsFedResult<RelyingParty> {
        let draft = req.into_draft();
        validate_draft(&draft, self.registry_default_reply.as_deref())?;

        // One snapshot for both stores; concurrent creates fall to the UNIQUE realm.
        let view = self.store.read_view().await?;
        let available = ensure_realm_available(&view, &draft.realm).await;
        view.finish().await?;
        available?;

        let rp = RelyingParty::insert(&self.pool, &draft)
            .await
            .map_err(|e| realm_conflict_or(DbError::from_query(e), &draft.realm))?;

        tracing::info!(
            relying_party_id = %rp.id,
            realm = %rp.realm,
            token_type = %rp.token_type,
            "WS-Federation relying party created"
        );
        Ok(rp)
    }

    pub async fn update(
        &self,
        id: RelyingPartyId,
        req: UpdateRelyingPartyRequest,
    ) -> WsFedResult<RelyingParty> {
        let current = self.get(id).await?;
        let draft = current.merge(req);
        validate_draft(&draft, self.registry_default_reply.as_deref())?;

        let rp = RelyingParty::update(&self.pool, *id.as_uuid(), &draft)
            .await
            .map_err(DbError::from_query)?
            .ok_or_else(|| WsFedError::RelyingPartyNotFound(id.to_string()))?;

        tracing::info!(relying_party_id = %rp.id, realm = %rp.realm, "WS-Federation relying party updated");
        Ok(rp)
    }

    pub async fn delete(&self, id: RelyingPartyId) -> WsFedResult<()> {
        let deleted = RelyingParty::delete(&self.pool, *id.as_uuid())
            .await
            .map_err(DbError::from_query)?;
        if !deleted {
            return Err(WsFedError::RelyingPartyNotFound(id.to_string()));
        }
        tracing::info!(relying_party_id = %id, "WS-Federation relying party deleted");
        Ok(())
    }
}

/// Reject a realm already used by another relying party or by an active
/// OAuth client of the host server.
pub async fn ensure_realm_available<S>(store: &S, realm: &str) -> WsFedResult<()>
where
    S: ClientConfigurationStore + RelyingPartyConfigurationStore + ?Sized,
{
    if store.find_relying_party(realm).await?.is_some() {
        return Err(WsFedError::RealmConflict(realm.to_string()));
    }
    let client = store.find_client(realm).await?;
    if client.is_some_and(|c| c.is_active) {
        return Err(WsFedError::RealmConflict(realm.to_string()));
    }
    Ok(())
}

fn realm_conflict_or(err: DbError, realm: &str) -> WsFedError {
    if err.is_unique_violation() {
        WsFedError::RealmConflict(realm.to_string())
    } else {
        WsFedError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsfed::signing::test_support::generate_pem;

    fn draft() -> RelyingPartyDraft {
        let req: CreateRelyingPartyRequest = serde_json::from_value(serde_json::json!({
            "realm": "urn:acme:app",
            "name": "Acme",
            "reply_urls": ["https://acme.example/cb"],
        }))
        .unwrap();
        req.into_draft()
    }

    fn rejected(d: &RelyingPartyDraft) -> bool {
        matches!(validate_draft(d, None), Err(WsFedError::ValidationFailed(_)))
    }

    #[test]
    fn test_defaults_are_valid() {
        validate_draft(&draft(), None).unwrap();
    }

    #[test]
    fn test_reply_urls_required_without_registry_default() {
        let mut d = draft();
        d.reply_urls.clear();
        assert!(rejected(&d));
        validate_draft(&d, Some("https://portal.example/")).unwrap();
    }

    #[test]
    fn test_reply_url_rules() {
        let mut d = draft();
        d.reply_urls = vec!["http://acme.example/cb".into()];
        assert!(rejected(&d));

        d.reply_urls = vec!["http://localhost:3000/cb".into()];
        validate_draft(&d, None).unwrap();

        d.reply_urls = vec!["https://acme.example*".into()];
        assert!(rejected(&d));

        d.reply_urls = vec!["https://acme.example/apps/*".into()];
        validate_draft(&d, None).unwrap();

        d.reply_urls = vec!["https://acme.example/cb#frag".into()];
        assert!(rejected(&d));

        d.reply_urls = (0..=MAX_REPLY_URLS)
            .map(|i| format!("https://acme.example/cb{i}"))
            .collect();
        assert!(rejected(&d));
    }

    #[test]
    fn test_lifetime_bounds() {
        let mut d = draft();
        d.token_lifetime_seconds = 0;
        assert!(rejected(&d));
        d.token_lifetime_seconds = MAX_TOKEN_LIFETIME_SECONDS + 1;
        assert!(rejected(&d));
        d.token_lifetime_seconds = MAX_TOKEN_LIFETIME_SECONDS;
        validate_draft(&d, None).unwrap();
    }

    #[test]
    fn test_algorithms_and_token_type() {
        let mut d = draft();
        d.token_type = "saml3".into();
        assert!(rejected(&d));

        let mut d = draft();
        d.token_type = "jwt".into();
        d.signature_algorithm = "http://www.w3.org/2000/09/xmldsig#rsa-sha1".into();
        assert!(rejected(&d));

        let mut d = draft();
        d.digest_algorithm = "md5".into();
        assert!(rejected(&d));
    }

    #[test]
    fn test_claim_settings() {
        let mut d = draft();
        d.claim_mapping = serde_json::json!({"a": 5});
        assert!(rejected(&d));

        let mut d = draft();
        d.claim_policy = "deny_all".into();
        assert!(rejected(&d));

        let mut d = draft();
        d.claim_mapping = serde_json::json!({"a": "b", "c": null});
        d.claim_policy = "allow_list".into();
        validate_draft(&d, None).unwrap();
    }

    #[test]
    fn test_encrypting_certificate_must_parse() {
        let mut d = draft();
        d.encrypting_certificate = Some("garbage".into());
        assert!(rejected(&d));

        let (cert, _) = generate_pem("rp", 1_700_000_000, 30);
        d.encrypting_certificate = Some(cert);
        validate_draft(&d, None).unwrap();
    }

    #[test]
    fn test_realm_rules() {
        let mut d = draft();
        d.realm = String::new();
        assert!(rejected(&d));
        d.realm = " urn:a".into();
        assert!(rejected(&d));
        d.realm = "x".repeat(MAX_REALM_LENGTH + 1);
        assert!(rejected(&d));
    }

    struct FakeStore {
        parties: Vec<RelyingParty>,
        clients: Vec<xavyo_db::models::OAuthClient>,
    }

    #[async_trait::async_trait]
    impl RelyingPartyConfigurationStore for FakeStore {
        async fn find_relying_party(&self, realm: &str) -> Result<Option<RelyingParty>, DbError> {
            Ok(self.parties.iter().find(|rp| rp.realm == realm).cloned())
        }
    }

    #[async_trait::async_trait]
    impl ClientConfigurationStore for FakeStore {
        async fn find_client(
            &self,
            client_id: &str,
        ) -> Result<Option<xavyo_db::models::OAuthClient>, DbError> {
            Ok(self.clients.iter().find(|c| c.client_id == client_id).cloned())
        }
    }

    fn client(client_id: &str, is_active: bool) -> xavyo_db::models::OAuthClient {
        xavyo_db::models::OAuthClient {
            id: uuid::Uuid::new_v4(),
            client_id: client_id.to_string(),
            name: "portal".to_string(),
            is_active,
        }
    }

    #[tokio::test]
    async fn test_realm_taken_by_party_or_active_client() {
        let store = FakeStore {
            parties: vec![RelyingParty::from_draft(draft(), chrono::Utc::now())],
            clients: vec![client("urn:host:portal", true), client("urn:host:retired", false)],
        };

        assert!(matches!(
            ensure_realm_available(&store, "urn:acme:app").await,
            Err(WsFedError::RealmConflict(_))
        ));
        assert!(matches!(
            ensure_realm_available(&store, "urn:host:portal").await,
            Err(WsFedError::RealmConflict(_))
        ));
        ensure_realm_available(&store, "urn:host:retired").await.unwrap();
        // Realms are case-sensitive.
        ensure_realm_available(&store, "urn:ACME:app").await.unwrap();
    }

    #[tokio::test]
    async fn test_realm_check_propagates_store_failure() {
        struct Down;

        #[async_trait::async_trait]
        impl RelyingPartyConfigurationStore for Down {
            async fn find_relying_party(&self, _: &str) -> Result<Option<RelyingParty>, DbError> {
                Ok(None)
            }
        }

        #[async_trait::async_trait]
        impl ClientConfigurationStore for Down {
            async fn find_client(
                &self,
                _: &str,
            ) -> Result<Option<xavyo_db::models::OAuthClient>, DbError> {
                Err(DbError::NotFound("oauth_clients".to_string()))
            }
        }

        assert!(matches!(
            ensure_realm_available(&Down, "urn:acme:app").await,
            Err(WsFedError::Database(_))
        ));
    }
}
