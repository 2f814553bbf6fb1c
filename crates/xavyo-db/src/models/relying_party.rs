//! WS-Federation relying party model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, PgExecutor};
use std::collections::BTreeMap;
use uuid::Uuid;

macro_rules! relying_party_columns {
    () => {
        "id, realm, name, reply_urls, default_reply_url, token_type, \
         signature_algorithm, digest_algorithm, token_lifetime_seconds, \
         claim_mapping, claim_policy, encrypting_certificate, enabled, \
         created_at, updated_at"
    };
}

/// Suffix marking a reply URL entry as a wildcard prefix.
pub const REPLY_URL_WILDCARD: char = '*';

/// A trusted federation partner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RelyingParty {
    pub id: Uuid,
    /// Protocol identifier matched against `wtrealm`; also the token audience.
    pub realm: String,
    pub name: String,
    /// Acceptable `wreply` values, in configured order.
    pub reply_urls: Vec<String>,
    pub default_reply_url: Option<String>,
    pub token_type: String,
    pub signature_algorithm: String,
    pub digest_algorithm: String,
    pub token_lifetime_seconds: i32,
    /// JSON object of `source claim type -> target claim type | null`.
    pub claim_mapping: serde_json::Value,
    pub claim_policy: String,
    /// PEM certificate; when present issued tokens are encrypted to it.
    pub encrypting_certificate: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Issued assertion format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Saml11,
    Saml20,
    Jwt,
}

impl TokenType {
    /// Parse a configured token type. Accepts the short names and the
    /// token-type URIs relying parties commonly paste from their own config.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "saml11" | "saml1.1" | "urn:oasis:names:tc:SAML:1.0:assertion" => Some(Self::Saml11),
            "saml20"
            | "saml2.0"
            | "urn:oasis:names:tc:SAML:2.0:assertion"
            | "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0" => {
                Some(Self::Saml20)
            }
            "jwt" | "urn:ietf:params:oauth:token-type:jwt" => Some(Self::Jwt),
            _ => None,
        }
    }

    /// Canonical stored value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saml11 => "saml11",
            Self::Saml20 => "saml20",
            Self::Jwt => "jwt",
        }
    }
}

/// What happens to resolved claims that have no mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Unmapped claims are emitted unchanged.
    #[default]
    PassThrough,
    /// Only claims with a mapping entry are emitted.
    AllowList,
}

impl ClaimPolicy {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pass_through" => Some(Self::PassThrough),
            "allow_list" => Some(Self::AllowList),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::AllowList => "allow_list",
        }
    }
}

/// Claim rename/drop table keyed by source claim type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimMapping(BTreeMap<String, Option<String>>);

/// Outcome of looking up one source claim type in a [`ClaimMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingEntry<'a> {
    Rename(&'a str),
    Drop,
    Unmapped,
}

impl ClaimMapping {
    /// Parse the stored JSON representation.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object of strings or nulls.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
    }

    #[must_use]
    pub fn lookup(&self, source: &str) -> MappingEntry<'_> {
        match self.0.get(source) {
            Some(Some(target)) if !target.is_empty() => MappingEntry::Rename(target),
            Some(_) => MappingEntry::Drop,
            None => MappingEntry::Unmapped,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, source: impl Into<String>, target: Option<String>) {
        self.0.insert(source.into(), target);
    }

    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// All writable columns of a relying party, already validated by the caller.
#[derive(Debug, Clone)]
pub struct RelyingPartyDraft {
    pub realm: String,
    pub name: String,
    pub reply_urls: Vec<String>,
    pub default_reply_url: Option<String>,
    pub token_type: String,
    pub signature_algorithm: String,
    pub digest_algorithm: String,
    pub token_lifetime_seconds: i32,
    pub claim_mapping: serde_json::Value,
    pub claim_policy: String,
    pub encrypting_certificate: Option<String>,
    pub enabled: bool,
}

/// Request to register a new relying party
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateRelyingPartyRequest {
    pub realm: String,
    pub name: String,
    #[serde(default)]
    pub reply_urls: Vec<String>,
    #[serde(default)]
    pub default_reply_url: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default = "default_signature_algorithm")]
    pub signature_algorithm: String,
    #[serde(default = "default_digest_algorithm")]
    pub digest_algorithm: String,
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_seconds: i32,
    #[serde(default)]
    pub claim_mapping: Option<serde_json::Value>,
    #[serde(default = "default_claim_policy")]
    pub claim_policy: String,
    #[serde(default)]
    pub encrypting_certificate: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Request to update a relying party. Absent fields keep their value;
/// `default_reply_url` and `encrypting_certificate` are cleared by `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateRelyingPartyRequest {
    pub name: Option<String>,
    pub reply_urls: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub default_reply_url: Option<Option<String>>,
    pub token_type: Option<String>,
    pub signature_algorithm: Option<String>,
    pub digest_algorithm: Option<String>,
    pub token_lifetime_seconds: Option<i32>,
    pub claim_mapping: Option<serde_json::Value>,
    pub claim_policy: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub encrypting_certificate: Option<Option<String>>,
    pub enabled: Option<bool>,
}

/// Present-but-null becomes `Some(None)`; an absent field stays `None`
/// through `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn default_token_type() -> String {
    TokenType::Saml20.as_str().to_string()
}

fn default_signature_algorithm() -> String {
    "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".to_string()
}

fn default_digest_algorithm() -> String {
    "http://www.w3.org/2001/04/xmlenc#sha256".to_string()
}

fn default_token_lifetime() -> i32 {
    300
}

fn default_claim_policy() -> String {
    ClaimPolicy::PassThrough.as_str().to_string()
}

fn default_true() -> bool {
    true
}

impl CreateRelyingPartyRequest {
    /// Convert into a draft with the realm trimmed.
    #[must_use]
    pub fn into_draft(self) -> RelyingPartyDraft {
        RelyingPartyDraft {
            realm: self.realm.trim().to_string(),
            name: self.name,
            reply_urls: self.reply_urls,
            default_reply_url: self.default_reply_url,
            token_type: self.token_type,
            signature_algorithm: self.signature_algorithm,
            digest_algorithm: self.digest_algorithm,
            token_lifetime_seconds: self.token_lifetime_seconds,
            claim_mapping: self.claim_mapping.unwrap_or_else(|| serde_json::json!({})),
            claim_policy: self.claim_policy,
            encrypting_certificate: self.encrypting_certificate,
            enabled: self.enabled,
        }
    }
}

impl RelyingParty {
    /// Parsed token type, `None` if the stored value is not a known format.
    #[must_use]
    pub fn token_type(&self) -> Option<TokenType> {
        TokenType::parse(&self.token_type)
    }

    #[must_use]
    pub fn claim_policy(&self) -> Option<ClaimPolicy> {
        ClaimPolicy::parse(&self.claim_policy)
    }

    /// Parse the claim mapping table.
    ///
    /// # Errors
    ///
    /// Fails if the stored JSON is not an object of strings or nulls.
    pub fn claim_mapping(&self) -> Result<ClaimMapping, serde_json::Error> {
        ClaimMapping::from_value(&self.claim_mapping)
    }

    #[must_use]
    pub fn token_lifetime(&self) -> Duration {
        Duration::seconds(i64::from(self.token_lifetime_seconds))
    }

    /// Reply used when the request carries no `wreply`: the explicit
    /// default, else the first non-wildcard reply URL.
    #[must_use]
    pub fn default_reply(&self) -> Option<&str> {
        self.default_reply_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| {
                self.reply_urls
                    .iter()
                    .map(String::as_str)
                    .find(|url| !url.ends_with(REPLY_URL_WILDCARD))
            })
    }

    /// Writable columns of this record.
    #[must_use]
    pub fn to_draft(&self) -> RelyingPartyDraft {
        self.merge(UpdateRelyingPartyRequest::default())
    }

    /// Apply an update request on top of this record.
    #[must_use]
    pub fn merge(&self, req: UpdateRelyingPartyRequest) -> RelyingPartyDraft {
        RelyingPartyDraft {
            realm: self.realm.clone(),
            name: req.name.unwrap_or_else(|| self.name.clone()),
            reply_urls: req.reply_urls.unwrap_or_else(|| self.reply_urls.clone()),
            default_reply_url: req
                .default_reply_url
                .unwrap_or_else(|| self.default_reply_url.clone()),
            token_type: req.token_type.unwrap_or_else(|| self.token_type.clone()),
            signature_algorithm: req
                .signature_algorithm
                .unwrap_or_else(|| self.signature_algorithm.clone()),
            digest_algorithm: req
                .digest_algorithm
                .unwrap_or_else(|| self.digest_algorithm.clone()),
            token_lifetime_seconds: req
                .token_lifetime_seconds
                .unwrap_or(self.token_lifetime_seconds),
            claim_mapping: req
                .claim_mapping
                .unwrap_or_else(|| self.claim_mapping.clone()),
            claim_policy: req
                .claim_policy
                .unwrap_or_else(|| self.claim_policy.clone()),
            encrypting_certificate: req
                .encrypting_certificate
                .unwrap_or_else(|| self.encrypting_certificate.clone()),
            enabled: req.enabled.unwrap_or(self.enabled),
        }
    }

    /// Build an in-memory record from a draft (used by non-SQL registries).
    #[must_use]
    pub fn from_draft(draft: RelyingPartyDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            realm: draft.realm,
            name: draft.name,
            reply_urls: draft.reply_urls,
            default_reply_url: draft.default_reply_url,
            token_type: draft.token_type,
            signature_algorithm: draft.signature_algorithm,
            digest_algorithm: draft.digest_algorithm,
            token_lifetime_seconds: draft.token_lifetime_seconds,
            claim_mapping: draft.claim_mapping,
            claim_policy: draft.claim_policy,
            encrypting_certificate: draft.encrypting_certificate,
            enabled: draft.enabled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exact, case-sensitive realm lookup.
    pub async fn find_by_realm<'e, E>(executor: E, realm: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            relying_party_columns!(),
            " FROM wsfed_relying_parties WHERE realm = $1"
        ))
        .bind(realm)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            relying_party_columns!(),
            " FROM wsfed_relying_parties WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Page through relying parties ordered by realm.
    pub async fn list<'e, E>(
        executor: E,
        limit: i64,
        offset: i64,
        enabled: Option<bool>,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            relying_party_columns!(),
            " FROM wsfed_relying_parties \
              WHERE ($1::BOOLEAN IS NULL OR enabled = $1) \
              ORDER BY realm ASC LIMIT $2 OFFSET $3"
        ))
        .bind(enabled)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
    }

    pub async fn count<'e, E>(executor: E, enabled: Option<bool>) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM wsfed_relying_parties WHERE ($1::BOOLEAN IS NULL OR enabled = $1)",
        )
        .bind(enabled)
        .fetch_one(executor)
        .await
    }

    pub async fn insert<'e, E>(executor: E, draft: &RelyingPartyDraft) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "INSERT INTO wsfed_relying_parties \
                (realm, name, reply_urls, default_reply_url, token_type, \
                 signature_algorithm, digest_algorithm, token_lifetime_seconds, \
                 claim_mapping, claim_policy, encrypting_certificate, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING ",
            relying_party_columns!()
        ))
        .bind(&draft.realm)
        .bind(&draft.name)
        .bind(&draft.reply_urls)
        .bind(&draft.default_reply_url)
        .bind(&draft.token_type)
        .bind(&draft.signature_algorithm)
        .bind(&draft.digest_algorithm)
        .bind(draft.token_lifetime_seconds)
        .bind(&draft.claim_mapping)
        .bind(&draft.claim_policy)
        .bind(&draft.encrypting_certificate)
        .bind(draft.enabled)
        .fetch_one(executor)
        .await
    }

    /// Overwrite every writable column except the realm.
    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        draft: &RelyingPartyDraft,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "UPDATE wsfed_relying_parties SET \
                name = $2, reply_urls = $3, default_reply_url = $4, token_type = $5, \
                signature_algorithm = $6, digest_algorithm = $7, \
                token_lifetime_seconds = $8, claim_mapping = $9, claim_policy = $10, \
                encrypting_certificate = $11, enabled = $12, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING ",
            relying_party_columns!()
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.reply_urls)
        .bind(&draft.default_reply_url)
        .bind(&draft.token_type)
        .bind(&draft.signature_algorithm)
        .bind(&draft.digest_algorithm)
        .bind(draft.token_lifetime_seconds)
        .bind(&draft.claim_mapping)
        .bind(&draft.claim_policy)
        .bind(&draft.encrypting_certificate)
        .bind(draft.enabled)
        .fetch_optional(executor)
        .await
    }

    /// Returns `true` if a row was removed.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM wsfed_relying_parties WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
