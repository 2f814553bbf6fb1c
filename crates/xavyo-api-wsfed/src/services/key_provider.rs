//! Key material boundary: signing keys for tokens and metadata, and
//! encryption certificates for relying parties.

use crate::error::WsFedError;
use crate::services::signing_key_service::decrypt_private_key;
use crate::wsfed::encryption::EncryptingCertificate;
use crate::wsfed::signing::SigningCredentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use xavyo_db::models::{IdpSigningKey, RelyingParty};
use xavyo_db::DbError;

#[derive(Debug, Error)]
pub enum KeyMaterialError {
    #[error("Key store unavailable: {0}")]
    Storage(#[from] DbError),

    #[error("Stored key material is unusable: {0}")]
    InvalidKey(String),
}

impl From<WsFedError> for KeyMaterialError {
    fn from(err: WsFedError) -> Self {
        Self::InvalidKey(err.to_string())
    }
}

/// A signing key with the window in which it may sign.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub credentials: SigningCredentials,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl SigningKey {
    /// Key whose window is the certificate's validity period.
    pub fn from_credentials(credentials: SigningCredentials) -> Result<Self, KeyMaterialError> {
        Ok(Self {
            key_id: credentials.key_id()?,
            not_before: credentials.not_before()?,
            not_after: credentials.not_after()?,
            credentials,
        })
    }

    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at < self.not_after
    }
}

/// Public half of a signing key, as published in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedKey {
    pub key_id: String,
    pub certificate_base64: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl PublishedKey {
    pub fn from_signing_key(key: &SigningKey) -> Result<Self, KeyMaterialError> {
        Ok(Self {
            key_id: key.key_id.clone(),
            certificate_base64: key.credentials.certificate_base64_der()?,
            not_before: key.not_before,
            not_after: key.not_after,
        })
    }
}

#[async_trait]
pub trait KeyMaterialProvider: Send + Sync {
    /// The key to sign with at `at`, or `None` if no key is valid then.
    async fn current_signing_key(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<SigningKey>, KeyMaterialError>;

    /// Encryption certificate for a relying party, or `None` if it has none.
    async fn encrypting_key_for(
        &self,
        relying_party: &RelyingParty,
    ) -> Result<Option<EncryptingCertificate>, KeyMaterialError>;

    /// Every key not yet expired at `at` (current and future rollover
    /// keys), ordered by `not_before`.
    async fn published_signing_keys(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<PublishedKey>, KeyMaterialError>;

    /// Changes whenever the key set changes.
    async fn material_version(&self) -> Result<u64, KeyMaterialError>;
}

/// The newest key valid at `at`; ties broken by key id.
fn select_current<'a>(
    keys: impl Iterator<Item = &'a SigningKey>,
    at: DateTime<Utc>,
) -> Option<&'a SigningKey> {
    keys.filter(|k| k.is_valid_at(at))
        .max_by(|a, b| a.not_before.cmp(&b.not_before).then_with(|| b.key_id.cmp(&a.key_id)))
}

/// Parse the certificate stored on the relying party record.
fn certificate_from_party(
    relying_party: &RelyingParty,
) -> Result<Option<EncryptingCertificate>, KeyMaterialError> {
    relying_party
        .encrypting_certificate
        .as_deref()
        .filter(|pem| !pem.trim().is_empty())
        .map(EncryptingCertificate::from_pem)
        .transpose()
        .map_err(KeyMaterialError::from)
}

/// In-memory key material for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryKeyMaterialProvider {
    signing_keys: RwLock<Vec<SigningKey>>,
    encrypting_overrides: RwLock<HashMap<String, EncryptingCertificate>>,
    version: AtomicU64,
    signing_calls: AtomicUsize,
}

impl InMemoryKeyMaterialProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_keys(keys: Vec<SigningKey>) -> Self {
        Self {
            signing_keys: RwLock::new(keys),
            ..Self::default()
        }
    }

    pub async fn add_signing_key(&self, key: SigningKey) {
        self.signing_keys.write().await.push(key);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn clear_signing_keys(&self) {
        self.signing_keys.write().await.clear();
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Use `certificate` for `realm` instead of the one on its record.
    pub async fn set_encrypting_certificate(
        &self,
        realm: impl Into<String>,
        certificate: EncryptingCertificate,
    ) {
        self.encrypting_overrides
            .write()
            .await
            .insert(realm.into(), certificate);
    }

    /// Number of `current_signing_key` calls so far.
    #[must_use]
    pub fn signing_calls(&self) -> usize {
        self.signing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyMaterialProvider for InMemoryKeyMaterialProvider {
    async fn current_signing_key(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<SigningKey>, KeyMaterialError> {
        self.signing_calls.fetch_add(1, Ordering::SeqCst);
        let keys = self.signing_keys.read().await;
        Ok(select_current(keys.iter(), at).cloned())
    }

    async fn encrypting_key_for(
        &self,
        relying_party: &RelyingParty,
    ) -> Result<Option<EncryptingCertificate>, KeyMaterialError> {
        if let Some(cert) = self.encrypting_overrides.read().await.get(&relying_party.realm) {
            return Ok(Some(cert.clone()));
        }
        certificate_from_party(relying_party)
    }

    async fn published_signing_keys(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<PublishedKey>, KeyMaterialError> {
        let keys = self.signing_keys.read().await;
        let mut unexpired: Vec<&SigningKey> = keys.iter().filter(|k| k.not_after > at).collect();
        unexpired.sort_by(|a, b| {
            a.not_before
                .cmp(&b.not_before)
                .then_with(|| a.key_id.cmp(&b.key_id))
        });
        unexpired
            .into_iter()
            .map(PublishedKey::from_signing_key)
            .collect()
    }

    async fn material_version(&self) -> Result<u64, KeyMaterialError> {
        Ok(self.version.load(Ordering::SeqCst))
    }
}

/// Key material from the `idp_signing_keys` table, private keys decrypted
/// with the deployment's key-encryption key.
pub struct PostgresKeyMaterialProvider {
    pool: PgPool,
    encryption_key: Arc<[u8]>,
}

impl PostgresKeyMaterialProvider {
    #[must_use]
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Self {
        Self {
            pool,
            encryption_key: Arc::from(encryption_key),
        }
    }

    fn load(&self, row: &IdpSigningKey) -> Result<SigningKey, KeyMaterialError> {
        let private_key = decrypt_private_key(&row.private_key_encrypted, &self.encryption_key)?;
        let credentials = SigningCredentials::from_pem(&row.certificate, &private_key)?;
        Ok(SigningKey {
            key_id: row.key_id.clone(),
            credentials,
            not_before: row.not_before,
            not_after: row.not_after,
        })
    }
}

#[async_trait]
impl KeyMaterialProvider for PostgresKeyMaterialProvider {
    async fn current_signing_key(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<SigningKey>, KeyMaterialError> {
        let rows = IdpSigningKey::find_valid_at(&self.pool, at)
            .await
            .map_err(DbError::from_query)?;
        rows.first().map(|row| self.load(row)).transpose()
    }

    async fn encrypting_key_for(
        &self,
        relying_party: &RelyingParty,
    ) -> Result<Option<EncryptingCertificate>, KeyMaterialError> {
        certificate_from_party(relying_party)
    }

    async fn published_signing_keys(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<PublishedKey>, KeyMaterialError> {
        let rows = IdpSigningKey::find_unexpired(&self.pool, at)
            .await
            .map_err(DbError::from_query)?;
        rows.iter()
            .map(|row| -> Result<PublishedKey, KeyMaterialError> {
                let cert = crate::wsfed::signing::parse_certificate(&row.certificate)?;
                Ok(PublishedKey {
                    key_id: row.key_id.clone(),
                    certificate_base64: crate::wsfed::signing::certificate_base64_der(&cert)?,
                    not_before: row.not_before,
                    not_after: row.not_after,
                })
            })
            .collect()
    }

    async fn material_version(&self) -> Result<u64, KeyMaterialError> {
        Ok(IdpSigningKey::material_version(&self.pool)
            .await
            .map_err(DbError::from_query)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsfed::signing::test_support::generate_pem;
    use chrono::{Duration, TimeZone};

    fn key(cn: &str, from: i64, days: u32) -> SigningKey {
        let (cert, pem) = generate_pem(cn, from, days);
        SigningKey::from_credentials(SigningCredentials::from_pem(&cert, &pem).unwrap()).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    const T0: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    #[tokio::test]
    async fn test_current_key_respects_window() {
        let provider = InMemoryKeyMaterialProvider::with_keys(vec![key("old", T0, 10)]);
        assert!(provider
            .current_signing_key(at(T0 + DAY))
            .await
            .unwrap()
            .is_some());
        assert!(provider
            .current_signing_key(at(T0 + 10 * DAY))
            .await
            .unwrap()
            .is_none());
        assert!(provider
            .current_signing_key(at(T0 - 1))
            .await
            .unwrap()
            .is_none());
        assert_eq!(provider.signing_calls(), 3);
    }

    #[tokio::test]
    async fn test_newest_valid_key_wins() {
        let old = key("old", T0, 30);
        let new = key("new", T0 + 5 * DAY, 30);
        let future = key("future", T0 + 20 * DAY, 30);
        let provider =
            InMemoryKeyMaterialProvider::with_keys(vec![old.clone(), new.clone(), future]);

        let current = provider
            .current_signing_key(at(T0 + 6 * DAY))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.key_id, new.key_id);

        let early = provider
            .current_signing_key(at(T0 + DAY))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(early.key_id, old.key_id);
    }

    #[tokio::test]
    async fn test_published_keys_include_rollover_and_skip_expired() {
        let expired = key("expired", T0 - 40 * DAY, 10);
        let current = key("current", T0 - DAY, 30);
        let next = key("next", T0 + 10 * DAY, 30);
        let provider = InMemoryKeyMaterialProvider::with_keys(vec![
            next.clone(),
            expired,
            current.clone(),
        ]);

        let published = provider.published_signing_keys(at(T0)).await.unwrap();
        let ids: Vec<&str> = published.iter().map(|k| k.key_id.as_str()).collect();
        assert_eq!(ids, vec![current.key_id.as_str(), next.key_id.as_str()]);
    }

    #[tokio::test]
    async fn test_version_changes_with_key_set() {
        let provider = InMemoryKeyMaterialProvider::new();
        let v0 = provider.material_version().await.unwrap();
        provider.add_signing_key(key("k", T0, 1)).await;
        let v1 = provider.material_version().await.unwrap();
        assert_ne!(v0, v1);
        provider.clear_signing_keys().await;
        assert_ne!(provider.material_version().await.unwrap(), v1);
    }

    #[test]
    fn test_signing_key_window_from_certificate() {
        let k = key("w", T0, 2);
        assert_eq!(k.not_before, at(T0));
        assert_eq!(k.not_after - k.not_before, Duration::days(2));
    }
}
