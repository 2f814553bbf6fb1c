//! Identity provider signing key model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

macro_rules! signing_key_columns {
    () => {
        "id, key_id, certificate, private_key_encrypted, subject_dn, \
         not_before, not_after, is_active, created_at, updated_at"
    };
}

/// A stored token-signing key with its certificate.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IdpSigningKey {
    pub id: Uuid,
    pub key_id: String,
    pub certificate: String,
    #[serde(skip_serializing)]
    pub private_key_encrypted: Vec<u8>,
    pub subject_dn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to upload a signing key
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UploadSigningKeyRequest {
    pub certificate: String,
    pub private_key: String,
}

/// A signing key ready to insert; the private key is already encrypted.
#[derive(Debug, Clone)]
pub struct NewIdpSigningKey {
    pub key_id: String,
    pub certificate: String,
    pub private_key_encrypted: Vec<u8>,
    pub subject_dn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Public key info (without private key)
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SigningKeyInfo {
    pub id: Uuid,
    pub key_id: String,
    pub subject_dn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<IdpSigningKey> for SigningKeyInfo {
    fn from(key: IdpSigningKey) -> Self {
        Self {
            id: key.id,
            key_id: key.key_id,
            subject_dn: key.subject_dn,
            not_before: key.not_before,
            not_after: key.not_after,
            is_active: key.is_active,
            created_at: key.created_at,
        }
    }
}

impl IdpSigningKey {
    /// Whether `at` falls inside the certificate validity window.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && at >= self.not_before && at < self.not_after
    }

    /// Active keys valid at `at`, newest first.
    pub async fn find_valid_at<'e, E>(executor: E, at: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            signing_key_columns!(),
            " FROM idp_signing_keys \
              WHERE is_active = TRUE AND not_before <= $1 AND not_after > $1 \
              ORDER BY not_before DESC"
        ))
        .bind(at)
        .fetch_all(executor)
        .await
    }

    /// Active keys not yet expired at `at`, including future rollover keys,
    /// oldest first.
    pub async fn find_unexpired<'e, E>(executor: E, at: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            signing_key_columns!(),
            " FROM idp_signing_keys \
              WHERE is_active = TRUE AND not_after > $1 \
              ORDER BY not_before ASC, key_id ASC"
        ))
        .bind(at)
        .fetch_all(executor)
        .await
    }

    pub async fn list<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            signing_key_columns!(),
            " FROM idp_signing_keys ORDER BY not_before DESC"
        ))
        .fetch_all(executor)
        .await
    }

    pub async fn insert<'e, E>(executor: E, key: &NewIdpSigningKey) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(concat!(
            "INSERT INTO idp_signing_keys \
                (key_id, certificate, private_key_encrypted, subject_dn, not_before, not_after) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING ",
            signing_key_columns!()
        ))
        .bind(&key.key_id)
        .bind(&key.certificate)
        .bind(&key.private_key_encrypted)
        .bind(&key.subject_dn)
        .bind(key.not_before)
        .bind(key.not_after)
        .fetch_one(executor)
        .await
    }

    /// Monotonic-enough fingerprint of the key table: changes whenever a key
    /// is added or modified.
    pub async fn material_version<'e, E>(executor: E) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count, latest): (i64, Option<DateTime<Utc>>) =
            sqlx::query_as("SELECT COUNT(*), MAX(updated_at) FROM idp_signing_keys")
                .fetch_one(executor)
                .await?;
        let micros = latest.map_or(0, |t| t.timestamp_micros());
        Ok((micros as u64).wrapping_mul(31).wrapping_add(count as u64))
    }
}
