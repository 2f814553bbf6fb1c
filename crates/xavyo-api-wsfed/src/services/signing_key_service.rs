//! Identity provider signing key administration.

use crate::error::{WsFedError, WsFedResult};
use crate::wsfed::signing::SigningCredentials;
use sqlx::PgPool;
use xavyo_db::models::{IdpSigningKey, NewIdpSigningKey, UploadSigningKeyRequest};
use xavyo_db::DbError;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
/// AES-256 key length for private key encryption at rest.
pub const KEY_ENCRYPTION_KEY_LEN: usize = 32;

/// Service for uploading and listing signing keys
pub struct SigningKeyService {
    pool: PgPool,
    encryption_key: Vec<u8>,
}

impl SigningKeyService {
    #[must_use]
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Self {
        Self {
            pool,
            encryption_key,
        }
    }

    pub async fn list(&self) -> WsFedResult<Vec<IdpSigningKey>> {
        Ok(IdpSigningKey::list(&self.pool)
            .await
            .map_err(DbError::from_query)?)
    }

    /// Store a certificate/private key pair. The key becomes eligible for
    /// signing once its certificate validity window opens, which lets a
    /// rollover key be published ahead of time.
    pub async fn upload(&self, req: UploadSigningKeyRequest) -> WsFedResult<IdpSigningKey> {
        let creds = SigningCredentials::from_pem(&req.certificate, &req.private_key)?;
        let not_before = creds.not_before()?;
        let not_after = creds.not_after()?;
        if not_after <= not_before {
            return Err(WsFedError::InvalidKeyMaterial(
                "Certificate validity window is empty".to_string(),
            ));
        }

        let encrypted = encrypt_private_key(req.private_key.as_bytes(), &self.encryption_key)?;

        let new_key = NewIdpSigningKey {
            key_id: creds.key_id()?,
            certificate: creds.certificate_pem()?,
            private_key_encrypted: encrypted,
            subject_dn: creds.subject_dn(),
            not_before,
            not_after,
        };

        let key = IdpSigningKey::insert(&self.pool, &new_key)
            .await
            .map_err(|e| match DbError::from_query(e) {
                DbError::UniqueViolation(_) => WsFedError::ValidationFailed(format!(
                    "Signing key already uploaded: {}",
                    new_key.key_id
                )),
                other => WsFedError::Database(other),
            })?;

        tracing::info!(
            key_id = %key.key_id,
            not_before = %key.not_before,
            not_after = %key.not_after,
            "WS-Federation signing key uploaded"
        );
        Ok(key)
    }
}

/// Encrypt private key using AES-256-GCM
///
/// Format: IV (12 bytes) + tag (16 bytes) + ciphertext
pub(crate) fn encrypt_private_key(key_pem: &[u8], encryption_key: &[u8]) -> WsFedResult<Vec<u8>> {
    use openssl::symm::{encrypt_aead, Cipher};

    if encryption_key.len() != KEY_ENCRYPTION_KEY_LEN {
        return Err(WsFedError::Internal(format!(
            "AES-256-GCM requires 32-byte key, got {} bytes",
            encryption_key.len()
        )));
    }

    let mut iv = vec![0u8; IV_LEN];
    openssl::rand::rand_bytes(&mut iv)
        .map_err(|e| WsFedError::Internal(format!("Failed to generate IV: {e}")))?;

    let mut tag = vec![0u8; TAG_LEN];
    let ciphertext = encrypt_aead(
        Cipher::aes_256_gcm(),
        encryption_key,
        Some(&iv),
        &[],
        key_pem,
        &mut tag,
    )
    .map_err(|e| WsFedError::Internal(format!("Encryption failed: {e}")))?;

    let mut result = iv;
    result.extend(&tag);
    result.extend(&ciphertext);
    Ok(result)
}

/// Decrypt private key using AES-256-GCM
pub(crate) fn decrypt_private_key(encrypted: &[u8], encryption_key: &[u8]) -> WsFedResult<String> {
    use openssl::symm::{decrypt_aead, Cipher};

    if encryption_key.len() != KEY_ENCRYPTION_KEY_LEN {
        return Err(WsFedError::InvalidKeyMaterial(format!(
            "AES-256-GCM requires 32-byte key, got {} bytes",
            encryption_key.len()
        )));
    }
    if encrypted.len() < IV_LEN + TAG_LEN {
        return Err(WsFedError::InvalidKeyMaterial(
            "Invalid encrypted data".to_string(),
        ));
    }

    let iv = &encrypted[..IV_LEN];
    let tag = &encrypted[IV_LEN..IV_LEN + TAG_LEN];
    let ciphertext = &encrypted[IV_LEN + TAG_LEN..];

    let plaintext = decrypt_aead(Cipher::aes_256_gcm(), encryption_key, Some(iv), &[], ciphertext, tag)
        .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Decryption failed: {e}")))?;

    String::from_utf8(plaintext)
        .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid UTF-8: {e}")))
}
