//! WS-Federation error types

use crate::services::claims_resolver::ClaimsResolutionError;
use crate::services::signin_generator::SignInState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use xavyo_db::DbError;

/// Result type for WS-Federation operations
pub type WsFedResult<T> = Result<T, WsFedError>;

/// WS-Federation errors
#[derive(Debug, Error)]
pub enum WsFedError {
    /// Malformed or missing protocol parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// `wtrealm` is not registered (or the party is disabled)
    #[error("Unknown relying party: {0}")]
    UnknownRelyingParty(String),

    /// `wreply` is not allowed for the realm, or no default reply exists
    #[error("Reply URL {reply} is not registered for realm {realm}")]
    InvalidReplyUrl { realm: String, reply: String },

    /// The claims collaborator failed
    #[error("Claims resolution failed: {0}")]
    ClaimsResolutionFailed(#[source] ClaimsResolutionError),

    /// No signing key is valid at the requested instant
    #[error("No signing key valid at {at}")]
    SigningKeyUnavailable { at: DateTime<Utc> },

    /// Encryption was requested but no usable certificate exists
    #[error("No encrypting key for realm {0}")]
    EncryptingKeyUnavailable(String),

    #[error("Unsupported token type: {0}")]
    UnsupportedTokenType(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token XML/JWT construction, signing or encryption failed
    #[error("Token serialization failed: {0}")]
    TokenSerializationFailed(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    /// A registry or key-store failure, tagged with the stage it prevented
    #[error("Collaborator failed during {stage}: {message}")]
    CollaboratorFailed { stage: SignInState, message: String },

    /// A stored relying party record violates its invariants
    #[error("Invalid relying party configuration: {0}")]
    InvalidConfiguration(String),

    /// Admin input rejected
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Certificate or private key could not be parsed or does not match
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Realm already exists: {0}")]
    RealmConflict(String),

    #[error("Relying party not found: {0}")]
    RelyingPartyNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Flat discriminant of [`WsFedError`], for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsFedErrorKind {
    InvalidRequest,
    UnknownRelyingParty,
    InvalidReplyUrl,
    ClaimsResolutionFailed,
    SigningKeyUnavailable,
    EncryptingKeyUnavailable,
    UnsupportedTokenType,
    UnsupportedAlgorithm,
    TokenSerializationFailed,
    NotAuthenticated,
    CollaboratorFailed,
    InvalidConfiguration,
    ValidationFailed,
    InvalidKeyMaterial,
    RealmConflict,
    RelyingPartyNotFound,
    Database,
    Internal,
}

impl WsFedError {
    #[must_use]
    pub fn kind(&self) -> WsFedErrorKind {
        match self {
            Self::InvalidRequest(_) => WsFedErrorKind::InvalidRequest,
            Self::UnknownRelyingParty(_) => WsFedErrorKind::UnknownRelyingParty,
            Self::InvalidReplyUrl { .. } => WsFedErrorKind::InvalidReplyUrl,
            Self::ClaimsResolutionFailed(_) => WsFedErrorKind::ClaimsResolutionFailed,
            Self::SigningKeyUnavailable { .. } => WsFedErrorKind::SigningKeyUnavailable,
            Self::EncryptingKeyUnavailable(_) => WsFedErrorKind::EncryptingKeyUnavailable,
            Self::UnsupportedTokenType(_) => WsFedErrorKind::UnsupportedTokenType,
            Self::UnsupportedAlgorithm(_) => WsFedErrorKind::UnsupportedAlgorithm,
            Self::TokenSerializationFailed(_) => WsFedErrorKind::TokenSerializationFailed,
            Self::NotAuthenticated => WsFedErrorKind::NotAuthenticated,
            Self::CollaboratorFailed { .. } => WsFedErrorKind::CollaboratorFailed,
            Self::InvalidConfiguration(_) => WsFedErrorKind::InvalidConfiguration,
            Self::ValidationFailed(_) => WsFedErrorKind::ValidationFailed,
            Self::InvalidKeyMaterial(_) => WsFedErrorKind::InvalidKeyMaterial,
            Self::RealmConflict(_) => WsFedErrorKind::RealmConflict,
            Self::RelyingPartyNotFound(_) => WsFedErrorKind::RelyingPartyNotFound,
            Self::Database(_) => WsFedErrorKind::Database,
            Self::Internal(_) => WsFedErrorKind::Internal,
        }
    }

    /// Wrap a collaborator failure with the stage the call was meant to reach.
    pub fn collaborator(stage: SignInState, err: impl std::fmt::Display) -> Self {
        Self::CollaboratorFailed {
            stage,
            message: err.to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for WsFedError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            WsFedError::InvalidRequest(_)
            | WsFedError::UnknownRelyingParty(_)
            | WsFedError::InvalidReplyUrl { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            WsFedError::ClaimsResolutionFailed(_) | WsFedError::CollaboratorFailed { .. } => {
                (StatusCode::BAD_GATEWAY, "upstream_failure")
            }
            WsFedError::SigningKeyUnavailable { .. } | WsFedError::EncryptingKeyUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "signing_unavailable")
            }
            WsFedError::UnsupportedTokenType(_)
            | WsFedError::UnsupportedAlgorithm(_)
            | WsFedError::InvalidConfiguration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "relying_party_misconfigured")
            }
            WsFedError::TokenSerializationFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "token_generation_failed")
            }
            WsFedError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated"),
            WsFedError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            WsFedError::InvalidKeyMaterial(_) => (StatusCode::BAD_REQUEST, "invalid_key_material"),
            WsFedError::RealmConflict(_) => (StatusCode::CONFLICT, "realm_conflict"),
            WsFedError::RelyingPartyNotFound(_) => {
                (StatusCode::NOT_FOUND, "relying_party_not_found")
            }
            WsFedError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            WsFedError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = match &self {
            WsFedError::UnknownRelyingParty(realm) => {
                tracing::warn!(realm = %realm, kind = ?self.kind(), "WS-Federation sign-in rejected");
                "Invalid sign-in request".to_string()
            }
            WsFedError::InvalidReplyUrl { realm, reply } => {
                tracing::warn!(realm = %realm, reply = %reply, kind = ?self.kind(), "WS-Federation sign-in rejected");
                "Invalid sign-in request".to_string()
            }
            WsFedError::InvalidRequest(msg) => {
                tracing::debug!(reason = %msg, "WS-Federation request malformed");
                "Invalid sign-in request".to_string()
            }
            WsFedError::SigningKeyUnavailable { at } => {
                tracing::error!(at = %at, "No WS-Federation signing key is valid");
                "Token signing is currently unavailable".to_string()
            }
            WsFedError::EncryptingKeyUnavailable(realm) => {
                tracing::error!(realm = %realm, "No usable encrypting certificate for relying party");
                "Token signing is currently unavailable".to_string()
            }
            WsFedError::ClaimsResolutionFailed(e) => {
                tracing::error!(error = %e, "WS-Federation claims resolution failed");
                "Claims could not be resolved".to_string()
            }
            WsFedError::CollaboratorFailed { stage, message } => {
                tracing::error!(stage = %stage, error = %message, "WS-Federation collaborator failed");
                "An upstream service failed".to_string()
            }
            WsFedError::UnsupportedTokenType(_)
            | WsFedError::UnsupportedAlgorithm(_)
            | WsFedError::InvalidConfiguration(_) => {
                tracing::error!(error = %self, "WS-Federation relying party misconfigured");
                "Relying party configuration is invalid".to_string()
            }
            WsFedError::TokenSerializationFailed(msg) => {
                tracing::error!(error = %msg, "WS-Federation token generation failed");
                "Token generation failed".to_string()
            }
            WsFedError::Database(e) => {
                tracing::error!("WS-Federation database error: {:?}", e);
                "A database error occurred".to_string()
            }
            WsFedError::Internal(msg) => {
                tracing::error!("WS-Federation internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            WsFedError::InvalidKeyMaterial(_) => "Invalid certificate or private key".to_string(),
            // Safe user-facing messages (contain only client-provided values)
            WsFedError::NotAuthenticated
            | WsFedError::ValidationFailed(_)
            | WsFedError::RealmConflict(_)
            | WsFedError::RelyingPartyNotFound(_) => self.to_string(),
        };

        let body = ErrorResponse {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: WsFedError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_realm_and_bad_reply_are_indistinguishable() {
        let (s1, b1) = body_of(WsFedError::UnknownRelyingParty("urn:x".into())).await;
        let (s2, b2) = body_of(WsFedError::InvalidReplyUrl {
            realm: "urn:acme:app".into(),
            reply: "https://evil.example/cb".into(),
        })
        .await;
        assert_eq!(s1, StatusCode::BAD_REQUEST);
        assert_eq!(s1, s2);
        assert_eq!(b1, b2);
        assert!(!b2.to_string().contains("evil.example"));
    }

    #[tokio::test]
    async fn test_signing_key_unavailable_is_operational() {
        let (status, body) = body_of(WsFedError::SigningKeyUnavailable { at: Utc::now() }).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "signing_unavailable");
    }

    #[tokio::test]
    async fn test_internal_details_not_leaked() {
        let (_, body) = body_of(WsFedError::Internal("secret path /etc/keys".into())).await;
        assert!(!body["message"].as_str().unwrap().contains("/etc/keys"));
    }

    #[test]
    fn test_collaborator_wraps_stage() {
        let err = WsFedError::collaborator(SignInState::RealmValidated, "pool timed out");
        assert_eq!(err.kind(), WsFedErrorKind::CollaboratorFailed);
        assert!(err.to_string().contains("pool timed out"));
    }
}
