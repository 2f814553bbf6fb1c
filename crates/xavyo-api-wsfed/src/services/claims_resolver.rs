//! Claims resolution boundary.
//!
//! The host identity engine decides which claims a principal carries for a
//! given relying party. The sign-in pipeline only consumes the result.

use crate::models::Principal;
use crate::wsfed::claims::{
    Claim, CLAIM_TYPE_AUTHENTICATION_INSTANT, CLAIM_TYPE_AUTHENTICATION_METHOD, CLAIM_TYPE_EMAIL,
    CLAIM_TYPE_NAME, CLAIM_TYPE_NAME_IDENTIFIER,
};
use crate::wsfed::xml::format_instant;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error)]
pub enum ClaimsResolutionError {
    #[error("Principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("Principal {subject} is not permitted to access {realm}")]
    AccessDenied { subject: String, realm: String },

    #[error("Claims source unavailable: {0}")]
    Unavailable(String),
}

/// Produces the claim set for a principal signing in to a realm.
#[async_trait]
pub trait ClaimsResolver: Send + Sync {
    async fn resolve(
        &self,
        principal: &Principal,
        realm: &str,
    ) -> Result<Vec<Claim>, ClaimsResolutionError>;
}

/// Derives claims from the authenticated principal alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalClaimsResolver;

#[async_trait]
impl ClaimsResolver for PrincipalClaimsResolver {
    async fn resolve(
        &self,
        principal: &Principal,
        _realm: &str,
    ) -> Result<Vec<Claim>, ClaimsResolutionError> {
        Ok(principal_claims(principal))
    }
}

/// Standard identity claims followed by the principal's own claims.
#[must_use]
pub fn principal_claims(principal: &Principal) -> Vec<Claim> {
    let mut claims = vec![
        Claim::new(CLAIM_TYPE_NAME_IDENTIFIER, principal.subject.clone()),
        Claim::new(
            CLAIM_TYPE_NAME,
            principal
                .display_name
                .clone()
                .unwrap_or_else(|| principal.subject.clone()),
        ),
    ];
    if let Some(email) = &principal.email {
        claims.push(Claim::new(CLAIM_TYPE_EMAIL, email.clone()));
    }
    claims.push(Claim::new(
        CLAIM_TYPE_AUTHENTICATION_METHOD,
        principal.authentication_method.clone(),
    ));
    claims.push(Claim::new(
        CLAIM_TYPE_AUTHENTICATION_INSTANT,
        format_instant(principal.authenticated_at),
    ));
    claims.extend(principal.claims.iter().cloned());
    claims
}

/// In-memory claims source for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryClaimsResolver {
    claims: Arc<RwLock<HashMap<String, Vec<Claim>>>>,
    failure: Arc<RwLock<Option<ClaimsResolutionError>>>,
    calls: AtomicUsize,
}

impl InMemoryClaimsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_claims(&self, subject: impl Into<String>, claims: Vec<Claim>) {
        self.claims.write().await.insert(subject.into(), claims);
    }

    /// Make every subsequent call fail with `error`.
    pub async fn fail_with(&self, error: ClaimsResolutionError) {
        *self.failure.write().await = Some(error);
    }

    /// Number of `resolve` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClaimsResolver for InMemoryClaimsResolver {
    async fn resolve(
        &self,
        principal: &Principal,
        _realm: &str,
    ) -> Result<Vec<Claim>, ClaimsResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.read().await.clone() {
            return Err(err);
        }
        self.claims
            .read()
            .await
            .get(&principal.subject)
            .cloned()
            .ok_or_else(|| ClaimsResolutionError::PrincipalNotFound(principal.subject.clone()))
    }
}
