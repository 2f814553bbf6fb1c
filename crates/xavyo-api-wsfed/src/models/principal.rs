//! The authenticated principal handed to the sign-in pipeline by the host.

use crate::wsfed::Claim;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `urn:oasis:names:tc:SAML:1.0:am:password`
pub const AUTHN_METHOD_PASSWORD: &str = "urn:oasis:names:tc:SAML:1.0:am:password";
/// `urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport`
pub const AUTHN_CONTEXT_PASSWORD_PROTECTED_TRANSPORT: &str =
    "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";

/// A principal the host identity engine has already authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub authentication_method: String,
    pub authenticated_at: DateTime<Utc>,
    /// Claims asserted by the host engine at login time.
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, authenticated_at: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            display_name: None,
            email: None,
            authentication_method: AUTHN_CONTEXT_PASSWORD_PROTECTED_TRANSPORT.to_string(),
            authenticated_at,
            claims: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_authentication_method(mut self, method: impl Into<String>) -> Self {
        self.authentication_method = method.into();
        self
    }

    #[must_use]
    pub fn with_claim(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push(Claim::new(claim_type, value));
        self
    }
}
