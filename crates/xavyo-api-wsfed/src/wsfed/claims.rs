//! Claim representation and relying-party claim mapping.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xavyo_db::models::{ClaimMapping, ClaimPolicy, MappingEntry};

/// Namespace applied to claim types that are not URIs (SAML 1.1 attributes).
pub const DEFAULT_CLAIM_NAMESPACE: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims";

pub const CLAIM_TYPE_NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
pub const CLAIM_TYPE_NAME_IDENTIFIER: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
pub const CLAIM_TYPE_EMAIL: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
pub const CLAIM_TYPE_UPN: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/upn";
pub const CLAIM_TYPE_ROLE: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
pub const CLAIM_TYPE_AUTHENTICATION_METHOD: &str =
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/authenticationmethod";
pub const CLAIM_TYPE_AUTHENTICATION_INSTANT: &str =
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/authenticationinstant";

/// One claim type/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    /// Split into `(namespace, name)` for SAML 1.1 `AttributeNamespace` /
    /// `AttributeName`.
    #[must_use]
    pub fn split_type(&self) -> (&str, &str) {
        match self.claim_type.rsplit_once('/') {
            Some((namespace, name)) if !name.is_empty() && self.claim_type.contains("://") => {
                (namespace, name)
            }
            _ => (DEFAULT_CLAIM_NAMESPACE, self.claim_type.as_str()),
        }
    }
}

/// Rename or drop claims per the relying party's mapping table.
///
/// Order of the input is preserved and exact duplicates produced by renames
/// are collapsed to their first occurrence, so the output depends only on the
/// input sequence and the table.
#[must_use]
pub fn apply_claim_mapping(
    claims: &[Claim],
    mapping: &ClaimMapping,
    policy: ClaimPolicy,
) -> Vec<Claim> {
    let mut seen = HashSet::new();
    let mut mapped = Vec::with_capacity(claims.len());

    for claim in claims {
        let output = match mapping.lookup(&claim.claim_type) {
            MappingEntry::Rename(target) => Claim::new(target, claim.value.clone()),
            MappingEntry::Drop => continue,
            MappingEntry::Unmapped => match policy {
                ClaimPolicy::PassThrough => claim.clone(),
                ClaimPolicy::AllowList => continue,
            },
        };
        if seen.insert((output.claim_type.clone(), output.value.clone())) {
            mapped.push(output);
        }
    }

    mapped
}

/// Subject identifier: the first `nameidentifier` claim, else `fallback`.
#[must_use]
pub fn name_identifier<'a>(claims: &'a [Claim], fallback: &'a str) -> &'a str {
    claims
        .iter()
        .find(|c| c.claim_type == CLAIM_TYPE_NAME_IDENTIFIER)
        .map_or(fallback, |c| c.value.as_str())
}
