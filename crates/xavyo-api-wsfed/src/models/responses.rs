//! Response types for the WS-Federation API

use crate::error::{WsFedError, WsFedResult};
use crate::wsfed::protocol::{WsFedAction, MAX_REPLY_LENGTH};
use crate::wsfed::Claim;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use xavyo_db::models::{RelyingParty, TokenType};

/// An issued security token, held only long enough to serialize the response.
#[derive(Debug, Clone)]
pub struct SecurityToken {
    /// Assertion ID or `jti`
    pub token_id: String,
    pub token_type: TokenType,
    pub issuer: String,
    /// Always the relying party's realm
    pub audience: String,
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
    pub claims: Vec<Claim>,
    /// Base64 signature value over the token body
    pub signature: String,
    /// `kid` of the signing key
    pub signing_key_id: String,
    /// Wire form: signed XML, compact JWT, or their encrypted wrappers
    pub serialized: String,
    pub encrypted: bool,
}

/// The assembled sign-in response.
#[derive(Debug, Clone)]
pub struct SignInResponse {
    pub action: WsFedAction,
    /// Serialized `RequestSecurityTokenResponse` (`wresult`)
    pub result: String,
    /// Echo of `wctx`
    pub context: Option<String>,
    /// Validated reply target
    pub reply_url: String,
    pub token: SecurityToken,
}

impl SignInResponse {
    /// Form fields posted to the reply URL.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![("wa", self.action.as_str()), ("wresult", self.result.as_str())];
        if let Some(ctx) = &self.context {
            fields.push(("wctx", ctx.as_str()));
        }
        fields
    }

    /// Auto-submitting HTML form posting the response to the reply URL.
    #[must_use]
    pub fn to_form_post(&self) -> String {
        generate_auto_submit_form(&self.reply_url, &self.form_fields())
    }

    /// Redirect URL carrying the response in its query, if it fits.
    pub fn to_redirect_url(&self) -> WsFedResult<Option<String>> {
        let mut url = Url::parse(&self.reply_url)
            .map_err(|e| WsFedError::Internal(format!("Validated reply URL unparsable: {e}")))?;
        url.query_pairs_mut().extend_pairs(self.form_fields());
        let url = String::from(url);
        Ok((url.len() <= MAX_REPLY_LENGTH).then_some(url))
    }
}

/// WS-Federation auto-submit form HTML
#[must_use]
pub fn generate_auto_submit_form(action_url: &str, fields: &[(&str, &str)]) -> String {
    let inputs: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                r#"<input type="hidden" name="{}" value="{}"/>"#,
                html_escape(name),
                html_escape(value)
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Working...</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="POST" action="{}">
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
        html_escape(action_url),
        inputs
    )
}

/// Minimal page shown when sign-out has no reply target.
#[must_use]
pub fn signed_out_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Signed out</title>
</head>
<body>
    <p>You have been signed out.</p>
</body>
</html>"#
        .to_string()
}

/// HTML escape for XSS prevention
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Relying party list response
#[derive(Debug, Serialize, ToSchema)]
pub struct RelyingPartyListResponse {
    pub items: Vec<RelyingPartyResponse>,
    pub total: i64,
    pub limit: i32,
    pub offset: i32,
}

/// Single relying party response
#[derive(Debug, Serialize, ToSchema)]
pub struct RelyingPartyResponse {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RelyingParty> for RelyingPartyResponse {
    fn from(rp: RelyingParty) -> Self {
        Self {
            id: rp.id,
            realm: rp.realm,
            name: rp.name,
            reply_urls: rp.reply_urls,
            default_reply_url: rp.default_reply_url,
            token_type: rp.token_type,
            signature_algorithm: rp.signature_algorithm,
            digest_algorithm: rp.digest_algorithm,
            token_lifetime_seconds: rp.token_lifetime_seconds,
            claim_mapping: rp.claim_mapping,
            claim_policy: rp.claim_policy,
            encrypting_certificate: rp.encrypting_certificate,
            enabled: rp.enabled,
            created_at: rp.created_at,
            updated_at: rp.updated_at,
        }
    }
}

/// Signing key list response
#[derive(Debug, Serialize, ToSchema)]
pub struct SigningKeyListResponse {
    #[schema(value_type = Vec<SigningKeyInfo>)]
    pub items: Vec<xavyo_db::models::SigningKeyInfo>,
}

/// Re-export `SigningKeyInfo` for schema reference
pub use xavyo_db::models::SigningKeyInfo;

/// Pagination query parameters
#[derive(Debug, Deserialize, IntoParams)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
    pub enabled: Option<bool>,
}

fn default_limit() -> i32 {
    20
}
