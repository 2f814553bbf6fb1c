//! Inbound WS-Federation passive requests.

use crate::error::{WsFedError, WsFedResult};
use crate::wsfed::protocol::{
    WsFedAction, MAX_CONTEXT_LENGTH, MAX_REALM_LENGTH, MAX_REPLY_LENGTH,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Passive requestor parameters, from the query string (GET) or a form body (POST).
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
pub struct WsFedParams {
    /// Action: `wsignin1.0`, `wsignout1.0` or `wsignoutcleanup1.0`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wa: Option<String>,
    /// Relying party realm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wtrealm: Option<String>,
    /// Requested reply address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wreply: Option<String>,
    /// Opaque context echoed back to the relying party
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wctx: Option<String>,
    /// Maximum authentication age in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wfresh: Option<String>,
    /// Relying party's current time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wct: Option<String>,
    /// Home realm hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whr: Option<String>,
}

impl WsFedParams {
    pub fn action(&self) -> WsFedResult<WsFedAction> {
        let wa = self
            .wa
            .as_deref()
            .ok_or_else(|| WsFedError::InvalidRequest("Missing wa parameter".to_string()))?;
        WsFedAction::parse(wa)
            .ok_or_else(|| WsFedError::InvalidRequest(format!("Unsupported wa value: {wa}")))
    }

    /// Validate sign-in parameters and stamp the request with `now`.
    pub fn into_signin_request(self, now: DateTime<Utc>) -> WsFedResult<SignInRequest> {
        let realm = self
            .wtrealm
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| WsFedError::InvalidRequest("Missing wtrealm parameter".to_string()))?
            .to_string();
        if realm.len() > MAX_REALM_LENGTH {
            return Err(WsFedError::InvalidRequest("wtrealm too long".to_string()));
        }

        let reply = non_empty(self.wreply);
        if reply.as_ref().is_some_and(|r| r.len() > MAX_REPLY_LENGTH) {
            return Err(WsFedError::InvalidRequest("wreply too long".to_string()));
        }

        let context = non_empty(self.wctx);
        if context.as_ref().is_some_and(|c| c.len() > MAX_CONTEXT_LENGTH) {
            return Err(WsFedError::InvalidRequest("wctx too long".to_string()));
        }

        if self.wfresh.is_some() || self.wct.is_some() || self.whr.is_some() {
            tracing::debug!(
                realm = %realm,
                wfresh = ?self.wfresh,
                wct = ?self.wct,
                whr = ?self.whr,
                "Ignoring advisory WS-Federation parameters"
            );
        }

        Ok(SignInRequest {
            realm,
            reply,
            context,
            current_time: now,
        })
    }

    pub fn into_signout_request(self) -> WsFedResult<SignOutRequest> {
        let action = self.action()?;
        if action == WsFedAction::SignIn {
            return Err(WsFedError::InvalidRequest(
                "Expected a sign-out action".to_string(),
            ));
        }
        let reply = non_empty(self.wreply);
        if reply.as_ref().is_some_and(|r| r.len() > MAX_REPLY_LENGTH) {
            return Err(WsFedError::InvalidRequest("wreply too long".to_string()));
        }
        Ok(SignOutRequest {
            action,
            realm: non_empty(self.wtrealm.map(|r| r.trim().to_string())),
            reply,
        })
    }

    /// Re-encode as a query string (used to build login `returnUrl`s).
    pub fn to_query_string(&self) -> WsFedResult<String> {
        serde_urlencoded::to_string(self)
            .map_err(|e| WsFedError::Internal(format!("Failed to encode parameters: {e}")))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// A validated sign-in request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRequest {
    pub realm: String,
    pub reply: Option<String>,
    pub context: Option<String>,
    /// Instant the token validity window is computed from.
    pub current_time: DateTime<Utc>,
}

impl SignInRequest {
    pub fn new(realm: impl Into<String>, current_time: DateTime<Utc>) -> Self {
        Self {
            realm: realm.into(),
            reply: None,
            context: None,
            current_time,
        }
    }

    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutRequest {
    pub action: WsFedAction,
    pub realm: Option<String>,
    pub reply: Option<String>,
}
