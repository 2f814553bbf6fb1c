//! `wsignout1.0` / `wsignoutcleanup1.0` handling.
//!
//! Terminating the host session is the host engine's job. This service only
//! decides where the browser goes next, applying the same reply policy as
//! sign-in so sign-out cannot be used as an open redirect.

use crate::error::{WsFedError, WsFedResult};
use crate::models::SignOutRequest;
use crate::services::registry::RelyingPartyRegistry;
use crate::services::reply_url::reply_url_matches;
use std::sync::Arc;

/// Where the browser is sent after sign-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutOutcome {
    Redirect(String),
    SignedOutPage,
}

pub struct SignOutService {
    registry: Arc<dyn RelyingPartyRegistry>,
}

impl SignOutService {
    #[must_use]
    pub fn new(registry: Arc<dyn RelyingPartyRegistry>) -> Self {
        Self { registry }
    }

    pub async fn sign_out(&self, request: &SignOutRequest) -> WsFedResult<SignOutOutcome> {
        let outcome = match (&request.realm, &request.reply) {
            (Some(realm), reply) => {
                let rp = self.registry.find_by_realm(realm).await?;
                match reply {
                    Some(reply) if reply_url_matches(reply, &rp.reply_urls) => {
                        SignOutOutcome::Redirect(reply.clone())
                    }
                    Some(reply) => {
                        return Err(WsFedError::InvalidReplyUrl {
                            realm: rp.realm,
                            reply: reply.clone(),
                        })
                    }
                    None => SignOutOutcome::SignedOutPage,
                }
            }
            (None, Some(reply)) => {
                if self.registry.default_reply_url() == Some(reply.as_str()) {
                    SignOutOutcome::Redirect(reply.clone())
                } else {
                    return Err(WsFedError::InvalidReplyUrl {
                        realm: String::new(),
                        reply: reply.clone(),
                    });
                }
            }
            (None, None) => SignOutOutcome::SignedOutPage,
        };

        tracing::info!(
            action = %request.action.as_str(),
            realm = ?request.realm,
            redirect = matches!(outcome, SignOutOutcome::Redirect(_)),
            "WS-Federation sign-out processed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WsFedErrorKind;
    use crate::services::registry::InMemoryRelyingPartyRegistry;
    use crate::wsfed::WsFedAction;
    use chrono::Utc;
    use xavyo_db::models::{CreateRelyingPartyRequest, RelyingParty};

    fn service(default_reply: Option<&str>) -> SignOutService {
        let req: CreateRelyingPartyRequest = serde_json::from_value(serde_json::json!({
            "realm": "urn:acme:app",
            "name": "Acme",
            "reply_urls": ["https://acme.example/cb", "https://acme.example/app/*"],
        }))
        .unwrap();
        let rp = RelyingParty::from_draft(req.into_draft(), Utc::now());
        let registry = InMemoryRelyingPartyRegistry::with_parties(
            vec![rp],
            default_reply.map(str::to_string),
        )
        .unwrap();
        SignOutService::new(Arc::new(registry))
    }

    fn request(realm: Option<&str>, reply: Option<&str>) -> SignOutRequest {
        SignOutRequest {
            action: WsFedAction::SignOut,
            realm: realm.map(str::to_string),
            reply: reply.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_registered_reply_redirects() {
        let outcome = service(None)
            .sign_out(&request(Some("urn:acme:app"), Some("https://acme.example/app/bye")))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SignOutOutcome::Redirect("https://acme.example/app/bye".into())
        );
    }

    #[tokio::test]
    async fn test_unregistered_reply_rejected() {
        let err = service(None)
            .sign_out(&request(Some("urn:acme:app"), Some("https://evil.example/")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::InvalidReplyUrl);

        let err = service(Some("https://portal.example/"))
            .sign_out(&request(None, Some("https://evil.example/")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::InvalidReplyUrl);
    }

    #[tokio::test]
    async fn test_realmless_sign_out() {
        let svc = service(Some("https://portal.example/"));
        assert_eq!(
            svc.sign_out(&request(None, Some("https://portal.example/")))
                .await
                .unwrap(),
            SignOutOutcome::Redirect("https://portal.example/".into())
        );
        assert_eq!(
            svc.sign_out(&request(None, None)).await.unwrap(),
            SignOutOutcome::SignedOutPage
        );
    }

    #[tokio::test]
    async fn test_unknown_realm_rejected() {
        let err = service(None)
            .sign_out(&request(Some("urn:unknown"), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), WsFedErrorKind::UnknownRelyingParty);
    }
}
