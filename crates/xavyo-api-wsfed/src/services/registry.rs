//! Relying party registry: the read path of the sign-in pipeline.
//!
//! Realms are opaque URIs. Lookup trims surrounding whitespace and then
//! compares exactly, so `urn:acme:app` and `urn:acme:app/` are distinct
//! parties. Disabled parties are reported as unknown.

use crate::error::{WsFedError, WsFedResult};
use crate::services::relying_party_service::validate_draft;
use crate::services::signin_generator::SignInState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use xavyo_db::models::RelyingParty;
use xavyo_db::RelyingPartyConfigurationStore;

#[async_trait]
pub trait RelyingPartyRegistry: Send + Sync {
    /// Exact, case-sensitive lookup of an enabled relying party.
    async fn find_by_realm(&self, realm: &str) -> WsFedResult<RelyingParty>;

    /// Deployment-wide reply fallback.
    fn default_reply_url(&self) -> Option<&str>;
}

/// Snapshot-consistent in-memory registry.
///
/// Readers clone the current `Arc` snapshot; writers build a new map and
/// swap it in, so a lookup never observes a half-applied update.
#[derive(Debug, Default)]
pub struct InMemoryRelyingPartyRegistry {
    snapshot: RwLock<Arc<HashMap<String, RelyingParty>>>,
    default_reply_url: Option<String>,
}

impl InMemoryRelyingPartyRegistry {
    #[must_use]
    pub fn new(default_reply_url: Option<String>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            default_reply_url,
        }
    }

    /// Build a registry from a full set of parties.
    pub fn with_parties(
        parties: Vec<RelyingParty>,
        default_reply_url: Option<String>,
    ) -> WsFedResult<Self> {
        let map = build_map(parties, default_reply_url.as_deref())?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(map)),
            default_reply_url,
        })
    }

    /// Insert or replace the party registered under its realm.
    pub async fn upsert(&self, relying_party: RelyingParty) -> WsFedResult<()> {
        validate_draft(&relying_party.to_draft(), self.default_reply_url.as_deref())?;
        let mut guard = self.snapshot.write().await;
        let mut next = HashMap::clone(&guard);
        next.insert(relying_party.realm.clone(), relying_party);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Atomically replace every registered party.
    pub async fn replace_all(&self, parties: Vec<RelyingParty>) -> WsFedResult<()> {
        let map = build_map(parties, self.default_reply_url.as_deref())?;
        *self.snapshot.write().await = Arc::new(map);
        Ok(())
    }

    /// Returns `true` if a party was removed.
    pub async fn remove(&self, realm: &str) -> bool {
        let mut guard = self.snapshot.write().await;
        if !guard.contains_key(realm) {
            return false;
        }
        let mut next = HashMap::clone(&guard);
        next.remove(realm);
        *guard = Arc::new(next);
        true
    }

    /// Current snapshot. Later writes do not affect it.
    pub async fn snapshot(&self) -> Arc<HashMap<String, RelyingParty>> {
        Arc::clone(&*self.snapshot.read().await)
    }
}

fn build_map(
    parties: Vec<RelyingParty>,
    default_reply_url: Option<&str>,
) -> WsFedResult<HashMap<String, RelyingParty>> {
    let mut map = HashMap::with_capacity(parties.len());
    for rp in parties {
        validate_draft(&rp.to_draft(), default_reply_url)?;
        if map.contains_key(&rp.realm) {
            return Err(WsFedError::RealmConflict(rp.realm));
        }
        map.insert(rp.realm.clone(), rp);
    }
    Ok(map)
}

fn enabled_or_unknown(realm: &str, found: Option<RelyingParty>) -> WsFedResult<RelyingParty> {
    match found {
        Some(rp) if rp.enabled => Ok(rp),
        Some(_) => {
            tracing::info!(realm = %realm, "Sign-in for disabled relying party");
            Err(WsFedError::UnknownRelyingParty(realm.to_string()))
        }
        None => Err(WsFedError::UnknownRelyingParty(realm.to_string())),
    }
}

#[async_trait]
impl RelyingPartyRegistry for InMemoryRelyingPartyRegistry {
    async fn find_by_realm(&self, realm: &str) -> WsFedResult<RelyingParty> {
        let realm = realm.trim();
        let snapshot = self.snapshot().await;
        enabled_or_unknown(realm, snapshot.get(realm).cloned())
    }

    fn default_reply_url(&self) -> Option<&str> {
        self.default_reply_url.as_deref()
    }
}

/// Registry backed by the persistent configuration store.
pub struct StoreRelyingPartyRegistry {
    store: Arc<dyn RelyingPartyConfigurationStore>,
    default_reply_url: Option<String>,
}

impl StoreRelyingPartyRegistry {
    #[must_use]
    pub fn new(
        store: Arc<dyn RelyingPartyConfigurationStore>,
        default_reply_url: Option<String>,
    ) -> Self {
        Self {
            store,
            default_reply_url,
        }
    }
}

#[async_trait]
impl RelyingPartyRegistry for StoreRelyingPartyRegistry {
    async fn find_by_realm(&self, realm: &str) -> WsFedResult<RelyingParty> {
        let realm = realm.trim();
        let found = self
            .store
            .find_relying_party(realm)
            .await
            .map_err(|e| WsFedError::collaborator(SignInState::RealmValidated, e))?;
        enabled_or_unknown(realm, found)
    }

    fn default_reply_url(&self) -> Option<&str> {
        self.default_reply_url.as_deref()
    }
}
