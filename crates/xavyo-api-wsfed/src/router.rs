//! WS-Federation route definitions and shared handler state

use crate::handlers::{
    admin::{
        create_relying_party, delete_relying_party, get_relying_party, list_relying_parties,
        list_signing_keys, update_relying_party, upload_signing_key,
    },
    get_metadata, passive_get, passive_post,
};
use crate::services::{
    ClaimsResolver, KeyMaterialProvider, MetadataPublisher, PostgresKeyMaterialProvider,
    RelyingPartyRegistry, RelyingPartyService, SignInResponseGenerator, SignOutService,
    SigningKeyService, StoreRelyingPartyRegistry, METADATA_PATH,
};
use crate::services::metadata_publisher::DEFAULT_METADATA_CACHE_SECONDS;
use crate::services::signin_generator::DEFAULT_CLOCK_SKEW_SECONDS;
use axum::{routing::get, Router};
use sqlx::PgPool;
use std::sync::Arc;
use xavyo_core::SharedClock;
use xavyo_db::PgConfigurationStore;

/// Passive requestor endpoint path.
pub const PASSIVE_PATH: &str = "/wsfed";

/// How a sign-in response reaches the relying party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Auto-submitting HTML form POST.
    #[default]
    FormPost,
    /// 302 with query parameters when the URL fits, form POST otherwise.
    RedirectWhenPossible,
}

/// Pipeline settings shared by the public handlers.
#[derive(Debug, Clone)]
pub struct WsFedConfig {
    /// This identity provider's identifier, used as token issuer.
    pub issuer: String,
    /// Public base URL, e.g. `https://idp.example`.
    pub base_url: String,
    /// Allowance subtracted from `notBefore`.
    pub clock_skew: chrono::Duration,
    /// Registry-wide reply fallback.
    pub default_reply_url: Option<String>,
    /// Where unauthenticated sign-ins are sent, with a `returnUrl`.
    pub login_url: Option<String>,
    pub response_mode: ResponseMode,
    pub metadata_cache_ttl: std::time::Duration,
}

impl WsFedConfig {
    pub fn new(issuer: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            clock_skew: chrono::Duration::seconds(DEFAULT_CLOCK_SKEW_SECONDS),
            default_reply_url: None,
            login_url: None,
            response_mode: ResponseMode::default(),
            metadata_cache_ttl: std::time::Duration::from_secs(DEFAULT_METADATA_CACHE_SECONDS),
        }
    }

    /// Absolute URL of the passive requestor endpoint.
    #[must_use]
    pub fn passive_endpoint(&self) -> String {
        format!("{}{PASSIVE_PATH}", self.base_url)
    }
}

/// Application state for the public WS-Federation handlers
#[derive(Clone)]
pub struct WsFedState {
    pub config: Arc<WsFedConfig>,
    /// Stamps `SignInRequest::current_time`.
    pub clock: SharedClock,
    pub generator: Arc<SignInResponseGenerator>,
    pub signout: Arc<SignOutService>,
    pub metadata: Arc<MetadataPublisher>,
}

impl WsFedState {
    /// Wire the pipeline from its collaborators.
    pub fn new(
        config: WsFedConfig,
        clock: SharedClock,
        registry: Arc<dyn RelyingPartyRegistry>,
        claims_resolver: Arc<dyn ClaimsResolver>,
        key_provider: Arc<dyn KeyMaterialProvider>,
    ) -> Self {
        let generator = SignInResponseGenerator::new(
            config.issuer.clone(),
            config.clock_skew,
            registry.clone(),
            claims_resolver,
            key_provider.clone(),
        );
        let metadata = MetadataPublisher::new(
            config.issuer.clone(),
            config.passive_endpoint(),
            key_provider,
            clock.clone(),
            config.metadata_cache_ttl,
        );
        Self {
            config: Arc::new(config),
            clock,
            generator: Arc::new(generator),
            signout: Arc::new(SignOutService::new(registry)),
            metadata: Arc::new(metadata),
        }
    }
}

/// Application state for the admin handlers
#[derive(Clone)]
pub struct WsFedAdminState {
    pub relying_parties: Arc<RelyingPartyService>,
    pub signing_keys: Arc<SigningKeyService>,
}

/// Create Postgres-backed public and admin state.
#[must_use]
pub fn create_wsfed_state(
    pool: PgPool,
    config: WsFedConfig,
    clock: SharedClock,
    key_encryption_key: [u8; 32],
    claims_resolver: Arc<dyn ClaimsResolver>,
) -> (WsFedState, WsFedAdminState) {
    let default_reply = config.default_reply_url.clone();
    let registry = Arc::new(StoreRelyingPartyRegistry::new(
        Arc::new(PgConfigurationStore::new(pool.clone())),
        default_reply.clone(),
    ));
    let key_provider = Arc::new(PostgresKeyMaterialProvider::new(
        pool.clone(),
        key_encryption_key.to_vec(),
    ));

    let admin = WsFedAdminState {
        relying_parties: Arc::new(RelyingPartyService::new(pool.clone(), default_reply)),
        signing_keys: Arc::new(SigningKeyService::new(pool, key_encryption_key.to_vec())),
    };
    let public = WsFedState::new(config, clock, registry, claims_resolver, key_provider);
    (public, admin)
}

/// Create public WS-Federation router (passive endpoint + metadata).
/// The host must provide an `Extension<Option<Principal>>`.
pub fn wsfed_public_router(state: WsFedState) -> Router {
    Router::new()
        .route(PASSIVE_PATH, get(passive_get).post(passive_post))
        .route(METADATA_PATH, get(get_metadata))
        .with_state(state)
}

/// Create WS-Federation admin router (relying party and signing key management).
/// These endpoints require authentication and admin role
pub fn wsfed_admin_router(state: WsFedAdminState) -> Router {
    Router::new()
        .route(
            "/relying-parties",
            get(list_relying_parties).post(create_relying_party),
        )
        .route(
            "/relying-parties/{id}",
            get(get_relying_party)
                .put(update_relying_party)
                .delete(delete_relying_party),
        )
        .route(
            "/signing-keys",
            get(list_signing_keys).post(upload_signing_key),
        )
        .with_state(state)
}
