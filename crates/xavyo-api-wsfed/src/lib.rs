//! WS-Federation passive requestor library for xavyo
//!
//! This crate provides the WS-Federation identity provider surface:
//! - Sign-in (`wsignin1.0`) with SAML 1.1, SAML 2.0 or JWT tokens
//! - Sign-out (`wsignout1.0`, `wsignoutcleanup1.0`) with reply validation
//! - Federation metadata publishing with signing key rollover
//! - Admin endpoints for relying party and signing key configuration
//!
//! Authentication itself belongs to the host: the public router expects an
//! `Extension<Option<Principal>>` on every request.

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod wsfed;

pub use error::{WsFedError, WsFedErrorKind, WsFedResult};
pub use models::{Principal, SecurityToken, SignInRequest, SignInResponse, WsFedParams};
pub use router::{
    create_wsfed_state, wsfed_admin_router, wsfed_public_router, ResponseMode, WsFedAdminState,
    WsFedConfig, WsFedState, PASSIVE_PATH,
};
pub use services::{
    ClaimsResolver, InMemoryClaimsResolver, InMemoryKeyMaterialProvider,
    InMemoryRelyingPartyRegistry, KeyMaterialProvider, MetadataPublisher, PrincipalClaimsResolver,
    RelyingPartyRegistry, SignInResponseGenerator, SignInState, SigningKey, TokenBuilder,
    METADATA_PATH,
};
