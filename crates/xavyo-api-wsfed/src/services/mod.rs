//! Business logic services for WS-Federation

pub mod claims_resolver;
pub mod key_provider;
pub mod metadata_publisher;
pub mod registry;
pub mod relying_party_service;
pub mod reply_url;
pub mod signin_generator;
pub mod signing_key_service;
pub mod signout_service;
pub mod token_builder;

pub use claims_resolver::{
    ClaimsResolutionError, ClaimsResolver, InMemoryClaimsResolver, PrincipalClaimsResolver,
};
pub use key_provider::{
    InMemoryKeyMaterialProvider, KeyMaterialError, KeyMaterialProvider,
    PostgresKeyMaterialProvider, PublishedKey, SigningKey,
};
pub use metadata_publisher::{MetadataDocument, MetadataPublisher, METADATA_PATH};
pub use registry::{InMemoryRelyingPartyRegistry, RelyingPartyRegistry, StoreRelyingPartyRegistry};
pub use relying_party_service::RelyingPartyService;
pub use signin_generator::{SignInResponseGenerator, SignInState};
pub use signing_key_service::SigningKeyService;
pub use signout_service::{SignOutOutcome, SignOutService};
pub use token_builder::{TokenBuilder, TokenRequest};
