//! Database entity models.

pub mod idp_signing_key;
pub mod oauth_client;
pub mod relying_party;

pub use idp_signing_key::{IdpSigningKey, NewIdpSigningKey, SigningKeyInfo, UploadSigningKeyRequest};
pub use oauth_client::OAuthClient;
pub use relying_party::{
    ClaimMapping, ClaimPolicy, CreateRelyingPartyRequest, MappingEntry, RelyingParty,
    RelyingPartyDraft, TokenType, UpdateRelyingPartyRequest, REPLY_URL_WILDCARD,
};
