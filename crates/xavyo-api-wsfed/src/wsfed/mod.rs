//! WS-Federation protocol building blocks: parameter vocabulary, XML helpers,
//! claim handling, signing and encryption primitives.

pub mod claims;
pub mod encryption;
pub mod protocol;
pub mod signing;
pub mod xml;

pub use claims::{apply_claim_mapping, name_identifier, Claim};
pub use encryption::EncryptingCertificate;
pub use protocol::{token_type_uri, WsFedAction};
pub use signing::{DigestAlgorithm, SignatureAlgorithm, SigningCredentials};
