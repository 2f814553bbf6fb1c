//! Admin handlers for WS-Federation configuration

pub mod relying_parties;
pub mod signing_keys;

pub use relying_parties::{
    create_relying_party, delete_relying_party, get_relying_party, list_relying_parties,
    update_relying_party,
};
pub use signing_keys::{list_signing_keys, upload_signing_key};
