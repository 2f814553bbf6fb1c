//! Persistence layer for the xavyo WS-Federation identity provider.
//!
//! - [`models`] - row types and their queries (relying parties, signing keys,
//!   the host's OAuth clients)
//! - [`store`] - read interfaces over the configuration store, composable in
//!   one consistent snapshot
//! - [`migrations`] - embedded schema migrations

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod store;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use store::{
    ClientConfigurationStore, PgConfigurationStore, PgReadView, RelyingPartyConfigurationStore,
};
