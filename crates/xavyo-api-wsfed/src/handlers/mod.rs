//! HTTP handlers for WS-Federation endpoints

pub mod admin;
pub mod metadata;
pub mod passive;

pub use metadata::get_metadata;
pub use passive::{passive_get, passive_post};
