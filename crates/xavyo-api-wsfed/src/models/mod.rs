//! Request and response types for the WS-Federation API

pub mod principal;
pub mod requests;
pub mod responses;

pub use principal::*;
pub use requests::*;
pub use responses::*;
