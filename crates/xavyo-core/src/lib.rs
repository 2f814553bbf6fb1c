//! xavyo Core Library
//!
//! Shared types for the xavyo WS-Federation identity provider.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (RelyingPartyId)
//! - [`clock`] - Injectable time source (Clock, SystemClock, FixedClock)
//!
//! # Example
//!
//! ```
//! use xavyo_core::{Clock, FixedClock, RelyingPartyId};
//!
//! let id = RelyingPartyId::new();
//! let clock = FixedClock::at_unix(1_700_000_000);
//! assert_eq!(clock.now().timestamp(), 1_700_000_000);
//! assert_ne!(id, RelyingPartyId::new());
//! ```

pub mod clock;
pub mod ids;

pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use ids::{ParseIdError, RelyingPartyId};
