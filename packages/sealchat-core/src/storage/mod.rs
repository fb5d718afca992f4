//! # Storage Module
//!
//! Persistence of participant identities.
//!
//! - [`container`]: password-protected file format for one identity
//! - [`IdentityStore`]: directory of containers keyed by handle, with an
//!   in-memory cache shared by concurrent seal/unseal calls
//!
//! Nothing else is persisted: the shared message key lives only in memory and
//! envelopes are written only on explicit request.

pub mod container;
mod identity_store;

pub use container::{CONTAINER_EXTENSION, CONTAINER_VERSION};
pub use identity_store::IdentityStore;
