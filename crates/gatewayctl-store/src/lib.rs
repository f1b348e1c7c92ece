//! Persistence of gateway connection profiles.
//!
//! [`ConfigStore`] keeps one row per gateway name in a local SQLite file and
//! runs every sensitive `additional_config` value through the
//! [`CredentialCodec`](gatewayctl_security::CredentialCodec) on the way in and out.

/// The SQLite-backed config store.
pub mod store;

pub use store::{ConfigStore, StoredGateway};
