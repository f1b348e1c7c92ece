//! Security primitives for gatewayctl.
//!
//! Provides field-level encryption of stored gateway credentials, loading of
//! trusted certificates for gateway connections, and redaction of secrets in
//! log output.
//!
//! # Main types
//!
//! - [`CredentialCodec`]: Encrypts and decrypts sensitive `additional_config` values.
//! - [`CodecDirection`]: Which way [`CredentialCodec::process_config`] transforms.
//! - [`TrustPolicy`]: How a gateway connection decides which certificates to trust.

/// Field-level credential encryption.
pub mod codec;
/// Secret redaction for logs.
pub mod redact;
/// Certificate trust for outbound gateway connections.
pub mod tls;

pub use codec::{CodecDirection, CredentialCodec, ENCRYPTION_KEY_ENV, SENSITIVE_FIELDS};
pub use redact::redact;
pub use tls::TrustPolicy;
