//! Core types and error definitions for gatewayctl.
//!
//! This crate provides the foundational types shared across all gatewayctl crates:
//! the unified error taxonomy, the persisted gateway connection profile, and the
//! normalized API shapes every vendor adapter speaks.
//!
//! # Main types
//!
//! - [`GatewayctlError`]: Unified error enum for all gatewayctl subsystems.
//! - [`GatewayctlResult`]: Convenience alias for `Result<T, GatewayctlError>`.
//! - [`GatewayConfig`]: One gateway connection profile.
//! - [`GatewayKind`]: The built-in vendor tags.
//! - [`ApiDescriptor`]: Normalized view of an API returned by a gateway.
//! - [`ApiDefinition`]: Normalized input for creating or updating an API.

/// Gateway connection profiles.
pub mod config;
/// Normalized API descriptors and definitions.
pub mod descriptor;
/// Error taxonomy.
pub mod error;
/// Built-in vendor tags.
pub mod kind;

pub use config::GatewayConfig;
pub use descriptor::{merge_object, ApiDefinition, ApiDescriptor};
pub use error::{is_error_value, GatewayctlError, GatewayctlResult};
pub use kind::GatewayKind;
