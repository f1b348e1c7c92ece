//! Gateway adapters for gatewayctl.
//!
//! Every supported API-gateway product is driven through the same
//! [`GatewayAdapter`] contract. Vendor differences in authentication, paths,
//! pagination and payload shape stay inside the vendor modules; callers see
//! [`ApiDescriptor`](gatewayctl_core::ApiDescriptor)s and uniform error values.
//!
//! # Main types
//!
//! - [`GatewayAdapter`]: The capability contract every vendor implements.
//! - [`GatewayClient`]: Tagged dispatch over the built-in vendors plus custom adapters.
//! - [`GatewayFactory`]: Maps a gateway-type tag to a constructor.
//! - [`HttpTransport`]: Shared HTTP plumbing: auth headers, TLS trust, timeouts, error mapping.

/// The capability contract and the tagged client.
pub mod adapter;
/// AWS API Gateway (REST APIs).
pub mod aws;
/// Tag to constructor lookup.
pub mod factory;
/// Gravitee APIM management API v2.
pub mod gravitee;
/// Kong Admin API.
pub mod kong;
/// Shared HTTP transport.
pub mod transport;
/// Tyk Gateway API.
pub mod tyk;
/// WSO2 API Manager publisher API v4.
pub mod wso2;

pub use adapter::{GatewayAdapter, GatewayClient};
pub use aws::AwsAdapter;
pub use factory::{AdapterConstructor, GatewayFactory};
pub use gravitee::GraviteeAdapter;
pub use kong::KongAdapter;
pub use transport::{Auth, HttpTransport, TransportOptions};
pub use tyk::TykAdapter;
pub use wso2::Wso2Adapter;
