use crate::adapter::GatewayClient;
use crate::aws::AwsAdapter;
use crate::gravitee::GraviteeAdapter;
use crate::kong::KongAdapter;
use crate::tyk::TykAdapter;
use crate::wso2::Wso2Adapter;
use gatewayctl_core::{GatewayConfig, GatewayKind, GatewayctlError, GatewayctlResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds an adapter from a gateway config.
pub type AdapterConstructor =
    Arc<dyn Fn(GatewayConfig) -> GatewayctlResult<GatewayClient> + Send + Sync>;

/// Lookup from gateway-type tag to adapter constructor.
///
/// Built once at startup and passed to whoever needs adapters. Tags are
/// matched case-insensitively.
#[derive(Clone)]
pub struct GatewayFactory {
    constructors: BTreeMap<String, AdapterConstructor>,
}

impl GatewayFactory {
    /// Factory with the five built-in vendors registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        for kind in GatewayKind::ALL {
            factory.register(kind.as_str(), Arc::new(builtin(kind)));
        }
        factory
    }

    /// Factory with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register(&mut self, tag: &str, constructor: AdapterConstructor) {
        let tag = normalize(tag);
        debug!(gateway_type = %tag, "Registered gateway type");
        self.constructors.insert(tag, constructor);
    }

    /// Registered tags, sorted.
    pub fn list_supported_types(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Whether `tag` has a constructor.
    pub fn supports(&self, tag: &str) -> bool {
        self.constructors.contains_key(&normalize(tag))
    }

    /// Construct the adapter for `tag`.
    ///
    /// Fails with [`GatewayctlError::UnsupportedGatewayType`] for unknown tags,
    /// or with the adapter's own configuration error.
    pub fn create(&self, tag: &str, config: GatewayConfig) -> GatewayctlResult<GatewayClient> {
        let tag = normalize(tag);
        let constructor = self
            .constructors
            .get(&tag)
            .ok_or_else(|| GatewayctlError::UnsupportedGatewayType(tag.clone()))?;
        let client = constructor(config)?;
        info!(gateway_type = %tag, "Created gateway adapter");
        Ok(client)
    }
}

impl Default for GatewayFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GatewayFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayFactory")
            .field("types", &self.list_supported_types())
            .finish()
    }
}

fn builtin(kind: GatewayKind) -> fn(GatewayConfig) -> GatewayctlResult<GatewayClient> {
    match kind {
        GatewayKind::Kong => |c| Ok(GatewayClient::Kong(KongAdapter::new(c)?)),
        GatewayKind::Wso2 => |c| Ok(GatewayClient::Wso2(Wso2Adapter::new(c)?)),
        GatewayKind::Tyk => |c| Ok(GatewayClient::Tyk(TykAdapter::new(c)?)),
        GatewayKind::Gravitee => |c| Ok(GatewayClient::Gravitee(GraviteeAdapter::new(c)?)),
        GatewayKind::Aws => |c| Ok(GatewayClient::Aws(AwsAdapter::new(c)?)),
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase()
}
