use crate::aws::AwsAdapter;
use crate::gravitee::GraviteeAdapter;
use crate::kong::KongAdapter;
use crate::tyk::TykAdapter;
use crate::wso2::Wso2Adapter;
use async_trait::async_trait;
use gatewayctl_core::{ApiDefinition, ApiDescriptor, GatewayctlError, GatewayctlResult};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Capability contract shared by every gateway vendor.
///
/// Implementations never panic and never surface raw transport errors from
/// the read aggregates: `get_apis` degrades to an empty list and
/// `test_connection` to `false`. Writes hand back the error as a value, and
/// `get_api_metrics` always returns a JSON object (the error mapping on failure).
///
/// To add a new vendor:
/// 1. Create a module next to `kong.rs` and implement `GatewayAdapter`
/// 2. Add a variant to [`GatewayClient`]
/// 3. Register the constructor in `GatewayFactory::new()`
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    /// Vendor tag, as persisted next to the config (`kong`, `wso2`, ...).
    fn gateway_type(&self) -> &str;

    /// Name of the configured gateway.
    fn name(&self) -> &str;

    /// Every API the gateway knows about, across all pages.
    async fn get_apis(&self) -> Vec<ApiDescriptor>;

    /// Create an API from a normalized definition.
    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor>;

    /// Update the API `api_id`.
    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor>;

    /// Delete the API `api_id`. Returns `true` on success.
    async fn delete_api(&self, api_id: &str) -> bool;

    /// Best-effort details and counters for one API.
    async fn get_api_metrics(&self, api_id: &str) -> Value;

    /// One lightweight authenticated request.
    async fn test_connection(&self) -> bool;
}

/// A constructed adapter for one of the supported vendors.
///
/// The built-in vendors are closed variants so vendor-only operations stay
/// reachable ([`GatewayClient::as_wso2`], [`GatewayClient::as_tyk`]); adapters
/// registered from outside this crate travel as [`GatewayClient::Custom`].
pub enum GatewayClient {
    /// Kong Admin API.
    Kong(KongAdapter),
    /// WSO2 API Manager.
    Wso2(Wso2Adapter),
    /// Tyk Gateway.
    Tyk(TykAdapter),
    /// Gravitee APIM.
    Gravitee(GraviteeAdapter),
    /// AWS API Gateway.
    Aws(AwsAdapter),
    /// Any other implementation of the contract.
    Custom(Box<dyn GatewayAdapter>),
}

impl GatewayClient {
    /// Wrap an adapter implemented outside this crate.
    pub fn from_adapter(adapter: Box<dyn GatewayAdapter>) -> Self {
        Self::Custom(adapter)
    }

    /// The WSO2 adapter, for its version, documentation and subscription calls.
    pub fn as_wso2(&self) -> Option<&Wso2Adapter> {
        match self {
            Self::Wso2(adapter) => Some(adapter),
            _ => None,
        }
    }

    /// The Tyk adapter, for hot reloads.
    pub fn as_tyk(&self) -> Option<&TykAdapter> {
        match self {
            Self::Tyk(adapter) => Some(adapter),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn GatewayAdapter {
        match self {
            Self::Kong(adapter) => adapter,
            Self::Wso2(adapter) => adapter,
            Self::Tyk(adapter) => adapter,
            Self::Gravitee(adapter) => adapter,
            Self::Aws(adapter) => adapter,
            Self::Custom(adapter) => adapter.as_ref(),
        }
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("gateway_type", &self.gateway_type())
            .field("name", &self.name())
            .finish()
    }
}

#[async_trait]
impl GatewayAdapter for GatewayClient {
    fn gateway_type(&self) -> &str {
        self.inner().gateway_type()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    async fn get_apis(&self) -> Vec<ApiDescriptor> {
        self.inner().get_apis().await
    }

    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor> {
        self.inner().create_api(definition).await
    }

    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        self.inner().update_api(api_id, definition).await
    }

    async fn delete_api(&self, api_id: &str) -> bool {
        self.inner().delete_api(api_id).await
    }

    async fn get_api_metrics(&self, api_id: &str) -> Value {
        self.inner().get_api_metrics(api_id).await
    }

    async fn test_connection(&self) -> bool {
        self.inner().test_connection().await
    }
}

/// Upper bound on pages fetched by one paginated listing.
pub(crate) const MAX_PAGES: u64 = 1000;

/// Collected entries of a paginated listing, deduplicated by `id`.
#[derive(Debug, Default)]
pub(crate) struct PageCollector {
    items: Vec<Value>,
    seen: HashSet<String>,
}

impl PageCollector {
    /// Append a page, skipping ids already collected. Returns how many entries were new.
    pub(crate) fn absorb(&mut self, batch: Vec<Value>) -> usize {
        let before = self.items.len();
        for item in batch {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                if !self.seen.insert(id.to_string()) {
                    continue;
                }
            }
            self.items.push(item);
        }
        self.items.len() - before
    }

    /// Number of entries collected so far.
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn into_items(self) -> Vec<Value> {
        self.items
    }
}

/// Collect a vendor list into descriptors, logging entries that had no id.
pub(crate) fn descriptors(
    gateway: &str,
    items: Vec<Value>,
    id_keys: &[&str],
) -> Vec<ApiDescriptor> {
    let total = items.len();
    let apis: Vec<ApiDescriptor> = items
        .into_iter()
        .filter_map(|item| descriptor(item, id_keys))
        .collect();
    if apis.len() < total {
        warn!(
            gateway = %gateway,
            skipped = total - apis.len(),
            "Skipped API entries without an identifier"
        );
    }
    apis
}

/// Normalize one vendor object, trying each id key in turn.
pub(crate) fn descriptor(item: Value, id_keys: &[&str]) -> Option<ApiDescriptor> {
    let key = id_keys
        .iter()
        .find(|key| item.get(**key).is_some_and(|v| !v.is_null()))?;
    ApiDescriptor::from_vendor(item, key)
}

/// Normalize a vendor write response, failing when it carries no id.
pub(crate) fn created(
    item: Value,
    id_keys: &[&str],
    what: &str,
) -> GatewayctlResult<ApiDescriptor> {
    descriptor(item.clone(), id_keys).ok_or_else(|| {
        GatewayctlError::Decode(format!("{what} response has no identifier: {item}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collector_counts_only_new_ids() {
        let mut pages = PageCollector::default();
        assert_eq!(pages.absorb(vec![json!({"id": "a"}), json!({"id": "b"})]), 2);
        assert_eq!(pages.absorb(vec![json!({"id": "b"}), json!({"id": "c"})]), 1);
        assert_eq!(pages.absorb(vec![json!({"id": "a"})]), 0);
        assert_eq!(pages.len(), 3);
        let ids: Vec<Value> = pages.into_items().into_iter().map(|i| i["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b"), json!("c")]);
    }
}
