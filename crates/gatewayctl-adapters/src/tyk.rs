use crate::adapter::{descriptors, GatewayAdapter};
use crate::transport::{Auth, HttpTransport, TransportOptions};
use async_trait::async_trait;
use gatewayctl_core::{
    merge_object, ApiDefinition, ApiDescriptor, GatewayConfig, GatewayKind, GatewayctlError,
    GatewayctlResult,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

const ID_KEYS: [&str; 2] = ["api_id", "id"];

/// Tyk Gateway API adapter.
///
/// Authenticates with the shared `x-tyk-authorization` secret. Changes are
/// picked up by the gateway after [`TykAdapter::reload_group`].
#[derive(Debug)]
pub struct TykAdapter {
    transport: HttpTransport,
}

impl TykAdapter {
    /// Build the adapter. `tyk_auth_secret` is required.
    pub fn new(config: GatewayConfig) -> GatewayctlResult<Self> {
        config.validate()?;
        let secret = config.require_str("tyk_auth_secret", "Tyk")?.to_string();
        let transport = HttpTransport::new(
            &config,
            GatewayKind::Tyk,
            config.base_url(),
            Auth::Header {
                name: "x-tyk-authorization",
                value: secret,
            },
            TransportOptions::default(),
        )?;
        debug!(gateway = %config.name, url = %config.base_url(), "Initialized Tyk adapter");
        Ok(Self { transport })
    }

    /// Ask every gateway node in the group to reload its API definitions.
    pub async fn reload_group(&self) -> GatewayctlResult<Value> {
        let result = self.transport.get("/tyk/reload/group", &[]).await?;
        info!(gateway = %self.name(), "Requested Tyk group reload");
        Ok(result)
    }

    fn action_result(
        &self,
        response: Value,
        fallback_id: Option<&str>,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        let id = response
            .get("key")
            .and_then(Value::as_str)
            .or(fallback_id)
            .ok_or_else(|| {
                GatewayctlError::Decode(format!("Tyk response has no key: {response}"))
            })?;

        let mut api = ApiDescriptor::new(id, definition.name.clone());
        api.version = definition.version.clone();
        api.context = definition.context.clone();
        api.description = definition.description.clone();
        for key in ["status", "action"] {
            if let Some(value) = response.get(key) {
                api.vendor.insert(key.into(), value.clone());
            }
        }
        Ok(api)
    }
}

#[async_trait]
impl GatewayAdapter for TykAdapter {
    fn gateway_type(&self) -> &str {
        GatewayKind::Tyk.as_str()
    }

    fn name(&self) -> &str {
        self.transport.gateway()
    }

    async fn get_apis(&self) -> Vec<ApiDescriptor> {
        match self.transport.get("/tyk/apis", &[]).await {
            Ok(Value::Array(items)) => {
                let apis = descriptors(self.name(), items, &ID_KEYS);
                info!(gateway = %self.name(), count = apis.len(), "Fetched Tyk APIs");
                apis
            }
            Ok(other) => {
                warn!(gateway = %self.name(), body = %other, "Tyk API list is not an array");
                Vec::new()
            }
            Err(e) => {
                error!(gateway = %self.name(), error = %e, "Failed to list Tyk APIs");
                Vec::new()
            }
        }
    }

    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor> {
        if definition.name.trim().is_empty() {
            return Err(GatewayctlError::InvalidDefinition("Tyk APIs require a name".into()));
        }
        let payload = api_payload(None, definition);
        let response = self.transport.post("/tyk/apis", &payload).await?;
        let api = self.action_result(response, None, definition)?;
        info!(gateway = %self.name(), api_id = %api.id, "Created Tyk API");
        Ok(api)
    }

    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        let payload = api_payload(Some(api_id), definition);
        let response = self
            .transport
            .put(&format!("/tyk/apis/{api_id}"), &payload)
            .await?;
        let api = self.action_result(response, Some(api_id), definition)?;
        info!(gateway = %self.name(), api_id = %api_id, "Updated Tyk API");
        Ok(api)
    }

    async fn delete_api(&self, api_id: &str) -> bool {
        match self.transport.delete(&format!("/tyk/apis/{api_id}")).await {
            Ok(_) => {
                info!(gateway = %self.name(), api_id = %api_id, "Deleted Tyk API");
                true
            }
            Err(e) => {
                error!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "Failed to delete Tyk API"
                );
                false
            }
        }
    }

    // Tyk analytics live in the dashboard; the gateway only has the definition.
    async fn get_api_metrics(&self, api_id: &str) -> Value {
        self.transport
            .get(&format!("/tyk/apis/{api_id}"), &[])
            .await
            .unwrap_or_else(|e| e.to_error_value())
    }

    async fn test_connection(&self) -> bool {
        let ok = self.transport.get("/tyk/apis", &[]).await.is_ok();
        info!(gateway = %self.name(), ok, "Tyk connection test");
        ok
    }
}

/// Build a Tyk API definition. `vendor` fields override the generated ones.
fn api_payload(api_id: Option<&str>, definition: &ApiDefinition) -> Value {
    let listen_path = definition
        .context
        .clone()
        .unwrap_or_else(|| format!("/{}/", slug(&definition.name)));

    let mut api = Map::new();
    api.insert("name".into(), json!(definition.name));
    if let Some(id) = api_id {
        api.insert("api_id".into(), json!(id));
    }
    api.insert("active".into(), json!(true));
    api.insert("use_keyless".into(), json!(true));
    api.insert(
        "proxy".into(),
        json!({
            "listen_path": listen_path,
            "target_url": definition.backend_url.clone().unwrap_or_default(),
            "strip_listen_path": true,
        }),
    );
    let version = definition.version.as_deref().unwrap_or("Default");
    let mut versions = Map::new();
    versions.insert(version.to_string(), json!({ "name": version }));
    api.insert(
        "version_data".into(),
        json!({
            "not_versioned": definition.version.is_none(),
            "versions": versions,
        }),
    );
    merge_object(&mut api, &definition.vendor);
    Value::Object(api)
}

fn slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
