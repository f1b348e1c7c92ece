use crate::adapter::{created, descriptors, GatewayAdapter};
use crate::transport::{Auth, HttpTransport, TransportOptions};
use async_trait::async_trait;
use gatewayctl_core::{
    merge_object, ApiDefinition, ApiDescriptor, GatewayConfig, GatewayKind, GatewayctlError,
    GatewayctlResult,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

const DEFAULT_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const SERVICE_KEYS: [&str; 8] = [
    "host",
    "port",
    "path",
    "protocol",
    "retries",
    "connect_timeout",
    "write_timeout",
    "read_timeout",
];
const ROUTE_KEYS: [&str; 5] = ["protocols", "strip_path", "preserve_host", "hosts", "headers"];

/// Kong Admin API adapter.
///
/// An "API" is a Kong service; creation also adds one route pointing at it.
/// The `apikey` header is sent when `api_key` is configured.
#[derive(Debug)]
pub struct KongAdapter {
    transport: HttpTransport,
}

impl KongAdapter {
    /// Build the adapter. Credentials are optional for Kong.
    pub fn new(config: GatewayConfig) -> GatewayctlResult<Self> {
        config.validate()?;
        let auth = match config.get_str("api_key") {
            Some(key) => Auth::Header {
                name: "apikey",
                value: key.to_string(),
            },
            None => Auth::None,
        };
        let transport = HttpTransport::new(
            &config,
            GatewayKind::Kong,
            config.base_url(),
            auth,
            TransportOptions { tls_fallback: true },
        )?;
        debug!(gateway = %config.name, url = %config.base_url(), "Initialized Kong adapter");
        Ok(Self { transport })
    }

    async fn list_services(&self) -> GatewayctlResult<Vec<Value>> {
        let mut services = Vec::new();
        let mut next = "/services".to_string();
        loop {
            let page = self.transport.get(&next, &[]).await?;
            services.extend(data_of(&page));
            match page.get("next").and_then(Value::as_str) {
                Some(link) if !link.is_empty() && link != next => next = link.to_string(),
                _ => break,
            }
        }
        Ok(services)
    }

    async fn service_routes(&self, api_id: &str) -> GatewayctlResult<Vec<Value>> {
        let page = self
            .transport
            .get(&format!("/services/{api_id}/routes"), &[])
            .await?;
        Ok(data_of(&page))
    }

    async fn try_delete(&self, api_id: &str) -> GatewayctlResult<()> {
        for route in self.service_routes(api_id).await? {
            if let Some(route_id) = route.get("id").and_then(Value::as_str) {
                self.transport.delete(&format!("/routes/{route_id}")).await?;
            }
        }
        self.transport.delete(&format!("/services/{api_id}")).await?;
        Ok(())
    }

    async fn try_metrics(&self, api_id: &str) -> GatewayctlResult<Value> {
        let service = self.transport.get(&format!("/services/{api_id}"), &[]).await?;
        let routes = self.service_routes(api_id).await?;
        let plugins = self
            .transport
            .get(&format!("/services/{api_id}/plugins"), &[])
            .await?;
        Ok(json!({
            "api_id": api_id,
            "service": service,
            "routes": routes,
            "plugins": data_of(&plugins),
        }))
    }
}

#[async_trait]
impl GatewayAdapter for KongAdapter {
    fn gateway_type(&self) -> &str {
        GatewayKind::Kong.as_str()
    }

    fn name(&self) -> &str {
        self.transport.gateway()
    }

    async fn get_apis(&self) -> Vec<ApiDescriptor> {
        match self.list_services().await {
            Ok(services) => {
                let apis = descriptors(self.name(), services, &["id"]);
                info!(gateway = %self.name(), count = apis.len(), "Fetched Kong services");
                apis
            }
            Err(e) => {
                error!(gateway = %self.name(), error = %e, "Failed to list Kong services");
                Vec::new()
            }
        }
    }

    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor> {
        if definition.name.trim().is_empty() {
            return Err(GatewayctlError::InvalidDefinition(
                "Kong services require a name".into(),
            ));
        }

        let mut service = service_payload(definition);
        service.insert("name".into(), json!(definition.name));
        let service = self.transport.post("/services", &Value::Object(service)).await?;
        let service_id = service
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayctlError::Decode(format!("Kong service has no id: {service}")))?
            .to_string();

        let mut route = route_payload(definition);
        route.insert("service".into(), json!({ "id": service_id }));
        let route = match self.transport.post("/routes", &Value::Object(route)).await {
            Ok(route) => route,
            Err(e) => {
                warn!(
                    gateway = %self.name(),
                    service = %service_id,
                    "Route creation failed, removing the new service"
                );
                if let Err(cleanup) = self
                    .transport
                    .delete(&format!("/services/{service_id}"))
                    .await
                {
                    error!(
                        gateway = %self.name(),
                        error = %cleanup,
                        "Failed to remove orphaned service"
                    );
                }
                return Err(e);
            }
        };

        info!(gateway = %self.name(), api_id = %service_id, "Created Kong service and route");
        Ok(created(service, &["id"], "Kong service")?.with_vendor_field("route", route))
    }

    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        let mut service = service_payload(definition);
        if !definition.name.trim().is_empty() {
            service.insert("name".into(), json!(definition.name));
        }
        let service = self
            .transport
            .patch(&format!("/services/{api_id}"), &Value::Object(service))
            .await?;

        let mut api = created(service, &["id"], "Kong service")?;
        if let Some(route_id) = &definition.route_id {
            let route = self
                .transport
                .patch(
                    &format!("/routes/{route_id}"),
                    &Value::Object(route_payload(definition)),
                )
                .await?;
            api = api.with_vendor_field("route", route);
        }

        info!(gateway = %self.name(), api_id = %api_id, "Updated Kong service");
        Ok(api)
    }

    async fn delete_api(&self, api_id: &str) -> bool {
        match self.try_delete(api_id).await {
            Ok(()) => {
                info!(gateway = %self.name(), api_id = %api_id, "Deleted Kong service");
                true
            }
            Err(e) => {
                error!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "Failed to delete Kong service"
                );
                false
            }
        }
    }

    async fn get_api_metrics(&self, api_id: &str) -> Value {
        self.try_metrics(api_id)
            .await
            .unwrap_or_else(|e| e.to_error_value())
    }

    async fn test_connection(&self) -> bool {
        let ok = self.transport.get("/services", &[]).await.is_ok();
        info!(gateway = %self.name(), ok, "Kong connection test");
        ok
    }
}

fn data_of(page: &Value) -> Vec<Value> {
    page.get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn service_payload(definition: &ApiDefinition) -> Map<String, Value> {
    let mut service = Map::new();
    if let Some(url) = &definition.backend_url {
        service.insert("url".into(), json!(url));
    }
    service.insert("retries".into(), definition.vendor_or("retries", json!(5)));
    for key in ["connect_timeout", "write_timeout", "read_timeout"] {
        service.insert(key.into(), definition.vendor_or(key, json!(DEFAULT_TIMEOUT_MS)));
    }
    merge_object(&mut service, &pick(&definition.vendor, &SERVICE_KEYS));
    service
}

fn route_payload(definition: &ApiDefinition) -> Map<String, Value> {
    let paths = if !definition.paths.is_empty() {
        json!(definition.paths)
    } else if let Some(context) = &definition.context {
        json!([context])
    } else {
        json!(["/"])
    };
    let methods = if definition.methods.is_empty() {
        json!(DEFAULT_METHODS)
    } else {
        json!(definition.methods)
    };

    let mut route = Map::new();
    route.insert("paths".into(), paths);
    route.insert("methods".into(), methods);
    route.insert("protocols".into(), json!(["http", "https"]));
    route.insert("strip_path".into(), json!(true));
    route.insert("preserve_host".into(), json!(false));
    merge_object(&mut route, &pick(&definition.vendor, &ROUTE_KEYS));
    route
}

fn pick(fields: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(key, _)| keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
