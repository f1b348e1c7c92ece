use crate::adapter::{created, descriptor, GatewayAdapter, PageCollector, MAX_PAGES};
use crate::transport::{Auth, HttpTransport, TransportOptions};
use async_trait::async_trait;
use gatewayctl_core::{
    merge_object, ApiDefinition, ApiDescriptor, GatewayConfig, GatewayKind, GatewayctlError,
    GatewayctlResult,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

const PUBLISHER_PATH: &str = "/api/am/publisher/v4";
const DEFAULT_PAGE_SIZE: u64 = 25;
const DEFAULT_VERSION: &str = "1.0.0";

/// WSO2 API Manager publisher (v4) adapter.
///
/// Uses HTTP Basic auth from `username`/`password`. Besides the common
/// contract it exposes the publisher's version, documentation, operation,
/// subscription and OpenAPI calls.
#[derive(Debug)]
pub struct Wso2Adapter {
    transport: HttpTransport,
    page_size: u64,
}

impl Wso2Adapter {
    /// Build the adapter. `username` and `password` are required.
    pub fn new(config: GatewayConfig) -> GatewayctlResult<Self> {
        config.validate()?;
        let auth = Auth::Basic {
            username: config.require_str("username", "WSO2")?.to_string(),
            password: config.require_str("password", "WSO2")?.to_string(),
        };
        let page_size = config
            .get_u64("page_size")
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let transport = HttpTransport::new(
            &config,
            GatewayKind::Wso2,
            format!("{}{}", config.base_url(), PUBLISHER_PATH),
            auth,
            TransportOptions { tls_fallback: true },
        )?;
        debug!(
            gateway = %config.name,
            url = %transport.base_url(),
            page_size,
            "Initialized WSO2 adapter"
        );
        Ok(Self {
            transport,
            page_size,
        })
    }

    async fn list_all(&self) -> GatewayctlResult<Vec<Value>> {
        let mut pages = PageCollector::default();
        let mut offset = 0;

        for _ in 0..MAX_PAGES {
            let page = self
                .transport
                .get(
                    "/apis",
                    &[
                        ("offset", offset.to_string()),
                        ("limit", self.page_size.to_string()),
                    ],
                )
                .await?;

            let batch = list_of(&page);
            if batch.is_empty() {
                return Ok(pages.into_items());
            }
            let batch_len = batch.len() as u64;
            let added = pages.absorb(batch);
            debug!(gateway = %self.name(), offset, fetched = pages.len(), "Fetched WSO2 page");

            let total = page
                .get("pagination")
                .and_then(|p| p.get("total"))
                .and_then(Value::as_u64);
            if total.is_some_and(|total| pages.len() as u64 >= total)
                || batch_len < self.page_size
            {
                return Ok(pages.into_items());
            }
            if added == 0 {
                warn!(
                    gateway = %self.name(),
                    offset,
                    "WSO2 page repeated earlier results, stopping pagination"
                );
                return Ok(pages.into_items());
            }
            offset += self.page_size;
        }
        warn!(gateway = %self.name(), pages = MAX_PAGES, "WSO2 pagination limit reached");
        Ok(pages.into_items())
    }

    /// Every API sharing `api_id`'s name, i.e. all of its versions.
    pub async fn get_api_versions(&self, api_id: &str) -> Vec<ApiDescriptor> {
        let name = match self.transport.get(&format!("/apis/{api_id}"), &[]).await {
            Ok(api) => api.get("name").and_then(Value::as_str).map(str::to_string),
            Err(e) => {
                error!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "Failed to fetch WSO2 API"
                );
                None
            }
        };
        let Some(name) = name else {
            return Vec::new();
        };
        let versions: Vec<ApiDescriptor> = self
            .get_apis()
            .await
            .into_iter()
            .filter(|api| api.name == name)
            .collect();
        debug!(
            gateway = %self.name(),
            api = %name,
            count = versions.len(),
            "Found WSO2 API versions"
        );
        versions
    }

    /// Copy `api_id` as `new_version`.
    pub async fn create_api_version(
        &self,
        api_id: &str,
        new_version: &str,
    ) -> GatewayctlResult<ApiDescriptor> {
        if new_version.trim().is_empty() {
            return Err(GatewayctlError::InvalidDefinition(
                "a new version label is required".into(),
            ));
        }
        let response = self
            .transport
            .request(
                reqwest::Method::POST,
                "/apis/copy-api",
                &[
                    ("apiId", api_id.to_string()),
                    ("newVersion", new_version.to_string()),
                ],
                None,
            )
            .await?;
        let api = created(response, &["id"], "WSO2 copy-api")?;
        info!(
            gateway = %self.name(),
            source = %api_id,
            api_id = %api.id,
            "Created WSO2 API version"
        );
        Ok(api)
    }

    /// Documents attached to an API. Empty on failure.
    pub async fn get_api_documentation(&self, api_id: &str) -> Vec<Value> {
        self.list_or_empty(&format!("/apis/{api_id}/documents"), &[], "documents")
            .await
    }

    /// Attach a document to an API.
    pub async fn add_api_documentation(
        &self,
        api_id: &str,
        document: &Value,
    ) -> GatewayctlResult<Value> {
        let response = self
            .transport
            .post(&format!("/apis/{api_id}/documents"), document)
            .await?;
        info!(gateway = %self.name(), api_id = %api_id, "Added WSO2 API document");
        Ok(response)
    }

    /// Operations (resources) of an API. Empty on failure.
    pub async fn get_api_operations(&self, api_id: &str) -> Vec<Value> {
        self.list_or_empty(&format!("/apis/{api_id}/api-operations"), &[], "operations")
            .await
    }

    /// Add an operation (resource) to an API.
    pub async fn add_api_operation(
        &self,
        api_id: &str,
        operation: &Value,
    ) -> GatewayctlResult<Value> {
        let response = self
            .transport
            .post(&format!("/apis/{api_id}/api-operations"), operation)
            .await?;
        info!(gateway = %self.name(), api_id = %api_id, "Added WSO2 API operation");
        Ok(response)
    }

    /// Subscriptions to an API. Empty on failure.
    pub async fn get_api_subscriptions(&self, api_id: &str) -> Vec<Value> {
        self.list_or_empty("/subscriptions", &[("apiId", api_id.to_string())], "subscriptions")
            .await
    }

    /// The API's OpenAPI/Swagger document, if the publisher returns one.
    pub async fn get_api_swagger_definition(&self, api_id: &str) -> Option<Value> {
        match self
            .transport
            .get(&format!("/apis/{api_id}/swagger-definition"), &[])
            .await
        {
            Ok(document)
                if document.get("openapi").is_some() || document.get("swagger").is_some() =>
            {
                Some(document)
            }
            Ok(_) => {
                warn!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    "Response is not an OpenAPI or Swagger document"
                );
                None
            }
            Err(e) => {
                error!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "Failed to fetch WSO2 API definition"
                );
                None
            }
        }
    }

    async fn list_or_empty(&self, path: &str, query: &[(&str, String)], what: &str) -> Vec<Value> {
        match self.transport.get(path, query).await {
            Ok(page) => {
                let items = list_of(&page);
                debug!(gateway = %self.name(), count = items.len(), "Fetched WSO2 {what}");
                items
            }
            Err(e) => {
                error!(gateway = %self.name(), error = %e, "Failed to fetch WSO2 {what}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl GatewayAdapter for Wso2Adapter {
    fn gateway_type(&self) -> &str {
        GatewayKind::Wso2.as_str()
    }

    fn name(&self) -> &str {
        self.transport.gateway()
    }

    async fn get_apis(&self) -> Vec<ApiDescriptor> {
        match self.list_all().await {
            Ok(items) => {
                let apis: Vec<ApiDescriptor> = items
                    .into_iter()
                    .filter_map(|item| descriptor(item, &["id"]))
                    .collect();
                info!(gateway = %self.name(), count = apis.len(), "Fetched WSO2 APIs");
                apis
            }
            Err(e) => {
                error!(gateway = %self.name(), error = %e, "Failed to list WSO2 APIs");
                Vec::new()
            }
        }
    }

    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor> {
        let context = definition.context.as_deref().unwrap_or_default();
        if definition.name.trim().is_empty() || context.trim().is_empty() {
            return Err(GatewayctlError::InvalidDefinition(
                "WSO2 APIs require a name and a context".into(),
            ));
        }

        let mut payload = Map::new();
        payload.insert("visibility".into(), json!("PUBLIC"));
        payload.insert("policies".into(), json!(["Unlimited"]));
        payload.insert("transport".into(), json!(["http", "https"]));
        payload.insert(
            "businessInformation".into(),
            json!({ "businessOwner": "", "technicalOwner": "" }),
        );
        apply_definition(&mut payload, definition);
        payload
            .entry("version")
            .or_insert_with(|| json!(DEFAULT_VERSION));

        let response = self.transport.post("/apis", &Value::Object(payload)).await?;
        let api = created(response, &["id"], "WSO2 API")?;
        info!(gateway = %self.name(), api_id = %api.id, "Created WSO2 API");
        Ok(api)
    }

    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        // The publisher replaces the whole API on PUT, so start from the current one.
        let current = self.transport.get(&format!("/apis/{api_id}"), &[]).await?;
        let Value::Object(mut payload) = current else {
            return Err(GatewayctlError::Decode(format!(
                "WSO2 API '{api_id}' is not an object"
            )));
        };
        apply_definition(&mut payload, definition);

        let response = self
            .transport
            .put(&format!("/apis/{api_id}"), &Value::Object(payload))
            .await?;
        let api = created(response, &["id"], "WSO2 API")?;
        info!(gateway = %self.name(), api_id = %api_id, "Updated WSO2 API");
        Ok(api)
    }

    async fn delete_api(&self, api_id: &str) -> bool {
        match self.transport.delete(&format!("/apis/{api_id}")).await {
            Ok(_) => {
                info!(gateway = %self.name(), api_id = %api_id, "Deleted WSO2 API");
                true
            }
            Err(e) => {
                error!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "Failed to delete WSO2 API"
                );
                false
            }
        }
    }

    async fn get_api_metrics(&self, api_id: &str) -> Value {
        let details = match self.transport.get(&format!("/apis/{api_id}"), &[]).await {
            Ok(details) => details,
            Err(e) => return e.to_error_value(),
        };
        let subscriptions = self.get_api_subscriptions(api_id).await.len();
        json!({
            "details": details,
            "subscriptions": subscriptions,
        })
    }

    async fn test_connection(&self) -> bool {
        let ok = self
            .transport
            .get("/apis", &[("limit", "1".to_string())])
            .await
            .is_ok();
        info!(gateway = %self.name(), ok, "WSO2 connection test");
        ok
    }
}

fn list_of(page: &Value) -> Vec<Value> {
    page.get("list")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Copy the definition's common fields onto a publisher payload, then the
/// vendor fields on top.
fn apply_definition(payload: &mut Map<String, Value>, definition: &ApiDefinition) {
    if !definition.name.trim().is_empty() {
        payload.insert("name".into(), json!(definition.name));
    }
    if let Some(context) = &definition.context {
        payload.insert("context".into(), json!(context));
    }
    if let Some(version) = &definition.version {
        payload.insert("version".into(), json!(version));
    }
    if let Some(description) = &definition.description {
        payload.insert("description".into(), json!(description));
    }
    if let Some(url) = &definition.backend_url {
        payload.insert(
            "endpointConfig".into(),
            json!({
                "endpoint_type": "http",
                "production_endpoints": { "url": url },
                "sandbox_endpoints": { "url": url },
            }),
        );
    }
    merge_object(payload, &definition.vendor);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_required() {
        let config =
            GatewayConfig::new("apim", "https://apim:9443").with_option("username", "admin");
        let err = Wso2Adapter::new(config).unwrap_err();
        assert!(err.to_string().contains("'password'"));
    }

    #[test]
    fn page_size_is_configurable() {
        let config = GatewayConfig::new("apim", "https://apim:9443")
            .with_option("username", "admin")
            .with_option("password", "admin")
            .with_option("page_size", "100");
        assert_eq!(Wso2Adapter::new(config).unwrap().page_size, 100);
    }

    #[test]
    fn definition_overrides_current_fields() {
        let mut payload = Map::new();
        payload.insert("name".into(), json!("Pizza"));
        payload.insert("lifeCycleStatus".into(), json!("PUBLISHED"));
        let definition = ApiDefinition::new("")
            .with_description("now with pineapple")
            .with_backend_url("http://pizza:8080")
            .with_vendor_field("visibility", "PRIVATE");
        apply_definition(&mut payload, &definition);

        assert_eq!(payload["name"], "Pizza");
        assert_eq!(payload["lifeCycleStatus"], "PUBLISHED");
        assert_eq!(payload["description"], "now with pineapple");
        assert_eq!(payload["visibility"], "PRIVATE");
        assert_eq!(
            payload["endpointConfig"]["production_endpoints"]["url"],
            "http://pizza:8080"
        );
    }
}
