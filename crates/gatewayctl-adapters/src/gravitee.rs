use crate::adapter::{created, descriptors, GatewayAdapter, PageCollector, MAX_PAGES};
use crate::transport::{Auth, HttpTransport, TransportOptions};
use async_trait::async_trait;
use gatewayctl_core::{
    merge_object, ApiDefinition, ApiDescriptor, GatewayConfig, GatewayKind, GatewayctlError,
    GatewayctlResult,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

const DEFAULT_SCOPE: &str = "DEFAULT";
const DEFAULT_PAGE_SIZE: u64 = 25;

/// Gravitee APIM management API (v2) adapter.
///
/// Requests are scoped to one organization and environment (`organization_id`,
/// `environment_id`, both `DEFAULT` unless configured). `auth_type` selects
/// `basic` (`username`/`password`) or `bearer` (`token`).
#[derive(Debug)]
pub struct GraviteeAdapter {
    transport: HttpTransport,
    page_size: u64,
}

impl GraviteeAdapter {
    /// Build the adapter, validating the credentials `auth_type` calls for.
    pub fn new(config: GatewayConfig) -> GatewayctlResult<Self> {
        config.validate()?;
        let auth = gravitee_auth(&config)?;
        let org = config.get_str("organization_id").unwrap_or(DEFAULT_SCOPE);
        let env = config.get_str("environment_id").unwrap_or(DEFAULT_SCOPE);
        let base = format!(
            "{}/management/v2/organizations/{}/environments/{}",
            config.base_url(),
            org,
            env
        );
        let page_size = config
            .get_u64("page_size")
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let transport = HttpTransport::new(
            &config,
            GatewayKind::Gravitee,
            base,
            auth,
            TransportOptions::default(),
        )?;
        debug!(
            gateway = %config.name,
            url = %transport.base_url(),
            organization = %org,
            environment = %env,
            "Initialized Gravitee adapter"
        );
        Ok(Self {
            transport,
            page_size,
        })
    }

    async fn list_all(&self) -> GatewayctlResult<Vec<Value>> {
        let mut pages = PageCollector::default();

        for page in 1..=MAX_PAGES {
            let response = self
                .transport
                .get(
                    "/apis",
                    &[
                        ("page", page.to_string()),
                        ("perPage", self.page_size.to_string()),
                    ],
                )
                .await?;

            let (batch, page_count) = match response {
                Value::Array(items) => {
                    pages.absorb(items);
                    return Ok(pages.into_items());
                }
                Value::Object(mut envelope) => {
                    let page_count = envelope
                        .get("pagination")
                        .and_then(|p| p.get("pageCount"))
                        .and_then(Value::as_u64);
                    match envelope.remove("data") {
                        Some(Value::Array(items)) => (items, page_count),
                        _ => {
                            return Err(GatewayctlError::Decode(
                                "Gravitee API list has no data array".into(),
                            ))
                        }
                    }
                }
                other => {
                    return Err(GatewayctlError::Decode(format!(
                        "unexpected Gravitee API list: {other}"
                    )))
                }
            };

            let batch_len = batch.len() as u64;
            let added = pages.absorb(batch);
            let done = match page_count {
                Some(count) => page >= count,
                None => batch_len < self.page_size,
            };
            if done || batch_len == 0 {
                return Ok(pages.into_items());
            }
            if added == 0 {
                warn!(
                    gateway = %self.name(),
                    page,
                    "Gravitee page repeated earlier results, stopping pagination"
                );
                return Ok(pages.into_items());
            }
        }
        warn!(gateway = %self.name(), pages = MAX_PAGES, "Gravitee pagination limit reached");
        Ok(pages.into_items())
    }
}

#[async_trait]
impl GatewayAdapter for GraviteeAdapter {
    fn gateway_type(&self) -> &str {
        GatewayKind::Gravitee.as_str()
    }

    fn name(&self) -> &str {
        self.transport.gateway()
    }

    async fn get_apis(&self) -> Vec<ApiDescriptor> {
        match self.list_all().await {
            Ok(items) => {
                let apis = descriptors(self.name(), items, &["id"]);
                info!(gateway = %self.name(), count = apis.len(), "Fetched Gravitee APIs");
                apis
            }
            Err(e) => {
                error!(gateway = %self.name(), error = %e, "Failed to list Gravitee APIs");
                Vec::new()
            }
        }
    }

    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor> {
        if definition.name.trim().is_empty() {
            return Err(GatewayctlError::InvalidDefinition(
                "Gravitee APIs require a name".into(),
            ));
        }
        let response = self.transport.post("/apis", &api_payload(definition)).await?;
        let api = created(response, &["id"], "Gravitee API")?;
        info!(gateway = %self.name(), api_id = %api.id, "Created Gravitee API");
        Ok(api)
    }

    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        let response = self
            .transport
            .put(&format!("/apis/{api_id}"), &api_payload(definition))
            .await?;
        let api = created(response, &["id"], "Gravitee API")?;
        info!(gateway = %self.name(), api_id = %api_id, "Updated Gravitee API");
        Ok(api)
    }

    async fn delete_api(&self, api_id: &str) -> bool {
        match self.transport.delete(&format!("/apis/{api_id}")).await {
            Ok(_) => {
                info!(gateway = %self.name(), api_id = %api_id, "Deleted Gravitee API");
                true
            }
            Err(e) => {
                error!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "Failed to delete Gravitee API"
                );
                false
            }
        }
    }

    // Analytics need a separate time-ranged query; return the definition instead.
    async fn get_api_metrics(&self, api_id: &str) -> Value {
        self.transport
            .get(&format!("/apis/{api_id}"), &[])
            .await
            .unwrap_or_else(|e| e.to_error_value())
    }

    async fn test_connection(&self) -> bool {
        let ok = self
            .transport
            .get("/apis", &[("page", "1".to_string()), ("perPage", "1".to_string())])
            .await
            .is_ok();
        info!(gateway = %self.name(), ok, "Gravitee connection test");
        ok
    }
}

fn gravitee_auth(config: &GatewayConfig) -> GatewayctlResult<Auth> {
    match config.get_str("auth_type").map(str::to_lowercase).as_deref() {
        Some("basic") => Ok(Auth::Basic {
            username: config.require_str("username", "Gravitee")?.to_string(),
            password: config.require_str("password", "Gravitee")?.to_string(),
        }),
        Some("bearer") => Ok(Auth::Bearer(
            config.require_str("token", "Gravitee")?.to_string(),
        )),
        Some(other) => Err(GatewayctlError::Config(format!(
            "Gravitee gateway '{}' has unknown auth_type '{}' (expected basic or bearer)",
            config.name, other
        ))),
        None => {
            warn!(gateway = %config.name, "No authentication configured for Gravitee");
            Ok(Auth::None)
        }
    }
}

/// Build a v4 proxy API. `vendor` fields override the generated ones.
fn api_payload(definition: &ApiDefinition) -> Value {
    let context = definition
        .context
        .clone()
        .unwrap_or_else(|| format!("/{}", definition.name.trim().to_lowercase().replace(' ', "-")));

    let mut api = Map::new();
    api.insert("name".into(), json!(definition.name));
    api.insert(
        "apiVersion".into(),
        json!(definition.version.clone().unwrap_or_else(|| "1.0".into())),
    );
    if let Some(description) = &definition.description {
        api.insert("description".into(), json!(description));
    }
    api.insert("definitionVersion".into(), json!("V4"));
    api.insert("type".into(), json!("PROXY"));
    api.insert(
        "listeners".into(),
        json!([{
            "type": "HTTP",
            "paths": [{ "path": context }],
            "entrypoints": [{ "type": "http-proxy" }],
        }]),
    );
    if let Some(target) = &definition.backend_url {
        api.insert(
            "endpointGroups".into(),
            json!([{
                "name": "Default HTTP proxy group",
                "type": "http-proxy",
                "endpoints": [{
                    "name": "Default HTTP proxy",
                    "type": "http-proxy",
                    "configuration": { "target": target },
                }],
            }]),
        );
    }
    merge_object(&mut api, &definition.vendor);
    Value::Object(api)
}
