use crate::adapter::GatewayAdapter;
use crate::transport::DEFAULT_TIMEOUT_SECS;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_apigateway::config::retry::RetryConfig;
use aws_sdk_apigateway::config::timeout::TimeoutConfig;
use aws_sdk_apigateway::config::{Builder as ApiGatewayBuilder, Credentials, Region};
use aws_sdk_apigateway::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_apigateway::primitives::DateTime;
use aws_sdk_apigateway::types::{ApiKeySourceType, Op, PatchOperation};
use aws_sdk_apigateway::Client;
use gatewayctl_core::{
    ApiDefinition, ApiDescriptor, GatewayConfig, GatewayKind, GatewayctlError, GatewayctlResult,
};
use gatewayctl_security::tls::validate_trust;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_REGION: &str = "us-east-1";
const PAGE_LIMIT: i32 = 500;
const DEFAULT_VERSION: &str = "1.0";
const CREDENTIALS_SOURCE: &str = "gatewayctl";

/// AWS API Gateway (REST APIs) adapter over the official SDK.
///
/// Credentials come from the gateway profile, never from the ambient AWS
/// chain. A `url` outside `amazonaws.com` becomes the SDK's endpoint
/// override, which is how private endpoints and local emulators are reached.
#[derive(Debug)]
pub struct AwsAdapter {
    gateway: String,
    client: Client,
    region: String,
    endpoint: Option<String>,
}

impl AwsAdapter {
    /// Build the adapter. `aws_access_key_id` and `aws_secret_access_key` are
    /// required; `region` defaults to `us-east-1`.
    pub fn new(config: GatewayConfig) -> GatewayctlResult<Self> {
        config.validate()?;
        validate_trust(&config)?;
        let access_key = config.require_str("aws_access_key_id", "AWS")?;
        let secret_key = config.require_str("aws_secret_access_key", "AWS")?;
        let region = config.get_str("region").unwrap_or(DEFAULT_REGION).to_string();
        if !config.verify_ssl || config.cert_path.is_some() {
            warn!(
                gateway = %config.name,
                "AWS SDK client always verifies against system roots; TLS settings ignored"
            );
        }

        let timeout = Duration::from_secs(
            config
                .get_u64("timeout_secs")
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let credentials = Credentials::new(access_key, secret_key, None, None, CREDENTIALS_SOURCE);

        let mut builder = ApiGatewayBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());

        let endpoint = endpoint_override(&config);
        if let Some(url) = &endpoint {
            builder = builder.endpoint_url(url);
        }
        let client = Client::from_conf(builder.build());

        debug!(
            gateway = %config.name,
            region = %region,
            endpoint = endpoint.as_deref().unwrap_or("regional"),
            "Initialized AWS adapter"
        );
        Ok(Self {
            gateway: config.name,
            client,
            region,
            endpoint,
        })
    }

    /// Region the adapter is scoped to.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Endpoint override, `None` when the regional endpoint is used.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn list_all(&self) -> GatewayctlResult<Vec<ApiDescriptor>> {
        let mut apis = Vec::new();
        let mut position: Option<String> = None;
        loop {
            let page = self
                .client
                .get_rest_apis()
                .limit(PAGE_LIMIT)
                .set_position(position.clone())
                .send()
                .await
                .map_err(|e| self.sdk_error("GetRestApis", e))?;

            apis.extend(page.items().iter().filter_map(|api| {
                describe(
                    api.id(),
                    api.name(),
                    api.description(),
                    api.version(),
                    api.created_date(),
                    api.api_key_source(),
                )
            }));

            match page.position() {
                Some(next) if !next.is_empty() && position.as_deref() != Some(next) => {
                    position = Some(next.to_string());
                }
                _ => break,
            }
        }
        Ok(apis)
    }

    fn sdk_error<E>(&self, action: &str, err: SdkError<E, SdkResponse>) -> GatewayctlError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let mapped = match err {
            SdkError::ServiceError(context) => {
                let status = context.raw().status().as_u16();
                let service = context.into_err();
                let reason = service.message().unwrap_or("no message").to_string();
                GatewayctlError::Vendor {
                    status,
                    message: format!("{action} returned {status}: {reason}"),
                    details: json!({ "code": service.code(), "message": service.message() }),
                }
            }
            SdkError::TimeoutError(_) => GatewayctlError::Transport(format!("{action} timed out")),
            other => GatewayctlError::Transport(format!(
                "{action} failed: {}",
                DisplayErrorContext(&other)
            )),
        };
        error!(gateway = %self.gateway, error = %mapped, "AWS API Gateway call failed");
        mapped
    }
}

type SdkResponse = aws_sdk_apigateway::config::http::HttpResponse;

#[async_trait]
impl GatewayAdapter for AwsAdapter {
    fn gateway_type(&self) -> &str {
        GatewayKind::Aws.as_str()
    }

    fn name(&self) -> &str {
        &self.gateway
    }

    async fn get_apis(&self) -> Vec<ApiDescriptor> {
        match self.list_all().await {
            Ok(apis) => {
                info!(gateway = %self.name(), count = apis.len(), "Fetched AWS REST APIs");
                apis
            }
            Err(e) => {
                error!(gateway = %self.name(), error = %e, "Failed to list AWS REST APIs");
                Vec::new()
            }
        }
    }

    async fn create_api(&self, definition: &ApiDefinition) -> GatewayctlResult<ApiDescriptor> {
        if definition.name.trim().is_empty() {
            return Err(GatewayctlError::InvalidDefinition(
                "AWS REST APIs require a name".into(),
            ));
        }
        let mut request = self
            .client
            .create_rest_api()
            .name(&definition.name)
            .description(definition.description.clone().unwrap_or_default())
            .version(
                definition
                    .version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_VERSION.into()),
            );

        for (key, value) in &definition.vendor {
            request = match (key.as_str(), value) {
                ("apiKeySource", Value::String(source)) => {
                    request.api_key_source(ApiKeySourceType::from(source.as_str()))
                }
                ("minimumCompressionSize", Value::Number(size)) => {
                    match size.as_i64().and_then(|s| i32::try_from(s).ok()) {
                        Some(size) => request.minimum_compression_size(size),
                        None => request,
                    }
                }
                ("disableExecuteApiEndpoint", Value::Bool(flag)) => {
                    request.disable_execute_api_endpoint(*flag)
                }
                ("tags", Value::Object(tags)) => tags.iter().fold(request, |request, (k, v)| {
                    match v.as_str() {
                        Some(v) => request.tags(k, v),
                        None => request,
                    }
                }),
                _ => {
                    debug!(gateway = %self.name(), field = %key, "Ignoring unsupported AWS field");
                    request
                }
            };
        }

        let api = request
            .send()
            .await
            .map_err(|e| self.sdk_error("CreateRestApi", e))?;
        let created = describe(
            api.id(),
            api.name(),
            api.description(),
            api.version(),
            api.created_date(),
            api.api_key_source(),
        )
        .ok_or_else(|| GatewayctlError::Decode("CreateRestApi response has no id".into()))?;
        info!(gateway = %self.name(), api_id = %created.id, "Created AWS REST API");
        Ok(created)
    }

    async fn update_api(
        &self,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<ApiDescriptor> {
        let operations = patch_operations(definition);
        if operations.is_empty() {
            return Err(GatewayctlError::InvalidDefinition(
                "nothing to update: set a name or a description".into(),
            ));
        }
        let api = self
            .client
            .update_rest_api()
            .rest_api_id(api_id)
            .set_patch_operations(Some(operations))
            .send()
            .await
            .map_err(|e| self.sdk_error("UpdateRestApi", e))?;
        let updated = describe(
            api.id(),
            api.name(),
            api.description(),
            api.version(),
            api.created_date(),
            api.api_key_source(),
        )
        .ok_or_else(|| GatewayctlError::Decode("UpdateRestApi response has no id".into()))?;
        info!(gateway = %self.name(), api_id = %api_id, "Updated AWS REST API");
        Ok(updated)
    }

    async fn delete_api(&self, api_id: &str) -> bool {
        match self
            .client
            .delete_rest_api()
            .rest_api_id(api_id)
            .send()
            .await
        {
            Ok(_) => {
                info!(gateway = %self.name(), api_id = %api_id, "Deleted AWS REST API");
                true
            }
            Err(e) => {
                let e = self.sdk_error("DeleteRestApi", e);
                warn!(
                    gateway = %self.name(),
                    api_id = %api_id,
                    error = %e,
                    "AWS REST API not deleted"
                );
                false
            }
        }
    }

    // Request counts live in CloudWatch, which this adapter does not query.
    async fn get_api_metrics(&self, api_id: &str) -> Value {
        json!({
            "api_id": api_id,
            "metrics": {
                "requests": 0,
                "errors": 0,
                "latency": 0,
            },
        })
    }

    async fn test_connection(&self) -> bool {
        let ok = match self.client.get_rest_apis().limit(1).send().await {
            Ok(_) => true,
            Err(e) => {
                self.sdk_error("GetRestApis", e);
                false
            }
        };
        info!(gateway = %self.name(), ok, "AWS connection test");
        ok
    }
}

fn endpoint_override(config: &GatewayConfig) -> Option<String> {
    let url = config.base_url();
    if url.contains("amazonaws.com") {
        None
    } else {
        Some(url.to_string())
    }
}

fn describe(
    id: Option<&str>,
    name: Option<&str>,
    description: Option<&str>,
    version: Option<&str>,
    created: Option<&DateTime>,
    key_source: Option<&ApiKeySourceType>,
) -> Option<ApiDescriptor> {
    let mut api = ApiDescriptor::new(id?, name.unwrap_or_default());
    api.description = description.map(str::to_string);
    api.version = version.map(str::to_string);
    if let Some(created) = created {
        api = api.with_vendor_field("createdDate", json!(created.secs()));
    }
    if let Some(source) = key_source {
        api = api.with_vendor_field("apiKeySource", json!(source.as_str()));
    }
    Some(api)
}

fn patch_operations(definition: &ApiDefinition) -> Vec<PatchOperation> {
    let mut operations = Vec::new();
    if !definition.name.trim().is_empty() {
        operations.push(
            PatchOperation::builder()
                .op(Op::Replace)
                .path("/name")
                .value(&definition.name)
                .build(),
        );
    }
    if let Some(description) = &definition.description {
        operations.push(
            PatchOperation::builder()
                .op(Op::Replace)
                .path("/description")
                .value(description)
                .build(),
        );
    }
    operations
}
