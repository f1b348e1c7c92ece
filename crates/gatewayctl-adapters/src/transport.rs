use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use gatewayctl_core::{GatewayConfig, GatewayKind, GatewayctlError, GatewayctlResult};
use gatewayctl_security::tls::{load_certs, validate_trust};
use gatewayctl_security::{redact, TrustPolicy};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use std::error::Error as _;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Request timeout used when `timeout_secs` is not configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How requests to a gateway are authenticated.
#[derive(Clone)]
pub enum Auth {
    /// No credentials.
    None,
    /// A fixed header carrying a secret (`apikey`, `x-tyk-authorization`).
    Header {
        /// Header name.
        name: &'static str,
        /// Secret value.
        value: String,
    },
    /// HTTP Basic.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Header { name, value } => write!(f, "Header({name}: {})", redact(value)),
            Auth::Basic { username, .. } => write!(f, "Basic({username}:***)"),
            Auth::Bearer(token) => write!(f, "Bearer({})", redact(token)),
        }
    }
}

/// Knobs that differ between vendors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportOptions {
    /// With `verify_ssl = false`, try a verified connection first and retry
    /// once without verification when the TLS handshake fails.
    pub tls_fallback: bool,
}

/// HTTP client bound to one gateway's management endpoint.
///
/// Every request carries the configured credentials and timeout. Failures come
/// back as [`GatewayctlError::Transport`] (no response) or
/// [`GatewayctlError::Vendor`] (non-2xx). A 2xx body that is empty or not JSON
/// decodes to `{}`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    gateway: String,
    vendor: GatewayKind,
    base_url: String,
    client: reqwest::Client,
    fallback: Option<reqwest::Client>,
}

impl HttpTransport {
    /// Build a transport for `config`, rooted at `base_url`.
    ///
    /// Fails when the certificate file is missing or holds no certificate, or
    /// when a credential cannot be sent as a header value.
    pub fn new(
        config: &GatewayConfig,
        vendor: GatewayKind,
        base_url: impl Into<String>,
        auth: Auth,
        options: TransportOptions,
    ) -> GatewayctlResult<Self> {
        validate_trust(config)?;

        let timeout = Duration::from_secs(
            config
                .get_u64("timeout_secs")
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match auth {
            Auth::None => {}
            Auth::Header { name, value } => {
                headers.insert(HeaderName::from_static(name), secret_header(&value)?);
            }
            Auth::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                headers.insert(AUTHORIZATION, secret_header(&format!("Basic {encoded}"))?);
            }
            Auth::Bearer(token) => {
                headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {token}"))?);
            }
        }

        let policy = TrustPolicy::for_config(config);
        let (client, fallback) = match policy {
            TrustPolicy::Disabled if options.tls_fallback => (
                build_client(&headers, timeout, &TrustPolicy::SystemRoots)?,
                Some(build_client(&headers, timeout, &TrustPolicy::Disabled)?),
            ),
            ref policy => (build_client(&headers, timeout, policy)?, None),
        };

        Ok(Self {
            gateway: config.name.clone(),
            vendor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            fallback,
        })
    }

    /// Name of the gateway this transport talks to.
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Root every relative path is joined to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a TLS failure is retried without verification.
    pub fn has_tls_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// GET `path` with query parameters.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> GatewayctlResult<Value> {
        self.request(Method::GET, path, query, None).await
    }

    /// POST a JSON body.
    pub async fn post(&self, path: &str, body: &Value) -> GatewayctlResult<Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// PUT a JSON body.
    pub async fn put(&self, path: &str, body: &Value) -> GatewayctlResult<Value> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    /// PATCH a JSON body.
    pub async fn patch(&self, path: &str, body: &Value) -> GatewayctlResult<Value> {
        self.request(Method::PATCH, path, &[], Some(body)).await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str) -> GatewayctlResult<Value> {
        self.request(Method::DELETE, path, &[], None).await
    }

    /// Send one request and decode the response.
    ///
    /// `path` is joined to the base URL unless it is already absolute (Kong's
    /// `next` links, for instance).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> GatewayctlResult<Value> {
        let url = self.url_for(path, query)?;
        let payload = match body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };

        debug!(
            gateway = %self.gateway,
            vendor = %self.vendor,
            method = %method,
            url = %url,
            "Sending gateway request"
        );

        let has_body = body.is_some();
        let response = match dispatch(&self.client, &method, &url, &payload, has_body).await {
            Ok(response) => response,
            Err(e) if is_tls_failure(&e) && self.fallback.is_some() => {
                warn!(
                    gateway = %self.gateway,
                    url = %url,
                    error = %e,
                    "TLS handshake failed, retrying with verification disabled"
                );
                let insecure = self.fallback.as_ref().unwrap_or(&self.client);
                dispatch(insecure, &method, &url, &payload, has_body)
                    .await
                    .map_err(|e| self.transport_error(&method, &url, &e))?
            }
            Err(e) => return Err(self.transport_error(&method, &url, &e)),
        };

        self.decode(&method, &url, response).await
    }

    fn url_for(&self, path: &str, query: &[(&str, String)]) -> GatewayctlResult<Url> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| GatewayctlError::Config(format!("Invalid gateway URL '{raw}': {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn decode(
        &self,
        method: &Method,
        url: &Url,
        response: reqwest::Response,
    ) -> GatewayctlResult<Value> {
        let status = response.status();
        debug!(gateway = %self.gateway, status = status.as_u16(), "Gateway responded");

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(method, url, &e))?;

        if !status.is_success() {
            let details = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            let mut message = format!("{} {} returned {}", method, url.path(), status);
            if let Some(reason) = details.get("message").and_then(Value::as_str) {
                message.push_str(": ");
                message.push_str(reason);
            }
            error!(
                gateway = %self.gateway,
                vendor = %self.vendor,
                status = status.as_u16(),
                "{message}"
            );
            return Err(GatewayctlError::Vendor {
                status: status.as_u16(),
                message,
                details,
            });
        }

        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(
                    gateway = %self.gateway,
                    method = %method,
                    url = %url,
                    status = status.as_u16(),
                    error = %e,
                    "Successful response is not valid JSON, treating as empty"
                );
                Ok(json!({}))
            }
        }
    }

    fn transport_error(&self, method: &Method, url: &Url, e: &reqwest::Error) -> GatewayctlError {
        let message = if e.is_timeout() {
            format!("{method} {url} timed out")
        } else {
            format!("{method} {url} failed: {}", error_chain(e))
        };
        error!(gateway = %self.gateway, vendor = %self.vendor, "{message}");
        GatewayctlError::Transport(message)
    }
}

async fn dispatch(
    client: &reqwest::Client,
    method: &Method,
    url: &Url,
    payload: &[u8],
    has_body: bool,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut request = client.request(method.clone(), url.clone());
    if has_body {
        request = request.body(payload.to_vec());
    }
    request.send().await
}

fn build_client(
    headers: &HeaderMap,
    timeout: Duration,
    policy: &TrustPolicy,
) -> GatewayctlResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .default_headers(headers.clone())
        .timeout(timeout);

    match policy {
        TrustPolicy::SystemRoots => {}
        TrustPolicy::CustomCa(path) => {
            builder = builder.tls_built_in_root_certs(false);
            for der in load_certs(path)? {
                let cert = reqwest::Certificate::from_der(&der).map_err(|e| {
                    GatewayctlError::Config(format!(
                        "Invalid certificate in '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }
        TrustPolicy::Disabled => {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| GatewayctlError::Config(format!("Failed to build HTTP client: {e}")))
}

fn secret_header(value: &str) -> GatewayctlResult<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| GatewayctlError::Config("credential is not a valid header value".into()))?;
    header.set_sensitive(true);
    Ok(header)
}

fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn is_tls_failure(e: &reqwest::Error) -> bool {
    if !e.is_connect() {
        return false;
    }
    let chain = error_chain(e).to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| chain.contains(needle))
}
