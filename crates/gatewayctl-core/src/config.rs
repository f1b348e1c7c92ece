use crate::error::{GatewayctlError, GatewayctlResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One gateway connection profile.
///
/// `name` is the storage key. `additional_config` holds vendor credentials and
/// options; its keys are only validated by the adapter that consumes them.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Unique identifier of this gateway.
    pub name: String,
    /// Base management endpoint.
    pub url: String,
    /// Verify the server certificate. When false, `cert_path` is ignored.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// PEM file trusted instead of the system roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    /// Vendor-specific credentials and options.
    #[serde(default)]
    pub additional_config: BTreeMap<String, Value>,
}

fn default_verify_ssl() -> bool {
    true
}

impl GatewayConfig {
    /// Create a profile with certificate verification on and no options.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            verify_ssl: true,
            cert_path: None,
            additional_config: BTreeMap::new(),
        }
    }

    /// Set whether the server certificate is verified.
    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Trust the certificate(s) in `path` instead of the system roots.
    pub fn with_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    /// Add one `additional_config` entry.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_config.insert(key.into(), value.into());
        self
    }

    /// Check the fields every vendor relies on.
    pub fn validate(&self) -> GatewayctlResult<()> {
        if self.name.trim().is_empty() {
            return Err(GatewayctlError::Config("gateway name must not be empty".into()));
        }
        let url = self.url.trim();
        if url.is_empty() {
            return Err(GatewayctlError::Config(format!(
                "gateway '{}' has an empty url",
                self.name
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(GatewayctlError::Config(format!(
                "gateway '{}' url must start with http:// or https://, got '{}'",
                self.name, url
            )));
        }
        Ok(())
    }

    /// The management URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }

    /// The certificate to trust, honoring `verify_ssl = false` as an override.
    pub fn trusted_cert_path(&self) -> Option<&Path> {
        if self.verify_ssl {
            self.cert_path.as_deref()
        } else {
            None
        }
    }

    /// A non-empty string option.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.additional_config
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// A non-empty string option that `vendor` cannot work without.
    pub fn require_str(&self, key: &str, vendor: &str) -> GatewayctlResult<&str> {
        self.get_str(key).ok_or_else(|| {
            GatewayctlError::Config(format!(
                "{} gateway '{}' requires '{}' in additional_config",
                vendor, self.name, key
            ))
        })
    }

    /// A numeric option, accepting either a JSON number or a numeric string.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.additional_config.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// Secrets live in `additional_config`, so Debug only lists its keys.
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("verify_ssl", &self.verify_ssl)
            .field("cert_path", &self.cert_path)
            .field(
                "additional_config",
                &self.additional_config.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialization_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            name = "prod"
            url = "http://localhost:8001/"
            "#,
        )
        .unwrap();
        assert!(config.verify_ssl);
        assert!(config.cert_path.is_none());
        assert!(config.additional_config.is_empty());
        assert_eq!(config.base_url(), "http://localhost:8001");
    }

    #[test]
    fn validate_rejects_empty_fields() {
        assert!(GatewayConfig::new("", "http://x").validate().is_err());
        assert!(GatewayConfig::new("a", " ").validate().is_err());
        assert!(GatewayConfig::new("a", "localhost:8001").validate().is_err());
        assert!(GatewayConfig::new("a", "https://kong:8444").validate().is_ok());
    }

    #[test]
    fn disabled_verification_ignores_cert_path() {
        let config = GatewayConfig::new("a", "https://x").with_cert_path("/tmp/ca.pem");
        assert_eq!(config.trusted_cert_path(), Some(Path::new("/tmp/ca.pem")));
        let config = config.with_verify_ssl(false);
        assert!(config.trusted_cert_path().is_none());
    }

    #[test]
    fn option_accessors() {
        let config = GatewayConfig::new("a", "http://x")
            .with_option("username", "admin")
            .with_option("password", "")
            .with_option("timeout_secs", 5)
            .with_option("page_size", "50");
        assert_eq!(config.get_str("username"), Some("admin"));
        assert_eq!(config.get_str("password"), None);
        assert_eq!(config.get_u64("timeout_secs"), Some(5));
        assert_eq!(config.get_u64("page_size"), Some(50));

        let err = config.require_str("password", "WSO2").unwrap_err();
        assert!(err.to_string().contains("'password'"));
    }

    #[test]
    fn debug_hides_option_values() {
        let config = GatewayConfig::new("a", "http://x").with_option("api_key", "secret123");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("api_key"));
        assert!(!rendered.contains("secret123"));
    }
}
