use serde_json::{json, Value};

/// Top-level error type for gatewayctl.
///
/// Each variant corresponds to one class of failure a caller may need to render.
/// Adapter write operations hand these back as values; [`GatewayctlError::to_error_value`]
/// turns any of them into the uniform `{error, message, status, details}` mapping.
#[derive(Debug, thiserror::Error)]
pub enum GatewayctlError {
    /// Missing or invalid configuration (encryption key, vendor credential, certificate).
    #[error("Config error: {0}")]
    Config(String),

    /// DNS, connect, timeout or TLS failure talking to a gateway.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The gateway answered with a non-2xx status.
    #[error("Vendor error {status}: {message}")]
    Vendor {
        /// HTTP status code returned by the gateway.
        status: u16,
        /// Short description of the failed call.
        message: String,
        /// Response body, as JSON when it parsed, raw text otherwise.
        details: Value,
    },

    /// A response body could not be decoded where JSON was expected.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An API definition is missing fields the vendor requires.
    #[error("Invalid API definition: {0}")]
    InvalidDefinition(String),

    /// A stored gateway with this name already exists.
    #[error("Gateway '{0}' already exists")]
    DuplicateName(String),

    /// No stored gateway with this name exists.
    #[error("Gateway '{0}' not found")]
    NotFound(String),

    /// The underlying store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The factory has no constructor registered for this tag.
    #[error("Unsupported gateway type: {0}")]
    UnsupportedGatewayType(String),

    /// Encrypting a credential failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`GatewayctlError`].
pub type GatewayctlResult<T> = Result<T, GatewayctlError>;

impl GatewayctlError {
    /// HTTP status attached to this error, if the gateway answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Vendor { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error happened before any network call was attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidDefinition(_))
    }

    /// Render the uniform error-result mapping shown to users.
    ///
    /// `status` is `"N/A"` when no HTTP response was received and `details`
    /// is `null` unless the gateway sent a body.
    pub fn to_error_value(&self) -> Value {
        let status = match self.status() {
            Some(code) => json!(code),
            None => json!("N/A"),
        };
        let details = match self {
            Self::Vendor { details, .. } => details.clone(),
            _ => Value::Null,
        };
        json!({
            "error": true,
            "message": self.to_string(),
            "status": status,
            "details": details,
        })
    }
}

/// Returns `true` if `value` is an error-result mapping.
pub fn is_error_value(value: &Value) -> bool {
    value
        .get("error")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_error_value_carries_status_and_details() {
        let err = GatewayctlError::Vendor {
            status: 409,
            message: "POST /services".to_string(),
            details: json!({"message": "name already exists"}),
        };
        let value = err.to_error_value();
        assert_eq!(value["error"], true);
        assert_eq!(value["status"], 409);
        assert_eq!(value["details"]["message"], "name already exists");
        assert!(value["message"].as_str().unwrap().contains("409"));
        assert!(is_error_value(&value));
    }

    #[test]
    fn transport_error_value_has_no_status() {
        let value = GatewayctlError::Transport("connection refused".into()).to_error_value();
        assert_eq!(value["status"], "N/A");
        assert!(value["details"].is_null());
    }

    #[test]
    fn plain_objects_are_not_error_values() {
        assert!(!is_error_value(&json!({"id": "a"})));
        assert!(!is_error_value(&json!({"error": "text"})));
    }
}
