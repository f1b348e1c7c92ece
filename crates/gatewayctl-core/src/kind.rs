use crate::error::GatewayctlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The gateway products supported out of the box.
///
/// The lower-cased tag is what gets persisted next to each config and what the
/// factory is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Kong Admin API.
    Kong,
    /// WSO2 API Manager publisher API (v4).
    Wso2,
    /// Tyk Gateway API.
    Tyk,
    /// Gravitee APIM management API (v2).
    Gravitee,
    /// AWS API Gateway (REST APIs).
    Aws,
}

impl GatewayKind {
    /// Every built-in kind, in registration order.
    pub const ALL: [GatewayKind; 5] = [
        GatewayKind::Kong,
        GatewayKind::Wso2,
        GatewayKind::Tyk,
        GatewayKind::Gravitee,
        GatewayKind::Aws,
    ];

    /// The persisted tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayKind::Kong => "kong",
            GatewayKind::Wso2 => "wso2",
            GatewayKind::Tyk => "tyk",
            GatewayKind::Gravitee => "gravitee",
            GatewayKind::Aws => "aws",
        }
    }

    /// Human-readable product name.
    pub fn display_name(self) -> &'static str {
        match self {
            GatewayKind::Kong => "Kong",
            GatewayKind::Wso2 => "WSO2 API Manager",
            GatewayKind::Tyk => "Tyk",
            GatewayKind::Gravitee => "Gravitee",
            GatewayKind::Aws => "AWS API Gateway",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = GatewayctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        GatewayKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or(GatewayctlError::UnsupportedGatewayType(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_case_insensitively() {
        assert_eq!("KONG".parse::<GatewayKind>().unwrap(), GatewayKind::Kong);
        assert_eq!(" Wso2 ".parse::<GatewayKind>().unwrap(), GatewayKind::Wso2);
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = "apigee".parse::<GatewayKind>().unwrap_err();
        assert!(matches!(err, GatewayctlError::UnsupportedGatewayType(t) if t == "apigee"));
    }

    #[test]
    fn serde_uses_lowercase_tags() {
        assert_eq!(serde_json::to_string(&GatewayKind::Gravitee).unwrap(), "\"gravitee\"");
        for kind in GatewayKind::ALL {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }
}
