use gatewayctl_core::{GatewayConfig, GatewayctlError, GatewayctlResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which certificates an outbound gateway connection trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// The platform's default roots.
    SystemRoots,
    /// Only the certificates in this PEM file.
    CustomCa(PathBuf),
    /// No verification at all (`verify_ssl = false`).
    Disabled,
}

impl TrustPolicy {
    /// Derive the policy for a gateway. Disabled verification wins over a cert path.
    pub fn for_config(config: &GatewayConfig) -> Self {
        if !config.verify_ssl {
            if config.cert_path.is_some() {
                info!(
                    gateway = %config.name,
                    "verify_ssl is false; ignoring configured cert_path"
                );
            }
            warn!(gateway = %config.name, "TLS certificate verification disabled");
            return TrustPolicy::Disabled;
        }
        match &config.cert_path {
            Some(path) => TrustPolicy::CustomCa(path.clone()),
            None => TrustPolicy::SystemRoots,
        }
    }
}

/// Read every certificate in a PEM file as DER bytes.
///
/// Fails if the file cannot be read or holds no certificate.
pub fn load_certs(path: &Path) -> GatewayctlResult<Vec<Vec<u8>>> {
    let data = std::fs::read(path).map_err(|e| {
        GatewayctlError::Config(format!("Failed to read cert '{}': {}", path.display(), e))
    })?;

    let mut reader = std::io::BufReader::new(data.as_slice());
    let certs: Vec<Vec<u8>> = rustls_pemfile::certs(&mut reader)
        .filter_map(|r| r.ok())
        .map(|cert| cert.as_ref().to_vec())
        .collect();

    if certs.is_empty() {
        return Err(GatewayctlError::Config(format!(
            "No certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

/// Check that a configured certificate file exists before any connection is made.
pub fn validate_trust(config: &GatewayConfig) -> GatewayctlResult<()> {
    if let Some(path) = config.trusted_cert_path() {
        if !path.exists() {
            return Err(GatewayctlError::Config(format!(
                "TLS cert not found: {}",
                path.display()
            )));
        }
    }
    Ok(())
}
