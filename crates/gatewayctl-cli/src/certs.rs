use gatewayctl_core::{GatewayctlError, GatewayctlResult};
use gatewayctl_security::tls::load_certs;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Certificates copied into gatewayctl's own directory, one per gateway.
///
/// Only files inside that directory are ever replaced or deleted.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
}

/// A certificate copied into the store but not yet at its final path.
#[derive(Debug)]
pub struct StagedCert {
    target: PathBuf,
    pending: PathBuf,
}

impl StagedCert {
    /// The path the certificate will have once committed.
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl CertificateStore {
    /// Keep certificates under `dir` (created on first import).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the certificate of `gateway` lives.
    ///
    /// Names made only of `[A-Za-z0-9._-]` are used as they are. Anything
    /// else becomes `~` plus the URL-safe base64 of the name, so two
    /// gateways never share a file.
    pub fn path_for(&self, gateway: &str) -> PathBuf {
        let plain = !gateway.is_empty()
            && gateway
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        let file = if plain {
            gateway.to_string()
        } else {
            format!("~{}", URL_SAFE_NO_PAD.encode(gateway.as_bytes()))
        };
        self.dir.join(format!("{file}.pem"))
    }

    /// Whether `path` is a file this store manages.
    pub fn is_managed(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
    }

    /// Copy a PEM file in for `gateway`, checking it holds a certificate.
    pub fn import(&self, gateway: &str, source: &Path) -> GatewayctlResult<PathBuf> {
        let staged = self.stage_import(gateway, source)?;
        self.commit(staged)
    }

    /// Write a checked copy of `source` next to the final file of `gateway`.
    ///
    /// Nothing already stored is touched until [`commit`](Self::commit).
    pub fn stage_import(&self, gateway: &str, source: &Path) -> GatewayctlResult<StagedCert> {
        load_certs(source)?;
        let staged = self.staged(gateway)?;
        std::fs::copy(source, &staged.pending)?;
        Ok(staged)
    }

    /// Stage a copy of a managed certificate under the name `gateway`.
    ///
    /// Returns `None` when `current` is not managed or already has that name.
    pub fn stage_copy(
        &self,
        current: &Path,
        gateway: &str,
    ) -> GatewayctlResult<Option<StagedCert>> {
        if !self.is_managed(current) || self.path_for(gateway) == current {
            return Ok(None);
        }
        let staged = self.staged(gateway)?;
        std::fs::copy(current, &staged.pending).map_err(|e| {
            GatewayctlError::Config(format!(
                "Failed to copy certificate '{}': {}",
                current.display(),
                e
            ))
        })?;
        Ok(Some(staged))
    }

    /// Move a staged certificate to its final path.
    pub fn commit(&self, staged: StagedCert) -> GatewayctlResult<PathBuf> {
        std::fs::rename(&staged.pending, &staged.target).map_err(|e| {
            GatewayctlError::Config(format!(
                "Failed to install certificate '{}': {}",
                staged.target.display(),
                e
            ))
        })?;
        info!(path = %staged.target.display(), "Installed certificate");
        Ok(staged.target)
    }

    /// Drop a staged certificate that will not be used.
    pub fn discard(&self, staged: StagedCert) {
        if let Err(e) = std::fs::remove_file(&staged.pending) {
            warn!(path = %staged.pending.display(), error = %e, "Failed to discard certificate");
        }
    }

    fn staged(&self, gateway: &str) -> GatewayctlResult<StagedCert> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.path_for(gateway);
        let mut pending = target.clone().into_os_string();
        pending.push(".pending");
        Ok(StagedCert {
            target,
            pending: PathBuf::from(pending),
        })
    }

    /// Delete a managed certificate. Paths outside the store are left alone.
    pub fn remove(&self, path: &Path) -> bool {
        if !self.is_managed(path) {
            return false;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed certificate");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove certificate");
                false
            }
        }
    }
}
