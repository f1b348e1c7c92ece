use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "gatewayctl.toml";

/// Contents of `gatewayctl.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding the database and managed certificates.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite file. Defaults to `<data_dir>/gatewayctl.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Where imported certificates are kept. Defaults to `<data_dir>/certificates`.
    #[serde(default)]
    pub certificates_dir: Option<PathBuf>,
    /// Request timeout for gateways that do not set `timeout_secs` themselves.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
            certificates_dir: None,
            request_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load settings. An explicit path must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Self::parse(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }

    /// Parse settings from TOML text.
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("gatewayctl.db"))
    }

    /// Resolved certificate directory.
    pub fn certificates_path(&self) -> PathBuf {
        self.certificates_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("certificates"))
    }
}
