use gatewayctl_core::{GatewayConfig, GatewayctlError, GatewayctlResult};
use gatewayctl_security::{CodecDirection, CredentialCodec};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use tracing::{debug, info, warn};

/// One persisted gateway, decrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGateway {
    /// Storage key, equal to `config.name`.
    pub name: String,
    /// Lower-cased vendor tag.
    pub gateway_type: String,
    /// The connection profile with plaintext credentials.
    pub config: GatewayConfig,
}

/// Durable mapping from gateway name to `(type, config)`.
///
/// All statements go through one connection guarded by a mutex, and every
/// public operation runs in its own transaction.
pub struct ConfigStore {
    conn: Mutex<Connection>,
    codec: CredentialCodec,
}

fn db_err(e: rusqlite::Error) -> GatewayctlError {
    GatewayctlError::Persistence(e.to_string())
}

impl ConfigStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>, codec: CredentialCodec) -> GatewayctlResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        info!(path = %path.display(), encrypted = codec.is_enabled(), "Opened gateway store");
        Self::with_connection(conn, codec)
    }

    /// A store that lives only as long as the value.
    pub fn open_in_memory(codec: CredentialCodec) -> GatewayctlResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn, codec)
    }

    fn with_connection(conn: Connection, codec: CredentialCodec) -> GatewayctlResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS gateways (
                name TEXT PRIMARY KEY NOT NULL,
                type TEXT NOT NULL,
                config_json TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            codec,
        })
    }

    /// The codec used for sensitive fields.
    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    /// Insert a new gateway. Fails with `DuplicateName` if `name` is taken.
    pub fn add(
        &self,
        name: &str,
        gateway_type: &str,
        config: &GatewayConfig,
    ) -> GatewayctlResult<()> {
        config.validate()?;
        if config.name != name {
            return Err(GatewayctlError::Config(format!(
                "record name '{}' does not match config name '{}'",
                name, config.name
            )));
        }
        let config_json = self.encode(config)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        if exists_in(&tx, name)? {
            warn!(gateway = %name, "Refusing to add gateway with duplicate name");
            return Err(GatewayctlError::DuplicateName(name.to_string()));
        }
        tx.execute(
            "INSERT INTO gateways (name, type, config_json) VALUES (?1, ?2, ?3)",
            params![name, normalize_type(gateway_type), config_json],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        info!(gateway = %name, gateway_type = %gateway_type, "Gateway saved");
        Ok(())
    }

    /// Replace the record stored under `original_name`.
    ///
    /// The new key is `config.name`, so this also renames. Fails with
    /// `NotFound` when `original_name` is absent and with `DuplicateName` when
    /// renaming onto another existing gateway.
    pub fn update(
        &self,
        original_name: &str,
        gateway_type: &str,
        config: &GatewayConfig,
    ) -> GatewayctlResult<()> {
        config.validate()?;
        let config_json = self.encode(config)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        if !exists_in(&tx, original_name)? {
            return Err(GatewayctlError::NotFound(original_name.to_string()));
        }
        if config.name != original_name && exists_in(&tx, &config.name)? {
            return Err(GatewayctlError::DuplicateName(config.name.clone()));
        }
        tx.execute(
            "UPDATE gateways SET name = ?1, type = ?2, config_json = ?3 WHERE name = ?4",
            params![
                config.name,
                normalize_type(gateway_type),
                config_json,
                original_name
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        if config.name != original_name {
            info!(from = %original_name, to = %config.name, "Gateway renamed");
        }
        info!(gateway = %config.name, "Gateway updated");
        Ok(())
    }

    /// Remove a gateway. Returns whether a record was removed; absent names are not an error.
    pub fn delete(&self, name: &str) -> GatewayctlResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM gateways WHERE name = ?1", params![name])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        if removed > 0 {
            info!(gateway = %name, "Gateway deleted");
        } else {
            debug!(gateway = %name, "Delete of unknown gateway ignored");
        }
        Ok(removed > 0)
    }

    /// Every stored gateway, decrypted, ordered by name.
    ///
    /// Rows that fail to decode are logged and skipped.
    pub fn list(&self) -> GatewayctlResult<Vec<StoredGateway>> {
        let rows = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction().map_err(db_err)?;
            let rows = {
                let mut stmt = tx
                    .prepare("SELECT name, type, config_json FROM gateways ORDER BY name")
                    .map_err(db_err)?;
                let mapped = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })
                    .map_err(db_err)?;
                mapped.collect::<Result<Vec<_>, _>>().map_err(db_err)?
            };
            tx.commit().map_err(db_err)?;
            rows
        };

        let mut gateways = Vec::with_capacity(rows.len());
        for (name, gateway_type, config_json) in rows {
            match self.decode(&name, &config_json) {
                Ok(config) => gateways.push(StoredGateway {
                    name,
                    gateway_type,
                    config,
                }),
                Err(e) => {
                    warn!(gateway = %name, error = %e, "Skipping unreadable gateway record");
                }
            }
        }
        debug!(count = gateways.len(), "Loaded gateways");
        Ok(gateways)
    }

    /// One gateway by name.
    pub fn get(&self, name: &str) -> GatewayctlResult<Option<StoredGateway>> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT type, config_json FROM gateways WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(db_err)?
        };

        match row {
            Some((gateway_type, config_json)) => Ok(Some(StoredGateway {
                name: name.to_string(),
                gateway_type,
                config: self.decode(name, &config_json)?,
            })),
            None => Ok(None),
        }
    }

    /// Whether a gateway with this name is stored.
    pub fn exists(&self, name: &str) -> GatewayctlResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let found = exists_in(&tx, name)?;
        tx.commit().map_err(db_err)?;
        Ok(found)
    }

    /// Remove every gateway. Returns how many records were removed.
    pub fn clear(&self) -> GatewayctlResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let removed = tx.execute("DELETE FROM gateways", []).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        info!(removed, "Gateway store cleared");
        Ok(removed)
    }

    fn encode(&self, config: &GatewayConfig) -> GatewayctlResult<String> {
        let encrypted = self.codec.process_config(config, CodecDirection::Encrypt)?;
        Ok(serde_json::to_string(&encrypted)?)
    }

    fn decode(&self, name: &str, config_json: &str) -> GatewayctlResult<GatewayConfig> {
        let mut config: GatewayConfig = serde_json::from_str(config_json)?;
        // The row key is authoritative.
        config.name = name.to_string();
        self.codec.process_config(&config, CodecDirection::Decrypt)
    }
}

fn exists_in(tx: &Transaction<'_>, name: &str) -> GatewayctlResult<bool> {
    tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM gateways WHERE name = ?1)",
        params![name],
        |row| row.get::<_, bool>(0),
    )
    .map_err(db_err)
}

fn normalize_type(gateway_type: &str) -> String {
    gateway_type.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        ConfigStore::open_in_memory(CredentialCodec::disabled()).unwrap()
    }

    #[test]
    fn add_normalizes_type_tag() {
        let store = store();
        let config = GatewayConfig::new("edge", "http://localhost:8001");
        store.add("edge", " Kong ", &config).unwrap();
        assert_eq!(store.get("edge").unwrap().unwrap().gateway_type, "kong");
    }

    #[test]
    fn add_rejects_mismatched_names() {
        let store = store();
        let config = GatewayConfig::new("edge", "http://localhost:8001");
        let err = store.add("other", "kong", &config).unwrap_err();
        assert!(matches!(err, GatewayctlError::Config(_)));
        assert!(!store.exists("other").unwrap());
    }

    #[test]
    fn add_rejects_invalid_config() {
        let store = store();
        let config = GatewayConfig::new("edge", "");
        assert!(matches!(
            store.add("edge", "kong", &config),
            Err(GatewayctlError::Config(_))
        ));
    }

    #[test]
    fn corrupt_rows_are_skipped_by_list() {
        let store = store();
        store
            .add("good", "tyk", &GatewayConfig::new("good", "http://tyk:8080"))
            .unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO gateways (name, type, config_json) VALUES ('bad', 'tyk', '{not json')",
                [],
            )
            .unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "good");
        assert!(store.get("bad").is_err());
    }
}
