use crate::certs::CertificateStore;
use futures_util::future::join_all;
use gatewayctl_adapters::{GatewayAdapter, GatewayClient, GatewayFactory};
use gatewayctl_core::{ApiDefinition, GatewayConfig, GatewayctlError, GatewayctlResult};
use gatewayctl_security::{redact, CredentialCodec};
use gatewayctl_store::{ConfigStore, StoredGateway};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// What a command prints, and whether the process should exit successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub body: Value,
    pub success: bool,
}

impl Output {
    fn ok(body: Value) -> Self {
        Self {
            body,
            success: true,
        }
    }

    fn flag(body: Value, success: bool) -> Self {
        Self { body, success }
    }
}

/// Input of `gatewayctl add`.
#[derive(Debug, Clone, Default)]
pub struct NewGateway {
    pub name: String,
    pub gateway_type: String,
    pub url: String,
    pub verify_ssl: bool,
    pub cert: Option<PathBuf>,
    pub options: BTreeMap<String, Value>,
}

/// Input of `gatewayctl update`. Unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct GatewayChanges {
    pub rename: Option<String>,
    pub gateway_type: Option<String>,
    pub url: Option<String>,
    pub verify_ssl: Option<bool>,
    pub cert: Option<PathBuf>,
    pub options: BTreeMap<String, Value>,
    pub remove_options: Vec<String>,
}

/// The control plane behind every subcommand.
pub struct App {
    store: ConfigStore,
    factory: GatewayFactory,
    certs: CertificateStore,
    default_timeout: Option<u64>,
}

impl App {
    pub fn new(
        store: ConfigStore,
        factory: GatewayFactory,
        certs: CertificateStore,
        default_timeout: Option<u64>,
    ) -> Self {
        Self {
            store,
            factory,
            certs,
            default_timeout,
        }
    }

    /// Supported vendor tags.
    pub fn types(&self) -> Output {
        Output::ok(json!(self.factory.list_supported_types()))
    }

    /// Every stored gateway with secrets shortened.
    pub fn list(&self) -> GatewayctlResult<Output> {
        let gateways: Vec<Value> = self.store.list()?.iter().map(summary).collect();
        Ok(Output::ok(Value::Array(gateways)))
    }

    /// Save a new gateway, importing its certificate if one is given.
    pub fn add(&self, new: NewGateway) -> GatewayctlResult<Output> {
        let gateway_type = new.gateway_type.trim().to_ascii_lowercase();
        if !self.factory.supports(&gateway_type) {
            return Err(GatewayctlError::UnsupportedGatewayType(new.gateway_type));
        }
        if self.store.exists(&new.name)? {
            return Err(GatewayctlError::DuplicateName(new.name));
        }

        let mut config = GatewayConfig::new(&new.name, &new.url).with_verify_ssl(new.verify_ssl);
        config.additional_config = new.options;
        config.validate()?;

        let imported = match &new.cert {
            Some(source) => Some(self.certs.import(&new.name, source)?),
            None => None,
        };
        config.cert_path = imported.clone();

        if let Err(e) = self.store.add(&new.name, &gateway_type, &config) {
            if let Some(path) = imported {
                self.certs.remove(&path);
            }
            return Err(e);
        }
        let stored = StoredGateway {
            name: new.name,
            gateway_type,
            config,
        };
        Ok(Output::ok(summary(&stored)))
    }

    /// Apply `changes` to a stored gateway, renaming it if asked.
    pub fn update(&self, name: &str, changes: GatewayChanges) -> GatewayctlResult<Output> {
        let current = self.stored(name)?;
        let mut config = current.config.clone();

        let gateway_type = match changes.gateway_type {
            Some(tag) => {
                let tag = tag.trim().to_ascii_lowercase();
                if !self.factory.supports(&tag) {
                    return Err(GatewayctlError::UnsupportedGatewayType(tag));
                }
                tag
            }
            None => current.gateway_type.clone(),
        };
        if let Some(rename) = changes.rename {
            config.name = rename;
        }
        if let Some(url) = changes.url {
            config.url = url;
        }
        if let Some(verify_ssl) = changes.verify_ssl {
            config.verify_ssl = verify_ssl;
        }
        for key in &changes.remove_options {
            config.additional_config.remove(key);
        }
        config.additional_config.extend(changes.options);
        config.validate()?;

        if config.name != name && self.store.exists(&config.name)? {
            return Err(GatewayctlError::DuplicateName(config.name));
        }

        let previous_cert = current.config.cert_path.clone();
        let staged = match (&changes.cert, &previous_cert) {
            (Some(source), _) => Some(self.certs.stage_import(&config.name, source)?),
            (None, Some(path)) => self.certs.stage_copy(path, &config.name)?,
            (None, None) => None,
        };
        if let Some(staged) = &staged {
            config.cert_path = Some(staged.target().to_path_buf());
        }

        if let Err(e) = self.store.update(name, &gateway_type, &config) {
            if let Some(staged) = staged {
                self.certs.discard(staged);
            }
            return Err(e);
        }

        if let Some(staged) = staged {
            let installed = self.certs.commit(staged)?;
            if let Some(old) = previous_cert.filter(|old| *old != installed) {
                self.certs.remove(&old);
            }
        }
        let stored = StoredGateway {
            name: config.name.clone(),
            gateway_type,
            config,
        };
        Ok(Output::ok(summary(&stored)))
    }

    /// Delete a gateway and its managed certificate.
    pub fn remove(&self, name: &str) -> GatewayctlResult<Output> {
        let existing = self.store.get(name)?;
        let removed = self.store.delete(name)?;
        if let Some(path) = existing.and_then(|g| g.config.cert_path) {
            self.certs.remove(&path);
        }
        Ok(Output::flag(json!({ "name": name, "removed": removed }), removed))
    }

    /// Delete every gateway.
    pub fn clear(&self) -> GatewayctlResult<Output> {
        let gateways = self.store.list()?;
        let removed = self.store.clear()?;
        for path in gateways.into_iter().filter_map(|g| g.config.cert_path) {
            self.certs.remove(&path);
        }
        Ok(Output::ok(json!({ "removed": removed })))
    }

    /// Check one gateway answers its management API.
    pub async fn test(&self, name: &str) -> GatewayctlResult<Output> {
        let client = self.connect(name)?;
        let reachable = client.test_connection().await;
        Ok(Output::flag(
            json!({ "name": name, "reachable": reachable }),
            reachable,
        ))
    }

    /// Check every stored gateway concurrently.
    pub async fn test_all(&self) -> GatewayctlResult<Output> {
        let gateways = self.store.list()?;
        let checks = gateways.iter().map(|gateway| async move {
            let reachable = match self.client_for(gateway) {
                Ok(client) => client.test_connection().await,
                Err(e) => {
                    warn!(gateway = %gateway.name, error = %e, "Cannot build adapter");
                    false
                }
            };
            json!({ "name": gateway.name, "reachable": reachable })
        });
        let results = join_all(checks).await;
        let success = results
            .iter()
            .all(|r| r.get("reachable").and_then(Value::as_bool) == Some(true));
        Ok(Output::flag(Value::Array(results), success))
    }

    /// APIs published on a gateway.
    pub async fn apis(&self, name: &str) -> GatewayctlResult<Output> {
        let client = self.connect(name)?;
        let apis = client.get_apis().await;
        Ok(Output::ok(serde_json::to_value(apis)?))
    }

    /// Vendor metrics for one API.
    pub async fn metrics(&self, name: &str, api_id: &str) -> GatewayctlResult<Output> {
        let client = self.connect(name)?;
        Ok(Output::ok(client.get_api_metrics(api_id).await))
    }

    /// Create an API from a JSON definition.
    pub async fn create_api(
        &self,
        name: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<Output> {
        let client = self.connect(name)?;
        let created = client.create_api(definition).await?;
        info!(gateway = %name, api_id = %created.id, "API created");
        Ok(Output::ok(serde_json::to_value(created)?))
    }

    /// Update an API from a JSON definition.
    pub async fn update_api(
        &self,
        name: &str,
        api_id: &str,
        definition: &ApiDefinition,
    ) -> GatewayctlResult<Output> {
        let client = self.connect(name)?;
        let updated = client.update_api(api_id, definition).await?;
        Ok(Output::ok(serde_json::to_value(updated)?))
    }

    /// Delete an API.
    pub async fn delete_api(&self, name: &str, api_id: &str) -> GatewayctlResult<Output> {
        let client = self.connect(name)?;
        let deleted = client.delete_api(api_id).await;
        Ok(Output::flag(
            json!({ "gateway": name, "api_id": api_id, "deleted": deleted }),
            deleted,
        ))
    }

    /// A fresh encryption key.
    pub fn keygen() -> GatewayctlResult<Output> {
        Ok(Output::ok(json!({ "key": CredentialCodec::generate_key()? })))
    }

    /// Build the adapter for a stored gateway.
    pub fn connect(&self, name: &str) -> GatewayctlResult<GatewayClient> {
        let gateway = self.stored(name)?;
        self.client_for(&gateway)
    }

    fn stored(&self, name: &str) -> GatewayctlResult<StoredGateway> {
        self.store
            .get(name)?
            .ok_or_else(|| GatewayctlError::NotFound(name.to_string()))
    }

    fn client_for(&self, gateway: &StoredGateway) -> GatewayctlResult<GatewayClient> {
        let mut config = gateway.config.clone();
        if let Some(timeout) = self.default_timeout {
            config
                .additional_config
                .entry("timeout_secs".to_string())
                .or_insert_with(|| json!(timeout));
        }
        self.factory.create(&gateway.gateway_type, config)
    }
}

/// Parse `key=value` pairs. Values are kept as strings.
pub fn parse_options(pairs: &[String]) -> GatewayctlResult<BTreeMap<String, Value>> {
    let mut options = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            GatewayctlError::Config(format!("option '{pair}' must look like key=value"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(GatewayctlError::Config(format!("option '{pair}' has an empty key")));
        }
        options.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(options)
}

fn summary(gateway: &StoredGateway) -> Value {
    let options: Map<String, Value> = gateway
        .config
        .additional_config
        .iter()
        .map(|(key, value)| {
            let shown = match value {
                Value::String(s) if CredentialCodec::is_sensitive_field(key) => {
                    Value::String(redact(s))
                }
                other => other.clone(),
            };
            (key.clone(), shown)
        })
        .collect();
    json!({
        "name": gateway.name,
        "type": gateway.gateway_type,
        "url": gateway.config.url,
        "verify_ssl": gateway.config.verify_ssl,
        "cert_path": gateway.config.cert_path,
        "additional_config": options,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAKE_PEM: &str = "-----BEGIN CERTIFICATE-----\nAAECAwQFBgcICQ==\n-----END CERTIFICATE-----\n";

    fn app(tmp: &tempfile::TempDir) -> App {
        let store = ConfigStore::open_in_memory(CredentialCodec::disabled()).unwrap();
        App::new(
            store,
            GatewayFactory::new(),
            CertificateStore::new(tmp.path().join("certs")),
            Some(5),
        )
    }

    fn kong(name: &str, url: &str) -> NewGateway {
        NewGateway {
            name: name.into(),
            gateway_type: "Kong".into(),
            url: url.into(),
            verify_ssl: true,
            cert: None,
            options: parse_options(&["api_key=secret123".to_string()]).unwrap(),
        }
    }

    #[test]
    fn options_parse_as_strings() {
        let options = parse_options(&["a=1".into(), "b=x=y".into()]).unwrap();
        assert_eq!(options["a"], json!("1"));
        assert_eq!(options["b"], json!("x=y"));
        assert!(parse_options(&["novalue".into()]).is_err());
        assert!(parse_options(&["=v".into()]).is_err());
    }

    #[test]
    fn add_then_list_redacts_secrets() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        app.add(kong("prod", "http://kong:8001")).unwrap();

        let listed = app.list().unwrap().body;
        assert_eq!(listed[0]["name"], "prod");
        assert_eq!(listed[0]["type"], "kong");
        assert_eq!(listed[0]["additional_config"]["api_key"], "secr***");
    }

    #[test]
    fn add_rejects_unknown_type_and_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        let mut bad = kong("x", "http://kong:8001");
        bad.gateway_type = "apigee".into();
        assert!(matches!(
            app.add(bad),
            Err(GatewayctlError::UnsupportedGatewayType(_))
        ));

        app.add(kong("prod", "http://kong:8001")).unwrap();
        assert!(matches!(
            app.add(kong("prod", "http://other:8001")),
            Err(GatewayctlError::DuplicateName(_))
        ));
    }

    #[test]
    fn update_merges_options_and_renames() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        app.add(kong("prod", "http://kong:8001")).unwrap();

        let changes = GatewayChanges {
            rename: Some("prod-eu".into()),
            url: Some("http://kong-eu:8001".into()),
            options: parse_options(&["timeout_secs=9".into()]).unwrap(),
            ..GatewayChanges::default()
        };
        let out = app.update("prod", changes).unwrap().body;
        assert_eq!(out["name"], "prod-eu");
        assert_eq!(out["url"], "http://kong-eu:8001");
        assert_eq!(out["additional_config"]["timeout_secs"], "9");
        assert_eq!(out["additional_config"]["api_key"], "secr***");

        assert!(matches!(
            app.update("prod", GatewayChanges::default()),
            Err(GatewayctlError::NotFound(_))
        ));
    }

    #[test]
    fn certificate_follows_gateway_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        let mut pem = tempfile::NamedTempFile::new().unwrap();
        pem.write_all(FAKE_PEM.as_bytes()).unwrap();

        let mut new = kong("edge", "https://kong:8443");
        new.cert = Some(pem.path().to_path_buf());
        let added = app.add(new).unwrap().body;
        let first = PathBuf::from(added["cert_path"].as_str().unwrap());
        assert!(first.exists());

        let renamed = app
            .update(
                "edge",
                GatewayChanges {
                    rename: Some("edge2".into()),
                    ..GatewayChanges::default()
                },
            )
            .unwrap()
            .body;
        let second = PathBuf::from(renamed["cert_path"].as_str().unwrap());
        assert!(!first.exists());
        assert!(second.exists());

        let out = app.remove("edge2").unwrap();
        assert!(out.success);
        assert!(!second.exists());
    }

    fn file_backed_app(tmp: &tempfile::TempDir) -> App {
        let store =
            ConfigStore::open(tmp.path().join("gateways.db"), CredentialCodec::disabled()).unwrap();
        App::new(
            store,
            GatewayFactory::new(),
            CertificateStore::new(tmp.path().join("certs")),
            Some(5),
        )
    }

    fn reject_updates(tmp: &tempfile::TempDir) {
        let conn = rusqlite::Connection::open(tmp.path().join("gateways.db")).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_updates BEFORE UPDATE ON gateways
             BEGIN SELECT RAISE(ABORT, 'read only'); END;",
        )
        .unwrap();
    }

    #[test]
    fn failed_update_keeps_the_certificate() {
        let tmp = tempfile::tempdir().unwrap();
        let app = file_backed_app(&tmp);
        let mut pem = tempfile::NamedTempFile::new().unwrap();
        pem.write_all(FAKE_PEM.as_bytes()).unwrap();

        let mut new = kong("edge", "https://kong:8443");
        new.cert = Some(pem.path().to_path_buf());
        let added = app.add(new).unwrap().body;
        let original = PathBuf::from(added["cert_path"].as_str().unwrap());
        reject_updates(&tmp);

        let renamed = app.update(
            "edge",
            GatewayChanges {
                rename: Some("edge2".into()),
                ..GatewayChanges::default()
            },
        );
        assert!(matches!(renamed, Err(GatewayctlError::Persistence(_))));
        assert!(original.exists());
        assert!(!app.certs.path_for("edge2").exists());

        let mut replacement = tempfile::NamedTempFile::new().unwrap();
        replacement
            .write_all(FAKE_PEM.replace("AAEC", "BBEC").as_bytes())
            .unwrap();
        let replaced = app.update(
            "edge",
            GatewayChanges {
                cert: Some(replacement.path().to_path_buf()),
                ..GatewayChanges::default()
            },
        );
        assert!(replaced.is_err());
        assert_eq!(std::fs::read_to_string(&original).unwrap(), FAKE_PEM);
        assert_eq!(std::fs::read_dir(tmp.path().join("certs")).unwrap().count(), 1);

        let stored = app.stored("edge").unwrap();
        assert_eq!(stored.config.cert_path.as_deref(), Some(original.as_path()));
    }

    #[test]
    fn replacing_a_certificate_swaps_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        let mut pem = tempfile::NamedTempFile::new().unwrap();
        pem.write_all(FAKE_PEM.as_bytes()).unwrap();
        let mut new = kong("edge", "https://kong:8443");
        new.cert = Some(pem.path().to_path_buf());
        app.add(new).unwrap();

        let second = FAKE_PEM.replace("AAEC", "BBEC");
        let mut replacement = tempfile::NamedTempFile::new().unwrap();
        replacement.write_all(second.as_bytes()).unwrap();
        let out = app
            .update(
                "edge",
                GatewayChanges {
                    cert: Some(replacement.path().to_path_buf()),
                    ..GatewayChanges::default()
                },
            )
            .unwrap()
            .body;
        let path = PathBuf::from(out["cert_path"].as_str().unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), second);
        assert_eq!(std::fs::read_dir(tmp.path().join("certs")).unwrap().count(), 1);
    }

    #[test]
    fn remove_unknown_is_not_successful() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        let out = app.remove("ghost").unwrap();
        assert!(!out.success);
        assert_eq!(out.body["removed"], false);
    }

    #[test]
    fn clear_counts_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        app.add(kong("a", "http://a:8001")).unwrap();
        app.add(kong("b", "http://b:8001")).unwrap();
        assert_eq!(app.clear().unwrap().body["removed"], 2);
        assert_eq!(app.list().unwrap().body, json!([]));
    }

    #[test]
    fn keygen_yields_usable_key() {
        let out = App::keygen().unwrap();
        let key = out.body["key"].as_str().unwrap();
        assert!(CredentialCodec::new(Some(key)).unwrap().is_enabled());
    }

    #[tokio::test]
    async fn commands_reach_the_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "svc-1", "name": "orders" }],
                "next": null
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        app.add(kong("local", &server.uri())).unwrap();

        let tested = app.test("local").await.unwrap();
        assert!(tested.success);

        let apis = app.apis("local").await.unwrap().body;
        assert_eq!(apis[0]["id"], "svc-1");
        assert_eq!(apis[0]["name"], "orders");
    }

    #[tokio::test]
    async fn test_all_reports_each_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        app.add(kong("up", &server.uri())).unwrap();
        app.add(kong("down", "http://127.0.0.1:1")).unwrap();

        let out = app.test_all().await.unwrap();
        assert!(!out.success);
        let results = out.body.as_array().unwrap();
        assert_eq!(results.len(), 2);
        let reachable: BTreeMap<String, bool> = results
            .iter()
            .map(|r| {
                (
                    r["name"].as_str().unwrap().to_string(),
                    r["reachable"].as_bool().unwrap(),
                )
            })
            .collect();
        assert!(reachable["up"]);
        assert!(!reachable["down"]);
    }

    #[tokio::test]
    async fn unknown_gateway_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(&tmp);
        assert!(matches!(
            app.apis("ghost").await,
            Err(GatewayctlError::NotFound(_))
        ));
    }
}
