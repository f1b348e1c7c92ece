#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for ConfigStore: round trips, uniqueness, encryption at rest.

use gatewayctl_core::{GatewayConfig, GatewayctlError};
use gatewayctl_security::CredentialCodec;
use gatewayctl_store::ConfigStore;
use std::path::PathBuf;

fn keyed_codec() -> CredentialCodec {
    CredentialCodec::new(Some(&CredentialCodec::generate_key().unwrap())).unwrap()
}

/// Helper: a file-backed store in a temp directory.
fn temp_store(codec: CredentialCodec) -> (ConfigStore, PathBuf, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("data").join("gatewayctl.db");
    let store = ConfigStore::open(&path, codec).unwrap();
    (store, path, tmp)
}

fn raw_config_json(path: &PathBuf, name: &str) -> String {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.query_row(
        "SELECT config_json FROM gateways WHERE name = ?1",
        [name],
        |row| row.get(0),
    )
    .unwrap()
}

fn wso2_config(name: &str) -> GatewayConfig {
    GatewayConfig::new(name, "https://apim.internal:9443")
        .with_verify_ssl(false)
        .with_cert_path("/etc/gatewayctl/certificates/apim.pem")
        .with_option("username", "admin")
        .with_option("password", "hunter2")
        .with_option("page_size", 50)
}

#[test]
fn test_kong_end_to_end_scenario() {
    let (store, _path, _tmp) = temp_store(keyed_codec());
    let config =
        GatewayConfig::new("prod", "http://localhost:8001").with_option("api_key", "secret123");

    store.add("prod", "kong", &config).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "prod");
    assert_eq!(listed[0].gateway_type, "kong");
    assert_eq!(listed[0].config.get_str("api_key"), Some("secret123"));

    assert!(store.delete("prod").unwrap());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_round_trip_preserves_every_field() {
    let (store, _path, _tmp) = temp_store(keyed_codec());
    let config = wso2_config("apim");
    store.add("apim", "wso2", &config).unwrap();

    let loaded = store.get("apim").unwrap().unwrap();
    assert_eq!(loaded.config, config);
    assert!(!loaded.config.verify_ssl);
    assert_eq!(loaded.config.additional_config["page_size"], 50);
}

#[test]
fn test_round_trip_without_key() {
    let (store, path, _tmp) = temp_store(CredentialCodec::disabled());
    let config = wso2_config("apim");
    store.add("apim", "wso2", &config).unwrap();

    assert_eq!(store.get("apim").unwrap().unwrap().config, config);
    assert!(raw_config_json(&path, "apim").contains("hunter2"));
}

#[test]
fn test_ciphertext_never_leaks_plaintext() {
    let (store, path, _tmp) = temp_store(keyed_codec());
    store.add("apim", "wso2", &wso2_config("apim")).unwrap();

    let raw = raw_config_json(&path, "apim");
    assert!(!raw.contains("hunter2"));
    assert!(raw.contains("gwenc:v1:"));
    assert!(raw.contains("\"username\":\"admin\""));
}

#[test]
fn test_duplicate_add_fails_and_keeps_original() {
    let (store, _path, _tmp) = temp_store(keyed_codec());
    let original = GatewayConfig::new("edge", "http://kong-a:8001");
    store.add("edge", "kong", &original).unwrap();

    let clash = GatewayConfig::new("edge", "http://kong-b:8001");
    let err = store.add("edge", "tyk", &clash).unwrap_err();
    assert!(matches!(err, GatewayctlError::DuplicateName(n) if n == "edge"));

    let kept = store.get("edge").unwrap().unwrap();
    assert_eq!(kept.gateway_type, "kong");
    assert_eq!(kept.config.url, "http://kong-a:8001");
}

#[test]
fn test_delete_is_idempotent() {
    let (store, _path, _tmp) = temp_store(CredentialCodec::disabled());
    store
        .add("edge", "kong", &GatewayConfig::new("edge", "http://kong:8001"))
        .unwrap();
    assert!(store.delete("edge").unwrap());
    assert!(!store.delete("edge").unwrap());
    assert!(!store.delete("never-existed").unwrap());
}

#[test]
fn test_update_replaces_and_renames() {
    let (store, _path, _tmp) = temp_store(keyed_codec());
    store.add("apim", "wso2", &wso2_config("apim")).unwrap();

    let renamed = GatewayConfig::new("apim-prod", "https://apim.prod:9443")
        .with_option("username", "ops")
        .with_option("password", "n3w-pass");
    store.update("apim", "wso2", &renamed).unwrap();

    assert!(store.get("apim").unwrap().is_none());
    let loaded = store.get("apim-prod").unwrap().unwrap();
    assert_eq!(loaded.config, renamed);
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_update_unknown_name_is_not_found() {
    let (store, _path, _tmp) = temp_store(CredentialCodec::disabled());
    let config = GatewayConfig::new("ghost", "http://kong:8001");
    let err = store.update("ghost", "kong", &config).unwrap_err();
    assert!(matches!(err, GatewayctlError::NotFound(n) if n == "ghost"));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_update_cannot_rename_onto_existing() {
    let (store, _path, _tmp) = temp_store(CredentialCodec::disabled());
    store
        .add("a", "kong", &GatewayConfig::new("a", "http://a:8001"))
        .unwrap();
    store
        .add("b", "kong", &GatewayConfig::new("b", "http://b:8001"))
        .unwrap();

    let err = store
        .update("a", "kong", &GatewayConfig::new("b", "http://a2:8001"))
        .unwrap_err();
    assert!(matches!(err, GatewayctlError::DuplicateName(n) if n == "b"));
    assert_eq!(store.get("b").unwrap().unwrap().config.url, "http://b:8001");
    assert!(store.exists("a").unwrap());
}

#[test]
fn test_clear_removes_everything() {
    let (store, _path, _tmp) = temp_store(CredentialCodec::disabled());
    for name in ["a", "b", "c"] {
        let config =
            GatewayConfig::new(name, "http://tyk:8080").with_option("tyk_auth_secret", "s");
        store.add(name, "tyk", &config).unwrap();
    }
    assert_eq!(store.clear().unwrap(), 3);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_records_survive_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("gatewayctl.db");
    let key = CredentialCodec::generate_key().unwrap();

    {
        let store = ConfigStore::open(&path, CredentialCodec::new(Some(&key)).unwrap()).unwrap();
        store.add("apim", "wso2", &wso2_config("apim")).unwrap();
    }

    let store = ConfigStore::open(&path, CredentialCodec::new(Some(&key)).unwrap()).unwrap();
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].config.get_str("password"), Some("hunter2"));
}

#[test]
fn test_reading_with_other_key_keeps_ciphertext() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("gatewayctl.db");

    {
        let store = ConfigStore::open(&path, keyed_codec()).unwrap();
        store.add("apim", "wso2", &wso2_config("apim")).unwrap();
    }

    let store = ConfigStore::open(&path, keyed_codec()).unwrap();
    let loaded = store.get("apim").unwrap().unwrap();
    assert_eq!(loaded.config.get_str("username"), Some("admin"));
    assert!(CredentialCodec::is_ciphertext(
        loaded.config.get_str("password").unwrap()
    ));
}
