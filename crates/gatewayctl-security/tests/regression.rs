#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Regression tests for gatewayctl-security: TrustPolicy, certificate loading,
//! CredentialCodec over full configs.

use gatewayctl_core::{GatewayConfig, GatewayctlError};
use gatewayctl_security::tls::{load_certs, validate_trust};
use gatewayctl_security::{CodecDirection, CredentialCodec, TrustPolicy, SENSITIVE_FIELDS};
use std::io::Write;

// Structurally valid PEM; the payload is not a real certificate, which is all
// the loader looks at.
const FAKE_PEM: &str = "-----BEGIN CERTIFICATE-----\nAAECAwQFBgcICQ==\n-----END CERTIFICATE-----\n";

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// --- TrustPolicy ---

#[test]
fn test_trust_policy_defaults_to_system_roots() {
    let config = GatewayConfig::new("kong", "https://kong:8444");
    assert_eq!(TrustPolicy::for_config(&config), TrustPolicy::SystemRoots);
}

#[test]
fn test_trust_policy_prefers_cert_path_when_verifying() {
    let config = GatewayConfig::new("kong", "https://kong:8444").with_cert_path("/etc/ca.pem");
    assert_eq!(
        TrustPolicy::for_config(&config),
        TrustPolicy::CustomCa("/etc/ca.pem".into())
    );
}

#[test]
fn test_trust_policy_disabled_overrides_cert_path() {
    let config = GatewayConfig::new("kong", "https://kong:8444")
        .with_cert_path("/etc/ca.pem")
        .with_verify_ssl(false);
    assert_eq!(TrustPolicy::for_config(&config), TrustPolicy::Disabled);
}

// --- Certificate loading ---

#[test]
fn test_load_certs_reads_pem_blocks() {
    let file = write_temp(&format!("{FAKE_PEM}{FAKE_PEM}"));
    let certs = load_certs(file.path()).unwrap();
    assert_eq!(certs.len(), 2);
    assert_eq!(certs[0], vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_load_certs_rejects_file_without_certs() {
    let file = write_temp("just some text\n");
    let err = load_certs(file.path()).unwrap_err();
    assert!(matches!(err, GatewayctlError::Config(msg) if msg.contains("No certificates")));
}

#[test]
fn test_load_certs_missing_file() {
    let err = load_certs(std::path::Path::new("/nonexistent/gatewayctl/ca.pem")).unwrap_err();
    assert!(matches!(err, GatewayctlError::Config(_)));
}

#[test]
fn test_validate_trust_checks_existence_only_when_verifying() {
    let missing = GatewayConfig::new("g", "https://g").with_cert_path("/nonexistent/ca.pem");
    assert!(validate_trust(&missing).is_err());
    assert!(validate_trust(&missing.with_verify_ssl(false)).is_ok());

    let file = write_temp(FAKE_PEM);
    let present = GatewayConfig::new("g", "https://g").with_cert_path(file.path());
    assert!(validate_trust(&present).is_ok());
}

// --- CredentialCodec ---

#[test]
fn test_every_sensitive_field_is_encrypted() {
    let codec = CredentialCodec::new(Some(&CredentialCodec::generate_key().unwrap())).unwrap();
    let mut config = GatewayConfig::new("all", "http://localhost");
    for field in SENSITIVE_FIELDS {
        config = config.with_option(*field, format!("value-of-{field}"));
    }
    config = config.with_option("region", "eu-west-1");

    let encrypted = codec
        .process_config(&config, CodecDirection::Encrypt)
        .unwrap();
    for field in SENSITIVE_FIELDS {
        let stored = encrypted.get_str(field).unwrap();
        assert!(CredentialCodec::is_ciphertext(stored), "{field} not encrypted");
        assert!(!stored.contains("value-of-"));
    }
    assert_eq!(encrypted.get_str("region"), Some("eu-west-1"));

    let decrypted = codec
        .process_config(&encrypted, CodecDirection::Decrypt)
        .unwrap();
    assert_eq!(decrypted, config);
}

#[test]
fn test_unreadable_secret_leaves_rest_of_config_usable() {
    let writer = CredentialCodec::new(Some(&CredentialCodec::generate_key().unwrap())).unwrap();
    let reader = CredentialCodec::new(Some(&CredentialCodec::generate_key().unwrap())).unwrap();
    let config = GatewayConfig::new("wso2", "https://apim:9443")
        .with_option("username", "admin")
        .with_option("password", "hunter2");

    let encrypted = writer
        .process_config(&config, CodecDirection::Encrypt)
        .unwrap();
    let decrypted = reader
        .process_config(&encrypted, CodecDirection::Decrypt)
        .unwrap();

    assert_eq!(decrypted.get_str("username"), Some("admin"));
    assert_eq!(decrypted.get_str("password"), encrypted.get_str("password"));
}
