use crate::redact::redact;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use gatewayctl_core::{GatewayConfig, GatewayctlError, GatewayctlResult};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, warn};

/// Environment variable holding the base64-encoded 32-byte encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "GATEWAYCTL_ENCRYPTION_KEY";

/// `additional_config` keys that are always encrypted at rest, whatever the vendor.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "api_key",
    "token",
    "tyk_auth_secret",
    "auth_secret",
    "aws_access_key_id",
    "aws_secret_access_key",
    "client_secret",
];

const TOKEN_PREFIX: &str = "gwenc:v1:";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Which way [`CredentialCodec::process_config`] transforms sensitive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDirection {
    /// Plaintext to ciphertext token, before writing.
    Encrypt,
    /// Ciphertext token to plaintext, after reading.
    Decrypt,
}

/// Encrypts and decrypts sensitive `additional_config` values.
///
/// Tokens look like `gwenc:v1:<nonce>:<ciphertext>` (URL-safe base64, no padding)
/// and are sealed with ChaCha20-Poly1305. Without a key the codec is a
/// pass-through in both directions.
#[derive(Clone)]
pub struct CredentialCodec {
    key: Option<[u8; KEY_LEN]>,
}

impl CredentialCodec {
    /// Load the key from [`ENCRYPTION_KEY_ENV`].
    ///
    /// A missing or blank variable yields a disabled codec and a warning: secrets
    /// will be stored in plaintext. A present but malformed key is a hard error.
    pub fn from_env() -> GatewayctlResult<Self> {
        match std::env::var(ENCRYPTION_KEY_ENV) {
            Ok(value) => Self::new(Some(&value)),
            Err(std::env::VarError::NotPresent) => Self::new(None),
            Err(std::env::VarError::NotUnicode(_)) => {
                error!(env = ENCRYPTION_KEY_ENV, "Encryption key is not valid unicode");
                Err(GatewayctlError::Config(format!(
                    "{ENCRYPTION_KEY_ENV} is not valid unicode"
                )))
            }
        }
    }

    /// Build a codec from an optional base64 key.
    pub fn new(encoded_key: Option<&str>) -> GatewayctlResult<Self> {
        let Some(encoded) = encoded_key.map(str::trim).filter(|k| !k.is_empty()) else {
            warn!(
                env = ENCRYPTION_KEY_ENV,
                "No encryption key configured; gateway credentials will be stored in PLAINTEXT"
            );
            return Ok(Self::disabled());
        };
        let key = parse_key(encoded).inspect_err(|e| {
            error!(env = ENCRYPTION_KEY_ENV, error = %e, "Failed to load encryption key");
        })?;
        debug!("Credential encryption enabled");
        Ok(Self::with_key(key))
    }

    /// A codec using the given raw key.
    pub fn with_key(key: [u8; KEY_LEN]) -> Self {
        Self { key: Some(key) }
    }

    /// A pass-through codec.
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Whether a key is configured.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Generate a fresh random key, encoded for [`ENCRYPTION_KEY_ENV`].
    pub fn generate_key() -> GatewayctlResult<String> {
        let mut key = [0u8; KEY_LEN];
        getrandom::getrandom(&mut key)
            .map_err(|e| GatewayctlError::Crypto(format!("failed to generate key: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(key))
    }

    /// Whether `value` has the shape of a ciphertext token.
    pub fn is_ciphertext(value: &str) -> bool {
        value.starts_with(TOKEN_PREFIX)
    }

    /// Whether `key` belongs to the sensitive field set.
    pub fn is_sensitive_field(key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        SENSITIVE_FIELDS.contains(&key.as_str())
    }

    /// Encrypt one value. Without a key the input is returned unchanged.
    ///
    /// A value is left alone only when it is a token this key can open.
    /// Anything else, including text that merely starts with the token
    /// prefix, is encrypted.
    pub fn encrypt_field(&self, plaintext: &str) -> GatewayctlResult<String> {
        let Some(key) = &self.key else {
            return Ok(plaintext.to_string());
        };
        if Self::is_ciphertext(plaintext) && open_token(key, plaintext).is_ok() {
            debug!("Value is already a ciphertext token, leaving as is");
            return Ok(plaintext.to_string());
        }

        debug!(value = %redact(plaintext), "Encrypting credential");
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| GatewayctlError::Crypto(format!("failed to generate nonce: {e}")))?;
        let aead = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| GatewayctlError::Crypto(format!("failed to initialize cipher: {e}")))?;
        let ciphertext = aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| {
                error!(value = %redact(plaintext), "Credential encryption failed");
                GatewayctlError::Crypto(format!("failed to encrypt credential: {e}"))
            })?;

        Ok(format!(
            "{TOKEN_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Decrypt one value.
    ///
    /// Never fails: values that are not tokens, or any value when no key is
    /// configured, come back unchanged, and a token that cannot be opened
    /// (wrong key, corruption) is returned as-is after logging an error.
    pub fn decrypt_field(&self, value: &str) -> String {
        let Some(key) = &self.key else {
            return value.to_string();
        };
        if !Self::is_ciphertext(value) {
            return value.to_string();
        }

        debug!(token = %redact(value), "Decrypting credential");
        match open_token(key, value) {
            Ok(plaintext) => plaintext,
            Err(reason) => {
                error!(
                    token = %redact(value),
                    reason = %reason,
                    "Failed to decrypt credential; returning stored value"
                );
                value.to_string()
            }
        }
    }

    /// Apply `direction` to every sensitive string value of `config`.
    ///
    /// Non-sensitive keys and non-string values pass through untouched.
    pub fn process_config(
        &self,
        config: &GatewayConfig,
        direction: CodecDirection,
    ) -> GatewayctlResult<GatewayConfig> {
        let mut processed = config.clone();
        for (key, value) in processed.additional_config.iter_mut() {
            if !Self::is_sensitive_field(key) {
                continue;
            }
            if let Value::String(current) = value {
                let transformed = match direction {
                    CodecDirection::Encrypt => self.encrypt_field(current)?,
                    CodecDirection::Decrypt => self.decrypt_field(current),
                };
                *current = transformed;
            }
        }
        Ok(processed)
    }
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn parse_key(encoded: &str) -> GatewayctlResult<[u8; KEY_LEN]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| STANDARD.decode(encoded))
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|e| {
            GatewayctlError::Config(format!("{ENCRYPTION_KEY_ENV} is not valid base64: {e}"))
        })?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        GatewayctlError::Config(format!(
            "{ENCRYPTION_KEY_ENV} must decode to {KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

fn open_token(key: &[u8; KEY_LEN], token: &str) -> Result<String, String> {
    let body = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| "missing token prefix".to_string())?;
    let (nonce_b64, ciphertext_b64) = body
        .split_once(':')
        .ok_or_else(|| "malformed token".to_string())?;

    let nonce = URL_SAFE_NO_PAD
        .decode(nonce_b64)
        .map_err(|e| format!("invalid nonce encoding: {e}"))?;
    if nonce.len() != NONCE_LEN {
        return Err(format!("nonce must be {NONCE_LEN} bytes, got {}", nonce.len()));
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(ciphertext_b64)
        .map_err(|e| format!("invalid ciphertext encoding: {e}"))?;

    let aead = ChaCha20Poly1305::new_from_slice(key).map_err(|e| e.to_string())?;
    let plaintext = aead
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| "authentication failed (wrong key or corrupted token)".to_string())?;
    String::from_utf8(plaintext).map_err(|e| format!("plaintext is not utf-8: {e}"))
}
