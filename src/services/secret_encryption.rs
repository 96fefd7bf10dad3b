//! Settings encryption using AES-256-GCM
//!
//! The provider settings bundle is serialized to JSON and sealed with the
//! process key before it reaches the settings store. The stored form is
//! `base64(nonce || ciphertext || tag)` with a fresh random nonce per write.
//!
//! ## Configuration
//!
//! The key is loaded from `EXTSECRETS_ENCRYPTION_KEY` (base64, 32 bytes).
//! Generate one with `openssl rand -base64 32`.

use crate::errors::{ExtSecretsError, Result};
use crate::secrets::{SecretString, SettingsBundle};
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

/// Size of AES-256-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
const TAG_SIZE: usize = 16;

const KEY_SIZE: usize = 32;

/// Encryption key configuration
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Base64-encoded 32-byte key
    pub key_base64: SecretString,
}

impl EncryptionConfig {
    /// Load the key from `EXTSECRETS_ENCRYPTION_KEY`
    pub fn from_env() -> Result<Self> {
        let key_base64 = std::env::var("EXTSECRETS_ENCRYPTION_KEY").map_err(|_| {
            ExtSecretsError::config(
                "EXTSECRETS_ENCRYPTION_KEY environment variable not set. \
                 Generate a key with: openssl rand -base64 32",
            )
        })?;

        Ok(Self { key_base64: SecretString::new(key_base64) })
    }

    /// Configuration from raw key bytes
    pub fn from_key_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key_base64: SecretString::new(base64::engine::general_purpose::STANDARD.encode(key)),
        }
    }
}

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Symmetric encryption of the settings bundle keyed by the process key
#[derive(Clone)]
pub struct SettingsEncryption {
    key_bytes: Arc<Zeroizing<[u8; KEY_SIZE]>>,
    rng: Arc<SystemRandom>,
}

impl SettingsEncryption {
    /// Create the encryption service, validating the configured key
    pub fn new(config: &EncryptionConfig) -> Result<Self> {
        let key_bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(config.key_base64.expose_secret().trim())
                .map_err(|e| {
                    ExtSecretsError::config(format!(
                        "Invalid base64 in EXTSECRETS_ENCRYPTION_KEY: {}",
                        e
                    ))
                })?,
        );

        if key_bytes.len() != KEY_SIZE {
            return Err(ExtSecretsError::config(format!(
                "EXTSECRETS_ENCRYPTION_KEY must be 32 bytes (256 bits), got {} bytes",
                key_bytes.len()
            )));
        }

        let mut key_array = Zeroizing::new([0u8; KEY_SIZE]);
        key_array.copy_from_slice(&key_bytes);

        debug!("Settings encryption initialized");
        Ok(Self { key_bytes: Arc::new(key_array), rng: Arc::new(SystemRandom::new()) })
    }

    /// Seal `plaintext` and return the base64 envelope
    #[instrument(skip(self, plaintext), fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            ExtSecretsError::encryption("Failed to generate random nonce")
        })?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key_bytes[..])
            .map_err(|_| ExtSecretsError::encryption("Failed to create encryption key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut ciphertext = plaintext.to_vec();
        ciphertext.reserve(TAG_SIZE);
        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut ciphertext).map_err(|_| {
            error!("Encryption failed");
            ExtSecretsError::encryption("Failed to encrypt settings")
        })?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(envelope))
    }

    /// Open a base64 envelope produced by [`SettingsEncryption::encrypt`]
    #[instrument(skip(self, envelope), fields(envelope_len = envelope.len()))]
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(envelope.trim())
            .map_err(|e| ExtSecretsError::decryption(format!("Settings are not valid base64: {}", e)))?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ExtSecretsError::decryption("Settings ciphertext is truncated"));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key_bytes[..])
            .map_err(|_| ExtSecretsError::decryption("Failed to create decryption key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut plaintext = ciphertext.to_vec();
        let decrypted = opening_key.open_in_place(Aad::empty(), &mut plaintext).map_err(|_| {
            error!("Settings decryption failed");
            ExtSecretsError::decryption(
                "Authentication failed. The settings were likely saved with a different encryption key",
            )
        })?;

        Ok(decrypted.to_vec())
    }

    /// Serialize and encrypt a settings bundle
    pub fn encrypt_bundle(&self, bundle: &SettingsBundle) -> Result<String> {
        let json = Zeroizing::new(
            serde_json::to_vec(bundle)
                .map_err(|e| ExtSecretsError::serialization("Failed to serialize settings", e))?,
        );
        self.encrypt(&json)
    }

    /// Decrypt and parse a settings bundle
    ///
    /// A blob that decrypts but does not parse is reported as a decryption
    /// failure as well; a partially parsed bundle is never returned.
    pub fn decrypt_bundle(&self, envelope: &str) -> Result<SettingsBundle> {
        let plaintext = Zeroizing::new(self.decrypt(envelope)?);
        serde_json::from_slice(&plaintext).map_err(|e| {
            ExtSecretsError::decryption(format!(
                "Decrypted settings are not valid JSON, likely a different encryption key: {}",
                e
            ))
        })
    }
}

impl std::fmt::Debug for SettingsEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsEncryption").field("key_bytes", &"[REDACTED]").finish()
    }
}
