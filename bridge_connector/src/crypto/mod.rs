//! Envelope codec (spec §4.2).
//!
//! Wraps/unwraps plaintext JSON in AEAD envelopes via an injected crypto
//! provider. The envelope is treated as opaque JSON by callers; keys are
//! carried as raw bytes internally and as hex at the storage/URI boundary.

pub mod payload;

use {
    payload::{PayloadError, SymKey},
    rand::RngCore,
    serde::{Deserialize, Serialize},
};

/// The injected cryptographic collaborator (spec §6).
///
/// Implementations must be safe to share across concurrently-running calls:
/// the connector treats this capability as shared and read-only.
pub trait CryptoProvider: Send + Sync {
    /// Generates a fresh 256-bit symmetric key.
    fn generate_key(&self) -> SymKey;

    /// Encrypts `plaintext` under `key`, producing an opaque envelope.
    ///
    /// Returns `None` if encryption is unavailable (e.g. the underlying
    /// library failed) — callers surface this as `CryptoUnavailable`.
    fn encrypt(&self, plaintext: &str, key: &SymKey) -> Option<Envelope>;

    /// Decrypts `envelope` under `key`, recovering the original plaintext.
    ///
    /// Returns `None` on any decryption failure (wrong key, corrupted
    /// envelope, authentication failure).
    fn decrypt(&self, envelope: &Envelope, key: &SymKey) -> Option<String>;
}

/// The AEAD envelope: opaque to every layer above this module. In the
/// reference implementation the envelope carries ciphertext, an IV and an
/// authentication tag; here the AEAD tag is folded into `ciphertext` and
/// there is no separate HMAC field (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64-encoded nonce/IV.
    pub iv: String,
    /// Base64-encoded ciphertext, AEAD tag included.
    pub ciphertext: String,
}

/// Default [`CryptoProvider`] backed by ChaCha20-Poly1305.
#[derive(Debug, Default, Clone, Copy)]
pub struct AeadCryptoProvider;

impl CryptoProvider for AeadCryptoProvider {
    fn generate_key(&self) -> SymKey {
        let mut key = [0u8; payload::SYM_KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut key);
        key
    }

    fn encrypt(&self, plaintext: &str, key: &SymKey) -> Option<Envelope> {
        let (ciphertext, iv) = payload::encrypt(plaintext, key).ok()?;
        Some(Envelope { iv, ciphertext })
    }

    fn decrypt(&self, envelope: &Envelope, key: &SymKey) -> Option<String> {
        payload::decrypt(&envelope.ciphertext, &envelope.iv, key).ok()
    }
}

/// Encodes `plaintext` under `key` via `provider`. Returns `None` (no frame
/// should be emitted) if `key` is absent or encryption fails.
pub fn wrap(
    provider: &dyn CryptoProvider,
    plaintext: &str,
    key: Option<&SymKey>,
) -> Option<Envelope> {
    provider.encrypt(plaintext, key?)
}

/// Decodes `envelope` under `key` via `provider`.
pub fn unwrap(
    provider: &dyn CryptoProvider,
    envelope: &Envelope,
    key: Option<&SymKey>,
) -> Option<String> {
    provider.decrypt(envelope, key?)
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
}
