//! ChaCha20-Poly1305 AEAD primitives backing the default [`CryptoProvider`].
//!
//! [`CryptoProvider`]: super::CryptoProvider

use {
    base64::{prelude::BASE64_STANDARD, DecodeError, Engine},
    chacha20poly1305::{
        aead::{Aead, KeyInit, OsRng, Payload},
        AeadCore, ChaCha20Poly1305, Nonce,
    },
    std::string::FromUtf8Error,
};

pub const SYM_KEY_LENGTH: usize = 32;
pub const INIT_VEC_LEN: usize = 12;

pub type SymKey = [u8; SYM_KEY_LENGTH];

/// Payload encoding, decoding, encryption and decryption errors.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not base64 encoded")]
    Base64Decode(#[from] DecodeError),
    #[error("payload decryption failure: {0}")]
    Decryption(String),
    #[error("payload encryption failure: {0}")]
    Encryption(String),
    #[error("invalid initialization vector length={0}")]
    InitVecLen(usize),
    #[error("invalid symmetric key length={0}")]
    SymKeyLen(usize),
    #[error("payload is not a valid utf-8 encoding")]
    PayloadUtf8(#[from] FromUtf8Error),
}

/// Encrypts `msg` under `key`, returning the base64 ciphertext (AEAD tag
/// included) and the base64 nonce used.
pub fn encrypt(msg: impl AsRef<[u8]>, key: &SymKey) -> Result<(String, String), PayloadError> {
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let cipher = ChaCha20Poly1305::new(
        key.try_into()
            .map_err(|_| PayloadError::SymKeyLen(key.len()))?,
    );
    let sealed = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: msg.as_ref(),
                aad: &[],
            },
        )
        .map_err(|e| PayloadError::Encryption(e.to_string()))?;

    Ok((
        BASE64_STANDARD.encode(sealed),
        BASE64_STANDARD.encode(nonce),
    ))
}

/// Decrypts a base64 ciphertext/nonce pair produced by [`encrypt`], yielding
/// the original UTF-8 plaintext.
pub fn decrypt(ciphertext: &str, iv: &str, key: &SymKey) -> Result<String, PayloadError> {
    let sealed = BASE64_STANDARD.decode(ciphertext)?;
    let nonce_bytes = BASE64_STANDARD.decode(iv)?;
    let nonce: &Nonce = nonce_bytes
        .as_slice()
        .try_into()
        .map_err(|_| PayloadError::InitVecLen(nonce_bytes.len()))?;

    let cipher = ChaCha20Poly1305::new(
        key.try_into()
            .map_err(|_| PayloadError::SymKeyLen(key.len()))?,
    );
    let unsealed = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &sealed,
                aad: &[],
            },
        )
        .map_err(|e| PayloadError::Decryption(e.to_string()))?;

    Ok(String::from_utf8(unsealed)?)
}

#[cfg(test)]
mod tests {
    use {anyhow::Result, hex_literal::hex};

    use super::*;

    const PLAINTEXT: &str = r#"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it."#;
    const SYMKEY: SymKey = hex!(
        "80 81 82 83 84 85 86 87 88 89 8a 8b 8c 8d 8e 8f
         90 91 92 93 94 95 96 97 98 99 9a 9b 9c 9d 9e 9f"
    );

    #[test]
    fn encrypt_then_decrypt_round_trips() -> Result<()> {
        let (ciphertext, iv) = encrypt(PLAINTEXT, &SYMKEY)?;
        let decoded = decrypt(&ciphertext, &iv, &SYMKEY)?;
        assert_eq!(decoded, PLAINTEXT);
        Ok(())
    }

    #[test]
    fn decrypt_under_wrong_key_fails() -> Result<()> {
        let (ciphertext, iv) = encrypt(PLAINTEXT, &SYMKEY)?;
        let mut wrong_key = SYMKEY;
        wrong_key[0] ^= 0xff;
        assert!(decrypt(&ciphertext, &iv, &wrong_key).is_err());
        Ok(())
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() -> Result<()> {
        let (ciphertext_a, iv_a) = encrypt(PLAINTEXT, &SYMKEY)?;
        let (ciphertext_b, iv_b) = encrypt(PLAINTEXT, &SYMKEY)?;
        assert_ne!(iv_a, iv_b);
        assert_ne!(ciphertext_a, ciphertext_b);
        Ok(())
    }
}
