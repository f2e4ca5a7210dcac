//! Hybrid request/response encryption.
//!
//! A fresh 16-byte session key encrypts the JSON body with AES-128-ECB +
//! PKCS7; the key itself travels RSA-wrapped (PKCS#1 v1.5) in the
//! `encrypt-key` header. The server mirrors the scheme on responses.
//!
//! ECB is a weak mode; it is preserved bit-for-bit here because the deployed
//! backend speaks exactly this format and drop-in interoperability is
//! required. A redesign free of that constraint should use an authenticated
//! mode such as AES-GCM.
//!
//! Every operation in this module is best-effort by contract: the pipeline
//! treats [`CryptoError`] as recoverable and falls back to plaintext on the
//! request side and to raw passthrough on the response side. Nothing here
//! ever reaches a request caller as an exception.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::Aes128;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::warn;
use zeroize::Zeroizing;

type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// Session key length in bytes (AES-128).
pub const SESSION_KEY_LEN: usize = 16;

/// Name of the request/response header carrying the RSA-wrapped session key.
pub const ENCRYPT_KEY_HEADER: &str = "encrypt-key";

/// Recoverable crypto failure. The pipeline logs these and proceeds on the
/// fallback path; they are never converted into a caller-visible error.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid RSA key: {0}")]
    InvalidKey(String),

    #[error("session key wrap failed: {0}")]
    Wrap(String),

    #[error("session key unwrap failed: {0}")]
    Unwrap(String),

    #[error("base64 decode failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("unwrapped key has length {0}, expected {SESSION_KEY_LEN}")]
    KeyLength(usize),

    #[error("block decrypt failed (bad padding)")]
    Decrypt,
}

/// Ciphertext plus the wrapped key, both base64 for the wire.
#[derive(Debug, Clone)]
pub struct EncryptedBody {
    pub cipher_text: String,
    pub wrapped_key: String,
}

/// Generate a fresh session key. One per encrypted request; zeroized on drop.
fn generate_session_key() -> Zeroizing<[u8; SESSION_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    key
}

fn aes_ecb_encrypt(plain: &[u8], key: &[u8; SESSION_KEY_LEN]) -> Vec<u8> {
    Aes128EcbEnc::new(key.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
}

fn aes_ecb_decrypt(cipher: &[u8], key: &[u8; SESSION_KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
    Aes128EcbDec::new(key.into())
        .decrypt_padded_vec_mut::<Pkcs7>(cipher)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypt a JSON body with a fresh session key and wrap that key with the
/// server's public key.
///
/// The session key lives only for the duration of this call.
pub fn encrypt_body(plain: &[u8], public_key_pem: &str) -> Result<EncryptedBody, CryptoError> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let key = generate_session_key();
    let cipher_text = aes_ecb_encrypt(plain, &key);
    let wrapped = public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key.as_ref())
        .map_err(|e| CryptoError::Wrap(e.to_string()))?;

    Ok(EncryptedBody {
        cipher_text: BASE64.encode(cipher_text),
        wrapped_key: BASE64.encode(wrapped),
    })
}

/// Decrypt a response body whose session key arrived in the `encrypt-key`
/// response header.
///
/// On any failure the raw body comes back unchanged; downstream JSON parsing
/// will then fail naturally if the data is unusable. Callers without an
/// `encrypt-key` header must not call this at all.
pub fn decrypt_body(body: &[u8], wrapped_key_b64: &str, private_key_pem: &str) -> Vec<u8> {
    match try_decrypt_body(body, wrapped_key_b64, private_key_pem) {
        Ok(plain) => plain,
        Err(e) => {
            warn!(error = %e, "response decryption failed, passing body through");
            body.to_vec()
        }
    }
}

fn try_decrypt_body(
    body: &[u8],
    wrapped_key_b64: &str,
    private_key_pem: &str,
) -> Result<Vec<u8>, CryptoError> {
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let wrapped = BASE64.decode(wrapped_key_b64.trim())?;
    let raw = Zeroizing::new(
        private_key
            .decrypt(Pkcs1v15Encrypt, &wrapped)
            .map_err(|e| CryptoError::Unwrap(e.to_string()))?,
    );
    if raw.len() != SESSION_KEY_LEN {
        return Err(CryptoError::KeyLength(raw.len()));
    }
    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    key.copy_from_slice(&raw);

    // The body itself is base64 text of the ciphertext; tolerate surrounding
    // whitespace from the transport.
    let trimmed: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let cipher = BASE64.decode(&trimmed)?;
    aes_ecb_decrypt(&cipher, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    // 512-bit keys keep debug-mode keygen fast; large enough to wrap 16 bytes.
    fn test_keypair() -> (String, String) {
        let private = RsaPrivateKey::new(&mut OsRng, 512).unwrap();
        let public = RsaPublicKey::from(&private);
        (
            public.to_public_key_pem(LineEnding::LF).unwrap(),
            private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        )
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let (public_pem, private_pem) = test_keypair();
        let plain = br#"{"prompt":"a red chair on a beach","duration":8}"#;

        let encrypted = encrypt_body(plain, &public_pem).unwrap();
        // Wire form is base64 both for the body and the wrapped key.
        assert!(BASE64.decode(&encrypted.cipher_text).is_ok());
        assert!(BASE64.decode(&encrypted.wrapped_key).is_ok());

        let decrypted = decrypt_body(
            encrypted.cipher_text.as_bytes(),
            &encrypted.wrapped_key,
            &private_pem,
        );
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn unwrapped_key_matches_session_key() {
        let (public_pem, private_pem) = test_keypair();
        let encrypted = encrypt_body(b"{}", &public_pem).unwrap();

        let private = RsaPrivateKey::from_pkcs8_pem(&private_pem).unwrap();
        let wrapped = BASE64.decode(&encrypted.wrapped_key).unwrap();
        let key = private.decrypt(Pkcs1v15Encrypt, &wrapped).unwrap();
        assert_eq!(key.len(), SESSION_KEY_LEN);

        // The recovered key must decrypt the ciphertext directly.
        let mut key_arr = [0u8; SESSION_KEY_LEN];
        key_arr.copy_from_slice(&key);
        let cipher = BASE64.decode(&encrypted.cipher_text).unwrap();
        assert_eq!(aes_ecb_decrypt(&cipher, &key_arr).unwrap(), b"{}");
    }

    #[test]
    fn fresh_key_per_request() {
        let (public_pem, _) = test_keypair();
        let a = encrypt_body(b"{}", &public_pem).unwrap();
        let b = encrypt_body(b"{}", &public_pem).unwrap();
        // Same plaintext, different session keys, different ciphertext.
        assert_ne!(a.wrapped_key, b.wrapped_key);
        assert_ne!(a.cipher_text, b.cipher_text);
    }

    #[test]
    fn encrypt_with_garbage_key_is_recoverable() {
        let err = encrypt_body(b"{}", "not a pem").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[test]
    fn decrypt_failure_returns_raw_body() {
        let (_, private_pem) = test_keypair();
        let body = b"garbled nonsense";
        let out = decrypt_body(body, "also-not-base64!!", &private_pem);
        assert_eq!(out, body);
    }
}
