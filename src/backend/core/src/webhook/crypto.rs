//! AES-256-GCM encryption for webhook signing secrets (spec §4.8 step 4).
//! The process-wide key comes from `config::Security::encryption_key`; the
//! plaintext secret is only ever held in memory long enough to sign a
//! request.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::{AiseoError, Result};

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` under `key`, returning `(ciphertext, nonce)` for
/// storage in `webhooks.secret_ciphertext`/`secret_nonce`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| AiseoError::internal("failed to encrypt webhook secret"))?;
    Ok((ciphertext, nonce_bytes.to_vec()))
}

/// Decrypt a stored secret for signing. Any failure (wrong key, corrupted
/// row, non-UTF-8 plaintext) is reported uniformly rather than leaking which
/// step failed.
pub fn decrypt_secret(key: &[u8; 32], ciphertext: &[u8], nonce: &[u8]) -> Result<String> {
    if nonce.len() != NONCE_LEN {
        return Err(AiseoError::internal("webhook secret nonce has unexpected length"));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| AiseoError::internal("failed to decrypt webhook secret"))?;
    String::from_utf8(plaintext).map_err(|_| AiseoError::internal("decrypted webhook secret was not valid utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let key = [7u8; 32];
        let (ciphertext, nonce) = encrypt_secret(&key, "whsec_topsecret").unwrap();
        let plaintext = decrypt_secret(&key, &ciphertext, &nonce).unwrap();
        assert_eq!(plaintext, "whsec_topsecret");
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let key = [7u8; 32];
        let other_key = [9u8; 32];
        let (ciphertext, nonce) = encrypt_secret(&key, "whsec_topsecret").unwrap();
        assert!(decrypt_secret(&other_key, &ciphertext, &nonce).is_err());
    }

    #[test]
    fn decrypt_fails_with_wrong_nonce_length() {
        let key = [7u8; 32];
        let (ciphertext, _) = encrypt_secret(&key, "whsec_topsecret").unwrap();
        assert!(decrypt_secret(&key, &ciphertext, &[0u8; 4]).is_err());
    }
}
