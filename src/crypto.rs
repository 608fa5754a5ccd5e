//! Symmetric encryption-at-rest for secrets the platform must be able to
//! decrypt itself (2FA TOTP secrets, treasury private keys) — as opposed to
//! password hashes, which are one-way. Both call sites in `auth` and
//! `payout` derive a key from `Config.master_key` via scrypt rather than
//! using the master key directly, matching the teacher's habit of never
//! letting a raw secret touch a cipher or a log line.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use eyre::{eyre, Result, WrapErr};
use rand::RngCore;
use scrypt::Params;

/// Domain-separated so the same master key never produces the same derived
/// key for two different purposes even if both ever used the same salt.
fn derive_key(master_key: &str, domain: &[u8]) -> Result<[u8; 32]> {
    let params = Params::new(15, 8, 1, 32).wrap_err("invalid scrypt params")?;
    let mut out = [0u8; 32];
    scrypt::scrypt(master_key.as_bytes(), domain, &params, &mut out)
        .map_err(|e| eyre!("scrypt key derivation failed: {e}"))?;
    Ok(out)
}

pub const TWO_FACTOR_DOMAIN: &[u8] = b"cryptostake-2fa-v1";
pub const TREASURY_KEY_DOMAIN: &[u8] = b"cryptostake-treasury-v1";

/// Encrypts `plaintext` under a key derived from `master_key` and `domain`.
/// Returns `(ciphertext, nonce)` for separate storage, matching the
/// `encrypted_secret`/`nonce` and `encrypted_private_key`/`nonce` column
/// pairs in the schema.
pub fn encrypt(master_key: &str, domain: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let key = derive_key(master_key, domain)?;
    let cipher = Aes256Gcm::new_from_slice(&key).wrap_err("invalid AES key length")?;
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| eyre!("AES-GCM encryption failed"))?;
    Ok((ciphertext, nonce_bytes.to_vec()))
}

pub fn decrypt(master_key: &str, domain: &[u8], ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
    let key = derive_key(master_key, domain)?;
    let cipher = Aes256Gcm::new_from_slice(&key).wrap_err("invalid AES key length")?;
    if nonce.len() != 12 {
        return Err(eyre!("nonce must be 12 bytes, got {}", nonce.len()));
    }
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| eyre!("AES-GCM decryption failed (wrong key or tampered ciphertext)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_under_the_same_domain() {
        let (ct, nonce) = encrypt("a-sufficiently-long-master-key", TWO_FACTOR_DOMAIN, b"topsecret").unwrap();
        let pt = decrypt("a-sufficiently-long-master-key", TWO_FACTOR_DOMAIN, &ct, &nonce).unwrap();
        assert_eq!(pt, b"topsecret");
    }

    #[test]
    fn wrong_domain_fails_to_decrypt() {
        let (ct, nonce) = encrypt("a-sufficiently-long-master-key", TWO_FACTOR_DOMAIN, b"topsecret").unwrap();
        assert!(decrypt("a-sufficiently-long-master-key", TREASURY_KEY_DOMAIN, &ct, &nonce).is_err());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let (ct, nonce) = encrypt("key-one-is-long-enough", TWO_FACTOR_DOMAIN, b"topsecret").unwrap();
        assert!(decrypt("key-two-is-also-long-enough", TWO_FACTOR_DOMAIN, &ct, &nonce).is_err());
    }
}
