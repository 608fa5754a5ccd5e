//! TOTP two-factor auth (§4.5): RFC 6238, SHA1, 6 digits, 30s step, ±1 step
//! skew, via `totp_rs`. Secrets at rest are AES-256-GCM encrypted through
//! `crate::crypto` under `TWO_FACTOR_DOMAIN`, never stored in the clear —
//! the same posture the teacher takes toward any long-lived credential.
//! Recovery codes are 10 Crockford-base32 strings, persisted only as their
//! SHA-256 hash (§4.5, mirroring `auth::tokens::hash_refresh_token`).

use eyre::{eyre, Result, WrapErr};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_BYTES: usize = 5; // 5 bytes -> 8 Crockford base32 chars

const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub struct NewTotpSecret {
    /// Raw secret bytes — caller encrypts this before persisting.
    pub secret: Vec<u8>,
    /// `otpauth://` URI for QR-code display during setup.
    pub provisioning_uri: String,
}

pub fn generate_secret(account_email: &str, issuer: &str) -> Result<NewTotpSecret> {
    let secret = Secret::generate_secret();
    let totp = build_totp(&secret, account_email, issuer)?;
    Ok(NewTotpSecret {
        secret: secret.to_bytes().map_err(|e| eyre!("failed to encode TOTP secret: {e:?}"))?,
        provisioning_uri: totp.get_url(),
    })
}

pub fn verify_code(secret_bytes: &[u8], code: &str) -> Result<bool> {
    let secret = Secret::Raw(secret_bytes.to_vec());
    let totp = build_totp(&secret, "", "")?;
    totp.check_current(code).map_err(|e| eyre!("failed to check TOTP code: {e}"))
}

fn build_totp(secret: &Secret, account_email: &str, issuer: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret.to_bytes().map_err(|e| eyre!("invalid TOTP secret: {e:?}"))?,
        Some(issuer.to_string()).filter(|s| !s.is_empty()),
        account_email.to_string(),
    )
    .wrap_err("failed to construct TOTP instance")
}

/// Generates `RECOVERY_CODE_COUNT` fresh codes plus their SHA-256 hashes,
/// returned together since the plaintext is shown to the user exactly once.
pub fn generate_recovery_codes() -> Vec<(String, String)> {
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            let code = random_recovery_code();
            let hash = hash_recovery_code(&code);
            (code, hash)
        })
        .collect()
}

pub fn hash_recovery_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

fn random_recovery_code() -> String {
    let mut bytes = [0u8; RECOVERY_CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut code = String::with_capacity(8);
    let mut acc: u64 = 0;
    let mut bits = 0u32;
    for byte in bytes {
        acc = (acc << 8) | byte as u64;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let idx = ((acc >> bits) & 0x1f) as usize;
            code.push(CROCKFORD_ALPHABET[idx] as char);
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_verifies_against_its_own_secret() {
        let secret = generate_secret("user@example.com", "cryptostake").unwrap();
        let totp = build_totp(&Secret::Raw(secret.secret.clone()), "", "").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_code(&secret.secret, &code).unwrap());
    }

    #[test]
    fn wrong_code_fails_verification() {
        let secret = generate_secret("user@example.com", "cryptostake").unwrap();
        assert!(!verify_code(&secret.secret, "000000").unwrap());
    }

    #[test]
    fn recovery_codes_are_unique_and_hash_consistently() {
        let codes = generate_recovery_codes();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        let unique: std::collections::HashSet<_> = codes.iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(unique.len(), RECOVERY_CODE_COUNT);
        for (code, hash) in &codes {
            assert_eq!(hash_recovery_code(code), *hash);
        }
    }
}
