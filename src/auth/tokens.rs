//! Access/refresh token issuance (§4.5). Access tokens are short-lived JWTs
//! (HS256); refresh tokens are opaque random bytes whose SHA-256 hash is the
//! only thing ever persisted, the same "never store the secret itself"
//! discipline the teacher applies to RPC credentials via its redacted
//! `Debug` impls.

use crate::config::JwtConfig;
use crate::types::Role;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
    pub jti: Uuid,
}

/// `jti` is the backing session's id, not an independent random value — this
/// is what lets [`crate::auth::AuthUser::from_request_parts`] confirm the
/// session behind a bearer token hasn't been revoked.
pub fn issue_access_token(jwt: &JwtConfig, user_id: Uuid, role: Role, session_id: Uuid) -> Result<String> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id,
        role,
        iat: now.timestamp(),
        exp: now.timestamp() + jwt.access_expires_secs,
        jti: session_id,
    };
    encode(
        &Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt.access_secret.as_bytes()),
    )
    .wrap_err("failed to sign access token")
}

pub fn verify_access_token(jwt: &JwtConfig, token: &str) -> Result<AccessClaims> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(jwt.access_secret.as_bytes()), &validation)
        .map_err(|e| eyre!("access token invalid or expired: {e}"))?;
    Ok(data.claims)
}

/// A fresh refresh token: the opaque value returned to the client, and the
/// SHA-256 hash that's persisted to the `sessions` row in its place.
pub struct RefreshToken {
    pub plaintext: String,
    pub hash: String,
}

pub fn generate_refresh_token() -> RefreshToken {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_refresh_token(&plaintext);
    RefreshToken { plaintext, hash }
}

pub fn hash_refresh_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            access_secret: "a".repeat(32),
            refresh_secret: "b".repeat(32),
            access_expires_secs: 900,
            refresh_expires_secs: 604_800,
        }
    }

    #[test]
    fn access_token_round_trips() {
        let jwt = jwt_config();
        let user_id = Uuid::new_v4();
        let token = issue_access_token(&jwt, user_id, Role::Admin, Uuid::new_v4()).unwrap();
        let claims = verify_access_token(&jwt, &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn access_token_rejects_wrong_secret() {
        let jwt = jwt_config();
        let token = issue_access_token(&jwt, Uuid::new_v4(), Role::User, Uuid::new_v4()).unwrap();
        let mut other = jwt_config();
        other.access_secret = "c".repeat(32);
        assert!(verify_access_token(&other, &token).is_err());
    }

    #[test]
    fn refresh_token_hash_is_deterministic_and_one_way() {
        let token = generate_refresh_token();
        assert_eq!(hash_refresh_token(&token.plaintext), token.hash);
        assert_ne!(token.plaintext, token.hash);
    }
}
