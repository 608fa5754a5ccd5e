//! Auth & session (§4.5): registration, login, refresh rotation, 2FA setup
//! and verification, and the `AuthUser` Axum extractor that re-validates the
//! bearer token against the live session row on every request.
//!
//! RBAC is a handler-level check (`AuthUser::require`) rather than a const
//! generic over `Role` — `Role` isn't a `const`-friendly discriminant type
//! once it needs `Ord`/`sqlx::Type`/serde impls, and a runtime check reads
//! no worse at call sites (`auth_user.require(Role::Admin)?`) than a type
//! parameter would. Recorded as the resolved Open Question in DESIGN.md.

pub mod password;
pub mod totp;
pub mod tokens;

use crate::clock::Clock;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::Role;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Duration;
use uuid::Uuid;

pub struct RegisteredUser {
    pub user_id: Uuid,
    pub email: String,
}

pub async fn register(state: &AppState, email: &str, password: &str) -> ApiResult<RegisteredUser> {
    if db::users::find_user_by_email(state.db(), email).await.map_err(ApiError::TransientExternal)?.is_some() {
        return Err(ApiError::Conflict("an account with this email already exists".into()));
    }
    let password_hash = password::hash_password(password).map_err(ApiError::TransientExternal)?;
    let user = db::users::insert_user(state.db(), &db::NewUser { email: email.to_string(), password_hash })
        .await
        .map_err(ApiError::TransientExternal)?;
    Ok(RegisteredUser { user_id: user.id, email: user.email })
}

pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
    pub role: Role,
}

const MAX_FAILED_LOGINS: i32 = 5;
const LOCKOUT_MINUTES: i64 = 15;

/// Password check, failed-attempt lockout, 2FA gate, and session issuance —
/// a 2FA-enabled account must present both factors before any token issues,
/// so the TOTP check lives here rather than in the handler.
pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    totp_code: Option<&str>,
    user_agent: Option<&str>,
    ip_address: Option<&str>,
) -> ApiResult<LoginOutcome> {
    let Some(user) = db::users::find_user_by_email(state.db(), email).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::Unauthenticated);
    };

    if user.is_locked {
        if let Some(until) = user.locked_until {
            if state.clock().now() < until {
                return Err(ApiError::Forbidden("account temporarily locked".into()));
            }
        }
    }

    let verified = password::verify_password(password, &user.password_hash).map_err(ApiError::TransientExternal)?;
    if !verified {
        let attempts = db::users::record_failed_login(state.db(), user.id).await.map_err(ApiError::TransientExternal)?;
        if attempts >= MAX_FAILED_LOGINS {
            let until = state.clock().now() + Duration::minutes(LOCKOUT_MINUTES);
            db::users::lock_user(state.db(), user.id, until).await.map_err(ApiError::TransientExternal)?;
            crate::metrics::record_account_locked();
        }
        crate::metrics::record_login_attempt("bad_password");
        return Err(ApiError::Unauthenticated);
    }

    db::users::reset_failed_logins(state.db(), user.id).await.map_err(ApiError::TransientExternal)?;

    let role = Role::from_str_loose(&user.role).ok_or(ApiError::Fatal)?;
    if role.is_admin() && !user.two_factor_enabled {
        crate::metrics::record_login_attempt("admin_two_factor_not_enabled");
        return Err(ApiError::Forbidden("admin accounts must have two-factor authentication enabled".into()));
    }

    if user.two_factor_enabled {
        let Some(code) = totp_code else {
            crate::metrics::record_login_attempt("two_factor_required");
            return Err(ApiError::DomainRejection {
                code: crate::error::codes::TWO_FACTOR_REQUIRED,
                message: "two-factor code required".into(),
            });
        };
        if let Err(e) = verify_two_factor_code(state, user.id, code).await {
            crate::metrics::record_login_attempt("bad_two_factor_code");
            return Err(e);
        }
    }

    let refresh = tokens::generate_refresh_token();
    let expires_at = state.clock().now() + Duration::seconds(state.jwt().refresh_expires_secs);
    let session = db::sessions::insert_session(state.db(), user.id, &refresh.hash, user_agent, ip_address, expires_at)
        .await
        .map_err(ApiError::TransientExternal)?;
    let access_token = tokens::issue_access_token(state.jwt(), user.id, role, session.id).map_err(ApiError::TransientExternal)?;

    crate::metrics::record_login_attempt("success");
    Ok(LoginOutcome { access_token, refresh_token: refresh.plaintext, user_id: user.id, role })
}

/// Refresh-token rotation: the presented token is consumed (revoked) and a
/// new pair issued, so a stolen-and-replayed refresh token is detectable —
/// a second use of the same plaintext fails since its session is revoked.
pub async fn refresh(state: &AppState, presented_refresh_token: &str) -> ApiResult<LoginOutcome> {
    let hash = tokens::hash_refresh_token(presented_refresh_token);
    let Some(session) = db::sessions::find_session_by_refresh_hash(state.db(), &hash).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::Unauthenticated);
    };
    if session.revoked_at.is_some() || state.clock().now() > session.expires_at {
        return Err(ApiError::Unauthenticated);
    }
    let Some(user) = db::users::find_user_by_id(state.db(), session.user_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::Unauthenticated);
    };

    db::sessions::revoke_session(state.db(), session.id).await.map_err(ApiError::TransientExternal)?;

    let role = Role::from_str_loose(&user.role).ok_or(ApiError::Fatal)?;
    let new_refresh = tokens::generate_refresh_token();
    let expires_at = state.clock().now() + Duration::seconds(state.jwt().refresh_expires_secs);
    let new_session =
        db::sessions::insert_session(state.db(), user.id, &new_refresh.hash, session.user_agent.as_deref(), session.ip_address.as_deref(), expires_at)
            .await
            .map_err(ApiError::TransientExternal)?;
    let access_token = tokens::issue_access_token(state.jwt(), user.id, role, new_session.id).map_err(ApiError::TransientExternal)?;

    Ok(LoginOutcome { access_token, refresh_token: new_refresh.plaintext, user_id: user.id, role })
}

pub async fn logout(state: &AppState, presented_refresh_token: &str) -> ApiResult<()> {
    let hash = tokens::hash_refresh_token(presented_refresh_token);
    if let Some(session) = db::sessions::find_session_by_refresh_hash(state.db(), &hash).await.map_err(ApiError::TransientExternal)? {
        db::sessions::revoke_session(state.db(), session.id).await.map_err(ApiError::TransientExternal)?;
    }
    Ok(())
}

pub struct TotpSetup {
    pub provisioning_uri: String,
}

pub async fn begin_two_factor_setup(state: &AppState, user_id: Uuid, account_email: &str) -> ApiResult<TotpSetup> {
    let secret = totp::generate_secret(account_email, "CryptoStake").map_err(ApiError::TransientExternal)?;
    let (ciphertext, nonce) = crate::crypto::encrypt(&state.master_key().0, crate::crypto::TWO_FACTOR_DOMAIN, &secret.secret)
        .map_err(ApiError::TransientExternal)?;
    db::users::upsert_two_factor_secret(state.db(), user_id, &ciphertext, &nonce).await.map_err(ApiError::TransientExternal)?;
    Ok(TotpSetup { provisioning_uri: secret.provisioning_uri })
}

/// Confirms 2FA setup with one valid code, flips `users.two_factor_enabled`,
/// and issues recovery codes (shown to the caller exactly once).
pub async fn confirm_two_factor_setup(state: &AppState, user_id: Uuid, code: &str) -> ApiResult<Vec<String>> {
    verify_two_factor_code(state, user_id, code).await?;
    db::users::confirm_two_factor_secret(state.db(), user_id).await.map_err(ApiError::TransientExternal)?;
    db::users::mark_two_factor_enabled(state.db(), user_id, true).await.map_err(ApiError::TransientExternal)?;

    let codes = totp::generate_recovery_codes();
    let hashes: Vec<String> = codes.iter().map(|(_, h)| h.clone()).collect();
    db::users::insert_recovery_codes(state.db(), user_id, &hashes).await.map_err(ApiError::TransientExternal)?;
    Ok(codes.into_iter().map(|(c, _)| c).collect())
}

pub async fn verify_two_factor_code(state: &AppState, user_id: Uuid, code: &str) -> ApiResult<()> {
    let Some(stored) = db::users::get_two_factor_secret(state.db(), user_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::Forbidden("two-factor is not set up for this account".into()));
    };
    let plaintext = crate::crypto::decrypt(&state.master_key().0, crate::crypto::TWO_FACTOR_DOMAIN, &stored.encrypted_secret, &stored.nonce)
        .map_err(ApiError::TransientExternal)?;
    let ok = totp::verify_code(&plaintext, code).map_err(ApiError::TransientExternal)?;
    if ok {
        return Ok(());
    }

    let code_hash = totp::hash_recovery_code(code);
    if db::users::consume_recovery_code(state.db(), user_id, &code_hash).await.map_err(ApiError::TransientExternal)? {
        return Ok(());
    }

    Err(ApiError::Forbidden("invalid two-factor code".into()))
}

/// Extracted from the `Authorization: Bearer` header: the JWT must verify
/// AND the session behind its issuance must still be live, so revoking a
/// session takes effect immediately rather than waiting for token expiry.
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Handler-level RBAC gate: `auth_user.require(Role::Admin)?`.
    pub fn require(&self, min_role: Role) -> ApiResult<()> {
        if self.role >= min_role {
            Ok(())
        } else {
            Err(ApiError::Forbidden("insufficient role".into()))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthenticated)?;

        let claims = tokens::verify_access_token(state.jwt(), token).map_err(|_| ApiError::Unauthenticated)?;

        let session = db::sessions::find_session_by_id(state.db(), claims.jti)
            .await
            .map_err(ApiError::TransientExternal)?
            .ok_or(ApiError::Unauthenticated)?;
        if session.revoked_at.is_some() || state.clock().now() > session.expires_at {
            return Err(ApiError::Unauthenticated);
        }

        let user = db::users::find_user_by_id(state.db(), claims.sub)
            .await
            .map_err(ApiError::TransientExternal)?
            .ok_or(ApiError::Unauthenticated)?;
        if !user.is_active || user.is_locked {
            return Err(ApiError::Forbidden("account is not active".into()));
        }

        Ok(AuthUser { user_id: user.id, role: claims.role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_accepts_equal_or_higher_role() {
        let user = AuthUser { user_id: Uuid::nil(), role: Role::Admin };
        assert!(user.require(Role::Support).is_ok());
        assert!(user.require(Role::Admin).is_ok());
    }

    #[test]
    fn require_rejects_lower_role() {
        let user = AuthUser { user_id: Uuid::nil(), role: Role::User };
        assert!(user.require(Role::Admin).is_err());
    }
}
