#![allow(dead_code)]

//! Queries for `users`, `two_factor_secrets`, and `recovery_codes`.

use super::models::{NewUser, RecoveryCode, TwoFactorSecret, User};
use eyre::{Result, WrapErr};
use sqlx::postgres::PgPool;
use tracing::error;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, role, email_verified, two_factor_enabled, \
    kyc_status, failed_login_attempts, is_locked, locked_until, created_at, updated_at, \
    last_login_at, is_active, daily_withdrawal_limit_usd";

pub async fn insert_user(pool: &PgPool, new_user: &NewUser) -> Result<User> {
    let sql = format!(
        "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to insert user")
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!(error = ?e, "SQL error looking up user by email");
            e
        })
        .wrap_err("Failed to look up user by email")
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up user by id")
}

pub async fn record_failed_login(pool: &PgPool, user_id: Uuid) -> Result<i32> {
    let row: (i32,) = sqlx::query_as(
        r#"UPDATE users SET failed_login_attempts = failed_login_attempts + 1, updated_at = now()
           WHERE id = $1 RETURNING failed_login_attempts"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to record failed login attempt")?;
    Ok(row.0)
}

pub async fn lock_user(pool: &PgPool, user_id: Uuid, until: chrono::DateTime<chrono::Utc>) -> Result<()> {
    sqlx::query(
        r#"UPDATE users SET is_locked = TRUE, locked_until = $2, updated_at = now() WHERE id = $1"#,
    )
    .bind(user_id)
    .bind(until)
    .execute(pool)
    .await
    .wrap_err("Failed to lock user")?;
    Ok(())
}

pub async fn reset_failed_logins(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"UPDATE users SET failed_login_attempts = 0, is_locked = FALSE, locked_until = NULL,
           last_login_at = now(), updated_at = now() WHERE id = $1"#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .wrap_err("Failed to reset failed login counter")?;
    Ok(())
}

pub async fn set_role(pool: &PgPool, user_id: Uuid, role: &str) -> Result<()> {
    sqlx::query(r#"UPDATE users SET role = $2, updated_at = now() WHERE id = $1"#)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await
        .wrap_err("Failed to set user role")?;
    Ok(())
}

pub async fn mark_two_factor_enabled(pool: &PgPool, user_id: Uuid, enabled: bool) -> Result<()> {
    sqlx::query(r#"UPDATE users SET two_factor_enabled = $2, updated_at = now() WHERE id = $1"#)
        .bind(user_id)
        .bind(enabled)
        .execute(pool)
        .await
        .wrap_err("Failed to update two_factor_enabled")?;
    Ok(())
}

pub async fn upsert_two_factor_secret(
    pool: &PgPool,
    user_id: Uuid,
    encrypted_secret: &[u8],
    nonce: &[u8],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO two_factor_secrets (user_id, encrypted_secret, nonce)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE SET
            encrypted_secret = EXCLUDED.encrypted_secret,
            nonce = EXCLUDED.nonce,
            confirmed_at = NULL
        "#,
    )
    .bind(user_id)
    .bind(encrypted_secret)
    .bind(nonce)
    .execute(pool)
    .await
    .wrap_err("Failed to upsert two-factor secret")?;
    Ok(())
}

pub async fn confirm_two_factor_secret(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(r#"UPDATE two_factor_secrets SET confirmed_at = now() WHERE user_id = $1"#)
        .bind(user_id)
        .execute(pool)
        .await
        .wrap_err("Failed to confirm two-factor secret")?;
    Ok(())
}

pub async fn get_two_factor_secret(pool: &PgPool, user_id: Uuid) -> Result<Option<TwoFactorSecret>> {
    sqlx::query_as::<_, TwoFactorSecret>(
        r#"SELECT user_id, encrypted_secret, nonce, confirmed_at, created_at
           FROM two_factor_secrets WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to fetch two-factor secret")
}

pub async fn insert_recovery_codes(pool: &PgPool, user_id: Uuid, code_hashes: &[String]) -> Result<()> {
    sqlx::query(r#"DELETE FROM recovery_codes WHERE user_id = $1"#)
        .bind(user_id)
        .execute(pool)
        .await
        .wrap_err("Failed to clear old recovery codes")?;
    for hash in code_hashes {
        sqlx::query(r#"INSERT INTO recovery_codes (user_id, code_hash) VALUES ($1, $2)"#)
            .bind(user_id)
            .bind(hash)
            .execute(pool)
            .await
            .wrap_err("Failed to insert recovery code")?;
    }
    Ok(())
}

pub async fn consume_recovery_code(pool: &PgPool, user_id: Uuid, code_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE recovery_codes SET used_at = now()
           WHERE user_id = $1 AND code_hash = $2 AND used_at IS NULL"#,
    )
    .bind(user_id)
    .bind(code_hash)
    .execute(pool)
    .await
    .wrap_err("Failed to consume recovery code")?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_recovery_codes(pool: &PgPool, user_id: Uuid) -> Result<Vec<RecoveryCode>> {
    sqlx::query_as::<_, RecoveryCode>(
        r#"SELECT id, user_id, code_hash, used_at FROM recovery_codes WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list recovery codes")
}
