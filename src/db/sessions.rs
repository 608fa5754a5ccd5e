#![allow(dead_code)]

//! Queries for `sessions` (refresh-token rotation, §4.5).

use super::models::Session;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::PgPool;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_hash, device_name, ip_address, \
    user_agent, last_active_at, expires_at, revoked_at, created_at";

pub async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    refresh_token_hash: &str,
    user_agent: Option<&str>,
    ip_address: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    let sql = format!(
        "INSERT INTO sessions (user_id, refresh_token_hash, user_agent, ip_address, expires_at) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLUMNS}"
    );
    sqlx::query_as::<_, Session>(&sql)
        .bind(user_id)
        .bind(refresh_token_hash)
        .bind(user_agent)
        .bind(ip_address)
        .bind(expires_at)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to insert session")
}

pub async fn find_session_by_refresh_hash(pool: &PgPool, hash: &str) -> Result<Option<Session>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token_hash = $1");
    sqlx::query_as::<_, Session>(&sql)
        .bind(hash)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to find session by refresh hash")
}

pub async fn list_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND revoked_at IS NULL \
         ORDER BY last_active_at DESC"
    );
    sqlx::query_as::<_, Session>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list sessions for user")
}

pub async fn find_session_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Session>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
    sqlx::query_as::<_, Session>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to find session by id")
}

pub async fn touch_session(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(r#"UPDATE sessions SET last_active_at = now() WHERE id = $1"#)
        .bind(id)
        .execute(pool)
        .await
        .wrap_err("Failed to touch session")?;
    Ok(())
}

pub async fn revoke_session(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(r#"UPDATE sessions SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL"#)
        .bind(id)
        .execute(pool)
        .await
        .wrap_err("Failed to revoke session")?;
    Ok(())
}

pub async fn revoke_all_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(r#"UPDATE sessions SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL"#)
        .bind(user_id)
        .execute(pool)
        .await
        .wrap_err("Failed to revoke sessions for user")?;
    Ok(())
}
