#![allow(dead_code)]

//! Queries for `audit_log` (§4.10).

use super::models::AuditLogRow;
use eyre::{Result, WrapErr};
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use uuid::Uuid;

pub struct NewAuditEntry<'a> {
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<&'a str>,
    pub action: &'a str,
    pub entity: &'a str,
    pub entity_id: &'a str,
    pub before: Option<Json>,
    pub after: Option<Json>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub async fn insert_audit_entry(pool: &PgPool, entry: NewAuditEntry<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log
            (actor_id, actor_email, action, entity, entity_id, before, after, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.actor_id)
    .bind(entry.actor_email)
    .bind(entry.action)
    .bind(entry.entity)
    .bind(entry.entity_id)
    .bind(entry.before)
    .bind(entry.after)
    .bind(entry.ip_address)
    .bind(entry.user_agent)
    .execute(pool)
    .await
    .wrap_err("Failed to insert audit log entry")?;
    Ok(())
}

pub async fn list_for_entity(pool: &PgPool, entity: &str, entity_id: &str) -> Result<Vec<AuditLogRow>> {
    sqlx::query_as::<_, AuditLogRow>(
        r#"SELECT id, actor_id, actor_email, action, entity, entity_id, before, after,
                  ip_address, user_agent, created_at
           FROM audit_log WHERE entity = $1 AND entity_id = $2 ORDER BY created_at DESC"#,
    )
    .bind(entity)
    .bind(entity_id)
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list audit log entries for entity")
}
