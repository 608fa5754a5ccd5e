#![allow(dead_code)]

//! Queries for `notifications` (§4.10).

use super::models::Notification;
use eyre::{Result, WrapErr};
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use uuid::Uuid;

pub async fn insert_notification(
    pool: &PgPool,
    user_id: Uuid,
    notif_type: &str,
    title: &str,
    message: &str,
    data: Json,
) -> Result<Notification> {
    sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, notif_type, title, message, data)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, notif_type, title, message, data, is_read, created_at
        "#,
    )
    .bind(user_id)
    .bind(notif_type)
    .bind(title)
    .bind(message)
    .bind(data)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to insert notification")
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
    let sql = if unread_only {
        r#"SELECT id, user_id, notif_type, title, message, data, is_read, created_at
           FROM notifications WHERE user_id = $1 AND NOT is_read ORDER BY created_at DESC"#
    } else {
        r#"SELECT id, user_id, notif_type, title, message, data, is_read, created_at
           FROM notifications WHERE user_id = $1 ORDER BY created_at DESC"#
    };
    sqlx::query_as::<_, Notification>(sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list notifications for user")
}

pub async fn mark_read(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(r#"UPDATE notifications SET is_read = TRUE WHERE id = $1"#)
        .bind(id)
        .execute(pool)
        .await
        .wrap_err("Failed to mark notification read")?;
    Ok(())
}
