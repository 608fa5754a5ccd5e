//! Notification wrapper (§4.10): best-effort user-facing notices for
//! ledger-visible events (stake opened, withdrawal approved/paid, etc). A
//! failure to persist a notification is logged and swallowed — it must never
//! fail the business transaction that triggered it, the same stance the
//! teacher takes toward its own metrics emission.

use crate::db;
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn notify(db: &PgPool, user_id: Uuid, notif_type: &str, title: &str, message: &str, data: Json) {
    match db::notifications::insert_notification(db, user_id, notif_type, title, message, data).await {
        Ok(notification) => {
            tracing::info!(notification_id = %notification.id, %user_id, notif_type, "notification recorded");
        }
        Err(e) => {
            tracing::warn!(%user_id, notif_type, error = %e, "failed to record notification");
        }
    }
}
