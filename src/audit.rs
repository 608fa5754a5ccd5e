//! Audit log wrapper (§4.12): every admin or security-sensitive action goes
//! through `record`, which redacts known-sensitive keys from the `before`/
//! `after` snapshots before they ever reach `db::audit::insert_audit_entry` —
//! the audit trail records that a secret changed, never the secret itself.

use crate::db;
use eyre::Result;
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

const REDACTED_KEYS: &[&str] = &[
    "passwordHash",
    "password",
    "encryptedSecret",
    "encryptedPrivateKey",
    "refreshToken",
    "accessToken",
];

pub struct AuditEvent<'a> {
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

pub async fn record(db: &PgPool, event: AuditEvent<'_>) -> Result<()> {
    db::audit::insert_audit_entry(
        db,
        db::audit::NewAuditEntry {
            actor_id: event.actor_id,
            actor_email: event.actor_email,
            action: event.action,
            entity: event.entity,
            entity_id: event.entity_id,
            before: event.before.map(|v| redact(v)),
            after: event.after.map(|v| redact(v)),
            ip_address: event.ip_address,
            user_agent: event.user_agent,
        },
    )
    .await
}

fn redact(value: Json) -> Json {
    match value {
        Json::Object(map) => Json::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if REDACTED_KEYS.contains(&k.as_str()) {
                        (k, Json::String("[redacted]".to_string()))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect(),
        ),
        Json::Array(items) => Json::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_known_sensitive_keys_at_any_depth() {
        let value = json!({
            "email": "user@example.com",
            "passwordHash": "argon2id$...",
            "nested": { "encryptedPrivateKey": [1, 2, 3] },
        });
        let redacted = redact(value);
        assert_eq!(redacted["email"], json!("user@example.com"));
        assert_eq!(redacted["passwordHash"], json!("[redacted]"));
        assert_eq!(redacted["nested"]["encryptedPrivateKey"], json!("[redacted]"));
    }
}
