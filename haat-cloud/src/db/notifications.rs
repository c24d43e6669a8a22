//! Notifications and the push outbox

use shared::models::{Notification, NotificationType, PushStatus};
use sqlx::PgPool;
use sqlx::types::Json;

use super::decode_enum;

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    recipient_id: i64,
    sender_id: Option<i64>,
    kind: String,
    title: String,
    message: String,
    related_data: Json<serde_json::Value>,
    is_read: bool,
    read_at: Option<i64>,
    push_status: String,
    created_at: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = sqlx::Error;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            kind: decode_enum("kind", &row.kind, NotificationType::from_db)?,
            title: row.title,
            message: row.message,
            related_data: row.related_data.0,
            is_read: row.is_read,
            read_at: row.read_at,
            push_status: decode_enum("push_status", &row.push_status, PushStatus::from_db)?,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "id, recipient_id, sender_id, kind, title, message, related_data, \
                       is_read, read_at, push_status, created_at";

pub struct NewNotification<'a> {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub kind: NotificationType,
    pub title: &'a str,
    pub message: &'a str,
    pub related_data: &'a serde_json::Value,
    pub push_status: PushStatus,
}

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    n: &NewNotification<'_>,
    now: i64,
) -> Result<(), sqlx::Error> {
    let next_attempt_at = (n.push_status == PushStatus::Pending).then_some(now);
    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, sender_id, kind, title, message,
                                    related_data, push_status, next_attempt_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(n.id)
    .bind(n.recipient_id)
    .bind(n.sender_id)
    .bind(n.kind.as_db())
    .bind(n.title)
    .bind(n.message)
    .bind(Json(n.related_data))
    .bind(n.push_status.as_db())
    .bind(next_attempt_at)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list(
    pool: &PgPool,
    recipient_id: i64,
    is_read: Option<bool>,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM notifications
         WHERE recipient_id = $1 AND ($2::BOOLEAN IS NULL OR is_read = $2)
         ORDER BY created_at DESC
         LIMIT $3"
    ))
    .bind(recipient_id)
    .bind(is_read)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Notification::try_from).collect()
}

pub async fn unread_count(pool: &PgPool, recipient_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_read")
        .bind(recipient_id)
        .fetch_one(pool)
        .await
}

pub async fn mark_read(
    pool: &PgPool,
    id: i64,
    recipient_id: i64,
    now: i64,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(&format!(
        "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, $3)
         WHERE id = $1 AND recipient_id = $2
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(recipient_id)
    .bind(now)
    .fetch_optional(pool)
    .await?
    .map(Notification::try_from)
    .transpose()
}

pub async fn mark_all_read(pool: &PgPool, recipient_id: i64, now: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE, read_at = $2
         WHERE recipient_id = $1 AND NOT is_read",
    )
    .bind(recipient_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete(pool: &PgPool, id: i64, recipient_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
        .bind(id)
        .bind(recipient_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ========== Outbox ==========

#[derive(Debug, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: i64,
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub related_data: Json<serde_json::Value>,
    pub push_attempts: i32,
    pub expo_push_token: Option<String>,
}

/// Claim up to `limit` due push rows. Claimed rows are leased until
/// `lease_until` so a concurrent worker skips them.
pub async fn claim_due(
    pool: &PgPool,
    now: i64,
    lease_until: i64,
    limit: i64,
) -> Result<Vec<OutboxEntry>, sqlx::Error> {
    sqlx::query_as(
        "WITH due AS (
             SELECT id FROM notifications
             WHERE push_status = 'pending' AND next_attempt_at <= $1
             ORDER BY next_attempt_at
             LIMIT $3
             FOR UPDATE SKIP LOCKED
         ), claimed AS (
             UPDATE notifications n SET next_attempt_at = $2
             FROM due WHERE n.id = due.id
             RETURNING n.id, n.recipient_id, n.title, n.message, n.related_data, n.push_attempts
         )
         SELECT c.*, u.expo_push_token
         FROM claimed c JOIN users u ON u.id = c.recipient_id",
    )
    .bind(now)
    .bind(lease_until)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn mark_pushed(
    pool: &PgPool,
    id: i64,
    status: PushStatus,
    attempts: i32,
    last_error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE notifications
         SET push_status = $2, push_attempts = $3, next_attempt_at = NULL, last_error = $4
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_db())
    .bind(attempts)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn schedule_retry(
    pool: &PgPool,
    id: i64,
    attempts: i32,
    next_attempt_at: i64,
    last_error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE notifications
         SET push_attempts = $2, next_attempt_at = $3, last_error = $4
         WHERE id = $1",
    )
    .bind(id)
    .bind(attempts)
    .bind(next_attempt_at)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}
