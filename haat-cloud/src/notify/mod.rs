//! In-app notifications with a transactional push outbox
//!
//! A [`Notice`] is written in the same transaction as the state change that
//! caused it. Push-eligible types are stored with push status `pending` and
//! delivered later by [`worker`].

pub mod expo;
pub mod worker;

use serde_json::{Value, json};
use shared::models::{NotificationType, PushStatus};

use crate::db::notifications::{self, NewNotification};

/// A notification to be recorded for one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_data: Value,
}

impl Notice {
    pub fn new(
        recipient_id: i64,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            sender_id: None,
            kind,
            title: title.into(),
            message: message.into(),
            related_data: json!({}),
        }
    }

    pub fn from_user(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    /// Merge `key: value` into the related data object
    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.related_data {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn about_order(self, order_id: i64) -> Self {
        self.with_data("orderId", order_id)
    }

    pub fn push_status(&self) -> PushStatus {
        if self.kind.is_push_eligible() {
            PushStatus::Pending
        } else {
            PushStatus::None
        }
    }
}

/// Record `notice` using the caller's connection or transaction
pub async fn enqueue(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    notice: &Notice,
    now: i64,
) -> Result<(), sqlx::Error> {
    notifications::insert(
        conn,
        &NewNotification {
            id: shared::util::snowflake_id(),
            recipient_id: notice.recipient_id,
            sender_id: notice.sender_id,
            kind: notice.kind,
            title: &notice.title,
            message: &notice.message,
            related_data: &notice.related_data,
            push_status: notice.push_status(),
        },
        now,
    )
    .await
}

/// Record several notices inside one transaction
pub async fn enqueue_all(
    tx: &mut sqlx::PgConnection,
    notices: &[Notice],
    now: i64,
) -> Result<(), sqlx::Error> {
    for notice in notices {
        enqueue(&mut *tx, notice, now).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_status_follows_type() {
        let push = Notice::new(1, NotificationType::OrderPlaced, "t", "m");
        assert_eq!(push.push_status(), PushStatus::Pending);

        let in_app = Notice::new(1, NotificationType::OrderStatus, "t", "m");
        assert_eq!(in_app.push_status(), PushStatus::None);
    }

    #[test]
    fn test_related_data_builder() {
        let notice = Notice::new(1, NotificationType::PaymentReceived, "t", "m")
            .from_user(2)
            .about_order(42)
            .with_data("amount", "250.00");
        assert_eq!(notice.sender_id, Some(2));
        assert_eq!(notice.related_data, json!({"orderId": 42, "amount": "250.00"}));
    }
}
