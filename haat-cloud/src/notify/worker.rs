//! Push outbox worker
//!
//! Polls pending notifications, sends them through Expo and records the
//! outcome. Failed sends are retried with exponential backoff.

use std::time::Duration;

use shared::models::PushStatus;
use shared::util::now_millis;
use sqlx::PgPool;

use super::expo::{ExpoClient, PushMessage, is_expo_push_token};
use crate::db::notifications::{self, OutboxEntry};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const BATCH_SIZE: i64 = 50;
/// Claimed rows are hidden from other workers for this long
const CLAIM_LEASE: Duration = Duration::from_secs(60);

pub const MAX_ATTEMPTS: i32 = 5;
const BACKOFF_BASE: Duration = Duration::from_secs(30);
const BACKOFF_CAP: Duration = Duration::from_secs(3600);

/// Delay before the next try after `attempts` failed sends (1-based)
pub fn retry_delay(attempts: i32) -> Duration {
    let exp = attempts.saturating_sub(1).clamp(0, 16) as u32;
    BACKOFF_BASE.saturating_mul(1 << exp).min(BACKOFF_CAP)
}

/// What to do with a row whose send just failed
#[derive(Debug, PartialEq, Eq)]
pub enum AfterFailure {
    Retry { attempts: i32, next_attempt_at: i64 },
    GiveUp { attempts: i32 },
}

pub fn after_failure(previous_attempts: i32, now: i64) -> AfterFailure {
    let attempts = previous_attempts + 1;
    if attempts >= MAX_ATTEMPTS {
        AfterFailure::GiveUp { attempts }
    } else {
        AfterFailure::Retry {
            attempts,
            next_attempt_at: now + retry_delay(attempts).as_millis() as i64,
        }
    }
}

/// Run forever; spawned from `main`
pub async fn run(pool: PgPool, expo: ExpoClient) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match drain_once(&pool, &expo).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(count = n, "Processed push outbox batch"),
            Err(e) => tracing::error!("Push outbox poll failed: {e}"),
        }
    }
}

/// Process one batch of due rows, returning how many were claimed
pub async fn drain_once(pool: &PgPool, expo: &ExpoClient) -> Result<usize, sqlx::Error> {
    let now = now_millis();
    let lease_until = now + CLAIM_LEASE.as_millis() as i64;
    let batch = notifications::claim_due(pool, now, lease_until, BATCH_SIZE).await?;
    let count = batch.len();
    for entry in batch {
        deliver(pool, expo, entry).await?;
    }
    Ok(count)
}

async fn deliver(pool: &PgPool, expo: &ExpoClient, entry: OutboxEntry) -> Result<(), sqlx::Error> {
    let Some(token) = entry
        .expo_push_token
        .as_deref()
        .filter(|t| is_expo_push_token(t))
    else {
        tracing::debug!(notification_id = entry.id, "No valid push token, skipping");
        return notifications::mark_pushed(
            pool,
            entry.id,
            PushStatus::Skipped,
            entry.push_attempts,
            Some("recipient has no valid push token"),
        )
        .await;
    };

    let message = PushMessage {
        to: token,
        title: &entry.title,
        body: &entry.message,
        data: &entry.related_data.0,
        sound: "default",
    };

    match expo.send(&message).await {
        Ok(()) => {
            notifications::mark_pushed(pool, entry.id, PushStatus::Sent, entry.push_attempts + 1, None)
                .await
        }
        Err(e) => {
            let error = e.to_string();
            match after_failure(entry.push_attempts, now_millis()) {
                AfterFailure::Retry {
                    attempts,
                    next_attempt_at,
                } => {
                    tracing::warn!(
                        notification_id = entry.id,
                        attempts,
                        "Push failed, will retry: {error}"
                    );
                    notifications::schedule_retry(pool, entry.id, attempts, next_attempt_at, &error)
                        .await
                }
                AfterFailure::GiveUp { attempts } => {
                    tracing::error!(
                        notification_id = entry.id,
                        recipient_id = entry.recipient_id,
                        attempts,
                        "Push failed permanently: {error}"
                    );
                    notifications::mark_pushed(
                        pool,
                        entry.id,
                        PushStatus::Failed,
                        attempts,
                        Some(&error),
                    )
                    .await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(retry_delay(1), Duration::from_secs(30));
        assert_eq!(retry_delay(2), Duration::from_secs(60));
        assert_eq!(retry_delay(4), Duration::from_secs(240));
        assert_eq!(retry_delay(8), Duration::from_secs(3600));
        assert_eq!(retry_delay(100), Duration::from_secs(3600));
    }

    #[test]
    fn test_retry_until_max_attempts() {
        assert_eq!(
            after_failure(0, 1_000),
            AfterFailure::Retry {
                attempts: 1,
                next_attempt_at: 31_000
            }
        );
        assert_eq!(
            after_failure(3, 0),
            AfterFailure::Retry {
                attempts: 4,
                next_attempt_at: 240_000
            }
        );
        assert_eq!(
            after_failure(MAX_ATTEMPTS - 1, 0),
            AfterFailure::GiveUp {
                attempts: MAX_ATTEMPTS
            }
        );
    }
}
