//! Location history

use shared::models::Location;
use sqlx::PgPool;

/// Retire the user's active location row
pub async fn deactivate(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    user_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE locations SET is_active = FALSE WHERE user_id = $1 AND is_active")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_active(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    user_id: i64,
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    now: i64,
) -> Result<Location, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO locations (id, user_id, latitude, longitude, accuracy, recorded_at, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE)
         RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .bind(latitude)
    .bind(longitude)
    .bind(accuracy)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn active_for(pool: &PgPool, user_id: i64) -> Result<Option<Location>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM locations WHERE user_id = $1 AND is_active")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn history(pool: &PgPool, user_id: i64, limit: i64) -> Result<Vec<Location>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM locations WHERE user_id = $1 ORDER BY recorded_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
