//! Farmer ratings

use std::collections::HashMap;

use serde::Serialize;
use shared::models::{Rating, RatingSummary};
use sqlx::PgPool;

/// Rating with the rater's display name
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub rating: Rating,
    pub rater_name: String,
}

/// Insert or replace the rater's rating of `target_id`
pub async fn upsert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    rater_id: i64,
    target_id: i64,
    score: f64,
    comment: Option<&str>,
    now: i64,
) -> Result<Rating, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO ratings (id, rater_id, target_id, score, comment, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $6)
         ON CONFLICT (rater_id, target_id)
         DO UPDATE SET score = EXCLUDED.score, comment = EXCLUDED.comment, updated_at = EXCLUDED.updated_at
         RETURNING *",
    )
    .bind(id)
    .bind(rater_id)
    .bind(target_id)
    .bind(score)
    .bind(comment)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn summary(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    target_id: i64,
) -> Result<RatingSummary, sqlx::Error> {
    sqlx::query_as(
        "SELECT COALESCE(AVG(score), 0)::DOUBLE PRECISION AS average, COUNT(*) AS count
         FROM ratings WHERE target_id = $1",
    )
    .bind(target_id)
    .fetch_one(conn)
    .await
}

/// Summaries keyed by target id; targets without ratings are absent
pub async fn summaries(
    pool: &PgPool,
    target_ids: &[i64],
) -> Result<HashMap<i64, RatingSummary>, sqlx::Error> {
    let rows: Vec<(i64, f64, i64)> = sqlx::query_as(
        "SELECT target_id, AVG(score)::DOUBLE PRECISION, COUNT(*)
         FROM ratings WHERE target_id = ANY($1)
         GROUP BY target_id",
    )
    .bind(target_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, average, count)| (id, RatingSummary { average, count }))
        .collect())
}

pub async fn list_for_target(pool: &PgPool, target_id: i64) -> Result<Vec<RatingView>, sqlx::Error> {
    sqlx::query_as(
        "SELECT r.*, u.name AS rater_name
         FROM ratings r JOIN users u ON u.id = r.rater_id
         WHERE r.target_id = $1
         ORDER BY r.updated_at DESC",
    )
    .bind(target_id)
    .fetch_all(pool)
    .await
}

pub async fn find(
    pool: &PgPool,
    rater_id: i64,
    target_id: i64,
) -> Result<Option<Rating>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM ratings WHERE rater_id = $1 AND target_id = $2")
        .bind(rater_id)
        .bind(target_id)
        .fetch_optional(pool)
        .await
}
