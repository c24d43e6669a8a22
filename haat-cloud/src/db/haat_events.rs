//! Haat (periodic market) events

use shared::models::{EventLocation, FarmerRegistration, HaatEvent, HaatEventStatus};
use sqlx::PgPool;
use sqlx::types::Json;

use super::decode_enum;

#[derive(sqlx::FromRow)]
struct HaatEventRow {
    id: i64,
    name: String,
    description: Option<String>,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    radius_km: f64,
    event_date: i64,
    registration_deadline: Option<i64>,
    created_by: i64,
    status: String,
    farmer_registrations: Json<Vec<FarmerRegistration>>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<HaatEventRow> for HaatEvent {
    type Error = sqlx::Error;

    fn try_from(row: HaatEventRow) -> Result<Self, Self::Error> {
        Ok(HaatEvent {
            id: row.id,
            name: row.name,
            description: row.description,
            location: EventLocation {
                latitude: row.latitude,
                longitude: row.longitude,
                address: row.address,
                radius_km: row.radius_km,
            },
            event_date: row.event_date,
            registration_deadline: row.registration_deadline,
            created_by: row.created_by,
            status: decode_enum("status", &row.status, HaatEventStatus::from_db)?,
            farmer_registrations: row.farmer_registrations.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    event: &HaatEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO haat_events (id, name, description, latitude, longitude, address, radius_km,
                                  event_date, registration_deadline, created_by, status,
                                  farmer_registrations, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(event.id)
    .bind(&event.name)
    .bind(event.description.as_deref())
    .bind(event.location.latitude)
    .bind(event.location.longitude)
    .bind(event.location.address.as_deref())
    .bind(event.location.radius_km)
    .bind(event.event_date)
    .bind(event.registration_deadline)
    .bind(event.created_by)
    .bind(event.status.as_db())
    .bind(Json(&event.farmer_registrations))
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<HaatEvent>, sqlx::Error> {
    sqlx::query_as::<_, HaatEventRow>("SELECT * FROM haat_events WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(HaatEvent::try_from)
        .transpose()
}

pub async fn exists(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM haat_events WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn lock_by_id(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<HaatEvent>, sqlx::Error> {
    sqlx::query_as::<_, HaatEventRow>("SELECT * FROM haat_events WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(HaatEvent::try_from)
        .transpose()
}

/// Events with an optional status filter, soonest event first
pub async fn list(
    pool: &PgPool,
    status: Option<HaatEventStatus>,
) -> Result<Vec<HaatEvent>, sqlx::Error> {
    let rows: Vec<HaatEventRow> = sqlx::query_as(
        "SELECT * FROM haat_events
         WHERE ($1::TEXT IS NULL OR status = $1)
         ORDER BY event_date",
    )
    .bind(status.map(|s| s.as_db()))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(HaatEvent::try_from).collect()
}

pub async fn save_registrations(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    event: &HaatEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE haat_events SET farmer_registrations = $2, updated_at = $3 WHERE id = $1")
        .bind(event.id)
        .bind(Json(&event.farmer_registrations))
        .bind(event.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: HaatEventStatus,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE haat_events SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM haat_events WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
