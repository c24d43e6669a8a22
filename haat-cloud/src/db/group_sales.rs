//! Group sales

use shared::models::{GroupSale, GroupSaleStatus, Participant};
use sqlx::PgPool;
use sqlx::types::Json;

use super::decode_enum;

#[derive(sqlx::FromRow)]
struct GroupSaleRow {
    id: i64,
    product_id: i64,
    farmer_id: i64,
    haat_event_id: Option<i64>,
    required_quantity: f64,
    price_per_unit: f64,
    deadline: i64,
    participants: Json<Vec<Participant>>,
    total_quantity_sold: f64,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<GroupSaleRow> for GroupSale {
    type Error = sqlx::Error;

    fn try_from(row: GroupSaleRow) -> Result<Self, Self::Error> {
        Ok(GroupSale {
            id: row.id,
            product_id: row.product_id,
            farmer_id: row.farmer_id,
            haat_event_id: row.haat_event_id,
            required_quantity: row.required_quantity,
            price_per_unit: row.price_per_unit,
            deadline: row.deadline,
            participants: row.participants.0,
            total_quantity_sold: row.total_quantity_sold,
            status: decode_enum("status", &row.status, GroupSaleStatus::from_db)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_sales(rows: Vec<GroupSaleRow>) -> Result<Vec<GroupSale>, sqlx::Error> {
    rows.into_iter().map(GroupSale::try_from).collect()
}

pub async fn insert(pool: &PgPool, sale: &GroupSale) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO group_sales (id, product_id, farmer_id, haat_event_id, required_quantity,
                                  price_per_unit, deadline, participants, total_quantity_sold,
                                  status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(sale.id)
    .bind(sale.product_id)
    .bind(sale.farmer_id)
    .bind(sale.haat_event_id)
    .bind(sale.required_quantity)
    .bind(sale.price_per_unit)
    .bind(sale.deadline)
    .bind(Json(&sale.participants))
    .bind(sale.total_quantity_sold)
    .bind(sale.status.as_db())
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<GroupSale>, sqlx::Error> {
    sqlx::query_as::<_, GroupSaleRow>("SELECT * FROM group_sales WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(GroupSale::try_from)
        .transpose()
}

pub async fn lock_by_id(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<GroupSale>, sqlx::Error> {
    sqlx::query_as::<_, GroupSaleRow>("SELECT * FROM group_sales WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(GroupSale::try_from)
        .transpose()
}

pub async fn save(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    sale: &GroupSale,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE group_sales SET
            participants = $2, total_quantity_sold = $3, status = $4, updated_at = $5
         WHERE id = $1",
    )
    .bind(sale.id)
    .bind(Json(&sale.participants))
    .bind(sale.total_quantity_sold)
    .bind(sale.status.as_db())
    .bind(sale.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Sales with `status`, optionally for one haat event, soonest deadline first
pub async fn list(
    pool: &PgPool,
    status: GroupSaleStatus,
    haat_event_id: Option<i64>,
) -> Result<Vec<GroupSale>, sqlx::Error> {
    let rows: Vec<GroupSaleRow> = sqlx::query_as(
        "SELECT * FROM group_sales
         WHERE status = $1 AND ($2::BIGINT IS NULL OR haat_event_id = $2)
         ORDER BY deadline",
    )
    .bind(status.as_db())
    .bind(haat_event_id)
    .fetch_all(pool)
    .await?;
    into_sales(rows)
}

/// Open sales that still have room and whose deadline is ahead
pub async fn list_joinable(pool: &PgPool, now: i64, limit: i64) -> Result<Vec<GroupSale>, sqlx::Error> {
    let rows: Vec<GroupSaleRow> = sqlx::query_as(
        "SELECT * FROM group_sales
         WHERE status = 'open' AND deadline > $1 AND total_quantity_sold < required_quantity
         ORDER BY deadline
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    into_sales(rows)
}
