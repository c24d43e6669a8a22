//! Price negotiations

use shared::models::{Negotiation, NegotiationStatus, Offer};
use sqlx::PgPool;
use sqlx::types::Json;

use super::decode_enum;

#[derive(sqlx::FromRow)]
struct NegotiationRow {
    id: i64,
    product_id: i64,
    buyer_id: i64,
    farmer_id: i64,
    offers: Json<Vec<Offer>>,
    status: String,
    final_price: Option<f64>,
    final_quantity: Option<f64>,
    accepted_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<NegotiationRow> for Negotiation {
    type Error = sqlx::Error;

    fn try_from(row: NegotiationRow) -> Result<Self, Self::Error> {
        Ok(Negotiation {
            id: row.id,
            product_id: row.product_id,
            buyer_id: row.buyer_id,
            farmer_id: row.farmer_id,
            offers: row.offers.0,
            status: decode_enum("status", &row.status, NegotiationStatus::from_db)?,
            final_price: row.final_price,
            final_quantity: row.final_quantity,
            accepted_at: row.accepted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NegotiationScope {
    Buyer(i64),
    /// Negotiations on the farmer's products, plus ones they opened as a buyer
    Farmer(i64),
    All,
}

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    n: &Negotiation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO negotiations (id, product_id, buyer_id, farmer_id, offers, status,
                                   final_price, final_quantity, accepted_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(n.id)
    .bind(n.product_id)
    .bind(n.buyer_id)
    .bind(n.farmer_id)
    .bind(Json(&n.offers))
    .bind(n.status.as_db())
    .bind(n.final_price)
    .bind(n.final_quantity)
    .bind(n.accepted_at)
    .bind(n.created_at)
    .bind(n.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn save(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    n: &Negotiation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE negotiations SET
            offers = $2, status = $3, final_price = $4, final_quantity = $5,
            accepted_at = $6, updated_at = $7
         WHERE id = $1",
    )
    .bind(n.id)
    .bind(Json(&n.offers))
    .bind(n.status.as_db())
    .bind(n.final_price)
    .bind(n.final_quantity)
    .bind(n.accepted_at)
    .bind(n.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Negotiation>, sqlx::Error> {
    sqlx::query_as::<_, NegotiationRow>("SELECT * FROM negotiations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Negotiation::try_from)
        .transpose()
}

pub async fn lock_by_id(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Negotiation>, sqlx::Error> {
    sqlx::query_as::<_, NegotiationRow>("SELECT * FROM negotiations WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(Negotiation::try_from)
        .transpose()
}

/// The active negotiation for (product, buyer), row-locked
pub async fn lock_active(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    product_id: i64,
    buyer_id: i64,
) -> Result<Option<Negotiation>, sqlx::Error> {
    sqlx::query_as::<_, NegotiationRow>(
        "SELECT * FROM negotiations
         WHERE product_id = $1 AND buyer_id = $2 AND status = 'active'
         FOR UPDATE",
    )
    .bind(product_id)
    .bind(buyer_id)
    .fetch_optional(conn)
    .await?
    .map(Negotiation::try_from)
    .transpose()
}

#[derive(Debug, Clone, Copy)]
pub struct NegotiationFilter {
    pub scope: NegotiationScope,
    /// Matched against the effective status, so lapsed active rows count as expired
    pub status: Option<NegotiationStatus>,
    pub product_id: Option<i64>,
    /// Active rows with `updated_at` at or below this have lapsed
    pub stale_before: i64,
}

pub async fn list(pool: &PgPool, filter: &NegotiationFilter) -> Result<Vec<Negotiation>, sqlx::Error> {
    let (buyer, farmer) = match filter.scope {
        NegotiationScope::Buyer(id) => (Some(id), None),
        NegotiationScope::Farmer(id) => (None, Some(id)),
        NegotiationScope::All => (None, None),
    };
    let rows: Vec<NegotiationRow> = sqlx::query_as(
        "SELECT * FROM negotiations
         WHERE ($1::BIGINT IS NULL OR buyer_id = $1)
           AND ($2::BIGINT IS NULL OR farmer_id = $2 OR buyer_id = $2)
           AND ($3::TEXT IS NULL OR
                (CASE WHEN status = 'active' AND updated_at <= $5 THEN 'expired'
                      ELSE status END) = $3)
           AND ($4::BIGINT IS NULL OR product_id = $4)
         ORDER BY updated_at DESC",
    )
    .bind(buyer)
    .bind(farmer)
    .bind(filter.status.map(|s| s.as_db()))
    .bind(filter.product_id)
    .bind(filter.stale_before)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Negotiation::try_from).collect()
}
