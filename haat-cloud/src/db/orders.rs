//! Orders

use shared::models::{
    DeliveryLocation, DeliveryOption, DeliveryStatus, Order, OrderItem, OrderStatus,
    PaymentDetails, PaymentMethod, PaymentStatus,
};
use sqlx::PgPool;
use sqlx::types::Json;

use super::decode_enum;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    buyer_id: i64,
    farmer_id: i64,
    items: Json<Vec<OrderItem>>,
    total_amount: f64,
    status: String,
    delivery_option: String,
    delivery_location: Option<Json<DeliveryLocation>>,
    delivery_status: String,
    delivery_responded_at: Option<i64>,
    payment_method: String,
    payment_status: String,
    payment_details: Option<Json<PaymentDetails>>,
    inventory_deducted: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = sqlx::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            buyer_id: row.buyer_id,
            farmer_id: row.farmer_id,
            items: row.items.0,
            total_amount: row.total_amount,
            status: decode_enum("status", &row.status, OrderStatus::from_db)?,
            delivery_option: decode_enum(
                "delivery_option",
                &row.delivery_option,
                DeliveryOption::from_db,
            )?,
            delivery_location: row.delivery_location.map(|j| j.0),
            delivery_status: decode_enum(
                "delivery_status",
                &row.delivery_status,
                DeliveryStatus::from_db,
            )?,
            delivery_responded_at: row.delivery_responded_at,
            payment_method: decode_enum(
                "payment_method",
                &row.payment_method,
                PaymentMethod::from_db,
            )?,
            payment_status: decode_enum(
                "payment_status",
                &row.payment_status,
                PaymentStatus::from_db,
            )?,
            payment_details: row.payment_details.map(|j| j.0),
            inventory_deducted: row.inventory_deducted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Which orders a caller may see
#[derive(Debug, Clone, Copy)]
pub enum OrderScope {
    Buyer(i64),
    Farmer(i64),
    All,
}

pub async fn insert(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    order: &Order,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, buyer_id, farmer_id, items, total_amount, status,
                             delivery_option, delivery_location, delivery_status,
                             delivery_responded_at, payment_method, payment_status,
                             payment_details, inventory_deducted, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(order.id)
    .bind(order.buyer_id)
    .bind(order.farmer_id)
    .bind(Json(&order.items))
    .bind(order.total_amount)
    .bind(order.status.as_db())
    .bind(order.delivery_option.as_db())
    .bind(order.delivery_location.as_ref().map(Json))
    .bind(order.delivery_status.as_db())
    .bind(order.delivery_responded_at)
    .bind(order.payment_method.as_db())
    .bind(order.payment_status.as_db())
    .bind(order.payment_details.as_ref().map(Json))
    .bind(order.inventory_deducted)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Order::try_from)
        .transpose()
}

/// Load and row-lock an order for the rest of the transaction
pub async fn lock_by_id(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(Order::try_from)
        .transpose()
}

/// Persist every mutable column of `order`
pub async fn save(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    order: &Order,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET
            status = $2,
            delivery_status = $3,
            delivery_responded_at = $4,
            payment_status = $5,
            payment_details = $6,
            inventory_deducted = $7,
            updated_at = $8
         WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.status.as_db())
    .bind(order.delivery_status.as_db())
    .bind(order.delivery_responded_at)
    .bind(order.payment_status.as_db())
    .bind(order.payment_details.as_ref().map(Json))
    .bind(order.inventory_deducted)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list(
    pool: &PgPool,
    scope: OrderScope,
    status: Option<OrderStatus>,
) -> Result<Vec<Order>, sqlx::Error> {
    let (buyer, farmer) = match scope {
        OrderScope::Buyer(id) => (Some(id), None),
        OrderScope::Farmer(id) => (None, Some(id)),
        OrderScope::All => (None, None),
    };
    let rows: Vec<OrderRow> = sqlx::query_as(
        "SELECT * FROM orders
         WHERE ($1::BIGINT IS NULL OR buyer_id = $1)
           AND ($2::BIGINT IS NULL OR farmer_id = $2)
           AND ($3::TEXT IS NULL OR status = $3)
         ORDER BY created_at DESC",
    )
    .bind(buyer)
    .bind(farmer)
    .bind(status.map(|s| s.as_db()))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Order::try_from).collect()
}
