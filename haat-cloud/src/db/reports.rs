//! Admin dashboard aggregates

use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Default, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub buyers: i64,
    pub farmers: i64,
    pub admins: i64,
    pub pending_farmers: i64,
    pub approved_products: i64,
    pub pending_products: i64,
    pub rejected_products: i64,
    pub total_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub delivered_revenue: f64,
    pub active_negotiations: i64,
    pub open_group_sales: i64,
}

/// `stale_before`: active negotiations last touched at or before this have lapsed
pub async fn dashboard(pool: &PgPool, stale_before: i64) -> Result<DashboardStats, sqlx::Error> {
    sqlx::query_as(
        "SELECT
            (SELECT COUNT(*) FROM users WHERE role = 'buyer') AS buyers,
            (SELECT COUNT(*) FROM users WHERE role = 'farmer') AS farmers,
            (SELECT COUNT(*) FROM users WHERE role = 'admin') AS admins,
            (SELECT COUNT(*) FROM users WHERE role = 'farmer' AND NOT approved) AS pending_farmers,
            (SELECT COUNT(*) FROM products WHERE status = 'approved') AS approved_products,
            (SELECT COUNT(*) FROM products WHERE status = 'pending') AS pending_products,
            (SELECT COUNT(*) FROM products WHERE status = 'rejected') AS rejected_products,
            (SELECT COUNT(*) FROM orders) AS total_orders,
            (SELECT COUNT(*) FROM orders WHERE status = 'delivered') AS delivered_orders,
            (SELECT COUNT(*) FROM orders WHERE status = 'cancelled') AS cancelled_orders,
            (SELECT COALESCE(SUM(total_amount), 0)::DOUBLE PRECISION
               FROM orders WHERE status = 'delivered') AS delivered_revenue,
            (SELECT COUNT(*) FROM negotiations
               WHERE status = 'active' AND updated_at > $1) AS active_negotiations,
            (SELECT COUNT(*) FROM group_sales WHERE status = 'open') AS open_group_sales",
    )
    .bind(stale_before)
    .fetch_one(pool)
    .await
}

/// Delivered revenue for one farmer
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FarmerRevenue {
    pub farmer_id: i64,
    pub farmer_name: String,
    pub order_count: i64,
    pub revenue: f64,
}

pub async fn revenue_by_farmer(pool: &PgPool) -> Result<Vec<FarmerRevenue>, sqlx::Error> {
    sqlx::query_as(
        "SELECT o.farmer_id, u.name AS farmer_name,
                COUNT(*) AS order_count,
                SUM(o.total_amount)::DOUBLE PRECISION AS revenue
         FROM orders o JOIN users u ON u.id = o.farmer_id
         WHERE o.status = 'delivered'
         GROUP BY o.farmer_id, u.name
         ORDER BY revenue DESC",
    )
    .fetch_all(pool)
    .await
}
