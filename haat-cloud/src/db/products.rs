//! Product listings

use shared::models::{Freshness, GeoPoint, Product, ProductStatus, ProductUpdate};
use sqlx::PgPool;

use super::decode_enum;
use super::users::escape_like;

#[derive(sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub farmer_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub quantity: f64,
    pub unit: String,
    pub freshness: String,
    pub image_url: Option<String>,
    pub status: String,
    pub haat_event_id: Option<i64>,
    pub photo_taken_at: Option<i64>,
    pub image_validated: bool,
    pub approved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<ProductRow> for Product {
    type Error = sqlx::Error;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            farmer_id: row.farmer_id,
            name: row.name,
            description: row.description,
            category: row.category,
            price: row.price,
            quantity: row.quantity,
            unit: row.unit,
            freshness: decode_enum("freshness", &row.freshness, Freshness::from_db)?,
            image_url: row.image_url,
            status: decode_enum("status", &row.status, ProductStatus::from_db)?,
            haat_event_id: row.haat_event_id,
            photo_taken_at: row.photo_taken_at,
            image_validated: row.image_validated,
            approved_at: row.approved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, sqlx::Error> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Approved product with the coordinates used for proximity ranking
#[derive(sqlx::FromRow)]
struct LocatedProductRow {
    #[sqlx(flatten)]
    product: ProductRow,
    farmer_latitude: Option<f64>,
    farmer_longitude: Option<f64>,
    event_latitude: Option<f64>,
    event_longitude: Option<f64>,
}

pub struct LocatedProduct {
    pub product: Product,
    pub farmer_location: Option<GeoPoint>,
    pub event_location: Option<GeoPoint>,
}

fn point(lat: Option<f64>, lon: Option<f64>) -> Option<GeoPoint> {
    Some(GeoPoint::new(lat?, lon?))
}

pub struct NewProduct<'a> {
    pub id: i64,
    pub farmer_id: i64,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub category: &'a str,
    pub price: f64,
    pub quantity: f64,
    pub unit: &'a str,
    pub freshness: Freshness,
    pub image_url: Option<&'a str>,
    pub status: ProductStatus,
    pub haat_event_id: Option<i64>,
    pub photo_taken_at: Option<i64>,
    pub image_validated: bool,
}

pub async fn create(pool: &PgPool, p: &NewProduct<'_>, now: i64) -> Result<Product, sqlx::Error> {
    let approved_at = (p.status == ProductStatus::Approved).then_some(now);
    let row: ProductRow = sqlx::query_as(
        "INSERT INTO products (id, farmer_id, name, description, category, price, quantity, unit,
                               freshness, image_url, status, haat_event_id, photo_taken_at,
                               image_validated, approved_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
         RETURNING *",
    )
    .bind(p.id)
    .bind(p.farmer_id)
    .bind(p.name)
    .bind(p.description)
    .bind(p.category)
    .bind(p.price)
    .bind(p.quantity)
    .bind(p.unit)
    .bind(p.freshness.as_db())
    .bind(p.image_url)
    .bind(p.status.as_db())
    .bind(p.haat_event_id)
    .bind(p.photo_taken_at)
    .bind(p.image_validated)
    .bind(approved_at)
    .bind(now)
    .fetch_one(pool)
    .await?;
    row.try_into()
}

pub async fn find_by_id(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(Product::try_from)
        .transpose()
}

pub async fn find_many(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    ids: &[i64],
) -> Result<Vec<Product>, sqlx::Error> {
    let rows: Vec<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(conn)
        .await?;
    into_products(rows)
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
    pub haat_event_id: Option<i64>,
}

/// Approved products matching `filter`, newest first, plus the total match count
pub async fn list_approved(
    pool: &PgPool,
    filter: &ProductFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Product>, i64), sqlx::Error> {
    const WHERE: &str = "WHERE status = 'approved'
           AND ($1::TEXT IS NULL OR category = $1)
           AND ($2::DOUBLE PRECISION IS NULL OR price >= $2)
           AND ($3::DOUBLE PRECISION IS NULL OR price <= $3)
           AND ($4::TEXT IS NULL OR name ILIKE $4 OR description ILIKE $4)
           AND ($5::BIGINT IS NULL OR haat_event_id = $5)";

    let pattern = filter
        .search
        .as_deref()
        .map(|q| format!("%{}%", escape_like(q)));

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {WHERE}"))
        .bind(filter.category.as_deref())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(pattern.as_deref())
        .bind(filter.haat_event_id)
        .fetch_one(pool)
        .await?;

    let rows: Vec<ProductRow> = sqlx::query_as(&format!(
        "SELECT * FROM products {WHERE} ORDER BY created_at DESC LIMIT $6 OFFSET $7"
    ))
    .bind(filter.category.as_deref())
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(pattern.as_deref())
    .bind(filter.haat_event_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((into_products(rows)?, total))
}

pub async fn list_by_farmer(pool: &PgPool, farmer_id: i64) -> Result<Vec<Product>, sqlx::Error> {
    let rows: Vec<ProductRow> =
        sqlx::query_as("SELECT * FROM products WHERE farmer_id = $1 ORDER BY created_at DESC")
            .bind(farmer_id)
            .fetch_all(pool)
            .await?;
    into_products(rows)
}

pub async fn list_pending(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let rows: Vec<ProductRow> =
        sqlx::query_as("SELECT * FROM products WHERE status = 'pending' ORDER BY created_at")
            .fetch_all(pool)
            .await?;
    into_products(rows)
}

/// Approved products with farmer and haat-event coordinates
pub async fn list_approved_located(pool: &PgPool) -> Result<Vec<LocatedProduct>, sqlx::Error> {
    let rows: Vec<LocatedProductRow> = sqlx::query_as(
        "SELECT p.*,
                u.latitude AS farmer_latitude, u.longitude AS farmer_longitude,
                e.latitude AS event_latitude, e.longitude AS event_longitude
         FROM products p
         JOIN users u ON u.id = p.farmer_id
         LEFT JOIN haat_events e ON e.id = p.haat_event_id
         WHERE p.status = 'approved' AND p.quantity > 0",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(LocatedProduct {
                farmer_location: point(row.farmer_latitude, row.farmer_longitude),
                event_location: point(row.event_latitude, row.event_longitude),
                product: row.product.try_into()?,
            })
        })
        .collect()
}

/// Approved products in stock, largest quantity first
pub async fn list_in_stock(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let rows: Vec<ProductRow> = sqlx::query_as(
        "SELECT * FROM products
         WHERE status = 'approved' AND quantity > 0
         ORDER BY quantity DESC",
    )
    .fetch_all(pool)
    .await?;
    into_products(rows)
}

pub async fn update(
    pool: &PgPool,
    id: i64,
    update: &ProductUpdate,
    status: ProductStatus,
    now: i64,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, ProductRow>(
        "UPDATE products SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            price = COALESCE($5, price),
            quantity = COALESCE($6, quantity),
            unit = COALESCE($7, unit),
            freshness = COALESCE($8, freshness),
            image_url = COALESCE($9, image_url),
            haat_event_id = COALESCE($10, haat_event_id),
            status = $11,
            updated_at = $12
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(update.name.as_deref())
    .bind(update.description.as_deref())
    .bind(update.category.as_deref())
    .bind(update.price)
    .bind(update.quantity)
    .bind(update.unit.as_deref())
    .bind(update.freshness.map(|f| f.as_db()))
    .bind(update.image_url.as_deref())
    .bind(update.haat_event_id)
    .bind(status.as_db())
    .bind(now)
    .fetch_optional(pool)
    .await?
    .map(Product::try_from)
    .transpose()
}

pub async fn set_status(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    status: ProductStatus,
    now: i64,
) -> Result<Option<Product>, sqlx::Error> {
    let approved_at = (status == ProductStatus::Approved).then_some(now);
    sqlx::query_as::<_, ProductRow>(
        "UPDATE products SET status = $2, approved_at = $3, updated_at = $4
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(status.as_db())
    .bind(approved_at)
    .bind(now)
    .fetch_optional(conn)
    .await?
    .map(Product::try_from)
    .transpose()
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Decrement stock only if enough remains. `false` leaves the row untouched.
pub async fn deduct_stock(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    quantity: f64,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE products SET quantity = quantity - $2, updated_at = $3
         WHERE id = $1 AND quantity >= $2",
    )
    .bind(id)
    .bind(quantity)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn current_quantity(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, freshness: &str) -> ProductRow {
        ProductRow {
            id: 1,
            farmer_id: 2,
            name: "Tomato".into(),
            description: None,
            category: "vegetables".into(),
            price: 80.0,
            quantity: 25.0,
            unit: "kg".into(),
            freshness: freshness.into(),
            image_url: None,
            status: status.into(),
            haat_event_id: None,
            photo_taken_at: None,
            image_validated: false,
            approved_at: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_row_into_product() {
        let product = Product::try_from(row("approved", "good")).unwrap();
        assert_eq!(product.status, ProductStatus::Approved);
        assert_eq!(product.freshness, Freshness::Good);
    }

    #[test]
    fn test_bad_freshness_fails_decode() {
        assert!(Product::try_from(row("approved", "rotten")).is_err());
    }

    #[test]
    fn test_point_requires_both_coordinates() {
        assert!(point(Some(27.7), None).is_none());
        assert_eq!(point(Some(27.7), Some(85.3)), Some(GeoPoint::new(27.7, 85.3)));
    }
}
