//! Product catalogue, moderation, smart and bulk-buy listings

use std::cmp::Ordering;
use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    GeoPoint, GroupSale, NotificationType, Product, ProductCreate, ProductStatus, ProductUpdate,
    UserRole,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::db::products::{LocatedProduct, NewProduct, ProductFilter};
use crate::error::ServiceResult;
use crate::geo::{self, haversine_km, round2, within_radius};
use crate::group_sale;
use crate::notify::{self, Notice};
use crate::state::AppState;

use super::{message_with, page_window};

/// Photo taken this close to upload auto-approves the listing
const PHOTO_FRESH_MS: i64 = 24 * 3_600_000;
/// Radius for the "near you" tiers of the smart listing
const NEARBY_KM: f64 = 50.0;
const DEFAULT_BULK_MIN_KG: f64 = 10.0;
/// Upper bound on group sales merged into the bulk-buy listing
const BULK_GROUP_SALE_SCAN: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list).post(create))
        .route("/api/products/mine", get(mine))
        .route("/api/products/smart", get(smart))
        .route("/api/products/bulk", get(bulk))
        .route(
            "/api/products/{id}",
            get(get_one).put(update).delete(delete),
        )
        .route("/api/admin/products/pending", get(pending))
        .route("/api/admin/products/{id}/status", put(moderate))
}

/// Whether a photo timestamp is close enough to `now` to skip moderation
pub fn photo_is_fresh(photo_taken_at: Option<i64>, now: i64) -> bool {
    photo_taken_at.is_some_and(|taken| (now - taken).abs() <= PHOTO_FRESH_MS)
}

fn validate_price(price: f64) -> Result<(), AppError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::ProductInvalidPrice))
    }
}

fn validate_quantity(quantity: f64) -> Result<(), AppError> {
    if quantity.is_finite() && quantity >= 0.0 {
        Ok(())
    } else {
        Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "Quantity cannot be negative",
        ))
    }
}

pub fn validate_create(req: &ProductCreate) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::required("name"));
    }
    if req.category.trim().is_empty() {
        return Err(AppError::required("category"));
    }
    validate_price(req.price)?;
    validate_quantity(req.quantity)
}

pub fn validate_update(req: &ProductUpdate) -> Result<(), AppError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("name cannot be empty"));
    }
    if req.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(AppError::validation("category cannot be empty"));
    }
    if let Some(price) = req.price {
        validate_price(price)?;
    }
    if let Some(quantity) = req.quantity {
        validate_quantity(quantity)?;
    }
    Ok(())
}

/// Status after an edit: a farmer fixing a rejected listing sends it back to review
pub fn status_after_update(current: ProductStatus, editor_role: UserRole) -> ProductStatus {
    if current == ProductStatus::Rejected && editor_role == UserRole::Farmer {
        ProductStatus::Pending
    } else {
        current
    }
}

async fn ensure_event_exists(state: &AppState, haat_event_id: Option<i64>) -> ServiceResult<()> {
    if let Some(id) = haat_event_id
        && !db::haat_events::exists(&state.pool, id).await?
    {
        return Err(AppError::new(ErrorCode::HaatEventNotFound).into());
    }
    Ok(())
}

async fn load_owned(state: &AppState, user: &CurrentUser, id: i64) -> ServiceResult<Product> {
    let product = db::products::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    user.require_owner_or_admin(product.farmer_id)?;
    Ok(product)
}

/// POST /api/products
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ProductCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    user.require_role(&[UserRole::Farmer])?;
    validate_create(&req)?;
    ensure_event_exists(&state, req.haat_event_id).await?;

    let now = now_millis();
    let validated = photo_is_fresh(req.photo_taken_at, now);
    let status = if validated {
        ProductStatus::Approved
    } else {
        ProductStatus::Pending
    };
    let unit = req
        .unit
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or("kg");

    let product = db::products::create(
        &state.pool,
        &NewProduct {
            id: snowflake_id(),
            farmer_id: user.id,
            name: req.name.trim(),
            description: req.description.as_deref(),
            category: req.category.trim(),
            price: req.price,
            quantity: req.quantity,
            unit,
            freshness: req.freshness.unwrap_or_default(),
            image_url: req.image_url.as_deref(),
            status,
            haat_event_id: req.haat_event_id,
            photo_taken_at: req.photo_taken_at,
            image_validated: validated,
        },
        now,
    )
    .await?;

    tracing::info!(
        product_id = product.id,
        farmer_id = user.id,
        status = status.as_db(),
        "Product created"
    );
    let message = if validated {
        "Product created and approved"
    } else {
        "Product created and awaiting approval"
    };
    Ok((StatusCode::CREATED, message_with(message, "product", product)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsQuery {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub q: Option<String>,
    pub haat_event_id: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/products
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> ServiceResult<Json<Value>> {
    let (page, limit) = page_window(query.page, query.limit, 12, 50);
    let filter = ProductFilter {
        category: query.category.filter(|c| !c.trim().is_empty()),
        min_price: query.min_price,
        max_price: query.max_price,
        search: query.q.filter(|q| !q.trim().is_empty()),
        haat_event_id: query.haat_event_id,
    };
    let (products, total) =
        db::products::list_approved(&state.pool, &filter, limit, (page - 1) * limit).await?;
    Ok(Json(json!({
        "products": products,
        "total": total,
        "page": page,
        "pages": (total + limit - 1) / limit,
    })))
}

/// GET /api/products/mine
pub async fn mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    user.require_role(&[UserRole::Farmer])?;
    let products = db::products::list_by_farmer(&state.pool, user.id).await?;
    Ok(Json(json!({ "count": products.len(), "products": products })))
}

/// GET /api/products/{id}
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let product = db::products::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    Ok(Json(json!({ "product": product })))
}

/// PUT /api/products/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ProductUpdate>,
) -> ServiceResult<Json<Value>> {
    validate_update(&req)?;
    let product = load_owned(&state, &user, id).await?;
    ensure_event_exists(&state, req.haat_event_id).await?;

    let status = status_after_update(product.status, user.role);
    let updated = db::products::update(&state.pool, id, &req, status, now_millis())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    Ok(message_with("Product updated successfully", "product", updated)?)
}

/// DELETE /api/products/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    load_owned(&state, &user, id).await?;
    if !db::products::delete(&state.pool, id).await? {
        return Err(AppError::new(ErrorCode::ProductNotFound).into());
    }
    tracing::info!(product_id = id, user_id = user.id, "Product deleted");
    Ok(Json(json!({ "message": "Product deleted" })))
}

/// GET /api/admin/products/pending
pub async fn pending(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let products = db::products::list_pending(&state.pool).await?;
    Ok(Json(json!({ "count": products.len(), "products": products })))
}

#[derive(Deserialize)]
pub struct ModerationRequest {
    pub status: ProductStatus,
}

/// PUT /api/admin/products/{id}/status
pub async fn moderate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ModerationRequest>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    if req.status == ProductStatus::Pending {
        return Err(AppError::with_message(
            ErrorCode::ProductInvalidStatus,
            "Status must be approved or rejected",
        )
        .into());
    }

    let now = now_millis();
    let mut tx = state.pool.begin().await?;
    let product = db::products::set_status(&mut *tx, id, req.status, now)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    let notice = Notice::new(
        product.farmer_id,
        NotificationType::ProductStatus,
        format!("Product {}", req.status.as_db()),
        format!("Your product \"{}\" was {}", product.name, req.status.as_db()),
    )
    .from_user(user.id)
    .with_data("productId", product.id);
    notify::enqueue(&mut *tx, &notice, now).await?;
    tx.commit().await?;

    tracing::info!(product_id = id, status = req.status.as_db(), "Product moderated");
    Ok(message_with(
        &format!("Product {}", req.status.as_db()),
        "product",
        product,
    )?)
}

// ---- smart listing ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub event_distance: Option<f64>,
    pub farmer_distance: Option<f64>,
    pub sort_priority: u8,
}

impl RankedProduct {
    /// Distance the tiebreak sorts on: event first, then farmer
    fn sort_distance(&self) -> f64 {
        self.event_distance
            .or(self.farmer_distance)
            .unwrap_or(f64::INFINITY)
    }
}

/// Tier a product for a buyer: 1 near event, 2 near farmer, 3 everything else
pub fn rank(item: LocatedProduct, buyer: GeoPoint) -> RankedProduct {
    let event_distance = item.event_location.map(|p| haversine_km(buyer, p));
    let farmer_distance = item.farmer_location.map(|p| haversine_km(buyer, p));

    let sort_priority = if event_distance.is_some_and(|d| within_radius(d, NEARBY_KM)) {
        1
    } else if farmer_distance.is_some_and(|d| within_radius(d, NEARBY_KM)) {
        2
    } else {
        3
    };

    RankedProduct {
        product: item.product,
        event_distance: event_distance.map(round2),
        farmer_distance: farmer_distance.map(round2),
        sort_priority,
    }
}

pub fn sort_ranked(items: &mut [RankedProduct]) {
    items.sort_by(|a, b| {
        a.sort_priority.cmp(&b.sort_priority).then_with(|| {
            a.sort_distance()
                .partial_cmp(&b.sort_distance())
                .unwrap_or(Ordering::Equal)
        })
    });
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartQuery {
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(alias = "longitude")]
    pub lon: Option<f64>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/products/smart
pub async fn smart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<SmartQuery>,
) -> ServiceResult<Json<Value>> {
    let buyer = match (query.lat, query.lon) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => {
            let profile = db::users::find_by_id(&state.pool, user.id)
                .await?
                .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
            match (profile.latitude, profile.longitude) {
                (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
                _ => {
                    return Err(AppError::with_message(
                        ErrorCode::LocationRequired,
                        "Buyer location required",
                    )
                    .into());
                }
            }
        }
    };
    if !buyer.is_valid() {
        return Err(AppError::with_message(ErrorCode::ValueOutOfRange, "Invalid coordinates").into());
    }

    let needle = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let mut ranked: Vec<RankedProduct> = db::products::list_approved_located(&state.pool)
        .await?
        .into_iter()
        .filter(|item| {
            needle
                .as_deref()
                .is_none_or(|n| item.product.name.to_lowercase().contains(n))
        })
        .map(|item| rank(item, buyer))
        .collect();
    sort_ranked(&mut ranked);

    let (page, limit) = page_window(query.page, query.limit, 20, 50);
    let total = ranked.len();
    let products: Vec<RankedProduct> = ranked
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    Ok(Json(json!({
        "total": total,
        "page": page,
        "limit": limit,
        "products": products,
    })))
}

// ---- bulk-buy listing ----

#[derive(Debug, Serialize)]
#[serde(tag = "bulkBuyType", rename_all = "snake_case")]
pub enum BulkEntry {
    #[serde(rename_all = "camelCase")]
    HighQuantity {
        #[serde(flatten)]
        product: Product,
        quantity_in_kg: f64,
        bulk_buy_reason: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupSale {
        #[serde(flatten)]
        product: Product,
        bulk_buy_reason: String,
        group_sale_id: i64,
        group_sale_deadline: i64,
        group_sale_price: f64,
        original_price: f64,
        group_sale_required_quantity: f64,
        group_sale_sold_quantity: f64,
        group_sale_remaining_quantity: f64,
    },
}

/// High-quantity products over the threshold, then joinable group sales
pub fn bulk_entries(
    products: Vec<Product>,
    sales: Vec<GroupSale>,
    sale_products: &HashMap<i64, Product>,
    min_kg: f64,
    inclusive: bool,
) -> Vec<BulkEntry> {
    let high_quantity = products
        .into_iter()
        .filter(|p| geo::meets_bulk_threshold(p.quantity, &p.unit, min_kg, inclusive))
        .map(|p| {
            let kg = round2(geo::to_kg(p.quantity, &p.unit));
            BulkEntry::HighQuantity {
                bulk_buy_reason: format!("{kg}kg available"),
                quantity_in_kg: kg,
                product: p,
            }
        });

    let group_sales = sales.into_iter().filter_map(|sale| {
        let product = sale_products.get(&sale.product_id)?.clone();
        let remaining = round2(group_sale::remaining(&sale));
        Some(BulkEntry::GroupSale {
            bulk_buy_reason: format!(
                "Group sale: {}/{}{} committed",
                sale.total_quantity_sold, sale.required_quantity, product.unit
            ),
            group_sale_id: sale.id,
            group_sale_deadline: sale.deadline,
            group_sale_price: sale.price_per_unit,
            original_price: product.price,
            group_sale_required_quantity: sale.required_quantity,
            group_sale_sold_quantity: sale.total_quantity_sold,
            group_sale_remaining_quantity: remaining,
            product,
        })
    });

    high_quantity.chain(group_sales).collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuery {
    pub min_kg: Option<f64>,
    #[serde(default)]
    pub inclusive: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/products/bulk
pub async fn bulk(
    State(state): State<AppState>,
    Query(query): Query<BulkQuery>,
) -> ServiceResult<Json<Value>> {
    let min_kg = query
        .min_kg
        .filter(|kg| kg.is_finite() && *kg >= 0.0)
        .unwrap_or(DEFAULT_BULK_MIN_KG);
    let (page, limit) = page_window(query.page, query.limit, 10, 50);

    let products = db::products::list_in_stock(&state.pool).await?;
    let sales = db::group_sales::list_joinable(&state.pool, now_millis(), BULK_GROUP_SALE_SCAN).await?;
    let product_ids: Vec<i64> = sales.iter().map(|s| s.product_id).collect();
    let sale_products: HashMap<i64, Product> = db::products::find_many(&state.pool, &product_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let entries = bulk_entries(products, sales, &sale_products, min_kg, query.inclusive);
    let total = entries.len() as i64;
    let total_pages = if total == 0 { 1 } else { (total + limit - 1) / limit };
    let products: Vec<BulkEntry> = entries
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    Ok(Json(json!({
        "total": total,
        "page": page,
        "limit": limit,
        "totalPages": total_pages,
        "hasNextPage": page < total_pages,
        "thresholdKg": min_kg,
        "inclusive": query.inclusive,
        "products": products,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Freshness, GroupSaleStatus};

    const KATHMANDU: GeoPoint = GeoPoint {
        latitude: 27.7172,
        longitude: 85.3240,
    };
    const BHAKTAPUR: GeoPoint = GeoPoint {
        latitude: 27.6710,
        longitude: 85.4298,
    };
    const POKHARA: GeoPoint = GeoPoint {
        latitude: 28.2096,
        longitude: 83.9856,
    };

    fn product(id: i64, quantity: f64, unit: &str) -> Product {
        Product {
            id,
            farmer_id: 10,
            name: format!("Product {id}"),
            description: None,
            category: "vegetables".into(),
            price: 80.0,
            quantity,
            unit: unit.into(),
            freshness: Freshness::Fresh,
            image_url: None,
            status: ProductStatus::Approved,
            haat_event_id: None,
            photo_taken_at: None,
            image_validated: false,
            approved_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn located(id: i64, farmer: Option<GeoPoint>, event: Option<GeoPoint>) -> LocatedProduct {
        LocatedProduct {
            product: product(id, 5.0, "kg"),
            farmer_location: farmer,
            event_location: event,
        }
    }

    #[test]
    fn test_photo_freshness_window() {
        let now = 10 * PHOTO_FRESH_MS;
        assert!(photo_is_fresh(Some(now - PHOTO_FRESH_MS), now));
        assert!(photo_is_fresh(Some(now + 60_000), now));
        assert!(!photo_is_fresh(Some(now - PHOTO_FRESH_MS - 1), now));
        assert!(!photo_is_fresh(None, now));
    }

    #[test]
    fn test_create_validation() {
        let mut req = ProductCreate {
            name: "Tomato".into(),
            description: None,
            category: "vegetables".into(),
            price: 80.0,
            quantity: 0.0,
            unit: None,
            freshness: None,
            image_url: None,
            haat_event_id: None,
            photo_taken_at: None,
        };
        assert!(validate_create(&req).is_ok());

        req.price = 0.0;
        assert_eq!(
            validate_create(&req).unwrap_err().code,
            ErrorCode::ProductInvalidPrice
        );
        req.price = 10.0;
        req.quantity = -1.0;
        assert_eq!(
            validate_create(&req).unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );
    }

    #[test]
    fn test_rejected_product_returns_to_review_on_farmer_edit() {
        assert_eq!(
            status_after_update(ProductStatus::Rejected, UserRole::Farmer),
            ProductStatus::Pending
        );
        assert_eq!(
            status_after_update(ProductStatus::Rejected, UserRole::Admin),
            ProductStatus::Rejected
        );
        assert_eq!(
            status_after_update(ProductStatus::Approved, UserRole::Farmer),
            ProductStatus::Approved
        );
    }

    #[test]
    fn test_smart_ranking_tiers() {
        let mut ranked = vec![
            rank(located(1, None, None), KATHMANDU),
            rank(located(2, Some(POKHARA), None), KATHMANDU),
            rank(located(3, Some(BHAKTAPUR), None), KATHMANDU),
            rank(located(4, Some(POKHARA), Some(BHAKTAPUR)), KATHMANDU),
            rank(located(5, None, Some(KATHMANDU)), KATHMANDU),
        ];
        sort_ranked(&mut ranked);

        let order: Vec<(i64, u8)> = ranked
            .iter()
            .map(|r| (r.product.id, r.sort_priority))
            .collect();
        assert_eq!(order, vec![(5, 1), (4, 1), (3, 2), (2, 3), (1, 3)]);
        assert_eq!(ranked[0].event_distance, Some(0.0));
        assert_eq!(ranked[4].farmer_distance, None);
    }

    #[test]
    fn test_bulk_entries_threshold_and_group_sales() {
        let products = vec![
            product(1, 10.0, "kg"),
            product(2, 12.0, "kg"),
            product(3, 1.0, "quintal"),
            product(4, 9000.0, "g"),
        ];
        let sale = GroupSale {
            id: 50,
            product_id: 7,
            farmer_id: 10,
            haat_event_id: None,
            required_quantity: 100.0,
            price_per_unit: 60.0,
            deadline: 1_000,
            participants: vec![],
            total_quantity_sold: 60.0,
            status: GroupSaleStatus::Open,
            created_at: 0,
            updated_at: 0,
        };
        let orphan = GroupSale {
            id: 51,
            product_id: 99,
            ..sale.clone()
        };
        let sale_products = HashMap::from([(7, product(7, 100.0, "kg"))]);

        let entries = bulk_entries(products, vec![sale, orphan], &sale_products, 10.0, false);
        assert_eq!(entries.len(), 3);

        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0]["bulkBuyType"], "high_quantity");
        assert_eq!(json[0]["id"], 2);
        assert_eq!(json[1]["quantityInKg"], 100.0);
        assert_eq!(json[2]["bulkBuyType"], "group_sale");
        assert_eq!(json[2]["groupSaleRemainingQuantity"], 40.0);
        assert_eq!(json[2]["originalPrice"], 80.0);
    }

    #[test]
    fn test_bulk_inclusive_threshold() {
        let entries = bulk_entries(
            vec![product(1, 10.0, "kg")],
            vec![],
            &HashMap::new(),
            10.0,
            true,
        );
        assert_eq!(entries.len(), 1);
    }
}
