//! Transactional group sale operations

use shared::error::{AppError, ErrorCode};
use shared::models::{GroupSale, GroupSaleCreate, GroupSaleStatus, UserRole};
use shared::util::{now_millis, snowflake_id};
use sqlx::PgPool;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ServiceResult;

pub async fn create(pool: &PgPool, user: &CurrentUser, req: &GroupSaleCreate) -> ServiceResult<GroupSale> {
    user.require_role(&[UserRole::Farmer, UserRole::Admin])?;

    let product = db::products::find_by_id(pool, req.product_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    user.require_owner_or_admin(product.farmer_id)?;

    if let Some(event_id) = req.haat_event_id
        && !db::haat_events::exists(pool, event_id).await?
    {
        return Err(AppError::new(ErrorCode::HaatEventNotFound).into());
    }

    let sale = super::new_sale(snowflake_id(), product.farmer_id, req, now_millis())
        .map_err(AppError::from)?;
    db::group_sales::insert(pool, &sale).await?;

    tracing::info!(
        group_sale_id = sale.id,
        product_id = sale.product_id,
        required = sale.required_quantity,
        "Group sale created"
    );
    Ok(sale)
}

pub async fn list(
    pool: &PgPool,
    status: Option<GroupSaleStatus>,
    haat_event_id: Option<i64>,
) -> ServiceResult<Vec<GroupSale>> {
    let status = status.unwrap_or(GroupSaleStatus::Open);
    Ok(db::group_sales::list(pool, status, haat_event_id).await?)
}

pub async fn get(pool: &PgPool, id: i64) -> ServiceResult<GroupSale> {
    Ok(db::group_sales::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::GroupSaleNotFound))?)
}

/// Join under a row lock so concurrent joins cannot overfill the sale
pub async fn join(pool: &PgPool, user: &CurrentUser, id: i64, quantity: f64) -> ServiceResult<GroupSale> {
    user.require_role(&[UserRole::Buyer])?;

    let mut tx = pool.begin().await?;
    let mut sale = db::group_sales::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::GroupSaleNotFound))?;

    super::join(&mut sale, user.id, quantity, now_millis()).map_err(AppError::from)?;
    db::group_sales::save(&mut *tx, &sale).await?;
    tx.commit().await?;

    tracing::info!(
        group_sale_id = id,
        buyer_id = user.id,
        quantity,
        total = sale.total_quantity_sold,
        status = sale.status.as_db(),
        "Buyer joined group sale"
    );
    Ok(sale)
}

pub async fn update_status(
    pool: &PgPool,
    user: &CurrentUser,
    id: i64,
    status: GroupSaleStatus,
) -> ServiceResult<GroupSale> {
    let mut tx = pool.begin().await?;
    let mut sale = db::group_sales::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::GroupSaleNotFound))?;
    user.require_owner_or_admin(sale.farmer_id)?;

    let from = sale.status;
    super::set_status(&mut sale, status, now_millis()).map_err(AppError::from)?;
    db::group_sales::save(&mut *tx, &sale).await?;
    tx.commit().await?;

    tracing::info!(
        group_sale_id = id,
        from = from.as_db(),
        to = status.as_db(),
        "Group sale status updated"
    );
    Ok(sale)
}
