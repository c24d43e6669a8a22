//! Transactional order operations

use shared::error::{AppError, ErrorCode};
use shared::models::{Order, OrderCreate, OrderStatus, UserRole};
use shared::util::{now_millis, snowflake_id};
use sqlx::{PgConnection, PgPool};

use super::lifecycle::{self, OrderCaller, OrderEffect, OrderError};
use crate::auth::CurrentUser;
use crate::db;
use crate::db::orders::OrderScope;
use crate::error::ServiceResult;
use crate::notify;

pub async fn create_order(pool: &PgPool, user: &CurrentUser, req: &OrderCreate) -> ServiceResult<Order> {
    user.require_role(&[UserRole::Buyer, UserRole::Admin])?;

    let ids: Vec<i64> = req.products.iter().map(|line| line.product).collect();
    let products = db::products::find_many(pool, &ids).await?;

    let now = now_millis();
    let (order, effects) = lifecycle::build_order(snowflake_id(), user.id, req, &products, now)
        .map_err(AppError::from)?;

    let mut tx = pool.begin().await?;
    db::orders::insert(&mut *tx, &order).await?;
    apply_effects(&mut tx, &order, &effects, now).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = order.id,
        buyer_id = order.buyer_id,
        farmer_id = order.farmer_id,
        total = order.total_amount,
        "Order placed"
    );
    Ok(order)
}

pub async fn update_status(
    pool: &PgPool,
    user: &CurrentUser,
    order_id: i64,
    status: OrderStatus,
) -> ServiceResult<Order> {
    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    let caller = resolve_caller(&order, user)?;

    let from = order.status;
    let now = now_millis();
    let effects =
        lifecycle::apply_status(&mut order, status, caller, now).map_err(AppError::from)?;
    if order.status == from {
        return Ok(order);
    }

    apply_effects(&mut tx, &order, &effects, now).await?;
    db::orders::save(&mut *tx, &order).await?;
    tx.commit().await?;

    tracing::info!(
        order_id,
        from = from.as_db(),
        to = order.status.as_db(),
        "Order status updated"
    );
    Ok(order)
}

pub async fn cancel_order(pool: &PgPool, user: &CurrentUser, order_id: i64) -> ServiceResult<Order> {
    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    let caller = resolve_caller(&order, user)?;

    let now = now_millis();
    let effects = lifecycle::apply_cancel(&mut order, caller, now).map_err(AppError::from)?;

    apply_effects(&mut tx, &order, &effects, now).await?;
    db::orders::save(&mut *tx, &order).await?;
    tx.commit().await?;

    tracing::info!(order_id, "Order cancelled");
    Ok(order)
}

pub async fn get_order(pool: &PgPool, user: &CurrentUser, order_id: i64) -> ServiceResult<Order> {
    let order = db::orders::find_by_id(pool, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    resolve_caller(&order, user)?;
    Ok(order)
}

pub async fn list_orders(
    pool: &PgPool,
    user: &CurrentUser,
    status: Option<OrderStatus>,
) -> ServiceResult<Vec<Order>> {
    let scope = match user.role {
        UserRole::Buyer => OrderScope::Buyer(user.id),
        UserRole::Farmer => OrderScope::Farmer(user.id),
        UserRole::Admin => OrderScope::All,
    };
    Ok(db::orders::list(pool, scope, status).await?)
}

pub(crate) async fn lock_order(tx: &mut PgConnection, order_id: i64) -> ServiceResult<Order> {
    Ok(db::orders::lock_by_id(&mut *tx, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?)
}

pub(crate) fn resolve_caller(order: &Order, user: &CurrentUser) -> Result<OrderCaller, AppError> {
    OrderCaller::resolve(order, user.id, user.role).ok_or_else(|| {
        AppError::with_message(ErrorCode::NotOwner, "You are not a party to this order")
    })
}

/// Apply state-machine effects on the open transaction.
///
/// A failed stock decrement aborts with an error; the caller drops the
/// transaction, so no partial deduction is committed.
async fn apply_effects(
    tx: &mut PgConnection,
    order: &Order,
    effects: &[OrderEffect],
    now: i64,
) -> ServiceResult<()> {
    for effect in effects {
        match effect {
            OrderEffect::DeductInventory => {
                for item in &order.items {
                    let deducted =
                        db::products::deduct_stock(&mut *tx, item.product_id, item.quantity, now)
                            .await?;
                    if !deducted {
                        let available = db::products::current_quantity(&mut *tx, item.product_id)
                            .await?
                            .unwrap_or(0.0);
                        tracing::warn!(
                            order_id = order.id,
                            product_id = item.product_id,
                            requested = item.quantity,
                            available,
                            "Inventory deduction failed, rolling back"
                        );
                        return Err(AppError::from(OrderError::InsufficientQuantity {
                            name: item.name.clone(),
                            requested: item.quantity,
                            available,
                        })
                        .into());
                    }
                }
            }
            OrderEffect::Notify(notice) => notify::enqueue(&mut *tx, notice, now).await?,
        }
    }
    Ok(())
}
