//! Transactional negotiation operations

use shared::error::{AppError, ErrorCode};
use shared::models::{
    Negotiation, NegotiationCreate, NegotiationRespond, NegotiationStatus, NotificationType,
    ProductStatus, UserRole,
};
use shared::util::{now_millis, snowflake_id};
use sqlx::PgPool;

use super::NegotiationError;
use crate::auth::CurrentUser;
use crate::db;
use crate::db::negotiations::{NegotiationFilter, NegotiationScope};
use crate::error::ServiceResult;
use crate::notify::{self, Notice};

/// Open a negotiation, or add an offer to the caller's active one
pub async fn create_or_offer(
    pool: &PgPool,
    user: &CurrentUser,
    req: &NegotiationCreate,
    ttl_ms: i64,
) -> ServiceResult<Negotiation> {
    user.require_role(&[UserRole::Buyer, UserRole::Farmer])?;
    super::validate_offer(req.price, req.quantity).map_err(AppError::from)?;

    let product = db::products::find_by_id(pool, req.product_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
    if product.farmer_id == user.id {
        return Err(AppError::from(NegotiationError::OwnProduct).into());
    }
    if product.status != ProductStatus::Approved {
        return Err(AppError::new(ErrorCode::ProductNotApproved).into());
    }

    let now = now_millis();
    let mut tx = pool.begin().await?;

    let existing = db::negotiations::lock_active(&mut *tx, product.id, user.id).await?;
    let (live, expired) = super::split_stale(existing, now, ttl_ms);
    let negotiation = match live {
        Some(mut n) => {
            super::add_buyer_offer(&mut n, req.price, req.quantity, req.message.clone(), now)
                .map_err(AppError::from)?;
            db::negotiations::save(&mut *tx, &n).await?;
            n
        }
        None => {
            if let Some(expired) = expired {
                db::negotiations::save(&mut *tx, &expired).await?;
                tracing::info!(negotiation_id = expired.id, "Negotiation expired");
            }
            let n = super::open(
                snowflake_id(),
                &product,
                user.id,
                req.price,
                req.quantity,
                req.message.clone(),
                now,
            )
            .map_err(AppError::from)?;
            db::negotiations::insert(&mut *tx, &n).await.map_err(|e| {
                if db::is_unique_violation(&e) {
                    AppError::conflict("An active negotiation for this product already exists")
                        .into()
                } else {
                    crate::error::ServiceError::from(e)
                }
            })?;
            n
        }
    };

    let notice = Notice::new(
        negotiation.farmer_id,
        NotificationType::Negotiation,
        "New offer",
        format!(
            "{} offered Rs. {:.2} for {} {} of {}",
            user.name, req.price, req.quantity, product.unit, product.name
        ),
    )
    .from_user(user.id)
    .with_data("negotiationId", negotiation.id)
    .with_data("productId", product.id);
    notify::enqueue(&mut *tx, &notice, now).await?;

    tx.commit().await?;

    tracing::info!(
        negotiation_id = negotiation.id,
        product_id = product.id,
        offers = negotiation.offers.len(),
        "Negotiation offer recorded"
    );
    Ok(negotiation)
}

pub async fn respond(
    pool: &PgPool,
    user: &CurrentUser,
    negotiation_id: i64,
    req: &NegotiationRespond,
    ttl_ms: i64,
) -> ServiceResult<Negotiation> {
    let now = now_millis();
    let mut tx = pool.begin().await?;

    let mut n = db::negotiations::lock_by_id(&mut *tx, negotiation_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::NegotiationNotFound))?;

    if super::expire_if_stale(&mut n, now, ttl_ms) {
        db::negotiations::save(&mut *tx, &n).await?;
        tx.commit().await?;
        tracing::info!(negotiation_id, "Negotiation expired");
        return Err(AppError::from(NegotiationError::Closed(n.status.as_db())).into());
    }

    let notice =
        super::respond(&mut n, user.id, user.is_admin(), req, now).map_err(AppError::from)?;
    db::negotiations::save(&mut *tx, &n).await?;
    notify::enqueue(&mut *tx, &notice, now).await?;
    tx.commit().await?;

    tracing::info!(
        negotiation_id,
        status = n.status.as_db(),
        "Negotiation response recorded"
    );
    Ok(n)
}

pub async fn get(
    pool: &PgPool,
    user: &CurrentUser,
    negotiation_id: i64,
    ttl_ms: i64,
) -> ServiceResult<Negotiation> {
    let n = db::negotiations::find_by_id(pool, negotiation_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::NegotiationNotFound))?;
    if n.buyer_id != user.id && n.farmer_id != user.id && !user.is_admin() {
        return Err(AppError::new(ErrorCode::NotOwner).into());
    }
    Ok(super::present(n, now_millis(), ttl_ms))
}

/// Negotiations visible to the caller. Lapsed active ones are reported as expired.
pub async fn list(
    pool: &PgPool,
    user: &CurrentUser,
    status: Option<NegotiationStatus>,
    product_id: Option<i64>,
    ttl_ms: i64,
) -> ServiceResult<Vec<Negotiation>> {
    let scope = match user.role {
        UserRole::Buyer => NegotiationScope::Buyer(user.id),
        UserRole::Farmer => NegotiationScope::Farmer(user.id),
        UserRole::Admin => NegotiationScope::All,
    };
    let now = now_millis();
    let filter = NegotiationFilter {
        scope,
        status,
        product_id,
        stale_before: super::stale_before(now, ttl_ms),
    };
    let rows = db::negotiations::list(pool, &filter).await?;
    Ok(rows
        .into_iter()
        .map(|n| super::present(n, now, ttl_ms))
        .collect())
}
