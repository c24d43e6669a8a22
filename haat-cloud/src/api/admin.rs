//! Admin console: farmer approval, user management and reports

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{NegotiationStatus, UserRole};
use shared::util::now_millis;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ServiceResult;
use crate::state::AppState;

use super::message_with;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/farmers/pending", get(pending_farmers))
        .route("/api/admin/farmers/{id}/approve", put(approve_farmer))
        .route("/api/admin/farmers/{id}/reject", delete(reject_farmer))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{id}", delete(delete_user))
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/reports/revenue", get(revenue))
        .route("/api/admin/negotiations/active", get(active_negotiations))
}

/// GET /api/admin/farmers/pending
pub async fn pending_farmers(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let farmers = db::users::pending_farmers(&state.pool).await?;
    Ok(Json(json!({ "count": farmers.len(), "farmers": farmers })))
}

/// PUT /api/admin/farmers/{id}/approve
pub async fn approve_farmer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let farmer = db::users::approve_farmer(&state.pool, id, now_millis())
        .await?
        .ok_or_else(|| {
            AppError::with_message(ErrorCode::UserNotFound, "No pending farmer with this id")
        })?;
    tracing::info!(farmer_id = id, admin_id = user.id, "Farmer approved");
    Ok(message_with("Farmer approved", "farmer", farmer)?)
}

/// DELETE /api/admin/farmers/{id}/reject
pub async fn reject_farmer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    if !db::users::delete_pending_farmer(&state.pool, id).await? {
        return Err(
            AppError::with_message(ErrorCode::UserNotFound, "No pending farmer with this id")
                .into(),
        );
    }
    tracing::info!(farmer_id = id, admin_id = user.id, "Farmer rejected");
    Ok(Json(json!({ "message": "Farmer registration rejected" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    pub role: Option<UserRole>,
    pub approved: Option<bool>,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<UsersQuery>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let users = db::users::list(&state.pool, query.role, query.approved).await?;
    Ok(Json(json!({ "count": users.len(), "users": users })))
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    if id == user.id {
        return Err(AppError::new(ErrorCode::CannotDeleteSelf).into());
    }
    if !db::users::delete(&state.pool, id).await? {
        return Err(AppError::new(ErrorCode::UserNotFound).into());
    }
    tracing::info!(user_id = id, admin_id = user.id, "User deleted");
    Ok(Json(json!({ "message": "User deleted" })))
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let stale_before = crate::negotiation::stale_before(now_millis(), state.negotiation_ttl_ms);
    let stats = db::reports::dashboard(&state.pool, stale_before).await?;
    Ok(Json(json!({ "stats": stats })))
}

/// GET /api/admin/reports/revenue
pub async fn revenue(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let farmers = db::reports::revenue_by_farmer(&state.pool).await?;
    let total: f64 = farmers.iter().map(|f| f.revenue).sum();
    Ok(Json(json!({
        "farmers": farmers,
        "totalRevenue": crate::orders::money::round_money(total),
    })))
}

/// GET /api/admin/negotiations/active
pub async fn active_negotiations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    let negotiations = crate::negotiation::service::list(
        &state.pool,
        &user,
        Some(NegotiationStatus::Active),
        None,
        state.negotiation_ttl_ms,
    )
    .await?;
    Ok(Json(json!({
        "count": negotiations.len(),
        "negotiations": negotiations,
    })))
}
