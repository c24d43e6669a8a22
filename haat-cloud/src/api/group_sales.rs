//! Group sale endpoints

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::models::{GroupSaleCreate, GroupSaleJoin, GroupSaleStatus, GroupSaleStatusUpdate};

use crate::auth::CurrentUser;
use crate::error::ServiceResult;
use crate::group_sale::{self, service};
use crate::state::AppState;

use super::message_with;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/group-sales", post(create).get(list))
        .route("/api/group-sales/{id}", get(get_one))
        .route("/api/group-sales/{id}/join", post(join))
        .route("/api/group-sales/{id}/status", put(update_status))
}

/// POST /api/group-sales
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<GroupSaleCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let sale = service::create(&state.pool, &user, &req).await?;
    Ok((StatusCode::CREATED, message_with("Group sale created", "groupSale", sale)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSalesQuery {
    pub status: Option<GroupSaleStatus>,
    pub haat_event_id: Option<i64>,
}

/// GET /api/group-sales
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<GroupSalesQuery>,
) -> ServiceResult<Json<Value>> {
    let sales = service::list(&state.pool, query.status, query.haat_event_id).await?;
    Ok(Json(json!({ "count": sales.len(), "groupSales": sales })))
}

/// GET /api/group-sales/{id}
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let sale = service::get(&state.pool, id).await?;
    let remaining = group_sale::remaining(&sale);
    Ok(Json(json!({ "groupSale": sale, "remainingQuantity": remaining })))
}

/// POST /api/group-sales/{id}/join
pub async fn join(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<GroupSaleJoin>,
) -> ServiceResult<Json<Value>> {
    let sale = service::join(&state.pool, &user, id, req.quantity).await?;
    Ok(message_with("Joined group sale", "groupSale", sale)?)
}

/// PUT /api/group-sales/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<GroupSaleStatusUpdate>,
) -> ServiceResult<Json<Value>> {
    let sale = service::update_status(&state.pool, &user, id, req.status).await?;
    Ok(message_with(
        &format!("Group sale status updated to {}", sale.status.as_db()),
        "groupSale",
        sale,
    )?)
}
