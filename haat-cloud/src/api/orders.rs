//! Order endpoints, including the eSewa payment flow

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::AppError;
use shared::models::{OrderCreate, OrderStatus};

use crate::auth::CurrentUser;
use crate::error::ServiceResult;
use crate::esewa::{self, service::VerifyRequest};
use crate::orders::service;
use crate::state::AppState;

use super::message_with;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(create).get(list))
        .route("/api/orders/{id}", get(get_one).delete(cancel))
        .route("/api/orders/{id}/status", put(update_status))
        .route("/api/orders/{id}/esewa/initiate", post(esewa_initiate))
        .route("/api/orders/{id}/esewa/verify", post(esewa_verify))
}

/// POST /api/orders
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<OrderCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let order = service::create_order(&state.pool, &user, &req).await?;
    Ok((StatusCode::CREATED, message_with("Order placed successfully", "order", order)?))
}

#[derive(Deserialize)]
pub struct OrdersQuery {
    pub status: Option<OrderStatus>,
}

/// GET /api/orders
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<OrdersQuery>,
) -> ServiceResult<Json<Value>> {
    let orders = service::list_orders(&state.pool, &user, query.status).await?;
    Ok(Json(json!({ "count": orders.len(), "orders": orders })))
}

/// GET /api/orders/{id}
pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let order = service::get_order(&state.pool, &user, id).await?;
    Ok(Json(json!({ "order": order })))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// PUT /api/orders/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<StatusUpdate>,
) -> ServiceResult<Json<Value>> {
    let order = service::update_status(&state.pool, &user, id, req.status).await?;
    Ok(message_with(
        &format!("Order status updated to {}", order.status.as_db()),
        "order",
        order,
    )?)
}

/// DELETE /api/orders/{id}
pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let order = service::cancel_order(&state.pool, &user, id).await?;
    Ok(message_with("Order cancelled", "order", order)?)
}

/// POST /api/orders/{id}/esewa/initiate
pub async fn esewa_initiate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let (order, form) = esewa::service::initiate(&state.pool, &state.esewa, &user, id).await?;
    Ok(Json(json!({
        "message": "eSewa payment initiated",
        "formUrl": state.esewa.form_url,
        "payload": form,
        "order": order,
    })))
}

/// POST /api/orders/{id}/esewa/verify
pub async fn esewa_verify(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    body: Option<Json<VerifyRequest>>,
) -> ServiceResult<Json<Value>> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let order = esewa::service::verify(
        &state.pool,
        &state.esewa,
        &state.esewa_client,
        &user,
        id,
        &req,
    )
    .await?;
    Ok(Json(json!({
        "message": format!("Payment status: {}", order.payment_status.as_db()),
        "paymentStatus": order.payment_status,
        "order": order,
    })))
}

/// GET /api/orders/esewa/checkout (public)
pub async fn esewa_checkout(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Html<String>, AppError> {
    esewa::checkout::render(&state.esewa.form_url, &query).map(Html)
}
