//! Price negotiation endpoints

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::models::{NegotiationCreate, NegotiationRespond, NegotiationStatus};

use crate::auth::CurrentUser;
use crate::error::ServiceResult;
use crate::negotiation::service;
use crate::state::AppState;

use super::message_with;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/negotiations", post(create).get(list))
        .route("/api/negotiations/{id}", get(get_one))
        .route("/api/negotiations/{id}/respond", put(respond))
}

/// POST /api/negotiations
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<NegotiationCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let negotiation =
        service::create_or_offer(&state.pool, &user, &req, state.negotiation_ttl_ms).await?;
    let status = if negotiation.offers.len() == 1 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, message_with("Offer sent", "negotiation", negotiation)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationsQuery {
    pub status: Option<NegotiationStatus>,
    #[serde(alias = "product")]
    pub product_id: Option<i64>,
}

/// GET /api/negotiations
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<NegotiationsQuery>,
) -> ServiceResult<Json<Value>> {
    let negotiations = service::list(
        &state.pool,
        &user,
        query.status,
        query.product_id,
        state.negotiation_ttl_ms,
    )
    .await?;
    Ok(Json(json!({
        "count": negotiations.len(),
        "negotiations": negotiations,
    })))
}

/// GET /api/negotiations/{id}
pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let negotiation = service::get(&state.pool, &user, id, state.negotiation_ttl_ms).await?;
    Ok(Json(json!({ "negotiation": negotiation })))
}

/// PUT /api/negotiations/{id}/respond
pub async fn respond(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<NegotiationRespond>,
) -> ServiceResult<Json<Value>> {
    let negotiation =
        service::respond(&state.pool, &user, id, &req, state.negotiation_ttl_ms).await?;
    Ok(message_with(
        &format!("Negotiation {}", negotiation.status.as_db()),
        "negotiation",
        negotiation,
    )?)
}
