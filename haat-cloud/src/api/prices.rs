//! Market price proxy

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::price_feed::PriceSnapshot;
use crate::state::AppState;

use super::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/prices/kalimati", get(kalimati))
}

/// GET /api/prices/kalimati
pub async fn kalimati(State(state): State<AppState>) -> ApiResult<PriceSnapshot> {
    state.price_feed.kalimati().await.map(Json)
}
