//! User location tracking and nearby-farmer lookup

use std::cmp::Ordering;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{GeoPoint, LocationUpdate, User};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ServiceResult;
use crate::geo::{haversine_km, round2, within_radius};
use crate::state::AppState;

use super::message_with;

const HISTORY_LIMIT: i64 = 10;
const DEFAULT_NEARBY_RADIUS_KM: f64 = 5.0;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/locations/me", put(update_mine))
        .route("/api/locations/me/history", get(history))
        .route("/api/locations/user/{id}", get(active_for_user))
        .route("/api/locations/nearby-farmers", get(nearby_farmers))
}

fn valid_point(latitude: f64, longitude: f64) -> Result<GeoPoint, AppError> {
    let point = GeoPoint::new(latitude, longitude);
    if point.is_valid() {
        Ok(point)
    } else {
        Err(AppError::with_message(ErrorCode::ValueOutOfRange, "Invalid coordinates"))
    }
}

/// PUT /api/locations/me
pub async fn update_mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<LocationUpdate>,
) -> ServiceResult<Json<Value>> {
    valid_point(req.latitude, req.longitude)?;
    if req.accuracy.is_some_and(|a| !a.is_finite() || a < 0.0) {
        return Err(AppError::with_message(ErrorCode::ValueOutOfRange, "Invalid accuracy").into());
    }

    let now = now_millis();
    let mut tx = state.pool.begin().await?;
    db::locations::deactivate(&mut *tx, user.id).await?;
    let location = db::locations::insert_active(
        &mut *tx,
        snowflake_id(),
        user.id,
        req.latitude,
        req.longitude,
        req.accuracy,
        now,
    )
    .await?;
    db::users::set_coordinates(&mut *tx, user.id, req.latitude, req.longitude, now).await?;
    tx.commit().await?;

    tracing::debug!(user_id = user.id, "Location updated");
    Ok(message_with("Location updated", "location", location)?)
}

/// GET /api/locations/me/history
pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    let locations = db::locations::history(&state.pool, user.id, HISTORY_LIMIT).await?;
    Ok(Json(json!({ "locations": locations })))
}

/// GET /api/locations/user/{id}
pub async fn active_for_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let location = db::locations::active_for(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::LocationNotFound))?;
    Ok(Json(json!({ "location": location })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyFarmer {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub profile_pic: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
}

/// Farmers within `radius_km` of `origin`, nearest first
pub fn farmers_within(farmers: Vec<User>, origin: GeoPoint, radius_km: f64) -> Vec<NearbyFarmer> {
    let mut nearby: Vec<NearbyFarmer> = farmers
        .into_iter()
        .filter_map(|f| {
            let (latitude, longitude) = (f.latitude?, f.longitude?);
            let distance = haversine_km(origin, GeoPoint::new(latitude, longitude));
            within_radius(distance, radius_km).then(|| NearbyFarmer {
                id: f.id,
                name: f.name,
                phone: f.phone,
                address: f.address,
                profile_pic: f.profile_pic,
                latitude,
                longitude,
                distance_km: distance,
            })
        })
        .collect();
    nearby.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
    });
    for farmer in &mut nearby {
        farmer.distance_km = round2(farmer.distance_km);
    }
    nearby
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
    pub radius_km: Option<f64>,
}

/// GET /api/locations/nearby-farmers
pub async fn nearby_farmers(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> ServiceResult<Json<Value>> {
    let origin = valid_point(query.lat, query.lon)?;
    let radius = query
        .radius_km
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(DEFAULT_NEARBY_RADIUS_KM);

    let farmers = db::users::located_farmers(&state.pool).await?;
    let nearby = farmers_within(farmers, origin, radius);
    Ok(Json(json!({
        "count": nearby.len(),
        "radiusKm": radius,
        "farmers": nearby,
    })))
}
