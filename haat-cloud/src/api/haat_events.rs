//! Haat (market day) events: admin management and farmer registration

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    FarmerRegistration, GeoPoint, HaatEvent, HaatEventCreate, HaatEventStatus, NotificationType,
    UserRole,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ServiceResult;
use crate::geo::{haversine_km, round2, within_radius};
use crate::notify::{self, Notice};
use crate::state::AppState;

use super::message_with;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/haat-events", post(create).get(list))
        .route("/api/haat-events/{id}", get(get_one).delete(delete))
        .route("/api/haat-events/{id}/register", post(register))
        .route("/api/haat-events/{id}/status", put(update_status))
}

pub fn validate_create(req: &HaatEventCreate, now: i64) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::required("name"));
    }
    let loc = &req.location;
    if !GeoPoint::new(loc.latitude, loc.longitude).is_valid() {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "Invalid event coordinates",
        ));
    }
    if !(loc.radius_km.is_finite() && loc.radius_km > 0.0) {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "radiusKm must be positive",
        ));
    }
    if req.event_date <= now {
        return Err(AppError::validation("eventDate must be in the future"));
    }
    if req.registration_deadline.is_some_and(|d| d > req.event_date) {
        return Err(AppError::validation(
            "registrationDeadline must not be after eventDate",
        ));
    }
    Ok(())
}

/// Check a farmer at `farmer_at` may join `event` and build the registration
pub fn check_registration(
    event: &HaatEvent,
    farmer_id: i64,
    farmer_at: GeoPoint,
    now: i64,
) -> Result<FarmerRegistration, AppError> {
    if !event.status.accepts_registrations() {
        return Err(AppError::with_message(
            ErrorCode::HaatEventRegistrationClosed,
            format!("Event is {}", event.status.as_db()),
        ));
    }
    if event.registration_deadline.is_some_and(|d| now > d) {
        return Err(AppError::with_message(
            ErrorCode::HaatEventRegistrationClosed,
            "Registration deadline has passed",
        ));
    }
    if event
        .farmer_registrations
        .iter()
        .any(|r| r.farmer_id == farmer_id)
    {
        return Err(AppError::new(ErrorCode::HaatEventAlreadyRegistered));
    }

    let venue = GeoPoint::new(event.location.latitude, event.location.longitude);
    let distance = haversine_km(farmer_at, venue);
    if !within_radius(distance, event.location.radius_km) {
        return Err(AppError::with_message(
            ErrorCode::HaatEventOutOfRange,
            format!(
                "Farmer is {} km away. Must be within {} km",
                round2(distance),
                event.location.radius_km
            ),
        )
        .with_detail("distanceKm", round2(distance))
        .with_detail("radiusKm", event.location.radius_km));
    }

    Ok(FarmerRegistration {
        farmer_id,
        registered_at: now,
        distance_km: round2(distance),
    })
}

/// Notification kind sent to registered farmers for a status change, if any
pub fn status_notice_kind(from: HaatEventStatus, to: HaatEventStatus) -> Option<NotificationType> {
    match (from, to) {
        (HaatEventStatus::Upcoming, HaatEventStatus::Active) => Some(NotificationType::EventStarted),
        (HaatEventStatus::Active, HaatEventStatus::Completed) => Some(NotificationType::EventEnded),
        _ => None,
    }
}

/// POST /api/haat-events
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<HaatEventCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    user.require_admin()?;
    let now = now_millis();
    validate_create(&req, now)?;

    let event = HaatEvent {
        id: snowflake_id(),
        name: req.name.trim().to_string(),
        description: req.description.clone(),
        location: req.location.clone(),
        event_date: req.event_date,
        registration_deadline: req.registration_deadline,
        created_by: user.id,
        status: HaatEventStatus::Upcoming,
        farmer_registrations: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.pool.begin().await?;
    db::haat_events::insert(&mut *tx, &event).await?;
    let notices: Vec<Notice> = db::users::approved_farmer_ids(&mut *tx)
        .await?
        .into_iter()
        .map(|farmer_id| {
            Notice::new(
                farmer_id,
                NotificationType::NewEvent,
                "New haat event",
                format!("{} has been scheduled. Register to sell there.", event.name),
            )
            .from_user(user.id)
            .with_data("eventId", event.id)
        })
        .collect();
    notify::enqueue_all(&mut tx, &notices, now).await?;
    tx.commit().await?;

    tracing::info!(event_id = event.id, notified = notices.len(), "Haat event created");
    Ok((StatusCode::CREATED, message_with("Haat event created", "event", event)?))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub status: Option<HaatEventStatus>,
}

/// GET /api/haat-events
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ServiceResult<Json<Value>> {
    let events = db::haat_events::list(&state.pool, query.status).await?;
    Ok(Json(json!({ "count": events.len(), "events": events })))
}

/// GET /api/haat-events/{id}
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let event = db::haat_events::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::HaatEventNotFound))?;
    Ok(Json(json!({ "event": event })))
}

/// DELETE /api/haat-events/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;
    if !db::haat_events::delete(&state.pool, id).await? {
        return Err(AppError::new(ErrorCode::HaatEventNotFound).into());
    }
    tracing::info!(event_id = id, "Haat event deleted");
    Ok(Json(json!({ "message": "Haat event deleted" })))
}

/// POST /api/haat-events/{id}/register
pub async fn register(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    user.require_role(&[UserRole::Farmer])?;
    let farmer = db::users::find_by_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    let farmer_at = match (farmer.latitude, farmer.longitude) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => {
            return Err(AppError::with_message(
                ErrorCode::LocationRequired,
                "Set your location before registering for an event",
            )
            .into());
        }
    };

    let now = now_millis();
    let mut tx = state.pool.begin().await?;
    let mut event = db::haat_events::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::HaatEventNotFound))?;

    let registration = check_registration(&event, user.id, farmer_at, now)?;
    let distance_km = registration.distance_km;
    event.farmer_registrations.push(registration);
    event.updated_at = now;
    db::haat_events::save_registrations(&mut *tx, &event).await?;
    tx.commit().await?;

    tracing::info!(event_id = id, farmer_id = user.id, distance_km, "Farmer registered for event");
    Ok(message_with("Registered for haat event", "event", event)?)
}

#[derive(Deserialize)]
pub struct EventStatusUpdate {
    pub status: HaatEventStatus,
}

/// PUT /api/haat-events/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<EventStatusUpdate>,
) -> ServiceResult<Json<Value>> {
    user.require_admin()?;

    let now = now_millis();
    let mut tx = state.pool.begin().await?;
    let mut event = db::haat_events::lock_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::HaatEventNotFound))?;

    let from = event.status;
    if !from.can_transition_to(req.status) {
        return Err(AppError::with_message(
            ErrorCode::HaatEventInvalidTransition,
            format!("Cannot move event from {} to {}", from.as_db(), req.status.as_db()),
        )
        .into());
    }
    db::haat_events::set_status(&mut *tx, id, req.status, now).await?;
    event.status = req.status;
    event.updated_at = now;

    if let Some(kind) = status_notice_kind(from, req.status) {
        let (title, message) = match kind {
            NotificationType::EventStarted => ("Haat event started", format!("{} is now open", event.name)),
            _ => ("Haat event ended", format!("{} has ended", event.name)),
        };
        let notices: Vec<Notice> = event
            .farmer_registrations
            .iter()
            .map(|r| {
                Notice::new(r.farmer_id, kind, title, message.clone())
                    .from_user(user.id)
                    .with_data("eventId", event.id)
            })
            .collect();
        notify::enqueue_all(&mut tx, &notices, now).await?;
    }
    tx.commit().await?;

    tracing::info!(
        event_id = id,
        from = from.as_db(),
        to = req.status.as_db(),
        "Haat event status updated"
    );
    Ok(message_with(
        &format!("Event status updated to {}", req.status.as_db()),
        "event",
        event,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::EventLocation;

    const DAY_MS: i64 = 86_400_000;

    fn event(status: HaatEventStatus) -> HaatEvent {
        HaatEvent {
            id: 1,
            name: "Bhaktapur Saturday Haat".into(),
            description: None,
            location: EventLocation {
                latitude: 27.6710,
                longitude: 85.4298,
                address: Some("Durbar Square".into()),
                radius_km: 5.0,
            },
            event_date: 10 * DAY_MS,
            registration_deadline: Some(9 * DAY_MS),
            created_by: 99,
            status,
            farmer_registrations: vec![],
            created_at: 0,
            updated_at: 0,
        }
    }

    const NEARBY_FARM: GeoPoint = GeoPoint {
        latitude: 27.6800,
        longitude: 85.4300,
    };
    const KATHMANDU: GeoPoint = GeoPoint {
        latitude: 27.7172,
        longitude: 85.3240,
    };

    #[test]
    fn test_registration_within_radius() {
        let reg = check_registration(&event(HaatEventStatus::Upcoming), 7, NEARBY_FARM, DAY_MS)
            .unwrap();
        assert_eq!(reg.farmer_id, 7);
        assert!(reg.distance_km < 5.0);
    }

    #[test]
    fn test_registration_out_of_range_message() {
        let err = check_registration(&event(HaatEventStatus::Upcoming), 7, KATHMANDU, DAY_MS)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HaatEventOutOfRange);
        assert!(err.message.starts_with("Farmer is "));
        assert!(err.message.ends_with("km away. Must be within 5 km"));
    }

    #[test]
    fn test_registration_closed_states() {
        let closed = check_registration(&event(HaatEventStatus::Completed), 7, NEARBY_FARM, DAY_MS)
            .unwrap_err();
        assert_eq!(closed.code, ErrorCode::HaatEventRegistrationClosed);

        let late = check_registration(
            &event(HaatEventStatus::Active),
            7,
            NEARBY_FARM,
            9 * DAY_MS + 1,
        )
        .unwrap_err();
        assert_eq!(late.code, ErrorCode::HaatEventRegistrationClosed);
    }

    #[test]
    fn test_duplicate_registration_is_conflict() {
        let mut e = event(HaatEventStatus::Upcoming);
        e.farmer_registrations.push(FarmerRegistration {
            farmer_id: 7,
            registered_at: 0,
            distance_km: 1.0,
        });
        let err = check_registration(&e, 7, NEARBY_FARM, DAY_MS).unwrap_err();
        assert_eq!(err.code, ErrorCode::HaatEventAlreadyRegistered);
        assert_eq!(err.http_status(), http::StatusCode::CONFLICT);
    }

    #[test]
    fn test_status_notices() {
        use HaatEventStatus::*;
        assert_eq!(
            status_notice_kind(Upcoming, Active),
            Some(NotificationType::EventStarted)
        );
        assert_eq!(
            status_notice_kind(Active, Completed),
            Some(NotificationType::EventEnded)
        );
        assert_eq!(status_notice_kind(Upcoming, Cancelled), None);
    }

    #[test]
    fn test_create_validation() {
        let mut req = HaatEventCreate {
            name: "Haat".into(),
            description: None,
            location: event(HaatEventStatus::Upcoming).location,
            event_date: 10 * DAY_MS,
            registration_deadline: Some(11 * DAY_MS),
        };
        assert!(validate_create(&req, DAY_MS).is_err());
        req.registration_deadline = None;
        assert!(validate_create(&req, DAY_MS).is_ok());
        req.location.latitude = 95.0;
        assert_eq!(
            validate_create(&req, DAY_MS).unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );
    }
}
