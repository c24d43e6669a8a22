//! In-app notification inbox and push token registration

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::util::now_millis;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ServiceResult;
use crate::notify::expo::is_expo_push_token;
use crate::state::AppState;

use super::message_with;

const MAX_LIST: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/push-token", put(set_push_token))
        .route("/api/notifications/{id}/read", put(mark_read))
        .route("/api/notifications/{id}", delete(remove))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    pub limit: Option<i64>,
    pub is_read: Option<bool>,
}

/// GET /api/notifications
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<InboxQuery>,
) -> ServiceResult<Json<Value>> {
    let limit = query.limit.unwrap_or(MAX_LIST).clamp(1, MAX_LIST);
    let notifications = db::notifications::list(&state.pool, user.id, query.is_read, limit).await?;
    let unread = db::notifications::unread_count(&state.pool, user.id).await?;
    Ok(Json(json!({
        "notifications": notifications,
        "unreadCount": unread,
    })))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    let unread = db::notifications::unread_count(&state.pool, user.id).await?;
    Ok(Json(json!({ "unreadCount": unread })))
}

/// PUT /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let notification = db::notifications::mark_read(&state.pool, id, user.id, now_millis())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound))?;
    Ok(message_with("Notification marked as read", "notification", notification)?)
}

/// PUT /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    let updated = db::notifications::mark_all_read(&state.pool, user.id, now_millis()).await?;
    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated": updated,
    })))
}

/// DELETE /api/notifications/{id}
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    if !db::notifications::delete(&state.pool, id, user.id).await? {
        return Err(AppError::new(ErrorCode::NotificationNotFound).into());
    }
    Ok(Json(json!({ "message": "Notification deleted" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTokenRequest {
    /// `null` unregisters the device
    #[serde(alias = "expoPushToken")]
    pub token: Option<String>,
}

/// Normalise a push token payload; `None` clears the stored token
pub fn parse_push_token(req: &PushTokenRequest) -> Result<Option<&str>, AppError> {
    match req.token.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(token) if is_expo_push_token(token) => Ok(Some(token)),
        Some(_) => Err(AppError::new(ErrorCode::InvalidPushToken)),
    }
}

/// PUT /api/notifications/push-token
pub async fn set_push_token(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PushTokenRequest>,
) -> ServiceResult<Json<Value>> {
    let token = parse_push_token(&req)?;
    db::users::set_push_token(&state.pool, user.id, token, now_millis()).await?;
    tracing::info!(user_id = user.id, registered = token.is_some(), "Push token updated");
    let message = if token.is_some() {
        "Push token registered"
    } else {
        "Push token removed"
    };
    Ok(Json(json!({ "message": message })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(token: Option<&str>) -> PushTokenRequest {
        PushTokenRequest {
            token: token.map(String::from),
        }
    }

    #[test]
    fn test_push_token_parsing() {
        assert_eq!(
            parse_push_token(&req(Some(" ExponentPushToken[abc123] "))).unwrap(),
            Some("ExponentPushToken[abc123]")
        );
        assert_eq!(parse_push_token(&req(None)).unwrap(), None);
        assert_eq!(parse_push_token(&req(Some(""))).unwrap(), None);
        assert_eq!(
            parse_push_token(&req(Some("fcm:xyz"))).unwrap_err().code,
            ErrorCode::InvalidPushToken
        );
    }

    #[test]
    fn test_push_token_alias() {
        let r: PushTokenRequest =
            serde_json::from_str(r#"{"expoPushToken":"ExpoPushToken[x]"}"#).unwrap();
        assert_eq!(r.token.as_deref(), Some("ExpoPushToken[x]"));
    }
}
