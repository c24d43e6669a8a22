//! Buyer ratings of farmers

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{RatingCreate, UserRole};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ServiceResult;
use crate::state::AppState;

const MAX_COMMENT_CHARS: usize = 500;
const SEARCH_LIMIT: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ratings", post(rate))
        .route("/api/ratings/user/{id}", get(for_user))
        .route("/api/ratings/mine/{target_id}", get(mine))
        .route("/api/ratings/farmers/search", get(search_farmers))
}

/// Scores run 0.5..=5 in half-point steps
pub fn validate_score(score: f64) -> Result<(), AppError> {
    let doubled = score * 2.0;
    if (0.5..=5.0).contains(&score) && (doubled - doubled.round()).abs() < 1e-9 {
        Ok(())
    } else {
        Err(AppError::with_message(
            ErrorCode::RatingInvalidScore,
            "Score must be between 0.5 and 5 in steps of 0.5",
        ))
    }
}

pub fn validate_comment(comment: Option<&str>) -> Result<Option<&str>, AppError> {
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    if comment.is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS) {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!("Comment must be at most {MAX_COMMENT_CHARS} characters"),
        ));
    }
    Ok(comment)
}

/// POST /api/ratings
pub async fn rate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<RatingCreate>,
) -> ServiceResult<Json<Value>> {
    user.require_role(&[UserRole::Buyer])?;
    if req.target_id == user.id {
        return Err(AppError::new(ErrorCode::CannotRateSelf).into());
    }
    validate_score(req.score)?;
    let comment = validate_comment(req.comment.as_deref())?;

    let target = db::users::find_by_id(&state.pool, req.target_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    if target.role != UserRole::Farmer {
        return Err(AppError::with_message(
            ErrorCode::RatingTargetInvalid,
            "Only farmers can be rated",
        )
        .into());
    }

    let mut tx = state.pool.begin().await?;
    let rating = db::ratings::upsert(
        &mut *tx,
        snowflake_id(),
        user.id,
        target.id,
        req.score,
        comment,
        now_millis(),
    )
    .await?;
    let summary = db::ratings::summary(&mut *tx, target.id).await?;
    tx.commit().await?;

    tracing::info!(rater_id = user.id, target_id = target.id, score = req.score, "Rating saved");
    Ok(Json(json!({
        "message": "Rating saved",
        "rating": rating,
        "average": summary.average,
        "count": summary.count,
    })))
}

/// GET /api/ratings/user/{id}
pub async fn for_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let ratings = db::ratings::list_for_target(&state.pool, id).await?;
    let summary = db::ratings::summary(&state.pool, id).await?;
    Ok(Json(json!({
        "ratings": ratings,
        "average": summary.average,
        "count": summary.count,
    })))
}

/// GET /api/ratings/mine/{target_id}
pub async fn mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(target_id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    let rating = db::ratings::find(&state.pool, user.id, target_id).await?;
    Ok(Json(json!({ "rating": rating })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// GET /api/ratings/farmers/search
pub async fn search_farmers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ServiceResult<Json<Value>> {
    let fragment = query.q.as_deref().map(str::trim).unwrap_or_default();
    let farmers = db::users::search_farmers(&state.pool, fragment, SEARCH_LIMIT).await?;
    let ids: Vec<i64> = farmers.iter().map(|f| f.id).collect();
    let summaries = db::ratings::summaries(&state.pool, &ids).await?;

    let results: Vec<Value> = farmers
        .into_iter()
        .map(|farmer| {
            let summary = summaries.get(&farmer.id).copied().unwrap_or_default();
            json!({
                "id": farmer.id,
                "name": farmer.name,
                "phone": farmer.phone,
                "address": farmer.address,
                "profilePic": farmer.profile_pic,
                "averageRating": summary.average,
                "ratingCount": summary.count,
            })
        })
        .collect();
    Ok(Json(json!({ "farmers": results })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_steps() {
        for ok in [0.5, 1.0, 2.5, 5.0] {
            assert!(validate_score(ok).is_ok(), "{ok}");
        }
        for bad in [0.0, 0.3, 4.75, 5.5, f64::NAN] {
            assert_eq!(
                validate_score(bad).unwrap_err().code,
                ErrorCode::RatingInvalidScore,
                "{bad}"
            );
        }
    }

    #[test]
    fn test_comment_trimmed_and_bounded() {
        assert_eq!(validate_comment(Some("  good  ")).unwrap(), Some("good"));
        assert_eq!(validate_comment(Some("   ")).unwrap(), None);
        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(validate_comment(Some(&long)).is_err());
    }
}
