//! Authentication endpoints: register, login, profile

use axum::routing::get;
use axum::{Extension, Json, Router, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{GeoPoint, NotificationType, User, UserCreate, UserRole, UserUpdate};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::auth::user_auth::create_token;
use crate::db;
use crate::db::users::NewUser;
use crate::notify::{self, Notice};
use crate::state::AppState;
use crate::util::{hash_password, verify_password};

use super::{ApiResult, message_with};

const MIN_PASSWORD_LEN: usize = 6;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/auth/me", get(me).put(update_me))
}

fn issue_token(user: &User, secret: &str) -> Result<String, AppError> {
    create_token(user.id, user.role, secret).map_err(|e| {
        tracing::error!("JWT creation failed: {e}");
        AppError::new(ErrorCode::InternalError)
    })
}

/// Check a registration payload, returning the role to create
pub fn validate_registration(req: &UserCreate) -> Result<UserRole, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::required("name"));
    }
    if req.phone.trim().is_empty() {
        return Err(AppError::required("phone"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::new(ErrorCode::PasswordTooShort));
    }
    let role = req.role.unwrap_or(UserRole::Buyer);
    if role == UserRole::Admin {
        return Err(AppError::with_message(
            ErrorCode::InvalidRole,
            "Admin accounts cannot self-register",
        ));
    }
    if role == UserRole::Farmer
        && req.address.as_deref().is_none_or(|a| a.trim().is_empty())
    {
        return Err(AppError::new(ErrorCode::AddressRequired));
    }
    match (req.latitude, req.longitude) {
        (Some(lat), Some(lon)) if !GeoPoint::new(lat, lon).is_valid() => {
            Err(AppError::with_message(ErrorCode::ValueOutOfRange, "Invalid coordinates"))
        }
        (Some(_), None) | (None, Some(_)) => Err(AppError::validation(
            "latitude and longitude must be given together",
        )),
        _ => Ok(role),
    }
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<UserCreate>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let role = validate_registration(&req)?;
    let phone = req.phone.trim();

    if db::users::phone_exists(&state.pool, phone).await.map_err(|e| {
        tracing::error!("DB error during register: {e}");
        AppError::new(ErrorCode::InternalError)
    })? {
        return Err(AppError::new(ErrorCode::PhoneAlreadyRegistered));
    }

    let hashed = hash_password(&req.password).map_err(|e| {
        tracing::error!("Password hashing failed: {e}");
        AppError::new(ErrorCode::InternalError)
    })?;

    let now = now_millis();
    let approved = !role.needs_approval();
    let user = register_user(&state, &req, role, &hashed, approved, now).await?;

    tracing::info!(user_id = user.id, role = role.as_db(), "User registered");

    if !approved {
        return Ok((
            StatusCode::CREATED,
            Json(json!({
                "message": "Registration successful. Your farmer account is awaiting admin approval.",
                "user": user,
            })),
        ));
    }

    let token = issue_token(&user, &state.jwt_secret)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "token": token,
            "user": user,
        })),
    ))
}

async fn register_user(
    state: &AppState,
    req: &UserCreate,
    role: UserRole,
    hashed_password: &str,
    approved: bool,
    now: i64,
) -> Result<User, AppError> {
    let run = async {
        let mut tx = state.pool.begin().await?;
        let user = db::users::create(
            &mut *tx,
            &NewUser {
                id: snowflake_id(),
                name: req.name.trim(),
                phone: req.phone.trim(),
                hashed_password,
                role,
                address: req.address.as_deref().map(str::trim),
                profile_pic: req.profile_pic.as_deref(),
                approved,
                latitude: req.latitude,
                longitude: req.longitude,
            },
            now,
        )
        .await?;

        if role == UserRole::Farmer {
            for admin_id in db::users::admin_ids(&mut *tx).await? {
                let notice = Notice::new(
                    admin_id,
                    NotificationType::FarmerRequest,
                    "New farmer registration",
                    format!("{} ({}) is waiting for approval", user.name, user.phone),
                )
                .from_user(user.id)
                .with_data("farmerId", user.id);
                notify::enqueue(&mut *tx, &notice, now).await?;
            }
        }
        tx.commit().await?;
        Ok::<_, sqlx::Error>(user)
    };

    run.await.map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::new(ErrorCode::PhoneAlreadyRegistered)
        } else {
            tracing::error!("DB error during register: {e}");
            AppError::new(ErrorCode::InternalError)
        }
    })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Value> {
    let row = db::users::find_row_by_phone(&state.pool, req.phone.trim())
        .await
        .map_err(|e| {
            tracing::error!("DB error during login: {e}");
            AppError::new(ErrorCode::InternalError)
        })?
        .ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials))?;

    if !verify_password(&req.password, &row.hashed_password) {
        return Err(AppError::new(ErrorCode::InvalidCredentials));
    }

    let user = User::try_from(row).map_err(|e| {
        tracing::error!("Corrupt user row: {e}");
        AppError::new(ErrorCode::InternalError)
    })?;

    if user.role.needs_approval() && !user.approved {
        return Err(AppError::with_message(
            ErrorCode::AccountPendingApproval,
            "Farmer account is awaiting admin approval",
        ));
    }

    let token = issue_token(&user, &state.jwt_secret)?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": user,
    })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<User> {
    let profile = db::users::find_by_id(&state.pool, user.id)
        .await
        .map_err(|e| {
            tracing::error!("DB error loading profile: {e}");
            AppError::new(ErrorCode::InternalError)
        })?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    Ok(Json(profile))
}

/// PUT /api/auth/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UserUpdate>,
) -> ApiResult<Value> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("name cannot be empty"));
    }
    if user.role == UserRole::Farmer && req.address.as_deref().is_some_and(|a| a.trim().is_empty()) {
        return Err(AppError::new(ErrorCode::AddressRequired));
    }

    let updated = db::users::update_profile(&state.pool, user.id, &req, now_millis())
        .await
        .map_err(|e| {
            tracing::error!("DB error updating profile: {e}");
            AppError::new(ErrorCode::InternalError)
        })?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound))?;
    message_with("Profile updated", "user", updated)
}
