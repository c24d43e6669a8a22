//! User JWT authentication

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::UserRole;

use crate::db;
use crate::state::AppState;

/// JWT claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct UserClaims {
    /// User ID
    pub sub: String,
    pub role: UserRole,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated user, loaded fresh from the database on every request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Allow the call only for one of `roles`
    pub fn require_role(&self, roles: &[UserRole]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            return Ok(());
        }
        let allowed: Vec<&str> = roles.iter().map(|r| r.as_db()).collect();
        Err(AppError::with_message(
            ErrorCode::RoleRequired,
            format!("This action requires role: {}", allowed.join(" or ")),
        ))
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::AdminRequired))
        }
    }

    /// Owner of the resource, or an admin
    pub fn require_owner_or_admin(&self, owner_id: i64) -> Result<(), AppError> {
        if self.id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::NotOwner))
        }
    }
}

const JWT_EXPIRY_DAYS: i64 = 7;

/// Create a JWT token for a user
pub fn create_token(
    user_id: i64,
    role: UserRole,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = UserClaims {
        sub: user_id.to_string(),
        role,
        exp: (now + chrono::Duration::days(JWT_EXPIRY_DAYS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a token and return the user id it was issued for
pub fn verify_token(token: &str, secret: &str) -> Result<i64, AppError> {
    let token_data = jsonwebtoken::decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired),
            _ => AppError::new(ErrorCode::TokenInvalid),
        }
    })?;

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::new(ErrorCode::TokenInvalid))
}

/// Middleware that verifies the bearer token and inserts [`CurrentUser`]
pub async fn user_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    let user_id = verify_token(token, &state.jwt_secret).map_err(IntoResponse::into_response)?;

    let user = db::users::find_by_id(&state.pool, user_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error during auth: {e}");
            AppError::new(ErrorCode::InternalError).into_response()
        })?
        .ok_or_else(|| {
            AppError::with_message(ErrorCode::TokenInvalid, "User no longer exists").into_response()
        })?;

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        name: user.name,
        role: user.role,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let token = create_token(42, UserRole::Farmer, SECRET).unwrap();
        assert_eq!(verify_token(&token, SECRET).unwrap(), 42);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token(42, UserRole::Buyer, SECRET).unwrap();
        let err = verify_token(&token, "other-secret").unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = UserClaims {
            sub: "42".into(),
            role: UserRole::Buyer,
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let err = verify_token(&token, SECRET).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[test]
    fn test_token_expires_in_seven_days() {
        let token = create_token(1, UserRole::Admin, SECRET).unwrap();
        let data = jsonwebtoken::decode::<UserClaims>(
            &token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(
            data.claims.exp - data.claims.iat,
            (JWT_EXPIRY_DAYS * 24 * 3600) as usize
        );
        assert_eq!(data.claims.role, UserRole::Admin);
    }

    #[test]
    fn test_role_guards() {
        let farmer = CurrentUser {
            id: 1,
            name: "Sita".into(),
            role: UserRole::Farmer,
        };
        assert!(farmer.require_role(&[UserRole::Farmer]).is_ok());
        assert_eq!(
            farmer.require_role(&[UserRole::Buyer]).unwrap_err().code,
            ErrorCode::RoleRequired
        );
        assert_eq!(
            farmer.require_admin().unwrap_err().code,
            ErrorCode::AdminRequired
        );
        assert!(farmer.require_owner_or_admin(1).is_ok());
        assert_eq!(
            farmer.require_owner_or_admin(2).unwrap_err().code,
            ErrorCode::NotOwner
        );

        let admin = CurrentUser {
            id: 9,
            name: "Admin".into(),
            role: UserRole::Admin,
        };
        assert!(admin.require_owner_or_admin(1).is_ok());
    }
}
