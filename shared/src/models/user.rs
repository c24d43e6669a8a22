//! User Model

use serde::{Deserialize, Serialize};

/// Marketplace role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Buyer,
    Farmer,
    Admin,
}

impl UserRole {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(Self::Buyer),
            "farmer" => Some(Self::Farmer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Farmer => "farmer",
            Self::Admin => "admin",
        }
    }

    /// Farmers need admin approval before they can log in
    pub fn needs_approval(&self) -> bool {
        matches!(self, Self::Farmer)
    }
}

/// Public user profile (never carries the password hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
    pub address: Option<String>,
    pub profile_pic: Option<String>,
    pub approved: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: i64,
}

/// Registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreate {
    pub name: String,
    pub phone: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub address: Option<String>,
    pub profile_pic: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Profile update payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub profile_pic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_db_round_trip() {
        for role in [UserRole::Buyer, UserRole::Farmer, UserRole::Admin] {
            assert_eq!(UserRole::from_db(role.as_db()), Some(role));
        }
        assert_eq!(UserRole::from_db("superuser"), None);
    }

    #[test]
    fn test_only_farmers_need_approval() {
        assert!(UserRole::Farmer.needs_approval());
        assert!(!UserRole::Buyer.needs_approval());
        assert!(!UserRole::Admin.needs_approval());
    }

    #[test]
    fn test_user_create_accepts_camel_case() {
        let json = r#"{"name":"Ram","phone":"9800000000","password":"secret1","role":"farmer","profilePic":"p.jpg"}"#;
        let req: UserCreate = serde_json::from_str(json).unwrap();
        assert_eq!(req.role, Some(UserRole::Farmer));
        assert_eq!(req.profile_pic.as_deref(), Some("p.jpg"));
    }
}
