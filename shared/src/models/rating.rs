//! Rating Model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Rating {
    pub id: i64,
    pub rater_id: i64,
    pub target_id: i64,
    pub score: f64,
    pub comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Average score and count for one rated user
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingCreate {
    #[serde(alias = "ratedUserId")]
    pub target_id: i64,
    pub score: f64,
    pub comment: Option<String>,
}
