//! Product Model

use serde::{Deserialize, Serialize};

/// Moderation status of a product listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProductStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    #[default]
    Fresh,
    Good,
    Average,
}

impl Freshness {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(Self::Fresh),
            "good" => Some(Self::Good),
            "average" => Some(Self::Average),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Good => "good",
            Self::Average => "average",
        }
    }
}

/// Product listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub farmer_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub quantity: f64,
    pub unit: String,
    pub freshness: Freshness,
    pub image_url: Option<String>,
    pub status: ProductStatus,
    pub haat_event_id: Option<i64>,
    /// When the listing photo was taken (from client-side EXIF)
    pub photo_taken_at: Option<i64>,
    /// Photo taken within 24h of listing
    pub image_validated: bool,
    pub approved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreate {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub quantity: f64,
    pub unit: Option<String>,
    pub freshness: Option<Freshness>,
    pub image_url: Option<String>,
    pub haat_event_id: Option<i64>,
    pub photo_taken_at: Option<i64>,
}

/// Update product payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub freshness: Option<Freshness>,
    pub image_url: Option<String>,
    pub haat_event_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_round_trip() {
        for s in [
            ProductStatus::Pending,
            ProductStatus::Approved,
            ProductStatus::Rejected,
        ] {
            assert_eq!(ProductStatus::from_db(s.as_db()), Some(s));
        }
        assert_eq!(Freshness::from_db("stale"), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ProductStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
    }
}
