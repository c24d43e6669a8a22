//! Group Sale Model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSaleStatus {
    Open,
    Closed,
    Completed,
    Cancelled,
}

impl GroupSaleStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One buyer's commitment; a buyer appears at most once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub buyer_id: i64,
    pub quantity: f64,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSale {
    pub id: i64,
    pub product_id: i64,
    pub farmer_id: i64,
    pub haat_event_id: Option<i64>,
    pub required_quantity: f64,
    pub price_per_unit: f64,
    pub deadline: i64,
    pub participants: Vec<Participant>,
    pub total_quantity_sold: f64,
    pub status: GroupSaleStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSaleCreate {
    pub product_id: i64,
    pub required_quantity: f64,
    pub price_per_unit: f64,
    pub deadline: i64,
    pub haat_event_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSaleJoin {
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSaleStatusUpdate {
    pub status: GroupSaleStatus,
}
