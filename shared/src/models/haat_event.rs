//! Haat Event Model

use serde::{Deserialize, Serialize};

/// Default registration radius around an event
pub const DEFAULT_EVENT_RADIUS_KM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaatEventStatus {
    Upcoming,
    Active,
    Completed,
    Cancelled,
}

impl HaatEventStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Allowed admin transitions
    pub fn can_transition_to(&self, next: HaatEventStatus) -> bool {
        use HaatEventStatus::*;
        matches!(
            (self, next),
            (Upcoming, Active) | (Upcoming, Cancelled) | (Active, Completed) | (Active, Cancelled)
        )
    }

    /// Farmers may still register
    pub fn accepts_registrations(&self) -> bool {
        matches!(self, Self::Upcoming | Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    #[serde(default = "default_radius")]
    pub radius_km: f64,
}

fn default_radius() -> f64 {
    DEFAULT_EVENT_RADIUS_KM
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerRegistration {
    pub farmer_id: i64,
    pub registered_at: i64,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaatEvent {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub location: EventLocation,
    pub event_date: i64,
    pub registration_deadline: Option<i64>,
    pub created_by: i64,
    pub status: HaatEventStatus,
    pub farmer_registrations: Vec<FarmerRegistration>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaatEventCreate {
    pub name: String,
    pub description: Option<String>,
    pub location: EventLocation,
    pub event_date: i64,
    pub registration_deadline: Option<i64>,
}
