//! Negotiation Model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Active,
    Accepted,
    Rejected,
    Expired,
}

impl NegotiationStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Farmer's response to an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationAction {
    Counter,
    Accept,
    Reject,
}

/// One entry in the append-only offer ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub offered_by: i64,
    pub price: f64,
    pub quantity: f64,
    pub message: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiation {
    pub id: i64,
    pub product_id: i64,
    pub buyer_id: i64,
    pub farmer_id: i64,
    pub offers: Vec<Offer>,
    pub status: NegotiationStatus,
    pub final_price: Option<f64>,
    pub final_quantity: Option<f64>,
    pub accepted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create negotiation payload (`productId` or `product`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationCreate {
    #[serde(alias = "product")]
    pub product_id: i64,
    pub price: f64,
    pub quantity: f64,
    pub message: Option<String>,
}

/// Respond payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRespond {
    pub action: NegotiationAction,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_is_open() {
        assert!(!NegotiationStatus::Active.is_terminal());
        assert!(NegotiationStatus::Accepted.is_terminal());
        assert!(NegotiationStatus::Rejected.is_terminal());
        assert!(NegotiationStatus::Expired.is_terminal());
    }

    #[test]
    fn test_create_accepts_product_alias() {
        let req: NegotiationCreate =
            serde_json::from_str(r#"{"product": 5, "price": 80, "quantity": 10}"#).unwrap();
        assert_eq!(req.product_id, 5);

        let req: NegotiationCreate =
            serde_json::from_str(r#"{"productId": 6, "price": 80, "quantity": 10}"#).unwrap();
        assert_eq!(req.product_id, 6);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<NegotiationRespond, _> =
            serde_json::from_str(r#"{"action": "withdraw"}"#);
        assert!(result.is_err());
    }
}
