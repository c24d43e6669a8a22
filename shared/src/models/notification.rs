//! Notification Model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    FarmerRequest,
    NewEvent,
    EventStarted,
    EventEnded,
    Negotiation,
    NegotiationAccepted,
    OrderPlaced,
    DeliveryRequest,
    DeliveryAccepted,
    DeliveryRejected,
    OrderStatus,
    EventUpcoming,
    EventStartingSoon,
    GroupSaleInvite,
    PaymentReceived,
    ProductStatus,
}

impl NotificationType {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "farmer_request" => Some(Self::FarmerRequest),
            "new_event" => Some(Self::NewEvent),
            "event_started" => Some(Self::EventStarted),
            "event_ended" => Some(Self::EventEnded),
            "negotiation" => Some(Self::Negotiation),
            "negotiation_accepted" => Some(Self::NegotiationAccepted),
            "order_placed" => Some(Self::OrderPlaced),
            "delivery_request" => Some(Self::DeliveryRequest),
            "delivery_accepted" => Some(Self::DeliveryAccepted),
            "delivery_rejected" => Some(Self::DeliveryRejected),
            "order_status" => Some(Self::OrderStatus),
            "event_upcoming" => Some(Self::EventUpcoming),
            "event_starting_soon" => Some(Self::EventStartingSoon),
            "group_sale_invite" => Some(Self::GroupSaleInvite),
            "payment_received" => Some(Self::PaymentReceived),
            "product_status" => Some(Self::ProductStatus),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::FarmerRequest => "farmer_request",
            Self::NewEvent => "new_event",
            Self::EventStarted => "event_started",
            Self::EventEnded => "event_ended",
            Self::Negotiation => "negotiation",
            Self::NegotiationAccepted => "negotiation_accepted",
            Self::OrderPlaced => "order_placed",
            Self::DeliveryRequest => "delivery_request",
            Self::DeliveryAccepted => "delivery_accepted",
            Self::DeliveryRejected => "delivery_rejected",
            Self::OrderStatus => "order_status",
            Self::EventUpcoming => "event_upcoming",
            Self::EventStartingSoon => "event_starting_soon",
            Self::GroupSaleInvite => "group_sale_invite",
            Self::PaymentReceived => "payment_received",
            Self::ProductStatus => "product_status",
        }
    }

    /// Types that are also pushed to the recipient's device
    pub fn is_push_eligible(&self) -> bool {
        matches!(
            self,
            Self::DeliveryRequest | Self::OrderPlaced | Self::NewEvent
        )
    }
}

/// Outbox state of the device push for one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    /// In-app only
    None,
    Pending,
    Sent,
    /// Recipient has no usable push token
    Skipped,
    Failed,
}

impl PushStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub push_status: PushStatus,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_eligible_types() {
        assert!(NotificationType::DeliveryRequest.is_push_eligible());
        assert!(NotificationType::OrderPlaced.is_push_eligible());
        assert!(NotificationType::NewEvent.is_push_eligible());
        assert!(!NotificationType::OrderStatus.is_push_eligible());
        assert!(!NotificationType::PaymentReceived.is_push_eligible());
    }

    #[test]
    fn test_type_db_round_trip() {
        let kinds = [
            NotificationType::FarmerRequest,
            NotificationType::NegotiationAccepted,
            NotificationType::EventStartingSoon,
            NotificationType::GroupSaleInvite,
            NotificationType::ProductStatus,
        ];
        for kind in kinds {
            assert_eq!(NotificationType::from_db(kind.as_db()), Some(kind));
        }
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let n = Notification {
            id: 1,
            recipient_id: 2,
            sender_id: None,
            kind: NotificationType::OrderPlaced,
            title: "New order".into(),
            message: "You have a new order".into(),
            related_data: serde_json::json!({"orderId": 9}),
            is_read: false,
            read_at: None,
            push_status: PushStatus::Pending,
            created_at: 0,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "order_placed");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["relatedData"]["orderId"], 9);
    }
}
