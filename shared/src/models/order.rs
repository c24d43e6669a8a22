//! Order Model
//!
//! An order groups line items from one farmer. Three independent status
//! fields travel with it: fulfilment (`status`), delivery and payment.

use serde::{Deserialize, Serialize};

/// Fulfilment status
///
/// `accepted` is accepted on input and normalised to [`OrderStatus::Packing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    #[serde(alias = "accepted")]
    Packing,
    Shipped,
    Delivered,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "placed" => Some(Self::Placed),
            "packing" | "accepted" => Some(Self::Packing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Packing => "packing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// No further fulfilment transitions once here
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Rejected | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
    SelfPickup,
    RequestDelivery,
}

impl DeliveryOption {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "self_pickup" => Some(Self::SelfPickup),
            "request_delivery" => Some(Self::RequestDelivery),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::SelfPickup => "self_pickup",
            Self::RequestDelivery => "request_delivery",
        }
    }
}

/// Delivery sub-state; self-pickup orders start at `Completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Accepted,
    Rejected,
    InTransit,
    Completed,
}

impl DeliveryStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "in_transit" => Some(Self::InTransit),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Esewa,
}

impl PaymentMethod {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "cash_on_delivery" => Some(Self::CashOnDelivery),
            "esewa" => Some(Self::Esewa),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cash_on_delivery",
            Self::Esewa => "esewa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

/// Line item with price snapshot taken at order time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// Payment provider snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub transaction_uuid: Option<String>,
    /// Amount string exactly as signed (2 decimals)
    pub amount: Option<String>,
    pub product_code: Option<String>,
    /// Last status reported by the provider (INITIATED, COMPLETE, ...)
    pub provider_status: Option<String>,
    /// Provider-side reference id, set on completion
    pub ref_id: Option<String>,
    pub paid_at: Option<i64>,
    pub verified_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub buyer_id: i64,
    pub farmer_id: i64,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub delivery_option: DeliveryOption,
    pub delivery_location: Option<DeliveryLocation>,
    pub delivery_status: DeliveryStatus,
    pub delivery_responded_at: Option<i64>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_details: Option<PaymentDetails>,
    pub inventory_deducted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Requested line item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    #[serde(alias = "productId")]
    pub product: i64,
    pub quantity: f64,
}

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreate {
    pub farmer_id: i64,
    pub products: Vec<OrderItemInput>,
    pub delivery_location: Option<DeliveryLocation>,
    pub delivery_option: DeliveryOption,
    pub payment_method: PaymentMethod,
}
