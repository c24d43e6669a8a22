//! Order state machine
//!
//! Pure functions over [`Order`]: they validate a request against the
//! transition table, mutate the in-memory order and return the side effects
//! the caller must apply inside the same database transaction.

use shared::error::{AppError, ErrorCode};
use shared::models::{
    DeliveryOption, DeliveryStatus, NotificationType, Order, OrderCreate, OrderItem, OrderStatus,
    PaymentStatus, Product, ProductStatus, UserRole,
};
use thiserror::Error;

use super::money;
use crate::notify::Notice;

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("Order must contain at least one product")]
    Empty,

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Delivery location is required for delivery orders")]
    DeliveryLocationRequired,

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Product {0} does not belong to the selected farmer")]
    FarmerMismatch(i64),

    #[error("Product {0} is not approved for sale")]
    ProductNotApproved(String),

    #[error("Insufficient quantity for {name}: requested {requested}, available {available}")]
    InsufficientQuantity {
        name: String,
        requested: f64,
        available: f64,
    },

    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Order cannot be cancelled once it is {0}")]
    NotCancellable(&'static str),

    #[error("Only the order's farmer or an admin can update its status")]
    NotFarmer,

    #[error("Only the order's buyer or an admin can do this")]
    NotBuyer,
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let code = match &err {
            OrderError::Empty => ErrorCode::OrderEmpty,
            OrderError::InvalidQuantity => ErrorCode::ValueOutOfRange,
            OrderError::DeliveryLocationRequired => ErrorCode::DeliveryLocationRequired,
            OrderError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            OrderError::FarmerMismatch(_) => ErrorCode::OrderFarmerMismatch,
            OrderError::ProductNotApproved(_) => ErrorCode::ProductNotApproved,
            OrderError::InsufficientQuantity { .. } => ErrorCode::InsufficientQuantity,
            OrderError::InvalidTransition { .. } => ErrorCode::OrderInvalidTransition,
            OrderError::NotCancellable(_) => ErrorCode::OrderNotCancellable,
            OrderError::NotFarmer | OrderError::NotBuyer => ErrorCode::PermissionDenied,
        };
        let app = AppError::with_message(code, err.to_string());
        match err {
            OrderError::InsufficientQuantity {
                requested,
                available,
                ..
            } => app
                .with_detail("requested", requested)
                .with_detail("available", available),
            _ => app,
        }
    }
}

/// How the caller relates to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderActor {
    Buyer,
    Farmer,
    Admin,
}

/// Caller identity as seen by the state machine
#[derive(Debug, Clone, Copy)]
pub struct OrderCaller {
    pub id: i64,
    pub actor: OrderActor,
}

impl OrderCaller {
    /// `None` when the user is neither party to the order nor an admin
    pub fn resolve(order: &Order, user_id: i64, role: UserRole) -> Option<Self> {
        let actor = if role == UserRole::Admin {
            OrderActor::Admin
        } else if order.farmer_id == user_id {
            OrderActor::Farmer
        } else if order.buyer_id == user_id {
            OrderActor::Buyer
        } else {
            return None;
        };
        Some(Self { id: user_id, actor })
    }
}

/// Work the service must do after a successful transition
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEffect {
    /// Decrement every line item's product stock
    DeductInventory,
    Notify(Notice),
}

/// Transition table for farmer/admin status updates
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Placed, Packing)
            | (Placed, Rejected)
            | (Placed, Cancelled)
            | (Packing, Shipped)
            | (Packing, Rejected)
            | (Packing, Cancelled)
            | (Shipped, Delivered)
    )
}

/// Validate a create request against current product data and build the order.
///
/// Stock is checked at read time only; it is not reserved.
pub fn build_order(
    id: i64,
    buyer_id: i64,
    req: &OrderCreate,
    products: &[Product],
    now: i64,
) -> Result<(Order, Vec<OrderEffect>), OrderError> {
    if req.products.is_empty() {
        return Err(OrderError::Empty);
    }
    if req
        .products
        .iter()
        .any(|line| !line.quantity.is_finite() || line.quantity <= 0.0)
    {
        return Err(OrderError::InvalidQuantity);
    }
    let delivery_location = match req.delivery_option {
        DeliveryOption::RequestDelivery => {
            let loc = req
                .delivery_location
                .clone()
                .ok_or(OrderError::DeliveryLocationRequired)?;
            let point = shared::models::GeoPoint::new(loc.latitude, loc.longitude);
            if !point.is_valid() {
                return Err(OrderError::DeliveryLocationRequired);
            }
            Some(loc)
        }
        DeliveryOption::SelfPickup => req.delivery_location.clone(),
    };

    // Merge repeated lines for the same product
    let mut requested: Vec<(i64, f64)> = Vec::with_capacity(req.products.len());
    for line in &req.products {
        match requested.iter_mut().find(|(id, _)| *id == line.product) {
            Some((_, qty)) => *qty += line.quantity,
            None => requested.push((line.product, line.quantity)),
        }
    }

    let mut items = Vec::with_capacity(requested.len());
    for (product_id, quantity) in requested {
        let product = products
            .iter()
            .find(|p| p.id == product_id)
            .ok_or(OrderError::ProductNotFound(product_id))?;
        if product.farmer_id != req.farmer_id {
            return Err(OrderError::FarmerMismatch(product_id));
        }
        if product.status != ProductStatus::Approved {
            return Err(OrderError::ProductNotApproved(product.name.clone()));
        }
        if product.quantity < quantity {
            return Err(OrderError::InsufficientQuantity {
                name: product.name.clone(),
                requested: quantity,
                available: product.quantity,
            });
        }
        items.push(OrderItem {
            product_id,
            name: product.name.clone(),
            quantity,
            price: product.price,
        });
    }

    let total_amount = money::order_total(&items, req.delivery_option);
    let delivery_status = match req.delivery_option {
        DeliveryOption::RequestDelivery => DeliveryStatus::Pending,
        DeliveryOption::SelfPickup => DeliveryStatus::Completed,
    };

    let order = Order {
        id,
        buyer_id,
        farmer_id: req.farmer_id,
        items,
        total_amount,
        status: OrderStatus::Placed,
        delivery_option: req.delivery_option,
        delivery_location,
        delivery_status,
        delivery_responded_at: None,
        payment_method: req.payment_method,
        payment_status: PaymentStatus::Pending,
        payment_details: None,
        inventory_deducted: false,
        created_at: now,
        updated_at: now,
    };

    let farmer_notice = match order.delivery_option {
        DeliveryOption::RequestDelivery => Notice::new(
            order.farmer_id,
            NotificationType::DeliveryRequest,
            "New delivery request",
            format!(
                "A buyer placed an order of Rs. {:.2} and requested delivery",
                order.total_amount
            ),
        ),
        DeliveryOption::SelfPickup => Notice::new(
            order.farmer_id,
            NotificationType::OrderPlaced,
            "New order received",
            format!(
                "A buyer placed an order of Rs. {:.2} for self pickup",
                order.total_amount
            ),
        ),
    };
    let buyer_notice = Notice::new(
        buyer_id,
        NotificationType::OrderStatus,
        "Order placed",
        "Your order has been placed and is waiting for the farmer",
    );

    let effects = vec![
        OrderEffect::Notify(farmer_notice.from_user(buyer_id).about_order(id)),
        OrderEffect::Notify(buyer_notice.about_order(id)),
    ];
    Ok((order, effects))
}

/// Farmer/admin status update
///
/// Setting the current status again is a no-op with no effects.
pub fn apply_status(
    order: &mut Order,
    to: OrderStatus,
    caller: OrderCaller,
    now: i64,
) -> Result<Vec<OrderEffect>, OrderError> {
    if caller.actor == OrderActor::Buyer {
        return Err(OrderError::NotFarmer);
    }
    if order.status == to {
        return Ok(Vec::new());
    }
    if !can_transition(order.status, to) {
        return Err(OrderError::InvalidTransition {
            from: order.status.as_db(),
            to: to.as_db(),
        });
    }

    order.status = to;
    order.updated_at = now;

    let is_delivery = order.delivery_option == DeliveryOption::RequestDelivery;
    let buyer = order.buyer_id;
    let order_id = order.id;
    let mut effects = Vec::new();
    let mut notify = |kind, title: &str, message: String| {
        effects.push(OrderEffect::Notify(
            Notice::new(buyer, kind, title, message)
                .from_user(caller.id)
                .about_order(order_id),
        ));
    };

    match to {
        OrderStatus::Packing => {
            if is_delivery {
                order.delivery_status = DeliveryStatus::Accepted;
                order.delivery_responded_at = Some(now);
                notify(
                    NotificationType::DeliveryAccepted,
                    "Delivery accepted",
                    "The farmer accepted your delivery request".into(),
                );
            }
            notify(
                NotificationType::OrderStatus,
                "Order packing",
                "The farmer is packing your order".into(),
            );
        }
        OrderStatus::Rejected => {
            if is_delivery {
                order.delivery_status = DeliveryStatus::Rejected;
                order.delivery_responded_at = Some(now);
                notify(
                    NotificationType::DeliveryRejected,
                    "Delivery rejected",
                    "The farmer rejected your delivery request".into(),
                );
            } else {
                notify(
                    NotificationType::OrderStatus,
                    "Order rejected",
                    "The farmer rejected your order".into(),
                );
            }
        }
        OrderStatus::Shipped => {
            if is_delivery {
                order.delivery_status = DeliveryStatus::InTransit;
                notify(
                    NotificationType::OrderStatus,
                    "Out for delivery",
                    "Your order is on its way".into(),
                );
            } else {
                notify(
                    NotificationType::OrderStatus,
                    "Ready for pickup",
                    "Your order is ready for pickup".into(),
                );
            }
        }
        OrderStatus::Delivered => {
            order.delivery_status = DeliveryStatus::Completed;
            notify(
                NotificationType::OrderStatus,
                "Order delivered",
                "Your order has been delivered".into(),
            );
            if !order.inventory_deducted {
                order.inventory_deducted = true;
                effects.insert(0, OrderEffect::DeductInventory);
            }
        }
        OrderStatus::Cancelled => notify(
            NotificationType::OrderStatus,
            "Order cancelled",
            "The farmer cancelled your order".into(),
        ),
        OrderStatus::Placed => {}
    }

    Ok(effects)
}

/// Buyer/admin cancellation
pub fn apply_cancel(
    order: &mut Order,
    caller: OrderCaller,
    now: i64,
) -> Result<Vec<OrderEffect>, OrderError> {
    if caller.actor == OrderActor::Farmer {
        return Err(OrderError::NotBuyer);
    }
    match order.status {
        OrderStatus::Placed | OrderStatus::Packing => {}
        other => return Err(OrderError::NotCancellable(other.as_db())),
    }

    order.status = OrderStatus::Cancelled;
    order.updated_at = now;

    Ok(vec![OrderEffect::Notify(
        Notice::new(
            order.farmer_id,
            NotificationType::OrderStatus,
            "Order cancelled",
            "The buyer cancelled an order",
        )
        .from_user(caller.id)
        .about_order(order.id),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DeliveryLocation, Freshness, OrderItemInput, PaymentMethod};

    const BUYER: i64 = 10;
    const FARMER: i64 = 20;

    fn product(id: i64, price: f64, quantity: f64) -> Product {
        Product {
            id,
            farmer_id: FARMER,
            name: format!("product-{id}"),
            description: None,
            category: "vegetables".into(),
            price,
            quantity,
            unit: "kg".into(),
            freshness: Freshness::Fresh,
            image_url: None,
            status: ProductStatus::Approved,
            haat_event_id: None,
            photo_taken_at: None,
            image_validated: false,
            approved_at: Some(1),
            created_at: 1,
            updated_at: 1,
        }
    }

    fn request(option: DeliveryOption, lines: &[(i64, f64)]) -> OrderCreate {
        OrderCreate {
            farmer_id: FARMER,
            products: lines
                .iter()
                .map(|&(product, quantity)| OrderItemInput { product, quantity })
                .collect(),
            delivery_location: Some(DeliveryLocation {
                latitude: 27.7,
                longitude: 85.3,
                address: Some("Baneshwor".into()),
            }),
            delivery_option: option,
            payment_method: PaymentMethod::CashOnDelivery,
        }
    }

    fn catalog() -> Vec<Product> {
        vec![product(1, 100.0, 10.0), product(2, 50.0, 5.0)]
    }

    fn placed(option: DeliveryOption) -> Order {
        let req = request(option, &[(1, 2.0), (2, 1.0)]);
        build_order(99, BUYER, &req, &catalog(), 1_000).unwrap().0
    }

    fn farmer() -> OrderCaller {
        OrderCaller {
            id: FARMER,
            actor: OrderActor::Farmer,
        }
    }

    fn buyer() -> OrderCaller {
        OrderCaller {
            id: BUYER,
            actor: OrderActor::Buyer,
        }
    }

    fn notices(effects: &[OrderEffect]) -> Vec<&Notice> {
        effects
            .iter()
            .filter_map(|e| match e {
                OrderEffect::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_build_self_pickup_order() {
        let req = request(DeliveryOption::SelfPickup, &[(1, 2.0), (2, 1.0)]);
        let (order, effects) = build_order(99, BUYER, &req, &catalog(), 1_000).unwrap();
        assert_eq!(order.total_amount, 250.0);
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.delivery_status, DeliveryStatus::Completed);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(!order.inventory_deducted);
        assert_eq!(order.items[0].name, "product-1");

        let sent = notices(&effects);
        assert_eq!(sent[0].recipient_id, FARMER);
        assert_eq!(sent[0].kind, NotificationType::OrderPlaced);
        assert_eq!(sent[1].recipient_id, BUYER);
    }

    #[test]
    fn test_build_delivery_order() {
        let req = request(DeliveryOption::RequestDelivery, &[(1, 2.0), (2, 1.0)]);
        let (order, effects) = build_order(99, BUYER, &req, &catalog(), 1_000).unwrap();
        assert_eq!(order.total_amount, 300.0);
        assert_eq!(order.delivery_status, DeliveryStatus::Pending);
        assert_eq!(notices(&effects)[0].kind, NotificationType::DeliveryRequest);
    }

    #[test]
    fn test_build_rejects_bad_requests() {
        let empty = request(DeliveryOption::SelfPickup, &[]);
        assert_eq!(
            build_order(1, BUYER, &empty, &catalog(), 0).unwrap_err(),
            OrderError::Empty
        );

        let zero = request(DeliveryOption::SelfPickup, &[(1, 0.0)]);
        assert_eq!(
            build_order(1, BUYER, &zero, &catalog(), 0).unwrap_err(),
            OrderError::InvalidQuantity
        );

        let mut no_loc = request(DeliveryOption::RequestDelivery, &[(1, 1.0)]);
        no_loc.delivery_location = None;
        assert_eq!(
            build_order(1, BUYER, &no_loc, &catalog(), 0).unwrap_err(),
            OrderError::DeliveryLocationRequired
        );

        let missing = request(DeliveryOption::SelfPickup, &[(7, 1.0)]);
        assert_eq!(
            build_order(1, BUYER, &missing, &catalog(), 0).unwrap_err(),
            OrderError::ProductNotFound(7)
        );
    }

    #[test]
    fn test_build_checks_ownership_approval_and_stock() {
        let mut other = product(3, 10.0, 10.0);
        other.farmer_id = 77;
        let mut pending = product(4, 10.0, 10.0);
        pending.status = ProductStatus::Pending;
        let products = vec![product(1, 100.0, 10.0), other, pending];

        let req = request(DeliveryOption::SelfPickup, &[(3, 1.0)]);
        assert_eq!(
            build_order(1, BUYER, &req, &products, 0).unwrap_err(),
            OrderError::FarmerMismatch(3)
        );

        let req = request(DeliveryOption::SelfPickup, &[(4, 1.0)]);
        assert!(matches!(
            build_order(1, BUYER, &req, &products, 0).unwrap_err(),
            OrderError::ProductNotApproved(_)
        ));

        // Repeated lines are merged before the stock check: 6 + 6 > 10
        let req = request(DeliveryOption::SelfPickup, &[(1, 6.0), (1, 6.0)]);
        let err = build_order(1, BUYER, &req, &products, 0).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientQuantity { requested, available, .. }
                if requested == 12.0 && available == 10.0
        ));
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(can_transition(Placed, Packing));
        assert!(can_transition(Packing, Shipped));
        assert!(can_transition(Shipped, Delivered));
        assert!(!can_transition(Placed, Delivered));
        assert!(!can_transition(Shipped, Cancelled));
        assert!(!can_transition(Delivered, Placed));
        assert!(!can_transition(Rejected, Packing));
        assert!(!can_transition(Cancelled, Packing));
    }

    #[test]
    fn test_inventory_deducted_once_on_first_delivery() {
        let mut order = placed(DeliveryOption::SelfPickup);
        assert!(apply_status(&mut order, OrderStatus::Packing, farmer(), 2).unwrap()
            .iter()
            .all(|e| *e != OrderEffect::DeductInventory));
        apply_status(&mut order, OrderStatus::Shipped, farmer(), 3).unwrap();

        let effects = apply_status(&mut order, OrderStatus::Delivered, farmer(), 4).unwrap();
        assert_eq!(effects[0], OrderEffect::DeductInventory);
        assert!(order.inventory_deducted);
        assert_eq!(order.delivery_status, DeliveryStatus::Completed);

        // Repeating "delivered" does nothing
        let effects = apply_status(&mut order, OrderStatus::Delivered, farmer(), 5).unwrap();
        assert!(effects.is_empty());
        assert_eq!(order.updated_at, 4);
    }

    #[test]
    fn test_delivery_order_side_effects() {
        let mut order = placed(DeliveryOption::RequestDelivery);
        let effects = apply_status(&mut order, OrderStatus::Packing, farmer(), 2).unwrap();
        assert_eq!(order.delivery_status, DeliveryStatus::Accepted);
        assert_eq!(order.delivery_responded_at, Some(2));
        let kinds: Vec<_> = notices(&effects).iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NotificationType::DeliveryAccepted, NotificationType::OrderStatus]
        );

        apply_status(&mut order, OrderStatus::Shipped, farmer(), 3).unwrap();
        assert_eq!(order.delivery_status, DeliveryStatus::InTransit);
    }

    #[test]
    fn test_reject_delivery_request() {
        let mut order = placed(DeliveryOption::RequestDelivery);
        let effects = apply_status(&mut order, OrderStatus::Rejected, farmer(), 2).unwrap();
        assert_eq!(order.delivery_status, DeliveryStatus::Rejected);
        assert_eq!(notices(&effects)[0].kind, NotificationType::DeliveryRejected);
    }

    #[test]
    fn test_invalid_transition_leaves_order_untouched() {
        let mut order = placed(DeliveryOption::SelfPickup);
        let err = apply_status(&mut order, OrderStatus::Delivered, farmer(), 2).unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: "placed",
                to: "delivered"
            }
        );
        assert_eq!(order.status, OrderStatus::Placed);
        assert!(!order.inventory_deducted);
    }

    #[test]
    fn test_buyer_cannot_update_status() {
        let mut order = placed(DeliveryOption::SelfPickup);
        assert_eq!(
            apply_status(&mut order, OrderStatus::Packing, buyer(), 2).unwrap_err(),
            OrderError::NotFarmer
        );
    }

    #[test]
    fn test_cancel_rules() {
        let mut order = placed(DeliveryOption::SelfPickup);
        assert_eq!(
            apply_cancel(&mut order, farmer(), 2).unwrap_err(),
            OrderError::NotBuyer
        );

        let effects = apply_cancel(&mut order, buyer(), 2).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(notices(&effects)[0].recipient_id, FARMER);

        // Already cancelled
        assert!(matches!(
            apply_cancel(&mut order, buyer(), 3).unwrap_err(),
            OrderError::NotCancellable("cancelled")
        ));
    }

    #[test]
    fn test_cannot_cancel_after_shipping() {
        let mut order = placed(DeliveryOption::SelfPickup);
        apply_status(&mut order, OrderStatus::Packing, farmer(), 2).unwrap();
        apply_status(&mut order, OrderStatus::Shipped, farmer(), 3).unwrap();
        assert_eq!(
            apply_cancel(&mut order, buyer(), 4).unwrap_err(),
            OrderError::NotCancellable("shipped")
        );

        apply_status(&mut order, OrderStatus::Delivered, farmer(), 5).unwrap();
        assert_eq!(
            apply_cancel(&mut order, buyer(), 6).unwrap_err(),
            OrderError::NotCancellable("delivered")
        );
    }

    #[test]
    fn test_caller_resolution() {
        let order = placed(DeliveryOption::SelfPickup);
        assert_eq!(
            OrderCaller::resolve(&order, BUYER, UserRole::Buyer).map(|c| c.actor),
            Some(OrderActor::Buyer)
        );
        assert_eq!(
            OrderCaller::resolve(&order, FARMER, UserRole::Farmer).map(|c| c.actor),
            Some(OrderActor::Farmer)
        );
        assert_eq!(
            OrderCaller::resolve(&order, 1, UserRole::Admin).map(|c| c.actor),
            Some(OrderActor::Admin)
        );
        assert!(OrderCaller::resolve(&order, 55, UserRole::Buyer).is_none());
    }

    #[test]
    fn test_error_codes() {
        let app: AppError = OrderError::NotCancellable("shipped").into();
        assert_eq!(app.code, ErrorCode::OrderNotCancellable);
        assert_eq!(app.http_status(), http::StatusCode::BAD_REQUEST);

        let app: AppError = OrderError::InsufficientQuantity {
            name: "Tomato".into(),
            requested: 5.0,
            available: 2.0,
        }
        .into();
        assert_eq!(app.code, ErrorCode::InsufficientQuantity);
        assert!(app.details.is_some());
    }
}
