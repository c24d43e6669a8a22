//! Group sales: buyers pool commitments until a farmer's bulk quantity is met

pub mod service;

use rust_decimal::prelude::*;
use shared::error::{AppError, ErrorCode};
use shared::models::{GroupSale, GroupSaleCreate, GroupSaleStatus, Participant};
use thiserror::Error;

use crate::orders::money::to_decimal;

#[derive(Debug, Error, PartialEq)]
pub enum GroupSaleError {
    #[error("Required quantity must be greater than zero")]
    InvalidRequiredQuantity,

    #[error("Price per unit must be greater than zero")]
    InvalidPrice,

    #[error("Deadline must be in the future")]
    DeadlineInPast,

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Group sale is {0}")]
    NotOpen(&'static str),

    #[error("Group sale deadline has passed")]
    DeadlinePassed,

    #[error("You have already joined this group sale")]
    AlreadyJoined,

    #[error("Adding {requested} units would exceed required quantity. Available: {available}")]
    CapacityExceeded { requested: f64, available: f64 },

    #[error("Cannot change group sale status from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl From<GroupSaleError> for AppError {
    fn from(err: GroupSaleError) -> Self {
        let code = match err {
            GroupSaleError::InvalidRequiredQuantity
            | GroupSaleError::InvalidPrice
            | GroupSaleError::InvalidQuantity => ErrorCode::ValueOutOfRange,
            GroupSaleError::DeadlineInPast => ErrorCode::ValidationFailed,
            GroupSaleError::NotOpen(_) => ErrorCode::GroupSaleNotOpen,
            GroupSaleError::DeadlinePassed => ErrorCode::GroupSaleDeadlinePassed,
            GroupSaleError::AlreadyJoined => ErrorCode::GroupSaleAlreadyJoined,
            GroupSaleError::CapacityExceeded { .. } => ErrorCode::GroupSaleCapacityExceeded,
            GroupSaleError::InvalidTransition { .. } => ErrorCode::GroupSaleInvalidTransition,
        };
        let app = AppError::with_message(code, err.to_string());
        match err {
            GroupSaleError::CapacityExceeded { requested, available } => app
                .with_detail("requested", requested)
                .with_detail("available", available),
            _ => app,
        }
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Quantities are compared and summed as decimals
fn remaining_decimal(sale: &GroupSale) -> Decimal {
    (to_decimal(sale.required_quantity) - to_decimal(sale.total_quantity_sold)).max(Decimal::ZERO)
}

fn to_quantity(value: Decimal) -> f64 {
    value.normalize().to_f64().unwrap_or_default()
}

/// Quantity still open to new participants
pub fn remaining(sale: &GroupSale) -> f64 {
    to_quantity(remaining_decimal(sale))
}

/// Build a new open sale from a create request
pub fn new_sale(
    id: i64,
    farmer_id: i64,
    req: &GroupSaleCreate,
    now: i64,
) -> Result<GroupSale, GroupSaleError> {
    if !positive(req.required_quantity) {
        return Err(GroupSaleError::InvalidRequiredQuantity);
    }
    if !positive(req.price_per_unit) {
        return Err(GroupSaleError::InvalidPrice);
    }
    if req.deadline <= now {
        return Err(GroupSaleError::DeadlineInPast);
    }
    Ok(GroupSale {
        id,
        product_id: req.product_id,
        farmer_id,
        haat_event_id: req.haat_event_id,
        required_quantity: req.required_quantity,
        price_per_unit: req.price_per_unit,
        deadline: req.deadline,
        participants: Vec::new(),
        total_quantity_sold: 0.0,
        status: GroupSaleStatus::Open,
        created_at: now,
        updated_at: now,
    })
}

/// Add a buyer's commitment. On error the sale is left untouched.
pub fn join(
    sale: &mut GroupSale,
    buyer_id: i64,
    quantity: f64,
    now: i64,
) -> Result<(), GroupSaleError> {
    if !positive(quantity) {
        return Err(GroupSaleError::InvalidQuantity);
    }
    if sale.status != GroupSaleStatus::Open {
        return Err(GroupSaleError::NotOpen(sale.status.as_db()));
    }
    if sale.deadline <= now {
        return Err(GroupSaleError::DeadlinePassed);
    }
    if sale.participants.iter().any(|p| p.buyer_id == buyer_id) {
        return Err(GroupSaleError::AlreadyJoined);
    }
    let available = remaining_decimal(sale);
    if to_decimal(quantity) > available {
        return Err(GroupSaleError::CapacityExceeded {
            requested: quantity,
            available: to_quantity(available),
        });
    }

    sale.participants.push(Participant {
        buyer_id,
        quantity,
        joined_at: now,
    });
    let total: Decimal = sale.participants.iter().map(|p| to_decimal(p.quantity)).sum();
    let required = to_decimal(sale.required_quantity);
    // stored total never exceeds required
    sale.total_quantity_sold = to_quantity(total.min(required));
    if total >= required {
        sale.status = GroupSaleStatus::Closed;
    }
    sale.updated_at = now;
    Ok(())
}

pub fn can_transition(sale: &GroupSale, to: GroupSaleStatus) -> bool {
    use GroupSaleStatus::*;
    match (sale.status, to) {
        (Open, Closed | Completed | Cancelled) => true,
        (Closed, Open) => remaining_decimal(sale) > Decimal::ZERO,
        (Closed, Completed | Cancelled) => true,
        _ => false,
    }
}

pub fn set_status(
    sale: &mut GroupSale,
    to: GroupSaleStatus,
    now: i64,
) -> Result<(), GroupSaleError> {
    if !can_transition(sale, to) {
        return Err(GroupSaleError::InvalidTransition {
            from: sale.status.as_db(),
            to: to.as_db(),
        });
    }
    sale.status = to;
    sale.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn create_req(required: f64) -> GroupSaleCreate {
        GroupSaleCreate {
            product_id: 11,
            required_quantity: required,
            price_per_unit: 80.0,
            deadline: NOW + 24 * HOUR,
            haat_event_id: None,
        }
    }

    fn sale(required: f64) -> GroupSale {
        new_sale(1, 7, &create_req(required), NOW).unwrap()
    }

    fn assert_consistent(sale: &GroupSale) {
        let sum: Decimal = sale.participants.iter().map(|p| to_decimal(p.quantity)).sum();
        assert_eq!(to_quantity(sum), sale.total_quantity_sold);
        assert!(
            sale.total_quantity_sold <= sale.required_quantity,
            "total {} exceeds required {}",
            sale.total_quantity_sold,
            sale.required_quantity
        );
    }

    #[test]
    fn test_fill_to_capacity_closes_sale() {
        let mut s = sale(100.0);

        join(&mut s, 101, 60.0, NOW).unwrap();
        assert_eq!(s.status, GroupSaleStatus::Open);
        assert_consistent(&s);

        let err = join(&mut s, 102, 50.0, NOW).unwrap_err();
        assert_eq!(
            err,
            GroupSaleError::CapacityExceeded {
                requested: 50.0,
                available: 40.0
            }
        );
        assert_eq!(
            err.to_string(),
            "Adding 50 units would exceed required quantity. Available: 40"
        );
        assert_eq!(s.participants.len(), 1);
        assert_eq!(s.total_quantity_sold, 60.0);

        join(&mut s, 102, 40.0, NOW).unwrap();
        assert_eq!(s.total_quantity_sold, 100.0);
        assert_eq!(s.status, GroupSaleStatus::Closed);
        assert_consistent(&s);
    }

    #[test]
    fn test_fractional_joins_fill_exactly() {
        let mut s = sale(0.3);

        join(&mut s, 101, 0.1, NOW).unwrap();
        assert_eq!(s.status, GroupSaleStatus::Open);
        assert_eq!(remaining(&s), 0.2);

        join(&mut s, 102, 0.2, NOW).unwrap();
        assert_eq!(s.total_quantity_sold, 0.3);
        assert_eq!(s.status, GroupSaleStatus::Closed);
        assert_eq!(remaining(&s), 0.0);
        assert_consistent(&s);
    }

    #[test]
    fn test_fractional_overshoot_is_rejected() {
        let mut s = sale(0.3);
        join(&mut s, 101, 0.1, NOW).unwrap();

        let err = join(&mut s, 102, 0.2000001, NOW).unwrap_err();
        assert_eq!(
            err,
            GroupSaleError::CapacityExceeded {
                requested: 0.2000001,
                available: 0.2
            }
        );
        assert_eq!(s.participants.len(), 1);
        assert_eq!(s.status, GroupSaleStatus::Open);
        assert_consistent(&s);
    }

    #[test]
    fn test_join_rejections() {
        let mut s = sale(100.0);
        assert_eq!(join(&mut s, 101, 0.0, NOW), Err(GroupSaleError::InvalidQuantity));
        assert_eq!(join(&mut s, 101, f64::NAN, NOW), Err(GroupSaleError::InvalidQuantity));

        join(&mut s, 101, 10.0, NOW).unwrap();
        assert_eq!(join(&mut s, 101, 5.0, NOW), Err(GroupSaleError::AlreadyJoined));

        assert_eq!(
            join(&mut s, 102, 5.0, NOW + 24 * HOUR),
            Err(GroupSaleError::DeadlinePassed)
        );

        s.status = GroupSaleStatus::Cancelled;
        assert_eq!(join(&mut s, 103, 5.0, NOW), Err(GroupSaleError::NotOpen("cancelled")));
        assert_eq!(s.participants.len(), 1);
    }

    #[test]
    fn test_create_validation() {
        assert_eq!(
            new_sale(1, 7, &create_req(0.0), NOW).unwrap_err(),
            GroupSaleError::InvalidRequiredQuantity
        );
        let mut req = create_req(10.0);
        req.price_per_unit = -1.0;
        assert_eq!(new_sale(1, 7, &req, NOW).unwrap_err(), GroupSaleError::InvalidPrice);
        let mut req = create_req(10.0);
        req.deadline = NOW;
        assert_eq!(new_sale(1, 7, &req, NOW).unwrap_err(), GroupSaleError::DeadlineInPast);
    }

    #[test]
    fn test_status_transitions() {
        use GroupSaleStatus::*;

        let mut s = sale(100.0);
        join(&mut s, 101, 30.0, NOW).unwrap();
        set_status(&mut s, Closed, NOW).unwrap();
        // capacity remains, so it may reopen
        set_status(&mut s, Open, NOW).unwrap();

        let mut full = sale(50.0);
        join(&mut full, 101, 50.0, NOW).unwrap();
        assert_eq!(full.status, Closed);
        assert!(matches!(
            set_status(&mut full, Open, NOW),
            Err(GroupSaleError::InvalidTransition { .. })
        ));
        set_status(&mut full, Completed, NOW).unwrap();
        assert!(!can_transition(&full, Cancelled));
        assert!(!can_transition(&full, Open));

        let mut open = sale(10.0);
        assert!(!can_transition(&open, Open));
        set_status(&mut open, Cancelled, NOW).unwrap();
        assert!(!can_transition(&open, Open));
    }

    #[test]
    fn test_capacity_error_carries_details() {
        let app: AppError = GroupSaleError::CapacityExceeded {
            requested: 50.0,
            available: 40.0,
        }
        .into();
        assert_eq!(app.code, ErrorCode::GroupSaleCapacityExceeded);
        let details = app.details.unwrap();
        assert_eq!(details["available"], 40.0);
    }
}
