//! Price negotiation between a buyer and a product's farmer
//!
//! A negotiation carries an append-only list of offers. It stays `active`
//! until the farmer accepts or rejects, or until no offer has been made for
//! the configured TTL, at which point it is treated as `expired`.

pub mod service;

use shared::error::{AppError, ErrorCode};
use shared::models::{
    Negotiation, NegotiationAction, NegotiationRespond, NegotiationStatus, NotificationType,
    Offer, Product,
};
use thiserror::Error;

use crate::notify::Notice;

#[derive(Debug, Error, PartialEq)]
pub enum NegotiationError {
    #[error("Price must be greater than zero")]
    InvalidPrice,

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("You cannot negotiate on your own product")]
    OwnProduct,

    #[error("Negotiation is already {0}")]
    Closed(&'static str),

    #[error("Only the product's farmer or an admin can respond")]
    NotFarmer,
}

impl From<NegotiationError> for AppError {
    fn from(err: NegotiationError) -> Self {
        let code = match err {
            NegotiationError::InvalidPrice | NegotiationError::InvalidQuantity => {
                ErrorCode::ValueOutOfRange
            }
            NegotiationError::OwnProduct => ErrorCode::CannotNegotiateOwnProduct,
            NegotiationError::Closed(_) => ErrorCode::NegotiationClosed,
            NegotiationError::NotFarmer => ErrorCode::PermissionDenied,
        };
        AppError::with_message(code, err.to_string())
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

pub fn validate_offer(price: f64, quantity: f64) -> Result<(), NegotiationError> {
    positive(Some(price)).ok_or(NegotiationError::InvalidPrice)?;
    positive(Some(quantity)).ok_or(NegotiationError::InvalidQuantity)?;
    Ok(())
}

/// Start a negotiation seeded with the buyer's first offer
pub fn open(
    id: i64,
    product: &Product,
    buyer_id: i64,
    price: f64,
    quantity: f64,
    message: Option<String>,
    now: i64,
) -> Result<Negotiation, NegotiationError> {
    if product.farmer_id == buyer_id {
        return Err(NegotiationError::OwnProduct);
    }
    validate_offer(price, quantity)?;
    Ok(Negotiation {
        id,
        product_id: product.id,
        buyer_id,
        farmer_id: product.farmer_id,
        offers: vec![Offer {
            offered_by: buyer_id,
            price,
            quantity,
            message,
            created_at: now,
        }],
        status: NegotiationStatus::Active,
        final_price: None,
        final_quantity: None,
        accepted_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Append an offer from the buyer to an active negotiation
pub fn add_buyer_offer(
    n: &mut Negotiation,
    price: f64,
    quantity: f64,
    message: Option<String>,
    now: i64,
) -> Result<(), NegotiationError> {
    ensure_active(n)?;
    validate_offer(price, quantity)?;
    n.offers.push(Offer {
        offered_by: n.buyer_id,
        price,
        quantity,
        message,
        created_at: now,
    });
    n.updated_at = now;
    Ok(())
}

fn ensure_active(n: &Negotiation) -> Result<(), NegotiationError> {
    if n.status.is_terminal() {
        return Err(NegotiationError::Closed(n.status.as_db()));
    }
    Ok(())
}

/// Time of the most recent offer
pub fn last_activity(n: &Negotiation) -> i64 {
    n.offers.last().map_or(n.created_at, |o| o.created_at)
}

/// Mark a stale active negotiation as expired. Returns true if it changed.
pub fn expire_if_stale(n: &mut Negotiation, now: i64, ttl_ms: i64) -> bool {
    if n.status == NegotiationStatus::Active && now - last_activity(n) >= ttl_ms {
        n.status = NegotiationStatus::Expired;
        n.updated_at = now;
        return true;
    }
    false
}

/// Cutoff for `updated_at` at or below which an active negotiation has lapsed.
/// Active rows are only touched by new offers, so `updated_at` is their last activity.
pub fn stale_before(now: i64, ttl_ms: i64) -> i64 {
    now - ttl_ms
}

/// Negotiation as seen by readers: a lapsed active one reads as expired
pub fn present(mut n: Negotiation, now: i64, ttl_ms: i64) -> Negotiation {
    expire_if_stale(&mut n, now, ttl_ms);
    n
}

/// Split the caller's locked active negotiation into (still live, just expired)
pub fn split_stale(
    existing: Option<Negotiation>,
    now: i64,
    ttl_ms: i64,
) -> (Option<Negotiation>, Option<Negotiation>) {
    match existing {
        Some(mut n) => {
            if expire_if_stale(&mut n, now, ttl_ms) {
                (None, Some(n))
            } else {
                (Some(n), None)
            }
        }
        None => (None, None),
    }
}

/// Farmer (or admin) response. Returns the notice for the buyer.
pub fn respond(
    n: &mut Negotiation,
    caller_id: i64,
    caller_is_admin: bool,
    req: &NegotiationRespond,
    now: i64,
) -> Result<Notice, NegotiationError> {
    if caller_id != n.farmer_id && !caller_is_admin {
        return Err(NegotiationError::NotFarmer);
    }
    ensure_active(n)?;

    let notice = match req.action {
        NegotiationAction::Counter => {
            let price = positive(req.price).ok_or(NegotiationError::InvalidPrice)?;
            let quantity = positive(req.quantity).ok_or(NegotiationError::InvalidQuantity)?;
            n.offers.push(Offer {
                offered_by: caller_id,
                price,
                quantity,
                message: req.message.clone(),
                created_at: now,
            });
            Notice::new(
                n.buyer_id,
                NotificationType::Negotiation,
                "Counter offer",
                format!("The farmer countered with Rs. {price:.2} for {quantity}"),
            )
        }
        NegotiationAction::Accept => {
            let last = n.offers.last();
            let price = match req.price {
                Some(_) => positive(req.price).ok_or(NegotiationError::InvalidPrice)?,
                None => last.map(|o| o.price).ok_or(NegotiationError::InvalidPrice)?,
            };
            let quantity = match req.quantity {
                Some(_) => positive(req.quantity).ok_or(NegotiationError::InvalidQuantity)?,
                None => last.map(|o| o.quantity).ok_or(NegotiationError::InvalidQuantity)?,
            };
            n.status = NegotiationStatus::Accepted;
            n.final_price = Some(price);
            n.final_quantity = Some(quantity);
            n.accepted_at = Some(now);
            Notice::new(
                n.buyer_id,
                NotificationType::NegotiationAccepted,
                "Offer accepted",
                format!("Your offer was accepted at Rs. {price:.2} for {quantity}"),
            )
        }
        NegotiationAction::Reject => {
            n.status = NegotiationStatus::Rejected;
            Notice::new(
                n.buyer_id,
                NotificationType::Negotiation,
                "Offer rejected",
                "The farmer rejected your offer",
            )
        }
    };
    n.updated_at = now;

    Ok(notice
        .from_user(caller_id)
        .with_data("negotiationId", n.id)
        .with_data("productId", n.product_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Freshness, ProductStatus};

    const BUYER: i64 = 1;
    const FARMER: i64 = 2;
    const HOUR: i64 = 3_600_000;

    fn product() -> Product {
        Product {
            id: 50,
            farmer_id: FARMER,
            name: "Potato".into(),
            description: None,
            category: "vegetables".into(),
            price: 60.0,
            quantity: 100.0,
            unit: "kg".into(),
            freshness: Freshness::Fresh,
            image_url: None,
            status: ProductStatus::Approved,
            haat_event_id: None,
            photo_taken_at: None,
            image_validated: false,
            approved_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn active() -> Negotiation {
        open(9, &product(), BUYER, 50.0, 20.0, Some("bulk".into()), 1_000).unwrap()
    }

    fn reply(action: NegotiationAction, price: Option<f64>, quantity: Option<f64>) -> NegotiationRespond {
        NegotiationRespond {
            action,
            price,
            quantity,
            message: None,
        }
    }

    #[test]
    fn test_open_seeds_first_offer() {
        let n = active();
        assert_eq!(n.status, NegotiationStatus::Active);
        assert_eq!(n.farmer_id, FARMER);
        assert_eq!(n.offers.len(), 1);
        assert_eq!(n.offers[0].offered_by, BUYER);
    }

    #[test]
    fn test_open_rejects_own_product_and_bad_values() {
        assert_eq!(
            open(1, &product(), FARMER, 50.0, 1.0, None, 0).unwrap_err(),
            NegotiationError::OwnProduct
        );
        assert_eq!(
            open(1, &product(), BUYER, 0.0, 1.0, None, 0).unwrap_err(),
            NegotiationError::InvalidPrice
        );
        assert_eq!(
            open(1, &product(), BUYER, 10.0, -1.0, None, 0).unwrap_err(),
            NegotiationError::InvalidQuantity
        );
    }

    #[test]
    fn test_counter_appends_farmer_offer() {
        let mut n = active();
        let notice = respond(
            &mut n,
            FARMER,
            false,
            &reply(NegotiationAction::Counter, Some(55.0), Some(20.0)),
            2_000,
        )
        .unwrap();
        assert_eq!(n.offers.len(), 2);
        assert_eq!(n.offers[1].offered_by, FARMER);
        assert_eq!(n.status, NegotiationStatus::Active);
        assert_eq!(notice.recipient_id, BUYER);

        add_buyer_offer(&mut n, 52.0, 20.0, None, 3_000).unwrap();
        assert_eq!(n.offers.len(), 3);
    }

    #[test]
    fn test_counter_requires_price_and_quantity() {
        let mut n = active();
        assert_eq!(
            respond(&mut n, FARMER, false, &reply(NegotiationAction::Counter, None, Some(1.0)), 2)
                .unwrap_err(),
            NegotiationError::InvalidPrice
        );
        assert_eq!(n.offers.len(), 1);
    }

    #[test]
    fn test_accept_uses_last_offer_by_default() {
        let mut n = active();
        let notice =
            respond(&mut n, FARMER, false, &reply(NegotiationAction::Accept, None, None), 5_000)
                .unwrap();
        assert_eq!(n.status, NegotiationStatus::Accepted);
        assert_eq!(n.final_price, Some(50.0));
        assert_eq!(n.final_quantity, Some(20.0));
        assert_eq!(n.accepted_at, Some(5_000));
        assert_eq!(notice.kind, NotificationType::NegotiationAccepted);
    }

    #[test]
    fn test_accept_with_explicit_terms() {
        let mut n = active();
        respond(
            &mut n,
            FARMER,
            false,
            &reply(NegotiationAction::Accept, Some(48.0), Some(25.0)),
            5_000,
        )
        .unwrap();
        assert_eq!(n.final_price, Some(48.0));
        assert_eq!(n.final_quantity, Some(25.0));
    }

    #[test]
    fn test_terminal_negotiation_rejects_further_responses() {
        let mut n = active();
        respond(&mut n, FARMER, false, &reply(NegotiationAction::Accept, None, None), 5_000).unwrap();

        let err = respond(
            &mut n,
            FARMER,
            false,
            &reply(NegotiationAction::Accept, Some(1.0), Some(1.0)),
            6_000,
        )
        .unwrap_err();
        assert_eq!(err, NegotiationError::Closed("accepted"));
        // Final terms are set exactly once
        assert_eq!(n.final_price, Some(50.0));
        assert_eq!(n.accepted_at, Some(5_000));

        assert_eq!(
            add_buyer_offer(&mut n, 40.0, 1.0, None, 7_000).unwrap_err(),
            NegotiationError::Closed("accepted")
        );
        assert_eq!(n.offers.len(), 1);
    }

    #[test]
    fn test_only_farmer_or_admin_may_respond() {
        let mut n = active();
        assert_eq!(
            respond(&mut n, BUYER, false, &reply(NegotiationAction::Reject, None, None), 2)
                .unwrap_err(),
            NegotiationError::NotFarmer
        );
        respond(&mut n, 99, true, &reply(NegotiationAction::Reject, None, None), 2).unwrap();
        assert_eq!(n.status, NegotiationStatus::Rejected);
    }

    #[test]
    fn test_lazy_expiry() {
        let mut n = active();
        assert!(!expire_if_stale(&mut n, 1_000 + 71 * HOUR, 72 * HOUR));
        assert_eq!(n.status, NegotiationStatus::Active);

        assert!(expire_if_stale(&mut n, 1_000 + 72 * HOUR, 72 * HOUR));
        assert_eq!(n.status, NegotiationStatus::Expired);
        assert_eq!(
            respond(&mut n, FARMER, false, &reply(NegotiationAction::Accept, None, None), 0)
                .unwrap_err(),
            NegotiationError::Closed("expired")
        );
    }

    #[test]
    fn test_new_offer_resets_expiry_clock() {
        let mut n = active();
        add_buyer_offer(&mut n, 51.0, 20.0, None, 1_000 + 70 * HOUR).unwrap();
        assert!(!expire_if_stale(&mut n, 1_000 + 100 * HOUR, 72 * HOUR));
    }

    #[test]
    fn test_split_stale_keeps_live_negotiation() {
        let (live, expired) = split_stale(Some(active()), 1_000 + HOUR, 72 * HOUR);
        let live = live.unwrap();
        assert_eq!(live.status, NegotiationStatus::Active);
        assert!(expired.is_none());
    }

    #[test]
    fn test_split_stale_expires_lapsed_negotiation() {
        let (live, expired) = split_stale(Some(active()), 1_000 + 72 * HOUR, 72 * HOUR);
        assert!(live.is_none());
        let expired = expired.unwrap();
        assert_eq!(expired.status, NegotiationStatus::Expired);
        assert_eq!(expired.updated_at, 1_000 + 72 * HOUR);

        assert!(matches!(split_stale(None, 0, 72 * HOUR), (None, None)));
    }

    #[test]
    fn test_readers_see_lapsed_negotiation_as_expired() {
        let now = 1_000 + 80 * HOUR;
        let n = present(active(), now, 72 * HOUR);
        assert_eq!(n.status, NegotiationStatus::Expired);

        // the SQL cutoff agrees with the in-memory check
        assert!(active().updated_at <= stale_before(now, 72 * HOUR));
        assert!(active().updated_at > stale_before(1_000 + 71 * HOUR, 72 * HOUR));

        let mut accepted = active();
        respond(&mut accepted, FARMER, false, &reply(NegotiationAction::Accept, None, None), 2_000)
            .unwrap();
        assert_eq!(present(accepted, now, 72 * HOUR).status, NegotiationStatus::Accepted);
    }
}
