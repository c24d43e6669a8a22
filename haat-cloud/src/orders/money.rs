//! Order money arithmetic
//!
//! Totals are computed in `Decimal` and converted to `f64` for storage.

use rust_decimal::prelude::*;
use shared::models::{DeliveryOption, OrderItem};

const DECIMAL_PLACES: u32 = 2;

/// Flat charge added to request_delivery orders
pub const DELIVERY_SURCHARGE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert back to f64, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    round(value).to_f64().unwrap_or_default()
}

#[inline]
fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an f64 amount to 2 decimal places
pub fn round_money(value: f64) -> f64 {
    to_f64(to_decimal(value))
}

/// Sum of price x quantity over all items
pub fn items_subtotal(items: &[OrderItem]) -> Decimal {
    items
        .iter()
        .map(|item| to_decimal(item.price) * to_decimal(item.quantity))
        .sum()
}

/// Order total including the delivery surcharge
pub fn order_total(items: &[OrderItem], option: DeliveryOption) -> f64 {
    let mut total = items_subtotal(items);
    if option == DeliveryOption::RequestDelivery {
        total += DELIVERY_SURCHARGE;
    }
    to_f64(total)
}

/// Amount string with exactly two decimals, as signed for payment providers
pub fn format_amount(value: f64) -> String {
    let mut d = round(to_decimal(value));
    d.rescale(DECIMAL_PLACES);
    d.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: i64, price: f64, quantity: f64) -> OrderItem {
        OrderItem {
            product_id,
            name: format!("p{product_id}"),
            quantity,
            price,
        }
    }

    #[test]
    fn test_self_pickup_total() {
        let items = [item(1, 100.0, 2.0), item(2, 50.0, 1.0)];
        assert_eq!(order_total(&items, DeliveryOption::SelfPickup), 250.0);
    }

    #[test]
    fn test_delivery_adds_surcharge() {
        let items = [item(1, 100.0, 2.0), item(2, 50.0, 1.0)];
        assert_eq!(order_total(&items, DeliveryOption::RequestDelivery), 300.0);
    }

    #[test]
    fn test_fractional_quantities_avoid_float_drift() {
        // 0.1 * 3 in f64 is 0.30000000000000004
        let items = [item(1, 0.1, 3.0)];
        assert_eq!(order_total(&items, DeliveryOption::SelfPickup), 0.3);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(250.0), "250.00");
        assert_eq!(format_amount(99.999), "100.00");
        assert_eq!(format_amount(12.5), "12.50");
    }
}
