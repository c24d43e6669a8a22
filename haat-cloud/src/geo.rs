//! Distance and quantity helpers

use shared::models::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Radius check on an already computed distance; the boundary counts as inside
pub fn within_radius(distance_km: f64, radius_km: f64) -> bool {
    distance_km <= radius_km
}

/// Round to two decimals for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Quantity expressed in kilograms. Units that are not weights count as-is.
pub fn to_kg(quantity: f64, unit: &str) -> f64 {
    match unit.trim().to_ascii_lowercase().as_str() {
        "g" | "gm" | "gram" | "grams" => quantity / 1000.0,
        "quintal" | "quintals" => quantity * 100.0,
        "ton" | "tons" | "tonne" | "tonnes" => quantity * 1000.0,
        _ => quantity,
    }
}

/// Bulk-buy threshold check on the kg-normalised quantity
pub fn meets_bulk_threshold(quantity: f64, unit: &str, min_kg: f64, inclusive: bool) -> bool {
    let kg = to_kg(quantity, unit);
    if inclusive { kg >= min_kg } else { kg > min_kg }
}
