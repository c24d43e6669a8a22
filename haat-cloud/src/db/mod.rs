//! Database access layer
//!
//! Rows keep enum columns as `String` and are converted into the shared
//! models on read. An unknown stored value fails the row decode.

pub mod expenses;
pub mod group_sales;
pub mod haat_events;
pub mod locations;
pub mod negotiations;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod ratings;
pub mod reports;
pub mod users;

/// Parse a text column through an enum's `from_db`.
pub(crate) fn decode_enum<T>(
    column: &str,
    value: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    parse(value).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unknown value '{value}'").into(),
    })
}

/// True when `err` is a Postgres unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
