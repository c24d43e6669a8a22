//! Marketplace domain models
//!
//! Shared between haat-cloud and its clients (via API).
//! Wire format is camelCase; status values are snake_case strings, stored
//! verbatim in the database (see each enum's `as_db` / `from_db`).
//! All IDs are `i64` snowflakes, all timestamps Unix milliseconds.

pub mod expense;
pub mod group_sale;
pub mod haat_event;
pub mod location;
pub mod negotiation;
pub mod notification;
pub mod order;
pub mod product;
pub mod rating;
pub mod user;

// Re-exports
pub use expense::*;
pub use group_sale::*;
pub use haat_event::*;
pub use location::*;
pub use negotiation::*;
pub use notification::*;
pub use order::*;
pub use product::*;
pub use rating::*;
pub use user::*;
