//! Shared types for the haat marketplace
//!
//! Common types used by haat-cloud and its clients: the error system,
//! domain models with their status enums, and small utilities.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
