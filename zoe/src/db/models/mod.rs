//! Database record models matching table schemas.
//!
//! These structs are what repositories accept and return. They are kept separate from the API
//! models in [`crate::api::models`] so the storage and wire representations can evolve
//! independently; conversions between the two live next to the API models.
//!
//! Enumerations that are stored as text (group types, login statuses, notification priorities
//! and so on) are defined here and reused by the API layer.

pub mod devices;
pub mod groups;
pub mod login_logs;
pub mod notifications;
pub mod users;
