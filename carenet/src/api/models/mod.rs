//! API request/response models.
//!
//! These are the wire types for the JSON API. Database-facing types live in
//! `crate::db::models`; conversions between the two live next to the type
//! they produce.

pub mod agencies;
pub mod analytics;
pub mod auth;
pub mod care_logs;
pub mod disputes;
pub mod escrow;
pub mod feedback;
pub mod jobs;
pub mod pagination;
pub mod patients;
pub mod payments;
pub mod users;
