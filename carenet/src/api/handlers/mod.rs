//! Request handlers, one module per API resource.

pub mod agencies;
pub mod analytics;
pub mod auth;
pub mod care_logs;
pub mod disputes;
pub mod escrow;
pub mod feedback;
pub mod jobs;
pub mod patients;
pub mod payments;
pub mod users;
