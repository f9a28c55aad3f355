//! Database-facing request/response models.

pub mod agencies;
pub mod audit;
pub mod care_logs;
pub mod disputes;
pub mod escrow;
pub mod feedback;
pub mod jobs;
pub mod patients;
pub mod payments;
pub mod users;
