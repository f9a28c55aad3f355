//! Repository implementations for each table.

pub mod agencies;
pub mod analytics;
pub mod audit;
pub mod care_logs;
pub mod disputes;
pub mod escrow;
pub mod feedback;
pub mod jobs;
pub mod patients;
pub mod payments;
pub mod repository;
pub mod users;

pub use agencies::Agencies;
pub use analytics::Analytics;
pub use audit::{AuditLog, LoginAttempts};
pub use care_logs::CareLogs;
pub use disputes::Disputes;
pub use escrow::Escrows;
pub use feedback::Feedback;
pub use jobs::Jobs;
pub use patients::Patients;
pub use payments::Payments;
pub use repository::Repository;
pub use users::Users;
