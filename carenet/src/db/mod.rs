//! Database layer for data persistence and access.
//!
//! Implements the data access layer using SQLx with PostgreSQL, following the
//! Repository pattern: API handlers talk to repositories (`db::handlers`),
//! repositories run queries against record structs (`db::models`).
//!
//! Repositories are created from a connection or transaction, never from the
//! pool directly when writes span multiple statements:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut repo = Payments::new(&mut tx);
//! // ... operations ...
//! tx.commit().await?;
//! ```
//!
//! Migrations live in `migrations/` and are exposed via [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
