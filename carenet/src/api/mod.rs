//! HTTP API surface.
//!
//! Handlers live in [`handlers`], one module per resource; the JSON wire
//! types live in [`models`]. Routing is assembled in the crate root.

pub mod handlers;
pub mod models;
